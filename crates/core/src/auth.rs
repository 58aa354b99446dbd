//! Password hashing and signed bearer tokens.
//!
//! Passwords are stored as `v1$<salt_hex>$<hash_hex>` where the hash is an
//! iterated HMAC-SHA256 keyed by the salt. Tokens have the shape
//! `<user_id>.<role>.<expires_unix>.<sig_hex>` and are signed with the
//! configured secret over `user_id|role|expires_unix`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::domain::user::{Role, UserId};

type HmacSha256 = Hmac<Sha256>;

pub const PASSWORD_HASH_VERSION: &str = "v1";
pub const PASSWORD_HASH_ROUNDS: u32 = 10_000;
pub const MIN_PASSWORD_LEN: usize = 8;
const SALT_LEN: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("password must be at least {} characters", MIN_PASSWORD_LEN)]
    WeakPassword,
    #[error("stored password hash is malformed")]
    MalformedHash,
    #[error("token is malformed")]
    MalformedToken,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    let mut salt = [0_u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = stretch(password.as_bytes(), &salt, PASSWORD_HASH_ROUNDS);
    Ok(format!("{PASSWORD_HASH_VERSION}${}${}", encode_hex(&salt), encode_hex(&digest)))
}

/// Returns `Ok(false)` for a wrong password and `Err` only for unreadable hashes.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, AuthError> {
    let mut parts = stored.split('$');
    let (Some(version), Some(salt_hex), Some(hash_hex), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::MalformedHash);
    };
    if version != PASSWORD_HASH_VERSION {
        return Err(AuthError::MalformedHash);
    }
    let salt = decode_hex(salt_hex).ok_or(AuthError::MalformedHash)?;
    let expected = decode_hex(hash_hex).ok_or(AuthError::MalformedHash)?;

    let actual = stretch(password.as_bytes(), &salt, PASSWORD_HASH_ROUNDS);
    Ok(constant_time_eq(&actual, &expected))
}

fn stretch(password: &[u8], salt: &[u8], rounds: u32) -> Vec<u8> {
    let mut block = hmac_bytes(salt, password);
    for _ in 1..rounds {
        let mut material = Vec::with_capacity(block.len() + password.len());
        material.extend_from_slice(&block);
        material.extend_from_slice(password);
        block = hmac_bytes(salt, &material);
    }
    block
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct TokenSigner {
    secret: SecretString,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: SecretString, ttl_minutes: u32) -> Self {
        Self { secret, ttl: Duration::minutes(i64::from(ttl_minutes)) }
    }

    pub fn issue(&self, user_id: &UserId, role: Role, now: DateTime<Utc>) -> IssuedToken {
        let expires = (now + self.ttl).timestamp();
        let payload = format!("{}|{}|{expires}", user_id.0, role.as_str());
        let signature = encode_hex(&self.sign(payload.as_bytes()));
        IssuedToken {
            token: format!("{}.{}.{expires}.{signature}", user_id.0, role.as_str()),
            expires_at: Utc.timestamp_opt(expires, 0).single().unwrap_or(now + self.ttl),
        }
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        // User ids never contain '.', but split from the right so a stray one
        // cannot shift the role or expiry fields.
        let mut parts = token.trim().rsplitn(4, '.');
        let (Some(signature_hex), Some(expires_raw), Some(role_raw), Some(user_raw)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::MalformedToken);
        };
        if user_raw.is_empty() {
            return Err(AuthError::MalformedToken);
        }

        let signature = decode_hex(signature_hex).ok_or(AuthError::MalformedToken)?;
        let payload = format!("{user_raw}|{role_raw}|{expires_raw}");
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| AuthError::InvalidSignature)?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| AuthError::InvalidSignature)?;

        let role = Role::parse(role_raw).ok_or(AuthError::MalformedToken)?;
        let expires_unix: i64 = expires_raw.parse().map_err(|_| AuthError::MalformedToken)?;
        let expires_at =
            Utc.timestamp_opt(expires_unix, 0).single().ok_or(AuthError::MalformedToken)?;
        if now >= expires_at {
            return Err(AuthError::Expired(expires_at));
        }

        Ok(Claims { user_id: UserId(user_raw.to_string()), role, expires_at })
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        hmac_bytes(self.secret.expose_secret().as_bytes(), payload)
    }
}

fn hmac_bytes(key: &[u8], payload: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail here.
    match HmacSha256::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
        Err(_) => Vec::new(),
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0_u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(raw: &str) -> Option<Vec<u8>> {
    if raw.len() % 2 != 0 || raw.is_empty() {
        return None;
    }
    (0..raw.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(raw.get(index..index + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use secrecy::SecretString;

    use super::{hash_password, verify_password, AuthError, TokenSigner};
    use crate::domain::user::{Role, UserId};

    fn signer() -> TokenSigner {
        TokenSigner::new(SecretString::from("an-unit-test-secret-with-32-chars!!".to_string()), 60)
    }

    #[test]
    fn password_round_trip_and_rejection() {
        let stored = hash_password("correct horse").expect("hash");
        assert!(stored.starts_with("v1$"));
        assert_eq!(stored.split('$').nth(1).map(str::len), Some(32));

        assert_eq!(verify_password("correct horse", &stored), Ok(true));
        assert_eq!(verify_password("Correct horse", &stored), Ok(false));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let first = hash_password("hunter2hunter2").expect("hash");
        let second = hash_password("hunter2hunter2").expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn short_passwords_and_garbage_hashes_are_errors() {
        assert_eq!(hash_password("short"), Err(AuthError::WeakPassword));
        assert_eq!(verify_password("whatever1", "plaintext"), Err(AuthError::MalformedHash));
        assert_eq!(verify_password("whatever1", "v2$00$00"), Err(AuthError::MalformedHash));
        assert_eq!(verify_password("whatever1", "v1$zz$00"), Err(AuthError::MalformedHash));
    }

    #[test]
    fn token_verifies_until_expiry() {
        let signer = signer();
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).single().expect("valid time");
        let issued = signer.issue(&UserId("USR-7".to_string()), Role::Technician, now);

        assert!(issued.token.starts_with("USR-7.technician."));
        let claims = signer.verify(&issued.token, now + Duration::minutes(59)).expect("valid");
        assert_eq!(claims.user_id, UserId("USR-7".to_string()));
        assert_eq!(claims.role, Role::Technician);

        assert!(matches!(
            signer.verify(&issued.token, now + Duration::minutes(60)),
            Err(AuthError::Expired(_))
        ));
    }

    #[test]
    fn tampered_role_or_foreign_secret_is_rejected() {
        let signer = signer();
        let now = Utc::now();
        let issued = signer.issue(&UserId("USR-7".to_string()), Role::Customer, now);

        let forged = issued.token.replacen("customer", "admin", 1);
        assert_eq!(signer.verify(&forged, now), Err(AuthError::InvalidSignature));

        let other = TokenSigner::new(
            SecretString::from("a-completely-different-secret-value!!".to_string()),
            60,
        );
        assert_eq!(other.verify(&issued.token, now), Err(AuthError::InvalidSignature));
        assert_eq!(signer.verify("not-a-token", now), Err(AuthError::MalformedToken));
    }
}
