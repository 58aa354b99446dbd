use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Technician,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Technician => "technician",
            Self::Customer => "customer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "technician" => Some(Self::Technician),
            "customer" => Some(Self::Customer),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Assignment-relevant attributes of a technician account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicianProfile {
    pub user_id: UserId,
    pub specialties: Vec<String>,
    pub max_active_tickets: u32,
    pub available: bool,
}

impl TechnicianProfile {
    pub fn new(
        user_id: UserId,
        specialties: impl IntoIterator<Item = impl AsRef<str>>,
        max_active_tickets: u32,
    ) -> Self {
        Self {
            user_id,
            specialties: normalize_specialties(specialties),
            max_active_tickets,
            available: true,
        }
    }
}

/// Lower-cases, trims, drops empties and de-duplicates while keeping first-seen order.
pub fn normalize_specialties(values: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for value in values {
        let value = value.as_ref().trim().to_ascii_lowercase();
        if !value.is_empty() && !normalized.contains(&value) {
            normalized.push(value);
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::{normalize_specialties, Role, TechnicianProfile, UserId};

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!(Role::parse(" Technician "), Some(Role::Technician));
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("chef"), None);
    }

    #[test]
    fn specialties_are_normalized_and_deduplicated() {
        let specialties = normalize_specialties(["Network", " network ", "", "Hardware"]);
        assert_eq!(specialties, vec!["network".to_string(), "hardware".to_string()]);
    }

    #[test]
    fn new_profile_starts_available() {
        let profile = TechnicianProfile::new(UserId("U-1".to_string()), ["Printers"], 4);
        assert!(profile.available);
        assert_eq!(profile.specialties, vec!["printers".to_string()]);
    }
}
