use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assignment::AssignmentWeights;
use crate::sla::{SlaPolicy, SlaTarget};

pub const MIN_TOKEN_SECRET_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub sla: SlaConfig,
    pub assignment: AssignmentConfig,
    pub orders: OrdersConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub token_secret: SecretString,
    pub token_ttl_minutes: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaHours {
    pub response_hours: u32,
    pub resolution_hours: u32,
}

#[derive(Clone, Debug)]
pub struct SlaConfig {
    pub critical: SlaHours,
    pub high: SlaHours,
    pub medium: SlaHours,
    pub low: SlaHours,
    pub at_risk_ratio: f64,
    pub monitor_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AssignmentConfig {
    pub auto_assign: bool,
    pub specialty_weight: f64,
    pub load_weight: f64,
    pub urgency_weight: f64,
    pub default_max_active_tickets: u32,
}

#[derive(Clone, Debug)]
pub struct OrdersConfig {
    pub currency: String,
    pub tax_rate_pct: Decimal,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub token_secret: Option<String>,
    pub auto_assign: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://helpdesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            auth: AuthConfig { token_secret: String::new().into(), token_ttl_minutes: 720 },
            sla: SlaConfig {
                critical: SlaHours { response_hours: 1, resolution_hours: 4 },
                high: SlaHours { response_hours: 4, resolution_hours: 24 },
                medium: SlaHours { response_hours: 8, resolution_hours: 48 },
                low: SlaHours { response_hours: 24, resolution_hours: 72 },
                at_risk_ratio: 0.25,
                monitor_interval_secs: 60,
            },
            assignment: AssignmentConfig {
                auto_assign: true,
                specialty_weight: 0.5,
                load_weight: 0.3,
                urgency_weight: 0.2,
                default_max_active_tickets: 5,
            },
            orders: OrdersConfig { currency: "USD".to_string(), tax_rate_pct: Decimal::ZERO },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl SlaConfig {
    pub fn policy(&self) -> SlaPolicy {
        let target = |hours: SlaHours| {
            SlaTarget::hours(i64::from(hours.response_hours), i64::from(hours.resolution_hours))
        };
        SlaPolicy {
            low: target(self.low),
            medium: target(self.medium),
            high: target(self.high),
            critical: target(self.critical),
            at_risk_ratio: self.at_risk_ratio,
        }
    }
}

impl AssignmentConfig {
    pub fn weights(&self) -> AssignmentWeights {
        AssignmentWeights {
            specialty: self.specialty_weight,
            load: self.load_weight,
            urgency: self.urgency_weight,
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("helpdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(token_secret_value) = auth.token_secret {
                self.auth.token_secret = secret_value(token_secret_value);
            }
            if let Some(token_ttl_minutes) = auth.token_ttl_minutes {
                self.auth.token_ttl_minutes = token_ttl_minutes;
            }
        }

        if let Some(sla) = patch.sla {
            apply_hours(&mut self.sla.critical, sla.critical);
            apply_hours(&mut self.sla.high, sla.high);
            apply_hours(&mut self.sla.medium, sla.medium);
            apply_hours(&mut self.sla.low, sla.low);
            if let Some(at_risk_ratio) = sla.at_risk_ratio {
                self.sla.at_risk_ratio = at_risk_ratio;
            }
            if let Some(monitor_interval_secs) = sla.monitor_interval_secs {
                self.sla.monitor_interval_secs = monitor_interval_secs;
            }
        }

        if let Some(assignment) = patch.assignment {
            if let Some(auto_assign) = assignment.auto_assign {
                self.assignment.auto_assign = auto_assign;
            }
            if let Some(weight) = assignment.specialty_weight {
                self.assignment.specialty_weight = weight;
            }
            if let Some(weight) = assignment.load_weight {
                self.assignment.load_weight = weight;
            }
            if let Some(weight) = assignment.urgency_weight {
                self.assignment.urgency_weight = weight;
            }
            if let Some(max) = assignment.default_max_active_tickets {
                self.assignment.default_max_active_tickets = max;
            }
        }

        if let Some(orders) = patch.orders {
            if let Some(currency) = orders.currency {
                self.orders.currency = currency;
            }
            if let Some(tax_rate_pct) = orders.tax_rate_pct {
                self.orders.tax_rate_pct = tax_rate_pct;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HELPDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("HELPDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("HELPDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("HELPDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("HELPDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HELPDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("HELPDESK_SERVER_PORT") {
            self.server.port = parse_u16("HELPDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("HELPDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("HELPDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("HELPDESK_AUTH_TOKEN_SECRET") {
            self.auth.token_secret = secret_value(value);
        }
        if let Some(value) = read_env("HELPDESK_AUTH_TOKEN_TTL_MINUTES") {
            self.auth.token_ttl_minutes = parse_u32("HELPDESK_AUTH_TOKEN_TTL_MINUTES", &value)?;
        }

        for (name, hours) in [
            ("CRITICAL", &mut self.sla.critical),
            ("HIGH", &mut self.sla.high),
            ("MEDIUM", &mut self.sla.medium),
            ("LOW", &mut self.sla.low),
        ] {
            let response_key = format!("HELPDESK_SLA_{name}_RESPONSE_HOURS");
            if let Some(value) = read_env(&response_key) {
                hours.response_hours = parse_u32(&response_key, &value)?;
            }
            let resolution_key = format!("HELPDESK_SLA_{name}_RESOLUTION_HOURS");
            if let Some(value) = read_env(&resolution_key) {
                hours.resolution_hours = parse_u32(&resolution_key, &value)?;
            }
        }
        if let Some(value) = read_env("HELPDESK_SLA_AT_RISK_RATIO") {
            self.sla.at_risk_ratio = parse_f64("HELPDESK_SLA_AT_RISK_RATIO", &value)?;
        }
        if let Some(value) = read_env("HELPDESK_SLA_MONITOR_INTERVAL_SECS") {
            self.sla.monitor_interval_secs =
                parse_u64("HELPDESK_SLA_MONITOR_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("HELPDESK_ASSIGNMENT_AUTO_ASSIGN") {
            self.assignment.auto_assign = parse_bool("HELPDESK_ASSIGNMENT_AUTO_ASSIGN", &value)?;
        }
        if let Some(value) = read_env("HELPDESK_ASSIGNMENT_SPECIALTY_WEIGHT") {
            self.assignment.specialty_weight =
                parse_f64("HELPDESK_ASSIGNMENT_SPECIALTY_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("HELPDESK_ASSIGNMENT_LOAD_WEIGHT") {
            self.assignment.load_weight = parse_f64("HELPDESK_ASSIGNMENT_LOAD_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("HELPDESK_ASSIGNMENT_URGENCY_WEIGHT") {
            self.assignment.urgency_weight =
                parse_f64("HELPDESK_ASSIGNMENT_URGENCY_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("HELPDESK_ASSIGNMENT_DEFAULT_MAX_ACTIVE_TICKETS") {
            self.assignment.default_max_active_tickets =
                parse_u32("HELPDESK_ASSIGNMENT_DEFAULT_MAX_ACTIVE_TICKETS", &value)?;
        }

        if let Some(value) = read_env("HELPDESK_ORDERS_CURRENCY") {
            self.orders.currency = value;
        }
        if let Some(value) = read_env("HELPDESK_ORDERS_TAX_RATE_PCT") {
            self.orders.tax_rate_pct = parse_decimal("HELPDESK_ORDERS_TAX_RATE_PCT", &value)?;
        }

        let log_level =
            read_env("HELPDESK_LOGGING_LEVEL").or_else(|| read_env("HELPDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HELPDESK_LOGGING_FORMAT").or_else(|| read_env("HELPDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(token_secret) = overrides.token_secret {
            self.auth.token_secret = secret_value(token_secret);
        }
        if let Some(auto_assign) = overrides.auto_assign {
            self.assignment.auto_assign = auto_assign;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_auth(&self.auth)?;
        validate_sla(&self.sla)?;
        validate_assignment(&self.assignment)?;
        validate_orders(&self.orders)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn apply_hours(target: &mut SlaHours, patch: Option<SlaHoursPatch>) {
    if let Some(patch) = patch {
        if let Some(response_hours) = patch.response_hours {
            target.response_hours = response_hours;
        }
        if let Some(resolution_hours) = patch.resolution_hours {
            target.resolution_hours = resolution_hours;
        }
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("helpdesk.toml"), PathBuf::from("config/helpdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let secret = auth.token_secret.expose_secret();
    if secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.token_secret is required. Set HELPDESK_AUTH_TOKEN_SECRET to a random string of at least 32 characters".to_string(),
        ));
    }
    if secret.chars().count() < MIN_TOKEN_SECRET_LEN {
        return Err(ConfigError::Validation(format!(
            "auth.token_secret must be at least {MIN_TOKEN_SECRET_LEN} characters"
        )));
    }
    if auth.token_ttl_minutes == 0 || auth.token_ttl_minutes > 10_080 {
        return Err(ConfigError::Validation(
            "auth.token_ttl_minutes must be in range 1..=10080".to_string(),
        ));
    }
    Ok(())
}

fn validate_sla(sla: &SlaConfig) -> Result<(), ConfigError> {
    for (name, hours) in
        [("critical", sla.critical), ("high", sla.high), ("medium", sla.medium), ("low", sla.low)]
    {
        if hours.response_hours == 0 || hours.resolution_hours == 0 {
            return Err(ConfigError::Validation(format!(
                "sla.{name} response and resolution hours must be greater than zero"
            )));
        }
        if hours.response_hours > hours.resolution_hours {
            return Err(ConfigError::Validation(format!(
                "sla.{name}.response_hours must not exceed sla.{name}.resolution_hours"
            )));
        }
    }

    if !(sla.at_risk_ratio > 0.0 && sla.at_risk_ratio < 1.0) {
        return Err(ConfigError::Validation(
            "sla.at_risk_ratio must be strictly between 0 and 1".to_string(),
        ));
    }

    if sla.monitor_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "sla.monitor_interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_assignment(assignment: &AssignmentConfig) -> Result<(), ConfigError> {
    let weights = [assignment.specialty_weight, assignment.load_weight, assignment.urgency_weight];
    if weights.iter().any(|weight| !weight.is_finite() || *weight < 0.0) {
        return Err(ConfigError::Validation(
            "assignment weights must be finite and non-negative".to_string(),
        ));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(ConfigError::Validation(
            "assignment weights must not all be zero".to_string(),
        ));
    }
    if assignment.default_max_active_tickets == 0 {
        return Err(ConfigError::Validation(
            "assignment.default_max_active_tickets must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_orders(orders: &OrdersConfig) -> Result<(), ConfigError> {
    let currency = orders.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ConfigError::Validation(
            "orders.currency must be a 3-letter upper-case ISO code (e.g. USD)".to_string(),
        ));
    }
    if orders.tax_rate_pct < Decimal::ZERO || orders.tax_rate_pct > Decimal::ONE_HUNDRED {
        return Err(ConfigError::Validation(
            "orders.tax_rate_pct must be in range 0..=100".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid(key, value))
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.trim().parse::<Decimal>().map_err(|_| invalid(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    auth: Option<AuthPatch>,
    sla: Option<SlaPatch>,
    assignment: Option<AssignmentPatch>,
    orders: Option<OrdersPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    token_secret: Option<String>,
    token_ttl_minutes: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SlaHoursPatch {
    response_hours: Option<u32>,
    resolution_hours: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SlaPatch {
    critical: Option<SlaHoursPatch>,
    high: Option<SlaHoursPatch>,
    medium: Option<SlaHoursPatch>,
    low: Option<SlaHoursPatch>,
    at_risk_ratio: Option<f64>,
    monitor_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AssignmentPatch {
    auto_assign: Option<bool>,
    specialty_weight: Option<f64>,
    load_weight: Option<f64>,
    urgency_weight: Option<f64>,
    default_max_active_tickets: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct OrdersPatch {
    currency: Option<String>,
    tax_rate_pct: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::str::FromStr;
    use std::sync::{Mutex, OnceLock};

    use chrono::Duration;
    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::domain::ticket::TicketPriority;

    const SECRET: &str = "test-secret-that-is-long-enough-0123456789";

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_HELPDESK_SECRET", SECRET);

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("helpdesk.toml");
            fs::write(
                &path,
                r#"
[auth]
token_secret = "${TEST_HELPDESK_SECRET}"

[orders]
currency = "EUR"
tax_rate_pct = "7.5"

[sla.critical]
response_hours = 2
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.auth.token_secret.expose_secret() == SECRET,
                "token secret should be interpolated from environment",
            )?;
            ensure(config.orders.currency == "EUR", "currency should come from file")?;
            ensure(
                config.orders.tax_rate_pct == Decimal::from_str("7.5").unwrap_or_default(),
                "tax rate should come from file",
            )?;
            ensure(config.sla.critical.response_hours == 2, "partial sla patch should apply")?;
            ensure(config.sla.critical.resolution_hours == 4, "unpatched sla field keeps default")?;
            Ok(())
        })();

        clear_vars(&["TEST_HELPDESK_SECRET"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HELPDESK_AUTH_TOKEN_SECRET", SECRET);
        env::set_var("HELPDESK_LOG_LEVEL", "warn");
        env::set_var("HELPDESK_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["HELPDESK_AUTH_TOKEN_SECRET", "HELPDESK_LOG_LEVEL", "HELPDESK_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HELPDESK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("HELPDESK_ASSIGNMENT_LOAD_WEIGHT", "0.6");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("helpdesk.toml");
            fs::write(
                &path,
                format!(
                    r#"
[database]
url = "sqlite://from-file.db"

[auth]
token_secret = "{SECRET}"

[assignment]
load_weight = 0.1
auto_assign = true

[logging]
level = "warn"
"#
                ),
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    auto_assign: Some(false),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                (config.assignment.load_weight - 0.6).abs() < f64::EPSILON,
                "env weight should win over file",
            )?;
            ensure(!config.assignment.auto_assign, "override should disable auto assignment")?;
            Ok(())
        })();

        clear_vars(&["HELPDESK_DATABASE_URL", "HELPDESK_ASSIGNMENT_LOAD_WEIGHT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HELPDESK_AUTH_TOKEN_SECRET", "too-short");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("auth.token_secret")
            );
            ensure(has_message, "validation failure should mention auth.token_secret")
        })();

        clear_vars(&["HELPDESK_AUTH_TOKEN_SECRET"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HELPDESK_AUTH_TOKEN_SECRET", SECRET);
        env::set_var("HELPDESK_SLA_HIGH_RESPONSE_HOURS", "four");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env parse failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "HELPDESK_SLA_HIGH_RESPONSE_HOURS"
                ),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["HELPDESK_AUTH_TOKEN_SECRET", "HELPDESK_SLA_HIGH_RESPONSE_HOURS"]);
        result
    }

    #[test]
    fn sla_and_assignment_rules_are_validated() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.auth.token_secret = SECRET.to_string().into();
        ensure(config.validate().is_ok(), "defaults plus secret should validate")?;

        let mut inverted = config.clone();
        inverted.sla.high.response_hours = 30;
        ensure(inverted.validate().is_err(), "response window longer than resolution")?;

        let mut ratio = config.clone();
        ratio.sla.at_risk_ratio = 1.0;
        ensure(ratio.validate().is_err(), "at-risk ratio must be below one")?;

        let mut weights = config.clone();
        weights.assignment.specialty_weight = 0.0;
        weights.assignment.load_weight = 0.0;
        weights.assignment.urgency_weight = 0.0;
        ensure(weights.validate().is_err(), "all-zero weights are rejected")?;

        let mut currency = config;
        currency.orders.currency = "usd".to_string();
        ensure(currency.validate().is_err(), "lower-case currency is rejected")
    }

    #[test]
    fn sla_config_builds_policy() {
        let config = AppConfig::default();
        let policy = config.sla.policy();
        assert_eq!(
            policy.target(TicketPriority::High).resolution_minutes,
            Duration::hours(24).num_minutes()
        );
        assert_eq!(policy.at_risk_ratio, 0.25);
        assert_eq!(config.assignment.weights().specialty, 0.5);
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HELPDESK_AUTH_TOKEN_SECRET", SECRET);

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains(SECRET), "debug output should not contain token secret")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["HELPDESK_AUTH_TOKEN_SECRET"]);
        result
    }
}
