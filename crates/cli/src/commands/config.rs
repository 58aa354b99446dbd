use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use helpdesk_core::config::{AppConfig, LoadOptions, SlaHours};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut entries: Vec<(String, String, String)> = vec![
        (
            "database.url".into(),
            config.database.url.clone(),
            source("database.url", "HELPDESK_DATABASE_URL"),
        ),
        (
            "database.max_connections".into(),
            config.database.max_connections.to_string(),
            source("database.max_connections", "HELPDESK_DATABASE_MAX_CONNECTIONS"),
        ),
        (
            "database.timeout_secs".into(),
            config.database.timeout_secs.to_string(),
            source("database.timeout_secs", "HELPDESK_DATABASE_TIMEOUT_SECS"),
        ),
        (
            "server.bind_address".into(),
            config.server.bind_address.clone(),
            source("server.bind_address", "HELPDESK_SERVER_BIND_ADDRESS"),
        ),
        (
            "server.port".into(),
            config.server.port.to_string(),
            source("server.port", "HELPDESK_SERVER_PORT"),
        ),
        (
            "server.graceful_shutdown_secs".into(),
            config.server.graceful_shutdown_secs.to_string(),
            source("server.graceful_shutdown_secs", "HELPDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"),
        ),
        (
            "auth.token_secret".into(),
            redact_secret(config.auth.token_secret.expose_secret()),
            source("auth.token_secret", "HELPDESK_AUTH_TOKEN_SECRET"),
        ),
        (
            "auth.token_ttl_minutes".into(),
            config.auth.token_ttl_minutes.to_string(),
            source("auth.token_ttl_minutes", "HELPDESK_AUTH_TOKEN_TTL_MINUTES"),
        ),
    ];

    for (name, hours) in [
        ("critical", config.sla.critical),
        ("high", config.sla.high),
        ("medium", config.sla.medium),
        ("low", config.sla.low),
    ] {
        entries.extend(sla_entries(name, hours, &source));
    }

    entries.extend([
        (
            "sla.at_risk_ratio".into(),
            config.sla.at_risk_ratio.to_string(),
            source("sla.at_risk_ratio", "HELPDESK_SLA_AT_RISK_RATIO"),
        ),
        (
            "sla.monitor_interval_secs".into(),
            config.sla.monitor_interval_secs.to_string(),
            source("sla.monitor_interval_secs", "HELPDESK_SLA_MONITOR_INTERVAL_SECS"),
        ),
        (
            "assignment.auto_assign".into(),
            config.assignment.auto_assign.to_string(),
            source("assignment.auto_assign", "HELPDESK_ASSIGNMENT_AUTO_ASSIGN"),
        ),
        (
            "assignment.specialty_weight".into(),
            config.assignment.specialty_weight.to_string(),
            source("assignment.specialty_weight", "HELPDESK_ASSIGNMENT_SPECIALTY_WEIGHT"),
        ),
        (
            "assignment.load_weight".into(),
            config.assignment.load_weight.to_string(),
            source("assignment.load_weight", "HELPDESK_ASSIGNMENT_LOAD_WEIGHT"),
        ),
        (
            "assignment.urgency_weight".into(),
            config.assignment.urgency_weight.to_string(),
            source("assignment.urgency_weight", "HELPDESK_ASSIGNMENT_URGENCY_WEIGHT"),
        ),
        (
            "assignment.default_max_active_tickets".into(),
            config.assignment.default_max_active_tickets.to_string(),
            source(
                "assignment.default_max_active_tickets",
                "HELPDESK_ASSIGNMENT_DEFAULT_MAX_ACTIVE_TICKETS",
            ),
        ),
        (
            "orders.currency".into(),
            config.orders.currency.clone(),
            source("orders.currency", "HELPDESK_ORDERS_CURRENCY"),
        ),
        (
            "orders.tax_rate_pct".into(),
            config.orders.tax_rate_pct.to_string(),
            source("orders.tax_rate_pct", "HELPDESK_ORDERS_TAX_RATE_PCT"),
        ),
        (
            "logging.level".into(),
            config.logging.level.clone(),
            source("logging.level", "HELPDESK_LOGGING_LEVEL"),
        ),
        (
            "logging.format".into(),
            format!("{:?}", config.logging.format),
            source("logging.format", "HELPDESK_LOGGING_FORMAT"),
        ),
    ]);

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(entries.iter().map(|(key, value, source)| render_line(key, value, source)));
    lines.join("\n")
}

fn sla_entries(
    priority: &str,
    hours: SlaHours,
    source: &impl Fn(&str, &str) -> String,
) -> [(String, String, String); 2] {
    let upper = priority.to_ascii_uppercase();
    let response_key = format!("sla.{priority}.response_hours");
    let resolution_key = format!("sla.{priority}.resolution_hours");
    [
        (
            response_key.clone(),
            hours.response_hours.to_string(),
            source(&response_key, &format!("HELPDESK_SLA_{upper}_RESPONSE_HOURS")),
        ),
        (
            resolution_key.clone(),
            hours.resolution_hours.to_string(),
            source(&resolution_key, &format!("HELPDESK_SLA_{upper}_RESOLUTION_HOURS")),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["helpdesk.toml", "config/helpdesk.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: &str) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
