//! Configuration types.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::phone;

/// Which chat transport the binary drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// WebSocket bridge to a chat-web sidecar.
    Bridge,
    /// stdin/stdout, for local testing.
    Cli,
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Normalized admin phone numbers.
    pub admin_phones: HashSet<String>,
    /// Chat session identifier handed to the transport.
    pub session_id: String,
    /// Where the transport keeps its session credentials.
    pub session_dir: PathBuf,
    /// Linear reconnect backoff step.
    pub reconnect_base: Duration,
    /// Reconnect backoff cap.
    pub reconnect_max: Duration,
    pub transport: TransportKind,
    pub bridge_url: Option<String>,
    pub bridge_token: Option<SecretString>,
    /// libSQL file. `None` keeps tasks in memory.
    pub db_path: Option<PathBuf>,
    /// JSON seed for the worker/sector directory.
    pub directory_path: Option<PathBuf>,
    /// Port for `/health` and the read-only task API. `None` disables it.
    pub status_port: Option<u16>,
    /// Alert the creating admin when a worker reports a status.
    pub notify_admin_on_update: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            admin_phones: HashSet::new(),
            session_id: "field-dispatch".to_string(),
            session_dir: PathBuf::from("./data/session"),
            reconnect_base: Duration::from_millis(5_000),
            reconnect_max: Duration::from_millis(30_000),
            transport: TransportKind::Cli,
            bridge_url: None,
            bridge_token: None,
            db_path: None,
            directory_path: None,
            status_port: None,
            notify_admin_on_update: true,
            log_dir: None,
        }
    }
}

impl BotConfig {
    /// Read configuration from `FIELD_DISPATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let admin_phones = get("FIELD_DISPATCH_ADMIN_PHONES")
            .map(|raw| parse_phone_list(&raw))
            .unwrap_or_default();

        let reconnect_base = match get("FIELD_DISPATCH_RECONNECT_BASE_MS") {
            Some(v) => Duration::from_millis(parse_number("FIELD_DISPATCH_RECONNECT_BASE_MS", &v)?),
            None => defaults.reconnect_base,
        };
        let reconnect_max = match get("FIELD_DISPATCH_RECONNECT_MAX_MS") {
            Some(v) => Duration::from_millis(parse_number("FIELD_DISPATCH_RECONNECT_MAX_MS", &v)?),
            None => defaults.reconnect_max,
        };
        if reconnect_base > reconnect_max {
            return Err(ConfigError::InvalidValue {
                key: "FIELD_DISPATCH_RECONNECT_BASE_MS".into(),
                message: format!(
                    "base {}ms exceeds cap {}ms",
                    reconnect_base.as_millis(),
                    reconnect_max.as_millis()
                ),
            });
        }

        let bridge_url = get("FIELD_DISPATCH_BRIDGE_URL");
        let transport = match get("FIELD_DISPATCH_TRANSPORT").map(|v| v.to_lowercase()) {
            Some(v) if v == "bridge" => TransportKind::Bridge,
            Some(v) if v == "cli" => TransportKind::Cli,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "FIELD_DISPATCH_TRANSPORT".into(),
                    message: format!("expected 'bridge' or 'cli', got '{other}'"),
                });
            }
            None if bridge_url.is_some() => TransportKind::Bridge,
            None => TransportKind::Cli,
        };
        if transport == TransportKind::Bridge && bridge_url.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "FIELD_DISPATCH_BRIDGE_URL".into(),
                hint: "Set it to the chat bridge WebSocket URL, e.g. ws://127.0.0.1:3001/ws".into(),
            });
        }

        let status_port = get("FIELD_DISPATCH_STATUS_PORT")
            .map(|v| parse_number("FIELD_DISPATCH_STATUS_PORT", &v))
            .transpose()?;

        let notify_admin_on_update = match get("FIELD_DISPATCH_NOTIFY_ADMIN") {
            Some(v) => parse_bool("FIELD_DISPATCH_NOTIFY_ADMIN", &v)?,
            None => defaults.notify_admin_on_update,
        };

        Ok(Self {
            admin_phones,
            session_id: get("FIELD_DISPATCH_SESSION_ID").unwrap_or(defaults.session_id),
            session_dir: get("FIELD_DISPATCH_SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_dir),
            reconnect_base,
            reconnect_max,
            transport,
            bridge_url,
            bridge_token: get("FIELD_DISPATCH_BRIDGE_TOKEN").map(SecretString::from),
            db_path: get("FIELD_DISPATCH_DB_PATH").map(PathBuf::from),
            directory_path: get("FIELD_DISPATCH_DIRECTORY_PATH").map(PathBuf::from),
            status_port,
            notify_admin_on_update,
            log_dir: get("FIELD_DISPATCH_LOG_DIR").map(PathBuf::from),
        })
    }

    /// Config with millisecond backoff, for tests.
    pub fn for_test(admins: &[&str]) -> Self {
        Self {
            admin_phones: admins.iter().map(|a| phone::normalize(a)).collect(),
            reconnect_base: Duration::from_millis(10),
            reconnect_max: Duration::from_millis(60),
            ..Self::default()
        }
    }

    /// Whether a normalized phone is on the admin allow-list.
    pub fn is_admin(&self, normalized_phone: &str) -> bool {
        !normalized_phone.is_empty() && self.admin_phones.contains(normalized_phone)
    }
}

fn parse_phone_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(phone::normalize)
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
