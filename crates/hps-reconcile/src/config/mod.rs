use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the reconciliation service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub mailbox: Option<MailboxConfig>,
    pub authority: AuthorityConfig,
    pub reconciliation: ReconciliationConfig,
    pub schedule: ScheduleConfig,
    pub records_csv: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("HPS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let mailbox = match env::var("HPS_IMAP_HOST") {
            Ok(imap_host) if !imap_host.trim().is_empty() => Some(MailboxConfig {
                host: imap_host.trim().to_string(),
                port: parse_var("HPS_IMAP_PORT", 993)?,
                username: env::var("HPS_IMAP_USERNAME").unwrap_or_default(),
                password: env::var("HPS_IMAP_PASSWORD").unwrap_or_default(),
                mailbox: env::var("HPS_IMAP_MAILBOX").unwrap_or_else(|_| "INBOX".to_string()),
                timeout: Duration::from_secs(parse_var("HPS_IMAP_TIMEOUT_SECS", 30)?),
            }),
            _ => None,
        };

        let authority = AuthorityConfig {
            senders: list_var("HPS_AUTHORITY_SENDERS").unwrap_or_default(),
            subject_keywords: list_var("HPS_AUTHORITY_SUBJECT_KEYWORDS")
                .unwrap_or_else(AuthorityConfig::default_keywords),
        };

        let reconciliation = ReconciliationConfig {
            since_days: parse_var("HPS_SINCE_DAYS", 7)?,
            only_unread: parse_var("HPS_ONLY_UNREAD", true)?,
            status_patterns: env::var("HPS_STATUS_PATTERNS").ok().map(PathBuf::from),
        };

        let schedule = ScheduleConfig {
            interval_minutes: parse_var("HPS_SCHEDULE_INTERVAL_MINUTES", 60)?,
            start_hour: parse_var("HPS_SCHEDULE_START_HOUR", 8)?,
            end_hour: parse_var("HPS_SCHEDULE_END_HOUR", 18)?,
        };
        if schedule.start_hour > 23 || schedule.end_hour > 24 {
            return Err(ConfigError::InvalidValue {
                key: "HPS_SCHEDULE_START_HOUR/HPS_SCHEDULE_END_HOUR",
            });
        }

        let records_csv = env::var("HPS_RECORDS_CSV").ok().map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            mailbox,
            authority,
            reconciliation,
            schedule,
            records_csv,
        })
    }

    pub fn require_mailbox(&self) -> Result<&MailboxConfig, ConfigError> {
        self.mailbox
            .as_ref()
            .ok_or(ConfigError::Missing { key: "HPS_IMAP_HOST" })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key }),
        _ => Ok(default),
    }
}

fn list_var(key: &str) -> Option<Vec<String>> {
    let raw = env::var(key).ok()?;
    Some(
        raw.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
    )
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Secured IMAP session parameters.
#[derive(Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub mailbox: String,
    pub timeout: Duration,
}

impl fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("mailbox", &self.mailbox)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Sender allow-list and subject keywords identifying the issuing authority.
#[derive(Debug, Clone, Default)]
pub struct AuthorityConfig {
    pub senders: Vec<String>,
    pub subject_keywords: Vec<String>,
}

impl AuthorityConfig {
    pub fn default_keywords() -> Vec<String> {
        [
            "HPS",
            "habilitación personal de seguridad",
            "habilitacion personal de seguridad",
            "oficina nacional de seguridad",
        ]
        .iter()
        .map(|keyword| keyword.to_string())
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub since_days: u32,
    pub only_unread: bool,
    /// Optional JSON file replacing the built-in status pattern table.
    pub status_patterns: Option<PathBuf>,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            since_days: 7,
            only_unread: true,
            status_patterns: None,
        }
    }
}

/// Cadence for the in-process scheduler loop; runs only inside `[start_hour, end_hour)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub interval_minutes: u64,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl ScheduleConfig {
    pub fn within_window(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str },
    Missing { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key } => write!(f, "{key} has an invalid value"),
            ConfigError::Missing { key } => write!(f, "{key} must be set"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::Missing { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "HPS_LOG_LEVEL",
            "HPS_IMAP_HOST",
            "HPS_IMAP_PORT",
            "HPS_IMAP_USERNAME",
            "HPS_IMAP_PASSWORD",
            "HPS_IMAP_MAILBOX",
            "HPS_IMAP_TIMEOUT_SECS",
            "HPS_AUTHORITY_SENDERS",
            "HPS_AUTHORITY_SUBJECT_KEYWORDS",
            "HPS_SINCE_DAYS",
            "HPS_ONLY_UNREAD",
            "HPS_STATUS_PATTERNS",
            "HPS_SCHEDULE_INTERVAL_MINUTES",
            "HPS_SCHEDULE_START_HOUR",
            "HPS_SCHEDULE_END_HOUR",
            "HPS_RECORDS_CSV",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.mailbox.is_none());
        assert!(config.authority.senders.is_empty());
        assert!(config
            .authority
            .subject_keywords
            .iter()
            .any(|keyword| keyword == "HPS"));
        assert_eq!(config.reconciliation.since_days, 7);
        assert!(config.reconciliation.only_unread);
        assert_eq!(config.schedule.interval_minutes, 60);
        assert!(matches!(
            config.require_mailbox(),
            Err(ConfigError::Missing { key: "HPS_IMAP_HOST" })
        ));
    }

    #[test]
    fn mailbox_section_reads_imap_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HPS_IMAP_HOST", "imap.example.org");
        env::set_var("HPS_IMAP_USERNAME", "hps@example.org");
        env::set_var("HPS_IMAP_TIMEOUT_SECS", "12");
        env::set_var(
            "HPS_AUTHORITY_SENDERS",
            "solicitudes@authority.example, avisos@authority.example",
        );
        let config = AppConfig::load().expect("config loads");
        let mailbox = config.require_mailbox().expect("mailbox configured");
        assert_eq!(mailbox.port, 993);
        assert_eq!(mailbox.mailbox, "INBOX");
        assert_eq!(mailbox.timeout, Duration::from_secs(12));
        assert_eq!(config.authority.senders.len(), 2);
        assert!(!format!("{mailbox:?}").contains("password"));
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_since_days() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HPS_SINCE_DAYS", "a week");
        let error = AppConfig::load().expect_err("invalid since days");
        assert!(matches!(
            error,
            ConfigError::InvalidValue {
                key: "HPS_SINCE_DAYS"
            }
        ));
        reset_env();
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn schedule_window_is_half_open() {
        let schedule = ScheduleConfig {
            interval_minutes: 60,
            start_hour: 8,
            end_hour: 18,
        };
        assert!(schedule.within_window(8));
        assert!(schedule.within_window(17));
        assert!(!schedule.within_window(18));
        assert!(!schedule.within_window(3));
    }
}
