use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pipeline: PipelineConfig,
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

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let pipeline = PipelineConfig::load()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            pipeline,
        })
    }
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Scheduling dials for the loan pipeline. The delays are simulation
/// parameters, not correctness knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Pause between submission and the sales stage, in milliseconds.
    pub intake_delay_ms: u64,
    /// Pause between each later stage, in milliseconds.
    pub stage_delay_ms: u64,
    /// Pause before re-running a stage whose commit failed, in milliseconds.
    pub retry_delay_ms: u64,
    /// Age of the latest activity after which a non-terminal application is
    /// considered stalled, in milliseconds.
    pub stalled_after_ms: u64,
}

const DEFAULT_INTAKE_DELAY_MS: u64 = 2_000;
const DEFAULT_STAGE_DELAY_MS: u64 = 3_000;

impl PipelineConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let intake_delay_ms = delay_var("LOAN_INTAKE_DELAY_MS", DEFAULT_INTAKE_DELAY_MS)?;
        let stage_delay_ms = delay_var("LOAN_STAGE_DELAY_MS", DEFAULT_STAGE_DELAY_MS)?;
        let retry_delay_ms = delay_var("LOAN_RETRY_DELAY_MS", stage_delay_ms)?;
        let stalled_after_ms = delay_var("LOAN_STALLED_AFTER_MS", stage_delay_ms * 5)?;

        Ok(Self {
            intake_delay_ms,
            stage_delay_ms,
            retry_delay_ms,
            stalled_after_ms,
        })
    }

    pub fn intake_delay(&self) -> Duration {
        Duration::from_millis(self.intake_delay_ms)
    }

    pub fn stage_delay(&self) -> Duration {
        Duration::from_millis(self.stage_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn stalled_after(&self) -> Duration {
        Duration::from_millis(self.stalled_after_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            intake_delay_ms: DEFAULT_INTAKE_DELAY_MS,
            stage_delay_ms: DEFAULT_STAGE_DELAY_MS,
            retry_delay_ms: DEFAULT_STAGE_DELAY_MS,
            stalled_after_ms: DEFAULT_STAGE_DELAY_MS * 5,
        }
    }
}

fn delay_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidDelay { var: name }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidDelay { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDelay { var } => {
                write!(f, "{var} must be a delay in whole milliseconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidDelay { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
