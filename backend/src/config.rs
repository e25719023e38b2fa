use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Which payment gateway adapter to wire in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    /// Local gateway that redirects straight back to the return URL
    Sandbox,
    /// Remote hosted checkout reached over HTTP
    Hosted,
}

impl GatewayMode {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "sandbox" => Ok(GatewayMode::Sandbox),
            "hosted" => Ok(GatewayMode::Hosted),
            _ => Err(format!("Invalid GATEWAY_MODE: {}. Must be sandbox or hosted", s)),
        }
    }
}

/// Payment gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub mode: GatewayMode,
    pub base_url: String,
    pub api_key: String,
    /// Shared secret for callback signatures
    pub secret: String,
    /// Where the gateway sends the payer's browser after checkout
    pub return_url: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub log_level: String,
    pub log_format: String,
    pub http_port: u16,
    pub ws_port: Option<u16>,
    pub environment: String,
    pub cors_origin: Option<String>,
    pub session_ttl_hours: i64,
    pub admin_emails: Vec<String>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub audit_log_dir: PathBuf,
    pub auto_release_payouts: bool,
    pub reminder_interval_secs: u64,
    pub reminder_lead_days: i64,
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is required")?;

        let max_connections = parse_var("DATABASE_MAX_CONNECTIONS", 10u32);
        let acquire_timeout_secs = parse_var("DATABASE_ACQUIRE_TIMEOUT_SECS", 30u64);
        let idle_timeout_secs = parse_var("DATABASE_IDLE_TIMEOUT_SECS", 600u64); // 10 minutes
        let max_lifetime_secs = parse_var("DATABASE_MAX_LIFETIME_SECS", 1800u64); // 30 minutes
        let test_before_acquire = parse_var("DATABASE_TEST_BEFORE_ACQUIRE", true);

        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        })
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/ekameti".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

impl GatewayConfig {
    /// Create gateway config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let mode = GatewayMode::from_str(
            &env::var("GATEWAY_MODE").unwrap_or_else(|_| "sandbox".to_string()),
        )?;

        let base_url = env::var("GATEWAY_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:9000".to_string());
        let api_key = env::var("GATEWAY_API_KEY").unwrap_or_default();
        let secret = env::var("GATEWAY_SECRET")
            .unwrap_or_else(|_| "ekameti-sandbox-secret".to_string());
        let return_url = env::var("PAYMENT_RETURN_URL")
            .unwrap_or_else(|_| "http://localhost:3000/payments/return".to_string());

        if mode == GatewayMode::Hosted && api_key.is_empty() {
            return Err("GATEWAY_API_KEY is required when GATEWAY_MODE=hosted".to_string());
        }

        if secret.is_empty() {
            return Err("GATEWAY_SECRET must not be empty".to_string());
        }

        Ok(Self {
            mode,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            secret,
            return_url,
        })
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Sandbox,
            base_url: "http://localhost:9000".to_string(),
            api_key: String::new(),
            secret: "ekameti-sandbox-secret".to_string(),
            return_url: "http://localhost:3000/payments/return".to_string(),
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let database = DatabaseConfig::from_env()?;
        let gateway = GatewayConfig::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

        let http_port = parse_var("HTTP_PORT", 8080u16);
        let ws_port = env::var("WS_PORT").ok().and_then(|s| s.parse::<u16>().ok());

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let cors_origin = env::var("CORS_ORIGIN").ok().filter(|s| !s.is_empty());

        let session_ttl_hours = parse_var("SESSION_TTL_HOURS", 72i64);
        let admin_emails = env::var("ADMIN_EMAILS")
            .map(|s| parse_email_list(&s))
            .unwrap_or_default();

        let upload_dir =
            PathBuf::from(env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()));
        let max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", 5 * 1024 * 1024usize);
        let audit_log_dir =
            PathBuf::from(env::var("AUDIT_LOG_DIR").unwrap_or_else(|_| "./logs".to_string()));

        let auto_release_payouts = parse_var("AUTO_RELEASE_PAYOUTS", false);
        let reminder_interval_secs = parse_var("REMINDER_INTERVAL_SECS", 3600u64);
        let reminder_lead_days = parse_var("REMINDER_LEAD_DAYS", 2i64);

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        if session_ttl_hours <= 0 {
            return Err("SESSION_TTL_HOURS must be greater than 0".to_string());
        }

        if reminder_interval_secs == 0 {
            return Err("REMINDER_INTERVAL_SECS must be greater than 0".to_string());
        }

        let config = Self {
            database,
            gateway,
            log_level: log_level.to_lowercase(),
            log_format: log_format.to_lowercase(),
            http_port,
            ws_port,
            environment: environment.to_lowercase(),
            cors_origin,
            session_ttl_hours,
            admin_emails,
            upload_dir,
            max_upload_bytes,
            audit_log_dir,
            auto_release_payouts,
            reminder_interval_secs,
            reminder_lead_days,
        };

        if config.is_production() && config.gateway.mode == GatewayMode::Sandbox {
            return Err("The sandbox payment gateway cannot be used in production".to_string());
        }

        Ok(config)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}

/// Split a comma separated list of emails, normalising case and whitespace
pub fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            gateway: GatewayConfig::default(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            http_port: 8080,
            ws_port: None,
            environment: "development".to_string(),
            cors_origin: None,
            session_ttl_hours: 72,
            admin_emails: Vec::new(),
            upload_dir: PathBuf::from("./uploads"),
            max_upload_bytes: 5 * 1024 * 1024,
            audit_log_dir: PathBuf::from("./logs"),
            auto_release_payouts: false,
            reminder_interval_secs: 3600,
            reminder_lead_days: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout_secs, 30);
    }

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.environment, "development");
        assert!(!config.is_production());
        assert_eq!(config.gateway.mode, GatewayMode::Sandbox);
    }

    #[test]
    fn test_parse_email_list() {
        let emails = parse_email_list(" Admin@Example.com, ,ops@example.com ");
        assert_eq!(emails, vec!["admin@example.com", "ops@example.com"]);
    }

    #[test]
    fn test_gateway_mode_parsing() {
        assert_eq!(GatewayMode::from_str("Hosted").unwrap(), GatewayMode::Hosted);
        assert!(GatewayMode::from_str("paypal").is_err());
    }
}
