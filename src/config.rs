use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub asaas: AsaasConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Shared HS256 secret of the identity provider issuing user sessions.
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsaasConfig {
    pub api_key: String,
    #[serde(default = "default_asaas_base_url")]
    pub base_url: String,
    /// Shared secret the gateway sends in the `asaas-access-token` header.
    pub webhook_token: String,
    #[serde(default = "default_asaas_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_trial_days")]
    pub trial_days: i64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            trial_days: default_trial_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scheduler_interval_secs")]
    pub interval_secs: u64,
    /// Required in the `x-cron-secret` header of the processor endpoint.
    #[serde(default)]
    pub cron_secret: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_scheduler_interval_secs(),
            cron_secret: String::new(),
        }
    }
}

fn default_asaas_base_url() -> String {
    "https://sandbox.asaas.com/api/v3".to_string()
}

fn default_asaas_timeout_secs() -> u64 {
    30
}

fn default_trial_days() -> i64 {
    7
}

fn default_scheduler_interval_secs() -> u64 {
    3600
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => Self::from_toml_str(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // no file: build from environment and defaults
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                let database_url = get_env("DATABASE_URL")
                    .ok_or("DATABASE_URL is not set and config.toml was not found")?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    jwt: JwtConfig {
                        secret: get_env("JWT_SECRET")
                            .unwrap_or_else(|| "change-me-in-production".to_string()),
                    },
                    asaas: AsaasConfig {
                        api_key: get_env("ASAAS_API_KEY").unwrap_or_default(),
                        base_url: get_env("ASAAS_BASE_URL")
                            .unwrap_or_else(default_asaas_base_url),
                        webhook_token: get_env("ASAAS_WEBHOOK_TOKEN").unwrap_or_default(),
                        timeout_secs: get_env_parse(
                            "ASAAS_TIMEOUT_SECS",
                            default_asaas_timeout_secs(),
                        ),
                    },
                    billing: BillingConfig::default(),
                    scheduler: SchedulerConfig::default(),
                }
            }
            Err(e) => {
                return Err(format!("Failed to read config file {config_path}: {e}").into());
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, Box<dyn std::error::Error>> {
        toml::from_str(raw).map_err(|e| format!("Failed to parse config file: {e}").into())
    }

    /// Environment variables win over file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            self.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            self.database.max_connections = mc;
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.jwt.secret = v;
        }
        if let Ok(v) = env::var("ASAAS_API_KEY") {
            self.asaas.api_key = v;
        }
        if let Ok(v) = env::var("ASAAS_BASE_URL") {
            self.asaas.base_url = v;
        }
        if let Ok(v) = env::var("ASAAS_WEBHOOK_TOKEN") {
            self.asaas.webhook_token = v;
        }
        if let Ok(v) = env::var("ASAAS_TIMEOUT_SECS")
            && let Ok(n) = v.parse()
        {
            self.asaas.timeout_secs = n;
        }
        if let Ok(v) = env::var("BILLING_TRIAL_DAYS")
            && let Ok(n) = v.parse()
        {
            self.billing.trial_days = n;
        }
        if let Ok(v) = env::var("SCHEDULER_ENABLED")
            && let Ok(b) = v.parse()
        {
            self.scheduler.enabled = b;
        }
        if let Ok(v) = env::var("SCHEDULER_INTERVAL_SECS")
            && let Ok(n) = v.parse()
        {
            self.scheduler.interval_secs = n;
        }
        if let Ok(v) = env::var("SCHEDULER_CRON_SECRET") {
            self.scheduler.cron_secret = v;
        }
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.billing.trial_days < 0 {
            return Err("billing.trial_days must not be negative".into());
        }
        if self.scheduler.interval_secs == 0 {
            return Err("scheduler.interval_secs must be greater than 0".into());
        }
        if self.asaas.api_key.is_empty() {
            log::warn!("ASAAS_API_KEY is empty; gateway calls will be rejected");
        }
        if self.asaas.webhook_token.is_empty() {
            log::warn!("ASAAS_WEBHOOK_TOKEN is empty; every webhook will be rejected");
        }
        Ok(())
    }
}
