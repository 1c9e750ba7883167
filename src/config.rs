use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Application Configuration
// ============================================================================
//
// Loaded from YAML (./config/config.yml unless CONFIG_PATH is set), then
// overridden by environment variables. A missing file is fine as long as
// the environment provides what validation requires.
//
// ============================================================================

pub const DEFAULT_CONFIG_PATH: &str = "./config/config.yml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub http: HttpConfig,
    pub log: LogConfig,
    pub postgres_command: PostgresConfig,
    pub postgres_query: PostgresConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub services: ServicesConfig,
    pub order: OrderConfig,
    pub metrics: MetricsConfig,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub version: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "eshop-order".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub shutdown_grace_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            shutdown_grace_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub url: String,
    pub max_pool_size: u32,
    pub conn_timeout_secs: u64,
    pub conn_attempts: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_pool_size: 10,
            conn_timeout_secs: 5,
            conn_attempts: 5,
        }
    }
}

impl PostgresConfig {
    pub fn conn_timeout(&self) -> Duration {
        Duration::from_secs(self.conn_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub password: String,
    pub database: i64,
    /// Issue `CONFIG SET notify-keyspace-events Ex` at start-up.
    pub configure_notifications: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            password: String::new(),
            database: 0,
            configure_notifications: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub broker: String,
    pub group_id: String,
    pub poll_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            broker: "127.0.0.1:9092".to_string(),
            group_id: "order-service-group".to_string(),
            poll_timeout_ms: 3000,
        }
    }
}

impl KafkaConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub warehouse_url: String,
    pub product_url: String,
    pub shipping_url: String,
    pub auth_url: String,
    pub timeout_secs: u64,
    /// Bearer token for Product lookups made outside a user request.
    pub product_token: Option<String>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            warehouse_url: String::new(),
            product_url: String::new(),
            shipping_url: String::new(),
            auth_url: String::new(),
            timeout_secs: 10,
            product_token: None,
        }
    }
}

impl ServicesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    pub validity_hours: u64,
    pub verify_client_price: bool,
    pub expiry_sweep_secs: u64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            validity_hours: 24,
            verify_client_price: true,
            expiry_sweep_secs: 300,
        }
    }
}

impl OrderConfig {
    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity_hours * 3600)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

impl AppConfig {
    /// Read the YAML file (when present), apply the process environment and validate.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            Self::from_yaml(&raw).with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults and environment");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Override fields from environment variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        fn parse<T: std::str::FromStr>(key: &str, raw: String) -> anyhow::Result<T>
        where
            T::Err: std::fmt::Display,
        {
            raw.trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid value for {}: {}", key, e))
        }

        if let Some(v) = get("APP_NAME") {
            self.app.name = v;
        }
        if let Some(v) = get("APP_VERSION") {
            self.app.version = v;
        }
        if let Some(v) = get("HTTP_PORT") {
            self.http.port = parse("HTTP_PORT", v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log.level = v;
        }

        for (prefix, pg) in [
            ("POSTGRESQL_COMMAND", &mut self.postgres_command),
            ("POSTGRESQL_QUERY", &mut self.postgres_query),
        ] {
            if let Some(v) = get(&format!("{}_URL", prefix)) {
                pg.url = v;
            }
            let key = format!("{}_MAX_POOL_SIZE", prefix);
            if let Some(v) = get(&key) {
                pg.max_pool_size = parse(&key, v)?;
            }
            let key = format!("{}_CONN_TIMEOUT", prefix);
            if let Some(v) = get(&key) {
                pg.conn_timeout_secs = parse(&key, v)?;
            }
            let key = format!("{}_CONN_ATTEMPTS", prefix);
            if let Some(v) = get(&key) {
                pg.conn_attempts = parse(&key, v)?;
            }
        }

        if let Some(v) = get("REDIS_URL") {
            self.redis.url = v;
        }
        if let Some(v) = get("REDIS_PASSWORD") {
            self.redis.password = v;
        }
        if let Some(v) = get("KAFKA_BROKER") {
            self.kafka.broker = v;
        }
        if let Some(v) = get("KAFKA_GROUP_ID") {
            self.kafka.group_id = v;
        }
        if let Some(v) = get("WAREHOUSE_SERVICE") {
            self.services.warehouse_url = v;
        }
        if let Some(v) = get("PRODUCT_SERVICE") {
            self.services.product_url = v;
        }
        if let Some(v) = get("SHIPPING_COST_SERVICE") {
            self.services.shipping_url = v;
        }
        if let Some(v) = get("AUTH_SERVICE") {
            self.services.auth_url = v;
        }
        if let Some(v) = get("PRODUCT_SERVICE_TOKEN") {
            self.services.product_token = Some(v);
        }
        if let Some(v) = get("ORDER_VALIDITY_HOURS") {
            self.order.validity_hours = parse("ORDER_VALIDITY_HOURS", v)?;
        }
        if let Some(v) = get("METRICS_PORT") {
            self.metrics.port = parse("METRICS_PORT", v)?;
        }
        if let Some(v) = get("RUN_MIGRATIONS") {
            self.run_migrations = parse("RUN_MIGRATIONS", v)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let required = [
            ("postgres_command.url", &self.postgres_command.url),
            ("postgres_query.url", &self.postgres_query.url),
            ("redis.url", &self.redis.url),
            ("kafka.broker", &self.kafka.broker),
            ("services.warehouse_url", &self.services.warehouse_url),
            ("services.product_url", &self.services.product_url),
            ("services.shipping_url", &self.services.shipping_url),
            ("services.auth_url", &self.services.auth_url),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            bail!("missing required configuration: {}", missing.join(", "));
        }

        if self.order.validity_hours == 0 {
            bail!("order.validity_hours must be positive");
        }
        if self.postgres_command.max_pool_size == 0 || self.postgres_query.max_pool_size == 0 {
            bail!("postgres max_pool_size must be positive");
        }
        if self.services.timeout_secs == 0 {
            bail!("services.timeout_secs must be positive");
        }
        Ok(())
    }

    /// Default tracing filter when RUST_LOG is not set.
    pub fn log_filter(&self) -> String {
        format!("{level},eshop_order={level}", level = self.log.level)
    }
}
