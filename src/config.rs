use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub financing: FinancingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// 超过该时长的语句以 warn 记录
    pub slow_statement_secs: u64,
}

impl DatabaseConfig {
    /// 口令替换为 `***` 的连接串，用于日志
    pub fn redacted_url(&self) -> String {
        let Some(scheme_end) = self.url.find("://") else {
            return self.url.clone();
        };
        let authority_start = scheme_end + 3;
        let authority_end = self.url[authority_start..]
            .find('/')
            .map_or(self.url.len(), |i| authority_start + i);
        let Some(at) = self.url[authority_start..authority_end].rfind('@') else {
            return self.url.clone();
        };
        let userinfo = &self.url[authority_start..authority_start + at];
        match userinfo.find(':') {
            Some(colon) => format!(
                "{}{}:***{}",
                &self.url[..authority_start],
                &userinfo[..colon],
                &self.url[authority_start + at..]
            ),
            None => self.url.clone(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.redacted_url())
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("slow_statement_secs", &self.slow_statement_secs)
            .finish()
    }
}

/// 融资批次配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancingConfig {
    /// 持久化失败时整批最多执行次数 (含首次)
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// 批次互斥用的 advisory lock key
    pub run_lock_key: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/invoice_financing".to_string(),
                max_connections: 20,
                acquire_timeout_secs: 10,
                slow_statement_secs: 5,
            },
            financing: FinancingConfig::default(),
        }
    }
}

impl Default for FinancingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 200,
            run_lock_key: 0x4649_4e41_4e43_45,
        }
    }
}

impl AppConfig {
    /// 默认值
    pub fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let defaults = AppConfig::default();
        Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("database.url", defaults.database.url)?
            .set_default("database.max_connections", i64::from(defaults.database.max_connections))?
            .set_default("database.acquire_timeout_secs", defaults.database.acquire_timeout_secs as i64)?
            .set_default("database.slow_statement_secs", defaults.database.slow_statement_secs as i64)?
            .set_default("financing.max_attempts", i64::from(defaults.financing.max_attempts))?
            .set_default("financing.retry_backoff_ms", defaults.financing.retry_backoff_ms as i64)?
            .set_default("financing.run_lock_key", defaults.financing.run_lock_key)
    }

    /// 从环境变量加载配置
    ///
    /// `FINANCING__SERVER__PORT=9090` 覆盖 `server.port`，`DATABASE_URL` 覆盖 `database.url`。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_sources(Self::environment(), std::env::var("DATABASE_URL").ok())
    }

    /// `FINANCING__` 前缀、`__` 分隔的环境变量源
    pub fn environment() -> Environment {
        Environment::with_prefix("FINANCING")
            .separator("__")
            .try_parsing(true)
    }

    /// 默认值 < `env` < `database_url`
    pub fn from_sources(
        env: Environment,
        database_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(env)
            .set_override_option("database.url", database_url)?
            .build()?
            .try_deserialize()
    }
}
