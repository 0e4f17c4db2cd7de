//! latch-config - 配置加载库
//!
//! 加载顺序：`default.toml` → `{APP_ENV}.toml` → `LATCH_` 前缀环境变量
//! （`__` 作为层级分隔符，例如 `LATCH_SESSION__SECRET_BYTES=48`）。

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use latch_common::RetryConfig;
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 会话密钥最短长度（字节），低于 128 位不接受
pub const MIN_SECRET_BYTES: usize = 16;

/// Argon2 工作量参数
#[derive(Debug, Clone, Deserialize)]
pub struct HashingConfig {
    /// 内存开销（KiB）
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    /// 迭代次数
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// 并行度
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_memory_kib() -> u32 {
    19456
}

fn default_iterations() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

/// 清理旧会话时的重试设置
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupRetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    1000
}

impl Default for CleanupRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl CleanupRetryConfig {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// 会话配置
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub hashing: HashingConfig,
    /// 会话密钥的随机字节数
    #[serde(default = "default_secret_bytes")]
    pub secret_bytes: usize,
    /// 单次 create / verify 的默认截止时间
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    #[serde(default)]
    pub cleanup_retry: CleanupRetryConfig,
}

fn default_secret_bytes() -> usize {
    32
}

fn default_operation_timeout_ms() -> u64 {
    5000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hashing: HashingConfig::default(),
            secret_bytes: default_secret_bytes(),
            operation_timeout_ms: default_operation_timeout_ms(),
            cleanup_retry: CleanupRetryConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    // 开发环境: 10, 生产环境: 50
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 50,
        _ => 10,
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 输出 JSON 格式日志
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub session: SessionConfig,
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_app_name() -> String {
    "latch".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从配置目录和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| default_app_env());

        Self::from_figment(Self::figment(config_dir, &env))
    }

    /// 构建 Figment，不做提取
    pub fn figment(config_dir: &str, env: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("LATCH_").split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;

        if session.secret_bytes < MIN_SECRET_BYTES {
            return Err(ConfigError::Invalid(format!(
                "session.secret_bytes must be at least {} (got {})",
                MIN_SECRET_BYTES, session.secret_bytes
            )));
        }

        if session.operation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.operation_timeout_ms must be greater than zero".to_string(),
            ));
        }

        let hashing = &session.hashing;
        if hashing.iterations == 0 || hashing.parallelism == 0 {
            return Err(ConfigError::Invalid(
                "session.hashing.iterations and parallelism must be greater than zero"
                    .to_string(),
            ));
        }

        // Argon2 要求 m >= 8 * p
        let memory_floor = hashing.parallelism.saturating_mul(8);
        if hashing.memory_kib < memory_floor {
            return Err(ConfigError::Invalid(format!(
                "session.hashing.memory_kib must be at least 8 * parallelism ({})",
                memory_floor
            )));
        }

        if session.cleanup_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "session.cleanup_retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
