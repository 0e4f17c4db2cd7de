//! latch-telemetry - 可观测性库
//!
//! tracing 订阅器初始化与会话指标的 Prometheus 导出。

use latch_config::TelemetryConfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 会话指标名称
pub mod names {
    pub const SESSIONS_CREATED: &str = "sessions_created_total";
    pub const SESSION_CLEANUP_FAILURES: &str = "session_cleanup_failures_total";
    pub const SESSION_VERIFICATIONS: &str = "session_verifications_total";
    pub const CREDENTIAL_GENERATION_SECONDS: &str = "session_credential_generation_seconds";
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    Tracing(String),

    #[error("Failed to install Prometheus recorder: {0}")]
    Metrics(String),
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// 初始化 tracing
pub fn init_tracing(log_level: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| TelemetryError::Tracing(e.to_string()))
}

/// 初始化 JSON 格式的 tracing（生产环境）
pub fn init_tracing_json(log_level: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| TelemetryError::Tracing(e.to_string()))
}

/// 按配置选择输出格式
pub fn init_from_config(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if config.json {
        init_tracing_json(&config.log_level)
    } else {
        init_tracing(&config.log_level)
    }
}

/// 初始化 Prometheus metrics 并登记会话指标说明
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;

    describe_session_metrics();
    Ok(handle)
}

pub fn describe_session_metrics() {
    metrics::describe_counter!(names::SESSIONS_CREATED, "Sessions issued by create");
    metrics::describe_counter!(
        names::SESSION_CLEANUP_FAILURES,
        "Creates whose superseded-session cleanup failed"
    );
    metrics::describe_counter!(
        names::SESSION_VERIFICATIONS,
        "Credential verifications by outcome"
    );
    metrics::describe_histogram!(
        names::CREDENTIAL_GENERATION_SECONDS,
        metrics::Unit::Seconds,
        "Time spent generating and hashing a session secret"
    );
}
