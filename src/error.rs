//! 注册器统一错误模块
//!
//! - 所有失败都以 `RegistrarError` 返回给调用方，由进程入口决定退出方式
//! - 注册中心的底层错误保存在 `source` 中，便于日志追溯

use thiserror::Error;

/// 注册器错误类型
#[derive(Debug, Error)]
pub enum RegistrarError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 就绪信号的发送端在触发前被丢弃
    #[error("Readiness signal dropped before the event replay completed")]
    NotReady,

    /// 注册中心客户端创建失败
    #[error("Registry client error: {0}")]
    Client(String),

    /// 服务注册失败
    #[error("Failed to register service `{service_id}`: {source}")]
    ServiceRegistration {
        service_id: String,
        #[source]
        source: Box<RegistrarError>,
    },

    /// 健康检查注册失败（服务已回滚注销）
    #[error("Failed to register health checks {failed:?} for service `{service_id}`")]
    CheckRegistration {
        service_id: String,
        failed: Vec<String>,
    },

    /// 服务注销失败
    #[error("Failed to deregister service `{service_id}`: {source}")]
    Deregistration {
        service_id: String,
        #[source]
        source: Box<RegistrarError>,
    },

    /// 注销任务异常退出
    #[error("Deregistration hook aborted: {0}")]
    HookAborted(#[from] tokio::task::JoinError),

    /// HTTP 传输错误
    #[error("HTTP request to registry failed: {0}")]
    Http(#[from] reqwest::Error),

    /// 注册中心返回非 2xx 状态
    #[error("Registry responded with status {status}: {body}")]
    Status { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, RegistrarError>;
