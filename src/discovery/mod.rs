//! 服务发现模块
//!
//! 定义注册到服务发现中心的数据模型，以及注册中心客户端的统一接口。
//!
//! ## 使用方式
//!
//! ```rust,ignore
//! use flare_registrar::discovery::{ConsulClient, ConsulConfig, RegistryClient};
//!
//! let client = ConsulClient::new(ConsulConfig::from_env())?;
//! client.register_service(&service).await?;
//! ```

pub mod consul;

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::Result;

pub use consul::{ConsulClient, ConsulConfig};

/// 服务实例标识
///
/// 每次激活生成一个新的随机 UUID，进程内不可变，不落盘。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceIdentity(Uuid);

impl ServiceIdentity {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// 服务注册信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub id: ServiceIdentity,
    pub name: String,
    pub port: u16,
    pub address: Option<String>,
    pub tags: Vec<String>,
}

impl ServiceDescriptor {
    pub fn from_config(id: ServiceIdentity, config: &ServiceConfig) -> Self {
        Self {
            id,
            name: config.name.clone(),
            port: config.port,
            address: config.address.clone(),
            tags: config.tags.clone(),
        }
    }
}

/// 固定的四类健康检查
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthCheckKind {
    /// 服务路由可用性
    Router,
    /// 磁盘剩余空间
    Disk,
    /// 系统负载
    Load,
    /// 内存剩余
    Ram,
}

impl HealthCheckKind {
    pub const ALL: [HealthCheckKind; 4] = [Self::Router, Self::Disk, Self::Load, Self::Ram];

    /// 注册中心展示的检查名
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Router => "Service Router",
            Self::Disk => "Disk Usage",
            Self::Load => "Load Average",
            Self::Ram => "RAM Usage",
        }
    }

    pub fn notes(&self) -> Option<&'static str> {
        match self {
            Self::Router => None,
            Self::Disk | Self::Ram => Some("Critical 5%, warning 10% free"),
            Self::Load => Some("Critical load average 2, warning load average 1"),
        }
    }

    /// 探针路径，拼接在基础 URL 之后
    pub fn path(&self) -> &'static str {
        match self {
            Self::Router => "/sd/health",
            Self::Disk => "/sd/disk",
            Self::Load => "/sd/cpu",
            Self::Ram => "/sd/ram",
        }
    }

    /// 检查 ID 后缀
    fn slug(&self) -> &'static str {
        match self {
            Self::Router => "health",
            Self::Disk => "disk",
            Self::Load => "cpu",
            Self::Ram => "ram",
        }
    }
}

/// 健康检查注册信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckDescriptor {
    /// 检查 ID：`{service_id}:{slug}`，同一 agent 上多个实例互不覆盖
    pub id: String,
    pub name: String,
    pub notes: Option<String>,
    pub service_id: ServiceIdentity,
    pub http: String,
    pub interval: String,
    pub timeout: String,
}

impl HealthCheckDescriptor {
    pub fn new(kind: HealthCheckKind, service_id: ServiceIdentity, config: &ServiceConfig) -> Self {
        Self {
            id: format!("{}:{}", service_id, kind.slug()),
            name: kind.display_name().to_string(),
            notes: kind.notes().map(str::to_string),
            service_id,
            http: config.probe_url(kind.path()),
            interval: config.check_interval.clone(),
            timeout: config.check_timeout.clone(),
        }
    }
}

/// 按固定顺序构建四个健康检查
pub fn health_checks(service_id: ServiceIdentity, config: &ServiceConfig) -> Vec<HealthCheckDescriptor> {
    HealthCheckKind::ALL
        .iter()
        .map(|kind| HealthCheckDescriptor::new(*kind, service_id, config))
        .collect()
}

/// 注册中心客户端接口
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// 注册服务
    async fn register_service(&self, service: &ServiceDescriptor) -> Result<()>;

    /// 注册健康检查
    async fn register_check(&self, check: &HealthCheckDescriptor) -> Result<()>;

    /// 注销服务（注册中心会一并移除其健康检查）
    async fn deregister_service(&self, service_id: &ServiceIdentity) -> Result<()>;
}
