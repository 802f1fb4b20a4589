//! Flare Registrar 公共库
//!
//! 服务启动事件回放完成后注册到服务发现中心（附带健康检查），关闭时注销

pub mod config;
pub mod discovery;
pub mod error;
pub mod registrar;
pub mod shutdown;
pub mod tracing;

pub use config::{
    ConfigSource, LoadedConfig, LoggingConfig, RegistrarAppConfig, ServiceConfig,
    ServiceOverrides, load_config,
};
pub use discovery::{
    ConsulClient, ConsulConfig, HealthCheckDescriptor, HealthCheckKind, RegistryClient,
    ServiceDescriptor, ServiceIdentity,
};
pub use error::{RegistrarError, Result};
pub use registrar::{Registrar, Registration, RegistrationState};
