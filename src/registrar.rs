//! 服务注册器
//!
//! 事件回放完成后（就绪信号触发），依次：
//! 1. 创建注册中心客户端
//! 2. 注册服务
//! 3. 注册四个健康检查
//! 4. 安装注销钩子
//!
//! 注销钩子监听调用方传入的关闭上下文，收到通知后只注销一次。

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::discovery::{
    ConsulClient, ConsulConfig, HealthCheckDescriptor, RegistryClient, ServiceDescriptor,
    ServiceIdentity, health_checks,
};
use crate::error::{RegistrarError, Result};

/// 服务实例在注册中心中的生命周期，只会向前推进
///
/// `Registration` 只在服务注册成功后返回，因此通过 [`Registration::state`]
/// 观察到的状态从 `Registered` 开始。`Unregistered` 与 `Registering` 只用于
/// 描述完整的状态机，外部无法观察到。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// 尚未发起注册
    Unregistered,
    /// 服务注册请求进行中
    Registering,
    Registered,
    Deregistering,
    Deregistered,
    /// 注销失败
    Terminated,
}

/// 服务注册器
#[derive(Debug, Clone)]
pub struct Registrar {
    config: ServiceConfig,
}

impl Registrar {
    /// 创建注册器，配置不合法时返回 `RegistrarError::Config`
    pub fn new(config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// 等待就绪信号后注册到 Consul
    pub async fn activate_with_consul(
        &self,
        ready: oneshot::Receiver<()>,
        shutdown: oneshot::Receiver<()>,
        consul: ConsulConfig,
    ) -> Result<Registration> {
        self.activate(ready, shutdown, move || ConsulClient::new(consul))
            .await
    }

    /// 等待就绪信号后注册服务与健康检查，并安装注销钩子
    ///
    /// # 参数
    /// * `ready` - 事件回放完成时触发一次；发送端被丢弃则返回 `NotReady`，不访问注册中心
    /// * `shutdown` - 关闭上下文；触发或发送端被丢弃时注销服务
    /// * `connect` - 在就绪之后调用，用于创建注册中心客户端
    ///
    /// 任何一个健康检查注册失败时，会先注销已注册的服务再返回 `CheckRegistration`。
    pub async fn activate<C, F>(
        &self,
        ready: oneshot::Receiver<()>,
        shutdown: oneshot::Receiver<()>,
        connect: F,
    ) -> Result<Registration>
    where
        C: RegistryClient + 'static,
        F: FnOnce() -> Result<C>,
    {
        if ready.await.is_err() {
            warn!("Readiness signal dropped before the events were replayed, skipping registration");
            return Err(RegistrarError::NotReady);
        }
        info!("The events were all replayed, trying to register to the service registry");

        let client = match connect() {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!(error = %e, "❌ Error occurred while creating the registry client");
                return Err(e);
            }
        };

        let identity = ServiceIdentity::generate();
        let (state_tx, state_rx) = watch::channel(RegistrationState::Registering);
        let service = ServiceDescriptor::from_config(identity, &self.config);

        if let Err(e) = client.register_service(&service).await {
            error!(
                error = %e,
                service_id = %identity,
                service_name = %service.name,
                "❌ Error occurred while registering to the service registry (is consul running?)"
            );
            return Err(RegistrarError::ServiceRegistration {
                service_id: identity.to_string(),
                source: Box::new(e),
            });
        }
        state_tx.send_replace(RegistrationState::Registered);
        info!(
            service_id = %identity,
            service_name = %service.name,
            port = service.port,
            tags = ?service.tags,
            "✅ Service registered"
        );

        let checks = health_checks(identity, &self.config);
        let failed = register_checks(client.as_ref(), &checks).await;
        if !failed.is_empty() {
            rollback(client.as_ref(), identity, &state_tx).await;
            return Err(RegistrarError::CheckRegistration {
                service_id: identity.to_string(),
                failed,
            });
        }

        let (manual_tx, manual_rx) = oneshot::channel();
        let hook = install_deregistration_hook(
            Arc::clone(&client),
            identity,
            shutdown,
            manual_rx,
            state_tx,
        );

        info!(
            service_id = %identity,
            "The service has been registered to the service registry successfully, the service is now ready to work"
        );

        Ok(Registration {
            service,
            checks,
            state: state_rx,
            manual: manual_tx,
            hook,
        })
    }
}

/// 依次注册全部健康检查，返回失败的检查名
async fn register_checks<C>(client: &C, checks: &[HealthCheckDescriptor]) -> Vec<String>
where
    C: RegistryClient + ?Sized,
{
    let mut failed = Vec::new();
    for check in checks {
        match client.register_check(check).await {
            Ok(()) => info!(check = %check.name, url = %check.http, "Health check registered"),
            Err(e) => {
                error!(
                    error = %e,
                    check = %check.name,
                    url = %check.http,
                    "❌ Failed to register health check"
                );
                failed.push(check.name.clone());
            }
        }
    }
    failed
}

async fn rollback<C>(client: &C, identity: ServiceIdentity, state: &watch::Sender<RegistrationState>)
where
    C: RegistryClient + ?Sized,
{
    state.send_replace(RegistrationState::Deregistering);
    match client.deregister_service(&identity).await {
        Ok(()) => {
            state.send_replace(RegistrationState::Deregistered);
            warn!(service_id = %identity, "Service deregistered after health check registration failed");
        }
        Err(e) => {
            state.send_replace(RegistrationState::Terminated);
            error!(
                error = %e,
                service_id = %identity,
                "❌ Cannot deregister the service after health check registration failed"
            );
        }
    }
}

/// 安装注销钩子
///
/// 关闭上下文或手动触发二选一，先到者生效；之后任务结束，注销只发生一次。
fn install_deregistration_hook<C>(
    client: Arc<C>,
    identity: ServiceIdentity,
    shutdown: oneshot::Receiver<()>,
    manual: oneshot::Receiver<()>,
    state: watch::Sender<RegistrationState>,
) -> JoinHandle<Result<()>>
where
    C: RegistryClient + 'static,
{
    tokio::spawn(async move {
        // `Registration` 被丢弃时手动通道关闭，此时只等待关闭上下文
        let manual = async move {
            if manual.await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            received = shutdown => match received {
                Ok(()) => info!(service_id = %identity, "Shutdown requested, deregistering the service"),
                Err(_) => warn!(service_id = %identity, "Shutdown context dropped, deregistering the service"),
            },
            _ = manual => info!(service_id = %identity, "Deregistration requested by the owner"),
        }

        state.send_replace(RegistrationState::Deregistering);
        match client.deregister_service(&identity).await {
            Ok(()) => {
                state.send_replace(RegistrationState::Deregistered);
                info!(
                    service_id = %identity,
                    "✅ The service has been deregistered from the service registry successfully"
                );
                Ok(())
            }
            Err(e) => {
                state.send_replace(RegistrationState::Terminated);
                error!(
                    error = %e,
                    service_id = %identity,
                    "❌ Cannot deregister the service from the service registry"
                );
                Err(RegistrarError::Deregistration {
                    service_id: identity.to_string(),
                    source: Box::new(e),
                })
            }
        }
    })
}

/// 一次成功的注册
///
/// 持有注销钩子；丢弃本值不会注销服务，注销仍由关闭上下文驱动。
#[derive(Debug)]
pub struct Registration {
    service: ServiceDescriptor,
    checks: Vec<HealthCheckDescriptor>,
    state: watch::Receiver<RegistrationState>,
    manual: oneshot::Sender<()>,
    hook: JoinHandle<Result<()>>,
}

impl Registration {
    pub fn identity(&self) -> ServiceIdentity {
        self.service.id
    }

    pub fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    pub fn checks(&self) -> &[HealthCheckDescriptor] {
        &self.checks
    }

    pub fn state(&self) -> RegistrationState {
        *self.state.borrow()
    }

    /// 立即注销（如果关闭上下文尚未触发），并等待结果
    pub async fn deregister_now(self) -> Result<()> {
        // 关闭上下文先触发时接收端已关闭
        let _ = self.manual.send(());
        self.hook.await?
    }

    /// 等待注销钩子完成（由关闭上下文触发）
    pub async fn deregistered(self) -> Result<()> {
        let Registration { manual, hook, .. } = self;
        let result = hook.await;
        drop(manual);
        result?
    }
}
