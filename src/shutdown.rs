//! 进程关闭信号处理
//!
//! 只在进程入口使用：收到信号后由入口通知注册器的关闭上下文，注册器本身不监听 OS 信号。
//! 信号处理必须在发起注册之前安装，注册过程中收到的信号同样会触发注销。

use std::future::Future;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 已安装的 SIGINT / SIGTERM 监听
pub struct ShutdownSignal {
    #[cfg(unix)]
    streams: Option<(tokio::signal::unix::Signal, tokio::signal::unix::Signal)>,
}

impl ShutdownSignal {
    /// 立即安装信号处理，之后到达的信号不再走默认处理（终止进程）
    #[cfg(unix)]
    pub fn install() -> Self {
        use tokio::signal::unix::{SignalKind, signal};

        let streams = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => Some((sigterm, sigint)),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install unix signal handlers, falling back to Ctrl+C");
                None
            }
        };
        Self { streams }
    }

    #[cfg(not(unix))]
    pub fn install() -> Self {
        Self {}
    }

    /// 等待 SIGINT 或 SIGTERM
    #[cfg(unix)]
    pub async fn wait(self) {
        let Some((mut sigterm, mut sigint)) = self.streams else {
            ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM signal, deregistering the service");
            }
            _ = sigint.recv() => {
                info!("received SIGINT signal, deregistering the service");
            }
        }
    }

    /// 非 unix 平台只监听 Ctrl+C
    #[cfg(not(unix))]
    pub async fn wait(self) {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C signal, deregistering the service"),
        Err(e) => {
            // 监听失败不等同于收到信号
            warn!(error = %e, "Failed to listen for Ctrl+C, shutdown must come from the host");
            std::future::pending::<()>().await;
        }
    }
}

/// 在后台等待 `signal`，完成后通知关闭上下文
///
/// 在注册开始前调用，注册期间到达的信号会在注销钩子安装后立即生效。
pub fn forward_shutdown<S>(signal: S, shutdown: oneshot::Sender<()>) -> JoinHandle<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        signal.await;
        // 注销钩子已结束时接收端已关闭
        let _ = shutdown.send(());
    })
}
