//! # Flare Registrar 入口
//!
//! 作为 sidecar 运行：启动即视为就绪，注册服务与健康检查，收到 SIGINT/SIGTERM 后注销并退出。

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::oneshot;
use tracing::{info, warn};

use flare_registrar::config::default_config_candidates;
use flare_registrar::shutdown::{ShutdownSignal, forward_shutdown};
use flare_registrar::tracing::init_tracing_from_config;
use flare_registrar::{ConfigSource, Registrar, ServiceOverrides, load_config};

#[derive(Parser)]
#[command(name = "flare-registrar")]
#[command(about = "Register a service and its health checks to Consul, deregister on shutdown")]
struct Cli {
    /// TOML 配置文件路径
    #[arg(long, env = "REGISTRAR_CONFIG")]
    config: Option<PathBuf>,

    /// 对外公布的服务名
    #[arg(long, env = "SERVICE_NAME")]
    name: Option<String>,

    /// 对外公布的端口
    #[arg(long, env = "SERVICE_PORT")]
    port: Option<u16>,

    /// 注册标签，逗号分隔
    #[arg(long = "consul-tags", env = "CONSUL_TAGS", value_delimiter = ',')]
    consul_tags: Vec<String>,

    /// 健康检查探针的基础 URL
    #[arg(long, env = "SERVICE_URL")]
    url: Option<String>,

    #[arg(long = "consul-check_interval", env = "CONSUL_CHECK_INTERVAL")]
    consul_check_interval: Option<String>,

    #[arg(long = "consul-check_timeout", env = "CONSUL_CHECK_TIMEOUT")]
    consul_check_timeout: Option<String>,

    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ServiceOverrides {
        ServiceOverrides {
            name: self.name.clone(),
            port: self.port,
            tags: self.consul_tags.clone(),
            url: self.url.clone(),
            check_interval: self.consul_check_interval.clone(),
            check_timeout: self.consul_check_timeout.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let loaded = load_config(cli.config.as_deref())?;
    let mut config = loaded.config;
    config.consul.apply_env();
    cli.overrides().apply(&mut config.service);
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    init_tracing_from_config(Some(&config.logging));

    match &loaded.source {
        ConfigSource::File(path) => info!(path = %path.display(), "Loaded registrar config"),
        ConfigSource::Defaults => warn!(
            candidates = ?default_config_candidates(),
            "No registrar config file found, using built-in defaults"
        ),
    }

    let registrar = Registrar::new(config.service.clone()).context("invalid service config")?;

    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 注册开始前安装信号处理，注册期间收到的信号同样触发注销
    let signal = ShutdownSignal::install();
    let forwarder = forward_shutdown(signal.wait(), shutdown_tx);

    // sidecar 模式下被代理的服务没有事件回放，启动即就绪
    let _ = ready_tx.send(());

    let registration = match registrar
        .activate_with_consul(ready_rx, shutdown_rx, config.consul.clone())
        .await
    {
        Ok(registration) => registration,
        Err(e) => {
            forwarder.abort();
            return Err(e).context("service registration failed");
        }
    };

    info!(
        service_id = %registration.identity(),
        consul = %config.consul.address,
        "Registrar is running, waiting for shutdown signal"
    );

    registration
        .deregistered()
        .await
        .context("service deregistration failed")?;

    // 信号触发的退出以状态码 1 结束
    Ok(ExitCode::from(1))
}
