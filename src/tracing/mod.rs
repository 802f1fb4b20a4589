//! # 日志初始化模块
//!
//! 为注册器提供统一的 tracing 日志初始化。

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;

/// 从配置初始化日志系统
///
/// # 参数
/// * `logging_config` - 日志配置（可选），如果为 None 则使用默认配置（info 级别）
///
/// # 示例
/// ```rust,ignore
/// use flare_registrar::config::LoggingConfig;
/// use flare_registrar::tracing::init_tracing_from_config;
///
/// let config = LoggingConfig {
///     level: "debug".to_string(),
///     json: true,
///     ..LoggingConfig::default()
/// };
/// init_tracing_from_config(Some(&config));
/// ```
pub fn init_tracing_from_config(logging_config: Option<&LoggingConfig>) {
    let default_config = LoggingConfig::default();
    let config = logging_config.unwrap_or(&default_config);

    // 优先使用环境变量 RUST_LOG，如果没有则使用配置文件的日志级别
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = fmt::Subscriber::builder()
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_file(config.with_file)
        .with_line_number(config.with_line_number)
        .with_env_filter(env_filter);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
