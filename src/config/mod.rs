//! 注册器配置模块
//!
//! 配置按以下顺序叠加，后者覆盖前者：
//! - 内置默认值
//! - TOML 配置文件（`[service]`、`[consul]`、`[logging]` 三张表）
//! - 命令行参数与环境变量（见 [`ServiceOverrides`]）

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use url::Url;

use crate::discovery::ConsulConfig;
use crate::error::RegistrarError;

/// 未指定配置文件时依次尝试的路径
const DEFAULT_CONFIG_CANDIDATES: &[&str] = &["config/registrar.toml", "registrar.toml"];

/// 注册到服务发现中心的服务配置
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// 对外公布的服务名
    pub name: String,
    /// 对外公布的端口
    pub port: u16,
    /// 对外公布的地址，为空时由注册中心使用 agent 地址
    pub address: Option<String>,
    /// 注册时附带的标签（保持顺序）
    pub tags: Vec<String>,
    /// 健康检查探针的基础 URL
    pub url: String,
    /// 健康检查间隔（注册中心原生时长格式，如 `10s`）
    pub check_interval: String,
    /// 健康检查超时（注册中心原生时长格式，如 `5s`）
    pub check_timeout: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            port: 8080,
            address: None,
            tags: Vec::new(),
            url: "http://127.0.0.1:8080".to_string(),
            check_interval: "10s".to_string(),
            check_timeout: "5s".to_string(),
        }
    }
}

impl ServiceConfig {
    /// 校验配置，任何一项不合法都返回 `RegistrarError::Config`
    pub fn validate(&self) -> std::result::Result<(), RegistrarError> {
        if self.name.trim().is_empty() {
            return Err(RegistrarError::Config("service name must not be empty".into()));
        }
        if self.port == 0 {
            return Err(RegistrarError::Config("service port must not be 0".into()));
        }

        let url = Url::parse(&self.url)
            .map_err(|e| RegistrarError::Config(format!("invalid url `{}`: {}", self.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RegistrarError::Config(format!(
                "url `{}` must use http or https",
                self.url
            )));
        }

        if !is_registry_duration(&self.check_interval) {
            return Err(RegistrarError::Config(format!(
                "invalid check interval `{}`",
                self.check_interval
            )));
        }
        if !is_registry_duration(&self.check_timeout) {
            return Err(RegistrarError::Config(format!(
                "invalid check timeout `{}`",
                self.check_timeout
            )));
        }

        Ok(())
    }

    /// 去掉末尾 `/` 的基础 URL
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// 拼接探针 URL，`path` 以 `/` 开头
    pub fn probe_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（`RUST_LOG` 优先）
    pub level: String,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_file: bool,
    pub with_line_number: bool,
    /// 是否输出 JSON 格式
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: false,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
            json: false,
        }
    }
}

/// 注册器完整配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RegistrarAppConfig {
    pub service: ServiceConfig,
    pub consul: ConsulConfig,
    pub logging: LoggingConfig,
}

/// 命令行 / 环境变量层的覆盖项，`None` 或空表示不覆盖
#[derive(Debug, Clone, Default)]
pub struct ServiceOverrides {
    pub name: Option<String>,
    pub port: Option<u16>,
    pub tags: Vec<String>,
    pub url: Option<String>,
    pub check_interval: Option<String>,
    pub check_timeout: Option<String>,
}

impl ServiceOverrides {
    pub fn apply(self, config: &mut ServiceConfig) {
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if !self.tags.is_empty() {
            config.tags = self.tags;
        }
        if let Some(url) = self.url {
            config.url = url;
        }
        if let Some(interval) = self.check_interval {
            config.check_interval = interval;
        }
        if let Some(timeout) = self.check_timeout {
            config.check_timeout = timeout;
        }
    }
}

/// 配置来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// 从该文件加载
    File(PathBuf),
    /// 没有找到配置文件，使用内置默认值
    Defaults,
}

/// 加载结果
///
/// 加载发生在日志初始化之前，来源由调用方在日志就绪后记录。
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: RegistrarAppConfig,
    pub source: ConfigSource,
}

/// 加载配置
///
/// 显式指定的路径必须存在；未指定时依次尝试默认路径，都不存在则使用内置默认值。
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    match path {
        Some(path) => Ok(LoadedConfig {
            config: load_config_from_file(path)?,
            source: ConfigSource::File(path.to_path_buf()),
        }),
        None => {
            let candidates: Vec<PathBuf> =
                DEFAULT_CONFIG_CANDIDATES.iter().map(PathBuf::from).collect();
            load_with_fallback(&candidates)
        }
    }
}

/// 默认配置文件候选路径，用于日志输出
pub fn default_config_candidates() -> &'static [&'static str] {
    DEFAULT_CONFIG_CANDIDATES
}

fn load_with_fallback(candidates: &[PathBuf]) -> Result<LoadedConfig> {
    match candidates.iter().find(|candidate| candidate.is_file()) {
        Some(found) => Ok(LoadedConfig {
            config: load_config_from_file(found)?,
            source: ConfigSource::File(found.clone()),
        }),
        None => Ok(LoadedConfig {
            config: RegistrarAppConfig::default(),
            source: ConfigSource::Defaults,
        }),
    }
}

fn load_config_from_file(path: &Path) -> Result<RegistrarAppConfig> {
    if !path.is_file() {
        return Err(anyhow!("config file {} does not exist", path.display()));
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("invalid config format: {}", path.display()))
}

/// 判断是否为注册中心原生时长格式
///
/// 由一个或多个 `<数字><单位>` 组成，单位为 `ns`、`us`、`µs`、`ms`、`s`、`m`、`h`，
/// 数字可带小数。单独的 `0` 也合法。
pub fn is_registry_duration(value: &str) -> bool {
    if value == "0" {
        return true;
    }
    if value.is_empty() {
        return false;
    }

    let mut rest = value;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_end];
        if number.is_empty() || number == "." || number.matches('.').count() > 1 {
            return false;
        }
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        if !matches!(unit, "ns" | "us" | "µs" | "μs" | "ms" | "s" | "m" | "h") {
            return false;
        }
        rest = &rest[unit_end..];
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_service() -> ServiceConfig {
        ServiceConfig {
            name: "svc".to_string(),
            port: 8080,
            address: None,
            tags: vec!["v1".to_string()],
            url: "http://localhost".to_string(),
            check_interval: "10s".to_string(),
            check_timeout: "5s".to_string(),
        }
    }

    #[test]
    fn registry_durations() {
        for ok in ["0", "10s", "5s", "1m30s", "1.5h", "300ms", "250us", "10µs", "2h45m"] {
            assert!(is_registry_duration(ok), "{ok} should be accepted");
        }
        for bad in ["", "10", "s", "10x", "1..5s", "-5s", "5 s", ".s"] {
            assert!(!is_registry_duration(bad), "{bad} should be rejected");
        }
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(valid_service().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let mut config = valid_service();
        config.name = "  ".to_string();
        assert!(matches!(config.validate(), Err(RegistrarError::Config(_))));

        let mut config = valid_service();
        config.port = 0;
        assert!(matches!(config.validate(), Err(RegistrarError::Config(_))));

        let mut config = valid_service();
        config.url = "localhost:8080".to_string();
        assert!(matches!(config.validate(), Err(RegistrarError::Config(_))));

        let mut config = valid_service();
        config.url = "ftp://localhost".to_string();
        assert!(matches!(config.validate(), Err(RegistrarError::Config(_))));

        let mut config = valid_service();
        config.check_timeout = "five".to_string();
        assert!(matches!(config.validate(), Err(RegistrarError::Config(_))));
    }

    #[test]
    fn probe_url_strips_trailing_slash() {
        let mut config = valid_service();
        config.url = "http://localhost:8080/".to_string();
        assert_eq!(config.probe_url("/sd/disk"), "http://localhost:8080/sd/disk");
    }

    #[test]
    fn overrides_win_over_file_values() {
        let mut config = valid_service();
        ServiceOverrides {
            name: Some("override".to_string()),
            port: Some(9090),
            tags: vec!["a".to_string(), "b".to_string()],
            url: None,
            check_interval: Some("30s".to_string()),
            check_timeout: None,
        }
        .apply(&mut config);

        assert_eq!(config.name, "override");
        assert_eq!(config.port, 9090);
        assert_eq!(config.tags, vec!["a", "b"]);
        assert_eq!(config.url, "http://localhost");
        assert_eq!(config.check_interval, "30s");
        assert_eq!(config.check_timeout, "5s");
    }

    #[test]
    fn empty_tag_override_keeps_configured_tags() {
        let mut config = valid_service();
        ServiceOverrides::default().apply(&mut config);
        assert_eq!(config, valid_service());
    }

    #[test]
    fn load_config_from_toml_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            r#"
[service]
name = "user-service"
port = 50051
tags = ["v1", "grpc"]
url = "http://10.0.0.5:50052"
check_interval = "15s"

[consul]
address = "consul.internal:8500"
datacenter = "dc2"

[logging]
level = "debug"
json = true
"#
        )?;

        let loaded = load_config(Some(file.path()))?;
        assert_eq!(loaded.source, ConfigSource::File(file.path().to_path_buf()));
        let config = loaded.config;
        assert_eq!(config.service.name, "user-service");
        assert_eq!(config.service.port, 50051);
        assert_eq!(config.service.tags, vec!["v1", "grpc"]);
        assert_eq!(config.service.check_interval, "15s");
        // 未配置的字段回落到默认值
        assert_eq!(config.service.check_timeout, "5s");
        assert_eq!(config.consul.address, "consul.internal:8500");
        assert_eq!(config.consul.datacenter.as_deref(), Some("dc2"));
        assert_eq!(config.consul.scheme, "http");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        Ok(())
    }

    #[test]
    fn fallback_reports_defaults_when_no_candidate_exists() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let candidates = vec![dir.path().join("registrar.toml"), dir.path().join("other.toml")];

        let loaded = load_with_fallback(&candidates)?;
        assert_eq!(loaded.source, ConfigSource::Defaults);
        assert_eq!(loaded.config.service, ServiceConfig::default());
        Ok(())
    }

    #[test]
    fn fallback_picks_first_existing_candidate() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let present = dir.path().join("second.toml");
        fs::write(&present, "[service]\nname = \"second\"\n")?;
        let candidates = vec![dir.path().join("first.toml"), present.clone()];

        let loaded = load_with_fallback(&candidates)?;
        assert_eq!(loaded.source, ConfigSource::File(present));
        assert_eq!(loaded.config.service.name, "second");
        Ok(())
    }

    #[test]
    fn load_config_rejects_missing_explicit_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.toml");
        assert!(load_config(Some(&missing)).is_err());
    }

    #[test]
    fn load_config_rejects_malformed_toml() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "[service\nname = ")?;
        assert!(load_config(Some(file.path())).is_err());
        Ok(())
    }
}
