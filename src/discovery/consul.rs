//! Consul agent HTTP API 客户端
//!
//! 只覆盖注册器需要的三个接口：
//! - `PUT /v1/agent/service/register`
//! - `PUT /v1/agent/check/register`
//! - `PUT /v1/agent/service/deregister/{id}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{HealthCheckDescriptor, RegistryClient, ServiceDescriptor, ServiceIdentity};
use crate::error::{RegistrarError, Result};

const DEFAULT_ADDRESS: &str = "127.0.0.1:8500";

/// Consul 连接配置
///
/// 默认值与环境变量和 Consul 官方客户端保持一致：
/// `CONSUL_HTTP_ADDR`、`CONSUL_HTTP_TOKEN`、`CONSUL_HTTP_SSL`。
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsulConfig {
    /// agent 地址（`host:port`）
    pub address: String,
    /// `http` 或 `https`
    pub scheme: String,
    /// ACL token
    pub token: Option<String>,
    /// 数据中心
    pub datacenter: Option<String>,
    /// 单次请求超时（毫秒）
    pub request_timeout_ms: u64,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            scheme: "http".to_string(),
            token: None,
            datacenter: None,
            request_timeout_ms: 5_000,
        }
    }
}

impl ConsulConfig {
    /// 默认配置叠加进程环境变量
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// 用进程环境变量覆盖当前配置
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// 用给定的变量查找函数覆盖当前配置
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("CONSUL_HTTP_ADDR").filter(|v| !v.is_empty()) {
            if let Some(rest) = addr.strip_prefix("https://") {
                self.scheme = "https".to_string();
                self.address = rest.to_string();
            } else if let Some(rest) = addr.strip_prefix("http://") {
                self.scheme = "http".to_string();
                self.address = rest.to_string();
            } else {
                self.address = addr;
            }
        }

        if let Some(token) = lookup("CONSUL_HTTP_TOKEN").filter(|v| !v.is_empty()) {
            self.token = Some(token);
        }

        if let Some(ssl) = lookup("CONSUL_HTTP_SSL") {
            match ssl.to_ascii_lowercase().as_str() {
                "1" | "true" | "t" => self.scheme = "https".to_string(),
                "0" | "false" | "f" => self.scheme = "http".to_string(),
                other => debug!(value = %other, "Ignoring unrecognised CONSUL_HTTP_SSL value"),
            }
        }
    }

    /// agent 的基础 URL
    pub fn base_url(&self) -> Result<Url> {
        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(RegistrarError::Client(format!(
                "unsupported Consul scheme `{}`",
                self.scheme
            )));
        }
        let raw = format!("{}://{}/", self.scheme, self.address);
        let url = Url::parse(&raw)
            .map_err(|e| RegistrarError::Client(format!("invalid Consul address `{}`: {}", raw, e)))?;
        if url.host_str().is_none() {
            return Err(RegistrarError::Client(format!("Consul address `{}` has no host", raw)));
        }
        Ok(url)
    }
}

/// 服务注册请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: String,
    name: &'a str,
    port: u16,
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<&'a str>,
}

impl<'a> From<&'a ServiceDescriptor> for AgentServiceRegistration<'a> {
    fn from(service: &'a ServiceDescriptor) -> Self {
        Self {
            id: service.id.to_string(),
            name: &service.name,
            port: service.port,
            tags: &service.tags,
            address: service.address.as_deref(),
        }
    }
}

/// 健康检查注册请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentCheckRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
    #[serde(rename = "ServiceID")]
    service_id: String,
    #[serde(rename = "HTTP")]
    http: &'a str,
    interval: &'a str,
    timeout: &'a str,
}

impl<'a> From<&'a HealthCheckDescriptor> for AgentCheckRegistration<'a> {
    fn from(check: &'a HealthCheckDescriptor) -> Self {
        Self {
            id: &check.id,
            name: &check.name,
            notes: check.notes.as_deref(),
            service_id: check.service_id.to_string(),
            http: &check.http,
            interval: &check.interval,
            timeout: &check.timeout,
        }
    }
}

/// Consul 客户端
#[derive(Debug, Clone)]
pub struct ConsulClient {
    http_client: HttpClient,
    base_url: Url,
    token: Option<String>,
    datacenter: Option<String>,
}

impl ConsulClient {
    /// 创建客户端；地址非法或 HTTP 客户端构建失败时返回 `RegistrarError::Client`
    pub fn new(config: ConsulConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let http_client = HttpClient::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| RegistrarError::Client(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            token: config.token,
            datacenter: config.datacenter,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| RegistrarError::Client(format!("invalid Consul API path `{}`: {}", path, e)))?;
        if let Some(dc) = &self.datacenter {
            url.query_pairs_mut().append_pair("dc", dc);
        }
        Ok(url)
    }

    /// 发送 PUT 请求，非 2xx 状态转换为 `RegistrarError::Status`
    async fn put<T>(&self, path: &str, body: Option<&T>) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let url = self.endpoint(path)?;
        let mut request = self.http_client.put(url.clone());

        if let Some(token) = &self.token {
            request = request.header("X-Consul-Token", token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(url = %url, status = %status, "Consul agent responded");

        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RegistrarError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl RegistryClient for ConsulClient {
    async fn register_service(&self, service: &ServiceDescriptor) -> Result<()> {
        let payload = AgentServiceRegistration::from(service);
        self.put("v1/agent/service/register", Some(&payload)).await
    }

    async fn register_check(&self, check: &HealthCheckDescriptor) -> Result<()> {
        let payload = AgentCheckRegistration::from(check);
        self.put("v1/agent/check/register", Some(&payload)).await
    }

    async fn deregister_service(&self, service_id: &ServiceIdentity) -> Result<()> {
        let path = format!("v1/agent/service/deregister/{}", service_id);
        self.put::<()>(&path, None).await
    }
}
