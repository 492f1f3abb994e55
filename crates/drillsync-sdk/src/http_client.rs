//! HTTP 传输层
//!
//! `RemoteTransport` 只负责“把请求体 POST 出去、拿回状态码和原始文本”，
//! 响应分类由 `sync::SyncClient` 完成，便于在测试中替换传输层。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, info};

use crate::error::{DrillSyncError, Result};
use crate::sdk::HttpClientConfig;

/// 原始 HTTP 响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 远端传输
///
/// 传输层失败（无网络、DNS、超时）返回 `DrillSyncError::Connectivity`。
#[async_trait]
pub trait RemoteTransport: Send + Sync + std::fmt::Debug {
    async fn post(&self, url: &str, body: String) -> Result<RawResponse>;
}

/// 基于 reqwest 的传输实现
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        // 脚本平台会 302 到实际执行地址
        let client = builder
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| DrillSyncError::Configuration(format!("创建 HTTP 客户端失败: {}", e)))?;

        info!("✅ HTTP 客户端已创建 (timeout: {:?}s)", config.request_timeout_secs);

        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn post(&self, url: &str, body: String) -> Result<RawResponse> {
        debug!("📤 POST {} ({} bytes)", url, body.len());

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, crate::wire::CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(describe_transport_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(describe_transport_error)?;
        debug!("📥 HTTP {} ({} bytes)", status, body.len());

        Ok(RawResponse { status, body })
    }
}

fn describe_transport_error(error: reqwest::Error) -> DrillSyncError {
    if error.is_timeout() {
        DrillSyncError::Connectivity(format!("request timed out: {}", error))
    } else {
        DrillSyncError::Connectivity(error.to_string())
    }
}
