//! 同步客户端
//!
//! 一次只发送一个操作，并按固定顺序分类结果（先命中者为准）：
//! 1. URL 未配置或是占位符 → 不发请求，直接失败
//! 2. 传输层失败 / 非 2xx → 连接错误
//! 3. 响应体是 HTML → 部署 / 权限错误（先于 JSON 解析判断）
//! 4. 无法解析为 JSON → 无效响应
//! 5. `success: false` → 原样透传远端消息
//! 6. 其余 → 成功
//!
//! 客户端不修改本地存储，标记已同步由 `SyncEngine` 负责。

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{DrillSyncError, Result};
use crate::http_client::RemoteTransport;
use crate::inventory::InventoryCounts;
use crate::sdk::EndpointConfig;
use crate::storage::entities::{InventoryData, LogbookEntry, Measurement, SteelChange};
use crate::wire::{is_markup, FetchRequest, Operation, RemoteResponse};

use super::retry_policy::SyncFailureReason;

pub(crate) const NOT_CONFIGURED: &str = "script URL is not configured";
const LOGIN_PAGE: &str = "the script returned a login page; check that the web app is deployed with access for 'Anyone'";
const NOT_JSON: &str = "response is not JSON";
const REJECTED_WITHOUT_MESSAGE: &str = "remote endpoint reported a failure";

/// 单条上传结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub success: bool,
    pub message: String,
    /// 失败原因（用于退避计算）
    pub reason: Option<SyncFailureReason>,
}

impl UploadResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            reason: None,
        }
    }

    pub fn failed(error: &DrillSyncError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            reason: Some(SyncFailureReason::from(error)),
        }
    }
}

/// 同步队列使用的上传接口
#[async_trait]
pub trait RecordUploader: Send + Sync {
    async fn upload(&self, operation: &Operation, url: &str) -> UploadResult;
}

/// 同步客户端
#[derive(Debug)]
pub struct SyncClient {
    transport: Arc<dyn RemoteTransport>,
    endpoint: EndpointConfig,
}

impl SyncClient {
    pub fn new(transport: Arc<dyn RemoteTransport>, endpoint: EndpointConfig) -> Self {
        Self { transport, endpoint }
    }

    /// 发送一个操作并分类结果；成功时返回远端响应
    pub async fn send(&self, operation: &Operation, url: &str) -> Result<RemoteResponse> {
        if self.endpoint.is_placeholder(url) {
            return Err(DrillSyncError::Configuration(NOT_CONFIGURED.to_string()));
        }

        let body = operation.to_body()?;
        debug!("发送操作: type={}, bytes={}", operation.tag(), body.len());

        let raw = self.transport.post(url.trim(), body).await?;
        if !raw.is_success() {
            return Err(DrillSyncError::Connectivity(format!("HTTP {}", raw.status)));
        }

        if is_markup(&raw.body) {
            warn!("远端返回 HTML 页面，脚本可能未公开部署: type={}", operation.tag());
            return Err(DrillSyncError::RemoteDeployment(LOGIN_PAGE.to_string()));
        }

        let response: RemoteResponse = serde_json::from_str(&raw.body)
            .map_err(|_| DrillSyncError::InvalidResponse(NOT_JSON.to_string()))?;

        if !response.success {
            let message = response
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| REJECTED_WITHOUT_MESSAGE.to_string());
            return Err(DrillSyncError::RemoteLogic(message));
        }

        Ok(response)
    }

    /// 读取类操作：解析响应中的 `data`，缺失时返回默认值
    async fn fetch<T: DeserializeOwned + Default>(&self, operation: Operation, url: &str) -> Result<T> {
        let tag = operation.tag();
        let response = self.send(&operation, url).await?;
        match response.data {
            None | Some(serde_json::Value::Null) => Ok(T::default()),
            Some(data) => serde_json::from_value(data).map_err(|e| {
                warn!("远端数据结构不符: type={}, error={}", tag, e);
                DrillSyncError::InvalidResponse(format!("unexpected data for {}: {}", tag, e))
            }),
        }
    }

    pub async fn inventory_update(&self, url: &str, inventory: &InventoryData) -> Result<RemoteResponse> {
        self.send(&Operation::InventoryUpdate(inventory.clone()), url).await
    }

    /// 远端返回的是按钢材的计数表；尚无库存记录时返回 `None`
    pub async fn inventory_fetch(&self, url: &str) -> Result<Option<InventoryCounts>> {
        self.fetch(Operation::InventoryFetch(FetchRequest {}), url).await
    }

    pub async fn measurements_fetch(&self, url: &str) -> Result<Vec<Measurement>> {
        self.fetch(Operation::MeasurementsFetch(FetchRequest {}), url).await
    }

    pub async fn steel_changes_fetch(&self, url: &str) -> Result<Vec<SteelChange>> {
        self.fetch(Operation::SteelChangesFetch(FetchRequest {}), url).await
    }

    /// 附图未命名时补上默认文件名
    pub async fn logbook_entry(&self, url: &str, entry: &LogbookEntry) -> Result<RemoteResponse> {
        let mut entry = entry.clone();
        entry.photo_name = entry.effective_photo_name();
        self.send(&Operation::LogbookEntry(entry), url).await
    }

    pub async fn logbook_fetch(&self, url: &str) -> Result<Vec<LogbookEntry>> {
        self.fetch(Operation::LogbookFetch(FetchRequest {}), url).await
    }
}

#[async_trait]
impl RecordUploader for SyncClient {
    async fn upload(&self, operation: &Operation, url: &str) -> UploadResult {
        match self.send(operation, url).await {
            Ok(response) => UploadResult::succeeded(response.message.unwrap_or_default()),
            Err(e) => UploadResult::failed(&e),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use crate::http_client::RawResponse;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// 测试用：按顺序返回预设响应并记录请求体
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<RawResponse>>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub fn with(responses: Vec<Result<RawResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl RemoteTransport for ScriptedTransport {
        async fn post(&self, _url: &str, body: String) -> Result<RawResponse> {
            self.requests.lock().push(body);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(RawResponse::ok(r#"{"success":true}"#)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::ScriptedTransport;
    use super::*;
    use crate::http_client::RawResponse;

    const URL: &str = "https://example.com/exec";

    fn client(responses: Vec<Result<RawResponse>>) -> (SyncClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::with(responses));
        (SyncClient::new(transport.clone(), EndpointConfig::default()), transport)
    }

    fn op() -> Operation {
        Operation::SteelChange(SteelChange {
            id: "s1".into(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn placeholder_url_fails_without_network() {
        let (client, transport) = client(vec![]);
        for url in ["", "https://script.google.com/macros/s/INSERT_YOUR_SCRIPT_ID/exec"] {
            let err = client.send(&op(), url).await.unwrap_err();
            assert!(matches!(err, DrillSyncError::Configuration(_)));
        }
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn transport_failure_is_connectivity() {
        let (client, _) = client(vec![Err(DrillSyncError::Connectivity("dns".into()))]);
        let result = client.upload(&op(), URL).await;
        assert!(!result.success);
        assert_eq!(result.message, "Connection error: dns");
        assert_eq!(result.reason, Some(SyncFailureReason::Connectivity));
    }

    #[tokio::test]
    async fn non_2xx_is_connectivity() {
        let (client, _) = client(vec![Ok(RawResponse { status: 503, body: "{}".into() })]);
        let err = client.send(&op(), URL).await.unwrap_err();
        assert!(matches!(err, DrillSyncError::Connectivity(ref m) if m == "HTTP 503"));
    }

    #[tokio::test]
    async fn login_page_is_deployment_error_not_parse_error() {
        let (client, _) = client(vec![Ok(RawResponse::ok("<html><body>Sign in ... login</body></html>"))]);
        let err = client.send(&op(), URL).await.unwrap_err();
        assert!(matches!(err, DrillSyncError::RemoteDeployment(_)));
        assert!(err.to_string().starts_with("Permission error"));
    }

    #[tokio::test]
    async fn lowercase_doctype_after_preamble_is_deployment_error() {
        let (client, _) = client(vec![Ok(RawResponse::ok("Moved\n<!doctype html><html>login</html>"))]);
        let err = client.send(&op(), URL).await.unwrap_err();
        assert!(matches!(err, DrillSyncError::RemoteDeployment(_)));
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_response() {
        let (client, _) = client(vec![Ok(RawResponse::ok("oops"))]);
        let err = client.send(&op(), URL).await.unwrap_err();
        assert!(matches!(err, DrillSyncError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn remote_failure_message_passes_through() {
        let (client, _) = client(vec![Ok(RawResponse::ok(r#"{"success":false,"message":"Hoja bloqueada"}"#))]);
        let result = client.upload(&op(), URL).await;
        assert!(!result.success);
        assert_eq!(result.message, "Hoja bloqueada");
    }

    #[tokio::test]
    async fn success_sends_envelope() {
        let (client, transport) = client(vec![Ok(RawResponse::ok(r#"{"success":true,"message":"ok"}"#))]);
        let result = client.upload(&op(), URL).await;
        assert_eq!(result, UploadResult::succeeded("ok"));

        let sent: serde_json::Value = serde_json::from_str(&transport.requests.lock()[0]).unwrap();
        assert_eq!(sent["type"], "steel_change");
        assert_eq!(sent["data"]["id"], "s1");
    }

    #[tokio::test]
    async fn fetch_decodes_data_payload() {
        let body = r#"{"success":true,"data":[{"id":"m1","drillId":"111","barraSeguidoraSuperior":"6,4"}]}"#;
        let (client, _) = client(vec![Ok(RawResponse::ok(body))]);
        let measurements = client.measurements_fetch(URL).await.unwrap();
        assert_eq!(measurements.len(), 1);
        assert_eq!(measurements[0].barra_seguidora_superior, "6,4");
    }

    #[tokio::test]
    async fn fetch_without_data_is_empty() {
        let (client, _) = client(vec![
            Ok(RawResponse::ok(r#"{"success":true}"#)),
            Ok(RawResponse::ok(r#"{"success":true,"data":null}"#)),
        ]);
        assert!(client.logbook_fetch(URL).await.unwrap().is_empty());
        assert_eq!(client.inventory_fetch(URL).await.unwrap(), None);
    }

    #[tokio::test]
    async fn fetch_with_wrong_shape_is_invalid_response() {
        let (client, _) = client(vec![Ok(RawResponse::ok(r#"{"success":true,"data":"nope"}"#))]);
        let err = client.steel_changes_fetch(URL).await.unwrap_err();
        assert!(matches!(err, DrillSyncError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn logbook_photo_gets_default_name() {
        let (client, transport) = client(vec![]);
        let entry = LogbookEntry {
            id: "e1".into(),
            photo_base64: Some("AAAA".into()),
            ..Default::default()
        };
        client.logbook_entry(URL, &entry).await.unwrap();

        let sent: serde_json::Value = serde_json::from_str(&transport.requests.lock()[0]).unwrap();
        assert_eq!(sent["type"], "logbook_entry");
        assert_eq!(sent["data"]["photoName"], "bitacora_e1.jpg");
    }
}
