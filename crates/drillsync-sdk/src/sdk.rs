//! 统一 SDK 接口 - DrillSyncSDK 主入口
//!
//! 分层架构：
//! ```text
//! DrillSyncSDK (业务入口)
//!   ├── LocalStore (本地存储层，sled + 内存兜底)
//!   ├── SyncClient (远端协议层，RemoteTransport)
//!   ├── SyncEngine (同步编排层)
//!   ├── ConnectivityMonitor (网络监控层)
//!   └── EventManager (事件系统层)
//! ```
//!
//! 设计原则：
//! - 离线优先：所有录入先落本地，同步失败不丢数据
//! - 配置显式传入：没有隐藏的全局状态
//! - 兜底显式化：存储降级、URL 回退都以 `Resolved` 返回

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{DrillSyncError, Result};
use crate::events::{EventManager, SyncEvent};
use crate::http_client::{HttpTransport, RemoteTransport};
use crate::inventory::InventoryCounts;
use crate::network::{ConnectivityMonitor, NetworkStatus, NetworkStatusEvent, NetworkStatusListener};
use crate::storage::{
    open_safe_storage, FallbackReason, InventoryData, LocalStore, LogbookEntry, Measurement, Resolved,
    ShiftReport, SteelChange,
};
use crate::sync::{RetryPolicy, SyncClient, SyncEngine, SyncOutcome, SyncTrigger};
use crate::wear::{self, WearStatus};
use crate::wire::RemoteResponse;

/// 出厂默认的远端脚本地址
pub const DEFAULT_SCRIPT_URL: &str =
    "https://script.google.com/macros/s/AKfycbzuYjBU0Va9nJ1ias4ZkGmVh-PBoZxN9_leNA3nhcOPQ8uXi7I2e8bmQLAxDmXv7tY/exec";

/// 默认网络状态监听器（假设网络始终在线）
///
/// 实际应用应由平台层提供真实的网络状态监听，或通过 `DrillSyncSDK::set_online` 推送变化。
#[derive(Debug)]
pub struct DefaultNetworkStatusListener {
    status: Arc<RwLock<NetworkStatus>>,
    sender: Arc<RwLock<Option<broadcast::Sender<NetworkStatusEvent>>>>,
}

impl Default for DefaultNetworkStatusListener {
    fn default() -> Self {
        Self {
            status: Arc::new(RwLock::new(NetworkStatus::Online)),
            sender: Arc::new(RwLock::new(None)),
        }
    }
}

#[async_trait]
impl NetworkStatusListener for DefaultNetworkStatusListener {
    async fn get_current_status(&self) -> NetworkStatus {
        *self.status.read().await
    }

    async fn start_monitoring(&self) -> Result<broadcast::Receiver<NetworkStatusEvent>> {
        let (sender, receiver) = broadcast::channel(16);
        *self.sender.write().await = Some(sender);
        Ok(receiver)
    }

    async fn stop_monitoring(&self) {
        *self.sender.write().await = None;
    }
}

/// 远端地址配置（URL 解析规则）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// 未保存 URL 时使用的默认地址
    pub default_script_url: String,
    /// URL 中包含此标记视为“未配置”
    pub placeholder_marker: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            default_script_url: DEFAULT_SCRIPT_URL.to_string(),
            placeholder_marker: "INSERT".to_string(),
        }
    }
}

impl EndpointConfig {
    /// 空值、`undefined`/`null` 字面量、含占位标记的 URL 都视为未配置
    pub fn is_placeholder(&self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() || url == "undefined" || url == "null" {
            return true;
        }
        !self.placeholder_marker.is_empty() && url.contains(&self.placeholder_marker)
    }
}

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 单次请求超时（秒），避免一条卡住的请求拖住整轮同步
    pub request_timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(60), // 远端会生成报告文档，耗时较长
            user_agent: crate::version::version_string(),
        }
    }
}

/// 重试配置（仅作用于自动同步）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 基础延迟（毫秒）
    pub base_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避因子
    pub backoff_factor: f64,
    /// 随机抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5_000,
            max_delay_ms: 300_000,
            backoff_factor: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// DrillSync SDK 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrillSyncConfig {
    /// 数据存储目录
    pub data_dir: PathBuf,
    /// 未保存 URL 时的默认远端地址
    pub default_script_url: String,
    /// 占位 URL 标记
    pub placeholder_marker: String,
    /// HTTP 客户端配置
    pub http_client_config: HttpClientConfig,
    /// 重试配置
    pub retry_config: RetryConfig,
    /// 事件缓冲区大小
    pub event_buffer_size: usize,
    /// 网络恢复时自动同步
    pub auto_sync: bool,
    /// 调试模式
    pub debug_mode: bool,
    /// 不使用持久化后端（测试 / 隐私模式）
    pub in_memory: bool,
}

impl Default for DrillSyncConfig {
    fn default() -> Self {
        let endpoint = EndpointConfig::default();
        Self {
            data_dir: get_default_data_dir(),
            default_script_url: endpoint.default_script_url,
            placeholder_marker: endpoint.placeholder_marker,
            http_client_config: HttpClientConfig::default(),
            retry_config: RetryConfig::default(),
            event_buffer_size: 256,
            auto_sync: true,
            debug_mode: false,
            in_memory: false,
        }
    }
}

/// 获取默认数据目录 ~/.drillsync/
fn get_default_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home_dir) => home_dir.join(".drillsync"),
        // 无法获取用户主目录时回退到当前目录
        None => PathBuf::from("./drillsync_data"),
    }
}

impl DrillSyncConfig {
    pub fn builder() -> DrillSyncConfigBuilder {
        DrillSyncConfigBuilder::new()
    }

    pub fn endpoint(&self) -> EndpointConfig {
        EndpointConfig {
            default_script_url: self.default_script_url.clone(),
            placeholder_marker: self.placeholder_marker.clone(),
        }
    }
}

/// DrillSync SDK 配置构建器
pub struct DrillSyncConfigBuilder {
    config: DrillSyncConfig,
}

impl Default for DrillSyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DrillSyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: DrillSyncConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn default_script_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.default_script_url = url.into();
        self
    }

    pub fn placeholder_marker<S: Into<String>>(mut self, marker: S) -> Self {
        self.config.placeholder_marker = marker.into();
        self
    }

    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http_client_config = config;
        self
    }

    /// 单次请求超时（秒）
    pub fn request_timeout(mut self, secs: u64) -> Self {
        self.config.http_client_config.request_timeout_secs = Some(secs);
        self
    }

    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.config.retry_config = config;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn auto_sync(mut self, enabled: bool) -> Self {
        self.config.auto_sync = enabled;
        self
    }

    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    pub fn in_memory(mut self, enabled: bool) -> Self {
        self.config.in_memory = enabled;
        self
    }

    pub fn build(self) -> DrillSyncConfig {
        self.config
    }
}

/// 统一 SDK 主接口
pub struct DrillSyncSDK {
    /// SDK 配置
    config: DrillSyncConfig,

    /// 本地存储
    store: Arc<LocalStore>,

    /// 持久化后端不可用时的原因（本次会话数据仅在内存中）
    storage_fallback: Option<FallbackReason>,

    /// 远端客户端（读写路径）
    client: Arc<SyncClient>,

    /// 同步编排
    engine: Arc<SyncEngine>,

    /// 网络监控
    network: Arc<ConnectivityMonitor>,

    /// 事件管理器
    event_manager: Arc<EventManager>,

    /// 网络状态转发任务
    network_task: Mutex<Option<JoinHandle<()>>>,
}

impl DrillSyncSDK {
    /// 使用默认 HTTP 传输与默认网络监听器初始化
    pub async fn initialize(config: DrillSyncConfig) -> Result<Arc<Self>> {
        Self::validate_config(&config)?;
        let transport: Arc<dyn RemoteTransport> = Arc::new(HttpTransport::new(&config.http_client_config)?);
        Self::initialize_with(config, transport, Arc::new(DefaultNetworkStatusListener::default())).await
    }

    /// 注入传输层与网络监听器（平台层 / 测试使用）
    ///
    /// 初始化顺序：
    /// 1. 存储层 → 2. 事件层 → 3. 网络层 → 4. 同步层
    pub async fn initialize_with(
        config: DrillSyncConfig,
        transport: Arc<dyn RemoteTransport>,
        network_listener: Arc<dyn NetworkStatusListener>,
    ) -> Result<Arc<Self>> {
        info!("正在初始化 DrillSyncSDK... {}", crate::version::version_string());
        Self::validate_config(&config)?;
        if config.debug_mode {
            info!("🔧 调试模式: {:?}", config);
        }

        // === 第1层：存储 ===
        let storage = open_safe_storage(&config.data_dir, config.in_memory).await;
        let storage_fallback = storage.fallback_reason().cloned();
        if let Some(reason) = &storage_fallback {
            warn!("⚠️ 本地持久化不可用，本次会话数据仅保存在内存中: {}", reason);
        }
        let store = Arc::new(LocalStore::new(storage.into_value(), config.endpoint()));

        // === 第2层：事件 ===
        let event_manager = Arc::new(EventManager::new(config.event_buffer_size));

        // === 第3层：网络监控 ===
        let network = Arc::new(ConnectivityMonitor::new(network_listener));
        network.start().await?;

        // === 第4层：同步 ===
        let client = Arc::new(SyncClient::new(transport, config.endpoint()));
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            client.clone(),
            network.clone(),
            event_manager.clone(),
            RetryPolicy::from(&config.retry_config),
        ));

        let sdk = Arc::new(Self {
            config,
            store,
            storage_fallback,
            client,
            engine,
            network,
            event_manager,
            network_task: Mutex::new(None),
        });

        sdk.spawn_network_watcher();

        info!(
            "✅ DrillSyncSDK 初始化完成 (persistent={}, pending={})",
            sdk.store.is_persistent(),
            sdk.store.pending_count()
        );
        Ok(sdk)
    }

    /// 验证配置
    fn validate_config(config: &DrillSyncConfig) -> Result<()> {
        if !config.in_memory && config.data_dir.as_os_str().is_empty() {
            return Err(DrillSyncError::Configuration("数据目录不能为空".to_string()));
        }
        if config.event_buffer_size == 0 {
            return Err(DrillSyncError::Configuration("事件缓冲区大小不能为0".to_string()));
        }
        if config.http_client_config.request_timeout_secs == Some(0) {
            return Err(DrillSyncError::Configuration("请求超时不能为0".to_string()));
        }
        Ok(())
    }

    /// 安装全局 tracing 订阅器（重复调用无副作用）
    pub fn init_tracing(debug: bool) {
        let default_level = if debug { "drillsync_sdk=debug" } else { "drillsync_sdk=info" };
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }

    /// 网络状态变化 → 事件广播；恢复在线时按配置触发自动同步
    fn spawn_network_watcher(&self) {
        let mut receiver = self.network.subscribe();
        let events = self.event_manager.clone();
        let engine: Weak<SyncEngine> = Arc::downgrade(&self.engine);
        let auto_sync = self.config.auto_sync;

        let handle = tokio::spawn(async move {
            loop {
                let event = match receiver.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("网络事件积压，跳过 {} 条", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let online = event.new_status.is_online();
                events.emit(SyncEvent::ConnectivityChanged {
                    online,
                    timestamp: event.timestamp,
                });

                if !(auto_sync && online && !event.old_status.is_online()) {
                    continue;
                }
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                info!("🌐 网络已恢复，开始自动同步");
                let outcome = engine.run_pass(SyncTrigger::Connectivity).await;
                debug!("自动同步结束: {:?}", outcome);
            }
        });

        *self.network_task.lock() = Some(handle);
    }

    pub fn config(&self) -> &DrillSyncConfig {
        &self.config
    }

    pub fn local_store(&self) -> &LocalStore {
        &self.store
    }

    /// 持久化后端是否降级为内存
    pub fn storage_fallback(&self) -> Option<&FallbackReason> {
        self.storage_fallback.as_ref()
    }

    // ========== 录入 ==========

    pub fn save_shift_report(&self, report: &ShiftReport) -> Resolved<()> {
        info!("保存班报: id={}, drill={}, holes={}", report.id, report.drill_id, report.holes.len());
        self.store.append(report)
    }

    pub fn save_steel_change(&self, change: &SteelChange) -> Resolved<()> {
        info!("保存钢材更换: id={}, drill={}", change.id, change.drill_id);
        self.store.append(change)
    }

    pub fn save_measurement(&self, measurement: &Measurement) -> Resolved<()> {
        info!("保存测量: id={}, drill={}", measurement.id, measurement.drill_id);
        self.store.append(measurement)
    }

    pub fn shift_reports(&self) -> Vec<ShiftReport> {
        self.store.get_all()
    }

    pub fn steel_changes(&self) -> Vec<SteelChange> {
        self.store.get_all()
    }

    pub fn measurements(&self) -> Vec<Measurement> {
        self.store.get_all()
    }

    /// 待上传记录总数（用于“未上传”提示条）
    pub fn pending_count(&self) -> usize {
        self.store.pending_count()
    }

    pub fn clear_synced(&self) -> usize {
        self.store.clear_synced()
    }

    // ========== 设置 ==========

    pub fn save_operator_name(&self, name: &str) -> Resolved<()> {
        self.store.save_operator_name(name)
    }

    pub fn saved_operator_name(&self) -> String {
        self.store.saved_operator_name()
    }

    pub fn save_script_url(&self, url: &str) -> Resolved<()> {
        info!("更新远端脚本地址");
        self.store.save_script_url(url)
    }

    pub fn script_url(&self) -> Resolved<String> {
        self.store.script_url()
    }

    // ========== 同步 ==========

    /// 手动同步：尝试全部待上传记录
    pub async fn sync_now(&self) -> SyncOutcome {
        self.engine.run_pass(SyncTrigger::Manual).await
    }

    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    /// 平台层推送网络状态
    pub fn set_online(&self, online: bool) {
        let status = if online { NetworkStatus::Online } else { NetworkStatus::Offline };
        self.network.set_status(status);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_manager.subscribe()
    }

    // ========== 远端读写（不进入同步队列） ==========

    /// 本地缓存的库存计数
    pub fn local_inventory(&self) -> Resolved<InventoryCounts> {
        self.store.cached_inventory()
    }

    pub fn save_local_inventory(&self, counts: &InventoryCounts) -> Resolved<()> {
        self.store.save_inventory(counts)
    }

    /// 上传库存快照；本地缓存先于上传更新
    pub async fn update_inventory(&self, inventory: &InventoryData) -> Result<RemoteResponse> {
        self.store.save_inventory(&inventory.inventory);
        let url = self.script_url().into_value();
        self.client.inventory_update(&url, inventory).await
    }

    /// 读取远端库存并刷新本地缓存；远端无数据时返回本地缓存
    pub async fn fetch_inventory(&self) -> Result<InventoryCounts> {
        let url = self.script_url().into_value();
        match self.client.inventory_fetch(&url).await? {
            Some(counts) if !counts.is_empty() => {
                self.store.save_inventory(&counts);
                Ok(counts)
            }
            _ => Ok(self.store.cached_inventory().into_value()),
        }
    }

    pub async fn fetch_measurements(&self) -> Result<Vec<Measurement>> {
        let url = self.script_url().into_value();
        self.client.measurements_fetch(&url).await
    }

    pub async fn fetch_steel_changes(&self) -> Result<Vec<SteelChange>> {
        let url = self.script_url().into_value();
        self.client.steel_changes_fetch(&url).await
    }

    pub async fn add_logbook_entry(&self, entry: &LogbookEntry) -> Result<RemoteResponse> {
        let url = self.script_url().into_value();
        self.client.logbook_entry(&url, entry).await
    }

    pub async fn fetch_logbook(&self) -> Result<Vec<LogbookEntry>> {
        let url = self.script_url().into_value();
        self.client.logbook_fetch(&url).await
    }

    // ========== 磨损 ==========

    /// 按远端测量数据计算整个机队的磨损状态
    pub async fn fleet_wear(&self) -> Result<BTreeMap<String, WearStatus>> {
        let measurements = self.fetch_measurements().await?;
        Ok(wear::fleet_status(&measurements))
    }

    /// 仅按本机录入的测量计算（离线可用）
    pub fn local_fleet_wear(&self) -> BTreeMap<String, WearStatus> {
        wear::fleet_status(&self.measurements())
    }

    // ========== 恢复 ==========

    /// 恢复出厂：清空全部本地数据（含内存兜底）与重试记录
    pub fn factory_reset(&self) -> Resolved<()> {
        warn!("🧹 执行恢复出厂，清空全部本地数据");
        let result = self.store.reset();
        self.engine.reset_retry_state();
        self.event_manager.emit(SyncEvent::LocalDataReset {
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        result
    }

    /// 停止网络监控与后台任务
    pub async fn shutdown(&self) {
        info!("正在关闭 DrillSyncSDK...");
        if let Some(handle) = self.network_task.lock().take() {
            handle.abort();
        }
        self.network.stop().await;
    }
}

impl Drop for DrillSyncSDK {
    fn drop(&mut self) {
        if let Some(handle) = self.network_task.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_detection() {
        let endpoint = EndpointConfig::default();
        assert!(endpoint.is_placeholder(""));
        assert!(endpoint.is_placeholder("  "));
        assert!(endpoint.is_placeholder("undefined"));
        assert!(endpoint.is_placeholder("https://script.google.com/macros/s/INSERT_YOUR_ID/exec"));
        assert!(!endpoint.is_placeholder(&endpoint.default_script_url));
        assert!(!endpoint.is_placeholder("https://example.com/exec"));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = DrillSyncConfig::builder()
            .data_dir("/tmp/drill")
            .default_script_url("https://example.com/exec")
            .request_timeout(5)
            .auto_sync(false)
            .in_memory(true)
            .build();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/drill"));
        assert_eq!(config.endpoint().default_script_url, "https://example.com/exec");
        assert_eq!(config.endpoint().placeholder_marker, "INSERT");
        assert_eq!(config.http_client_config.request_timeout_secs, Some(5));
        assert!(!config.auto_sync);
        assert!(config.in_memory);
    }

    #[test]
    fn default_timeouts_are_bounded() {
        let config = DrillSyncConfig::default();
        assert_eq!(config.http_client_config.connect_timeout_secs, Some(10));
        assert_eq!(config.http_client_config.request_timeout_secs, Some(60));
        assert!(config.http_client_config.user_agent.starts_with("drillsync-sdk/"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = DrillSyncConfig::builder().data_dir("").build();
        assert!(matches!(
            DrillSyncSDK::validate_config(&config),
            Err(DrillSyncError::Configuration(_))
        ));

        let config = DrillSyncConfig::builder().data_dir("").in_memory(true).build();
        assert!(DrillSyncSDK::validate_config(&config).is_ok());

        let config = DrillSyncConfig::builder().in_memory(true).request_timeout(0).build();
        assert!(DrillSyncSDK::validate_config(&config).is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = DrillSyncConfig::builder().debug_mode(true).build();
        let json = serde_json::to_string(&config).unwrap();
        let back: DrillSyncConfig = serde_json::from_str(&json).unwrap();
        assert!(back.debug_mode);
        assert_eq!(back.placeholder_marker, config.placeholder_marker);
    }
}
