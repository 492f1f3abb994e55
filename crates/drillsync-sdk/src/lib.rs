//! DrillSync SDK - 离线优先的钻孔班报采集与同步
//!
//! 本 SDK 负责现场数据的本地保存与上传：
//! - 💾 本地存储：sled 持久化，失败时退化为内存存储，数据先落地再上传
//! - 🔄 同步编排：班报 → 换钢记录 → 测量记录，逐条上传、逐条标记
//! - 📡 网络监控：离线时不发请求，恢复在线时自动补传
//! - 🧭 错误分类：网络、部署（登录页）、非 JSON、业务拒绝分开报告
//! - 🔩 钻头磨损：按最新测量给每台钻机打 正常 / 注意 / 危险
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use drillsync_sdk::{DrillSyncConfig, DrillSyncSDK, ShiftReport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DrillSyncConfig::builder()
//!         .data_dir("/path/to/data")
//!         .default_script_url("https://script.google.com/macros/s/XXXX/exec")
//!         .build();
//!
//!     let sdk = DrillSyncSDK::initialize(config).await?;
//!
//!     // 先保存到本地
//!     let report = ShiftReport::draft("2024-06-01", Default::default(), "101", "Ana");
//!     sdk.save_shift_report(&report);
//!
//!     // 在线时上传
//!     let outcome = sdk.sync_now().await;
//!     println!("{}", outcome.summary());
//!
//!     sdk.shutdown().await;
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod error;
pub mod version;
pub mod storage;
pub mod holes;
pub mod inventory;
pub mod wear;
pub mod wire;
pub mod http_client;
pub mod network;
pub mod events;
pub mod sync;
pub mod sdk;
pub mod utils;


// 重新导出核心类型，方便使用
pub use error::{DrillSyncError, ErrorCategory, Result};
pub use sdk::{
    DefaultNetworkStatusListener, DrillSyncConfig, DrillSyncConfigBuilder, DrillSyncSDK,
    EndpointConfig, HttpClientConfig, RetryConfig, DEFAULT_SCRIPT_URL,
};
pub use storage::{
    default_diameter_for_drill, Diameter, FallbackReason, HoleRecord, InventoryData,
    InventoryItem, LocalStore, LogbookEntry, Measurement, RecordKind, RecordStatus, Resolved,
    SafeStorage, ShiftReport, ShiftType, SteelChange, SteelType, SyncRecord, TerrainType,
    DRILL_FLEET,
};
pub use inventory::{InventoryCounts, InventorySlot};
pub use wear::{ReadingLevel, WearStatus, WearThresholds};
pub use wire::{Operation, RemoteResponse};
pub use http_client::{HttpTransport, RawResponse, RemoteTransport};
pub use network::{ConnectivityMonitor, NetworkStatus, NetworkStatusEvent, NetworkStatusListener};
pub use events::{EventManager, SyncEvent};
pub use sync::{
    RecordUploader, SyncClient, SyncEngine, SyncFailureReason, SyncOutcome, SyncTrigger,
    UploadResult,
};
pub use utils::generate_id;
