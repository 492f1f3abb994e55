//! 本地存储模块
//!
//! 分层：
//! ```text
//! LocalStore (类型化记录列表、设置项)
//!   └── SafeStorage (主后端 + 内存兜底)
//!         └── KvBackend (sled / 内存)
//! ```

pub mod entities;
pub mod kv;
pub mod local_store;
pub mod safe_storage;

pub use entities::{
    default_diameter_for_drill, Diameter, HoleRecord, InventoryData, InventoryItem, LogbookEntry,
    Measurement, RecordKind, RecordStatus, ShiftReport, ShiftType, SteelChange, SteelType,
    SyncRecord, TerrainType, DRILL_FLEET,
};
pub use kv::{KvBackend, KvStore, MemoryKvBackend};
pub use local_store::LocalStore;
pub use safe_storage::{FallbackReason, Resolved, SafeStorage};

use std::path::Path;
use tracing::warn;

/// 打开持久化存储；失败时退化为纯内存存储（本次会话可用，重启后丢失）
pub async fn open_safe_storage(data_dir: &Path, in_memory: bool) -> Resolved<SafeStorage> {
    if in_memory {
        return Resolved::Primary(SafeStorage::new(Box::new(MemoryKvBackend::new())));
    }
    match KvStore::open(data_dir).await {
        Ok(kv) => Resolved::Primary(SafeStorage::new(Box::new(kv))),
        Err(e) => {
            warn!("持久化存储不可用，数据仅保存在内存中: {}", e);
            Resolved::Fallback(
                SafeStorage::memory_only(),
                FallbackReason::StorageUnavailable(e.to_string()),
            )
        }
    }
}

/// 存储 key 常量（`_v1` 后缀对应 `version::STORAGE_LAYOUT_VERSION`）
pub mod keys {
    /// 班报列表
    pub const REPORTS: &str = "drill_reports_v1";
    /// 钢材更换列表
    pub const STEEL_CHANGES: &str = "steel_changes_v1";
    /// 测量列表
    pub const MEASUREMENTS: &str = "measurements_v1";
    /// 记住的操作员姓名
    pub const OPERATOR_NAME: &str = "saved_operator_name";
    /// 远端脚本 URL
    pub const SCRIPT_URL: &str = "script_url";
    /// 库存计数缓存
    pub const INVENTORY: &str = "drilllog_inventory";
}
