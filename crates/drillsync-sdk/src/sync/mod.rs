//! 同步模块
//!
//! - `sync_client`：单条操作的发送与结果分类，以及远端读写路径
//! - `retry_policy`：自动同步的退避规则
//! - `sync_engine`：一轮同步的编排

pub mod retry_policy;
pub mod sync_client;
pub mod sync_engine;

pub use retry_policy::{RetryLedger, RetryPolicy, SyncFailureReason};
pub use sync_client::{RecordUploader, SyncClient, UploadResult};
pub use sync_engine::{SyncEngine, SyncOutcome, SyncTrigger};
