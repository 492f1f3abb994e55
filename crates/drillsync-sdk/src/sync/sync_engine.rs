//! 同步编排
//!
//! 一轮同步：
//! 1. 离线 → 直接结束（`Offline`），URL 未配置 → 直接结束（`NotConfigured`）
//! 2. 收集 pending 记录：班报 → 钢材更换 → 测量，类型内按存储顺序
//! 3. 逐条顺序上传，成功后立即标记已同步，再处理下一条
//! 4. 单条失败不会中断本轮，记录保持 pending 等待下一轮
//!
//! 同一时刻只运行一轮；并发调用会排队。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::DrillSyncError;
use crate::events::{EventManager, SyncEvent};
use crate::network::ConnectivityMonitor;
use crate::storage::entities::{Measurement, RecordKind, ShiftReport, SteelChange, SyncRecord};
use crate::storage::LocalStore;
use crate::wire::Operation;

use super::retry_policy::{RetryLedger, RetryPolicy, SyncFailureReason};
use super::sync_client::{RecordUploader, NOT_CONFIGURED};

/// 同步触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// 用户点击同步
    Manual,
    /// 网络恢复
    Connectivity,
}

/// 一轮同步的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// URL 未配置，未触碰任何记录
    NotConfigured { message: String },
    /// 离线，未触碰任何记录
    Offline,
    /// 没有 pending 记录
    NothingToSync,
    /// 尝试的记录全部成功
    Completed { succeeded: usize, deferred: usize },
    /// 部分失败，失败记录保持 pending
    PartialFailure {
        succeeded: usize,
        failed: usize,
        deferred: usize,
        last_error: String,
    },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Completed { .. } | SyncOutcome::NothingToSync)
    }

    pub fn succeeded(&self) -> usize {
        match self {
            SyncOutcome::Completed { succeeded, .. } | SyncOutcome::PartialFailure { succeeded, .. } => *succeeded,
            _ => 0,
        }
    }

    pub fn failed(&self) -> usize {
        match self {
            SyncOutcome::PartialFailure { failed, .. } => *failed,
            _ => 0,
        }
    }

    /// 面向用户的提示
    pub fn summary(&self) -> String {
        match self {
            SyncOutcome::NotConfigured { message } => format!("Sync not started: {}", message),
            SyncOutcome::Offline => "No internet connection. Records are saved locally.".to_string(),
            SyncOutcome::NothingToSync => "No pending records to upload.".to_string(),
            SyncOutcome::Completed { succeeded, deferred: 0 } => {
                format!("Sync complete: {} record(s) uploaded.", succeeded)
            }
            SyncOutcome::Completed { succeeded, deferred } => format!(
                "Sync complete: {} record(s) uploaded, {} waiting for retry.",
                succeeded, deferred
            ),
            SyncOutcome::PartialFailure {
                succeeded,
                failed,
                last_error,
                ..
            } => format!(
                "Finished with warnings. Uploaded: {}. Failed: {}. Last error: {}. \
                 Failed records are saved locally and will be retried.",
                succeeded, failed, last_error
            ),
        }
    }
}

/// 待上传的一条记录
#[derive(Debug, Clone)]
struct WorkItem {
    kind: RecordKind,
    id: String,
    operation: Operation,
}

/// 同步引擎
pub struct SyncEngine {
    store: Arc<LocalStore>,
    uploader: Arc<dyn RecordUploader>,
    network: Arc<ConnectivityMonitor>,
    events: Arc<EventManager>,
    ledger: RetryLedger,
    pass_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<LocalStore>,
        uploader: Arc<dyn RecordUploader>,
        network: Arc<ConnectivityMonitor>,
        events: Arc<EventManager>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            uploader,
            network,
            events,
            ledger: RetryLedger::new(policy),
            pass_lock: Mutex::new(()),
        }
    }

    /// 执行一轮同步
    pub async fn run_pass(&self, trigger: SyncTrigger) -> SyncOutcome {
        let _guard = self.pass_lock.lock().await;
        let outcome = self.run_pass_locked(trigger).await;
        self.events.emit(SyncEvent::PassFinished {
            trigger,
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn run_pass_locked(&self, trigger: SyncTrigger) -> SyncOutcome {
        if !self.network.is_online() {
            info!("离线状态，跳过同步 (trigger={:?})", trigger);
            return SyncOutcome::Offline;
        }

        let url = self.store.script_url().into_value();
        if self.store.endpoint().is_placeholder(&url) {
            let message = DrillSyncError::Configuration(NOT_CONFIGURED.to_string()).to_string();
            warn!("⚠️ {}", message);
            return SyncOutcome::NotConfigured { message };
        }

        let (work, deferred) = self.work_list(trigger);
        if work.is_empty() && deferred == 0 {
            info!("没有待上传的记录");
            return SyncOutcome::NothingToSync;
        }

        info!(
            "🔄 开始同步: trigger={:?}, attempting={}, deferred={}",
            trigger,
            work.len(),
            deferred
        );
        self.events.emit(SyncEvent::PassStarted {
            trigger,
            attempting: work.len(),
            deferred,
        });

        let mut succeeded = 0;
        let mut failed = 0;
        let mut last_error = String::new();

        for item in work {
            let result = self.uploader.upload(&item.operation, &url).await;

            if result.success {
                self.store.mark_synced(item.kind, &item.id);
                self.ledger.record_success(item.kind, &item.id);
                succeeded += 1;
                debug!("✅ 已同步: kind={}, id={}", item.kind, item.id);
                self.events.emit(SyncEvent::RecordSynced {
                    kind: item.kind,
                    id: item.id,
                });
            } else {
                let reason = result.reason.unwrap_or(SyncFailureReason::Rejected);
                let failures = self.ledger.record_failure(item.kind, &item.id, reason);
                failed += 1;
                warn!(
                    "❌ 上传失败: kind={}, id={}, attempts={}, error={}",
                    item.kind, item.id, failures, result.message
                );
                last_error = result.message.clone();
                self.events.emit(SyncEvent::RecordFailed {
                    kind: item.kind,
                    id: item.id,
                    message: result.message,
                });
            }
        }

        info!("同步结束: succeeded={}, failed={}, deferred={}", succeeded, failed, deferred);
        if failed == 0 {
            SyncOutcome::Completed { succeeded, deferred }
        } else {
            SyncOutcome::PartialFailure {
                succeeded,
                failed,
                deferred,
                last_error,
            }
        }
    }

    /// 按固定类型顺序收集本轮要尝试的记录，返回 (工作列表, 被退避跳过的数量)
    fn work_list(&self, trigger: SyncTrigger) -> (Vec<WorkItem>, usize) {
        let mut work = Vec::new();
        let mut deferred = 0;
        self.collect::<ShiftReport>(trigger, &mut work, &mut deferred);
        self.collect::<SteelChange>(trigger, &mut work, &mut deferred);
        self.collect::<Measurement>(trigger, &mut work, &mut deferred);
        (work, deferred)
    }

    fn collect<R>(&self, trigger: SyncTrigger, work: &mut Vec<WorkItem>, deferred: &mut usize)
    where
        R: SyncRecord + Into<Operation>,
    {
        for record in self.store.pending::<R>() {
            let id = record.id().to_string();
            if !self.ledger.should_attempt(R::KIND, &id, trigger) {
                *deferred += 1;
                continue;
            }
            work.push(WorkItem {
                kind: R::KIND,
                id,
                operation: record.into(),
            });
        }
    }

    /// 本次会话中某条记录的累计失败次数
    pub fn failure_count(&self, kind: RecordKind, id: &str) -> u32 {
        self.ledger.failures(kind, id)
    }

    pub fn reset_retry_state(&self) {
        self.ledger.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::test_helpers::DummyNetworkStatusListener;
    use crate::network::NetworkStatus;
    use crate::sdk::EndpointConfig;
    use crate::storage::entities::RecordStatus;
    use crate::storage::{MemoryKvBackend, SafeStorage};
    use crate::sync::sync_client::UploadResult;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use std::collections::HashSet;
    use std::time::Duration;

    const STUB_ERROR: &str = "Hoja de cálculo bloqueada";

    /// 对指定 id 返回失败，其余成功
    #[derive(Default)]
    struct StubUploader {
        failing_ids: SyncMutex<HashSet<String>>,
        calls: SyncMutex<Vec<(String, String)>>,
    }

    impl StubUploader {
        fn failing(ids: &[&str]) -> Self {
            Self {
                failing_ids: SyncMutex::new(ids.iter().map(|s| s.to_string()).collect()),
                calls: SyncMutex::new(Vec::new()),
            }
        }

        fn call_ids(&self) -> Vec<String> {
            self.calls.lock().iter().map(|(_, id)| id.clone()).collect()
        }
    }

    fn operation_id(operation: &Operation) -> String {
        match operation {
            Operation::ShiftReport(r) => r.id.clone(),
            Operation::SteelChange(s) => s.id.clone(),
            Operation::Measurement(m) => m.id.clone(),
            _ => String::new(),
        }
    }

    #[async_trait]
    impl RecordUploader for StubUploader {
        async fn upload(&self, operation: &Operation, _url: &str) -> UploadResult {
            let id = operation_id(operation);
            self.calls.lock().push((operation.tag().to_string(), id.clone()));
            if self.failing_ids.lock().contains(&id) {
                UploadResult::failed(&DrillSyncError::RemoteLogic(STUB_ERROR.to_string()))
            } else {
                UploadResult::succeeded("ok")
            }
        }
    }

    struct Harness {
        store: Arc<LocalStore>,
        uploader: Arc<StubUploader>,
        network: Arc<ConnectivityMonitor>,
        events: Arc<EventManager>,
        engine: SyncEngine,
    }

    fn harness_with(uploader: StubUploader, endpoint: EndpointConfig, base_delay_ms: u64) -> Harness {
        let store = Arc::new(LocalStore::new(SafeStorage::new(Box::new(MemoryKvBackend::new())), endpoint));
        let uploader = Arc::new(uploader);
        let network = Arc::new(ConnectivityMonitor::new(Arc::new(DummyNetworkStatusListener::new(
            NetworkStatus::Online,
        ))));
        network.set_status(NetworkStatus::Online);
        let events = Arc::new(EventManager::new(64));
        let policy = RetryPolicy {
            base_delay_ms,
            max_delay_ms: 600_000,
            backoff_factor: 2.0,
            jitter_factor: 0.0,
        };
        let engine = SyncEngine::new(store.clone(), uploader.clone(), network.clone(), events.clone(), policy);
        Harness {
            store,
            uploader,
            network,
            events,
            engine,
        }
    }

    fn harness(uploader: StubUploader) -> Harness {
        harness_with(uploader, EndpointConfig::default(), 600_000)
    }

    fn report(id: &str) -> ShiftReport {
        ShiftReport {
            id: id.to_string(),
            drill_id: "101".into(),
            ..Default::default()
        }
    }

    fn steel(id: &str) -> SteelChange {
        SteelChange {
            id: id.to_string(),
            ..Default::default()
        }
    }

    fn measurement(id: &str) -> Measurement {
        Measurement {
            id: id.to_string(),
            ..Default::default()
        }
    }

    fn status_of<R: SyncRecord>(store: &LocalStore, id: &str) -> Option<RecordStatus> {
        store.get_all::<R>().into_iter().find(|r| r.id() == id).map(|r| r.status())
    }

    #[tokio::test]
    async fn partial_failure_aggregates_and_keeps_failed_pending() {
        let h = harness(StubUploader::failing(&["r2"]));
        h.store.append(&report("r1"));
        h.store.append(&report("r2"));
        h.store.append(&steel("s1"));

        let outcome = h.engine.run_pass(SyncTrigger::Manual).await;

        assert_eq!(
            outcome,
            SyncOutcome::PartialFailure {
                succeeded: 2,
                failed: 1,
                deferred: 0,
                last_error: STUB_ERROR.to_string(),
            }
        );
        assert_eq!(status_of::<ShiftReport>(&h.store, "r1"), Some(RecordStatus::Synced));
        assert_eq!(status_of::<ShiftReport>(&h.store, "r2"), Some(RecordStatus::Pending));
        assert_eq!(status_of::<SteelChange>(&h.store, "s1"), Some(RecordStatus::Synced));
        assert_eq!(h.store.pending_count(), 1);
    }

    #[tokio::test]
    async fn nothing_pending_never_calls_the_client() {
        let h = harness(StubUploader::default());
        h.store.append(&steel("s1"));
        h.store.mark_synced(RecordKind::SteelChange, "s1");

        let outcome = h.engine.run_pass(SyncTrigger::Manual).await;

        assert_eq!(outcome, SyncOutcome::NothingToSync);
        assert!(h.uploader.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn records_are_sent_in_kind_order_then_creation_order() {
        let h = harness(StubUploader::default());
        h.store.append(&measurement("m1"));
        h.store.append(&steel("s1"));
        h.store.append(&report("r1"));
        h.store.append(&steel("s2"));
        h.store.append(&report("r2"));

        let outcome = h.engine.run_pass(SyncTrigger::Manual).await;

        assert_eq!(outcome, SyncOutcome::Completed { succeeded: 5, deferred: 0 });
        assert_eq!(h.uploader.call_ids(), vec!["r1", "r2", "s1", "s2", "m1"]);
        assert_eq!(h.store.pending_count(), 0);
    }

    #[tokio::test]
    async fn offline_aborts_before_touching_records() {
        let h = harness(StubUploader::default());
        h.store.append(&report("r1"));
        h.network.set_status(NetworkStatus::Offline);

        assert_eq!(h.engine.run_pass(SyncTrigger::Manual).await, SyncOutcome::Offline);
        assert!(h.uploader.calls.lock().is_empty());
        assert_eq!(h.store.pending_count(), 1);
    }

    #[tokio::test]
    async fn unconfigured_url_aborts_before_touching_records() {
        let endpoint = EndpointConfig {
            default_script_url: "https://script.google.com/macros/s/INSERT_YOUR_ID/exec".into(),
            ..EndpointConfig::default()
        };
        let h = harness_with(StubUploader::default(), endpoint, 0);
        h.store.append(&measurement("m1"));

        let outcome = h.engine.run_pass(SyncTrigger::Manual).await;
        assert!(matches!(outcome, SyncOutcome::NotConfigured { .. }));
        assert!(h.uploader.calls.lock().is_empty());

        // 保存有效 URL 后即可同步
        h.store.save_script_url("https://example.com/exec");
        assert_eq!(
            h.engine.run_pass(SyncTrigger::Manual).await,
            SyncOutcome::Completed { succeeded: 1, deferred: 0 }
        );
    }

    #[tokio::test]
    async fn failed_records_are_retried_on_the_next_manual_pass() {
        let h = harness(StubUploader::failing(&["s1"]));
        h.store.append(&steel("s1"));

        h.engine.run_pass(SyncTrigger::Manual).await;
        h.engine.run_pass(SyncTrigger::Manual).await;
        assert_eq!(h.engine.failure_count(RecordKind::SteelChange, "s1"), 2);

        h.uploader.failing_ids.lock().clear();
        let outcome = h.engine.run_pass(SyncTrigger::Manual).await;
        assert_eq!(outcome, SyncOutcome::Completed { succeeded: 1, deferred: 0 });
        assert_eq!(h.engine.failure_count(RecordKind::SteelChange, "s1"), 0);
        assert_eq!(h.uploader.call_ids(), vec!["s1", "s1", "s1"]);
    }

    #[tokio::test]
    async fn automatic_pass_defers_records_inside_backoff_window() {
        let h = harness(StubUploader::failing(&["r1"]));
        h.store.append(&report("r1"));
        h.store.append(&report("r2"));

        h.engine.run_pass(SyncTrigger::Manual).await;
        h.store.append(&report("r3"));

        let outcome = h.engine.run_pass(SyncTrigger::Connectivity).await;
        assert_eq!(outcome, SyncOutcome::Completed { succeeded: 1, deferred: 1 });
        assert_eq!(h.uploader.call_ids(), vec!["r1", "r2", "r3"]);
        assert_eq!(status_of::<ShiftReport>(&h.store, "r1"), Some(RecordStatus::Pending));
    }

    #[tokio::test]
    async fn pass_emits_progress_events() {
        let h = harness(StubUploader::failing(&["m1"]));
        let mut rx = h.events.subscribe();
        h.store.append(&steel("s1"));
        h.store.append(&measurement("m1"));

        h.engine.run_pass(SyncTrigger::Manual).await;

        let mut types = Vec::new();
        while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
            types.push(event.event_type());
        }
        assert_eq!(types, vec!["pass_started", "record_synced", "record_failed", "pass_finished"]);
    }

    #[test]
    fn outcome_summaries() {
        assert!(SyncOutcome::NothingToSync.is_success());
        let partial = SyncOutcome::PartialFailure {
            succeeded: 2,
            failed: 1,
            deferred: 0,
            last_error: "boom".into(),
        };
        assert!(!partial.is_success());
        assert_eq!(partial.succeeded(), 2);
        assert_eq!(partial.failed(), 1);
        assert!(partial.summary().contains("Last error: boom"));
    }
}
