//! 重试策略
//!
//! 失败的记录永远保留为 pending，不会被丢弃。
//! - 手动同步：尝试全部 pending 记录
//! - 自动同步（网络恢复触发）：跳过仍处于退避窗口内的记录
//!
//! 退避记录只保存在内存中，进程重启后清零。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::DrillSyncError;
use crate::sdk::RetryConfig;
use crate::storage::entities::RecordKind;

use super::SyncTrigger;

/// 上传失败原因分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncFailureReason {
    /// 网络不可用 / 超时 / 非 2xx
    Connectivity,
    /// 远端返回登录页
    Deployment,
    /// 远端返回 `success: false`
    Rejected,
    /// 响应无法解析
    InvalidResponse,
    /// URL 未配置或本地序列化失败
    Local,
}

impl SyncFailureReason {
    /// 获取重试延迟倍数
    pub fn delay_multiplier(self) -> f64 {
        match self {
            SyncFailureReason::Connectivity => 1.0,
            SyncFailureReason::Rejected | SyncFailureReason::InvalidResponse => 2.0,
            // 需要人工修复部署，自动重试意义不大
            SyncFailureReason::Deployment | SyncFailureReason::Local => 4.0,
        }
    }
}

impl From<&DrillSyncError> for SyncFailureReason {
    fn from(error: &DrillSyncError) -> Self {
        match error {
            DrillSyncError::Connectivity(_) => SyncFailureReason::Connectivity,
            DrillSyncError::RemoteDeployment(_) => SyncFailureReason::Deployment,
            DrillSyncError::RemoteLogic(_) => SyncFailureReason::Rejected,
            DrillSyncError::InvalidResponse(_) => SyncFailureReason::InvalidResponse,
            _ => SyncFailureReason::Local,
        }
    }
}

/// 退避计算
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    /// 随机抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            backoff_factor: config.backoff_factor,
            jitter_factor: config.jitter_factor.clamp(0.0, 1.0),
        }
    }
}

impl RetryPolicy {
    /// 第 `failures` 次失败后的等待时间
    pub fn backoff(&self, failures: u32, reason: SyncFailureReason) -> Duration {
        let exponent = failures.saturating_sub(1) as f64;
        // 基础延迟 = base_delay * (backoff_factor ^ (failures - 1))
        let base_delay = self.base_delay_ms as f64 * self.backoff_factor.max(1.0).powf(exponent);
        let adjusted_delay = base_delay * reason.delay_multiplier();
        let capped_delay = adjusted_delay.min(self.max_delay_ms as f64);

        let jitter = capped_delay * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let final_delay = (capped_delay + jitter).max(0.0);
        Duration::from_millis(final_delay as u64)
    }
}

#[derive(Debug, Clone)]
struct RetryEntry {
    failures: u32,
    next_attempt_at: Instant,
}

/// 本次会话内的失败记录
#[derive(Debug)]
pub struct RetryLedger {
    policy: RetryPolicy,
    entries: Mutex<HashMap<(RecordKind, String), RetryEntry>>,
}

impl RetryLedger {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 本轮是否尝试该记录
    pub fn should_attempt(&self, kind: RecordKind, id: &str, trigger: SyncTrigger) -> bool {
        if trigger == SyncTrigger::Manual {
            return true;
        }
        match self.entries.lock().get(&(kind, id.to_string())) {
            Some(entry) => Instant::now() >= entry.next_attempt_at,
            None => true,
        }
    }

    /// 记录一次失败，返回累计失败次数
    pub fn record_failure(&self, kind: RecordKind, id: &str, reason: SyncFailureReason) -> u32 {
        let mut entries = self.entries.lock();
        let entry = entries.entry((kind, id.to_string())).or_insert(RetryEntry {
            failures: 0,
            next_attempt_at: Instant::now(),
        });
        entry.failures += 1;
        entry.next_attempt_at = Instant::now() + self.policy.backoff(entry.failures, reason);
        entry.failures
    }

    pub fn record_success(&self, kind: RecordKind, id: &str) {
        self.entries.lock().remove(&(kind, id.to_string()));
    }

    pub fn failures(&self, kind: RecordKind, id: &str) -> u32 {
        self.entries
            .lock()
            .get(&(kind, id.to_string()))
            .map(|entry| entry.failures)
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
