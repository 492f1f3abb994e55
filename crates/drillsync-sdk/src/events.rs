//! 事件系统
//!
//! 同步进度、网络变化、数据重置通过广播通道推送给界面层。
//! 没有订阅者时发送失败属于正常情况，只记 debug 日志。

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::storage::RecordKind;
use crate::sync::{SyncOutcome, SyncTrigger};

/// SDK 事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    ConnectivityChanged {
        online: bool,
        timestamp: i64,
    },
    PassStarted {
        trigger: SyncTrigger,
        /// 本轮将尝试的记录数
        attempting: usize,
        /// 因退避窗口未到而跳过的记录数
        deferred: usize,
    },
    RecordSynced {
        kind: RecordKind,
        id: String,
    },
    RecordFailed {
        kind: RecordKind,
        id: String,
        message: String,
    },
    PassFinished {
        trigger: SyncTrigger,
        outcome: SyncOutcome,
    },
    LocalDataReset {
        timestamp: i64,
    },
}

impl SyncEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::ConnectivityChanged { .. } => "connectivity_changed",
            SyncEvent::PassStarted { .. } => "pass_started",
            SyncEvent::RecordSynced { .. } => "record_synced",
            SyncEvent::RecordFailed { .. } => "record_failed",
            SyncEvent::PassFinished { .. } => "pass_finished",
            SyncEvent::LocalDataReset { .. } => "local_data_reset",
        }
    }
}

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    /// 总事件数
    pub total_events: u64,
    /// 按类型分组的事件数
    pub events_by_type: HashMap<String, u64>,
}

/// 事件管理器
#[derive(Debug)]
pub struct EventManager {
    sender: broadcast::Sender<SyncEvent>,
    stats: RwLock<EventStats>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            stats: RwLock::new(EventStats::default()),
        }
    }

    /// 发布事件
    pub fn emit(&self, event: SyncEvent) {
        debug!("Emitting event: {}", event.event_type());

        {
            let mut stats = self.stats.write();
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
        }

        if let Err(e) = self.sender.send(event) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn stats(&self) -> EventStats {
        self.stats.read().clone()
    }

    /// 获取活跃订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_still_counts() {
        let manager = EventManager::new(8);
        manager.emit(SyncEvent::LocalDataReset { timestamp: 1 });
        let stats = manager.stats();
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.events_by_type["local_data_reset"], 1);
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let manager = EventManager::new(8);
        let mut rx = manager.subscribe();
        assert_eq!(manager.subscriber_count(), 1);

        manager.emit(SyncEvent::RecordSynced {
            kind: RecordKind::SteelChange,
            id: "a".into(),
        });
        manager.emit(SyncEvent::ConnectivityChanged {
            online: false,
            timestamp: 2,
        });

        assert_eq!(rx.recv().await.unwrap().event_type(), "record_synced");
        assert_eq!(rx.recv().await.unwrap().event_type(), "connectivity_changed");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = SyncEvent::RecordFailed {
            kind: RecordKind::Measurement,
            id: "m1".into(),
            message: "Connection error: timeout".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "record_failed");
        assert_eq!(value["kind"], "measurement");
    }
}
