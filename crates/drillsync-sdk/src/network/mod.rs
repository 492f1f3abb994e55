//! 网络监控
//!
//! 平台层通过 `NetworkStatusListener` 推送网络变化；启动时读取一次当前状态，
//! 之后只在状态真正变化时广播。该信号只用于门控同步和界面提示，
//! 真正的网络可用性以 `SyncClient` 的传输错误为准。

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::Result;

/// 网络状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    pub fn is_online(self) -> bool {
        self == NetworkStatus::Online
    }
}

/// 网络状态变化事件
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkStatusEvent {
    pub old_status: NetworkStatus,
    pub new_status: NetworkStatus,
    /// 毫秒时间戳
    pub timestamp: i64,
}

impl NetworkStatusEvent {
    pub fn new(old_status: NetworkStatus, new_status: NetworkStatus) -> Self {
        Self {
            old_status,
            new_status,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 网络状态监听器trait（由平台层实现）
#[async_trait]
pub trait NetworkStatusListener: Send + Sync + std::fmt::Debug {
    /// 获取当前网络状态
    async fn get_current_status(&self) -> NetworkStatus;

    /// 开始监听网络状态变化
    async fn start_monitoring(&self) -> Result<broadcast::Receiver<NetworkStatusEvent>>;

    /// 停止监听
    async fn stop_monitoring(&self);
}

/// 网络监控
#[derive(Debug)]
pub struct ConnectivityMonitor {
    listener: Arc<dyn NetworkStatusListener>,
    status_sender: broadcast::Sender<NetworkStatusEvent>,
    current_status: Arc<RwLock<NetworkStatus>>,
}

impl ConnectivityMonitor {
    pub fn new(listener: Arc<dyn NetworkStatusListener>) -> Self {
        let (status_sender, _) = broadcast::channel(64);

        Self {
            listener,
            status_sender,
            current_status: Arc::new(RwLock::new(NetworkStatus::Offline)),
        }
    }

    /// 读取初始状态并开始转发平台事件
    pub async fn start(&self) -> Result<()> {
        let initial = self.listener.get_current_status().await;
        *self.current_status.write() = initial;
        info!("网络初始状态: {:?}", initial);

        let mut receiver = self.listener.start_monitoring().await?;
        let status_sender = self.status_sender.clone();
        let current_status = self.current_status.clone();

        tokio::spawn(async move {
            loop {
                let event = match receiver.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if let Some(event) = transition(&current_status, event.new_status) {
                    let _ = status_sender.send(event);
                }
            }
            debug!("平台网络事件通道已关闭");
        });

        Ok(())
    }

    pub async fn stop(&self) {
        self.listener.stop_monitoring().await;
    }

    pub fn status(&self) -> NetworkStatus {
        *self.current_status.read()
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online()
    }

    /// 手动设置网络状态；与当前状态相同时不广播
    pub fn set_status(&self, new_status: NetworkStatus) {
        if let Some(event) = transition(&self.current_status, new_status) {
            let _ = self.status_sender.send(event);
        }
    }

    /// 订阅网络状态变化
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkStatusEvent> {
        self.status_sender.subscribe()
    }
}

fn transition(current: &RwLock<NetworkStatus>, new_status: NetworkStatus) -> Option<NetworkStatusEvent> {
    let mut status = current.write();
    if *status == new_status {
        return None;
    }
    let event = NetworkStatusEvent::new(*status, new_status);
    *status = new_status;
    info!("网络状态变化: {:?} → {:?}", event.old_status, event.new_status);
    Some(event)
}
