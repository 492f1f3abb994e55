//! KV 存储模块 - 基于 sled 的持久化键值存储
//!
//! 本模块提供：
//! - `KvBackend`：字符串键值后端抽象（同步调用，调用方在返回前完成读写）
//! - `KvStore`：sled 实现，数据落盘，跨重启保留
//! - `MemoryKvBackend`：纯内存实现，用于隐私模式和测试

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use sled::{Db, Tree};
use tracing::{debug, info};

use crate::error::{DrillSyncError, Result};

/// sled 中存放应用数据的 Tree 名称
const APP_TREE: &str = "drillsync";

/// 字符串键值后端
pub trait KvBackend: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    /// 清空本应用的全部数据
    fn clear(&self) -> Result<()>;
}

/// sled KV 存储
#[derive(Debug)]
pub struct KvStore {
    path: PathBuf,
    /// 主数据库实例
    db: Db,
    /// 应用数据 Tree
    tree: Tree,
}

impl KvStore {
    /// 打开（或创建）`<base_path>/kv` 下的 sled 数据库
    pub async fn open(base_path: &Path) -> Result<Self> {
        let kv_path = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path)
            .await
            .map_err(|e| DrillSyncError::Storage(format!("创建 KV 存储目录失败: {}", e)))?;

        // 上一个进程可能刚释放文件锁，带退避重试
        const MAX_OPEN_RETRIES: u32 = 5;
        const RETRY_DELAY_MS: u64 = 100;
        let mut last_err: Option<sled::Error> = None;
        let mut opened: Option<Db> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&kv_path) {
                Ok(db) => {
                    opened = Some(db);
                    break;
                }
                Err(e) => {
                    let msg = e.to_string();
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        debug!("sled 被占用，{}ms 后重试 (attempt={})", delay_ms, attempt + 1);
                        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }

        let db = opened.ok_or_else(|| {
            DrillSyncError::Storage(
                last_err
                    .map(|e| format!("打开 sled 数据库失败: {}", e))
                    .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
            )
        })?;
        let tree = db.open_tree(APP_TREE)?;

        info!("KV 存储已打开: {}", kv_path.display());

        Ok(Self { path: kv_path, db, tree })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 键数量
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// 刷盘
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl KvBackend for KvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.tree.get(key)? {
            Some(bytes) => {
                let value = String::from_utf8(bytes.to_vec()).map_err(|e| DrillSyncError::CorruptState {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.tree.insert(key, value.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.tree.remove(key)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.tree.clear()?;
        self.tree.flush()?;
        Ok(())
    }
}

/// 纯内存后端
#[derive(Debug, Default)]
pub struct MemoryKvBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKvBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryKvBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}
