//! 安全存储层
//!
//! 主后端（sled）不可用时（隐私模式、磁盘满、文件锁）不向上抛错，
//! 而是写入进程内的兜底表，保证本次会话照常工作；重启后兜底数据丢失。
//!
//! 兜底表覆盖在主后端之上：某个 key 一旦写入兜底表，后续读取优先返回兜底值，
//! 直到主后端重新写入成功。

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use tracing::warn;

use super::kv::KvBackend;

/// 走了兜底路径的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// 主后端不可用（写入失败或没有持久化后端）
    StorageUnavailable(String),
    /// 主后端读取失败：返回的空值不代表真实内容
    ReadFailed(String),
    /// 值缺失，使用默认值
    Missing,
    /// 值是占位符，使用默认值
    Placeholder,
    /// 值无法解析，使用默认值
    Corrupt(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::StorageUnavailable(e) => write!(f, "storage unavailable: {}", e),
            FallbackReason::ReadFailed(e) => write!(f, "storage read failed: {}", e),
            FallbackReason::Missing => write!(f, "value missing"),
            FallbackReason::Placeholder => write!(f, "placeholder value"),
            FallbackReason::Corrupt(e) => write!(f, "corrupt value: {}", e),
        }
    }
}

/// 显式的兜底结果：调用方与测试都能断言走了哪条路径
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<T> {
    Primary(T),
    Fallback(T, FallbackReason),
}

impl<T> Resolved<T> {
    pub fn value(&self) -> &T {
        match self {
            Resolved::Primary(v) | Resolved::Fallback(v, _) => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Resolved::Primary(v) | Resolved::Fallback(v, _) => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolved::Fallback(..))
    }

    pub fn fallback_reason(&self) -> Option<&FallbackReason> {
        match self {
            Resolved::Primary(_) => None,
            Resolved::Fallback(_, reason) => Some(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        match self {
            Resolved::Primary(v) => Resolved::Primary(f(v)),
            Resolved::Fallback(v, reason) => Resolved::Fallback(f(v), reason),
        }
    }
}

/// 主后端 + 内存兜底
#[derive(Debug)]
pub struct SafeStorage {
    primary: Option<Box<dyn KvBackend>>,
    memory: RwLock<HashMap<String, String>>,
}

impl SafeStorage {
    pub fn new(primary: Box<dyn KvBackend>) -> Self {
        Self {
            primary: Some(primary),
            memory: RwLock::new(HashMap::new()),
        }
    }

    /// 没有可用的持久化后端，所有数据只保存在内存中
    pub fn memory_only() -> Self {
        Self {
            primary: None,
            memory: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.primary.is_some()
    }

    pub fn get(&self, key: &str) -> Resolved<Option<String>> {
        if let Some(value) = self.memory.read().get(key) {
            return Resolved::Fallback(
                Some(value.clone()),
                FallbackReason::StorageUnavailable("value held in memory".to_string()),
            );
        }

        let Some(primary) = &self.primary else {
            return Resolved::Fallback(
                None,
                FallbackReason::StorageUnavailable("no persistent backend".to_string()),
            );
        };

        match primary.get(key) {
            Ok(value) => Resolved::Primary(value),
            Err(e) => {
                warn!("读取本地存储失败: key={}, error={}", key, e);
                Resolved::Fallback(None, FallbackReason::ReadFailed(e.to_string()))
            }
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Resolved<()> {
        let Some(primary) = &self.primary else {
            self.memory.write().insert(key.to_string(), value.to_string());
            return Resolved::Fallback((), FallbackReason::StorageUnavailable("no persistent backend".to_string()));
        };

        match primary.set(key, value) {
            Ok(()) => {
                self.memory.write().remove(key);
                Resolved::Primary(())
            }
            Err(e) => {
                warn!("写入本地存储失败，数据仅保存在内存中: key={}, error={}", key, e);
                self.memory.write().insert(key.to_string(), value.to_string());
                Resolved::Fallback((), FallbackReason::StorageUnavailable(e.to_string()))
            }
        }
    }

    /// 清空全部状态（主后端 + 兜底表）
    pub fn clear(&self) -> Resolved<()> {
        self.memory.write().clear();
        let Some(primary) = &self.primary else {
            return Resolved::Fallback((), FallbackReason::StorageUnavailable("no persistent backend".to_string()));
        };
        match primary.clear() {
            Ok(()) => Resolved::Primary(()),
            Err(e) => {
                warn!("清空本地存储失败: {}", e);
                Resolved::Fallback((), FallbackReason::StorageUnavailable(e.to_string()))
            }
        }
    }
}
