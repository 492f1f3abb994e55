//! 本地记录存储
//!
//! 每种可同步记录保存为一个 JSON 数组（key 见 `storage::keys`）。
//! - 读取失败或数据损坏时返回空列表，绝不向上抛错
//! - 单条记录无法解析时只跳过这一条，原始 JSON 保留在存储中
//! - 追加时强制 `status = pending`，不检查 id 唯一性（由调用方保证）
//! - 标记已同步按 id 原地修改，不会重新追加，且不会从 synced 回退到 pending
//! - 主后端读取失败期间不做读-改-写，修改暂存在内存中，读取恢复后合并写回

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::entities::{Measurement, RecordKind, RecordStatus, ShiftReport, SteelChange, SyncRecord};
use super::keys;
use super::safe_storage::{FallbackReason, Resolved, SafeStorage};
use crate::inventory::{self, InventoryCounts};
use crate::sdk::EndpointConfig;

/// 旧版 Web 客户端可能写入的“空”字面量
fn is_blank_literal(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || trimmed == "undefined" || trimmed == "null"
}

fn is_read_failure<T>(resolved: &Resolved<T>) -> bool {
    matches!(resolved.fallback_reason(), Some(FallbackReason::ReadFailed(_)))
}

fn set_synced(item: &mut Value) -> bool {
    let already_synced = item.get("status").and_then(Value::as_str) == Some("synced");
    match item {
        Value::Object(fields) if !already_synced => {
            fields.insert("status".to_string(), Value::String("synced".to_string()));
            true
        }
        _ => false,
    }
}

fn item_id(item: &Value) -> Option<&str> {
    item.get("id").and_then(Value::as_str)
}

/// 去掉对象中值为 `null` 的字段（递归），让缺省值生效
fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        other => other.clone(),
    }
}

/// 解析单条记录；旧版客户端写入的 `null` 字段按缺省值处理
fn decode_record<R: SyncRecord>(item: &Value) -> serde_json::Result<R> {
    serde_json::from_value(strip_nulls(item))
}

/// 主后端读取失败期间积压的修改
#[derive(Debug, Default)]
struct Deferred {
    appended: HashMap<RecordKind, Vec<Value>>,
    synced: HashMap<RecordKind, HashSet<String>>,
}

impl Deferred {
    fn has(&self, kind: RecordKind) -> bool {
        self.appended.get(&kind).map_or(false, |v| !v.is_empty())
            || self.synced.get(&kind).map_or(false, |ids| !ids.is_empty())
    }

    /// 把积压的修改叠加到从存储读出的列表上
    fn apply(&self, kind: RecordKind, items: &mut Vec<Value>) {
        if let Some(appended) = self.appended.get(&kind) {
            items.extend(appended.iter().cloned());
        }
        if let Some(ids) = self.synced.get(&kind) {
            for item in items.iter_mut() {
                if item_id(item).map_or(false, |id| ids.contains(id)) {
                    set_synced(item);
                }
            }
        }
    }

    fn clear_kind(&mut self, kind: RecordKind) {
        self.appended.remove(&kind);
        self.synced.remove(&kind);
    }
}

/// 类型化的本地存储
#[derive(Debug)]
pub struct LocalStore {
    storage: SafeStorage,
    endpoint: EndpointConfig,
    /// 保证读-改-写在进程内不交错，同时保存读取失败期间的积压修改
    deferred: Mutex<Deferred>,
}

impl LocalStore {
    pub fn new(storage: SafeStorage, endpoint: EndpointConfig) -> Self {
        Self {
            storage,
            endpoint,
            deferred: Mutex::new(Deferred::default()),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.storage.is_persistent()
    }

    /// 读取某类记录的原始 JSON 列表（不含积压修改）
    fn load_raw(&self, kind: RecordKind) -> Resolved<Vec<Value>> {
        let key = kind.storage_key();
        let stored = self.storage.get(key);
        let storage_reason = stored.fallback_reason().cloned();

        let parsed = match stored.value().as_deref() {
            None => Ok(Vec::new()),
            Some(raw) if is_blank_literal(raw) => Ok(Vec::new()),
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Array(items)) => Ok(items),
                Ok(other) => Err(format!("expected array, found {}", json_type_name(&other))),
                Err(e) => Err(e.to_string()),
            },
        };

        match (parsed, storage_reason) {
            (Ok(items), None) => Resolved::Primary(items),
            (Ok(items), Some(reason)) => Resolved::Fallback(items, reason),
            (Err(reason), _) => {
                warn!("本地数据损坏，按空列表处理: key={}, reason={}", key, reason);
                Resolved::Fallback(Vec::new(), FallbackReason::Corrupt(reason))
            }
        }
    }

    /// 原始列表 + 积压修改
    fn load_merged(&self, kind: RecordKind, deferred: &Deferred) -> Resolved<Vec<Value>> {
        let raw = self.load_raw(kind);
        let reason = raw.fallback_reason().cloned();
        let mut items = raw.into_value();
        deferred.apply(kind, &mut items);
        match reason {
            None => Resolved::Primary(items),
            Some(reason) => Resolved::Fallback(items, reason),
        }
    }

    fn store_raw(&self, kind: RecordKind, items: &[Value]) -> Resolved<()> {
        match serde_json::to_string(items) {
            Ok(serialized) => self.storage.set(kind.storage_key(), &serialized),
            Err(e) => {
                warn!("序列化本地记录失败: kind={}, error={}", kind, e);
                Resolved::Fallback((), FallbackReason::Corrupt(e.to_string()))
            }
        }
    }

    /// 写回合并后的列表；写入（主后端或内存兜底）成功后积压修改即可丢弃
    fn store_merged(&self, kind: RecordKind, items: &[Value], deferred: &mut Deferred) -> Resolved<()> {
        let written = self.store_raw(kind, items);
        if !matches!(written.fallback_reason(), Some(FallbackReason::Corrupt(_))) {
            deferred.clear_kind(kind);
        }
        written
    }

    /// 读取某类记录（显式返回是否走了兜底路径）
    ///
    /// 无法解析的单条记录会被跳过并记录日志，不影响同类其他记录。
    pub fn load<R: SyncRecord>(&self) -> Resolved<Vec<R>> {
        let merged = {
            let deferred = self.deferred.lock();
            self.load_merged(R::KIND, &deferred)
        };
        let mut reason = merged.fallback_reason().cloned();

        let mut records = Vec::new();
        for (index, item) in merged.into_value().iter().enumerate() {
            match decode_record::<R>(item) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        "跳过无法解析的本地记录: kind={}, index={}, id={:?}, error={}",
                        R::KIND,
                        index,
                        item_id(item),
                        e
                    );
                    reason.get_or_insert(FallbackReason::Corrupt(e.to_string()));
                }
            }
        }

        match reason {
            None => Resolved::Primary(records),
            Some(reason) => Resolved::Fallback(records, reason),
        }
    }

    /// 读取某类全部记录；任何读取或解析错误都返回空列表
    pub fn get_all<R: SyncRecord>(&self) -> Vec<R> {
        self.load::<R>().into_value()
    }

    /// 读取某类待上传记录（保持存储顺序，即创建顺序）
    pub fn pending<R: SyncRecord>(&self) -> Vec<R> {
        self.get_all::<R>()
            .into_iter()
            .filter(|r| r.status().is_pending())
            .collect()
    }

    /// 追加一条记录，状态强制为 pending
    pub fn append<R: SyncRecord>(&self, record: &R) -> Resolved<()> {
        let mut record = record.clone();
        record.set_status(RecordStatus::Pending);
        record.normalize();

        let value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(e) => {
                warn!("序列化记录失败: kind={}, id={}, error={}", R::KIND, record.id(), e);
                return Resolved::Fallback((), FallbackReason::Corrupt(e.to_string()));
            }
        };

        let mut deferred = self.deferred.lock();
        let merged = self.load_merged(R::KIND, &deferred);
        if let Some(reason @ FallbackReason::ReadFailed(_)) = merged.fallback_reason().cloned() {
            warn!("⚠️ 读取本地存储失败，记录暂存内存待合并: kind={}, id={}", R::KIND, record.id());
            deferred.appended.entry(R::KIND).or_default().push(value);
            return Resolved::Fallback((), reason);
        }

        let mut items = merged.into_value();
        items.push(value);
        let written = self.store_merged(R::KIND, &items, &mut deferred);
        debug!("记录已保存到本地: kind={}, id={}, total={}", R::KIND, record.id(), items.len());
        written
    }

    /// 将指定 id 的记录标记为已同步；找不到时静默返回 `false`
    ///
    /// 读取失败时先记下 id，读取恢复后的第一次写入会带上这个标记。
    pub fn mark_synced(&self, kind: RecordKind, id: &str) -> bool {
        let mut deferred = self.deferred.lock();
        let merged = self.load_merged(kind, &deferred);
        if is_read_failure(&merged) {
            warn!("⚠️ 读取本地存储失败，已同步标记暂存内存: kind={}, id={}", kind, id);
            deferred.synced.entry(kind).or_default().insert(id.to_string());
            return true;
        }

        let had_deferred = deferred.has(kind);
        let mut items = merged.into_value();
        let mut changed = false;
        for item in items.iter_mut() {
            if item_id(item) == Some(id) && set_synced(item) {
                changed = true;
            }
        }

        if changed || had_deferred {
            self.store_merged(kind, &items, &mut deferred);
            debug!("记录已标记为已同步: kind={}, id={}", kind, id);
        }
        changed
    }

    /// 三类记录中待上传的总数
    pub fn pending_count(&self) -> usize {
        self.pending::<ShiftReport>().len()
            + self.pending::<SteelChange>().len()
            + self.pending::<Measurement>().len()
    }

    /// 删除已同步的记录，只保留 pending；读取失败的类型本次跳过
    pub fn clear_synced(&self) -> usize {
        let mut deferred = self.deferred.lock();
        let mut removed = 0;
        for kind in RecordKind::SYNC_ORDER {
            let merged = self.load_merged(kind, &deferred);
            if is_read_failure(&merged) {
                warn!("读取本地存储失败，跳过清理: kind={}", kind);
                continue;
            }
            let items = merged.into_value();
            let before = items.len();
            let kept: Vec<Value> = items
                .into_iter()
                .filter(|item| item.get("status").and_then(Value::as_str) != Some("synced"))
                .collect();
            removed += before - kept.len();
            self.store_merged(kind, &kept, &mut deferred);
        }
        info!("已清理本地已同步记录: {} 条", removed);
        removed
    }

    /// 清空本应用全部本地状态（灾难恢复用）
    pub fn reset(&self) -> Resolved<()> {
        let mut deferred = self.deferred.lock();
        *deferred = Deferred::default();
        warn!("清空全部本地数据");
        self.storage.clear()
    }

    pub fn save_operator_name(&self, name: &str) -> Resolved<()> {
        self.storage.set(keys::OPERATOR_NAME, name)
    }

    /// 未保存时返回空字符串
    pub fn saved_operator_name(&self) -> String {
        self.storage
            .get(keys::OPERATOR_NAME)
            .into_value()
            .filter(|name| !is_blank_literal(name))
            .unwrap_or_default()
    }

    pub fn save_script_url(&self, url: &str) -> Resolved<()> {
        self.storage.set(keys::SCRIPT_URL, url.trim())
    }

    /// 解析目标 URL：已保存的有效值 → 否则回退到默认 URL
    pub fn script_url(&self) -> Resolved<String> {
        let stored = self.storage.get(keys::SCRIPT_URL).into_value();
        match stored {
            Some(url) if is_blank_literal(&url) => {
                Resolved::Fallback(self.endpoint.default_script_url.clone(), FallbackReason::Missing)
            }
            Some(url) if self.endpoint.is_placeholder(&url) => {
                Resolved::Fallback(self.endpoint.default_script_url.clone(), FallbackReason::Placeholder)
            }
            Some(url) => Resolved::Primary(url),
            None => Resolved::Fallback(self.endpoint.default_script_url.clone(), FallbackReason::Missing),
        }
    }

    pub fn save_inventory(&self, counts: &InventoryCounts) -> Resolved<()> {
        match serde_json::to_string(counts) {
            Ok(serialized) => self.storage.set(keys::INVENTORY, &serialized),
            Err(e) => Resolved::Fallback((), FallbackReason::Corrupt(e.to_string())),
        }
    }

    /// 本地缓存的库存；缺失或损坏时返回全 0 的初始库存
    pub fn cached_inventory(&self) -> Resolved<InventoryCounts> {
        let stored = self.storage.get(keys::INVENTORY).into_value();
        let Some(raw) = stored.filter(|raw| !is_blank_literal(raw)) else {
            return Resolved::Fallback(inventory::empty_counts(), FallbackReason::Missing);
        };
        match serde_json::from_str::<Value>(&raw).ok().and_then(inventory::parse_counts) {
            Some(counts) => Resolved::Primary(counts),
            None => {
                warn!("库存缓存损坏，重新初始化");
                Resolved::Fallback(
                    inventory::empty_counts(),
                    FallbackReason::Corrupt("unreadable inventory cache".to_string()),
                )
            }
        }
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
