//! 远端协议
//!
//! 每个操作都是一次 POST，请求体为 `{"type": <标签>, "data": <载荷>}`，
//! Content-Type 使用 `text/plain`（远端脚本平台对 `application/json` 会触发预检）。
//! 响应体为 `{"success": bool, "message"?: string, "data"?: any}`。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::storage::entities::{
    InventoryData, LogbookEntry, Measurement, RecordKind, ShiftReport, SteelChange,
};

/// 请求 Content-Type
pub const CONTENT_TYPE: &str = "text/plain;charset=utf-8";

/// 读取类操作的空载荷，序列化为 `{}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FetchRequest {}

/// 远端操作（一个标签对应一种强类型载荷）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Operation {
    ShiftReport(ShiftReport),
    SteelChange(SteelChange),
    Measurement(Measurement),
    InventoryUpdate(InventoryData),
    InventoryFetch(FetchRequest),
    MeasurementsFetch(FetchRequest),
    LogbookEntry(LogbookEntry),
    LogbookFetch(FetchRequest),
    SteelChangesFetch(FetchRequest),
}

impl Operation {
    /// 操作标签
    pub fn tag(&self) -> &'static str {
        match self {
            Operation::ShiftReport(_) => "shift_report",
            Operation::SteelChange(_) => "steel_change",
            Operation::Measurement(_) => "measurement",
            Operation::InventoryUpdate(_) => "inventory_update",
            Operation::InventoryFetch(_) => "inventory_fetch",
            Operation::MeasurementsFetch(_) => "measurements_fetch",
            Operation::LogbookEntry(_) => "logbook_entry",
            Operation::LogbookFetch(_) => "logbook_fetch",
            Operation::SteelChangesFetch(_) => "steel_changes_fetch",
        }
    }

    /// 同步队列中的记录类型；读写路径返回 `None`
    pub fn record_kind(&self) -> Option<RecordKind> {
        match self {
            Operation::ShiftReport(_) => Some(RecordKind::ShiftReport),
            Operation::SteelChange(_) => Some(RecordKind::SteelChange),
            Operation::Measurement(_) => Some(RecordKind::Measurement),
            _ => None,
        }
    }

    /// 序列化为请求体
    pub fn to_body(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<ShiftReport> for Operation {
    fn from(report: ShiftReport) -> Self {
        Operation::ShiftReport(report)
    }
}

impl From<SteelChange> for Operation {
    fn from(change: SteelChange) -> Self {
        Operation::SteelChange(change)
    }
}

impl From<Measurement> for Operation {
    fn from(measurement: Measurement) -> Self {
        Operation::Measurement(measurement)
    }
}

/// 远端响应
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemoteResponse {
    /// 缺失时按失败处理
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// 响应体是否是 HTML（登录页 / 错误页）
pub fn is_markup(body: &str) -> bool {
    body.trim_start().starts_with('<') || body.to_ascii_lowercase().contains("<!doctype html")
}
