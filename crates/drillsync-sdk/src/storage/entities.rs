//! 数据实体定义
//!
//! 本地存储与远端 JSON 使用同一套字段名（camelCase），
//! 以便读取旧版 Web 客户端写入的数据。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// 编辑中（仅班报表单使用，不进入同步队列）
    Draft,
    /// 已保存到本地，等待上传
    #[default]
    Pending,
    /// 远端已确认
    Synced,
}

impl RecordStatus {
    pub fn is_pending(self) -> bool {
        self == RecordStatus::Pending
    }
}

/// 参与同步队列的记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    ShiftReport,
    SteelChange,
    Measurement,
}

impl RecordKind {
    /// 同步顺序：班报 → 钢材更换 → 测量
    pub const SYNC_ORDER: [RecordKind; 3] = [
        RecordKind::ShiftReport,
        RecordKind::SteelChange,
        RecordKind::Measurement,
    ];

    /// 远端操作标签
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShiftReport => "shift_report",
            Self::SteelChange => "steel_change",
            Self::Measurement => "measurement",
        }
    }

    /// 本地存储 key
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::ShiftReport => super::keys::REPORTS,
            Self::SteelChange => super::keys::STEEL_CHANGES,
            Self::Measurement => super::keys::MEASUREMENTS,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 可同步记录的公共行为
pub trait SyncRecord: Clone + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static {
    const KIND: RecordKind;

    fn id(&self) -> &str;
    fn status(&self) -> RecordStatus;
    fn set_status(&mut self, status: RecordStatus);

    /// 保存前整理字段，保证写入的 JSON 能被原样读回
    fn normalize(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShiftType {
    #[default]
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TerrainType {
    Blando,
    #[default]
    Medio,
    Duro,
}

/// 钢材组件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SteelType {
    #[default]
    Amortiguador,
    #[serde(rename = "Adaptador superior")]
    AdaptadorSuperior,
    #[serde(rename = "Barra Seguidora")]
    BarraSeguidora,
    #[serde(rename = "Barra Patera")]
    BarraPatera,
    #[serde(rename = "Adaptador inferior")]
    AdaptadorInferior,
    #[serde(rename = "Anillo Guia")]
    AnilloGuia,
    Tricono,
}

impl SteelType {
    pub const ALL: [SteelType; 7] = [
        SteelType::Amortiguador,
        SteelType::AdaptadorSuperior,
        SteelType::BarraSeguidora,
        SteelType::BarraPatera,
        SteelType::AdaptadorInferior,
        SteelType::AnilloGuia,
        SteelType::Tricono,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amortiguador => "Amortiguador",
            Self::AdaptadorSuperior => "Adaptador superior",
            Self::BarraSeguidora => "Barra Seguidora",
            Self::BarraPatera => "Barra Patera",
            Self::AdaptadorInferior => "Adaptador inferior",
            Self::AnilloGuia => "Anillo Guia",
            Self::Tricono => "Tricono",
        }
    }
}

/// 钻头直径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Diameter {
    #[serde(rename = "7 7/8\"")]
    D7_78,
    #[default]
    #[serde(rename = "10 5/8\"")]
    D10_58,
}

impl Diameter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::D7_78 => "7 7/8\"",
            Self::D10_58 => "10 5/8\"",
        }
    }
}

/// 钻机编号
pub const DRILL_FLEET: [&str; 8] = ["101", "102", "103", "104", "105", "106", "111", "112"];

/// 按钻机编号推断钻头直径：101–106 → 10 5/8"，111–112 → 7 7/8"
pub fn default_diameter_for_drill(drill_id: &str) -> Option<Diameter> {
    let number: u32 = drill_id.trim().parse().ok()?;
    match number {
        101..=106 => Some(Diameter::D10_58),
        111..=112 => Some(Diameter::D7_78),
        _ => None,
    }
}

/// 单孔记录
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HoleRecord {
    pub id: String,
    pub hole_number: String,
    pub meters: f64,
    /// 前缀和，由 `holes::recompute_cumulative` 维护
    pub cumulative_meters: f64,
    /// HH:MM
    pub start_time: String,
    /// HH:MM
    pub end_time: String,
    pub duration_minutes: u32,
    pub terrain: TerrainType,
    pub pulldown: String,
    pub rpm: String,
    pub comments: String,
}

/// 班报
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShiftReport {
    pub id: String,
    pub date: String,
    pub shift: ShiftType,
    pub drill_id: String,
    pub operator_name: String,
    pub bench: String,
    pub phase: String,
    pub mesh: String,
    pub bit_brand: String,
    pub bit_model: String,
    pub bit_serial: String,
    pub bit_diameter: String,
    pub holes: Vec<HoleRecord>,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
}

impl ShiftReport {
    /// 班次总米数
    pub fn total_meters(&self) -> f64 {
        self.holes.iter().map(|h| h.meters).sum()
    }
}

impl SyncRecord for ShiftReport {
    const KIND: RecordKind = RecordKind::ShiftReport;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> RecordStatus {
        self.status
    }

    fn set_status(&mut self, status: RecordStatus) {
        self.status = status;
    }

    fn normalize(&mut self) {
        self.holes = crate::holes::recompute_cumulative(std::mem::take(&mut self.holes));
    }
}

/// 钢材更换记录
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SteelChange {
    pub id: String,
    pub date: String,
    pub drill_id: String,
    pub shift: ShiftType,
    pub steel_type: SteelType,
    pub serial_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub comments: String,
    pub status: RecordStatus,
}

impl SyncRecord for SteelChange {
    const KIND: RecordKind = RecordKind::SteelChange;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> RecordStatus {
        self.status
    }

    fn set_status(&mut self, status: RecordStatus) {
        self.status = status;
    }
}

/// 尺寸测量记录（读数以文本保存，允许逗号小数点）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Measurement {
    pub id: String,
    pub date: String,
    pub shift: ShiftType,
    pub drill_id: String,
    pub barra_seguidora_superior: String,
    pub barra_seguidora_medio: String,
    pub barra_seguidora_inferior: String,
    #[serde(rename = "barraPatéraSuperior")]
    pub barra_patera_superior: String,
    #[serde(rename = "barraPatéraMedio")]
    pub barra_patera_medio: String,
    #[serde(rename = "barraPatéraInferior")]
    pub barra_patera_inferior: String,
    pub adaptador_inferior_medio: String,
    pub status: RecordStatus,
}

impl Measurement {
    /// 七个读数，顺序固定
    pub fn readings(&self) -> [&str; 7] {
        [
            &self.barra_seguidora_superior,
            &self.barra_seguidora_medio,
            &self.barra_seguidora_inferior,
            &self.barra_patera_superior,
            &self.barra_patera_medio,
            &self.barra_patera_inferior,
            &self.adaptador_inferior_medio,
        ]
    }
}

impl SyncRecord for Measurement {
    const KIND: RecordKind = RecordKind::Measurement;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> RecordStatus {
        self.status
    }

    fn set_status(&mut self, status: RecordStatus) {
        self.status = status;
    }
}

/// 库存条目（按直径计数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InventoryItem {
    pub d1: u32,
    pub d2: u32,
}

/// 库存快照（只写 / 只读，不进入同步队列）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryData {
    pub date: String,
    pub inventory: BTreeMap<String, InventoryItem>,
}

/// 日志簿条目（只写，不进入同步队列）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogbookEntry {
    pub id: String,
    pub date: String,
    pub title: String,
    pub description: String,
    pub responsible: String,
    /// 上传时携带的 base64 附图
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_name: Option<String>,
    /// 远端返回的附图地址（仅读取时出现）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl LogbookEntry {
    /// 未命名附图时使用 `bitacora_<id>.jpg`
    pub fn effective_photo_name(&self) -> Option<String> {
        self.photo_base64.as_ref()?;
        Some(
            self.photo_name
                .clone()
                .unwrap_or_else(|| format!("bitacora_{}.jpg", self.id)),
        )
    }
}
