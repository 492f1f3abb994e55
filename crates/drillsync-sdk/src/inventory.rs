//! 库存计数
//!
//! 每种钢材按两个直径档计数：
//! - `d1`：6 1/2"（三牙钻头为 7 7/8"）
//! - `d2`：9 1/4"（三牙钻头为 10 5/8"）
//!
//! 计数永远不小于 0。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::storage::entities::{InventoryData, InventoryItem, SteelType};

/// 钢材名 → 计数
pub type InventoryCounts = BTreeMap<String, InventoryItem>;

/// 直径档
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventorySlot {
    D1,
    D2,
}

impl InventoryItem {
    pub fn get(&self, slot: InventorySlot) -> u32 {
        match slot {
            InventorySlot::D1 => self.d1,
            InventorySlot::D2 => self.d2,
        }
    }

    fn slot_mut(&mut self, slot: InventorySlot) -> &mut u32 {
        match slot {
            InventorySlot::D1 => &mut self.d1,
            InventorySlot::D2 => &mut self.d2,
        }
    }

    pub fn total(&self) -> u64 {
        u64::from(self.d1) + u64::from(self.d2)
    }
}

/// 全部钢材、计数为 0 的初始库存
pub fn empty_counts() -> InventoryCounts {
    SteelType::ALL
        .iter()
        .map(|steel| (steel.as_str().to_string(), InventoryItem::default()))
        .collect()
}

pub fn total_items(counts: &InventoryCounts) -> u64 {
    counts.values().map(InventoryItem::total).sum()
}

/// 解析本地缓存的库存
///
/// 旧版格式是 `{钢材: 数字}`，无法对应到直径档，按全 0 重新初始化。
pub fn parse_counts(value: Value) -> Option<InventoryCounts> {
    let Value::Object(map) = &value else {
        return None;
    };
    if map.values().next().map(Value::is_number).unwrap_or(false) {
        return Some(empty_counts());
    }
    serde_json::from_value(value).ok()
}

impl InventoryData {
    pub fn new(date: impl Into<String>, inventory: InventoryCounts) -> Self {
        Self {
            date: date.into(),
            inventory,
        }
    }

    /// 全部计数之和
    pub fn total_items(&self) -> u64 {
        total_items(&self.inventory)
    }

    /// 增减计数，结果不小于 0；返回新值
    pub fn adjust(&mut self, item: &str, slot: InventorySlot, delta: i64) -> u32 {
        let entry = self.inventory.entry(item.to_string()).or_default();
        let counter = entry.slot_mut(slot);
        let updated = (i64::from(*counter) + delta).clamp(0, i64::from(u32::MAX));
        *counter = updated as u32;
        *counter
    }

    /// 直接设置计数（负数按 0 处理）
    pub fn set(&mut self, item: &str, slot: InventorySlot, value: i64) -> u32 {
        let entry = self.inventory.entry(item.to_string()).or_default();
        let counter = entry.slot_mut(slot);
        *counter = value.clamp(0, i64::from(u32::MAX)) as u32;
        *counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn adjust_never_goes_below_zero() {
        let mut data = InventoryData::new("2024-06-01", empty_counts());
        let item = SteelType::ALL[0].as_str();

        assert_eq!(data.adjust(item, InventorySlot::D1, 3), 3);
        assert_eq!(data.adjust(item, InventorySlot::D1, -5), 0);
        assert_eq!(data.adjust(item, InventorySlot::D2, -1), 0);
        assert_eq!(data.set(item, InventorySlot::D2, -7), 0);
    }

    #[test]
    fn total_sums_both_slots() {
        let mut data = InventoryData::new("2024-06-01", empty_counts());
        data.adjust("Broca", InventorySlot::D1, 2);
        data.adjust("Broca", InventorySlot::D2, 1);
        data.set(SteelType::ALL[1].as_str(), InventorySlot::D2, 4);
        assert_eq!(data.total_items(), 7);
    }

    #[test]
    fn empty_counts_cover_every_steel_type() {
        let counts = empty_counts();
        assert_eq!(counts.len(), SteelType::ALL.len());
        assert_eq!(total_items(&counts), 0);
    }

    #[test]
    fn legacy_numeric_cache_is_reinitialised() {
        let counts = parse_counts(json!({"Broca": 4, "Barra": 2})).unwrap();
        assert_eq!(counts, empty_counts());

        let counts = parse_counts(json!({"Broca": {"d1": 1, "d2": 2}})).unwrap();
        assert_eq!(counts["Broca"], InventoryItem { d1: 1, d2: 2 });

        assert!(parse_counts(json!([1, 2])).is_none());
    }
}
