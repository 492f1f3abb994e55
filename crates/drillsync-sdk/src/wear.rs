//! 钢材磨损状态分级
//!
//! 根据某台钻机最近一次的尺寸测量和机型阈值，得出四级状态：
//! `no-data` / `ok` / `caution` / `critical`。
//!
//! 规则：
//! - 读数接受 `.` 或 `,` 作为小数点；空值、无法解析的值、字面量 `0` 都视为“未测量”并排除
//! - 任一读数低于红线 → critical（优先级最高）
//! - 全部读数高于绿线 → ok
//! - 其余 → caution

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::storage::entities::{Measurement, DRILL_FLEET};

/// 磨损状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WearStatus {
    NoData,
    Ok,
    Caution,
    Critical,
}

impl fmt::Display for WearStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WearStatus::NoData => "no-data",
            WearStatus::Ok => "ok",
            WearStatus::Caution => "caution",
            WearStatus::Critical => "critical",
        })
    }
}

/// 单个读数的等级（用于详情视图着色）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingLevel {
    NotMeasured,
    Ok,
    Caution,
    Critical,
}

/// 阈值（英寸）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WearThresholds {
    /// 高于此值为正常
    pub green: f64,
    /// 低于此值为危险
    pub red: f64,
}

impl WearThresholds {
    /// 111 / 112 号钻机（7 7/8" 钻头）
    pub const SMALL_BIT: WearThresholds = WearThresholds { green: 6.2, red: 5.9 };
    /// 其余钻机
    pub const LARGE_BIT: WearThresholds = WearThresholds { green: 8.9, red: 8.6 };

    /// 按钻机编号选取阈值
    pub fn for_drill(drill_id: &str) -> WearThresholds {
        match drill_id.trim() {
            "111" | "112" => Self::SMALL_BIT,
            _ => Self::LARGE_BIT,
        }
    }

    pub fn reading_level(&self, value: Option<f64>) -> ReadingLevel {
        match value {
            None => ReadingLevel::NotMeasured,
            Some(v) if v < self.red => ReadingLevel::Critical,
            Some(v) if v > self.green => ReadingLevel::Ok,
            Some(_) => ReadingLevel::Caution,
        }
    }
}

/// 解析读数；无效值与非正数（0 表示未测量）返回 `None`
pub fn parse_reading(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replacen(',', ".", 1);
    if normalized.is_empty() {
        return None;
    }
    let value: f64 = normalized.parse().ok()?;
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    Some(value)
}

/// 对一组已解析的读数分级
pub fn classify_values(values: &[f64], thresholds: WearThresholds) -> WearStatus {
    if values.is_empty() {
        return WearStatus::NoData;
    }
    if values.iter().any(|v| *v < thresholds.red) {
        WearStatus::Critical
    } else if values.iter().all(|v| *v > thresholds.green) {
        WearStatus::Ok
    } else {
        WearStatus::Caution
    }
}

/// 对一组原始读数分级
pub fn classify_readings<S: AsRef<str>>(readings: &[S], thresholds: WearThresholds) -> WearStatus {
    let values: Vec<f64> = readings
        .iter()
        .filter_map(|r| parse_reading(r.as_ref()))
        .collect();
    classify_values(&values, thresholds)
}

/// 对单条测量分级
pub fn classify_measurement(measurement: &Measurement, thresholds: WearThresholds) -> WearStatus {
    classify_readings(&measurement.readings(), thresholds)
}

/// 某台钻机的最新测量（列表中最后出现的一条）
pub fn latest_for_drill<'a>(drill_id: &str, measurements: &'a [Measurement]) -> Option<&'a Measurement> {
    measurements.iter().rev().find(|m| m.drill_id == drill_id)
}

/// 某台钻机的磨损状态
pub fn drill_status(drill_id: &str, measurements: &[Measurement]) -> WearStatus {
    match latest_for_drill(drill_id, measurements) {
        Some(latest) => classify_measurement(latest, WearThresholds::for_drill(drill_id)),
        None => WearStatus::NoData,
    }
}

/// 整个机队的磨损概览
pub fn fleet_status(measurements: &[Measurement]) -> BTreeMap<String, WearStatus> {
    DRILL_FLEET
        .iter()
        .map(|drill| (drill.to_string(), drill_status(drill, measurements)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: WearThresholds = WearThresholds { green: 8.9, red: 8.6 };

    #[test]
    fn all_above_green_is_ok() {
        assert_eq!(classify_values(&[9.0, 9.1, 9.2], T), WearStatus::Ok);
        assert_eq!(classify_readings(&["9.0", "9,1"], T), WearStatus::Ok);
    }

    #[test]
    fn red_takes_precedence() {
        assert_eq!(classify_values(&[9.0, 8.5], T), WearStatus::Critical);
    }

    #[test]
    fn between_thresholds_is_caution() {
        assert_eq!(classify_values(&[8.8, 9.0], T), WearStatus::Caution);
        assert_eq!(classify_values(&[9.0, 9.1, 8.7], T), WearStatus::Caution);
    }

    #[test]
    fn no_valid_readings_is_no_data() {
        assert_eq!(classify_values(&[], T), WearStatus::NoData);
        assert_eq!(classify_readings(&["", "abc", "0", "0,0"], T), WearStatus::NoData);
    }

    #[test]
    fn comma_decimal_separator() {
        assert_eq!(parse_reading("8,75"), Some(8.75));
        assert_eq!(parse_reading(" 9.1 "), Some(9.1));
        assert_eq!(parse_reading("0"), None);
        assert_eq!(parse_reading("x"), None);
        assert_eq!(parse_reading("-1"), None);
    }

    #[test]
    fn unmeasured_readings_are_excluded_not_zero() {
        // 0 不参与判断，否则会被误判为 critical
        assert_eq!(classify_readings(&["9.5", "0", "", "9.3"], T), WearStatus::Ok);
    }

    #[test]
    fn thresholds_follow_drill_model() {
        assert_eq!(WearThresholds::for_drill("111"), WearThresholds::SMALL_BIT);
        assert_eq!(WearThresholds::for_drill("112"), WearThresholds::SMALL_BIT);
        assert_eq!(WearThresholds::for_drill("101"), WearThresholds::LARGE_BIT);
    }

    #[test]
    fn reading_levels() {
        assert_eq!(T.reading_level(None), ReadingLevel::NotMeasured);
        assert_eq!(T.reading_level(Some(8.5)), ReadingLevel::Critical);
        assert_eq!(T.reading_level(Some(8.7)), ReadingLevel::Caution);
        assert_eq!(T.reading_level(Some(9.0)), ReadingLevel::Ok);
    }

    #[test]
    fn fleet_uses_latest_measurement_per_drill() {
        let old = Measurement {
            id: "m1".into(),
            drill_id: "111".into(),
            barra_seguidora_superior: "5.0".into(),
            ..Default::default()
        };
        let newer = Measurement {
            id: "m2".into(),
            drill_id: "111".into(),
            barra_seguidora_superior: "6,5".into(),
            barra_patera_medio: "6.3".into(),
            ..Default::default()
        };
        let other = Measurement {
            id: "m3".into(),
            drill_id: "101".into(),
            adaptador_inferior_medio: "8.8".into(),
            ..Default::default()
        };
        let measurements = vec![old, other, newer];

        assert_eq!(latest_for_drill("111", &measurements).map(|m| m.id.as_str()), Some("m2"));

        let fleet = fleet_status(&measurements);
        assert_eq!(fleet.len(), DRILL_FLEET.len());
        assert_eq!(fleet["111"], WearStatus::Ok);
        assert_eq!(fleet["101"], WearStatus::Caution);
        assert_eq!(fleet["105"], WearStatus::NoData);
    }

    #[test]
    fn status_display() {
        assert_eq!(WearStatus::NoData.to_string(), "no-data");
        assert_eq!(serde_json::to_value(WearStatus::Critical).unwrap(), "critical");
    }
}
