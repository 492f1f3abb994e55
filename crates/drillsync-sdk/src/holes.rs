//! 孔位列表工具
//!
//! `recompute_cumulative` 是纯函数，所有修改孔位列表的方法都在修改后调用它，
//! 保证 `cumulative_meters` 始终是 `meters` 的前缀和。

use chrono::NaiveTime;

use crate::storage::entities::{
    default_diameter_for_drill, HoleRecord, RecordStatus, ShiftReport, ShiftType, TerrainType,
};
use crate::utils::generate_id;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// 重新计算累计米数；非有限的米数（NaN / 无穷）归零，JSON 无法表示它们
pub fn recompute_cumulative(holes: Vec<HoleRecord>) -> Vec<HoleRecord> {
    let mut running_total = 0.0;
    holes
        .into_iter()
        .map(|mut hole| {
            if !hole.meters.is_finite() {
                hole.meters = 0.0;
            }
            running_total += hole.meters;
            hole.cumulative_meters = running_total;
            hole
        })
        .collect()
}

fn parse_clock(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// 两个 HH:MM 之间的分钟数；结束早于开始视为跨零点
pub fn duration_minutes(start: &str, end: &str) -> Option<u32> {
    let start = parse_clock(start)?;
    let end = parse_clock(end)?;
    let mut seconds = (end - start).num_seconds();
    if seconds < 0 {
        seconds += MINUTES_PER_DAY * 60;
    }
    Some(((seconds as f64) / 60.0).round() as u32)
}

/// 新建下一孔：孔号 = 上一孔 + 1，开始时间 = 上一孔结束时间
pub fn next_hole(previous: Option<&HoleRecord>, now: &str) -> HoleRecord {
    let (hole_number, start_time) = match previous {
        Some(prev) => {
            let number = prev.hole_number.trim().parse::<u32>().unwrap_or(0) + 1;
            (number.to_string(), prev.end_time.clone())
        }
        None => ("1".to_string(), now.to_string()),
    };
    let duration = duration_minutes(&start_time, now).unwrap_or(0);
    HoleRecord {
        id: generate_id(),
        hole_number,
        meters: 0.0,
        cumulative_meters: 0.0,
        start_time,
        end_time: now.to_string(),
        duration_minutes: duration,
        terrain: TerrainType::Medio,
        pulldown: String::new(),
        rpm: String::new(),
        comments: String::new(),
    }
}

impl ShiftReport {
    /// 新的班报草稿；钻头直径按钻机编号预填
    pub fn draft(date: &str, shift: ShiftType, drill_id: &str, operator_name: &str) -> Self {
        let bit_diameter = default_diameter_for_drill(drill_id)
            .map(|d| d.as_str().to_string())
            .unwrap_or_default();
        Self {
            id: generate_id(),
            date: date.to_string(),
            shift,
            drill_id: drill_id.to_string(),
            operator_name: operator_name.to_string(),
            bit_diameter,
            status: RecordStatus::Draft,
            ..Default::default()
        }
    }

    /// 追加一孔并返回其 id
    pub fn add_hole(&mut self, now: &str) -> String {
        let hole = next_hole(self.holes.last(), now);
        let id = hole.id.clone();
        let mut holes = std::mem::take(&mut self.holes);
        holes.push(hole);
        self.holes = recompute_cumulative(holes);
        id
    }

    /// 修改某孔米数；找不到 id 时返回 `false`
    pub fn set_hole_meters(&mut self, hole_id: &str, meters: f64) -> bool {
        let Some(hole) = self.holes.iter_mut().find(|h| h.id == hole_id) else {
            return false;
        };
        hole.meters = if meters.is_finite() { meters } else { 0.0 };
        self.holes = recompute_cumulative(std::mem::take(&mut self.holes));
        true
    }

    /// 修改某孔起止时间并重新计算时长
    pub fn set_hole_times(&mut self, hole_id: &str, start: &str, end: &str) -> bool {
        let Some(hole) = self.holes.iter_mut().find(|h| h.id == hole_id) else {
            return false;
        };
        hole.start_time = start.to_string();
        hole.end_time = end.to_string();
        if let Some(minutes) = duration_minutes(start, end) {
            hole.duration_minutes = minutes;
        }
        true
    }

    /// 删除某孔
    pub fn remove_hole(&mut self, hole_id: &str) -> bool {
        let before = self.holes.len();
        let remaining: Vec<HoleRecord> = std::mem::take(&mut self.holes)
            .into_iter()
            .filter(|h| h.id != hole_id)
            .collect();
        let removed = remaining.len() != before;
        self.holes = recompute_cumulative(remaining);
        removed
    }
}
