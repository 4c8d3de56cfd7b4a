// ==========================================
// 车队表格导入 - 记录查询API
// ==========================================
// 职责: 为对话助手与 KPI 看板提供最近一次导入结果的只读查询
// 红线: 只读；不修改、不重新校验记录
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::app::ImportSession;
use crate::domain::job::ImportSnapshot;
use crate::domain::record::NormalizedRecord;
use crate::domain::schema::FieldKey;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 车队汇总指标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetTotals {
    pub record_count: usize,
    pub km_traveled: f64,
    pub maintenance_cost: f64,
    pub fuel_cost: f64,
    /// 有值记录的平均油耗 (L/100km)；无值时为 None
    pub mean_fuel_consumption: Option<f64>,
}

/// 记录查询API
pub struct RecordsApi {
    session: Arc<ImportSession>,
}

impl RecordsApi {
    pub fn new(session: Arc<ImportSession>) -> Self {
        Self { session }
    }

    /// 全部记录（按行号升序）
    pub fn all(&self) -> ApiResult<Vec<NormalizedRecord>> {
        Ok(self.snapshot()?.records.clone())
    }

    /// 按车牌查询（忽略大小写与连字符）
    pub fn by_plate(&self, plate: &str) -> ApiResult<Vec<NormalizedRecord>> {
        let wanted = plate_key(plate);
        if wanted.is_empty() {
            return Err(ApiError::InvalidInput("车牌不能为空".to_string()));
        }

        Ok(self
            .snapshot()?
            .records
            .iter()
            .filter(|r| r.text(FieldKey::Plate).map(plate_key).as_deref() == Some(wanted.as_str()))
            .cloned()
            .collect())
    }

    /// 按行程日期区间查询（含两端）；无日期的记录不参与
    pub fn between(&self, from: NaiveDate, to: NaiveDate) -> ApiResult<Vec<NormalizedRecord>> {
        if from > to {
            return Err(ApiError::InvalidInput(format!(
                "日期区间无效: {} > {}",
                from, to
            )));
        }

        Ok(self
            .snapshot()?
            .records
            .iter()
            .filter(|r| {
                r.date(FieldKey::TripDate)
                    .is_some_and(|d| d >= from && d <= to)
            })
            .cloned()
            .collect())
    }

    /// 汇总指标
    pub fn totals(&self) -> ApiResult<FleetTotals> {
        Ok(compute_totals(&self.snapshot()?.records))
    }

    fn snapshot(&self) -> ApiResult<Arc<ImportSnapshot>> {
        self.session
            .latest_snapshot()
            .ok_or_else(|| ApiError::NotFound("尚无已完成的导入".to_string()))
    }
}

fn plate_key(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn compute_totals(records: &[NormalizedRecord]) -> FleetTotals {
    let sum = |key: FieldKey| -> f64 { records.iter().filter_map(|r| r.number(key)).sum() };

    let consumption: Vec<f64> = records
        .iter()
        .filter_map(|r| r.number(FieldKey::FuelConsumption))
        .collect();
    let mean_fuel_consumption = if consumption.is_empty() {
        None
    } else {
        Some(consumption.iter().sum::<f64>() / consumption.len() as f64)
    };

    FleetTotals {
        record_count: records.len(),
        km_traveled: sum(FieldKey::KmTraveled),
        maintenance_cost: sum(FieldKey::MaintenanceCost),
        fuel_cost: sum(FieldKey::FuelCost),
        mean_fuel_consumption,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::FieldValue;
    use std::collections::BTreeMap;

    fn record(row_index: usize, plate: &str, km: f64, consumption: Option<f64>) -> NormalizedRecord {
        let mut fields = BTreeMap::new();
        fields.insert(FieldKey::Plate, FieldValue::Text(plate.to_string()));
        fields.insert(FieldKey::KmTraveled, FieldValue::Number(km));
        fields.insert(
            FieldKey::FuelConsumption,
            consumption.map_or(FieldValue::Null, FieldValue::Number),
        );
        NormalizedRecord { row_index, fields }
    }

    #[test]
    fn test_totals_skip_null_values() {
        let records = vec![
            record(1, "ABC-1234", 100.0, Some(8.0)),
            record(2, "DEF-5678", 50.0, None),
            record(3, "ABC-1234", 25.5, Some(10.0)),
        ];

        let totals = compute_totals(&records);

        assert_eq!(totals.record_count, 3);
        assert_eq!(totals.km_traveled, 175.5);
        assert_eq!(totals.fuel_cost, 0.0);
        assert_eq!(totals.mean_fuel_consumption, Some(9.0));
    }

    #[test]
    fn test_plate_key_normalizes() {
        assert_eq!(plate_key("abc-1234"), "ABC1234");
        assert_eq!(plate_key(" ABC1234 "), "ABC1234");
    }
}
