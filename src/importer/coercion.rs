// ==========================================
// 车队表格导入 - 单元格类型转换
// ==========================================
// 职责: 原始文本 → 语义类型值（纯函数，返回标记结果）
// 规则: 数值允许单个小数分隔符（. 或 ,），先剥离货币/百分号
// 规则: 日期按 ISO 8601 优先，其次 日/月/年
// 红线: 预期内的格式差异一律返回 Err，不 panic
// ==========================================

use crate::domain::record::FieldValue;
use crate::domain::schema::{SemanticType, ValidationRule};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fmt;

/// 剥离的货币/百分号（长的在前）
const NUMERIC_SYMBOLS: [&str; 6] = ["US$", "R$", "$", "€", "£", "%"];

/// ISO 8601 日期 / 日期时间格式
const ISO_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];
const ISO_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

// ==========================================
// CoercionError - 类型转换失败
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoercionError {
    NotANumber,
    MultipleDecimalSeparators,
    NotADate,
}

impl fmt::Display for CoercionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoercionError::NotANumber => f.write_str("not a number"),
            CoercionError::MultipleDecimalSeparators => {
                f.write_str("more than one decimal separator")
            }
            CoercionError::NotADate => f.write_str("not a recognised date"),
        }
    }
}

/// 将单元格文本转换为语义类型值
///
/// # 返回
/// - Ok(None): 空单元格（由调用方判定必填）
/// - Ok(Some(value)): 转换成功
/// - Err: 类型不匹配
pub fn coerce(raw: &str, semantic_type: SemanticType) -> Result<Option<FieldValue>, CoercionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value = match semantic_type {
        SemanticType::Number | SemanticType::Percentage | SemanticType::Currency => {
            FieldValue::Number(parse_number(trimmed)?)
        }
        SemanticType::Date => FieldValue::Date(parse_date(trimmed)?),
        SemanticType::Identifier => FieldValue::Text(trimmed.to_uppercase()),
        SemanticType::String => FieldValue::Text(collapse_whitespace(trimmed)),
    };
    Ok(Some(value))
}

/// 解析数值文本
///
/// 接受: "8.5" / "8,5" / "R$ 1.85" / "12%" / "-3"
/// 拒绝: "1.234,56"（多个分隔符）/ "abc" / "1e5" / "NaN"
pub fn parse_number(raw: &str) -> Result<f64, CoercionError> {
    let mut text = raw.to_string();
    for symbol in NUMERIC_SYMBOLS {
        text = text.replace(symbol, "");
    }
    text.retain(|c| !c.is_whitespace());

    let separators = text.chars().filter(|c| *c == '.' || *c == ',').count();
    if separators > 1 {
        return Err(CoercionError::MultipleDecimalSeparators);
    }
    let text = text.replace(',', ".");

    let digits = text.strip_prefix(['-', '+']).unwrap_or(&text);
    let well_formed = digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.');
    if !well_formed {
        return Err(CoercionError::NotANumber);
    }

    text.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or(CoercionError::NotANumber)
}

/// 解析日期文本（ISO 8601 优先，其次 日/月/年）
///
/// ISO 形式要求 4 位年份开头（或 8 位紧凑形式），
/// 其余一律按 日/月/年 处理，避免 "23/09/24" 被读成公元 23 年。
pub fn parse_date(raw: &str) -> Result<NaiveDate, CoercionError> {
    let leading_digits = raw.chars().take_while(|c| c.is_ascii_digit()).count();
    let iso_candidate = leading_digits == 4 || (leading_digits == 8 && raw.len() == 8);

    if iso_candidate {
        for format in ISO_DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
                return Ok(date);
            }
        }
        for format in ISO_DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
                return Ok(dt.date());
            }
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.date_naive());
        }
    }

    parse_day_month_year(raw).ok_or(CoercionError::NotADate)
}

/// 日/月/年（分隔符 / - .，年份 2 位或 4 位）
fn parse_day_month_year(raw: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.split(['/', '-', '.']).collect();
    let [day, month, year] = parts.as_slice() else {
        return None;
    };
    if day.is_empty() || day.len() > 2 || month.is_empty() || month.len() > 2 {
        return None;
    }

    let day: u32 = day.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let year: i32 = match year.len() {
        4 => year.parse().ok()?,
        // 两位年份: 00-69 → 20xx, 70-99 → 19xx
        2 => {
            let short: i32 = year.parse().ok()?;
            if short < 70 {
                2000 + short
            } else {
                1900 + short
            }
        }
        _ => return None,
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ==========================================
// 约束校验
// ==========================================

/// 校验转换后的值是否满足字段约束
///
/// # 返回
/// - Ok(()): 满足
/// - Err(说明): 违反约束
pub fn check_rule(value: &FieldValue, rule: &ValidationRule) -> Result<(), String> {
    match (rule, value) {
        (ValidationRule::Unconstrained, _) => Ok(()),
        (ValidationRule::NumericRange { min, max }, FieldValue::Number(n)) => {
            if n < min || n > max {
                Err(format!("{} outside [{}, {}]", n, min, max))
            } else {
                Ok(())
            }
        }
        (ValidationRule::NonNegative { max }, FieldValue::Number(n)) => {
            if *n < 0.0 {
                Err(format!("{} is negative", n))
            } else if let Some(max) = max.filter(|max| n > max) {
                Err(format!("{} exceeds {}", n, max))
            } else {
                Ok(())
            }
        }
        (ValidationRule::Pattern { regex, description }, FieldValue::Text(text)) => {
            if regex.is_match(text) {
                Ok(())
            } else {
                Err(format!("'{}' does not match {}", text, description))
            }
        }
        (ValidationRule::MaxLength(limit), FieldValue::Text(text)) => {
            let len = text.chars().count();
            if len > *limit {
                Err(format!("length {} exceeds {}", len, limit))
            } else {
                Ok(())
            }
        }
        (ValidationRule::DateRange { from, to }, FieldValue::Date(date)) => {
            if date < from || date > to {
                Err(format!("{} outside [{}, {}]", date, from, to))
            } else {
                Ok(())
            }
        }
        // 规则与值类型不匹配时不施加约束（Null 亦然）
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{FieldKey, SchemaRegistry};
    use chrono::Datelike;

    #[test]
    fn test_parse_number_variants() {
        assert_eq!(parse_number("8.5"), Ok(8.5));
        assert_eq!(parse_number("8,5"), Ok(8.5));
        assert_eq!(parse_number("R$ 1.85"), Ok(1.85));
        assert_eq!(parse_number("12%"), Ok(12.0));
        assert_eq!(parse_number("-3"), Ok(-3.0));
        assert_eq!(parse_number("245"), Ok(245.0));
    }

    #[test]
    fn test_parse_number_rejects() {
        assert_eq!(parse_number("abc"), Err(CoercionError::NotANumber));
        assert_eq!(
            parse_number("1.234,56"),
            Err(CoercionError::MultipleDecimalSeparators)
        );
        assert_eq!(parse_number("1e5"), Err(CoercionError::NotANumber));
        assert_eq!(parse_number("NaN"), Err(CoercionError::NotANumber));
        assert_eq!(parse_number("R$"), Err(CoercionError::NotANumber));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 9, 23).unwrap();
        assert_eq!(parse_date("2024-09-23"), Ok(expected));
        assert_eq!(parse_date("2024-09-23T08:30:00"), Ok(expected));
        assert_eq!(parse_date("2024-09-23T08:30:00-03:00"), Ok(expected));
        assert_eq!(parse_date("23/09/2024"), Ok(expected));
        assert_eq!(parse_date("23.09.2024"), Ok(expected));
        assert_eq!(parse_date("23/09/24"), Ok(expected));
        assert_eq!(parse_date("20240923"), Ok(expected));
    }

    #[test]
    fn test_parse_date_two_digit_year() {
        let ymd = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(parse_date("15-03-24"), Ok(ymd(2024, 3, 15)));
        assert_eq!(parse_date("01/02/03"), Ok(ymd(2003, 2, 1)));
        assert_eq!(parse_date("10.11.98"), Ok(ymd(1998, 11, 10)));
        // 两位年份不会落入 ISO 分支
        assert!(parse_date("24-03-15").is_ok_and(|d| d.year() == 2015));
        assert_eq!(parse_date("0023-09-24").map(|d| d.year()), Ok(23));
    }

    #[test]
    fn test_parse_date_rejects() {
        assert_eq!(parse_date("ontem"), Err(CoercionError::NotADate));
        assert_eq!(parse_date("31/02/2024"), Err(CoercionError::NotADate));
        assert_eq!(parse_date("09/23/2024"), Err(CoercionError::NotADate));
    }

    #[test]
    fn test_coerce_empty_and_text() {
        assert_eq!(coerce("   ", SemanticType::Number), Ok(None));
        assert_eq!(
            coerce(" abc-1234 ", SemanticType::Identifier),
            Ok(Some(FieldValue::Text("ABC-1234".to_string())))
        );
        assert_eq!(
            coerce("  João   Silva ", SemanticType::String),
            Ok(Some(FieldValue::Text("João Silva".to_string())))
        );
    }

    #[test]
    fn test_check_rule() {
        let registry = SchemaRegistry::global();
        let km = &registry.get(FieldKey::KmTraveled).rule;
        assert!(check_rule(&FieldValue::Number(245.0), km).is_ok());
        assert!(check_rule(&FieldValue::Number(-1.0), km).is_err());
        assert!(check_rule(&FieldValue::Number(20_000.0), km).is_err());

        let plate = &registry.get(FieldKey::Plate).rule;
        assert!(check_rule(&FieldValue::Text("ABC-1234".into()), plate).is_ok());
        assert!(check_rule(&FieldValue::Text("12-ABCD".into()), plate).is_err());

        let trip_date = &registry.get(FieldKey::TripDate).rule;
        let old = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        assert!(check_rule(&FieldValue::Date(old), trip_date).is_err());
    }
}
