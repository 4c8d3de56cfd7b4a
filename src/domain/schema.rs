// ==========================================
// 车队表格导入 - 标准字段定义 (SchemaRegistry)
// ==========================================
// 职责: 定义标准车队记录的字段集合、语义类型与校验规则
// 红线: 字段集合在进程启动时固定，不支持动态加载
// ==========================================

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

// ==========================================
// FieldKey - 标准字段标识
// ==========================================
// 声明顺序即注册顺序（也是推断平局时的优先顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    VehicleId,
    Plate,
    Model,
    DriverName,
    FuelConsumption,
    KmTraveled,
    FuelCost,
    MaintenanceCost,
    FuelSavings,
    Location,
    TripDate,
}

impl FieldKey {
    pub const ALL: [FieldKey; 11] = [
        FieldKey::VehicleId,
        FieldKey::Plate,
        FieldKey::Model,
        FieldKey::DriverName,
        FieldKey::FuelConsumption,
        FieldKey::KmTraveled,
        FieldKey::FuelCost,
        FieldKey::MaintenanceCost,
        FieldKey::FuelSavings,
        FieldKey::Location,
        FieldKey::TripDate,
    ];

    /// 转换为标准字段名
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::VehicleId => "vehicle_id",
            FieldKey::Plate => "plate",
            FieldKey::Model => "model",
            FieldKey::DriverName => "driver_name",
            FieldKey::FuelConsumption => "fuel_consumption",
            FieldKey::KmTraveled => "km_traveled",
            FieldKey::FuelCost => "fuel_cost",
            FieldKey::MaintenanceCost => "maintenance_cost",
            FieldKey::FuelSavings => "fuel_savings",
            FieldKey::Location => "location",
            FieldKey::TripDate => "trip_date",
        }
    }

    /// 按标准字段名解析（大小写不敏感）
    pub fn parse(name: &str) -> Option<FieldKey> {
        let wanted = name.trim();
        FieldKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// SemanticType - 字段语义类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    String,
    Number,
    Date,
    Percentage,
    Currency,
    Identifier,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::String => "string",
            SemanticType::Number => "number",
            SemanticType::Date => "date",
            SemanticType::Percentage => "percentage",
            SemanticType::Currency => "currency",
            SemanticType::Identifier => "identifier",
        }
    }

    /// 是否为数值类语义（number / percentage / currency）
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            SemanticType::Number | SemanticType::Percentage | SemanticType::Currency
        )
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// ValidationRule - 字段约束
// ==========================================
// 作用于类型转换之后的值
#[derive(Debug, Clone)]
pub enum ValidationRule {
    Unconstrained,
    NumericRange { min: f64, max: f64 },
    NonNegative { max: Option<f64> },
    Pattern { regex: Regex, description: &'static str },
    MaxLength(usize),
    DateRange { from: NaiveDate, to: NaiveDate },
}

// ==========================================
// FieldSpec - 标准字段规格
// ==========================================
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub key: FieldKey,
    pub semantic_type: SemanticType,
    pub required: bool,
    pub rule: ValidationRule,
    /// 已知表头同义词（大小写不敏感）
    pub synonyms: &'static [&'static str],
}

impl FieldSpec {
    pub fn name(&self) -> &'static str {
        self.key.as_str()
    }
}

// ==========================================
// SchemaRegistry - 字段注册表
// ==========================================
#[derive(Debug)]
pub struct SchemaRegistry {
    fields: Vec<FieldSpec>,
}

static REGISTRY: LazyLock<SchemaRegistry> = LazyLock::new(SchemaRegistry::builtin);

impl SchemaRegistry {
    /// 进程级只读注册表
    pub fn global() -> &'static SchemaRegistry {
        &REGISTRY
    }

    /// 按声明顺序返回全部字段
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, key: FieldKey) -> &FieldSpec {
        // builtin() 为每个 FieldKey 恰好注册一次，顺序与 FieldKey::ALL 一致
        &self.fields[key as usize]
    }

    /// 按字段名查找（大小写不敏感）
    pub fn lookup(&self, name: &str) -> Option<&FieldSpec> {
        FieldKey::parse(name).map(|key| self.get(key))
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|spec| spec.required)
    }

    fn builtin() -> Self {
        let fields = vec![
            FieldSpec {
                key: FieldKey::VehicleId,
                semantic_type: SemanticType::Identifier,
                required: false,
                rule: ValidationRule::Pattern {
                    regex: builtin_regex(r"^[A-Z0-9-]{1,20}$"),
                    description: "1-20 letters, digits or '-'",
                },
                synonyms: &["ID do Veículo", "id veiculo", "vehicle id", "veiculo", "frota"],
            },
            FieldSpec {
                key: FieldKey::Plate,
                semantic_type: SemanticType::Identifier,
                required: true,
                rule: ValidationRule::Pattern {
                    // 旧式 ABC-1234 与 Mercosul ABC1D23
                    regex: builtin_regex(r"^[A-Z]{3}-?[0-9][A-Z0-9][0-9]{2}$"),
                    description: "AAA-9999 or AAA9A99",
                },
                synonyms: &["Placa", "license plate", "plate number", "placa do veiculo"],
            },
            FieldSpec {
                key: FieldKey::Model,
                semantic_type: SemanticType::String,
                required: false,
                rule: ValidationRule::MaxLength(80),
                synonyms: &["Modelo", "vehicle model"],
            },
            FieldSpec {
                key: FieldKey::DriverName,
                semantic_type: SemanticType::String,
                required: false,
                rule: ValidationRule::MaxLength(120),
                synonyms: &["Nome do Motorista", "Motorista", "driver", "condutor"],
            },
            FieldSpec {
                key: FieldKey::FuelConsumption,
                semantic_type: SemanticType::Number,
                required: false,
                rule: ValidationRule::NumericRange { min: 0.0, max: 100.0 },
                synonyms: &["Consumo (L/100km)", "Consumo", "fuel consumption", "l/100km"],
            },
            FieldSpec {
                key: FieldKey::KmTraveled,
                semantic_type: SemanticType::Number,
                required: true,
                rule: ValidationRule::NonNegative { max: Some(10_000.0) },
                synonyms: &["KM Rodados", "km", "quilometragem", "distance", "km traveled"],
            },
            FieldSpec {
                key: FieldKey::FuelCost,
                semantic_type: SemanticType::Currency,
                required: false,
                rule: ValidationRule::NonNegative { max: None },
                synonyms: &["Custo Combustível", "fuel cost", "gasto combustivel"],
            },
            FieldSpec {
                key: FieldKey::MaintenanceCost,
                semantic_type: SemanticType::Currency,
                required: false,
                rule: ValidationRule::NonNegative { max: None },
                synonyms: &["Custo Manutenção", "maintenance cost", "manutencao"],
            },
            FieldSpec {
                key: FieldKey::FuelSavings,
                semantic_type: SemanticType::Percentage,
                required: false,
                rule: ValidationRule::NumericRange { min: 0.0, max: 100.0 },
                synonyms: &["Economia (%)", "economia", "savings"],
            },
            FieldSpec {
                key: FieldKey::Location,
                semantic_type: SemanticType::String,
                required: false,
                rule: ValidationRule::MaxLength(120),
                synonyms: &["Localização", "local", "cidade", "location"],
            },
            FieldSpec {
                key: FieldKey::TripDate,
                semantic_type: SemanticType::Date,
                required: false,
                rule: ValidationRule::DateRange {
                    from: builtin_date(2000, 1, 1),
                    to: builtin_date(2100, 12, 31),
                },
                synonyms: &["Data da Viagem", "data", "date", "trip date"],
            },
        ];

        Self { fields }
    }
}

fn builtin_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("invalid built-in field pattern")
}

fn builtin_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("invalid built-in date bound")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order_matches_field_keys() {
        let registry = SchemaRegistry::global();
        let keys: Vec<FieldKey> = registry.fields().iter().map(|f| f.key).collect();
        assert_eq!(keys, FieldKey::ALL.to_vec());
    }

    #[test]
    fn test_required_fields() {
        let required: Vec<&str> = SchemaRegistry::global()
            .required_fields()
            .map(|f| f.name())
            .collect();
        assert_eq!(required, vec!["plate", "km_traveled"]);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = SchemaRegistry::global();
        assert_eq!(registry.lookup("PLATE").map(|f| f.key), Some(FieldKey::Plate));
        assert_eq!(
            registry.lookup(" fuel_consumption ").map(|f| f.semantic_type),
            Some(SemanticType::Number)
        );
        assert!(registry.lookup("odometer").is_none());
    }

    #[test]
    fn test_plate_pattern() {
        let spec = SchemaRegistry::global().get(FieldKey::Plate);
        let ValidationRule::Pattern { regex, .. } = &spec.rule else {
            panic!("plate 应为格式规则");
        };
        assert!(regex.is_match("ABC-1234"));
        assert!(regex.is_match("ABC1D23"));
        assert!(!regex.is_match("AB-12345"));
    }
}
