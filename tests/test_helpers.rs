// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 构造 CSV 输入、测试配置与会话
// ==========================================
#![allow(dead_code)]

use fleet_ingest::{
    ImportConfig, ImportFormat, ImportInput, ImportOutcome, ImportSession, JobHandle, MappingMode,
};
use std::sync::Arc;

/// 标准车队表头（葡语）
pub const FLEET_HEADERS: [&str; 5] = [
    "Placa",
    "Consumo (L/100km)",
    "KM Rodados",
    "Custo Combustível",
    "Data da Viagem",
];

/// 按表头与行构造 CSV 文本（含引号转义）
pub fn csv_text(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers).expect("写入表头失败");
    for row in rows {
        writer.write_record(row).expect("写入数据行失败");
    }
    let bytes = writer.into_inner().expect("CSV 缓冲失败");
    String::from_utf8(bytes).expect("CSV 非 UTF-8")
}

/// 构造 CSV 导入输入
pub fn csv_input(headers: &[&str], rows: &[Vec<String>]) -> ImportInput {
    ImportInput::new(csv_text(headers, rows).into_bytes())
        .with_file_name("frota.csv")
        .with_format(ImportFormat::Csv)
}

/// 单行字符串切片转为 Vec<String>
pub fn row(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// 生成 n 行合法车队数据（对应 FLEET_HEADERS）
pub fn fleet_rows(n: usize) -> Vec<Vec<String>> {
    (0..n)
        .map(|i| {
            row(&[
                &format!("ABC-{:04}", 1000 + i),
                &format!("{}.5", 7 + i % 5),
                &format!("{}", 100 + i),
                &format!("R$ {},90", 200 + i),
                "2024-03-15",
            ])
        })
        .collect()
}

/// 小批次 + 多 worker，用于覆盖并行校验路径
pub fn small_batch_config() -> ImportConfig {
    ImportConfig {
        progress_batch_size: 3,
        validation_workers: 3,
        ..ImportConfig::default()
    }
}

pub fn create_test_session(config: ImportConfig) -> Arc<ImportSession> {
    Arc::new(ImportSession::new(config))
}

/// 自动模式导入并等待终态
pub async fn import_to_end(
    session: &ImportSession,
    input: ImportInput,
) -> (JobHandle, ImportOutcome) {
    let handle = session
        .start_import(input, MappingMode::Automatic)
        .await
        .expect("导入启动失败");
    let outcome = handle.outcome().await;
    (handle, outcome)
}
