// ==========================================
// 车队表格导入 - 命令行入口
// ==========================================
// 用法: fleet-ingest <FILE> [--format csv|xlsx|xls] [--map "列名=字段"]...
//       [--config PATH] [--export OUT.csv] [--json]
// 退出码: Completed 为 0，其余终态为 1
// ==========================================

use anyhow::{Context, Result};
use clap::Parser;
use fleet_ingest::config::ConfigManager;
use fleet_ingest::i18n::{t, t_with_args};
use fleet_ingest::{
    logging, ImportFormat, ImportInput, ImportOutcome, ImportSession, JobState, MappingMode,
};
use std::fs::File;
use std::path::PathBuf;
use tracing::{info, warn};

/// 车队运营表格导入工具
#[derive(Parser, Debug)]
#[command(name = "fleet-ingest")]
#[command(about = "Import fleet spreadsheets (xlsx/xls/csv) into normalized records")]
#[command(version)]
struct Args {
    /// 待导入文件
    file: PathBuf,

    /// 显式指定格式（默认按文件内容识别）
    #[arg(long)]
    format: Option<String>,

    /// 列映射覆写，形如 "Distância=km_traveled"、"Obs=ignore" 或 "Obs="
    #[arg(long = "map", value_name = "COLUMN=FIELD")]
    overrides: Vec<String>,

    /// 配置文件路径
    #[arg(long, env = "FLEET_INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// 导出已接受记录为 CSV
    #[arg(long, value_name = "OUT")]
    export: Option<PathBuf>,

    /// 以 JSON 输出汇总
    #[arg(long)]
    json: bool,

    /// 日志输出为 JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    if args.log_json {
        logging::init_json();
    } else {
        logging::init();
    }

    info!("==================================================");
    info!("车队表格导入 - 版本 {}", fleet_ingest::VERSION);
    info!("==================================================");

    // === 步骤 1: 加载配置 ===
    let manager = ConfigManager::load(args.config.as_deref()).context("加载配置失败")?;
    let session = ImportSession::from_reader(&manager)
        .await
        .context("配置值无效")?;

    // === 步骤 2: 读取文件 ===
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("无法读取文件: {}", args.file.display()))?;
    let mut input = ImportInput::new(bytes);
    if let Some(name) = args.file.file_name() {
        input = input.with_file_name(name.to_string_lossy());
    }
    if let Some(tag) = args.format.as_deref() {
        let format = ImportFormat::from_tag(tag)
            .with_context(|| format!("不支持的格式: {}", tag))?;
        input = input.with_format(format);
    }

    let overrides = args
        .overrides
        .iter()
        .map(|raw| parse_override(raw))
        .collect::<Result<Vec<_>>>()?;

    // === 步骤 3: 启动导入 ===
    let mode = if overrides.is_empty() {
        MappingMode::Automatic
    } else {
        MappingMode::AwaitOverrides
    };
    let handle = match session.start_import(input, mode).await {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", t_with_args("job.failed", &[("reason", &e.to_string())]));
            std::process::exit(1);
        }
    };

    // === 步骤 4: 应用覆写并冻结 ===
    if mode == MappingMode::AwaitOverrides {
        for warning in handle.apply_overrides(&overrides).await? {
            warn!(
                column = %warning.column,
                field = %warning.field,
                kept_column = %warning.kept_column,
                "映射告警: 字段已转移"
            );
        }
        if let Err(e) = handle.freeze_and_validate().await {
            eprintln!("{}", t_with_args("job.failed", &[("reason", &e.to_string())]));
            std::process::exit(1);
        }
    }

    // === 步骤 5: 等待结果 ===
    let outcome = handle.outcome().await;
    report(&outcome, args.json)?;

    // === 步骤 6: 导出 ===
    if let (Some(path), Some(snapshot)) = (args.export.as_ref(), outcome.snapshot.as_ref()) {
        let file = File::create(path)
            .with_context(|| format!("无法创建导出文件: {}", path.display()))?;
        snapshot.export_csv(file).context("导出 CSV 失败")?;
        println!(
            "{}",
            t_with_args(
                "cli.exported",
                &[
                    ("count", &snapshot.records.len().to_string()),
                    ("path", &path.display().to_string()),
                ],
            )
        );
    }

    if outcome.state != JobState::Completed {
        std::process::exit(1);
    }
    Ok(())
}

/// 解析 "列名=字段" 形式的覆写参数（以最后一个 '=' 分隔，列名可含 '='）
///
/// 字段为空（"列名="）表示忽略该列，与 "列名=ignore" 等价。
fn parse_override(raw: &str) -> Result<(String, String)> {
    let (column, field) = raw
        .rsplit_once('=')
        .with_context(|| format!("覆写格式应为 列名=字段: {}", raw))?;
    if column.trim().is_empty() {
        anyhow::bail!("覆写格式应为 列名=字段: {}", raw);
    }
    Ok((column.trim().to_string(), field.trim().to_string()))
}

fn report(outcome: &ImportOutcome, json: bool) -> Result<()> {
    if json {
        let body = serde_json::json!({
            "job_id": outcome.job_id,
            "state": outcome.state,
            "summary": outcome.summary,
            "failure": outcome.failure,
            "errors": outcome.snapshot.as_ref().map(|s| &s.errors),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let summary = &outcome.summary;
    println!(
        "{}",
        t_with_args(
            "cli.summary",
            &[
                ("state", outcome.state.as_str()),
                ("accepted", &summary.rows_accepted.to_string()),
                ("rejected", &summary.rows_rejected.to_string()),
                ("seen", &summary.rows_seen.to_string()),
            ],
        )
    );

    match outcome.state {
        JobState::Completed => println!("{}", t("job.completed")),
        JobState::Cancelled => println!("{}", t("job.cancelled")),
        _ => {
            if let Some(failure) = &outcome.failure {
                println!("{}", failure);
            }
        }
    }

    if let Some(snapshot) = &outcome.snapshot {
        for error in &snapshot.errors {
            println!("  #{} {}", error.row_index, error.detail);
        }
    }
    Ok(())
}
