// ==========================================
// 车队表格导入 - 导入API
// ==========================================
// 职责: 封装导入会话，提供可序列化的请求/响应（供界面调用）
// 流程: 上传 → 查看/覆写映射 → 确认 → 查询结果/预览/导出
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::app::{ImportSession, JobHandle};
use crate::domain::job::{
    ImportFormat, ImportInput, ImportOutcome, ImportSummary, JobState, MappingMode,
};
use crate::domain::mapping::{ColumnMapping, MappingWarning};
use crate::domain::record::{NormalizedRecord, RowError};
use crate::importer::column_mapper::required_coverage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// 单列映射视图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMappingView {
    /// 源列名
    pub column: String,
    /// 标准字段名或 "ignored"
    pub target: String,
    /// 推断置信度（人工覆写为 1.0）
    pub confidence: f64,
    pub overridden: bool,
}

/// 映射视图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingView {
    pub columns: Vec<ColumnMappingView>,
    /// 已映射的必填字段数
    pub required_covered: usize,
    pub required_total: usize,
    pub warnings: Vec<MappingWarning>,
}

impl MappingView {
    fn build(mapping: &ColumnMapping, warnings: Vec<MappingWarning>) -> Self {
        let (required_covered, required_total) = required_coverage(mapping);
        Self {
            columns: mapping
                .assignments()
                .iter()
                .map(|a| ColumnMappingView {
                    column: a.column.clone(),
                    target: a.target.to_string(),
                    confidence: a.confidence,
                    overridden: a.overridden,
                })
                .collect(),
            required_covered,
            required_total,
            warnings,
        }
    }
}

/// 启动导入响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStartResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub headers: Vec<String>,
    pub mapping: MappingView,
}

/// 映射覆写请求项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingOverrideRequest {
    /// 源列名
    pub column: String,
    /// 标准字段名或忽略标记（"ignore" / "ignorar" / ""）
    pub field: String,
}

/// 导入结果响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportApiResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub summary: ImportSummary,
    /// 拒绝率（rows_rejected / rows_seen）
    pub rejection_rate: f64,
    /// Failed 时的诊断
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub warnings: Vec<MappingWarning>,
    /// 行级错误（按行号排序）
    pub errors: Vec<RowError>,
    /// 前 preview_rows 条记录
    pub preview: Vec<NormalizedRecord>,
}

/// 导入API
pub struct ImportApi {
    session: Arc<ImportSession>,
}

impl ImportApi {
    /// 创建新的ImportApi实例
    pub fn new(session: Arc<ImportSession>) -> Self {
        Self { session }
    }

    /// 上传并启动导入
    ///
    /// # 参数
    /// - bytes: 文件内容
    /// - file_name: 文件名（用于推断格式，可选）
    /// - format: 格式标签 xlsx / xls / csv（可选，优先于文件名）
    /// - mode: 映射确认方式
    ///
    /// # 返回
    /// - Ok(ImportStartResponse): 任务ID、表头与推断映射
    /// - Err(ApiError): 格式标签非法或任务致命错误
    pub async fn start_import(
        &self,
        bytes: Vec<u8>,
        file_name: Option<&str>,
        format: Option<&str>,
        mode: MappingMode,
    ) -> ApiResult<ImportStartResponse> {
        let mut input = ImportInput::new(bytes);
        if let Some(tag) = format {
            let parsed = ImportFormat::from_tag(tag)
                .ok_or_else(|| ApiError::InvalidInput(format!("不支持的格式: {}", tag)))?;
            input = input.with_format(parsed);
        }
        if let Some(name) = file_name {
            input = input.with_file_name(name);
        }

        let handle = self.session.start_import(input, mode).await?;
        info!(job_id = %handle.id(), "导入API: 任务已启动");

        let headers = handle.headers().await;
        let mapping = self.mapping_view(&handle).await;
        // 读取表头/映射会等待任务锁，状态须在其后读取
        Ok(ImportStartResponse {
            job_id: handle.id(),
            state: handle.state(),
            headers,
            mapping,
        })
    }

    /// 查看当前映射
    pub async fn get_mapping(&self, job_id: Uuid) -> ApiResult<MappingView> {
        let handle = self.find_job(job_id)?;
        Ok(self.mapping_view(&handle).await)
    }

    /// 批量覆写映射（原子）
    pub async fn override_mapping(
        &self,
        job_id: Uuid,
        overrides: Vec<MappingOverrideRequest>,
    ) -> ApiResult<MappingView> {
        let handle = self.find_job(job_id)?;
        let pairs: Vec<(String, String)> = overrides
            .into_iter()
            .map(|o| (o.column, o.field))
            .collect();
        handle.apply_overrides(&pairs).await?;
        Ok(self.mapping_view(&handle).await)
    }

    /// 确认映射并开始校验
    pub async fn confirm_mapping(&self, job_id: Uuid) -> ApiResult<JobState> {
        let handle = self.find_job(job_id)?;
        handle.freeze_and_validate().await?;
        Ok(handle.state())
    }

    /// 查询任务结果（校验进行中时等待其结束）
    pub async fn get_result(&self, job_id: Uuid) -> ApiResult<ImportApiResponse> {
        let handle = self.find_job(job_id)?;
        let outcome = handle.outcome().await;
        Ok(self.to_response(outcome, handle.mapping_warnings().await))
    }

    /// 取消活动任务
    pub async fn cancel_import(&self) -> ApiResult<JobState> {
        self.session
            .cancel_active()
            .await
            .ok_or_else(|| ApiError::NotFound("没有进行中的导入任务".to_string()))
    }

    /// 将最近一次完成的导入导出为 CSV 文本
    pub fn export_csv(&self) -> ApiResult<String> {
        let snapshot = self
            .session
            .latest_snapshot()
            .ok_or_else(|| ApiError::NotFound("尚无已完成的导入".to_string()))?;

        let mut buffer = Vec::new();
        snapshot
            .export_csv(&mut buffer)
            .map_err(|e| ApiError::InternalError(format!("CSV 导出失败: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| ApiError::InternalError(format!("CSV 导出编码错误: {}", e)))
    }

    fn find_job(&self, job_id: Uuid) -> ApiResult<JobHandle> {
        self.session
            .last_job()
            .filter(|h| h.id() == job_id)
            .ok_or_else(|| ApiError::NotFound(format!("导入任务不存在: {}", job_id)))
    }

    async fn mapping_view(&self, handle: &JobHandle) -> MappingView {
        MappingView::build(&handle.mapping().await, handle.mapping_warnings().await)
    }

    fn to_response(&self, outcome: ImportOutcome, warnings: Vec<MappingWarning>) -> ImportApiResponse {
        let preview_rows = self.session.config().preview_rows;
        let (errors, preview) = match &outcome.snapshot {
            Some(snapshot) => (
                snapshot.errors.clone(),
                snapshot.preview(preview_rows).to_vec(),
            ),
            None => (Vec::new(), Vec::new()),
        };

        ImportApiResponse {
            job_id: outcome.job_id,
            state: outcome.state,
            rejection_rate: outcome.summary.rejection_rate(),
            summary: outcome.summary,
            failure: outcome.failure,
            warnings,
            errors,
            preview,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportConfig;
    use std::sync::MutexGuard;

    fn api() -> (MutexGuard<'static, ()>, ImportApi) {
        let guard = crate::i18n::locale_test_guard();
        let api = ImportApi::new(Arc::new(ImportSession::new(ImportConfig::default())));
        (guard, api)
    }

    #[tokio::test]
    async fn test_override_confirm_and_export() {
        let (_locale, api) = api();
        let csv = "Placa,Distância,Obs\nABC-1234,120,x\n".as_bytes().to_vec();

        let started = api
            .start_import(csv, Some("frota.csv"), None, MappingMode::AwaitOverrides)
            .await
            .unwrap();
        assert_eq!(started.state, JobState::Mapping);
        assert_eq!(started.mapping.required_covered, 1);

        let view = api
            .override_mapping(
                started.job_id,
                vec![MappingOverrideRequest {
                    column: "Distância".to_string(),
                    field: "km_traveled".to_string(),
                }],
            )
            .await
            .unwrap();
        assert_eq!(view.required_covered, 2);

        api.confirm_mapping(started.job_id).await.unwrap();
        let result = api.get_result(started.job_id).await.unwrap();
        assert_eq!(result.state, JobState::Completed);
        assert_eq!(result.preview.len(), 1);

        let exported = api.export_csv().unwrap();
        assert!(exported.starts_with("plate,km_traveled\n"));
        assert!(exported.contains("ABC-1234,120"));
    }

    #[tokio::test]
    async fn test_unknown_format_tag_rejected() {
        let (_locale, api) = api();
        let err = api
            .start_import(Vec::new(), None, Some("ods"), MappingMode::Automatic)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unknown_field_override_rejected() {
        let (_locale, api) = api();
        let started = api
            .start_import(
                b"Placa,KM\nABC-1234,1\n".to_vec(),
                None,
                Some("csv"),
                MappingMode::AwaitOverrides,
            )
            .await
            .unwrap();

        let err = api
            .override_mapping(
                started.job_id,
                vec![MappingOverrideRequest {
                    column: "KM".to_string(),
                    field: "odometer".to_string(),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MappingRejected(_)));
    }

    #[tokio::test]
    async fn test_automatic_start_reports_state_after_validation() {
        let (_locale, api) = api();
        let rows: String = (0..50)
            .map(|i| format!("ABC-{:04},{}\n", 1000 + i, 10 + i))
            .collect();
        let csv = format!("Placa,KM Rodados\n{}", rows).into_bytes();

        let started = api
            .start_import(csv, Some("frota.csv"), None, MappingMode::Automatic)
            .await
            .unwrap();

        // 表头读取等待校验结束，返回的状态不得停留在 Validating
        assert_eq!(started.state, JobState::Completed);
        assert_eq!(started.headers, vec!["Placa", "KM Rodados"]);
        let result = api.get_result(started.job_id).await.unwrap();
        assert_eq!(result.state, started.state);
    }
}
