// ==========================================
// 车队表格导入 - 导入任务状态机
// ==========================================
// 职责: 驱动单个导入任务走完 解析 → 映射 → 校验
// 状态: Created → Parsing → Mapping → Validating → Completed
//       不可恢复错误 → Failed；显式取消 → Cancelled
// 规则: 记录仅在 Completed 时以原子快照形式对外可见
// 规则: 校验可分批并行，结果按行号顺序回收
// ==========================================

use crate::config::ImportConfig;
use crate::domain::job::{
    ImportInput, ImportOutcome, ImportSnapshot, ImportSummary, JobState,
};
use crate::domain::mapping::{ColumnMapping, FrozenColumnMapping, MappingWarning};
use crate::domain::record::{NormalizedRecord, RawRow, RowError};
use crate::domain::schema::SchemaRegistry;
use crate::i18n::t_with_args;
use crate::importer::column_mapper::{required_coverage, ColumnMapper as ColumnMapperImpl};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::importer_trait::{ColumnMapper, RowValidator, SnapshotSink};
use crate::importer::progress::ProgressPublisher;
use crate::importer::row_validator::RowValidator as RowValidatorImpl;
use chrono::Utc;
use futures::future::join_all;
use std::ops::Range;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// 单行校验结果
type RowOutcome = Result<NormalizedRecord, Vec<RowError>>;

// 映射阶段：冻结前可编辑，冻结后只读共享
#[derive(Debug, Clone)]
enum MappingStage {
    Draft(ColumnMapping),
    Frozen(FrozenColumnMapping),
}

// ==========================================
// ImportJob - 导入任务
// ==========================================
pub struct ImportJob {
    id: Uuid,
    state: JobState,
    config: Arc<ImportConfig>,

    // 导入组件
    mapper: Arc<dyn ColumnMapper>,
    validator: Arc<dyn RowValidator>,

    // 进度、取消与结果出口
    publisher: Arc<ProgressPublisher>,
    cancel: CancellationToken,
    sink: Option<Arc<dyn SnapshotSink>>,

    // 中间数据
    file_name: Option<String>,
    headers: Vec<String>,
    rows: Arc<Vec<RawRow>>,
    mapping: MappingStage,
    warnings: Vec<MappingWarning>,
    records: Vec<NormalizedRecord>,
    errors: Vec<RowError>,

    // 结果
    summary: ImportSummary,
    failure: Option<String>,
    snapshot: Option<Arc<ImportSnapshot>>,
}

impl ImportJob {
    /// 使用默认组件创建任务
    pub fn new(config: Arc<ImportConfig>) -> Self {
        let mapper = Arc::new(ColumnMapperImpl::new(config.mapping_confidence_threshold));
        Self::with_components(config, mapper, Arc::new(RowValidatorImpl::new()))
    }

    /// 使用指定组件创建任务
    ///
    /// # 参数
    /// - config: 配置快照（任务期间不变）
    /// - mapper: 列映射器
    /// - validator: 行校验器
    pub fn with_components(
        config: Arc<ImportConfig>,
        mapper: Arc<dyn ColumnMapper>,
        validator: Arc<dyn RowValidator>,
    ) -> Self {
        let id = Uuid::new_v4();
        let publisher = Arc::new(ProgressPublisher::new(id, config.event_channel_capacity));
        Self {
            id,
            state: JobState::Created,
            config,
            mapper,
            validator,
            publisher,
            cancel: CancellationToken::new(),
            sink: None,
            file_name: None,
            headers: Vec::new(),
            rows: Arc::new(Vec::new()),
            mapping: MappingStage::Draft(ColumnMapping::default()),
            warnings: Vec::new(),
            records: Vec::new(),
            errors: Vec::new(),
            summary: ImportSummary::default(),
            failure: None,
            snapshot: None,
        }
    }

    /// 设置快照出口；快照在 Completed 事件发布前写入
    pub fn with_snapshot_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn publisher(&self) -> Arc<ProgressPublisher> {
        Arc::clone(&self.publisher)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn summary(&self) -> &ImportSummary {
        &self.summary
    }

    /// 当前映射（冻结前为草稿）
    pub fn mapping(&self) -> ColumnMapping {
        match &self.mapping {
            MappingStage::Draft(mapping) => mapping.clone(),
            MappingStage::Frozen(frozen) => ColumnMapping::clone(frozen),
        }
    }

    pub fn is_mapping_frozen(&self) -> bool {
        matches!(self.mapping, MappingStage::Frozen(_))
    }

    pub fn mapping_warnings(&self) -> &[MappingWarning] {
        &self.warnings
    }

    // ==========================================
    // 阶段 Parsing → Mapping
    // ==========================================

    /// 解析输入并推断映射
    ///
    /// # 返回
    /// - Ok(()): 进入 Mapping（或在解析期间被取消）
    /// - Err: 任务致命错误，任务已进入 Failed
    #[instrument(skip(self, input), fields(job_id = %self.id, bytes = input.bytes.len()))]
    pub async fn parse_input(&mut self, input: ImportInput) -> ImportResult<()> {
        self.ensure_state(JobState::Created, "parse")?;
        self.summary.started_at = Some(Utc::now());
        self.file_name = input.file_name.clone();

        info!(file_name = ?self.file_name, "开始导入表格");

        // === 步骤 1: 大小检查（解析前快速失败）===
        let limit = self.config.max_file_bytes;
        if input.bytes.len() > limit {
            return Err(self.fail(ImportError::FileTooLarge {
                size: input.bytes.len(),
                limit,
            }));
        }

        // === 步骤 2: 解析文件（唯一的阻塞 I/O）===
        self.transition(JobState::Parsing)?;
        let parsed = tokio::task::spawn_blocking(move || UniversalFileParser.parse(&input))
            .await
            .map_err(|e| ImportError::InternalError(format!("解析任务异常退出: {}", e)));

        if self.cancel.is_cancelled() {
            self.transition(JobState::Cancelled)?;
            return Ok(());
        }

        let (format, sheet) = match parsed.and_then(|result| result) {
            Ok(parsed) => parsed,
            Err(e) => return Err(self.fail(e)),
        };
        if sheet.rows.is_empty() {
            return Err(self.fail(ImportError::EmptyFile));
        }

        self.summary.total_rows = sheet.rows.len();
        self.headers = sheet.headers;
        self.rows = Arc::new(sheet.rows);
        info!(
            format = %format,
            columns = self.headers.len(),
            total_rows = self.summary.total_rows,
            "文件解析完成"
        );

        // === 步骤 3: 推断映射 ===
        self.transition(JobState::Mapping)?;
        let inferred = self.mapper.infer(&self.headers);
        let (covered, required) = required_coverage(&inferred.mapping);
        info!(
            resolved = inferred.mapping.resolved_fields().len(),
            required_covered = covered,
            required_total = required,
            warnings = inferred.warnings.len(),
            "列映射推断完成"
        );
        self.mapping = MappingStage::Draft(inferred.mapping);
        self.warnings = inferred.warnings;

        Ok(())
    }

    // ==========================================
    // 阶段 Mapping：人工覆写与冻结
    // ==========================================

    /// 覆写单列映射
    pub fn override_column(
        &mut self,
        column: &str,
        field: &str,
    ) -> ImportResult<Option<MappingWarning>> {
        let draft = self.editable_mapping("override")?;
        let (next, warning) = self.mapper.override_column(draft, column, field)?;

        info!(job_id = %self.id, column, field, "列映射已覆写");
        if let Some(w) = &warning {
            warn!(job_id = %self.id, column = %w.column, field = %w.field, "字段被抢占，原列改为忽略");
            self.warnings.push(w.clone());
        }
        self.mapping = MappingStage::Draft(next);
        Ok(warning)
    }

    /// 批量覆写（原子）
    pub fn apply_overrides(
        &mut self,
        overrides: &[(String, String)],
    ) -> ImportResult<Vec<MappingWarning>> {
        let draft = self.editable_mapping("override")?;
        let (next, warnings) = self.mapper.apply_overrides(draft, overrides)?;

        info!(job_id = %self.id, count = overrides.len(), "批量覆写完成");
        self.warnings.extend(warnings.iter().cloned());
        self.mapping = MappingStage::Draft(next);
        Ok(warnings)
    }

    /// 冻结映射并进入 Validating
    ///
    /// # 返回
    /// - Ok(FrozenColumnMapping)
    /// - Err(UnresolvableMapping): 无任何必填字段被映射，任务已进入 Failed
    /// - Err(InvalidJobState): 非 Mapping 状态或已冻结
    pub fn freeze_mapping(&mut self) -> ImportResult<FrozenColumnMapping> {
        let draft = match &self.mapping {
            MappingStage::Draft(draft) if self.state == JobState::Mapping => draft.clone(),
            _ => {
                return Err(ImportError::InvalidJobState {
                    state: self.state,
                    action: "freeze",
                })
            }
        };

        let (covered, _) = required_coverage(&draft);
        if covered == 0 {
            let required = SchemaRegistry::global()
                .required_fields()
                .map(|spec| spec.name())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(self.fail(ImportError::UnresolvableMapping { required }));
        }

        let frozen = draft.freeze();
        self.mapping = MappingStage::Frozen(frozen.clone());
        self.transition(JobState::Validating)?;
        Ok(frozen)
    }

    // ==========================================
    // 阶段 Validating → Completed
    // ==========================================

    /// 执行逐行校验直到终态
    ///
    /// 行按 progress_batch_size 分批，每轮最多 validation_workers 批并行；
    /// 每轮之间检查取消标记，已开始的批次允许完成。
    #[instrument(skip(self), fields(job_id = %self.id, total_rows = self.summary.total_rows))]
    pub async fn run_validation(&mut self) -> ImportResult<ImportOutcome> {
        let frozen = match &self.mapping {
            MappingStage::Frozen(frozen) if self.state == JobState::Validating => frozen.clone(),
            _ => {
                return Err(ImportError::InvalidJobState {
                    state: self.state,
                    action: "validate",
                })
            }
        };

        let batch_size = self.config.progress_batch_size.max(1);
        let workers = self.config.validation_workers.max(1);
        let batches = batch_ranges(self.rows.len(), batch_size);
        info!(batches = batches.len(), batch_size, workers, "开始逐行校验");

        for round in batches.chunks(workers) {
            if self.cancel.is_cancelled() {
                info!(rows_seen = self.summary.rows_seen, "校验被取消");
                self.transition(JobState::Cancelled)?;
                return Ok(self.outcome());
            }

            // === 并行校验一轮批次，join_all 保持批次顺序 ===
            let tasks = round.iter().cloned().map(|range| {
                let rows = Arc::clone(&self.rows);
                let mapping = frozen.clone();
                let validator = Arc::clone(&self.validator);
                tokio::task::spawn_blocking(move || {
                    validate_batch(validator.as_ref(), &rows[range], &mapping)
                })
            });
            let results = join_all(tasks).await;

            for (range, joined) in round.iter().zip(results) {
                let outcomes = match joined {
                    Ok(outcomes) => outcomes,
                    Err(e) => {
                        let err = ImportError::InternalError(format!("校验任务异常退出: {}", e));
                        return Err(self.fail(err));
                    }
                };
                self.absorb_batch(outcomes);

                let last_row = self.rows.get(range.end - 1).map(|row| row.row_index);
                debug!(
                    rows_seen = self.summary.rows_seen,
                    rows_accepted = self.summary.rows_accepted,
                    rows_rejected = self.summary.rows_rejected,
                    "批次校验完成"
                );
                self.publisher
                    .publish(JobState::Validating, last_row, &self.summary);
            }
        }

        // === 完成：先交付原子快照，再发布 Completed ===
        self.summary.error_count = self.errors.len();
        let finished_at = Utc::now();
        self.summary.finished_at = Some(finished_at);
        self.summary.elapsed_ms = self
            .summary
            .started_at
            .map(|started| (finished_at - started).num_milliseconds());
        let snapshot = Arc::new(ImportSnapshot {
            job_id: self.id,
            file_name: self.file_name.clone(),
            mapping: frozen,
            warnings: self.warnings.clone(),
            records: std::mem::take(&mut self.records),
            errors: std::mem::take(&mut self.errors),
            summary: self.summary.clone(),
        });
        if let Some(sink) = &self.sink {
            sink.store(Arc::clone(&snapshot));
        }
        self.snapshot = Some(snapshot);
        self.transition(JobState::Completed)?;

        info!(
            rows_seen = self.summary.rows_seen,
            rows_accepted = self.summary.rows_accepted,
            rows_rejected = self.summary.rows_rejected,
            error_count = self.summary.error_count,
            elapsed_ms = ?self.summary.elapsed_ms,
            "导入完成"
        );
        Ok(self.outcome())
    }

    // ==========================================
    // 取消 / 结果
    // ==========================================

    /// 请求取消
    ///
    /// # 返回
    /// true 表示任务因此进入 Cancelled
    pub fn cancel(&mut self) -> bool {
        self.cancel.cancel();
        if !self.state.is_cancellable() {
            debug!(job_id = %self.id, state = %self.state, "当前状态不可取消");
            return false;
        }
        self.transition(JobState::Cancelled).is_ok()
    }

    pub fn outcome(&self) -> ImportOutcome {
        ImportOutcome {
            job_id: self.id,
            state: self.state,
            summary: self.summary.clone(),
            failure: self.failure.clone(),
            snapshot: self.snapshot.clone(),
        }
    }

    // ==========================================
    // 内部工具
    // ==========================================

    fn ensure_state(&self, expected: JobState, action: &'static str) -> ImportResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ImportError::InvalidJobState {
                state: self.state,
                action,
            })
        }
    }

    /// 可编辑映射；冻结后一律 MappingFrozen
    fn editable_mapping(&self, action: &'static str) -> ImportResult<&ColumnMapping> {
        match &self.mapping {
            MappingStage::Frozen(_) => Err(ImportError::MappingFrozen),
            MappingStage::Draft(draft) if self.state == JobState::Mapping => Ok(draft),
            MappingStage::Draft(_) => Err(ImportError::InvalidJobState {
                state: self.state,
                action,
            }),
        }
    }

    fn absorb_batch(&mut self, outcomes: Vec<RowOutcome>) {
        for outcome in outcomes {
            self.summary.rows_seen += 1;
            match outcome {
                Ok(record) => {
                    self.summary.rows_accepted += 1;
                    self.records.push(record);
                }
                Err(row_errors) => {
                    self.summary.rows_rejected += 1;
                    self.errors.extend(row_errors);
                }
            }
        }
        self.summary.error_count = self.errors.len();
    }

    /// 状态迁移：校验合法性、记录时间、发布事件
    fn transition(&mut self, next: JobState) -> ImportResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ImportError::InvalidJobState {
                state: self.state,
                action: next.as_str(),
            });
        }

        let previous = self.state;
        self.state = next;
        if next.is_terminal() && self.summary.finished_at.is_none() {
            let finished_at = Utc::now();
            self.summary.finished_at = Some(finished_at);
            self.summary.elapsed_ms = self
                .summary
                .started_at
                .map(|started| (finished_at - started).num_milliseconds());
        }

        info!(job_id = %self.id, from = %previous, to = %next, "任务状态迁移");
        self.publisher.publish(next, None, &self.summary);
        Ok(())
    }

    /// 记录单条诊断并进入 Failed，原样返回错误
    fn fail(&mut self, err: ImportError) -> ImportError {
        error!(job_id = %self.id, state = %self.state, error = %err, "导入任务失败");
        self.failure = Some(t_with_args("job.failed", &[("reason", &err.to_string())]));
        if let Err(e) = self.transition(JobState::Failed) {
            warn!(job_id = %self.id, error = %e, "无法进入 Failed 状态");
        }
        err
    }
}

/// 将 [0, total) 切分为长度不超过 size 的连续区间
fn batch_ranges(total: usize, size: usize) -> Vec<Range<usize>> {
    (0..total)
        .step_by(size)
        .map(|start| start..(start + size).min(total))
        .collect()
}

fn validate_batch(
    validator: &dyn RowValidator,
    rows: &[RawRow],
    mapping: &ColumnMapping,
) -> Vec<RowOutcome> {
    rows.iter().map(|row| validator.validate(row, mapping)).collect()
}
