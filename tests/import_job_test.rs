// ==========================================
// 导入任务集成测试
// ==========================================
// 测试目标: 解析 → 映射 → 校验 → 快照 的端到端行为
// ==========================================

mod test_helpers;

use fleet_ingest::importer::ErrorClass;
use fleet_ingest::{
    FieldKey, FieldValue, ImportError, ImportFormat, ImportInput, JobState, MappingMode,
    MappingTarget, RowErrorKind, SchemaRegistry, SemanticType,
};
use fleet_ingest::{logging, ImportConfig};
use test_helpers::*;

#[tokio::test]
async fn test_portuguese_fleet_headers_resolve_and_validate() {
    logging::init_test();
    let session = create_test_session(ImportConfig::default());
    let input = csv_input(
        &["Placa", "Consumo (L/100km)", "KM Rodados"],
        &[row(&["ABC-1234", "8.5", "245"])],
    );

    let (handle, outcome) = import_to_end(&session, input).await;

    // 映射: {identifier, number, number}
    let mapping = handle.mapping().await;
    let registry = SchemaRegistry::global();
    let types: Vec<SemanticType> = ["Placa", "Consumo (L/100km)", "KM Rodados"]
        .iter()
        .map(|column| {
            let field = mapping
                .target_of(column)
                .and_then(|target| target.field())
                .expect("列应映射到标准字段");
            registry.get(field).semantic_type
        })
        .collect();
    assert_eq!(
        types,
        vec![SemanticType::Identifier, SemanticType::Number, SemanticType::Number]
    );

    // 校验: 一条记录，零错误
    assert_eq!(outcome.state, JobState::Completed);
    let snapshot = outcome.snapshot.expect("Completed 应有快照");
    assert!(snapshot.errors.is_empty());
    assert_eq!(snapshot.records.len(), 1);

    let record = &snapshot.records[0];
    assert_eq!(record.get(FieldKey::Plate), Some(&FieldValue::Text("ABC-1234".to_string())));
    assert_eq!(record.number(FieldKey::FuelConsumption), Some(8.5));
    assert_eq!(record.number(FieldKey::KmTraveled), Some(245.0));
}

#[tokio::test]
async fn test_rows_seen_equals_data_rows() {
    let session = create_test_session(small_batch_config());
    let rows = fleet_rows(17);

    let (_, outcome) = import_to_end(&session, csv_input(&FLEET_HEADERS, &rows)).await;

    assert_eq!(outcome.state, JobState::Completed);
    assert_eq!(outcome.summary.total_rows, 17);
    assert_eq!(outcome.summary.rows_seen, 17);
    assert_eq!(outcome.summary.rows_accepted, 17);
    assert_eq!(outcome.summary.rows_rejected, 0);
}

#[tokio::test]
async fn test_currency_and_type_mismatch() {
    let session = create_test_session(ImportConfig::default());
    let input = csv_input(
        &["Placa", "KM Rodados", "Custo Combustível"],
        &[
            row(&["ABC-1234", "120", "R$ 1.85"]),
            row(&["DEF-5678", "abc", "R$ 2,00"]),
        ],
    );

    let (_, outcome) = import_to_end(&session, input).await;
    let snapshot = outcome.snapshot.expect("Completed 应有快照");

    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.records[0].number(FieldKey::FuelCost), Some(1.85));

    assert_eq!(snapshot.errors.len(), 1);
    let error = &snapshot.errors[0];
    assert_eq!(error.row_index, 2);
    assert_eq!(error.kind, RowErrorKind::TypeMismatch);
    assert_eq!(error.column.as_deref(), Some("KM Rodados"));
    assert_eq!(error.field, Some(FieldKey::KmTraveled));
}

#[tokio::test]
async fn test_missing_plate_column_rejects_rows_but_completes() {
    let session = create_test_session(ImportConfig::default());
    let input = csv_input(
        &["KM Rodados", "Motorista"],
        &[row(&["100", "João"]), row(&["200", "Maria"])],
    );

    let (_, outcome) = import_to_end(&session, input).await;

    assert_eq!(outcome.state, JobState::Completed);
    assert_eq!(outcome.summary.rows_accepted, 0);
    assert_eq!(outcome.summary.rows_rejected, 2);

    let snapshot = outcome.snapshot.expect("Completed 应有快照");
    assert!(snapshot.records.is_empty());
    assert!(snapshot.errors.iter().all(|e| {
        e.kind == RowErrorKind::MissingRequired && e.field == Some(FieldKey::Plate) && e.column.is_none()
    }));
}

#[tokio::test]
async fn test_no_required_field_mapped_fails_job() {
    let session = create_test_session(ImportConfig::default());
    let input = csv_input(&["Motorista", "Modelo"], &[row(&["João", "Volvo FH"])]);

    let err = session
        .start_import(input, MappingMode::Automatic)
        .await
        .err()
        .expect("无必填字段时应失败");

    assert!(matches!(err, ImportError::UnresolvableMapping { .. }));
    assert_eq!(err.class(), ErrorClass::JobFatal);

    let handle = session.last_job().expect("应保留最近任务");
    let outcome = handle.outcome().await;
    assert_eq!(outcome.state, JobState::Failed);
    assert!(outcome.snapshot.is_none());
    assert!(outcome.failure.is_some());
}

#[tokio::test]
async fn test_row_order_preserved_under_parallel_validation() {
    let session = create_test_session(small_batch_config());
    let mut rows = fleet_rows(30);
    // 每第 4 行制造一个类型错误
    for (i, r) in rows.iter_mut().enumerate() {
        if i % 4 == 0 {
            r[2] = "n/a".to_string();
        }
    }

    let (_, outcome) = import_to_end(&session, csv_input(&FLEET_HEADERS, &rows)).await;
    let snapshot = outcome.snapshot.expect("Completed 应有快照");

    let record_rows: Vec<usize> = snapshot.records.iter().map(|r| r.row_index).collect();
    let mut sorted = record_rows.clone();
    sorted.sort_unstable();
    assert_eq!(record_rows, sorted);

    let error_rows: Vec<usize> = snapshot.errors.iter().map(|e| e.row_index).collect();
    assert_eq!(error_rows, vec![1, 5, 9, 13, 17, 21, 25, 29]);
    assert_eq!(snapshot.records.len() + snapshot.errors.len(), 30);
}

#[tokio::test]
async fn test_override_after_freeze_rejected() {
    let session = create_test_session(ImportConfig::default());
    let handle = session
        .start_import(
            csv_input(&FLEET_HEADERS, &fleet_rows(3)),
            MappingMode::AwaitOverrides,
        )
        .await
        .unwrap();
    assert_eq!(handle.state(), JobState::Mapping);

    handle.freeze_and_validate().await.unwrap();
    let before = handle.mapping().await;

    let err = handle.override_column("Placa", "ignore").await.unwrap_err();
    assert!(matches!(err, ImportError::MappingFrozen));
    assert_eq!(err.class(), ErrorClass::MappingFatal);
    assert_eq!(handle.mapping().await, before);
    assert_eq!(handle.outcome().await.state, JobState::Completed);
}

#[tokio::test]
async fn test_override_redirects_column_before_freeze() {
    let session = create_test_session(ImportConfig::default());
    let handle = session
        .start_import(
            csv_input(
                &["Placa", "Distância", "Obs"],
                &[row(&["ABC-1234", "88", "revisão"])],
            ),
            MappingMode::AwaitOverrides,
        )
        .await
        .unwrap();

    handle
        .apply_overrides(&[
            ("Distância".to_string(), "km_traveled".to_string()),
            ("Obs".to_string(), "ignore".to_string()),
        ])
        .await
        .unwrap();
    let mapping = handle.mapping().await;
    assert_eq!(
        mapping.target_of("Distância"),
        Some(MappingTarget::Field(FieldKey::KmTraveled))
    );

    handle.freeze_and_validate().await.unwrap();
    let outcome = handle.outcome().await;
    let snapshot = outcome.snapshot.expect("Completed 应有快照");
    assert_eq!(snapshot.records[0].number(FieldKey::KmTraveled), Some(88.0));
}

#[tokio::test]
async fn test_unknown_field_override_leaves_state() {
    let session = create_test_session(ImportConfig::default());
    let handle = session
        .start_import(
            csv_input(&FLEET_HEADERS, &fleet_rows(1)),
            MappingMode::AwaitOverrides,
        )
        .await
        .unwrap();
    let before = handle.mapping().await;

    let err = handle.override_column("Placa", "odometer").await.unwrap_err();

    assert!(matches!(err, ImportError::UnknownField(ref name) if name == "odometer"));
    assert_eq!(handle.state(), JobState::Mapping);
    assert_eq!(handle.mapping().await, before);
}

#[tokio::test]
async fn test_file_too_large_fails_fast() {
    let session = create_test_session(ImportConfig {
        max_file_bytes: 16,
        ..ImportConfig::default()
    });

    let err = session
        .start_import(csv_input(&FLEET_HEADERS, &fleet_rows(5)), MappingMode::Automatic)
        .await
        .err()
        .expect("超限文件应失败");

    assert!(matches!(err, ImportError::FileTooLarge { limit: 16, .. }));
    assert!(err.is_job_fatal());
    assert_eq!(session.last_job().map(|h| h.state()), Some(JobState::Failed));
}

#[tokio::test]
async fn test_unreadable_and_empty_files() {
    let session = create_test_session(ImportConfig::default());

    let err = session
        .start_import(
            ImportInput::new(vec![0xff, 0xfe, 0x00, 0x81]),
            MappingMode::Automatic,
        )
        .await
        .err()
        .expect("无法识别的字节流应失败");
    assert!(matches!(err, ImportError::UnreadableFile(_)));

    // 失败任务为终态，不阻塞新任务
    let err = session
        .start_import(
            ImportInput::new(b"Placa,KM\n".to_vec()).with_format(ImportFormat::Csv),
            MappingMode::Automatic,
        )
        .await
        .err()
        .expect("仅表头应失败");
    assert!(matches!(err, ImportError::EmptyFile));
}

#[tokio::test]
async fn test_export_uses_canonical_headers() {
    let session = create_test_session(ImportConfig::default());
    let (_, outcome) = import_to_end(
        &session,
        csv_input(
            &["Placa", "KM Rodados", "Custo Combustível"],
            &[row(&["abc-1234", "12,5", "R$ 3,10"])],
        ),
    )
    .await;
    let snapshot = outcome.snapshot.expect("Completed 应有快照");

    let mut buffer = Vec::new();
    snapshot.export_csv(&mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();

    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("plate,km_traveled,fuel_cost"));
    assert_eq!(lines.next(), Some("ABC-1234,12.5,3.1"));
}
