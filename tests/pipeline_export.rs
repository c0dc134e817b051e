use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use bounded_export::catalog::{Catalog, DatasetProfile, FillPolicy};
use bounded_export::config::ExportConfig;
use bounded_export::error::{ExportError, Severity};
use bounded_export::ingestion::{load_dataset, LoadOptions};
use bounded_export::observability::{PipelineContext, PipelineObserver};
use bounded_export::partition::{ChunkFit, Granularity};
use bounded_export::pipeline::{
    verify, ArtifactKind, DatasetReport, DatasetSource, Orchestrator, PipelineOptions, PipelineStage,
    SkipReason, SplitStrategy,
};
use bounded_export::quality::AnomalyKind;
use bounded_export::types::{DataSet, DataType, Field, Schema, Value};
use chrono::{Days, NaiveDate};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn profile(name: &str) -> DatasetProfile {
    Catalog::builtin().get(name).unwrap().clone()
}

fn config(dir: &Path, ceiling: u64) -> ExportConfig {
    ExportConfig::default()
        .with_output_dir(dir)
        .with_ceiling(ceiling)
        .with_processing_date(d(2024, 6, 30))
}

/// Payables issued on `dates`, due 30 days later, every required column present.
fn payables(dates: &[NaiveDate]) -> DataSet {
    let schema = profile("accounts_payable").schema();
    let col = |name: &str| schema.index_of(name).unwrap();
    let rows = dates
        .iter()
        .enumerate()
        .map(|(i, issued)| {
            let mut row = vec![Value::Null; schema.fields.len()];
            row[col("Id")] = Value::Int64(i as i64 + 1);
            row[col("Fornecedor")] = Value::Utf8(format!("Fornecedor {:03}", i % 17));
            row[col("Data Emissao")] = Value::Date(*issued);
            row[col("Data vencimento")] = Value::Date(issued.checked_add_days(Days::new(30)).unwrap());
            row[col("Valor documento")] = Value::Float64(100.0 + (i % 50) as f64 + 0.25);
            row[col("Saldo")] = Value::Float64((i % 7) as f64 * 10.0);
            row[col("Situacao")] = Value::Utf8("Em aberto".to_string());
            row[col("Historico")] = Value::Utf8("Lancamento de teste".to_string());
            row
        })
        .collect();
    DataSet::new(schema, rows)
}

/// One issue date every three days across 2019..=2023.
fn five_uniform_years() -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut day = d(2019, 1, 1);
    while day <= d(2023, 12, 31) {
        dates.push(day);
        day = day.checked_add_days(Days::new(3)).unwrap();
    }
    dates
}

/// Size of the complete artifact for `ds`, measured by an unbounded run into `dir`.
fn complete_size(profile: &DatasetProfile, ds: &DataSet, dir: &Path) -> u64 {
    let cfg = config(dir, u64::MAX);
    let report = Orchestrator::new(&cfg)
        .run(profile, DatasetSource::InMemory(ds.clone()))
        .unwrap();
    assert_eq!(report.split, Some(SplitStrategy::NotNeeded));
    report.complete().unwrap().bytes
}

fn chunk_labels(report: &DatasetReport) -> Vec<&str> {
    report.artifacts_of(ArtifactKind::Chunk).map(|a| a.label.as_str()).collect()
}

fn chunk_rows(report: &DatasetReport) -> usize {
    report.artifacts_of(ArtifactKind::Chunk).map(|a| a.rows).sum()
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl PipelineObserver for Recorder {
    fn on_stage(&self, _ctx: &PipelineContext, stage: PipelineStage) {
        self.push(format!("stage {stage:?}"));
    }

    fn on_warning(&self, _ctx: &PipelineContext, severity: Severity, message: &str) {
        self.push(format!("warn {severity:?} {message}"));
    }

    fn on_failure(&self, _ctx: &PipelineContext, severity: Severity, _error: &ExportError) {
        self.push(format!("fail {severity:?}"));
    }

    fn on_alert(&self, _ctx: &PipelineContext, severity: Severity, _error: &ExportError) {
        self.push(format!("alert {severity:?}"));
    }
}

#[test]
fn rows_without_a_date_column_split_into_parts_under_the_ceiling() {
    let contacts = profile("contacts");
    let schema = Schema::new(vec![
        Field::new("ID", DataType::Int64),
        Field::new("Nome", DataType::Utf8),
        Field::new("Cidade", DataType::Utf8),
    ]);
    let rows = (1..=100)
        .map(|i| {
            let name = if i == 11 {
                Value::Null
            } else {
                Value::Utf8(format!("Contato numero {i}"))
            };
            vec![Value::Int64(i), name, Value::Utf8("Sao Paulo".to_string())]
        })
        .collect();
    let ds = DataSet::new(schema, rows);

    let dir = tempfile::tempdir().unwrap();
    let full = complete_size(&contacts, &ds, dir.path());
    let cfg = config(dir.path(), full / 4);
    let report = Orchestrator::new(&cfg)
        .run(&contacts, DatasetSource::InMemory(ds))
        .unwrap();

    assert_eq!(report.final_stage, PipelineStage::Done);
    assert_eq!(report.split, Some(SplitStrategy::RowCount));
    let labels = chunk_labels(&report);
    assert!(labels.len() >= 3, "expected at least 3 chunks, got {labels:?}");
    assert_eq!(labels[0], "part_001");
    assert_eq!(chunk_rows(&report), 100);
    for chunk in report.artifacts_of(ArtifactKind::Chunk) {
        assert!(chunk.bytes <= cfg.ceiling_bytes, "{} is {} bytes", chunk.label, chunk.bytes);
        assert_eq!(fs::metadata(&chunk.path).unwrap().len(), chunk.bytes);
        assert_eq!(chunk.fit, Some(ChunkFit::Within));
    }

    // The complete artifact holds the conformed, imputed rows.
    let complete = load_dataset(&report.complete().unwrap().path, &contacts.schema(), &LoadOptions::default()).unwrap();
    let nome = contacts.schema().index_of("Nome").unwrap();
    assert_eq!(complete.rows[10][nome], Value::Utf8("Contato 11".to_string()));
    assert_eq!(report.anomalies.count_of(AnomalyKind::NullInRequiredColumn), 1);

    assert!(verify(&cfg, &contacts).unwrap().is_ok());
}

#[test]
fn five_uniform_years_select_one_year_buckets() {
    let payable = profile("accounts_payable");
    let ds = payables(&five_uniform_years());
    let dir = tempfile::tempdir().unwrap();
    let full = complete_size(&payable, &ds, dir.path());

    let cfg = config(dir.path(), full / 2);
    let report = Orchestrator::new(&cfg)
        .run(&payable, DatasetSource::InMemory(ds.clone()))
        .unwrap();

    assert_eq!(
        report.split,
        Some(SplitStrategy::Date {
            column: "Data Emissao".to_string(),
            granularity: Granularity::YearWindow { years: 1 },
            levels_tried: 2,
        })
    );
    assert_eq!(chunk_labels(&report), vec!["2019", "2020", "2021", "2022", "2023"]);
    assert_eq!(chunk_rows(&report), ds.row_count());
    assert_eq!(report.resplit_chunks, 0);

    // Every bucket holds only dates from its own window, and each file stays under the ceiling.
    let schema = payable.schema();
    let issued = schema.index_of("Data Emissao").unwrap();
    for chunk in report.artifacts_of(ArtifactKind::Chunk) {
        assert!(chunk.bytes <= cfg.ceiling_bytes);
        let window = chunk.window.unwrap();
        let part = load_dataset(&chunk.path, &schema, &LoadOptions::default()).unwrap();
        assert_eq!(part.row_count(), chunk.rows);
        for row in &part.rows {
            match row[issued] {
                Value::Date(date) => assert!(window.contains(date), "{date} outside {}", chunk.label),
                ref other => panic!("unexpected issue date {other:?}"),
            }
        }
    }

    let integrity = verify(&cfg, &payable).unwrap();
    assert!(integrity.is_ok(), "{integrity:?}");
    assert_eq!(integrity.chunks.len(), 5);
    assert_eq!(
        integrity.date_range,
        Some((Value::Date(d(2019, 1, 1)), Value::Date(*five_uniform_years().last().unwrap())))
    );
}

#[test]
fn far_future_row_is_diverted_and_the_rest_partition_normally() {
    let payable = profile("accounts_payable");
    let mut dates = five_uniform_years();
    dates.push(d(2114, 1, 1));
    let ds = payables(&dates);
    let dir = tempfile::tempdir().unwrap();
    let full = complete_size(&payable, &ds, dir.path());

    let cfg = config(dir.path(), full / 2);
    let report = Orchestrator::new(&cfg)
        .run(&payable, DatasetSource::InMemory(ds.clone()))
        .unwrap();

    assert_eq!(report.diverted_rows, 1);
    assert_eq!(chunk_labels(&report), vec!["2019", "2020", "2021", "2022", "2023"]);
    assert_eq!(chunk_rows(&report), ds.row_count() - 1);

    let diverted = report
        .artifacts_of(ArtifactKind::Anomaly)
        .find(|a| a.label == "anomaly_out_of_range_date_Data Emissao")
        .unwrap();
    assert_eq!(diverted.rows, 1);
    assert_eq!(
        diverted.path.file_name().unwrap().to_string_lossy(),
        "accounts_payable_anomaly_out_of_range_date_Data_Emissao.csv"
    );
    assert_eq!(report.anomalies.count_of(AnomalyKind::OutOfRangeDate), 1);

    let integrity = verify(&cfg, &payable).unwrap();
    assert!(integrity.is_ok(), "{integrity:?}");
    assert_eq!(integrity.diverted_rows, 1);
    assert_eq!(integrity.complete_rows, integrity.chunk_rows + 1);
}

#[test]
fn undated_rows_land_in_a_no_date_bucket_when_the_date_is_not_imputed() {
    let mut payable = profile("accounts_payable");
    let issued = payable
        .columns
        .iter_mut()
        .find(|c| c.field.name == "Data Emissao")
        .unwrap();
    issued.fill = FillPolicy::Keep;
    issued.required = false;

    let mut ds = payables(&five_uniform_years());
    let col = ds.schema.index_of("Data Emissao").unwrap();
    let mut undated = 0;
    for row in ds.rows.iter_mut().step_by(10) {
        row[col] = Value::Null;
        undated += 1;
    }
    let dir = tempfile::tempdir().unwrap();
    let full = complete_size(&payable, &ds, dir.path());

    let cfg = config(dir.path(), full / 2);
    let report = Orchestrator::new(&cfg)
        .run(&payable, DatasetSource::InMemory(ds.clone()))
        .unwrap();

    assert!(matches!(report.split, Some(SplitStrategy::Date { .. })), "{:?}", report.split);
    let no_date: Vec<_> = report
        .artifacts_of(ArtifactKind::Chunk)
        .filter(|a| a.label.starts_with("no_date"))
        .collect();
    assert!(!no_date.is_empty());
    assert_eq!(no_date.iter().map(|a| a.rows).sum::<usize>(), undated);
    for artifact in &no_date {
        assert!(artifact.window.is_none());
        let name = artifact.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("accounts_payable_no_date"), "{name}");
    }
    assert_eq!(chunk_rows(&report), ds.row_count());
    assert_eq!(report.diverted_rows, 0);

    let integrity = verify(&cfg, &payable).unwrap();
    assert!(integrity.is_ok(), "{integrity:?}");
    assert_eq!(integrity.chunk_rows, ds.row_count());
}

#[test]
fn datasets_sharing_a_name_prefix_keep_their_own_artifacts() {
    let payable = profile("accounts_payable");
    let mut accounts = payable.clone();
    accounts.name = "accounts".to_string();
    let ds = payables(&five_uniform_years());
    let dir = tempfile::tempdir().unwrap();
    let full = complete_size(&payable, &ds, dir.path());

    let split = config(dir.path(), full / 2);
    let first = Orchestrator::new(&split)
        .run(&payable, DatasetSource::InMemory(ds.clone()))
        .unwrap();
    let payable_chunks = chunk_labels(&first).len();
    assert!(payable_chunks > 1);

    // `accounts` fits whole; its run must not clear or count `accounts_payable_*` files.
    let whole = config(dir.path(), u64::MAX);
    let second = Orchestrator::new(&whole)
        .run(&accounts, DatasetSource::InMemory(ds.clone()))
        .unwrap();
    assert_eq!(second.split, Some(SplitStrategy::NotNeeded));
    assert!(dir.path().join("accounts_payable_complete.csv").exists());
    for chunk in first.artifacts_of(ArtifactKind::Chunk) {
        assert!(chunk.path.exists(), "{} was removed", chunk.path.display());
    }

    let own = verify(&whole, &accounts).unwrap();
    assert!(!own.split);
    assert!(own.chunks.is_empty());
    let other = verify(&split, &payable).unwrap();
    assert!(other.is_ok(), "{other:?}");
    assert_eq!(other.chunks.len(), payable_chunks);
}

#[test]
fn null_amount_is_reported_then_imputed_to_zero() {
    let payable = profile("accounts_payable");
    let mut ds = payables(&[d(2021, 3, 5), d(2021, 3, 6), d(2021, 3, 7)]);
    let valor = ds.schema.index_of("Valor documento").unwrap();
    ds.rows[1][valor] = Value::Null;

    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("accounts_payable_part_009.csv");
    fs::write(&stale, "Id\n1\n").unwrap();

    let cfg = config(dir.path(), 2_000 * 1024);
    let report = Orchestrator::new(&cfg)
        .run(&payable, DatasetSource::InMemory(ds))
        .unwrap();

    assert_eq!(report.final_stage, PipelineStage::Done);
    assert_eq!(report.split, Some(SplitStrategy::NotNeeded));
    assert!(!stale.exists(), "artifacts from earlier runs are cleared");

    let null_report = report
        .anomalies
        .reports
        .iter()
        .find(|r| r.kind == AnomalyKind::NullInRequiredColumn && r.column == "Valor documento")
        .unwrap();
    assert_eq!(null_report.rows, vec![1]);
    assert_eq!(report.imputed.filled["Valor documento"], 1);

    let schema = payable.schema();
    let options = LoadOptions::default();
    let anomaly = load_dataset(
        dir.path().join("accounts_payable_anomaly_null_Valor_documento.csv"),
        &schema,
        &options,
    )
    .unwrap();
    assert_eq!(anomaly.row_count(), 1);
    assert_eq!(anomaly.rows[0][valor], Value::Null);

    let complete = load_dataset(&report.complete().unwrap().path, &schema, &options).unwrap();
    assert_eq!(complete.rows[1][valor], Value::Float64(0.0));
    assert_eq!(complete.rows[0][valor], Value::Float64(100.25));
}

#[test]
fn identical_inputs_produce_identical_artifacts() {
    let payable = profile("accounts_payable");
    let ds = payables(&five_uniform_years());
    let scratch = tempfile::tempdir().unwrap();
    let ceiling = complete_size(&payable, &ds, scratch.path()) / 3;

    let contents = |dir: &Path| -> BTreeMap<String, Vec<u8>> {
        let cfg = config(dir, ceiling);
        Orchestrator::new(&cfg)
            .run(&payable, DatasetSource::InMemory(ds.clone()))
            .unwrap();
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .map(|p| (p.file_name().unwrap().to_string_lossy().to_string(), fs::read(&p).unwrap()))
            .collect()
    };

    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let a = contents(first.path());
    let b = contents(second.path());
    assert!(a.len() > 2);
    assert_eq!(a, b);
    // Re-running into the same directory replaces the artifacts with identical ones.
    assert_eq!(contents(first.path()), a);
}

#[test]
fn single_oversized_row_is_accepted_as_a_flagged_leaf() {
    let contacts = profile("contacts");
    let schema = Schema::new(vec![
        Field::new("ID", DataType::Int64),
        Field::new("Nome", DataType::Utf8),
        Field::new("Observações", DataType::Utf8),
    ]);
    let rows = (1..=6)
        .map(|i| {
            let notes = if i == 3 { "x".repeat(5_000) } else { "curta".to_string() };
            vec![Value::Int64(i), Value::Utf8(format!("Contato {i}")), Value::Utf8(notes)]
        })
        .collect();
    let recorder = Arc::new(Recorder::default());
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), 2_000);

    let report = Orchestrator::new(&cfg)
        .with_observer(recorder.clone())
        .run(&contacts, DatasetSource::InMemory(DataSet::new(schema, rows)))
        .unwrap();

    let leaves: Vec<_> = report
        .artifacts_of(ArtifactKind::Chunk)
        .filter(|a| a.fit == Some(ChunkFit::OversizedLeaf))
        .collect();
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].rows, 1);
    assert!(leaves[0].bytes > cfg.ceiling_bytes);
    assert_eq!(chunk_rows(&report), 6);
    assert!(
        recorder
            .events()
            .iter()
            .any(|e| e.starts_with("warn Warning") && e.contains("single row above the ceiling"))
    );
}

#[test]
fn empty_dataset_is_skipped_without_artifacts() {
    let payable = profile("accounts_payable");
    let recorder = Arc::new(Recorder::default());
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("split");
    let cfg = config(&out, 1_000);

    let report = Orchestrator::new(&cfg)
        .with_observer(recorder.clone())
        .run(&payable, DatasetSource::InMemory(payables(&[])))
        .unwrap();

    assert_eq!(report.skipped, Some(SkipReason::Empty));
    assert_eq!(report.final_stage, PipelineStage::Loaded);
    assert!(report.artifacts.is_empty());
    assert!(!out.exists());
    let events = recorder.events();
    assert_eq!(events[0], "stage Loaded");
    assert!(events[1].starts_with("warn Info dataset is empty"));
}

#[test]
fn missing_input_fails_only_that_dataset_and_alerts() {
    let payable = profile("accounts_payable");
    let recorder = Arc::new(Recorder::default());
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), 1_000);
    let options = PipelineOptions {
        observer: Some(recorder.clone()),
        alert_at_or_above: Severity::Error,
        sheet: None,
    };

    let err = Orchestrator::new(&cfg)
        .with_options(options)
        .run(&payable, DatasetSource::Path(dir.path().join("contas_a_pagar.csv")))
        .unwrap_err();

    assert!(matches!(err, ExportError::MissingInput { .. }));
    assert_eq!(recorder.events(), vec!["fail Error", "alert Error"]);
}

#[test]
fn invalid_config_is_rejected_before_loading() {
    let payable = profile("accounts_payable");
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path(), 1_000);
    cfg.safety_margin = 0.5;

    let err = Orchestrator::new(&cfg)
        .run(&payable, DatasetSource::InMemory(payables(&[d(2021, 1, 1)])))
        .unwrap_err();
    assert!(matches!(err, ExportError::InvalidConfig { .. }));
}
