//! Integration tests for the descriptive-label backfill

#![cfg(feature = "duckdb-backend")]

use comex_loader::database::sql::Ident;
use comex_loader::database::{CellValue, DatabaseBackend, DatabaseConfig, DuckDBBackend};
use comex_loader::ingest::enrich::STAGING_TABLE;
use comex_loader::ingest::{
    BackfillStatus, Backfiller, Batch, Direction, LoadMode, ReferenceMapping, ingest_batch,
    table_status,
};
use encoding_rs::UTF_8;

const EXTRACT: &str = "CO_ANO;CO_MES;CO_NCM;CO_UNID;CO_PAIS;SG_UF_NCM;CO_VIA;CO_URF;KG_LIQUIDO\n\
                       2021;1;\"01012100\";11;249;\"SP\";1;817600;150\n\
                       2021;1;\"02023000\";10;63;\"MG\";4;817700;20\n";

async fn loaded_export_table() -> DuckDBBackend {
    let backend = DuckDBBackend::in_memory().unwrap();
    let batch = Batch::from_reader(EXTRACT.as_bytes(), b';', UTF_8).unwrap();
    ingest_batch(
        &backend,
        &DatabaseConfig::new(),
        &batch,
        Direction::Export,
        LoadMode::Incremental,
    )
    .await
    .unwrap();
    backend
}

fn horses() -> ReferenceMapping {
    let mut mapping = ReferenceMapping::new();
    mapping.insert("01012100", "Horses");
    mapping
}

async fn labels(backend: &DuckDBBackend, table: &str) -> Vec<(i64, CellValue)> {
    let result = backend
        .execute_query(&format!(
            "SELECT \"CO_NCM\", no_ncm_por FROM \"{}\" ORDER BY \"CO_NCM\"",
            table
        ))
        .await
        .unwrap();
    result
        .rows
        .into_iter()
        .map(|row| match &row[0] {
            CellValue::Integer(code) => (*code, row[1].clone()),
            other => panic!("unexpected code {:?}", other),
        })
        .collect()
}

#[tokio::test]
async fn test_backfill_sets_mapped_labels_only() {
    let backend = loaded_export_table().await;
    let backfiller = Backfiller::new(&backend, "CO_NCM", "no_ncm_por");

    let reports = backfiller
        .backfill(&horses(), &["export_data"])
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, BackfillStatus::Updated);
    assert_eq!(reports[0].rows_updated, 1);

    assert_eq!(
        labels(&backend, "export_data").await,
        vec![
            (1012100, CellValue::Text("Horses".to_string())),
            (2023000, CellValue::Null),
        ]
    );
}

#[tokio::test]
async fn test_backfill_is_idempotent() {
    let backend = loaded_export_table().await;
    let backfiller = Backfiller::new(&backend, "CO_NCM", "no_ncm_por");

    backfiller.backfill(&horses(), &["export_data"]).await.unwrap();
    let after_first = labels(&backend, "export_data").await;

    let reports = backfiller
        .backfill(&horses(), &["export_data"])
        .await
        .unwrap();
    assert_eq!(reports[0].status, BackfillStatus::Updated);
    assert_eq!(reports[0].rows_updated, 0);
    assert_eq!(labels(&backend, "export_data").await, after_first);
}

#[tokio::test]
async fn test_missing_target_is_skipped_and_next_attempted() {
    let backend = loaded_export_table().await;
    let backfiller = Backfiller::new(&backend, "CO_NCM", "no_ncm_por");

    let reports = backfiller
        .backfill(&horses(), &["import_data", "bad-name", "export_data"])
        .await
        .unwrap();
    assert_eq!(reports.len(), 3);
    assert!(matches!(reports[0].status, BackfillStatus::Skipped(_)));
    assert!(matches!(reports[1].status, BackfillStatus::Failed(_)));
    assert_eq!(reports[2].status, BackfillStatus::Updated);
    assert_eq!(reports[2].rows_updated, 1);
}

#[tokio::test]
async fn test_failed_target_is_rolled_back_and_next_attempted() {
    let backend = DuckDBBackend::in_memory().unwrap();
    backend
        .execute("CREATE TABLE export_data (\"CO_NCM\" BIGINT, no_ncm_por BIGINT)")
        .await
        .unwrap();
    backend
        .execute("INSERT INTO export_data VALUES (1012100, NULL)")
        .await
        .unwrap();
    backend
        .execute("CREATE TABLE import_data (\"CO_NCM\" BIGINT, no_ncm_por TEXT)")
        .await
        .unwrap();
    backend
        .execute("INSERT INTO import_data VALUES (1012100, NULL)")
        .await
        .unwrap();

    let reports = Backfiller::new(&backend, "CO_NCM", "no_ncm_por")
        .backfill(&horses(), &["export_data", "import_data"])
        .await
        .unwrap();
    assert!(matches!(reports[0].status, BackfillStatus::Failed(_)));
    assert_eq!(reports[0].rows_updated, 0);
    assert_eq!(reports[1].status, BackfillStatus::Updated);
    assert_eq!(reports[1].rows_updated, 1);

    let labelled = backend
        .count("SELECT COUNT(*) FROM export_data WHERE no_ncm_por IS NOT NULL")
        .await
        .unwrap();
    assert_eq!(labelled, 0);
    assert_eq!(row_count_of(&backend, "export_data").await, 1);

    let staging = backend
        .count(&format!(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = '{}'",
            STAGING_TABLE
        ))
        .await
        .unwrap();
    assert_eq!(staging, 0);
}

async fn row_count_of(backend: &DuckDBBackend, table: &str) -> u64 {
    backend
        .count(&format!("SELECT COUNT(*) FROM \"{}\"", table))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_backfill_adds_missing_description_column() {
    let backend = DuckDBBackend::in_memory().unwrap();
    backend
        .execute("CREATE TABLE import_data (\"CO_NCM\" BIGINT, \"KG_LIQUIDO\" DOUBLE)")
        .await
        .unwrap();
    backend
        .execute("INSERT INTO import_data VALUES (1012100, 5.0), (99999999, 1.0)")
        .await
        .unwrap();

    let reports = Backfiller::new(&backend, "CO_NCM", "no_ncm_por")
        .backfill(&horses(), &["import_data"])
        .await
        .unwrap();
    assert_eq!(reports[0].rows_updated, 1);

    let columns = backend
        .table_columns(&Ident::new("import_data").unwrap())
        .await
        .unwrap();
    assert!(columns.iter().any(|(name, _)| name == "no_ncm_por"));
    assert_eq!(
        labels(&backend, "import_data").await,
        vec![
            (1012100, CellValue::Text("Horses".to_string())),
            (99999999, CellValue::Null),
        ]
    );
}

#[tokio::test]
async fn test_unnormalizable_codes_are_skipped() {
    let backend = loaded_export_table().await;
    let mut mapping = horses();
    mapping.insert("0101.21", "Not a code");

    let reports = Backfiller::new(&backend, "CO_NCM", "no_ncm_por")
        .backfill(&mapping, &["export_data"])
        .await
        .unwrap();
    assert_eq!(reports[0].status, BackfillStatus::Updated);
    assert_eq!(reports[0].codes_skipped, 1);
    assert_eq!(reports[0].rows_updated, 1);
}

#[tokio::test]
async fn test_staging_table_is_dropped() {
    let backend = loaded_export_table().await;
    Backfiller::new(&backend, "CO_NCM", "no_ncm_por")
        .backfill(&horses(), &["export_data"])
        .await
        .unwrap();

    let remaining = backend
        .count(&format!(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = '{}'",
            STAGING_TABLE
        ))
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn test_status_counts_labelled_rows() {
    let backend = loaded_export_table().await;
    Backfiller::new(&backend, "CO_NCM", "no_ncm_por")
        .backfill(&horses(), &["export_data"])
        .await
        .unwrap();

    let statuses = table_status(&backend, "no_ncm_por").await.unwrap();
    let export = &statuses[0];
    assert!(export.exists);
    assert_eq!(export.rows, 2);
    assert_eq!(export.labelled_rows, 1);
    assert!(export.constraint);
    assert!(!statuses[1].exists);
}

#[tokio::test]
async fn test_reference_file_end_to_end() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("NCM.csv");
    std::fs::write(
        &path,
        b"\"CO_NCM\";\"CO_UNID\";\"NO_NCM_POR\"\n\
          \"01012100\";\"11\";\"Cavalos reprodutores de ra\xe7a pura\"\n\
          \"02023000\";\"10\";\"Carnes desossadas\"\n\
          \"02023000\";\"10\";\"Carnes desossadas de bovino, congeladas\"\n",
    )
    .unwrap();

    let encoding = encoding_rs::Encoding::for_label(b"iso-8859-1").unwrap();
    let mapping = ReferenceMapping::from_path(&path, encoding, "CO_NCM", "NO_NCM_POR").unwrap();
    assert_eq!(mapping.len(), 2);

    let backend = loaded_export_table().await;
    Backfiller::new(&backend, "CO_NCM", "no_ncm_por")
        .backfill(&mapping, &["export_data"])
        .await
        .unwrap();

    assert_eq!(
        labels(&backend, "export_data").await,
        vec![
            (
                1012100,
                CellValue::Text("Cavalos reprodutores de raça pura".to_string())
            ),
            (
                2023000,
                CellValue::Text("Carnes desossadas de bovino, congeladas".to_string())
            ),
        ]
    );
}
