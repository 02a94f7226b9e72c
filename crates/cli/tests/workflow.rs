//! Quickstart runs against the in-memory ledger service.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::{io::Write, sync::Arc, time::Duration};

use quickstart_cli::{Overrides, Quickstart, QuickstartConfig, Stage, StageStatus};
use quickstart_driver::{
    ProvisioningConfig,
    testutil::{fast_driver_config, fast_provisioning_config},
};
use quickstart_ledger::{
    LedgerState, MemoryLedgerConfig, MemoryLedgerService, testutil::ScriptedControl,
};
use tokio_util::sync::CancellationToken;

fn fast_config() -> QuickstartConfig {
    let driver = fast_driver_config("MyLedger");
    QuickstartConfig {
        table_settle_delay: Duration::ZERO,
        provisioning: fast_provisioning_config(),
        pool: driver.pool().clone(),
        retry: driver.retry().clone(),
        service: MemoryLedgerConfig::builder().activation_polls(2).build(),
        ..QuickstartConfig::default()
    }
}

fn service(config: &QuickstartConfig) -> MemoryLedgerService {
    MemoryLedgerService::with_config(config.service.clone())
}

fn assert_skipped_after_provision(report: &quickstart_cli::RunReport) {
    for stage in [Stage::CreateTable, Stage::Insert, Stage::Query] {
        let outcome = report.outcome(stage).expect("every stage is reported");
        assert!(outcome.skipped(), "{stage} should be skipped, got {outcome}");
    }
}

#[tokio::test]
async fn full_run_inserts_and_reads_back_one_document() {
    let config = fast_config();
    let service = service(&config);
    let quickstart = Quickstart::with_service(config, service.clone());

    let report = quickstart.run(&CancellationToken::new()).await.unwrap();

    assert!(report.is_success(), "{report}");
    assert_eq!(report.outcomes().len(), 4);

    let documents = service.table_documents("MyLedger", "MyTable").unwrap();
    assert_eq!(documents.len(), 1);
    assert!(documents[0].get("mytabledate").and_then(|v| v.as_i64()).is_some());

    match &report.outcome(Stage::Query).unwrap().status {
        StageStatus::Succeeded { detail } => assert_eq!(detail, "1 documents in MyTable"),
        other => panic!("unexpected query status {other:?}"),
    }
}

#[tokio::test]
async fn second_run_reuses_the_existing_ledger() {
    let config = fast_config();
    let service = service(&config);

    let first = Quickstart::with_service(config.clone(), service.clone());
    assert!(first.run(&CancellationToken::new()).await.unwrap().is_success());

    // The table already exists, so only create-table fails on the second run
    let second = Quickstart::with_service(config, service.clone());
    let report = second.run(&CancellationToken::new()).await.unwrap();

    assert!(report.outcome(Stage::Provision).unwrap().succeeded());
    assert!(matches!(
        report.outcome(Stage::CreateTable).unwrap().status,
        StageStatus::Failed { fatal: false, .. }
    ));
    assert!(report.outcome(Stage::Insert).unwrap().succeeded());
    assert!(report.outcome(Stage::Query).unwrap().succeeded());
    assert_eq!(service.table_documents("MyLedger", "MyTable").unwrap().len(), 2);
}

#[tokio::test]
async fn conflicts_are_retried_inside_a_stage() {
    let config = fast_config();
    let service = service(&config);
    service.inject_conflicts(2);

    let quickstart = Quickstart::with_service(config, service.clone());
    let report = quickstart.run(&CancellationToken::new()).await.unwrap();

    assert!(report.is_success(), "{report}");
    assert_eq!(service.pending_conflicts(), 0);
}

#[tokio::test]
async fn execution_errors_do_not_stop_later_stages() {
    let config = QuickstartConfig { table_name: "bad-name".into(), ..fast_config() };
    let service = service(&config);

    let quickstart = Quickstart::with_service(config, service);
    let report = quickstart.run(&CancellationToken::new()).await.unwrap();

    assert!(!report.is_success());
    assert!(report.outcome(Stage::Provision).unwrap().succeeded());
    for stage in [Stage::CreateTable, Stage::Insert, Stage::Query] {
        let outcome = report.outcome(stage).unwrap();
        assert!(
            matches!(outcome.status, StageStatus::Failed { fatal: false, .. }),
            "{stage} should have run and failed, got {outcome}"
        );
    }
}

#[tokio::test]
async fn unreachable_service_skips_everything_after_provisioning() {
    let config = fast_config();
    let service = service(&config);
    service.set_unreachable(true);

    let quickstart = Quickstart::with_service(config, service);
    let report = quickstart.run(&CancellationToken::new()).await.unwrap();

    assert!(matches!(
        report.outcome(Stage::Provision).unwrap().status,
        StageStatus::Failed { fatal: true, .. }
    ));
    assert_skipped_after_provision(&report);
}

#[tokio::test(start_paused = true)]
async fn provisioning_timeout_skips_later_stages() {
    let provisioning = ProvisioningConfig::builder()
        .poll_interval(Duration::from_millis(10))
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let config = QuickstartConfig { provisioning, ..fast_config() };
    let sessions = service(&config);
    let control = ScriptedControl::new([LedgerState::Creating]);

    let quickstart = Quickstart::new(config, Arc::new(control), Arc::new(sessions));
    let report = quickstart.run(&CancellationToken::new()).await.unwrap();

    match &report.outcome(Stage::Provision).unwrap().status {
        StageStatus::Failed { error, .. } => assert!(error.contains("MyLedger"), "{error}"),
        other => panic!("expected provisioning failure, got {other:?}"),
    }
    assert_skipped_after_provision(&report);
}

#[tokio::test]
async fn cancelled_run_does_not_touch_the_table() {
    let config = fast_config();
    let service = service(&config);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = Quickstart::with_service(config, service.clone()).run(&cancel).await.unwrap();

    assert!(!report.outcome(Stage::Provision).unwrap().succeeded());
    assert_skipped_after_provision(&report);
    assert!(service.table_documents("MyLedger", "MyTable").is_none());
}

fn settling_config() -> QuickstartConfig {
    QuickstartConfig {
        table_settle_delay: QuickstartConfig::default().table_settle_delay,
        ..fast_config()
    }
}

#[tokio::test(start_paused = true)]
async fn insert_waits_for_the_table_to_settle() {
    let config = settling_config();
    let settle = config.table_settle_delay;
    assert_eq!(settle, Duration::from_secs(5));
    let service = service(&config);

    let start = tokio::time::Instant::now();
    let quickstart = Quickstart::with_service(config, service.clone());
    let report = quickstart.run(&CancellationToken::new()).await.unwrap();
    let elapsed = start.elapsed();

    assert!(report.is_success(), "{report}");
    assert!(elapsed >= settle, "run took {elapsed:?}");
    assert!(elapsed < settle + Duration::from_secs(1), "run took {elapsed:?}");
    assert_eq!(service.table_documents("MyLedger", "MyTable").unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_create_table_skips_the_settle_delay() {
    let config = QuickstartConfig { table_name: "bad-name".into(), ..settling_config() };
    let service = service(&config);

    let start = tokio::time::Instant::now();
    let quickstart = Quickstart::with_service(config, service);
    let report = quickstart.run(&CancellationToken::new()).await.unwrap();

    assert!(!report.outcome(Stage::CreateTable).unwrap().succeeded());
    assert!(start.elapsed() < Duration::from_secs(1), "run took {:?}", start.elapsed());
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_the_settle_delay_skips_insert_and_query() {
    let config = settling_config();
    let service = service(&config);
    let cancel = CancellationToken::new();

    let canceller = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        }
    });

    let start = tokio::time::Instant::now();
    let quickstart = Quickstart::with_service(config, service.clone());
    let report = quickstart.run(&cancel).await.unwrap();
    canceller.await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(5), "run took {:?}", start.elapsed());
    assert!(report.outcome(Stage::Provision).unwrap().succeeded());
    assert!(report.outcome(Stage::CreateTable).unwrap().succeeded());
    for stage in [Stage::Insert, Stage::Query] {
        match &report.outcome(stage).unwrap().status {
            StageStatus::Skipped { reason } => assert_eq!(reason, "run cancelled"),
            other => panic!("{stage} should be skipped, got {other:?}"),
        }
    }
    assert_eq!(service.table_documents("MyLedger", "MyTable"), Some(Vec::new()));
}

#[test]
fn oversized_pool_in_config_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[pool]\nmax_sessions = 9223372036854775807").unwrap();

    let err = QuickstartConfig::load(Some(file.path())).unwrap_err();
    assert!(format!("{err:#}").contains("max_sessions"), "{err:#}");
}

#[test]
fn config_file_and_overrides_are_merged() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
ledger_name = "FromFile"
table_name = "Orders"
table_settle_delay = "1s"

[provisioning]
poll_interval = "2s"

[service]
activation_polls = 4
"#
    )
    .unwrap();

    let config = QuickstartConfig::load(Some(file.path()))
        .unwrap()
        .with_overrides(Overrides { table_name: Some("Items".into()), ..Overrides::default() })
        .unwrap();

    assert_eq!(config.ledger_name, "FromFile");
    assert_eq!(config.table_name, "Items");
    assert_eq!(config.table_settle_delay, Duration::from_secs(1));
    assert_eq!(config.provisioning.poll_interval(), Duration::from_secs(2));
    assert_eq!(config.service.activation_polls, 4);
}

#[test]
fn invalid_config_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[retry]\nretry_limit = \"three\"").unwrap();

    let err = QuickstartConfig::load(Some(file.path())).unwrap_err();
    assert!(format!("{err:#}").contains("failed to parse config file"));
}
