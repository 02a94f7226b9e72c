//! Integration test verifying that `#[instrument]` annotations produce the
//! expected spans on driver, pool, waiter and service operations.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use quickstart_driver::{
    LedgerDriver, ProvisioningWaiter, statements,
    testutil::{fast_driver_config, fast_provisioning_config},
};
use quickstart_ledger::{
    MemoryLedgerConfig, MemoryLedgerService,
    testutil::{active_service, ledger_name},
};
use tokio_util::sync::CancellationToken;
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }
}

fn assert_span(recorded: &[String], name: &str) {
    assert!(recorded.iter().any(|s| s == name), "expected a '{name}' span, got: {recorded:?}");
}

#[tokio::test]
async fn provisioning_creates_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let service =
        MemoryLedgerService::with_config(MemoryLedgerConfig::builder().activation_polls(1).build());
    let waiter = ProvisioningWaiter::new(Arc::new(service), fast_provisioning_config());
    waiter
        .ensure_ledger_active(&ledger_name("MyLedger"), &CancellationToken::new())
        .await
        .expect("provisioning should succeed");

    let recorded = spans.lock().expect("lock poisoned");
    assert_span(&recorded, "ensure_ledger_active");
    assert_span(&recorded, "create_ledger");
    assert_span(&recorded, "describe_ledger");
}

#[tokio::test]
async fn driver_execute_creates_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let service = active_service("MyLedger").await;
    let driver = LedgerDriver::new(Arc::new(service), fast_driver_config("MyLedger"));
    driver
        .execute(
            |txn| async move { statements::create_table(&txn, "Orders").await.map(|_| ()) },
            |_| {},
        )
        .await
        .expect("create table should succeed");

    let recorded = spans.lock().expect("lock poisoned");
    assert_span(&recorded, "execute");
    assert_span(&recorded, "acquire");
    assert_span(&recorded, "start_session");
    assert_span(&recorded, "commit");
}
