//! Prefetch example binary
//!
//! Dispatches the actions a page needs, then renders it once every load has
//! settled.

use anyhow::Context;
use prefetch::{PageState, PageStore, page_actions, render, tracker_config};
use quiescence_runtime::metrics::MetricsRecorder;
use quiescence_runtime::{Dispatch, PendingTracker};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prefetch=debug,quiescence_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut metrics = MetricsRecorder::new();
    metrics.install().context("installing metrics recorder")?;

    println!("=== Prefetch Example: render once everything settles ===\n");

    let store = PageStore::new(Duration::from_millis(50));
    let (pages, mut rendered) = mpsc::unbounded_channel();

    let tracker = PendingTracker::with_flag(move |state: PageState, ever_awaited| {
        tracing::info!(ever_awaited, "Page settled");
        let _ = pages.send((render(&state), ever_awaited));
    })
    .with_config(tracker_config())
    .attach(store.clone())?;

    // Attaching settles once the debounce elapses, with nothing loaded
    let (_, ever_awaited) = rendered.recv().await.context("tracker dropped")?;
    println!("Initial settle (ever awaited: {ever_awaited})\n");

    let pipeline = tracker.wrap(store);
    for action in page_actions() {
        println!(">>> Dispatching: {action:?}");
        let _ = pipeline.dispatch(action);
    }
    println!("\nOutstanding loads: {}", tracker.outstanding());

    let (page, ever_awaited) = tokio::time::timeout(Duration::from_secs(5), rendered.recv())
        .await
        .context("page never settled")?
        .context("tracker dropped")?;

    println!("\n=== Rendered page (ever awaited: {ever_awaited}) ===\n{page}");
    println!("Settle notifications: {}", tracker.notifications());

    if let Some(exposition) = metrics.render() {
        println!("\n=== Metrics ===\n{exposition}");
    }

    Ok(())
}
