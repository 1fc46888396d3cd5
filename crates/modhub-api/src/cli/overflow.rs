//! Mailbox backpressure demonstration.
//!
//! Sends more messages than the mailbox holds to a module that has not
//! registered yet, reports what was kept and evicted, then registers the
//! module and confirms only the retained messages are delivered.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use console::style;
use serde::Serialize;

use modhub_core::{Hub, HubStats, handler_fn};
use modhub_types::error::HandlerError;

use crate::state::HostState;

const SENDER_ID: &str = "producer";
const SINK_ID: &str = "sink";

#[derive(Debug, Serialize)]
struct OverflowReport {
    sent: usize,
    max_queue_size: usize,
    retained: usize,
    evicted: usize,
    first_retained: Option<String>,
    last_retained: Option<String>,
    delivered_after_register: usize,
    /// Hub state before the sink registered.
    stats: HubStats,
}

/// Flood `sink` with `messages` messages and report the mailbox outcome.
pub async fn overflow(
    state: &HostState,
    messages: usize,
    queue_size: Option<usize>,
    json: bool,
) -> Result<()> {
    let hub = state.build_hub(queue_size)?;
    let report = run(&hub, messages).await;
    hub.shutdown();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Sent {} messages to an unregistered module (queue size {})",
        style("◆").bold(),
        style(report.sent).bold(),
        report.max_queue_size
    );
    println!();
    println!("  Retained:  {}", style(report.retained).green());
    let evicted = if report.evicted > 0 {
        style(report.evicted).yellow()
    } else {
        style(report.evicted).dim()
    };
    println!("  Evicted:   {evicted}");
    if let (Some(first), Some(last)) = (&report.first_retained, &report.last_retained) {
        println!("  Oldest kept: {}  Newest kept: {}", style(first).bold(), style(last).bold());
    }
    println!(
        "  Delivered after registering: {}",
        style(report.delivered_after_register).bold()
    );
    println!();

    Ok(())
}

async fn run(hub: &Arc<Hub>, messages: usize) -> Result<OverflowReport> {
    for i in 1..=messages {
        hub.notify(SENDER_ID, SINK_ID, "text", i.to_string()).await;
    }

    let pending = hub.pending_messages(SINK_ID);
    let retained = hub.queue_len(SINK_ID);
    let evicted = hub.evicted_count(SINK_ID);
    let stats = hub.stats();

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    hub.register_client(
        SINK_ID,
        handler_fn(move |_from, _content_type, _body| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HandlerError>(())
            }
        }),
    );

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while delivered.load(Ordering::SeqCst) < retained {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    if drained.is_err() {
        bail!(
            "sink only received {} of {retained} retained messages",
            delivered.load(Ordering::SeqCst)
        );
    }
    hub.unregister_client(SINK_ID);

    Ok(OverflowReport {
        sent: messages,
        max_queue_size: hub.config().max_queue_size,
        retained,
        evicted,
        first_retained: pending.first().map(|m| m.body.clone()),
        last_retained: pending.last().map(|m| m.body.clone()),
        delivered_after_register: delivered.load(Ordering::SeqCst),
        stats,
    })
}
