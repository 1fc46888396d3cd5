//! Round-robin ping relay across echo modules.
//!
//! A `driver` module sends `ping` messages to each registered module in turn.
//! Every echo module answers with a `pong` to whoever pinged it, so traffic
//! flows in both directions through the same hub. The command waits until
//! every ping is accounted for (delivered, failed or evicted) and then prints
//! per-module counts.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::{Result, bail};
use console::style;
use serde::Serialize;

use modhub_core::{Hub, MessageHandler};
use modhub_types::error::HandlerError;

use crate::state::HostState;

/// Id the relay driver registers under.
pub const DRIVER_ID: &str = "driver";

const PING: &str = "ping";
const PONG: &str = "pong";

/// Parsed arguments of `modhub relay`.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub modules: Vec<String>,
    pub messages: usize,
    pub fail: Option<String>,
    pub queue_size: Option<usize>,
    pub timeout_ms: u64,
}

/// Per-module counters shared between a handler and the reporting code.
#[derive(Debug, Default)]
pub struct ModuleCounters {
    delivered: AtomicUsize,
    failed: AtomicUsize,
}

impl ModuleCounters {
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Echo module: answers each `ping` with a `pong` carrying the same body.
///
/// Holds the hub weakly so the hub's registry never keeps itself alive
/// through its own handlers.
pub struct EchoModule {
    id: String,
    hub: Weak<Hub>,
    failing: bool,
    counters: Arc<ModuleCounters>,
}

impl EchoModule {
    pub fn new(id: impl Into<String>, hub: &Arc<Hub>, failing: bool) -> Self {
        Self {
            id: id.into(),
            hub: Arc::downgrade(hub),
            failing,
            counters: Arc::new(ModuleCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<ModuleCounters> {
        Arc::clone(&self.counters)
    }
}

impl MessageHandler for EchoModule {
    async fn handle(&self, from: &str, content_type: &str, body: &str) -> Result<(), HandlerError> {
        if self.failing {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            return Err(HandlerError::failed(format!("{} refuses {body}", self.id)));
        }
        if content_type != PING {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            return Err(HandlerError::Rejected {
                content_type: content_type.to_string(),
            });
        }

        self.counters.delivered.fetch_add(1, Ordering::SeqCst);
        if let Some(hub) = self.hub.upgrade() {
            hub.notify(self.id.as_str(), from, PONG, body).await;
        }
        Ok(())
    }
}

/// Driver module: counts the pongs that come back.
pub struct DriverModule {
    counters: Arc<ModuleCounters>,
}

impl MessageHandler for DriverModule {
    async fn handle(&self, _from: &str, content_type: &str, _body: &str) -> Result<(), HandlerError> {
        if content_type == PONG {
            self.counters.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        } else {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::Rejected {
                content_type: content_type.to_string(),
            })
        }
    }
}

#[derive(Debug, Serialize)]
struct ModuleReport {
    sent: usize,
    delivered: usize,
    failed: usize,
    evicted: usize,
}

#[derive(Debug, Serialize)]
struct RelayReport {
    sent: usize,
    pongs: usize,
    pongs_evicted: usize,
    max_queue_size: usize,
    modules: BTreeMap<String, ModuleReport>,
}

/// Run the relay and print the per-module outcome.
pub async fn relay(state: &HostState, options: RelayOptions, json: bool) -> Result<()> {
    let mut seen = HashSet::new();
    let modules: Vec<String> = options
        .modules
        .iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty() && seen.insert(m.clone()))
        .collect();
    if modules.is_empty() {
        bail!("relay needs at least one module id");
    }
    if modules.iter().any(|m| m == DRIVER_ID) {
        bail!("'{DRIVER_ID}' is reserved for the relay driver");
    }

    let hub = state.build_hub(options.queue_size)?;

    let driver = Arc::new(ModuleCounters::default());
    hub.register_client(
        DRIVER_ID,
        DriverModule {
            counters: Arc::clone(&driver),
        },
    );

    let mut counters = BTreeMap::new();
    for id in &modules {
        let failing = options.fail.as_deref() == Some(id.as_str());
        let module = EchoModule::new(id.clone(), &hub, failing);
        counters.insert(id.clone(), module.counters());
        hub.register_client(id.clone(), module);
    }

    let mut sent = BTreeMap::<String, usize>::new();
    for (i, target) in modules.iter().cycle().take(options.messages).enumerate() {
        hub.notify(DRIVER_ID, target, PING, format!("#{i}")).await;
        *sent.entry(target.clone()).or_default() += 1;
    }
    tracing::info!(sent = options.messages, modules = modules.len(), "relay pings sent");

    let drained = tokio::time::timeout(
        Duration::from_millis(options.timeout_ms),
        wait_for_drain(&hub, &counters, &driver, options.messages),
    )
    .await;

    let report = RelayReport {
        sent: options.messages,
        pongs: driver.delivered(),
        pongs_evicted: hub.evicted_count(DRIVER_ID),
        max_queue_size: hub.config().max_queue_size,
        modules: counters
            .iter()
            .map(|(id, c)| {
                let module = ModuleReport {
                    sent: sent.get(id).copied().unwrap_or(0),
                    delivered: c.delivered(),
                    failed: c.failed(),
                    evicted: hub.evicted_count(id),
                };
                (id.clone(), module)
            })
            .collect(),
    };
    let settled = accounted(&hub, &counters);

    for id in modules.iter().map(String::as_str).chain([DRIVER_ID]) {
        hub.unregister_client(id);
    }
    hub.shutdown();

    if drained.is_err() {
        bail!(
            "relay traffic did not drain within {}ms ({} of {} pings accounted for)",
            options.timeout_ms,
            settled,
            options.messages
        );
    }

    print_report(&report, json)
}

/// Pings handled or evicted so far, summed over all echo modules.
fn accounted(hub: &Hub, counters: &BTreeMap<String, Arc<ModuleCounters>>) -> usize {
    counters
        .iter()
        .map(|(id, c)| c.delivered() + c.failed() + hub.evicted_count(id))
        .sum()
}

async fn wait_for_drain(
    hub: &Hub,
    counters: &BTreeMap<String, Arc<ModuleCounters>>,
    driver: &ModuleCounters,
    sent: usize,
) {
    loop {
        let echoed: usize = counters.values().map(|c| c.delivered()).sum();
        let pongs_settled = driver.delivered() + hub.evicted_count(DRIVER_ID);
        if accounted(hub, counters) >= sent && pongs_settled >= echoed {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn print_report(report: &RelayReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Relayed {} pings (queue size {})",
        style("◆").bold(),
        style(report.sent).bold(),
        report.max_queue_size
    );
    println!();
    println!(
        "  {:<16} {:>6} {:>10} {:>7} {:>8}",
        style("MODULE").bold(),
        style("SENT").bold(),
        style("DELIVERED").bold(),
        style("FAILED").bold(),
        style("EVICTED").bold()
    );
    for (id, m) in &report.modules {
        let failed = if m.failed > 0 {
            style(m.failed).red()
        } else {
            style(m.failed).dim()
        };
        let evicted = if m.evicted > 0 {
            style(m.evicted).yellow()
        } else {
            style(m.evicted).dim()
        };
        println!(
            "  {:<16} {:>6} {:>10} {:>7} {:>8}",
            id,
            m.sent,
            style(m.delivered).green(),
            failed,
            evicted
        );
    }
    println!();
    println!(
        "  Pongs received: {}{}",
        style(report.pongs).bold(),
        if report.pongs_evicted > 0 {
            format!(" ({} evicted)", report.pongs_evicted)
        } else {
            String::new()
        }
    );
    println!();

    Ok(())
}
