//! `zcr replay`: drive the relay from a samples CSV against paper endpoints.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use serde_json::json;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use zcr_config::{load_relay_config, report_unused_keys, UnusedKeyPolicy};
use zcr_router::{AsyncEndpoint, DispatchReport, Endpoint, EndpointRegistry, RouteOutcome};
use zcr_runtime::{selection_store_for, Relay, TickReport};
use zcr_schemas::SourceHandle;
use zcr_signal::Decision;
use zcr_testkit::{load_samples_csv, run_replay, PaperEndpoint, PaperEvent, ScriptedSource};

const DEFAULT_SOURCE_KEY: &str = "osc#0";
const DEFAULT_ENDPOINT: &str = "paper";

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Samples CSV: ts,value[,session_start]
    #[arg(long)]
    pub samples: String,

    /// Layered config paths in merge order
    #[arg(long = "config")]
    pub config_paths: Vec<String>,

    /// Paper endpoint names, registered in this priority order (default: "paper")
    #[arg(long = "endpoint")]
    pub endpoints: Vec<String>,

    /// Endpoints that fail their existence probe for the whole replay
    #[arg(long = "unreachable")]
    pub unreachable: Vec<String>,

    /// Endpoints that acknowledge entries without taking a position
    #[arg(long = "no-fill")]
    pub no_fill: Vec<String>,

    /// Arm the relay before the first frame (boots disarmed otherwise)
    #[arg(long, default_value_t = false)]
    pub arm: bool,

    /// Period length used to place timestamps on the period grid
    #[arg(long, default_value_t = 60_000)]
    pub period_ms: i64,

    /// Emit one JSON object per frame instead of text lines
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Fail when the config has keys the relay does not read
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    /// Deliver endpoint commands on background tasks
    #[arg(long, default_value_t = false)]
    pub async_dispatch: bool,
}

#[derive(Debug, Serialize)]
struct ReplaySummary {
    frames: usize,
    accepted_entries: usize,
    accepted_closes: usize,
    refused: usize,
}

pub async fn run(args: ReplayArgs) -> Result<()> {
    let path_refs: Vec<&str> = args.config_paths.iter().map(|s| s.as_str()).collect();
    let (loaded, cfg) = load_relay_config(&path_refs)?;
    let policy = if args.strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let unused = report_unused_keys(&loaded.config_json, policy)?;
    for ptr in &unused.unused_leaf_pointers {
        warn!(key = %ptr, "config key is not read by the relay");
    }

    let rows = load_samples_csv(&args.samples)?;

    let handle = parse_source_key(cfg.source.selected.as_deref().unwrap_or(DEFAULT_SOURCE_KEY))?;
    let key = handle.key();
    let source = Arc::new(ScriptedSource::new(vec![handle]));

    let names = if args.endpoints.is_empty() {
        vec![DEFAULT_ENDPOINT.to_string()]
    } else {
        args.endpoints.clone()
    };
    for n in args.unreachable.iter().chain(args.no_fill.iter()) {
        if !names.contains(n) {
            bail!("unknown endpoint name: {n}");
        }
    }

    let mut papers: Vec<Arc<PaperEndpoint>> = Vec::with_capacity(names.len());
    let mut workers: Vec<(String, JoinHandle<DispatchReport>)> = Vec::new();
    let mut endpoints = EndpointRegistry::new();
    for (priority, name) in names.iter().enumerate() {
        let paper = Arc::new(PaperEndpoint::new());
        paper.set_reachable(!args.unreachable.contains(name));
        paper.set_fill_entries(!args.no_fill.contains(name));
        papers.push(Arc::clone(&paper));

        let endpoint: Arc<dyn Endpoint> = if args.async_dispatch {
            let (wrapped, worker) = AsyncEndpoint::spawn(name.clone(), paper, &Handle::current());
            workers.push((name.clone(), worker));
            Arc::new(wrapped) as Arc<dyn Endpoint>
        } else {
            paper as Arc<dyn Endpoint>
        };
        endpoints
            .register(name.clone(), priority as u32, endpoint)
            .with_context(|| format!("register endpoint {name}"))?;
    }

    // Built inside the runtime, so rescans after dead frames run in the background.
    let mut relay = Relay::new(&cfg, source.clone(), endpoints, selection_store_for(&cfg.source))?;
    let primed = relay.prime_catalog(rows.first().map_or(0, |r| r.ts_ms));
    debug!(?primed, selected = ?relay.selected().map(SourceHandle::key), "catalog primed");
    if args.arm {
        relay.arm();
    }

    let run_id = Uuid::new_v4();
    let started_at = Utc::now().to_rfc3339();
    info!(%run_id, frames = rows.len(), config_hash = %loaded.config_hash, "replay starting");
    if args.json {
        println!(
            "{}",
            json!({ "run_id": run_id.to_string(), "started_at": started_at, "config_hash": loaded.config_hash })
        );
    } else {
        println!(
            "replay run_id={run_id} started_at={started_at} config_hash={}",
            loaded.config_hash
        );
    }

    let reports = run_replay(&mut relay, &source, &key, &rows, args.period_ms)?;
    for r in &reports {
        if args.json {
            println!("{}", serde_json::to_string(r).context("serialize tick report")?);
        } else {
            println!("{}", describe_tick(r));
        }
    }

    let snapshot = relay.snapshot();
    // Dropping the relay drops the dispatch senders so the workers can finish.
    drop(relay);
    for (name, worker) in workers {
        match worker.await {
            Ok(report) => info!(
                endpoint = %name,
                delivered = report.delivered,
                refused = report.refused,
                "dispatch worker finished"
            ),
            Err(err) => warn!(endpoint = %name, error = %err, "dispatch worker failed"),
        }
    }

    let summary = summarize(reports.len(), &papers);
    if args.json {
        println!("{}", json!({ "summary": summary, "snapshot": snapshot }));
    } else {
        println!(
            "summary frames={} accepted_entries={} accepted_closes={} refused={} final_state={}",
            summary.frames,
            summary.accepted_entries,
            summary.accepted_closes,
            summary.refused,
            snake(&snapshot.state)
        );
    }
    Ok(())
}

fn parse_source_key(key: &str) -> Result<SourceHandle> {
    let Some((source, channel)) = key.split_once('#') else {
        bail!("source key must look like <source>#<channel>: {key}");
    };
    let channel: usize = channel
        .parse()
        .with_context(|| format!("source key channel is not a number: {key}"))?;
    Ok(SourceHandle::new(source, channel, key))
}

fn summarize(frames: usize, papers: &[Arc<PaperEndpoint>]) -> ReplaySummary {
    let mut summary = ReplaySummary {
        frames,
        accepted_entries: 0,
        accepted_closes: 0,
        refused: 0,
    };
    for event in papers.iter().flat_map(|p| p.journal()) {
        match (&event, event.is_accepted()) {
            (_, false) => summary.refused += 1,
            (PaperEvent::Entry { .. }, true) => summary.accepted_entries += 1,
            (PaperEvent::Close { .. }, true) => summary.accepted_closes += 1,
        }
    }
    summary
}

/// Serialized snake_case name of a unit-like value.
fn snake<T: Serialize>(v: &T) -> String {
    serde_json::to_value(v)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "?".to_string())
}

fn describe_decision(d: &Decision) -> String {
    match d {
        Decision::Hold => "hold".to_string(),
        Decision::ForcedFlat => "forced_flat".to_string(),
        Decision::Enter { direction, kind } => format!("enter {direction} ({})", snake(kind)),
        Decision::Close { reason } => format!("close ({})", reason.as_str()),
        Decision::Blocked(reason) => format!("blocked {}", snake(reason)),
    }
}

fn describe_route(r: &RouteOutcome) -> String {
    match r {
        RouteOutcome::Accepted { endpoint, .. } => format!("accepted:{endpoint}"),
        RouteOutcome::Throttled { .. } => "throttled".to_string(),
        RouteOutcome::NothingToClose => "nothing_to_close".to_string(),
        RouteOutcome::NotSent { .. } => "not_sent".to_string(),
    }
}

fn describe_tick(r: &TickReport) -> String {
    let value = r
        .reading
        .value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{} ts={} value={} note={} decision={}",
        r.period,
        r.now_ms,
        value,
        r.reading.note.as_str(),
        describe_decision(&r.decision)
    );
    if let Some(route) = &r.route {
        line.push_str(&format!(" route={}", describe_route(route)));
    }
    if let Some(cancel) = &r.cancel {
        line.push_str(&format!(" cancel={}", describe_route(cancel)));
    }
    if r.rediscovery_requested {
        line.push_str(" rediscover");
    }
    line
}
