//! Recorded-frame replay.
//!
//! CSV layout (header required): `ts,value[,session_start]`
//! - `ts`: epoch milliseconds or an RFC 3339 timestamp
//! - `value`: the source's latest value at that frame; blank means the source
//!   served nothing
//! - `session_start`: optional, `true`/`1` marks the first frame of a session
//!
//! Each row is one frame. The period is `ts / period_ms`.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use zcr_runtime::{Relay, TickReport};
use zcr_schemas::{PeriodContext, PeriodKey, Sample};

use crate::ScriptedSource;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ReplayRow {
    pub ts_ms: i64,
    pub value: Option<f64>,
    pub session_start: bool,
}

pub fn parse_timestamp_ms(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    let ts: DateTime<Utc> = raw
        .parse()
        .with_context(|| format!("timestamp is neither epoch ms nor RFC 3339: {raw}"))?;
    Ok(ts.timestamp_millis())
}

pub fn load_samples_csv(path: &str) -> Result<Vec<ReplayRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("open samples csv: {path}"))?;
    let mut out = Vec::new();

    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("read samples csv row {}", i + 1))?;
        let ts_ms = parse_timestamp_ms(rec.get(0).unwrap_or_default())
            .with_context(|| format!("row {}: ts", i + 1))?;
        let value = match rec.get(1).unwrap_or_default() {
            "" => None,
            v => Some(
                v.parse::<f64>()
                    .with_context(|| format!("row {}: value", i + 1))?,
            ),
        };
        let session_start = matches!(
            rec.get(2).unwrap_or_default().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        );
        out.push(ReplayRow {
            ts_ms,
            value,
            session_start,
        });
    }

    for w in out.windows(2) {
        if w[0].ts_ms >= w[1].ts_ms {
            bail!("samples not strictly increasing at ts {}", w[1].ts_ms);
        }
    }

    Ok(out)
}

/// Frame context for a timestamp on a fixed period grid.
pub fn frame_context(ts_ms: i64, period_ms: i64, session_start: bool) -> Result<PeriodContext> {
    if period_ms <= 0 {
        bail!("period_ms must be positive, got {period_ms}");
    }
    if ts_ms < 0 {
        bail!("negative timestamp {ts_ms} cannot be placed on the period grid");
    }
    let period = ts_ms / period_ms;
    Ok(PeriodContext::new(PeriodKey(period as u64), period * period_ms, ts_ms)
        .with_session_start(session_start))
}

/// Publish each row on `source` under `key` and tick the relay once per row.
pub fn run_replay(
    relay: &mut Relay,
    source: &ScriptedSource,
    key: &str,
    rows: &[ReplayRow],
    period_ms: i64,
) -> Result<Vec<TickReport>> {
    let mut reports = Vec::with_capacity(rows.len());
    for row in rows {
        let ctx = frame_context(row.ts_ms, period_ms, row.session_start)?;
        match row.value {
            Some(v) => source.push(key, Sample::new(row.ts_ms, v)),
            None => source.silence(key),
        }
        reports.push(relay.on_tick(ctx));
    }
    Ok(reports)
}
