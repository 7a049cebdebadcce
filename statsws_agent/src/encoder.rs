//! Turns consecutive snapshots into delta records.

use crate::registry::Registry;
use crate::types::{DeltaMessage, Snapshot};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Holds the previous snapshot; owned by a single task, never shared.
#[derive(Debug, Default)]
pub struct DeltaEncoder {
    previous: Option<Snapshot>,
}

impl DeltaEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` for the very first snapshot, which only sets the baseline.
    pub fn push(&mut self, current: Snapshot) -> Option<DeltaMessage> {
        let msg = self
            .previous
            .as_ref()
            .map(|previous| diff(previous, &current));
        self.previous = Some(current);
        msg
    }
}

fn diff(previous: &Snapshot, current: &Snapshot) -> DeltaMessage {
    // zip truncates to the shorter core list
    let cpu = current
        .cpu
        .iter()
        .zip(&previous.cpu)
        .map(|(c, p)| percent(c.busy - p.busy, c.all - p.all))
        .collect();

    let mem = percent(current.mem.used as f64, current.mem.total as f64);

    // Interfaces only in `current` have no baseline yet; ones only in `previous` are gone.
    let net = current
        .net
        .iter()
        .filter_map(|(mac, cur)| {
            let prev = previous.net.get(mac)?;
            Some((
                mac.clone(),
                [
                    counter_delta(cur.bytes_received_total, prev.bytes_received_total),
                    counter_delta(cur.bytes_sent_total, prev.bytes_sent_total),
                ],
            ))
        })
        .collect::<BTreeMap<_, _>>();

    DeltaMessage {
        cpu,
        mem,
        net,
        ts: current.ts,
    }
}

/// round(part / whole * 100) clamped to 0..=100. A zero (or non-finite) ratio
/// yields 0 rather than the NaN/inf plain division would give.
fn percent(part: f64, whole: f64) -> u8 {
    if whole == 0.0 {
        return 0;
    }
    let v = (part / whole * 100.0).round();
    if !v.is_finite() {
        return 0;
    }
    v.clamp(0.0, 100.0) as u8
}

/// Difference of two cumulative counters. A reset shows up as a negative delta.
fn counter_delta(current: u64, previous: u64) -> i64 {
    current.wrapping_sub(previous) as i64
}

/// Consume snapshots in order, record each delta in history and publish it.
pub fn spawn_encoder(mut rx: mpsc::Receiver<Snapshot>, registry: Registry) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut encoder = DeltaEncoder::new();
        while let Some(snapshot) = rx.recv().await {
            if let Some(msg) = encoder.push(snapshot) {
                let delivered = registry.publish(msg);
                debug!(delivered, "published update");
            }
        }
        debug!("snapshot queue closed, encoder stopping");
    })
}
