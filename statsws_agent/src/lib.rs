//! Host metrics over WebSocket: a sampler reads OS counters on a timer, an
//! encoder turns consecutive readings into per-interval deltas, and a registry
//! keeps a short history and fans each delta out to connected clients.

pub mod config;
pub mod encoder;
pub mod error;
pub mod provider;
pub mod registry;
pub mod ring_buffer;
pub mod sampler;
pub mod state;
pub mod types;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::provider::MetricsProvider;
use crate::registry::Registry;

// snapshots waiting for the encoder
const SNAPSHOT_QUEUE: usize = 16;

pub struct Pipeline {
    pub sampler: JoinHandle<()>,
    pub encoder: JoinHandle<()>,
}

/// Start sampling `provider` every `period`, feeding deltas into `registry`.
pub fn spawn_pipeline(
    provider: Arc<dyn MetricsProvider>,
    period: Duration,
    registry: Registry,
) -> Pipeline {
    let (tx, rx) = mpsc::channel(SNAPSHOT_QUEUE);
    Pipeline {
        sampler: sampler::spawn_sampler(provider, period, tx),
        encoder: encoder::spawn_encoder(rx, registry),
    }
}
