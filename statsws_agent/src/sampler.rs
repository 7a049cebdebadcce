//! Background sampler: reads the provider once per tick and queues a snapshot
//! for the encoder. Ticks are collected concurrently but delivered in tick order.

use crate::provider::MetricsProvider;
use crate::types::Snapshot;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, warn};

/// Read every section of the provider. A failing section is logged and replaced
/// with an empty value; the snapshot is always produced.
pub fn collect<P: MetricsProvider + ?Sized>(provider: &P) -> Snapshot {
    let cpu = provider.cpu_times().unwrap_or_else(|e| {
        warn!("cpu counters unavailable: {e}");
        Vec::new()
    });
    let mem = provider.memory().unwrap_or_else(|e| {
        warn!("memory counters unavailable: {e}");
        Default::default()
    });
    let net = match provider.interfaces() {
        Ok(ifaces) => ifaces
            .into_iter()
            .filter(|i| !i.mac.is_empty())
            .map(|i| (i.mac.clone(), i))
            .collect(),
        Err(e) => {
            warn!("network counters unavailable: {e}");
            HashMap::new()
        }
    };
    Snapshot {
        cpu,
        mem,
        net,
        ts: chrono::Utc::now().timestamp(),
    }
}

pub fn spawn_sampler(
    provider: Arc<dyn MetricsProvider>,
    period: Duration,
    out: mpsc::Sender<Snapshot>,
) -> JoinHandle<()> {
    // In-flight collections, queued in tick order; awaited one by one so a slow
    // tick holds back later ones instead of being overtaken.
    let (pending_tx, mut pending_rx) = mpsc::unbounded_channel::<JoinHandle<Snapshot>>();

    tokio::spawn(async move {
        while let Some(tick) = pending_rx.recv().await {
            match tick.await {
                Ok(snapshot) => {
                    if out.send(snapshot).await.is_err() {
                        debug!("snapshot queue closed");
                        break;
                    }
                }
                Err(e) => warn!("sampler tick failed: {e}"),
            }
        }
    });

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let p = provider.clone();
            let tick = tokio::task::spawn_blocking(move || collect(&*p));
            if pending_tx.send(tick).is_err() {
                // forwarder only stops once the encoder is gone
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::types::{CpuTimes, InterfaceCounters, MemoryCounters};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct FakeProvider {
        fail_cpu: bool,
        fail_mem: bool,
        fail_net: bool,
        calls: AtomicU64,
        // the first call sleeps this long
        first_delay_ms: u64,
    }

    impl MetricsProvider for FakeProvider {
        fn cpu_times(&self) -> Result<Vec<CpuTimes>, ProviderError> {
            if self.fail_cpu {
                return Err(ProviderError::Unsupported);
            }
            Ok(vec![CpuTimes {
                all: 100.0,
                busy: 10.0,
            }])
        }

        fn memory(&self) -> Result<MemoryCounters, ProviderError> {
            if self.fail_mem {
                return Err(ProviderError::Parse("nope".into()));
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 && self.first_delay_ms > 0 {
                std::thread::sleep(Duration::from_millis(self.first_delay_ms));
            }
            Ok(MemoryCounters {
                available: 0,
                total: n,
                used: 0,
            })
        }

        fn interfaces(&self) -> Result<Vec<InterfaceCounters>, ProviderError> {
            if self.fail_net {
                return Err(ProviderError::Io(std::io::Error::other("down")));
            }
            Ok(vec![
                InterfaceCounters {
                    name: "lo".into(),
                    mac: String::new(),
                    bytes_received_total: 5,
                    bytes_sent_total: 5,
                },
                InterfaceCounters {
                    name: "eth0".into(),
                    mac: "02:42:ac:11:00:02".into(),
                    bytes_received_total: 1000,
                    bytes_sent_total: 2000,
                },
            ])
        }
    }

    #[test]
    fn interfaces_without_mac_are_excluded() {
        let snap = collect(&FakeProvider::default());
        assert_eq!(snap.net.len(), 1);
        let eth = &snap.net["02:42:ac:11:00:02"];
        assert_eq!(eth.name, "eth0");
        assert_eq!(eth.bytes_received_total, 1000);
    }

    #[test]
    fn failed_section_is_replaced_with_empty() {
        let p = FakeProvider {
            fail_cpu: true,
            fail_net: true,
            ..Default::default()
        };
        let snap = collect(&p);
        assert!(snap.cpu.is_empty());
        assert!(snap.net.is_empty());
        assert_eq!(snap.mem.total, 0);
        assert!(snap.ts > 0);
    }

    #[test]
    fn memory_failure_keeps_other_sections() {
        let p = FakeProvider {
            fail_mem: true,
            ..Default::default()
        };
        let snap = collect(&p);
        assert_eq!(snap.mem, MemoryCounters::default());
        assert_eq!(snap.cpu.len(), 1);
        assert_eq!(snap.net.len(), 1);
    }

    #[tokio::test]
    async fn slow_tick_does_not_reorder_snapshots() {
        let p = Arc::new(FakeProvider {
            first_delay_ms: 150,
            ..Default::default()
        });
        let (tx, mut rx) = mpsc::channel(16);
        let handle = spawn_sampler(p, Duration::from_millis(20), tx);

        let mut seen = Vec::new();
        for _ in 0..4 {
            let snap = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("snapshot in time")
                .expect("queue open");
            seen.push(snap.mem.total);
        }
        handle.abort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn keeps_ticking_when_provider_fails() {
        let p = Arc::new(FakeProvider {
            fail_cpu: true,
            fail_mem: true,
            fail_net: true,
            ..Default::default()
        });
        let (tx, mut rx) = mpsc::channel(16);
        let handle = spawn_sampler(p, Duration::from_millis(10), tx);
        for _ in 0..3 {
            let snap = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("snapshot in time")
                .expect("queue open");
            assert!(snap.cpu.is_empty());
        }
        handle.abort();
    }
}
