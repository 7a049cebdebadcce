//! Raw snapshots taken by the sampler and the delta records sent to observers.
//! `DeltaMessage` and `WireMessage` define the wire format; keep them stable.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Cumulative time counters for one CPU core.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    pub all: f64,
    pub busy: f64,
}

/// Absolute memory byte counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryCounters {
    pub available: u64,
    pub total: u64,
    pub used: u64,
}

/// One network interface as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    // empty when the interface has no hardware address (loopback, tunnels)
    pub mac: String,
    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,
}

/// A point-in-time reading of cumulative OS counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub cpu: Vec<CpuTimes>,
    pub mem: MemoryCounters,
    // keyed by MAC address
    pub net: HashMap<String, InterfaceCounters>,
    pub ts: i64,
}

/// Per-interval record derived from two consecutive snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeltaMessage {
    pub cpu: Vec<u8>,
    pub mem: u8,
    // mac -> [rx_delta, tx_delta]; negative on counter reset
    pub net: BTreeMap<String, [i64; 2]>,
    pub ts: i64,
}

/// Envelope written to the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage<'a> {
    Initial {
        data: &'a [DeltaMessage],
        count: usize,
        interval: u64,
    },
    Update {
        data: &'a DeltaMessage,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DeltaMessage {
        DeltaMessage {
            cpu: vec![20, 3],
            mem: 41,
            net: BTreeMap::from([("aa:bb:cc:dd:ee:ff".to_string(), [1500, -2])]),
            ts: 1_700_000_000,
        }
    }

    #[test]
    fn update_wire_shape() {
        let msg = sample();
        let v = serde_json::to_value(WireMessage::Update { data: &msg }).unwrap();
        assert_eq!(
            v,
            json!({
                "type": "update",
                "data": {
                    "cpu": [20, 3],
                    "mem": 41,
                    "net": { "aa:bb:cc:dd:ee:ff": [1500, -2] },
                    "ts": 1_700_000_000
                }
            })
        );
    }

    #[test]
    fn initial_wire_shape_carries_metadata() {
        let history = vec![sample()];
        let v = serde_json::to_value(WireMessage::Initial {
            data: &history,
            count: 12,
            interval: 5,
        })
        .unwrap();
        assert_eq!(v["type"], "initial");
        assert_eq!(v["count"], 12);
        assert_eq!(v["interval"], 5);
        assert_eq!(v["data"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn empty_initial_has_empty_data_array() {
        let v = serde_json::to_value(WireMessage::Initial {
            data: &[],
            count: 3,
            interval: 1,
        })
        .unwrap();
        assert_eq!(v["data"], json!([]));
    }
}
