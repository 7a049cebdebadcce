//! Command line / environment configuration.

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "statsws_agent",
    version,
    about = "Streams host CPU, memory and network deltas to websocket clients"
)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "STATSWS_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on (0 picks a free one)
    #[arg(short, long, env = "STATSWS_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Number of deltas kept and replayed to new clients
    #[arg(short, long, env = "STATSWS_COUNT", default_value = "12")]
    pub count: NonZeroUsize,

    /// Seconds between samples
    #[arg(
        short,
        long,
        env = "STATSWS_INTERVAL",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,

    /// Frames buffered per client before it is dropped as too slow
    #[arg(long, env = "STATSWS_QUEUE_DEPTH", default_value = "64")]
    pub queue_depth: NonZeroUsize,
}

impl Config {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}
