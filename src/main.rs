//! Command-line entry point.

use structopt::StructOpt;
use tracing::error;
use tracing_subscriber::EnvFilter;

use netmark::core::{Proto, Role, RunConfig};

/// Network throughput and packet-loss benchmark.
#[derive(Debug, StructOpt)]
#[structopt(name = "netmark")]
struct Opt {
    /// Run as the measuring server instead of the sending client.
    #[structopt(short, long)]
    server: bool,

    /// Use TCP with length-prefixed framing instead of UDP datagrams.
    #[structopt(short, long)]
    tcp: bool,

    /// Server host to connect to (client mode).
    #[structopt(short = "H", long, default_value = "127.0.0.1")]
    host: String,

    /// Server port.
    #[structopt(short, long, default_value = "1337")]
    port: u16,

    /// Target send rate in packets per second.
    #[structopt(short, long, default_value = "1000")]
    rate: u32,

    /// Wire size of each packet in bytes, framing overhead included.
    #[structopt(short = "S", long, default_value = "1024")]
    size: u32,

    /// Packets kept in flight before waiting for send completions.
    #[structopt(short, long, default_value = "10")]
    bundle: u32,

    /// Stop after sending this many packets (client mode).
    #[structopt(short = "n", long)]
    num: Option<u64>,
}

impl Opt {
    fn into_config(self) -> RunConfig {
        RunConfig {
            role: if self.server {
                Role::Server
            } else {
                Role::Client
            },
            proto: if self.tcp { Proto::Tcp } else { Proto::Udp },
            host: self.host,
            port: self.port,
            rate: self.rate,
            payload: self.size,
            bundle: self.bundle,
            limit: self.num,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("netmark=info")),
        )
        .init();

    let config = Opt::from_args().into_config();
    if let Err(err) = netmark::bootstrap::run(config).await {
        error!("{err}");
        std::process::exit(1);
    }
}
