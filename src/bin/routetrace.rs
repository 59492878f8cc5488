use anyhow::{Context, Result, bail};
use clap::Parser;
use env_logger::Env;
use std::time::Duration;
use tokio::net::UdpSocket;

use link_state_emulator::network::resolve_host;
use link_state_emulator::trace::{RouteTracer, format_route};

#[derive(Parser)]
#[command(name = "routetrace", about = "Trace the path between two emulators")]
struct Cli {
    /// Port this tool receives replies on
    #[arg(short = 'a')]
    port: u16,

    #[arg(short = 'b')]
    source_host: String,

    #[arg(short = 'c')]
    source_port: u16,

    #[arg(short = 'd')]
    destination_host: String,

    #[arg(short = 'e')]
    destination_port: u16,

    /// Debug option: 1 logs every probe and reply
    #[arg(short = 'f', default_value_t = 0)]
    debug: u8,

    /// Address routers send replies to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    #[arg(long, default_value_t = 32)]
    max_hops: u32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.debug > 1 {
        bail!("debug option must be 0 or 1");
    }

    let local = resolve_host(&cli.host, cli.port)?;
    let source = resolve_host(&cli.source_host, cli.source_port)?;
    let destination = resolve_host(&cli.destination_host, cli.destination_port)?;

    let socket = UdpSocket::bind(local.socket_addr())
        .await
        .with_context(|| format!("failed to bind {}", local))?;

    let tracer = RouteTracer::new(local, source, destination)
        .with_probe_timeout(Duration::from_millis(cli.timeout_ms))
        .with_max_hops(cli.max_hops)
        .with_debug(cli.debug == 1);

    let hops = tracer
        .trace(&socket)
        .await
        .with_context(|| format!("route trace from {} to {} failed", source, destination))?;

    print!("{}", format_route(&hops));
    Ok(())
}
