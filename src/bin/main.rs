use clap::Parser;
use log::error;
use sperf::units::parse_byte_limit;
use sperf::{Config, DisplayUnit, Session};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "sperf")]
#[command(about = "A parallel TCP throughput measurement tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Run in server (sink) mode
    #[arg(short = 's', long = "server", conflicts_with = "client")]
    server: bool,

    /// Run in client (source) mode
    #[arg(short = 'c', long = "client")]
    client: bool,

    /// IP address of the server interface to bind to (server mode)
    #[arg(short = 'b', long = "bind", default_value = "127.0.0.1")]
    bind: String,

    /// Port number
    #[arg(short = 'p', long = "port", default_value_t = 8088)]
    port: u16,

    /// Output data format: B, KB or MB
    #[arg(short = 'f', long = "format", default_value = "MB", value_parser = parse_unit)]
    format: DisplayUnit,

    /// IP address of the server to connect to (client mode)
    #[arg(short = 'I', long = "serverip", default_value = "127.0.0.1")]
    serverip: String,

    /// Total duration in seconds for which data should be generated
    #[arg(short = 't', long = "time", default_value_t = 25)]
    time: u64,

    /// Print statistics every given number of seconds
    #[arg(short = 'i', long = "interval", default_value_t = 1)]
    interval: u64,

    /// Number of parallel connections
    #[arg(short = 'P', long = "parallel", default_value_t = 1)]
    parallel: usize,

    /// Total number of bytes to transfer, with optional B/KB/MB suffix;
    /// takes precedence over the duration
    #[arg(short = 'n', long = "num")]
    num: Option<String>,
}

fn parse_unit(s: &str) -> Result<DisplayUnit, String> {
    s.parse().map_err(|e: sperf::Error| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if cli.server {
        run_server(cli).await
    } else if cli.client {
        run_client(cli).await
    } else {
        anyhow::bail!("you need to specify either server (-s) or client (-c) mode");
    }
}

async fn run_server(cli: Cli) -> anyhow::Result<()> {
    let config = Config::sink(cli.bind.clone(), cli.port)
        .with_interval(Duration::from_secs(cli.interval.max(1)))
        .with_unit(cli.format);

    let listener = TcpListener::bind((cli.bind.as_str(), cli.port)).await?;

    println!("-----------------------------------------------------------");
    println!("A sperf server listening on {}, port {}", cli.bind, cli.port);
    println!("-----------------------------------------------------------");

    loop {
        let session = Session::new(config.clone())?.with_row_sink(|row: &str| println!("{}", row));
        match session.serve(&listener).await {
            Ok(_) => {}
            Err(e) => error!("Session failed: {}", e),
        }
    }
}

async fn run_client(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::source(cli.serverip.clone(), cli.port)
        .with_duration(Duration::from_secs(cli.time))
        .with_parallel(cli.parallel)
        .with_interval(Duration::from_secs(cli.interval.max(1)))
        .with_unit(cli.format);

    if let Some(num) = &cli.num {
        config = config.with_byte_limit(parse_byte_limit(num)?);
    }

    println!("-----------------------------------------------------------");
    println!(
        "A sperf client connecting to server {}, port {}",
        cli.serverip, cli.port
    );
    println!("-----------------------------------------------------------");

    let session = Session::new(config)?.with_row_sink(|row: &str| println!("{}", row));
    let result = session.run().await?;

    if result.is_partial() {
        anyhow::bail!("session finished partial: one or more streams failed");
    }
    Ok(())
}
