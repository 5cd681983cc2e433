use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Builder;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{Level, info, warn};

use dv_router::network::{Network, Topology};
use dv_router::protocol::TableEntrySnapshot;
use dv_router::RouterConfig;

#[derive(Parser)]
#[command(name = "dv-router", about = "Distance Vector router simulator")]
struct Cli {
    /// More output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a simulated network and print the converged routing tables
    Simulate {
        #[arg(long)]
        topology: PathBuf,

        /// Router configuration shared by every router
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seconds to run before printing tables
        #[arg(long, default_value_t = 60)]
        duration: u64,

        /// Take a link down: ROUTER:ROUTER@SECONDS
        #[arg(long, value_parser = parse_link_event)]
        fail: Vec<LinkEvent>,

        /// Bring a failed link back: ROUTER:ROUTER@SECONDS
        #[arg(long, value_parser = parse_link_event)]
        restore: Vec<LinkEvent>,

        /// Send a packet once the run is over: HOST:HOST
        #[arg(long, value_parser = parse_ping)]
        ping: Vec<(String, String)>,

        /// Print tables as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a router configuration file
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
    /// Write the default router configuration
    DefaultConfig {
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct LinkEvent {
    a: String,
    b: String,
    at: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LinkAction {
    Down,
    Up,
}

fn parse_link_event(s: &str) -> Result<LinkEvent, String> {
    let (link, at) = s
        .split_once('@')
        .ok_or_else(|| format!("expected ROUTER:ROUTER@SECONDS, got {s:?}"))?;
    let (a, b) = link
        .split_once(':')
        .ok_or_else(|| format!("expected ROUTER:ROUTER, got {link:?}"))?;
    let secs: u64 = at
        .parse()
        .map_err(|e| format!("invalid time {at:?}: {e}"))?;

    if a.is_empty() || b.is_empty() {
        return Err(format!("router names must not be empty in {s:?}"));
    }

    Ok(LinkEvent {
        a: a.to_string(),
        b: b.to_string(),
        at: Duration::from_secs(secs),
    })
}

fn parse_ping(s: &str) -> Result<(String, String), String> {
    match s.split_once(':') {
        Some((src, dst)) if !src.is_empty() && !dst.is_empty() => {
            Ok((src.to_string(), dst.to_string()))
        }
        _ => Err(format!("expected HOST:HOST, got {s:?}")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::WARN
    } else {
        match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Command::CheckConfig { config } => {
            let settings = RouterConfig::load_from_file(&config)
                .and_then(|c| c.validate())
                .with_context(|| format!("checking {}", config.display()))?;
            println!("{} is valid: {:?}", config.display(), settings);
            Ok(())
        }
        Command::DefaultConfig { output } => {
            RouterConfig::default()
                .save_to_file(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Wrote default configuration to {}", output.display());
            Ok(())
        }
        Command::Simulate {
            topology,
            config,
            duration,
            fail,
            restore,
            ping,
            json,
        } => {
            let topology = Topology::load_from_file(&topology)
                .with_context(|| format!("loading topology {}", topology.display()))?;
            let config = match config {
                Some(path) => RouterConfig::load_from_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => RouterConfig::default(),
            };

            let mut schedule: Vec<(LinkEvent, LinkAction)> = fail
                .into_iter()
                .map(|event| (event, LinkAction::Down))
                .chain(restore.into_iter().map(|event| (event, LinkAction::Up)))
                .collect();
            schedule.sort_by_key(|(event, _)| event.at);

            let rt = Builder::new_multi_thread().enable_all().build()?;
            rt.block_on(simulate(
                topology,
                config,
                Duration::from_secs(duration),
                schedule,
                ping,
                json,
            ))
        }
    }
}

async fn simulate(
    topology: Topology,
    config: RouterConfig,
    duration: Duration,
    schedule: Vec<(LinkEvent, LinkAction)>,
    pings: Vec<(String, String)>,
    json: bool,
) -> Result<()> {
    let settings = config.validate()?;
    let network = Network::start(&topology, settings)?;
    let start = Instant::now();

    for (event, action) in schedule {
        if event.at > duration {
            warn!("Ignoring {:?} of {}:{} scheduled after the run ends", action, event.a, event.b);
            continue;
        }
        sleep_until(start + event.at).await;
        match action {
            LinkAction::Down => network.link_down(&event.a, &event.b).await?,
            LinkAction::Up => network.link_up(&event.a, &event.b).await?,
        }
    }

    sleep_until(start + duration).await;
    info!("Simulation ran for {}s", duration.as_secs());

    let tables = network.routing_tables().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tables)?);
    } else {
        for (router, table) in &tables {
            print!("{}", format_table(router, table)?);
        }
    }

    if !pings.is_empty() {
        for (src, dst) in &pings {
            network.send_packet(src, dst, "ping").await?;
        }
        sleep(Duration::from_millis(500)).await;

        let deliveries = network.deliveries().await;
        for (src, dst) in &pings {
            let delivered = deliveries
                .iter()
                .any(|d| &d.host == dst && &d.packet.src == src);
            println!("ping {} -> {}: {}", src, dst, if delivered { "delivered" } else { "lost" });
        }
    }

    network.shutdown().await;
    Ok(())
}

fn format_table(router: &str, table: &[TableEntrySnapshot]) -> Result<String, std::fmt::Error> {
    let mut output = String::new();
    writeln!(output, "Routing table of {}:", router)?;
    writeln!(output, "{:<12} {:<6} {:<8} {:<10}", "Destination", "Port", "Latency", "Expires")?;
    writeln!(output, "{}", "-".repeat(40))?;

    if table.is_empty() {
        writeln!(output, "No routes")?;
    }
    for entry in table {
        let expires = match entry.expires_in_ms {
            None => "never".to_string(),
            Some(ms) => format!("{:.1}s", ms as f64 / 1000.0),
        };
        writeln!(
            output,
            "{:<12} {:<6} {:<8} {:<10}",
            entry.destination,
            entry.port,
            entry.latency.to_string(),
            expires
        )?;
    }
    writeln!(output)?;
    Ok(output)
}
