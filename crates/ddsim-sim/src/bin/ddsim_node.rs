//! ddsim-node — run the HelloWorld simulation over the simulated transport.
//!
//! ```text
//! ddsim-node --samples 20 --interval-ms 50 --loss 0.1 --delay-ms 20 --jitter-ms 5
//! ddsim-node --config sim.toml --json
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use ddsim_sim::{HelloWorldSimulator, SimulatorConfig};
use ddsim_transport::descriptor::DelayPattern;
use ddsim_transport::{SimulatedDescriptor, TransportDescriptor};

fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    // ── Parse CLI ───────────────────────────────────────────────
    let args = parse_args()?;
    let descriptor = build_descriptor(&args)?;

    tracing::info!(
        config = ?args.config,
        samples = args.samples,
        interval_ms = args.interval_ms,
        loss = descriptor.packet_loss_rate,
        corruption = descriptor.packet_corruption_rate,
        delay_ms = descriptor.network_delay_ms,
        jitter_ms = descriptor.delay_jitter_ms,
        seed = descriptor.seed,
        "ddsim-node starting"
    );

    // ── Run ─────────────────────────────────────────────────────
    let config = SimulatorConfig {
        samples: args.samples,
        interval: Duration::from_millis(args.interval_ms),
        ..Default::default()
    };
    let simulator = HelloWorldSimulator::new(config, descriptor)?;
    let report = simulator.run()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "published {}  received {}  undecodable {}  injected {}",
            report.published,
            report.received,
            report.undecodable,
            if report.injected_received { "ok" } else { "missing" }
        );
        println!(
            "dropped {}  corrupted {}  delayed {}  discarded {}  simulated time {}s",
            report.transport.frames_dropped,
            report.transport.frames_corrupted,
            report.transport.frames_delayed,
            report.transport.frames_discarded,
            report.simulated_time
        );
        if let Some(captures) = &report.captures {
            print!("{captures}");
        }
    }
    Ok(())
}

fn build_descriptor(args: &Args) -> anyhow::Result<SimulatedDescriptor> {
    let mut descriptor = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            match TransportDescriptor::from_toml_str(&text)? {
                TransportDescriptor::Simulated(d) => d,
                other => bail!(
                    "{} describes a {} transport; only simulated transports can run",
                    path.display(),
                    other.kind_name()
                ),
            }
        }
        None => SimulatedDescriptor::default(),
    };

    if let Some(loss) = args.loss {
        descriptor.packet_loss_rate = loss;
    }
    if let Some(corruption) = args.corruption {
        descriptor.packet_corruption_rate = corruption;
    }
    if let Some(delay) = args.delay_ms {
        descriptor.network_delay_ms = delay;
    }
    if let Some(jitter) = args.jitter_ms {
        descriptor.delay_jitter_ms = jitter;
        if descriptor.delay_pattern == DelayPattern::Fixed {
            descriptor.delay_pattern = DelayPattern::Normal;
        }
    }
    if let Some(seed) = args.seed {
        descriptor.seed = seed;
    }
    descriptor.validate()?;
    Ok(descriptor)
}

struct Args {
    config: Option<PathBuf>,
    samples: u32,
    interval_ms: u64,
    loss: Option<f64>,
    corruption: Option<f64>,
    delay_ms: Option<u32>,
    jitter_ms: Option<u32>,
    seed: Option<u64>,
    json: bool,
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> anyhow::Result<&'a String> {
    args.get(i)
        .ok_or_else(|| anyhow!("{} requires a value", flag))
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        config: None,
        samples: 10,
        interval_ms: 100,
        loss: None,
        corruption: None,
        delay_ms: None,
        jitter_ms: None,
        seed: None,
        json: false,
    };

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--config" | "-c" => {
                i += 1;
                parsed.config = Some(PathBuf::from(value(&args, i, flag)?));
            }
            "--samples" | "-n" => {
                i += 1;
                let val = value(&args, i, flag)?;
                parsed.samples = val
                    .parse()
                    .map_err(|e| anyhow!("invalid sample count '{}': {}", val, e))?;
            }
            "--interval-ms" => {
                i += 1;
                let val = value(&args, i, flag)?;
                parsed.interval_ms = val
                    .parse()
                    .map_err(|e| anyhow!("invalid interval '{}': {}", val, e))?;
            }
            "--loss" => {
                i += 1;
                let val = value(&args, i, flag)?;
                parsed.loss = Some(
                    val.parse()
                        .map_err(|e| anyhow!("invalid loss rate '{}': {}", val, e))?,
                );
            }
            "--corruption" => {
                i += 1;
                let val = value(&args, i, flag)?;
                parsed.corruption = Some(
                    val.parse()
                        .map_err(|e| anyhow!("invalid corruption rate '{}': {}", val, e))?,
                );
            }
            "--delay-ms" => {
                i += 1;
                let val = value(&args, i, flag)?;
                parsed.delay_ms = Some(
                    val.parse()
                        .map_err(|e| anyhow!("invalid delay '{}': {}", val, e))?,
                );
            }
            "--jitter-ms" => {
                i += 1;
                let val = value(&args, i, flag)?;
                parsed.jitter_ms = Some(
                    val.parse()
                        .map_err(|e| anyhow!("invalid jitter '{}': {}", val, e))?,
                );
            }
            "--seed" => {
                i += 1;
                let val = value(&args, i, flag)?;
                parsed.seed = Some(
                    val.parse()
                        .map_err(|e| anyhow!("invalid seed '{}': {}", val, e))?,
                );
            }
            "--json" => parsed.json = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => bail!("unknown argument '{}' (see --help)", other),
        }
        i += 1;
    }
    Ok(parsed)
}

fn print_help() {
    println!(
        "ddsim-node — HelloWorld over a simulated lossy network

USAGE:
    ddsim-node [OPTIONS]

OPTIONS:
    -c, --config <PATH>     TOML transport descriptor (kind = \"simulated\")
    -n, --samples <N>       Samples to publish [default: 10]
        --interval-ms <MS>  Gap between samples [default: 100]
        --loss <RATE>       Packet loss rate, 0..1
        --corruption <RATE> Packet corruption rate, 0..1
        --delay-ms <MS>     Base network delay
        --jitter-ms <MS>    Delay jitter (switches a fixed delay to normal)
        --seed <N>          Fault injection seed
        --json              Print the run report as JSON
    -h, --help              Show this help

ENVIRONMENT:
    RUST_LOG                Log filter [default: info]"
    );
}
