use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Local;
use clap::Parser;
use serde::Deserialize;

use pw_local::status::format::{format_power_table, BatteryOutlook};
use pw_local::status::device::DeviceStatus;
use pw_local::status::{device, system, StatusError};
use pw_local::{Din, Gateway, GatewayConfig, GatewayError, Query};

#[derive(Parser, Debug)]
#[command(about = "Print a status summary from a battery gateway on the local network")]
struct Args {
    /// Gateway secret
    #[arg(long, env = "PW_SECRET")]
    secret: Option<String>,

    /// Gateway address
    #[arg(long)]
    host: Option<String>,

    /// Minimum battery W to report charge/discharge time for
    #[arg(long, default_value_t = 100.0)]
    min: f64,

    /// JSON file with secret/remote/din/timeout_secs
    #[arg(long)]
    config: Option<PathBuf>,

    /// Signed leader status query
    #[arg(long)]
    status_query: PathBuf,

    /// Signed per-device components query
    #[arg(long)]
    components_query: Option<PathBuf>,
}

/// A signed query saved to disk.
#[derive(Deserialize)]
struct QueryFile {
    query: String,
    /// base64
    signature: String,
    #[serde(default)]
    vars: Option<serde_json::Value>,
}

fn load_query(path: &Path) -> Result<Query, GatewayError> {
    let json = fs::read_to_string(path)
        .map_err(|e| GatewayError::Config(format!("{}: {}", path.display(), e)))?;
    let f: QueryFile = serde_json::from_str(&json).map_err(|e| GatewayError::Config(e.to_string()))?;
    let signature = STANDARD
        .decode(f.signature.trim())
        .map_err(|e| GatewayError::Config(format!("bad signature in {}: {}", path.display(), e)))?;

    let mut q = Query::new(f.query, signature);
    q.vars = f.vars;
    Ok(q)
}

fn load_config(args: &Args) -> Result<GatewayConfig, GatewayError> {
    let mut cfg = match &args.config {
        Some(p) => GatewayConfig::load(p)?,
        None => GatewayConfig::default(),
    };
    if let Some(s) = &args.secret {
        cfg.secret = s.clone();
    }
    if let Some(h) = &args.host {
        cfg.remote = Some(h.clone());
    }
    Ok(cfg)
}

async fn run(args: Args) -> Result<(), StatusError> {
    let cfg = load_config(&args)?;
    log::info!("connecting to {}", cfg.remote());
    let gw = Gateway::new(&cfg)?;
    let status_query = load_query(&args.status_query)?;

    let status = system::fetch(&gw, &status_query).await?;

    // per-device lookups only matter with more than one battery
    let mut by_device = BTreeMap::new();
    if let Some(path) = &args.components_query {
        if status.battery_blocks.len() > 1 {
            let q = load_query(path)?;
            for din in &status.battery_blocks {
                let d = device::fetch(&gw, &q, din).await?;
                by_device.insert(din.clone(), d);
            }
        }
    }

    let outlook = BatteryOutlook::from_status(
        status.power_battery,
        status.battery_energy,
        status.battery_full_energy,
        args.min,
    );

    let site_suffix = if status.power_site < -args.min {
        " (exporting)"
    } else if status.power_site > args.min {
        " (importing)"
    } else {
        ""
    };

    println!("====================");
    println!("Time: {}", Local::now());
    println!("System {} (Island={}, Shutdown={})", status.leader, status.island, status.shutdown);
    println!(
        "{:.2}% ({:.2} / {:.2} kWh), {}",
        status.charge_percent(),
        status.battery_energy as f64 / 1000.0,
        status.battery_full_energy as f64 / 1000.0,
        outlook
    );
    println!();
    println!("SOLAR   {}", format_power_table(status.power_solar));
    println!("BATTERY {}{}", format_power_table(status.power_battery), outlook.suffix());
    println!("GATE    {}{}", format_power_table(status.power_site), site_suffix);
    println!("LOAD    {}", format_power_table(status.power_load));
    println!();
    for (i, p) in status.phase.iter().enumerate() {
        println!("[{}] {:6.2}v {:5.2}Hz", i + 1, p.voltage_load, p.freq_load);
    }

    for (din, d) in &by_device {
        print_device(din, d);
    }

    Ok(())
}

fn print_device(din: &Din, d: &DeviceStatus) {
    let mppt: Vec<String> = d.mppt.iter().map(|m| m.format_power()).collect();

    println!();
    println!(
        "[{}] {:.2}% ({:.2} / {:.2} kWh)",
        din,
        d.charge_percent(),
        d.battery_energy as f64 / 1000.0,
        d.battery_full_energy as f64 / 1000.0
    );
    println!();
    println!("  SOLAR   {} ({})", format_power_table(d.power_solar), mppt.join(" "));
    println!("  BATTERY {}", format_power_table(d.power_battery));
    println!();
    println!("  {:6.2}v {:5.2}Hz", d.voltage, d.freq);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("could not read status: {}", e);
            ExitCode::FAILURE
        }
    }
}
