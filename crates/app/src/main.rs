//! crc-sim: CRC error detection over a simulated unreliable link
//!
//! # Usage
//!
//! ```bash
//! # Encode a payload
//! crc-sim encode --data 101100110000 --key 10011
//!
//! # Verify a received codeword
//! crc-sim verify --codeword 1011001100001100 --key 10011
//!
//! # Confirm a key catches every single-bit error
//! crc-sim self-check --data 101100110000 --key 10011
//!
//! # Run a reproducible batch of transfers
//! crc-sim simulate --seed 42 --error-type burst --error-count 3 --json
//! ```

mod config;
mod input_gen;

use clap::Parser;
use config::{Cli, Command, SimulationConfig};
use crc_sim_core::bits::{BitString, Key};
use crc_sim_core::crc::CrcCodec;
use crc_sim_core::metrics::SimulationMetrics;
use crc_sim_core::transmission::{simulate_batch, AtomicFailureSwitch, FailureSwitch};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Encode { data, key } => {
            let encoded = CrcCodec::encode_str(&data, &key)?;
            println!("codeword:  {}", encoded.codeword);
            println!("remainder: {}", encoded.remainder);
        }
        Command::Verify { codeword, key } => {
            if CrcCodec::verify_str(&codeword, &key)? {
                println!("No error detected");
            } else {
                println!("Error detected");
                std::process::exit(1);
            }
        }
        Command::SelfCheck { data, key } => {
            let key = Key::parse(&key)?;
            let encoded = CrcCodec::encode(&BitString::parse(&data)?, &key);
            CrcCodec::assert_all_single_bit_flips_detected(&encoded.codeword, &key)?;
            println!(
                "All {} single-bit flips of {} are detected by key {}",
                encoded.codeword.len(),
                encoded.codeword,
                key
            );
        }
        Command::Simulate(args) => {
            let config = SimulationConfig::from_args(&args).map_err(anyhow::Error::msg)?;
            run_simulation(config).await?;
        }
    }

    Ok(())
}

async fn run_simulation(config: SimulationConfig) -> anyhow::Result<()> {
    if config.print_config {
        config.print();
    }

    let switch = Arc::new(AtomicFailureSwitch::new());
    switch.set(config.simulate_failure);

    info!(
        seed = config.seed,
        transfers = config.payloads.len(),
        "starting simulation batch"
    );

    let mut metrics = SimulationMetrics::new();
    let outcomes = simulate_batch(
        config.requests(),
        config.seed,
        Some(switch as Arc<dyn FailureSwitch>),
    )
    .await;

    for outcome in &outcomes {
        metrics.record(outcome);
        if config.json {
            println!("{}", serde_json::to_string(outcome)?);
        }
    }
    metrics.complete();

    if config.print_metrics {
        metrics.print_summary();
    }

    if metrics.corruption_undetected > 0 {
        warn!(
            undetected = metrics.corruption_undetected,
            key = %config.key,
            "corrupted transfers passed verification"
        );
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}
