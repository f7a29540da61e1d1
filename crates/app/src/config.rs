//! Configuration for the crc-sim application.
//!
//! Parses command-line arguments and fills in sensible defaults, including
//! randomized defaults that are reproducible with a seed.
//!
//! # Philosophy
//!
//! `crc-sim simulate` works with ZERO arguments, using intelligent defaults.
//! All resolved values are printed so a run can be repeated exactly.

use crate::input_gen::generate_payload;
use clap::{Args, Parser, Subcommand};
use crc_sim_core::inject::ErrorSpec;
use crc_sim_core::transmission::{ChannelParams, TransmissionRequest};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Generator used when none is given: x^4 + x + 1.
pub const DEFAULT_KEY: &str = "10011";

/// CRC transmission simulator
#[derive(Parser, Debug)]
#[command(name = "crc-sim")]
#[command(about = "CRC error detection over a simulated unreliable link")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute the codeword and remainder for a payload
    Encode {
        /// Payload bits, e.g. 101100110000
        #[arg(long)]
        data: String,

        /// Generator key bits
        #[arg(long, default_value = DEFAULT_KEY)]
        key: String,
    },

    /// Check a received codeword
    Verify {
        /// Codeword bits
        #[arg(long)]
        codeword: String,

        /// Generator key bits
        #[arg(long, default_value = DEFAULT_KEY)]
        key: String,
    },

    /// Check that every single-bit flip of the payload's codeword is detected
    SelfCheck {
        /// Payload bits
        #[arg(long)]
        data: String,

        /// Generator key bits
        #[arg(long, default_value = DEFAULT_KEY)]
        key: String,
    },

    /// Run a batch of simulated transfers
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Payload bits (default: random per transfer)
    #[arg(long)]
    pub data: Option<String>,

    /// Length of generated payloads
    #[arg(long, default_value_t = 32)]
    pub payload_bits: usize,

    /// Generator key bits
    #[arg(long, default_value = DEFAULT_KEY)]
    pub key: String,

    /// Link delay in seconds (default: random 0-0.05)
    #[arg(long)]
    pub delay: Option<f64>,

    /// Packet loss percentage 0-100 (default: random 0-20)
    #[arg(long)]
    pub loss: Option<f64>,

    /// Error type: none, single, double, odd, burst
    #[arg(long, default_value = "single")]
    pub error_type: String,

    /// Flip count for odd and burst errors
    #[arg(long, default_value_t = 3)]
    pub error_count: usize,

    /// Number of transfers
    #[arg(long, default_value_t = 16)]
    pub count: usize,

    /// Random seed for determinism (default: time-based)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Refuse every transfer as if the service were down
    #[arg(long)]
    pub simulate_failure: bool,

    /// Print each outcome as a JSON line
    #[arg(long)]
    pub json: bool,

    /// Print resolved configuration
    #[arg(long)]
    pub print_config: bool,

    /// Don't print metrics summary
    #[arg(long)]
    pub no_metrics: bool,
}

/// Fully resolved configuration for a simulation batch.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub seed: u64,
    pub key: String,
    pub channel: ChannelParams,
    pub error_spec: ErrorSpec,
    pub payloads: Vec<String>,
    pub simulate_failure: bool,
    pub json: bool,
    pub print_config: bool,
    pub print_metrics: bool,
}

impl SimulationConfig {
    /// Resolve defaults from the parsed arguments.
    ///
    /// Without `--seed`, a time-based seed is used; every random default is
    /// drawn from that seed.
    pub fn from_args(args: &SimulateArgs) -> Result<Self, String> {
        let error_spec =
            ErrorSpec::from_parts(&args.error_type, args.error_count).map_err(|e| e.to_string())?;

        if args.count == 0 {
            return Err("--count must be at least 1".to_string());
        }

        let seed = args.seed.unwrap_or_else(time_seed);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let channel = ChannelParams::new(
            args.delay.unwrap_or_else(|| rng.gen_range(0.0..0.05)),
            args.loss.unwrap_or_else(|| {
                // Bias toward small loss rates
                let r: f64 = rng.gen();
                r * r * 20.0
            }),
        );

        let payloads = match &args.data {
            Some(data) => vec![data.clone(); args.count],
            None => {
                if args.payload_bits == 0 {
                    return Err("--payload-bits must be at least 1".to_string());
                }
                (0..args.count)
                    .map(|_| generate_payload(&mut rng, args.payload_bits))
                    .collect()
            }
        };

        Ok(Self {
            seed,
            key: args.key.clone(),
            channel,
            error_spec,
            payloads,
            simulate_failure: args.simulate_failure,
            json: args.json,
            print_config: args.print_config,
            print_metrics: !args.no_metrics,
        })
    }

    /// One request per payload, routed between consecutive simulated nodes.
    pub fn requests(&self) -> Vec<TransmissionRequest> {
        self.payloads
            .iter()
            .enumerate()
            .map(|(i, payload)| {
                TransmissionRequest::new(payload.clone(), self.key.clone())
                    .with_channel(self.channel)
                    .with_error(self.error_spec)
                    .with_route((i + 1).to_string(), (i + 2).to_string())
            })
            .collect()
    }

    /// Print the configuration in human-readable form.
    pub fn print(&self) {
        println!("=== Configuration ===");
        println!("Seed: {}", self.seed);
        println!("Key: {}", self.key);
        println!("Transfers: {}", self.payloads.len());
        println!("Error: {}", self.error_spec);
        println!("Simulated failure: {}", self.simulate_failure);
        println!();
        println!("=== Channel ===");
        println!("Delay: {:.4} s", self.channel.delay_seconds);
        println!("Loss: {:.2}%", self.channel.packet_loss_percent);
        println!();
    }
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> SimulateArgs {
        let cli = Cli::try_parse_from(std::iter::once("crc-sim").chain(args.iter().copied())).unwrap();
        match cli.command {
            Command::Simulate(args) => args,
            other => panic!("expected simulate, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_argument_defaults() {
        let config = SimulationConfig::from_args(&parse(&["simulate", "--seed", "42"])).unwrap();

        assert_eq!(config.seed, 42);
        assert_eq!(config.key, DEFAULT_KEY);
        assert_eq!(config.payloads.len(), 16);
        assert!(config.payloads.iter().all(|p| p.len() == 32));
        assert_eq!(config.error_spec, ErrorSpec::Single);
        assert!(config.channel.validate().is_ok());
        assert!(config.print_metrics);
    }

    #[test]
    fn test_seed_determinism() {
        let a = SimulationConfig::from_args(&parse(&["simulate", "--seed", "7"])).unwrap();
        let b = SimulationConfig::from_args(&parse(&["simulate", "--seed", "7"])).unwrap();

        assert_eq!(a.payloads, b.payloads);
        assert_eq!(a.channel, b.channel);
    }

    #[test]
    fn test_explicit_values() {
        let args = parse(&[
            "simulate",
            "--data",
            "1101",
            "--key",
            "1011",
            "--delay",
            "0",
            "--loss",
            "0",
            "--error-type",
            "burst",
            "--error-count",
            "2",
            "--count",
            "3",
            "--json",
        ]);
        let config = SimulationConfig::from_args(&args).unwrap();

        assert_eq!(config.payloads, vec!["1101"; 3]);
        assert_eq!(config.channel, ChannelParams::perfect());
        assert_eq!(config.error_spec, ErrorSpec::Burst { count: 2 });
        assert!(config.json);

        let requests = config.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].source.as_deref(), Some("3"));
        assert_eq!(requests[2].destination.as_deref(), Some("4"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(SimulationConfig::from_args(&parse(&["simulate", "--error-type", "triple"])).is_err());
        assert!(SimulationConfig::from_args(&parse(&["simulate", "--count", "0"])).is_err());
        assert!(SimulationConfig::from_args(&parse(&["simulate", "--payload-bits", "0"])).is_err());
    }

    #[test]
    fn test_time_seed_tracks_clock() {
        let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis();
        let seed = time_seed();
        assert!(u128::from(seed) >= millis);
        assert!(u128::from(seed) - millis < 60_000);
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::try_parse_from(["crc-sim", "-v", "encode", "--data", "1011"]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Command::Encode { ref key, .. } if key == DEFAULT_KEY));

        assert!(Cli::try_parse_from(["crc-sim", "verify"]).is_err());
    }
}
