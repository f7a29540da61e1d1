//! Transmission simulator with latency, packet loss and error injection.
//!
//! One call to `TransmissionSimulator::simulate` models one transfer of a
//! payload between two endpoints:
//!
//! 1. Wait out the link latency (a non-blocking timed wait)
//! 2. Roll for packet loss; a lost packet never reaches the codec
//! 3. Encode the payload with the CRC codec
//! 4. Corrupt the codeword according to the error spec
//! 5. Verify the (possibly corrupted) codeword at the receiver
//!
//! `simulate` never fails: malformed requests are reported in the outcome's
//! `error` field so a batch of transfers always runs to completion.
//!
//! # Determinism
//!
//! The loss roll and the error positions come from one RNG. A simulator built
//! with `TransmissionSimulator::seeded` replays the same outcomes for the same
//! sequence of requests.
//!
//! # Cancellation
//!
//! Dropping the future while it waits out the delay is safe: nothing has been
//! encoded yet and bit strings are immutable, so there is no partial state.

use crate::bits::{BitString, Key};
use crate::crc::CrcCodec;
use crate::error::{Error, Result};
use crate::inject::{ErrorInjector, ErrorSpec};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Externally controlled outage state read at call time.
pub trait FailureSwitch: Send + Sync + fmt::Debug {
    fn is_failing(&self) -> bool;
}

/// A failure switch toggled by an operator or a test.
#[derive(Debug, Default)]
pub struct AtomicFailureSwitch {
    failing: AtomicBool,
}

impl AtomicFailureSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Flip the switch and return the new state.
    pub fn toggle(&self) -> bool {
        !self.failing.fetch_xor(true, Ordering::SeqCst)
    }
}

impl FailureSwitch for AtomicFailureSwitch {
    fn is_failing(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }
}

/// Link characteristics for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelParams {
    /// Latency in seconds
    #[serde(rename = "delay", default)]
    pub delay_seconds: f64,

    /// Chance of losing the packet, in percent [0, 100]
    #[serde(rename = "packet_loss_percentage", default)]
    pub packet_loss_percent: f64,
}

impl ChannelParams {
    pub fn new(delay_seconds: f64, packet_loss_percent: f64) -> Self {
        Self {
            delay_seconds,
            packet_loss_percent,
        }
    }

    /// No latency, no loss.
    pub fn perfect() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Check ranges and convert the delay.
    ///
    /// # Errors
    /// `Error::InvalidInput` for a negative or non-finite delay, or a loss
    /// percentage outside [0, 100].
    pub fn validate(&self) -> Result<Duration> {
        if !(0.0..=100.0).contains(&self.packet_loss_percent) {
            return Err(Error::invalid(format!(
                "packet loss percentage {} is outside [0, 100]",
                self.packet_loss_percent
            )));
        }
        Duration::try_from_secs_f64(self.delay_seconds).map_err(|_| {
            Error::invalid(format!(
                "delay {} is not a non-negative number of seconds",
                self.delay_seconds
            ))
        })
    }
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self::perfect()
    }
}

/// One transfer to simulate.
///
/// Payload and key stay raw text so that malformed input is reported in the
/// outcome instead of being rejected before the simulation starts.
/// Field names follow the request body accepted by the surrounding API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionRequest {
    #[serde(rename = "data")]
    pub payload: String,

    pub key: String,

    #[serde(flatten)]
    pub channel: ChannelParams,

    #[serde(rename = "error_params", default)]
    pub error_spec: Option<ErrorSpec>,

    /// Sending endpoint, used for log routing only
    #[serde(rename = "source_id", default)]
    pub source: Option<String>,

    /// Receiving endpoint, used for log routing only
    #[serde(rename = "destination_id", default)]
    pub destination: Option<String>,
}

impl TransmissionRequest {
    pub fn new(payload: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            key: key.into(),
            channel: ChannelParams::perfect(),
            error_spec: None,
            source: None,
            destination: None,
        }
    }

    pub fn with_channel(mut self, channel: ChannelParams) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_error(mut self, spec: ErrorSpec) -> Self {
        self.error_spec = Some(spec);
        self
    }

    pub fn with_route(mut self, source: impl Into<String>, destination: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self.destination = Some(destination.into());
        self
    }
}

/// Why a transfer produced no verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeError {
    /// Malformed payload, key, channel or error spec
    InvalidInput { reason: String },

    /// The failure switch was on; the transfer was refused before it started
    Unavailable,

    /// The task running the transfer did not finish
    Aborted { reason: String },
}

impl fmt::Display for OutcomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeError::InvalidInput { reason } => write!(f, "invalid input: {reason}"),
            OutcomeError::Unavailable => f.write_str("service unavailable (simulated failure)"),
            OutcomeError::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}

impl From<Error> for OutcomeError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(reason) => OutcomeError::InvalidInput { reason },
            other => OutcomeError::Aborted {
                reason: other.to_string(),
            },
        }
    }
}

/// Everything observed during one simulated transfer.
///
/// Codec fields are `None` when the packet was lost or the request was
/// rejected before reaching that step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionOutcome {
    pub delay_seconds: f64,
    pub packet_lost: bool,
    pub original_codeword: Option<BitString>,
    pub remainder: Option<BitString>,
    pub error_spec: Option<ErrorSpec>,
    pub corrupted_codeword: Option<BitString>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flipped_positions: Vec<usize>,
    pub verification_passed: Option<bool>,
    pub error: Option<OutcomeError>,
}

impl TransmissionOutcome {
    fn started(request: &TransmissionRequest) -> Self {
        Self {
            delay_seconds: request.channel.delay_seconds,
            packet_lost: false,
            original_codeword: None,
            remainder: None,
            error_spec: request.error_spec,
            corrupted_codeword: None,
            flipped_positions: Vec::new(),
            verification_passed: None,
            error: None,
        }
    }

    fn failed(mut self, error: OutcomeError) -> Self {
        self.error = Some(error);
        self
    }

    /// Delivered intact and accepted by the receiver.
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.flipped_positions.is_empty() && self.verification_passed == Some(true)
    }

    /// Corrupted on the wire and rejected by the receiver.
    pub fn corruption_detected(&self) -> bool {
        !self.flipped_positions.is_empty() && self.verification_passed == Some(false)
    }

    /// Corrupted on the wire yet accepted by the receiver.
    pub fn corruption_undetected(&self) -> bool {
        !self.flipped_positions.is_empty() && self.verification_passed == Some(true)
    }
}

/// Runs simulated transfers.
///
/// # Thread Safety
/// Owns its RNG; `simulate` takes `&mut self`. Run one simulator per task for
/// concurrent transfers, or build each from a shared `SharedRng`.
#[derive(Debug)]
pub struct TransmissionSimulator<R> {
    injector: ErrorInjector<R>,
    failure: Option<Arc<dyn FailureSwitch>>,
}

impl TransmissionSimulator<ChaCha8Rng> {
    /// Create a simulator backed by a seeded ChaCha8 RNG.
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> TransmissionSimulator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            injector: ErrorInjector::new(rng),
            failure: None,
        }
    }

    /// Refuse transfers while `switch` reports an outage.
    pub fn with_failure_switch(mut self, switch: Arc<dyn FailureSwitch>) -> Self {
        self.failure = Some(switch);
        self
    }

    /// Simulate one transfer. Never fails; see the module docs for the steps.
    pub async fn simulate(&mut self, request: &TransmissionRequest) -> TransmissionOutcome {
        let span = info_span!(
            "transmission",
            source = request.source.as_deref().unwrap_or("-"),
            destination = request.destination.as_deref().unwrap_or("-"),
        );
        self.run(request).instrument(span).await
    }

    async fn run(&mut self, request: &TransmissionRequest) -> TransmissionOutcome {
        let outcome = TransmissionOutcome::started(request);

        if self.failure.as_ref().is_some_and(|switch| switch.is_failing()) {
            warn!("transfer refused: simulated failure is active");
            return outcome.failed(OutcomeError::Unavailable);
        }

        let delay = match request.channel.validate() {
            Ok(delay) => delay,
            Err(err) => {
                warn!(%err, "rejected channel parameters");
                return outcome.failed(err.into());
            }
        };

        if !delay.is_zero() {
            debug!(?delay, "waiting out link latency");
            tokio::time::sleep(delay).await;
        }

        let roll: f64 = self.injector.rng_mut().gen_range(0.0..100.0);
        if roll < request.channel.packet_loss_percent {
            info!(roll, loss = request.channel.packet_loss_percent, "packet lost");
            return TransmissionOutcome {
                packet_lost: true,
                ..outcome
            };
        }

        let mut outcome = outcome;
        if let Err(err) = self.transfer(request, &mut outcome) {
            warn!(%err, "transfer rejected");
            return outcome.failed(err.into());
        }

        info!(
            corrupted = !outcome.flipped_positions.is_empty(),
            verified = ?outcome.verification_passed,
            "transfer complete"
        );
        outcome
    }

    /// Encode, corrupt and verify, recording each result as it is computed.
    fn transfer(&mut self, request: &TransmissionRequest, outcome: &mut TransmissionOutcome) -> Result<()> {
        let payload = BitString::parse(&request.payload)?;
        let key = Key::parse(&request.key)?;

        let encoded = CrcCodec::encode(&payload, &key);
        outcome.original_codeword = Some(encoded.codeword.clone());
        outcome.remainder = Some(encoded.remainder);

        let corrupted = match request.error_spec {
            Some(spec) if !spec.is_none() => {
                let positions = self.injector.choose_positions(encoded.codeword.len(), spec)?;
                let corrupted = encoded.codeword.flip_all(&positions)?;
                debug!(%spec, ?positions, "injected errors");
                outcome.flipped_positions = positions;
                corrupted
            }
            _ => encoded.codeword,
        };

        let passed = CrcCodec::verify(&corrupted, &key)?;
        outcome.corrupted_codeword = Some(corrupted);
        outcome.verification_passed = Some(passed);
        Ok(())
    }
}

/// Run every request concurrently, one seeded simulator per request.
///
/// Request `i` uses seed `base_seed + i`, so the batch is reproducible no
/// matter how the tasks interleave. Outcomes are returned in request order.
pub async fn simulate_batch(
    requests: Vec<TransmissionRequest>,
    base_seed: u64,
    failure: Option<Arc<dyn FailureSwitch>>,
) -> Vec<TransmissionOutcome> {
    let handles: Vec<(TransmissionRequest, JoinHandle<TransmissionOutcome>)> = requests
        .into_iter()
        .enumerate()
        .map(|(i, request)| {
            let mut simulator = TransmissionSimulator::seeded(base_seed.wrapping_add(i as u64));
            if let Some(switch) = &failure {
                simulator = simulator.with_failure_switch(Arc::clone(switch));
            }
            let task_request = request.clone();
            let handle = tokio::spawn(async move { simulator.simulate(&task_request).await });
            (request, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (request, handle) in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                error!(%err, "simulation task did not finish");
                outcomes.push(TransmissionOutcome::started(&request).failed(OutcomeError::Aborted {
                    reason: err.to_string(),
                }));
            }
        }
    }
    outcomes
}
