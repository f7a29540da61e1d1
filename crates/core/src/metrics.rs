//! Metrics collection and reporting for simulation batches.
//!
//! Tallies what happened across many transfers:
//! - How many packets were lost or delivered
//! - How many deliveries were corrupted, and whether the CRC caught them
//! - How many requests were rejected or refused
//!
//! # Thread Safety
//!
//! `SimulationMetrics` is NOT thread-safe. Collect outcomes first (e.g. from
//! `simulate_batch`) and record them from one place.

use crate::transmission::{OutcomeError, TransmissionOutcome};
use std::time::{Duration, Instant};

/// Counters over a batch of transmission outcomes.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    // === Timing ===
    /// When the batch started
    pub start_time: Instant,

    /// When the batch ended (set on completion)
    pub end_time: Option<Instant>,

    /// Sum of simulated link delays in seconds
    pub total_delay_seconds: f64,

    // === Channel ===
    /// Transfers recorded
    pub transmissions: u64,

    /// Packets lost on the channel
    pub packets_lost: u64,

    /// Packets that reached the receiver and were verified
    pub packets_delivered: u64,

    // === Integrity ===
    /// Delivered uncorrupted and accepted
    pub clean: u64,

    /// Corrupted and rejected by the CRC
    pub corruption_detected: u64,

    /// Corrupted yet accepted by the CRC
    pub corruption_undetected: u64,

    // === Rejections ===
    /// Requests with malformed input
    pub invalid_requests: u64,

    /// Requests refused during a simulated outage
    pub unavailable: u64,

    /// Tasks that never produced an outcome
    pub aborted: u64,
}

impl SimulationMetrics {
    /// Create new metrics with start time set to now.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            end_time: None,
            total_delay_seconds: 0.0,
            transmissions: 0,
            packets_lost: 0,
            packets_delivered: 0,
            clean: 0,
            corruption_detected: 0,
            corruption_undetected: 0,
            invalid_requests: 0,
            unavailable: 0,
            aborted: 0,
        }
    }

    /// Fold one outcome into the counters.
    pub fn record(&mut self, outcome: &TransmissionOutcome) {
        self.transmissions += 1;
        self.total_delay_seconds += outcome.delay_seconds;

        match &outcome.error {
            Some(OutcomeError::InvalidInput { .. }) => self.invalid_requests += 1,
            Some(OutcomeError::Unavailable) => self.unavailable += 1,
            Some(OutcomeError::Aborted { .. }) => self.aborted += 1,
            None if outcome.packet_lost => self.packets_lost += 1,
            None => {
                self.packets_delivered += 1;
                if outcome.corruption_detected() {
                    self.corruption_detected += 1;
                } else if outcome.corruption_undetected() {
                    self.corruption_undetected += 1;
                } else if outcome.is_clean() {
                    self.clean += 1;
                }
            }
        }
    }

    /// Mark the batch as complete.
    pub fn complete(&mut self) {
        self.end_time = Some(Instant::now());
    }

    /// Get total duration (or current elapsed if not complete).
    pub fn duration(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// Lost packets over transfers that reached the channel.
    pub fn loss_rate(&self) -> f64 {
        let attempted = self.packets_lost + self.packets_delivered;
        if attempted == 0 {
            0.0
        } else {
            self.packets_lost as f64 / attempted as f64
        }
    }

    /// Share of corrupted deliveries the CRC rejected.
    ///
    /// Returns 1.0 when nothing was corrupted.
    pub fn detection_rate(&self) -> f64 {
        let corrupted = self.corruption_detected + self.corruption_undetected;
        if corrupted == 0 {
            1.0
        } else {
            self.corruption_detected as f64 / corrupted as f64
        }
    }

    /// Print a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n=== Simulation Summary ===");
        println!("Duration: {} ms", self.duration().as_millis());
        println!("Transmissions: {}", self.transmissions);
        println!("Simulated delay: {:.3} s", self.total_delay_seconds);
        println!();

        println!("=== Channel ===");
        println!("Delivered: {}", self.packets_delivered);
        println!("Lost: {} ({:.2}%)", self.packets_lost, self.loss_rate() * 100.0);
        println!();

        println!("=== Integrity ===");
        println!("Clean: {}", self.clean);
        println!("Corruption detected: {}", self.corruption_detected);
        println!("Corruption undetected: {}", self.corruption_undetected);
        println!("Detection rate: {:.2}%", self.detection_rate() * 100.0);
        println!();

        println!("=== Rejected ===");
        println!("Invalid requests: {}", self.invalid_requests);
        println!("Unavailable: {}", self.unavailable);
        println!("Aborted: {}", self.aborted);
        println!();
    }

    /// Export metrics as a simple text format (for parsing/testing).
    pub fn export_text(&self) -> String {
        format!(
            "duration_ms={}\n\
             transmissions={}\n\
             packets_lost={}\n\
             packets_delivered={}\n\
             loss_rate={:.4}\n\
             clean={}\n\
             corruption_detected={}\n\
             corruption_undetected={}\n\
             detection_rate={:.4}\n\
             invalid_requests={}\n\
             unavailable={}\n\
             aborted={}\n",
            self.duration().as_millis(),
            self.transmissions,
            self.packets_lost,
            self.packets_delivered,
            self.loss_rate(),
            self.clean,
            self.corruption_detected,
            self.corruption_undetected,
            self.detection_rate(),
            self.invalid_requests,
            self.unavailable,
            self.aborted,
        )
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
