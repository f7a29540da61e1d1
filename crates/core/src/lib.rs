//! crc-sim-core: CRC error detection over a simulated, unreliable link
//!
//! This library provides the core components of a transmission simulator that:
//! - Computes and verifies CRC checksums by polynomial division over GF(2)
//! - Injects single, double, odd-count and burst bit errors into codewords
//! - Simulates link latency and packet loss around each transfer
//! - Relays messages between simulated nodes and a master
//!
//! # Architecture
//!
//! - `bits`: Validated, immutable bit strings and generator keys
//! - `crc`: The polynomial-division codec and its single-bit self-check
//! - `inject`: Error specifications and the seeded error injector
//! - `transmission`: One simulated transfer from request to outcome record
//! - `relay`: Channel registry with group broadcast between endpoints
//! - `metrics`: Counters over batches of outcomes
//!
//! # Design Principles
//!
//! - **No panics on input**: Malformed requests become structured errors
//! - **Immutable values**: Bit strings are never modified in place
//! - **Deterministic**: Seeded randomness makes runs reproducible
//! - **Non-blocking**: Link latency is an async timed wait

pub mod bits;
pub mod crc;
pub mod error;
pub mod inject;
pub mod metrics;
pub mod relay;
pub mod transmission;

// Re-export commonly used types
pub use bits::{BitString, Key};
pub use crc::{CrcCodec, Encoded};
pub use error::{Error, Result};
pub use inject::{ErrorInjector, ErrorSpec};
pub use transmission::{TransmissionOutcome, TransmissionRequest, TransmissionSimulator};
