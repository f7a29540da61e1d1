//! Deliberate bit-error injection.
//!
//! The injector corrupts a codeword according to an `ErrorSpec`. All position
//! choices come from the injector's own randomness source, so a seeded source
//! reproduces the same corruption for the same inputs.
//!
//! # Strategies
//!
//! - **Single**: one uniformly chosen bit
//! - **Double**: two distinct bits (sampled without replacement)
//! - **Odd**: an odd number of distinct bits (even counts are bumped by one)
//! - **Burst**: one contiguous run of bits, clamped to the codeword length
//!
//! # Determinism
//!
//! `ErrorInjector::seeded` uses a ChaCha8 RNG. Given the same seed and inputs,
//! the corrupted output is bit-identical.

use crate::bits::BitString;
use crate::error::{Error, Result};
use rand::seq::index;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// How to corrupt a codeword.
///
/// Serialized in the request shape `{"error_type": "burst", "error_count": 3}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error_type", rename_all = "lowercase")]
pub enum ErrorSpec {
    None,
    Single,
    Double,
    Odd {
        #[serde(rename = "error_count", default = "one")]
        count: usize,
    },
    Burst {
        #[serde(rename = "error_count", default = "one")]
        count: usize,
    },
}

fn one() -> usize {
    1
}

impl ErrorSpec {
    /// Build from an error type name and a count.
    ///
    /// The count is ignored for `none`, `single` and `double`.
    ///
    /// # Errors
    /// `Error::InvalidInput` for an unknown type name.
    pub fn from_parts(error_type: &str, count: usize) -> Result<Self> {
        match error_type {
            "none" => Ok(ErrorSpec::None),
            "single" => Ok(ErrorSpec::Single),
            "double" => Ok(ErrorSpec::Double),
            "odd" => Ok(ErrorSpec::Odd { count }),
            "burst" => Ok(ErrorSpec::Burst { count }),
            other => Err(Error::invalid(format!("unknown error type {other:?}"))),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ErrorSpec::None)
    }
}

impl fmt::Display for ErrorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSpec::None => f.write_str("none"),
            ErrorSpec::Single => f.write_str("single"),
            ErrorSpec::Double => f.write_str("double"),
            ErrorSpec::Odd { count } => write!(f, "odd({count})"),
            ErrorSpec::Burst { count } => write!(f, "burst({count})"),
        }
    }
}

/// Corrupts bit strings using a pluggable randomness source.
///
/// # Thread Safety
/// Holds its RNG by value; use one injector per task, or hand it a
/// `SharedRng` to draw from a single synchronized source.
#[derive(Debug, Clone)]
pub struct ErrorInjector<R> {
    rng: R,
}

impl ErrorInjector<ChaCha8Rng> {
    /// Create an injector backed by a seeded ChaCha8 RNG.
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> ErrorInjector<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Produce a corrupted copy of `source`.
    ///
    /// # Errors
    /// `Error::InvalidInput` if `double` or `odd` needs more distinct positions
    /// than `source` has, or a burst of length zero is requested.
    pub fn inject(&mut self, source: &BitString, spec: ErrorSpec) -> Result<BitString> {
        let positions = self.choose_positions(source.len(), spec)?;
        source.flip_all(&positions)
    }

    /// Pick the positions `spec` would flip in a string of `len` bits.
    ///
    /// Positions are distinct; burst positions are ascending and contiguous.
    pub fn choose_positions(&mut self, len: usize, spec: ErrorSpec) -> Result<Vec<usize>> {
        if len == 0 {
            return Err(Error::invalid("cannot inject errors into an empty bit string"));
        }

        match spec {
            ErrorSpec::None => Ok(Vec::new()),
            ErrorSpec::Single => Ok(vec![self.rng.gen_range(0..len)]),
            ErrorSpec::Double => self.distinct(len, 2),
            ErrorSpec::Odd { count } => {
                let count = if count % 2 == 0 { count + 1 } else { count };
                self.distinct(len, count)
            }
            ErrorSpec::Burst { count: 0 } => Ok(Vec::new()),
            ErrorSpec::Burst { count } => {
                let count = count.min(len);
                let start = self.rng.gen_range(0..=len - count);
                Ok((start..start + count).collect())
            }
        }
    }

    /// Access the randomness source, e.g. to draw channel samples from the
    /// same stream.
    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    fn distinct(&mut self, len: usize, count: usize) -> Result<Vec<usize>> {
        if count > len {
            return Err(Error::invalid(format!(
                "cannot flip {count} distinct positions in {len} bits"
            )));
        }
        Ok(index::sample(&mut self.rng, len, count).into_vec())
    }
}

/// A randomness source shared between concurrent simulations.
///
/// Every draw takes the lock, so concurrent users never observe a torn RNG
/// state. The interleaving of draws between users follows scheduling order.
#[derive(Debug)]
pub struct SharedRng<R> {
    inner: Arc<Mutex<R>>,
}

impl<R> SharedRng<R> {
    pub fn new(rng: R) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rng)),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl SharedRng<ChaCha8Rng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R> Clone for SharedRng<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: RngCore> RngCore for SharedRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.with(|rng| rng.next_u32())
    }

    fn next_u64(&mut self) -> u64 {
        self.with(|rng| rng.next_u64())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.with(|rng| rng.fill_bytes(dest))
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.with(|rng| rng.try_fill_bytes(dest))
    }
}
