//! CRC codec: polynomial long division over GF(2).
//!
//! The codec is stateless. Encoding appends `degree` zero bits to the payload,
//! divides by the generator and appends the remainder; verification divides
//! the received codeword directly and accepts it iff the remainder is zero.
//!
//! # Division Procedure
//!
//! ```text
//! register = message[0..width]
//! for each remaining message bit b:
//!     register = reduce(register) ++ [b]
//! remainder = reduce(register)
//!
//! reduce(r) = r[1..] XOR (r[0] ? key[1..] : 0...0)
//! ```
//!
//! The leading key coefficient never appears in the XOR: it would only cancel
//! the register's leading bit, which `reduce` drops anyway.
//!
//! # Detection Guarantee
//!
//! A generator whose constant term is 1 detects every single-bit error.
//! `CrcCodec::assert_all_single_bit_flips_detected` checks this exhaustively
//! for one codeword and is meant as a configuration diagnostic.

use crate::bits::{BitString, Key};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Result of encoding a payload.
///
/// # Invariants
/// - `codeword == payload ++ remainder`
/// - `remainder.len() == key.degree()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoded {
    pub codeword: BitString,
    pub remainder: BitString,
}

/// Polynomial-division checksum over bit strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrcCodec;

impl CrcCodec {
    /// Compute the checksum of `payload` and return the full codeword.
    pub fn encode(payload: &BitString, key: &Key) -> Encoded {
        let mut message = Vec::with_capacity(payload.len() + key.degree());
        message.extend_from_slice(payload.as_bits());
        message.resize(payload.len() + key.degree(), false);

        // payload is at least one bit, so message covers the register width
        let remainder = BitString::from_nonempty(divide(&message, key));
        let codeword = payload.concat(&remainder);

        debug!(%payload, %key, %remainder, "encoded payload");

        Encoded {
            codeword,
            remainder,
        }
    }

    /// Check a received codeword against the generator.
    ///
    /// A codeword shorter than the key cannot carry a full remainder and is
    /// rejected with `false`.
    pub fn verify(codeword: &BitString, key: &Key) -> Result<bool> {
        if codeword.len() < key.len() {
            debug!(%codeword, %key, "codeword shorter than key");
            return Ok(false);
        }

        let remainder = divide(codeword.as_bits(), key);
        Ok(remainder.iter().all(|b| !b))
    }

    /// Encode raw '0'/'1' text.
    ///
    /// # Errors
    /// `Error::InvalidInput` for an empty or non-binary payload or key, or a
    /// key shorter than two bits.
    pub fn encode_str(payload: &str, key: &str) -> Result<Encoded> {
        let payload = BitString::parse(payload)?;
        let key = Key::parse(key)?;
        Ok(Self::encode(&payload, &key))
    }

    /// Verify raw '0'/'1' text.
    pub fn verify_str(codeword: &str, key: &str) -> Result<bool> {
        let codeword = BitString::parse(codeword)?;
        let key = Key::parse(key)?;
        Self::verify(&codeword, &key)
    }

    /// Flip every position of `codeword` in turn and require each flip to fail
    /// verification.
    ///
    /// # Errors
    /// `Error::UndetectedErrorInvariantViolation` listing every position whose
    /// flip still verified. This is a defect in the key choice.
    pub fn assert_all_single_bit_flips_detected(codeword: &BitString, key: &Key) -> Result<()> {
        let mut undetected = Vec::new();

        for position in 0..codeword.len() {
            let flipped = codeword.flip(position)?;
            if Self::verify(&flipped, key)? {
                undetected.push(position);
            }
        }

        if undetected.is_empty() {
            debug!(%codeword, %key, "all single-bit flips detected");
            return Ok(());
        }

        error!(%codeword, %key, positions = ?undetected, "single-bit flips escaped detection");
        Err(Error::UndetectedErrorInvariantViolation {
            key: key.to_string(),
            positions: undetected,
        })
    }
}

/// Long division of `message` by the generator; returns the `degree`-bit remainder.
///
/// Caller guarantees `message.len() >= key.len()`.
fn divide(message: &[bool], key: &Key) -> Vec<bool> {
    let width = key.len();
    let trailing = key.trailing();

    let mut register = message[..width].to_vec();
    for &next in &message[width..] {
        register = reduce(&register, trailing);
        register.push(next);
    }

    reduce(&register, trailing)
}

/// One division step: drop the leading bit, XOR the rest with the key's
/// trailing coefficients when that bit was set, or with zeros otherwise.
fn reduce(register: &[bool], trailing: &[bool]) -> Vec<bool> {
    let lead = register[0];
    register[1..]
        .iter()
        .zip(trailing)
        .map(|(&bit, &coeff)| bit ^ (lead & coeff))
        .collect()
}
