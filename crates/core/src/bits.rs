//! Validated bit strings and generator keys.
//!
//! A `BitString` is a non-empty, immutable sequence of binary digits. Every
//! operation that "changes" a bit string returns a new one, so a value handed
//! to the codec or the injector can never be observed half-modified.
//!
//! Bits are indexed from the left: position 0 is the first character of the
//! textual form and the highest-order coefficient of the polynomial.
//!
//! # Example
//! ```
//! use crc_sim_core::bits::{BitString, Key};
//!
//! let payload: BitString = "1011".parse().unwrap();
//! assert_eq!(payload.flip(0).unwrap().to_string(), "0011");
//!
//! let key = Key::parse("10011").unwrap();
//! assert_eq!(key.degree(), 4);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An ordered, non-empty sequence of bits.
///
/// # Invariants
/// - `bits` is never empty
/// - never mutated after construction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BitString {
    bits: Vec<bool>,
}

impl BitString {
    /// Parse a string of '0'/'1' characters.
    ///
    /// # Errors
    /// `Error::InvalidInput` if the text is empty or holds any other character.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(Error::invalid("bit string is empty"));
        }

        let bits = text
            .chars()
            .enumerate()
            .map(|(i, c)| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(Error::invalid(format!(
                    "non-binary character {other:?} at position {i}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { bits })
    }

    /// Build from raw bits.
    ///
    /// # Errors
    /// `Error::InvalidInput` if `bits` is empty.
    pub fn from_bits(bits: Vec<bool>) -> Result<Self> {
        if bits.is_empty() {
            return Err(Error::invalid("bit string is empty"));
        }
        Ok(Self { bits })
    }

    /// Wrap bits the caller already knows are non-empty.
    pub(crate) fn from_nonempty(bits: Vec<bool>) -> Self {
        debug_assert!(!bits.is_empty());
        Self { bits }
    }

    /// A run of `len` zero bits.
    ///
    /// # Errors
    /// `Error::InvalidInput` if `len` is zero.
    pub fn zeros(len: usize) -> Result<Self> {
        Self::from_bits(vec![false; len])
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Bit at `index`, or `None` past the end.
    pub fn bit(&self, index: usize) -> Option<bool> {
        self.bits.get(index).copied()
    }

    pub fn as_bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().copied()
    }

    /// True when every bit is zero.
    pub fn is_all_zeros(&self) -> bool {
        self.bits.iter().all(|b| !b)
    }

    /// `self` followed by `tail`.
    pub fn concat(&self, tail: &BitString) -> BitString {
        let mut bits = Vec::with_capacity(self.len() + tail.len());
        bits.extend_from_slice(&self.bits);
        bits.extend_from_slice(&tail.bits);
        BitString { bits }
    }

    /// Copy with the bit at `index` inverted.
    ///
    /// # Errors
    /// `Error::InvalidInput` if `index` is out of range.
    pub fn flip(&self, index: usize) -> Result<BitString> {
        self.flip_all(&[index])
    }

    /// Copy with every listed position inverted.
    ///
    /// Positions are applied one after another, so a position listed twice
    /// cancels out. Callers that need distinct flips must pass distinct
    /// positions.
    ///
    /// # Errors
    /// `Error::InvalidInput` if any position is out of range.
    pub fn flip_all(&self, positions: &[usize]) -> Result<BitString> {
        let mut bits = self.bits.clone();
        for &pos in positions {
            let bit = bits.get_mut(pos).ok_or_else(|| {
                Error::invalid(format!(
                    "position {pos} out of range for {} bits",
                    self.len()
                ))
            })?;
            *bit = !*bit;
        }
        Ok(BitString { bits })
    }

    /// Positions at which two equal-length bit strings differ.
    ///
    /// Returns `None` when the lengths differ.
    pub fn differing_positions(&self, other: &BitString) -> Option<Vec<usize>> {
        if self.len() != other.len() {
            return None;
        }
        Some(
            self.iter()
                .zip(other.iter())
                .enumerate()
                .filter_map(|(i, (a, b))| (a != b).then_some(i))
                .collect(),
        )
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &bit in &self.bits {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for BitString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BitString {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<BitString> for String {
    fn from(value: BitString) -> Self {
        value.to_string()
    }
}

/// Generator polynomial for the CRC, as its coefficient sequence.
///
/// The leading coefficient is implied by the division procedure: only the
/// trailing `len - 1` coefficients take part in each XOR step.
///
/// # Invariants
/// - at least two bits long
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key {
    bits: BitString,
}

impl Key {
    /// Minimum key length in bits.
    pub const MIN_LEN: usize = 2;

    /// Wrap a bit string as a generator key.
    ///
    /// # Errors
    /// `Error::InvalidInput` if the bit string is shorter than `MIN_LEN`.
    pub fn new(bits: BitString) -> Result<Self> {
        if bits.len() < Self::MIN_LEN {
            return Err(Error::invalid(format!(
                "key must be at least {} bits, got {}",
                Self::MIN_LEN,
                bits.len()
            )));
        }
        Ok(Self { bits })
    }

    /// Parse and validate a key from '0'/'1' text.
    pub fn parse(text: &str) -> Result<Self> {
        Self::new(BitString::parse(text)?)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Always false; a key holds at least `MIN_LEN` bits.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Degree of the generator, which is also the remainder width.
    pub fn degree(&self) -> usize {
        self.bits.len() - 1
    }

    /// Coefficients that participate in each XOR step.
    pub fn trailing(&self) -> &[bool] {
        &self.bits.as_bits()[1..]
    }

    /// A generator with a non-zero constant term catches every single-bit error.
    pub fn detects_single_bit_errors(&self) -> bool {
        self.bits.as_bits().last().copied().unwrap_or(false)
    }

    pub fn as_bit_string(&self) -> &BitString {
        &self.bits
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.bits.fmt(f)
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Key {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Key> for String {
    fn from(value: Key) -> Self {
        value.to_string()
    }
}
