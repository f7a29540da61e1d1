//! Payload generation for simulation batches.
//!
//! When no payload is given, each transfer gets a generated bit string with
//! a shape chosen at random:
//! - Runs of one bit value (long zero runs stress the division's no-op steps)
//! - Alternating bits
//! - A short repeating pattern
//! - Uniformly random bits
//!
//! Mixing shapes keeps batches from looking alike in the outcome log.

use rand::Rng;

/// Generate a payload of exactly `bits` '0'/'1' characters.
pub fn generate_payload<R: Rng + ?Sized>(rng: &mut R, bits: usize) -> String {
    let shape: u8 = rng.gen_range(0..10);

    match shape {
        // 20% constant runs
        0..=1 => {
            let bit = if rng.gen() { '1' } else { '0' };
            std::iter::repeat(bit).take(bits).collect()
        }

        // 20% alternating
        2..=3 => {
            let offset: usize = rng.gen_range(0..2);
            (0..bits)
                .map(|i| if (i + offset) % 2 == 0 { '1' } else { '0' })
                .collect()
        }

        // 20% repeating pattern
        4..=5 => {
            let pattern = generate_pattern(rng);
            (0..bits).map(|i| pattern[i % pattern.len()]).collect()
        }

        // 40% random
        _ => (0..bits)
            .map(|_| if rng.gen() { '1' } else { '0' })
            .collect(),
    }
}

/// Generate a short bit pattern.
fn generate_pattern<R: Rng + ?Sized>(rng: &mut R) -> Vec<char> {
    let pattern_len = rng.gen_range(3..=8);
    (0..pattern_len)
        .map(|_| if rng.gen() { '1' } else { '0' })
        .collect()
}
