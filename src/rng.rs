//! Seeded PCG32 generator.
//!
//! Fault injection has to be reproducible: the same seed must drop and duplicate the same
//! transfer requests on every run. PCG-XSH-RR with 64 bits of state is small, fast and good
//! enough for that; it is NOT cryptographically secure.
//!
//! Reference: <https://www.pcg-random.org/>
//!
//! ```
//! use fortress_pool::rng::Pcg32;
//!
//! let mut a = Pcg32::seed_from_u64(7);
//! let mut b = Pcg32::seed_from_u64(7);
//! assert_eq!(a.next_u32(), b.next_u32());
//! ```

use crate::{
    report_violation,
    telemetry::{ViolationKind, ViolationSeverity},
};

/// Default increment for single-stream PCG32.
const PCG_DEFAULT_INCREMENT: u64 = 1442695040888963407;

/// Multiplier of the LCG step.
const PCG_MULTIPLIER: u64 = 6364136223846793005;

/// PCG32 random number generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

impl Pcg32 {
    /// Creates a generator from an initial state and a stream selector.
    #[must_use]
    pub const fn new(state: u64, stream: u64) -> Self {
        let inc = (stream << 1) | 1;
        let mut pcg = Self { state: 0, inc };
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg.state = pcg.state.wrapping_add(state);
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg
    }

    /// Creates a generator on the default stream.
    #[must_use]
    pub const fn seed_from_u64(seed: u64) -> Self {
        Self::new(seed, PCG_DEFAULT_INCREMENT)
    }

    /// Generates the next 32-bit value.
    #[inline]
    #[must_use]
    pub fn next_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state
            .wrapping_mul(PCG_MULTIPLIER)
            .wrapping_add(self.inc);
        let xorshifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Returns `true` with the given probability.
    ///
    /// Probabilities outside `[0.0, 1.0]` (and NaN) are reported and clamped.
    pub fn gen_bool(&mut self, probability: f64) -> bool {
        if !(0.0..=1.0).contains(&probability) {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::Configuration,
                "probability {} outside [0, 1], clamping",
                probability
            );
        }
        let p = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        if p >= 1.0 {
            // Never skip a draw, so the sequence does not depend on the probability
            let _ = self.next_u32();
            return true;
        }
        let threshold = (p * f64::from(u32::MAX)) as u32;
        self.next_u32() < threshold
    }
}
