//! Per-validator gas power counters.

use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of gas power windows.
pub const GAS_POWER_WINDOWS: usize = 2;

/// Index of the short-term window.
pub const SHORT_TERM_GAS: usize = 0;

/// Index of the long-term window.
pub const LONG_TERM_GAS: usize = 1;

/// Gas power left after an event, one counter per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GasPowerLeft {
    /// Remaining gas power, indexed by [`SHORT_TERM_GAS`] and [`LONG_TERM_GAS`].
    pub gas: [u64; GAS_POWER_WINDOWS],
}

impl GasPowerLeft {
    /// Creates counters from the two window values.
    pub const fn new(short_term: u64, long_term: u64) -> Self {
        Self {
            gas: [short_term, long_term],
        }
    }

    /// The tighter of the two windows.
    pub fn min(&self) -> u64 {
        self.gas[SHORT_TERM_GAS].min(self.gas[LONG_TERM_GAS])
    }

    /// Subtracts `used` from both windows, `None` if either would underflow.
    pub fn checked_sub(&self, used: u64) -> Option<Self> {
        Some(Self {
            gas: [
                self.gas[SHORT_TERM_GAS].checked_sub(used)?,
                self.gas[LONG_TERM_GAS].checked_sub(used)?,
            ],
        })
    }
}

impl fmt::Display for GasPowerLeft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{short={}, long={}}}",
            self.gas[SHORT_TERM_GAS], self.gas[LONG_TERM_GAS]
        )
    }
}

impl Encodable for GasPowerLeft {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(GAS_POWER_WINDOWS);
        for gas in &self.gas {
            s.append(gas);
        }
    }
}

impl Decodable for GasPowerLeft {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != GAS_POWER_WINDOWS {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self::new(rlp.val_at(0)?, rlp.val_at(1)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_sub() {
        let left = GasPowerLeft::new(100, 50);
        assert_eq!(left.checked_sub(50), Some(GasPowerLeft::new(50, 0)));
        assert_eq!(left.checked_sub(51), None);
        assert_eq!(left.min(), 50);
    }
}
