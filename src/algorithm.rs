use super::*;

/// Proof-of-work parameters threaded through job construction and connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Algorithm {
    pub diff1: U256,
    pub pow_limit: U256,
    pub epoch_length: u64,
}

impl Algorithm {
    pub const KAWPOW: Self = Self {
        diff1: U256([0, 0, 0, 0x0000_0000_ff00_0000]),
        pow_limit: U256([0, 0, 0, 0x0000_0000_ff00_0000]),
        epoch_length: 7500,
    };

    pub fn epoch(&self, height: u64) -> u64 {
        height / self.epoch_length
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::KAWPOW
    }
}
