use super::*;

/// Difficulties carry eight decimal places.
const SCALE: u64 = 100_000_000;

/// Renders a target as 64 lowercase hex characters, most significant byte first.
pub fn target_hex(target: U256) -> String {
    hex::encode(target.to_big_endian())
}

pub fn parse_target(hex: &str) -> Result<U256> {
    let bytes = hex::decode(hex).with_context(|| format!("invalid target `{hex}`"))?;
    ensure!(
        bytes.len() <= 32,
        "target `{hex}` is {} bytes, expected at most 32",
        bytes.len()
    );
    Ok(U256::from_big_endian(&bytes))
}

fn to_f64(value: U256) -> f64 {
    if value.bits() <= 128 {
        return value.as_u128() as f64;
    }

    let shift = value.bits() - 64;
    (value >> shift).as_u64() as f64 * 2f64.powi(shift as i32)
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, derive_more::Display, Serialize)]
#[serde(transparent)]
pub struct Difficulty(f64);

impl Difficulty {
    /// Rounds to the nearest representable difficulty.
    pub fn new(difficulty: f64) -> Self {
        Self((difficulty * SCALE as f64).round() / SCALE as f64)
    }

    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// `diff1 / target`, computed in integers at eight decimal places.
    pub fn from_target(algorithm: &Algorithm, target: U256) -> Self {
        let target = U512::from(target.max(U256::one()));

        let quotient =
            (U512::from(algorithm.diff1) * U512::from(SCALE) + target / 2) / target;

        let quotient = U256::try_from(quotient).unwrap_or(U256::MAX);

        Self(to_f64(quotient) / SCALE as f64)
    }

    /// `pow_limit / difficulty`, saturating at the largest target.
    pub fn to_target(self, algorithm: &Algorithm) -> U256 {
        let denominator = (self.0 * SCALE as f64).round();

        if !denominator.is_finite() || denominator < 1.0 {
            return U256::MAX;
        }

        let denominator = if denominator >= u128::MAX as f64 {
            U512::from(u128::MAX)
        } else {
            U512::from(denominator as u128)
        };

        let target = U512::from(algorithm.pow_limit) * U512::from(SCALE) / denominator;

        U256::try_from(target).unwrap_or(U256::MAX)
    }

    pub fn target_hex(self, algorithm: &Algorithm) -> String {
        target_hex(self.to_target(algorithm))
    }
}

impl From<f64> for Difficulty {
    fn from(difficulty: f64) -> Self {
        Self::new(difficulty)
    }
}

impl From<u64> for Difficulty {
    fn from(difficulty: u64) -> Self {
        Self::new(difficulty as f64)
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let difficulty = f64::deserialize(deserializer)?;

        if !difficulty.is_finite() || difficulty <= 0.0 {
            return Err(de::Error::custom("difficulty must be finite and > 0"));
        }

        Ok(Self::new(difficulty))
    }
}
