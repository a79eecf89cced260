use super::*;

/// Keccak-256 seed hashes, stepping forward from the last epoch computed.
pub struct SeedCache {
    algorithm: Algorithm,
    last: Mutex<(u64, [u8; 32])>,
}

impl SeedCache {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            last: Mutex::new((0, [0; 32])),
        }
    }

    pub fn seed_hash(&self, height: u64) -> [u8; 32] {
        let epoch = self.algorithm.epoch(height);

        let mut last = self.last.lock();

        let (mut current, mut seed) = if epoch >= last.0 { *last } else { (0, [0; 32]) };

        while current < epoch {
            seed = Keccak256::digest(seed).into();
            current += 1;
        }

        if epoch > last.0 {
            debug!("Advanced seed hash to epoch {epoch}");
            *last = (epoch, seed);
        }

        seed
    }
}
