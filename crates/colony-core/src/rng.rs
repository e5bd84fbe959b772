use rand_pcg::Pcg64;
use rand::SeedableRng;

/// Per-model seed offsets (§9 "Randomness"). Each model owns a distinct
/// stream seeded as `base_seed + offset`; `reset()` recreates them all.
pub const OFFSET_WORKLOAD: u64 = 0;
pub const OFFSET_CARBON: u64 = 100;
pub const OFFSET_THERMAL: u64 = 200;
pub const OFFSET_GPU: u64 = 300;
pub const OFFSET_NETWORK: u64 = 400;
pub const OFFSET_STORAGE: u64 = 500;
pub const OFFSET_COOLING: u64 = 600;

/// A model-owned RNG stream seeded once at construction/reset from
/// `base_seed + offset`, advancing tick over tick (not reseeded per tick).
pub fn model_rng(base_seed: u64, offset: u64) -> Pcg64 {
    Pcg64::seed_from_u64(base_seed.wrapping_add(offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn different_offsets_diverge() {
        let mut a = model_rng(42, OFFSET_THERMAL);
        let mut b = model_rng(42, OFFSET_GPU);
        assert_ne!(a.gen::<u64>(), b.gen::<u64>());
    }
}
