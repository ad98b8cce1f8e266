// Explicit random-source handle.
//
// Every sampling call in the crate takes a `&mut Prng`; there is no global
// generator. Subjects simulated in parallel each own an isolated stream
// derived from the batch seed and their index, so a fixed seed reproduces
// the same batch regardless of scheduling order.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rand_pcg::Pcg64Mcg;

/// Golden-ratio increment used to decorrelate derived stream seeds.
const STREAM_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone)]
pub struct Prng {
    inner: Pcg64Mcg,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// The process-default stream, seeded from OS entropy.
    ///
    /// Only used when a caller does not supply a stream; results drawn from it
    /// are not reproducible.
    pub fn from_entropy() -> Self {
        Self {
            inner: Pcg64Mcg::from_entropy(),
        }
    }

    /// Derive an isolated stream for `index` under `master_seed`.
    ///
    /// Adding streams never changes existing ones: stream `i` only depends on
    /// `(master_seed, i)`.
    pub fn for_stream(master_seed: u64, index: u64) -> Self {
        let derived = splitmix64(master_seed ^ index.wrapping_add(1).wrapping_mul(STREAM_MIX));
        Self::new(derived)
    }

    /// Uniform draw in [0, 1).
    #[inline]
    pub fn next_f64_01(&mut self) -> f64 {
        self.gen::<f64>()
    }

    /// Uniform in [low, high). Returns `low` for an empty range.
    #[inline]
    pub fn gen_range_f64(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.gen_range(low..high)
    }

    /// Uniform integer in [low, high). Returns `low` for an empty range.
    #[inline]
    pub fn gen_range_usize(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        self.gen_range(low..high)
    }

    /// Bernoulli trial: true with probability `p`, clamped to [0, 1]; NaN is never true.
    #[inline]
    pub fn chance(&mut self, p: f64) -> bool {
        if p.is_nan() || p <= 0.0 {
            return false;
        }
        self.gen_bool(p.min(1.0))
    }

    #[inline]
    pub fn standard_normal(&mut self) -> f64 {
        StandardNormal.sample(self)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(self);
    }
}

impl RngCore for Prng {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(STREAM_MIX);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = Prng::new(7);
        let mut b = Prng::new(7);
        for _ in 0..32 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn derived_streams_differ_by_index() {
        let mut a = Prng::for_stream(42, 0);
        let mut b = Prng::for_stream(42, 1);
        let xs: Vec<u64> = (0..8).map(|_| a.next_u64()).collect();
        let ys: Vec<u64> = (0..8).map(|_| b.next_u64()).collect();
        assert_ne!(xs, ys);
    }

    #[test]
    fn unit_draws_stay_in_range() {
        let mut rng = Prng::new(3);
        for _ in 0..10_000 {
            let u = rng.next_f64_01();
            assert!((0.0..1.0).contains(&u));
            let k = rng.gen_range_usize(2, 5);
            assert!((2..5).contains(&k));
        }
        assert_eq!(rng.gen_range_usize(4, 4), 4);
        assert_eq!(rng.gen_range_f64(1.5, 1.5), 1.5);
    }

    #[test]
    fn chance_handles_degenerate_probabilities() {
        let mut rng = Prng::new(5);
        for _ in 0..1000 {
            assert!(!rng.chance(0.0));
            assert!(!rng.chance(-0.5));
            assert!(!rng.chance(f64::NAN));
            assert!(rng.chance(1.0));
            assert!(rng.chance(3.0));
        }
        let hits = (0..20_000).filter(|_| rng.chance(0.25)).count();
        assert!((hits as f64 / 20_000.0 - 0.25).abs() < 0.02);
    }

    #[test]
    fn shuffle_is_a_seeded_permutation() {
        let mut a: Vec<u32> = (0..50).collect();
        let mut b = a.clone();
        Prng::new(9).shuffle(&mut a);
        Prng::new(9).shuffle(&mut b);
        assert_eq!(a, b);
        assert_ne!(a, (0..50).collect::<Vec<_>>());
        a.sort_unstable();
        assert_eq!(a, (0..50).collect::<Vec<_>>());
    }
}
