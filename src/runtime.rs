//! Execution runtime for the partitioning phases.
//!
//! A [`Runtime`] bundles the base seed, the determinism flag and the worker
//! pool, and is passed explicitly to every phase. Reproducibility is built on
//! two ideas:
//!
//! - Anything that must replay identically (shuffles, tie-break ranks, round
//!   salts) is derived *statelessly* from the base seed: shuffles are seeded
//!   permutations (a parallel sort of mixed index keys), so they come out the
//!   same for every thread count, and per-phase salts are folded from a label
//!   and a round index.
//! - Randomness that is allowed to differ between runs (tie-break coin flips
//!   in the nondeterministic coarsening mode) comes from a per-worker RNG
//!   that seeds itself lazily from the Rayon worker index; no pool handlers
//!   or cross-thread RNG state are involved.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

thread_local! {
    /// Per-worker RNG for nondeterministic tie-breaking, seeded on first use.
    static WORKER_RNG: RefCell<Option<SmallRng>> = const { RefCell::new(None) };
}

/// SplitMix64 finalizer (Steele et al.; the constants are the published
/// ones). Used wherever an index or seed must be spread into uncorrelated
/// bits: permutation keys, per-phase salts, worker RNG seeds.
#[inline]
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Build the worker pool a partitioning call runs on. With `num_threads` of
/// `None`, Rayon picks its default width. Workers carry no RNG setup; see
/// [`with_worker_rng`].
pub fn build_worker_pool(num_threads: Option<usize>) -> ThreadPool {
    let mut builder =
        ThreadPoolBuilder::new().thread_name(|i| format!("hypermill-worker-{i}"));
    if let Some(n) = num_threads {
        builder = builder.num_threads(n);
    }
    builder.build().expect("worker pool construction failed")
}

/// Borrow the calling worker's tie-break RNG, seeding it from the Rayon
/// worker index on first use. Only the nondeterministic rating tie-break
/// draws from it; nothing that must reproduce across runs goes through here.
pub fn with_worker_rng<T>(f: impl FnOnce(&mut SmallRng) -> T) -> T {
    WORKER_RNG.with(|cell| {
        let mut slot = cell.borrow_mut();
        let rng = slot.get_or_insert_with(|| {
            let worker = rayon::current_thread_index().unwrap_or(usize::MAX) as u64;
            SmallRng::seed_from_u64(splitmix64(worker))
        });
        f(rng)
    })
}

// ---------------------------------------------------------------------------
// Runtime value
// ---------------------------------------------------------------------------

/// Explicit runtime handed to every phase: seed, determinism flag and the
/// pool to run on. The public entry point owns it and tears it down.
pub struct Runtime {
    seed: u64,
    deterministic: bool,
    pool: Option<ThreadPool>,
}

impl Runtime {
    /// Runtime with its own worker pool.
    pub fn new(seed: u64, deterministic: bool, num_threads: Option<usize>) -> Self {
        Self {
            seed,
            deterministic,
            pool: Some(build_worker_pool(num_threads)),
        }
    }

    /// Runtime that executes on the caller's ambient Rayon pool (used when a
    /// process-wide pool was installed, or none is wanted).
    pub fn on_current_pool(seed: u64, deterministic: bool) -> Self {
        Self {
            seed,
            deterministic,
            pool: None,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn deterministic(&self) -> bool {
        self.deterministic
    }

    /// Number of worker threads available to this runtime.
    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Execute `f` on this runtime's pool.
    pub fn install<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    /// Fold a phase label and a round index into a salt bound to this
    /// runtime's seed. Distinct labels and indices give unrelated streams, so
    /// every shuffle and rating pass draws from its own corner of the seed
    /// space.
    pub fn salt(&self, label: &str, extra: u64) -> u64 {
        let mut h = splitmix64(self.seed ^ extra.rotate_left(32));
        for b in label.bytes() {
            h = splitmix64(h ^ u64::from(b));
        }
        h
    }
}

// ---------------------------------------------------------------------------
// Seeded permutations
// ---------------------------------------------------------------------------

/// A seeded permutation of `0..n`: a parallel sort of indices by mixed keys.
/// Identical for every thread count, which is what deterministic mode relies
/// on instead of a concurrent shuffle.
pub fn seeded_permutation(n: usize, seed: u64) -> Vec<u32> {
    let mut perm: Vec<u32> = (0..n as u32).collect();
    perm.par_sort_unstable_by_key(|&i| (splitmix64(seed ^ (i as u64).wrapping_mul(0xDA94_2042_E4DD_58B5)), i));
    perm
}

/// Seeded in-place shuffle of a slice, same ordering guarantee as
/// [`seeded_permutation`].
pub fn seeded_shuffle<T: Send>(items: &mut [T], seed: u64) {
    let keys: Vec<u64> = (0..items.len() as u64)
        .map(|i| splitmix64(seed ^ i.wrapping_mul(0xDA94_2042_E4DD_58B5)))
        .collect();
    // Apply the permutation given by sorting the keys.
    let mut order: Vec<u32> = (0..items.len() as u32).collect();
    order.par_sort_unstable_by_key(|&i| (keys[i as usize], i));
    apply_permutation(items, &order);
}

/// Permute `items` so that `items[i] = old_items[order[i]]`.
fn apply_permutation<T>(items: &mut [T], order: &[u32]) {
    debug_assert_eq!(items.len(), order.len());
    let mut visited = vec![false; items.len()];
    for start in 0..items.len() {
        if visited[start] || order[start] as usize == start {
            visited[start] = true;
            continue;
        }
        // Walk the cycle starting at `start`.
        let mut i = start;
        while !visited[i] {
            visited[i] = true;
            let j = order[i] as usize;
            if !visited[j] {
                items.swap(i, j);
            }
            i = j;
        }
    }
}

/// Ranks of a seeded permutation: `rank[v]` is the position of `v` in
/// [`seeded_permutation`] of the same seed. Used for deterministic
/// tie-breaking ("permutation sort").
pub fn permutation_ranks(n: usize, seed: u64) -> Vec<u32> {
    let perm = seeded_permutation(n, seed);
    let mut rank = vec![0u32; n];
    for (pos, &v) in perm.iter().enumerate() {
        rank[v as usize] = pos as u32;
    }
    rank
}

// ---------------------------------------------------------------------------
// Atomic f64
// ---------------------------------------------------------------------------

/// An f64 with atomic add, stored as bits in an `AtomicU64`. Accumulation is
/// not associative, which is the accepted source of nondeterminism in the
/// nondeterministic community-detection mode.
#[derive(Debug)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn fetch_add(&self, delta: f64) -> f64 {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let new = (f64::from_bits(current) + delta).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, new, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return f64::from_bits(current),
                Err(actual) => current = actual,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn worker_rng_works_under_parallel_load() {
        let pool = build_worker_pool(Some(4));
        let coins: usize = pool.install(|| {
            (0..10_000)
                .into_par_iter()
                .map(|_| with_worker_rng(|rng| rng.gen_bool(0.5)) as usize)
                .sum()
        });
        // Smoke check: the coin is not stuck on either side.
        assert!(coins > 1_000 && coins < 9_000, "suspicious coin count {coins}");
    }

    #[test]
    fn permutation_deterministic_across_thread_counts() {
        let a = build_worker_pool(Some(1)).install(|| seeded_permutation(1000, 99));
        let b = build_worker_pool(Some(4)).install(|| seeded_permutation(1000, 99));
        assert_eq!(a, b);
    }

    #[test]
    fn permutation_is_a_permutation() {
        let p = seeded_permutation(257, 3);
        let mut sorted = p.clone();
        sorted.sort_unstable();
        let expected: Vec<u32> = (0..257).collect();
        assert_eq!(sorted, expected);
        // Seeds change the order.
        assert_ne!(p, seeded_permutation(257, 4));
    }

    #[test]
    fn shuffle_applies_permutation() {
        let mut items: Vec<u32> = (0..100).collect();
        seeded_shuffle(&mut items, 11);
        let perm = seeded_permutation(100, 11);
        assert_eq!(items, perm);
    }

    #[test]
    fn ranks_invert_permutation() {
        let perm = seeded_permutation(64, 5);
        let rank = permutation_ranks(64, 5);
        for (pos, &v) in perm.iter().enumerate() {
            assert_eq!(rank[v as usize] as usize, pos);
        }
    }

    #[test]
    fn atomic_f64_accumulates() {
        let acc = AtomicF64::new(0.0);
        (0..1000).into_par_iter().for_each(|_| {
            acc.fetch_add(0.5);
        });
        assert!((acc.load() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn salts_separate_phases_and_rounds() {
        let rt = Runtime::on_current_pool(1, false);
        assert_ne!(rt.salt("lp-round", 0), rt.salt("fm-round", 0));
        assert_ne!(rt.salt("lp-round", 0), rt.salt("lp-round", 1));
        assert_eq!(rt.salt("lp-round", 2), rt.salt("lp-round", 2));
        // The base seed shifts every stream.
        let other = Runtime::on_current_pool(2, false);
        assert_ne!(rt.salt("lp-round", 0), other.salt("lp-round", 0));
    }
}
