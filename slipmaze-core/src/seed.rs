//! Deterministic random streams for trial execution.
//!
//! Every trial is driven by a user-visible `u64` seed. The seed is never fed to
//! a generator directly: an HMAC-SHA256 keyed by the seed and a domain tag
//! derives an independent stream seed, so adding a new consumer of randomness
//! does not perturb the trajectories of existing ones.
use hmac::{Hmac, Mac};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::constants::TRANSITION_STREAM_TAG;

/// Derive a domain-separated stream seed from a user seed.
#[must_use]
pub fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    let mut mac = Hmac::<sha2::Sha256>::new_from_slice(&user_seed.to_le_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}

/// Random source used for sampling transition outcomes of a trial.
pub type TransitionRng = CountingRng<ChaCha20Rng>;

/// Build the transition stream for a trial seed.
#[must_use]
pub fn transition_rng(user_seed: u64) -> TransitionRng {
    CountingRng::new(ChaCha20Rng::seed_from_u64(derive_stream_seed(
        user_seed,
        TRANSITION_STREAM_TAG,
    )))
}

/// Counting wrapper for RNG streams providing instrumentation.
#[derive(Debug, Clone)]
pub struct CountingRng<R> {
    rng: R,
    draws: u64,
}

impl<R: rand::RngCore> CountingRng<R> {
    #[must_use]
    pub const fn new(rng: R) -> Self {
        Self { rng, draws: 0 }
    }

    /// Number of draw calls performed against this stream.
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }
}

impl<R: rand::RngCore> rand::RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws = self.draws.saturating_add(1);
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.draws = self.draws.saturating_add(1);
        self.rng.try_fill_bytes(dest)
    }
}
