//! Random set selection
//!
//! The random source is always passed in. Seeded runs use `StdRng`, so the
//! same seed over the same eligible list picks the same set every time for
//! a given build.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::types::ThrowbackSet;

/// Build the random source for a run
///
/// A seed that parses as `u64` is used as-is; any other string is hashed
/// with SHA-256, so `--seed spring-2025` is as reproducible as `--seed 7`.
pub fn rng_for_seed(seed: Option<&str>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed_to_u64(seed)),
        None => StdRng::from_entropy(),
    }
}

pub fn seed_to_u64(seed: &str) -> u64 {
    if let Ok(n) = seed.trim().parse::<u64>() {
        return n;
    }
    let digest = Sha256::digest(seed.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Pick one set uniformly at random
///
/// # Panics
///
/// Panics if `eligible` is empty. Eligibility filtering never yields an
/// empty list, so this is a caller bug rather than a runtime condition.
pub fn select<'a, R: Rng + ?Sized>(eligible: &[&'a ThrowbackSet], rng: &mut R) -> &'a ThrowbackSet {
    assert!(!eligible.is_empty(), "select called with no eligible sets");
    let index = rng.gen_range(0..eligible.len());
    eligible[index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sets(n: usize) -> Vec<ThrowbackSet> {
        (0..n)
            .map(|i| ThrowbackSet {
                name: format!("set-{}", i),
                images: vec![format!("{}.jpg", i)],
                description: None,
                set_url: None,
                date_published: None,
                tags: None,
            })
            .collect()
    }

    #[test]
    fn test_same_seed_same_choice() {
        let all = sets(10);
        let eligible: Vec<&ThrowbackSet> = all.iter().collect();

        let first = select(&eligible, &mut rng_for_seed(Some("42")));
        let second = select(&eligible, &mut rng_for_seed(Some("42")));
        assert_eq!(first.name, second.name);
    }

    #[test]
    fn test_string_seed_is_deterministic() {
        assert_eq!(seed_to_u64("spring-2025"), seed_to_u64("spring-2025"));
        assert_ne!(seed_to_u64("spring-2025"), seed_to_u64("autumn-2025"));
        assert_eq!(seed_to_u64("17"), 17);
    }

    #[test]
    fn test_single_candidate() {
        let all = sets(1);
        let eligible: Vec<&ThrowbackSet> = all.iter().collect();
        assert_eq!(select(&eligible, &mut rng_for_seed(None)).name, "set-0");
    }

    #[test]
    fn test_distribution_roughly_uniform_across_seeds() {
        let all = sets(4);
        let eligible: Vec<&ThrowbackSet> = all.iter().collect();
        let trials = 4000;

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for seed in 0..trials {
            let chosen = select(&eligible, &mut rng_for_seed(Some(&seed.to_string())));
            *counts.entry(chosen.name.as_str()).or_default() += 1;
        }

        assert_eq!(counts.len(), 4);
        let expected = trials / 4;
        for (name, count) in counts {
            // ~5 standard deviations for a binomial with p = 0.25
            assert!(
                count.abs_diff(expected) < 140,
                "{} chosen {} times, expected about {}",
                name,
                count,
                expected
            );
        }
    }

    #[test]
    #[should_panic(expected = "no eligible sets")]
    fn test_empty_input_panics() {
        let eligible: Vec<&ThrowbackSet> = Vec::new();
        select(&eligible, &mut rng_for_seed(Some("1")));
    }
}
