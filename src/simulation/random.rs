use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Creates the random number generator of a single simulation element, e.g. a link.
///
/// The generator depends on the run's base seed and on `hash`, which should identify the element.
/// Every element draws from its own generator, so that the sequence of draws does not depend on the
/// order in which elements are processed.
pub fn get_rnd<H: Hash>(base_seed: u64, hash: H) -> SmallRng {
    let mut hasher = DefaultHasher::new();
    hash.hash(&mut hasher);
    base_seed.hash(&mut hasher);
    SmallRng::seed_from_u64(hasher.finish())
}
