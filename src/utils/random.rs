//! Small random-selection helpers shared across the bot.

use rand::RngExt;

/// Picks one element with uniform probability. Returns `None` for an empty slice.
pub fn pick_uniform<T>(items: &[T]) -> Option<&T> {
    if items.is_empty() {
        return None;
    }
    let index = rand::rng().random_range(0..items.len());
    items.get(index)
}

/// Picks one element with probability proportional to its paired weight.
///
/// Weights must be positive; a non-positive total only happens when internal
/// state is corrupt, so that case fails loudly instead of being papered over.
pub fn pick_weighted<T>(items: &[(f64, T)]) -> &T {
    let total: f64 = items.iter().map(|(weight, _)| weight).sum();
    if total <= 0.0 {
        unreachable!("weighted pick requires a positive total weight");
    }

    let target = rand::rng().random::<f64>() * total;
    let mut running = 0.0;
    for (weight, item) in items {
        running += weight;
        if running > target {
            return item;
        }
    }
    unreachable!("running weight total never reached the target");
}

/// Returns a uniformly random permutation, built by repeated uniform draws
/// without replacement.
pub fn shuffle<T>(items: Vec<T>) -> Vec<T> {
    let mut source = items;
    let mut result = Vec::with_capacity(source.len());
    let mut rng = rand::rng();
    while !source.is_empty() {
        let index = rng.random_range(0..source.len());
        result.push(source.remove(index));
    }
    result
}
