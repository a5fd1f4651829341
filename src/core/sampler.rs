use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

/// Table-driven weighted choice over a fixed item set.
///
/// Weights are fixed at construction; the RNG is injected per draw so tests
/// can seed the outcome.
#[derive(Debug, Clone)]
pub struct WeightedTable<T: Copy> {
    items: Vec<T>,
    dist: Option<WeightedIndex<f32>>,
}

impl<T: Copy> WeightedTable<T> {
    pub fn new(entries: &[(T, f32)]) -> Self {
        let items: Vec<T> = entries.iter().map(|(item, _)| *item).collect();
        let weights: Vec<f32> = entries.iter().map(|(_, w)| w.max(0.0)).collect();
        let dist = WeightedIndex::new(&weights).ok();
        Self { items, dist }
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<T> {
        match &self.dist {
            Some(dist) => self.items.get(dist.sample(rng)).copied(),
            // Degenerate weights: fall back to uniform choice.
            None if !self.items.is_empty() => {
                let idx = rng.random_range(0..self.items.len());
                self.items.get(idx).copied()
            }
            None => None,
        }
    }
}
