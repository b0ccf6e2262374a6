//! Outcome sources.
//!
//! A run pulls draws one at a time. Synthetic sources are unbounded; the
//! scheduler's spin limit stops them. Imported sources replay a fixed slice
//! of recorded history and end when it runs out.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::config::{DataSource, ImportRange, RunConfig};
use crate::types::{Outcome, Pocket, TableVariant};

/// Ordered sequence of draws for one run.
pub trait OutcomeSource: Send {
    /// Next draw, or `None` once the sequence is exhausted.
    fn next_outcome(&mut self) -> Option<Outcome>;
}

/// Uniform draws over the table's pockets.
pub struct SyntheticSource {
    rng: ChaCha8Rng,
    table: TableVariant,
}

impl SyntheticSource {
    pub fn new(table: TableVariant, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { rng, table }
    }
}

impl OutcomeSource for SyntheticSource {
    fn next_outcome(&mut self) -> Option<Outcome> {
        let number = self.rng.gen_range(0..self.table.pocket_count());
        Pocket::new(number).map(Outcome::from)
    }
}

/// Replays a slice of recorded draws, oldest first.
pub struct ImportedSource {
    draws: std::vec::IntoIter<Pocket>,
}

impl ImportedSource {
    /// Slice `numbers` by `range` and cap the result at `max_spins`.
    pub fn new(numbers: &[Pocket], range: &ImportRange, max_spins: u64) -> Self {
        let slice = range.apply(numbers);
        let cap = usize::try_from(max_spins).unwrap_or(usize::MAX).min(slice.len());
        debug!(
            available = numbers.len(),
            selected = slice.len(),
            replayed = cap,
            "Imported source prepared"
        );
        Self {
            draws: slice[..cap].to_vec().into_iter(),
        }
    }

    /// Draws not yet replayed.
    pub fn remaining(&self) -> usize {
        self.draws.len()
    }
}

impl OutcomeSource for ImportedSource {
    fn next_outcome(&mut self) -> Option<Outcome> {
        self.draws.next().map(Outcome::from)
    }
}

/// Build a fresh source for `config`. Imported sources always re-slice from
/// the full recorded list.
pub fn build_source(config: &RunConfig) -> Box<dyn OutcomeSource> {
    match &config.source {
        DataSource::Synthetic { seed } => Box::new(SyntheticSource::new(config.table, *seed)),
        DataSource::Imported { numbers, range } => {
            Box::new(ImportedSource::new(numbers, range, config.max_spins))
        }
    }
}
