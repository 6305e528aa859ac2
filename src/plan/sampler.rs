//! Combination space enumeration and seeded sampling.
//!
//! Combinations are addressed by a mixed-radix index over the variable
//! domains in declaration order; the last variable varies fastest, so
//! index order is the outer-to-inner Cartesian order.

use crate::error::PlanningError;
use crate::rng::SeededStream;
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, warn};

/// One choice of value per variable, in declaration order.
pub type Bindings = IndexMap<String, String>;

/// Cartesian product over variable domains.
pub struct CombinationSpace<'a> {
    domains: &'a IndexMap<String, Vec<String>>,
}

impl<'a> CombinationSpace<'a> {
    /// Domains must be non-empty and free of duplicate values.
    pub fn new(domains: &'a IndexMap<String, Vec<String>>) -> Self {
        Self { domains }
    }

    /// Product of domain sizes, saturating at `u128::MAX`.
    pub fn size(&self) -> u128 {
        self.domains
            .values()
            .try_fold(1u128, |acc, values| acc.checked_mul(values.len() as u128))
            .unwrap_or(u128::MAX)
    }

    /// Decode a mixed-radix index into bindings. `index < size()`.
    pub fn at(&self, mut index: u128) -> Bindings {
        let mut picks: Vec<(&String, &String)> = Vec::with_capacity(self.domains.len());
        for (name, values) in self.domains.iter().rev() {
            let radix = values.len() as u128;
            let digit = (index % radix) as usize;
            index /= radix;
            picks.push((name, &values[digit]));
        }
        picks
            .into_iter()
            .rev()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// The first `count` combinations in Cartesian order.
    pub fn first(&self, count: usize) -> Vec<Bindings> {
        let take = (count as u128).min(self.size());
        (0..take).map(|index| self.at(index)).collect()
    }

    /// Every combination in Cartesian order.
    pub fn all(&self) -> Vec<Bindings> {
        self.first(usize::MAX)
    }

    /// `count` distinct combinations drawn from `seed`, in draw order.
    ///
    /// Each draw picks every variable independently; a draw that repeats an
    /// earlier combination is discarded and drawn again, so exactly `count`
    /// combinations come back. Callers guarantee `count < size()`.
    pub fn sample(&self, seed: u64, count: usize) -> Result<Vec<Bindings>, PlanningError> {
        let mut stream = SeededStream::new(seed, b"combinations");
        let mut seen: HashSet<Vec<usize>> = HashSet::with_capacity(count);
        let mut picked = Vec::with_capacity(count);
        let budget = count.saturating_mul(64).saturating_add(100_000);
        let mut draws = 0usize;

        while picked.len() < count {
            if draws >= budget {
                return Err(PlanningError::Invalid(format!(
                    "could not draw {} distinct combinations after {} draws",
                    count, draws
                )));
            }
            draws += 1;
            let digits: Vec<usize> = self
                .domains
                .values()
                .map(|values| stream.below(values.len() as u64) as usize)
                .collect();
            if !seen.insert(digits.clone()) {
                continue;
            }
            picked.push(
                self.domains
                    .iter()
                    .zip(digits)
                    .map(|((name, values), digit)| (name.clone(), values[digit].clone()))
                    .collect(),
            );
        }

        debug!(seed, count, draws, "Sampled combinations");
        Ok(picked)
    }
}

/// Drop repeated values within each domain, keeping first occurrences.
pub fn dedup_domains(domains: &IndexMap<String, Vec<String>>) -> IndexMap<String, Vec<String>> {
    domains
        .iter()
        .map(|(name, values)| {
            let mut seen = HashSet::new();
            let unique: Vec<String> = values
                .iter()
                .filter(|value| seen.insert(value.as_str()))
                .cloned()
                .collect();
            if unique.len() != values.len() {
                warn!(
                    variable = %name,
                    dropped = values.len() - unique.len(),
                    "Variable domain contains repeated values"
                );
            }
            (name.clone(), unique)
        })
        .collect()
}
