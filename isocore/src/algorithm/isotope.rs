use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use itertools::izip;
use log::debug;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

use crate::algorithm::marginal::{ElementIsotopes, MarginalTrek};
use crate::chemistry::elements::{isotopic_abundance, isotopic_weights};
use crate::chemistry::sum_formula::parse_formula;
use crate::data::tabulator::Tabulator;
use crate::error::IsoError;

/// Full description of a molecule for which isotopologue distributions are
/// generated: one [`ElementIsotopes`] per element in the formula.
///
/// The description is immutable once built; every generator constructed from
/// it owns an independent search session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Iso {
    elements: Vec<ElementIsotopes>,
}

impl Iso {
    /// Build a formula description from a chemical formula string and the
    /// bundled periodic table.
    ///
    /// # Arguments
    ///
    /// * `formula` - The chemical formula, e.g. "C6H12O6".
    ///
    /// # Returns
    ///
    /// * `Result<Iso, IsoError>` - The description, or `InvalidFormula`.
    ///
    /// # Examples
    ///
    /// ```
    /// use isocore::algorithm::isotope::Iso;
    ///
    /// let iso = Iso::new("H2O").unwrap();
    /// assert_eq!(iso.dim_number(), 2);
    /// // hydrogen has 2 stable isotopes, oxygen has 3
    /// assert_eq!(iso.all_dim(), 5);
    /// ```
    pub fn new(formula: &str) -> Result<Iso, IsoError> {
        let element_counts = parse_formula(formula)?;
        Self::from_element_counts(&element_counts)
    }

    /// Build a formula description from parsed element counts and the bundled
    /// periodic table.
    pub fn from_element_counts(element_counts: &[(String, i32)]) -> Result<Iso, IsoError> {
        let weights = isotopic_weights();
        let abundance = isotopic_abundance();

        let mut elements = Vec::with_capacity(element_counts.len());
        for (symbol, count) in element_counts {
            let masses = weights
                .get(symbol.as_str())
                .ok_or_else(|| IsoError::InvalidFormula(format!("unknown element: {}", symbol)))?;
            let probs = &abundance[symbol.as_str()];
            elements.push(ElementIsotopes::new(*count, masses.clone(), probs.clone())?);
        }

        debug!("formula with {} elements set up for isotopologue search", elements.len());
        Self::from_elements(elements)
    }

    /// Build a formula description directly from per-element atom counts,
    /// isotope masses and isotope probabilities.
    ///
    /// # Arguments
    ///
    /// * `atom_counts` - Number of atoms of each element.
    /// * `isotope_masses` - One mass list per element.
    /// * `isotope_probabilities` - One probability list per element, same shapes as the masses.
    ///
    /// # Returns
    ///
    /// * `Result<Iso, IsoError>` - The description, or `InvalidComponents`.
    pub fn from_components(
        atom_counts: Vec<i32>,
        isotope_masses: Vec<Vec<f64>>,
        isotope_probabilities: Vec<Vec<f64>>,
    ) -> Result<Iso, IsoError> {
        if atom_counts.len() != isotope_masses.len()
            || atom_counts.len() != isotope_probabilities.len()
        {
            return Err(IsoError::InvalidComponents(format!(
                "{} atom counts, {} isotope mass lists, {} isotope probability lists",
                atom_counts.len(),
                isotope_masses.len(),
                isotope_probabilities.len()
            )));
        }

        let mut elements = Vec::with_capacity(atom_counts.len());
        for (count, masses, probs) in izip!(atom_counts, isotope_masses, isotope_probabilities) {
            elements.push(ElementIsotopes::new(count, masses, probs)?);
        }
        Self::from_elements(elements)
    }

    fn from_elements(elements: Vec<ElementIsotopes>) -> Result<Iso, IsoError> {
        if elements.is_empty() {
            return Err(IsoError::InvalidComponents(
                "formula contains no elements".to_string(),
            ));
        }
        Ok(Iso { elements })
    }

    /// Number of elements in the formula.
    pub fn dim_number(&self) -> usize {
        self.elements.len()
    }

    /// Total number of isotopes over all elements of the formula.
    pub fn all_dim(&self) -> usize {
        self.elements.iter().map(|e| e.isotope_number()).sum()
    }

    pub fn isotope_numbers(&self) -> Vec<usize> {
        self.elements.iter().map(|e| e.isotope_number()).collect()
    }

    pub fn elements(&self) -> &[ElementIsotopes] {
        &self.elements
    }

    /// Log-probability of the most probable isotopologue.
    pub fn mode_lprob(&self) -> f64 {
        self.elements
            .iter()
            .map(|e| e.log_prob_of(&e.mode_conf()))
            .sum()
    }

    /// Mass of the lightest isotopologue.
    pub fn lightest_peak_mass(&self) -> f64 {
        self.elements
            .iter()
            .map(|e| {
                e.atom_count() as f64
                    * e.masses().iter().cloned().fold(f64::INFINITY, f64::min)
            })
            .sum()
    }

    /// Mass of the heaviest isotopologue.
    pub fn heaviest_peak_mass(&self) -> f64 {
        self.elements
            .iter()
            .map(|e| {
                e.atom_count() as f64
                    * e.masses().iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            })
            .sum()
    }

    /// Mass of the isotopologue built from each element's most abundant isotope.
    pub fn monoisotopic_mass(&self) -> f64 {
        self.elements
            .iter()
            .map(|e| {
                let best = e
                    .log_probabilities()
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                    .map(|(idx, _)| idx)
                    .unwrap();
                e.atom_count() as f64 * e.masses()[best]
            })
            .sum()
    }

    /// Generator over the full configuration space in strictly non-increasing
    /// probability order.
    pub fn ordered_generator(&self) -> OrderedGenerator {
        OrderedGenerator::new(&self.elements)
    }

    /// Generator over all isotopologues with probability at least `threshold`,
    /// absolute or relative to the most probable isotopologue. Output order is
    /// unspecified.
    pub fn threshold_generator(
        &self,
        threshold: f64,
        absolute: bool,
    ) -> Result<ThresholdGenerator, IsoError> {
        ThresholdGenerator::new(self, threshold, absolute)
    }

    /// Generator over all isotopologues within `delta` natural-log units of
    /// the most probable one; `delta` must be negative. Output order is
    /// unspecified.
    pub fn layered_generator(&self, delta: f64) -> Result<LayeredGenerator, IsoError> {
        LayeredGenerator::new(self, delta)
    }
}

/// Common interface of all isotopologue generators.
///
/// A generator is a sequential state machine: `advance` moves to the next
/// configuration and returns false on exhaustion; the accessors report the
/// current configuration and are meaningful only after `advance` returned
/// true. Generators are single-pass: `peaks`/`conf_peaks` can be claimed once.
pub trait IsoGenerator {
    /// Advance to the next, not yet visited configuration.
    fn advance(&mut self) -> bool;

    /// Mass of the current configuration.
    fn mass(&self) -> f64;

    /// Log-probability of the current configuration.
    fn lprob(&self) -> f64;

    /// Probability of the current configuration.
    fn prob(&self) -> f64 {
        self.lprob().exp()
    }

    /// Flat isotope-count signature of the current configuration, one counter
    /// per isotope over all elements.
    fn conf_signature(&self) -> Vec<i32>;

    fn isotope_numbers(&self) -> &[usize];

    fn dim_number(&self) -> usize {
        self.isotope_numbers().len()
    }

    fn all_dim(&self) -> usize {
        self.isotope_numbers().iter().sum()
    }

    /// Mark this generator as iterated, failing if it already was.
    fn claim_iteration(&mut self) -> Result<(), IsoError>;

    /// Single-use iterator over `(mass, log-probability)` pairs.
    ///
    /// A second claim on the same generator returns `GeneratorConsumed`.
    fn peaks(&mut self) -> Result<Peaks<'_, Self>, IsoError>
    where
        Self: Sized,
    {
        self.claim_iteration()?;
        Ok(Peaks { generator: self })
    }

    /// Single-use iterator over `(mass, log-probability, configuration)`
    /// triples, the configuration split per element.
    fn conf_peaks(&mut self) -> Result<ConfPeaks<'_, Self>, IsoError>
    where
        Self: Sized,
    {
        self.claim_iteration()?;
        Ok(ConfPeaks { generator: self })
    }
}

/// Split a flat isotope-count signature into per-element count vectors.
pub fn split_conf(flat: &[i32], isotope_numbers: &[usize]) -> Vec<Vec<i32>> {
    let mut nested = Vec::with_capacity(isotope_numbers.len());
    let mut offset = 0;
    for &isotopes in isotope_numbers {
        nested.push(flat[offset..offset + isotopes].to_vec());
        offset += isotopes;
    }
    nested
}

pub struct Peaks<'a, G: IsoGenerator> {
    generator: &'a mut G,
}

impl<G: IsoGenerator> Iterator for Peaks<'_, G> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.generator.advance() {
            Some((self.generator.mass(), self.generator.lprob()))
        } else {
            None
        }
    }
}

pub struct ConfPeaks<'a, G: IsoGenerator> {
    generator: &'a mut G,
}

impl<G: IsoGenerator> Iterator for ConfPeaks<'_, G> {
    type Item = (f64, f64, Vec<Vec<i32>>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.generator.advance() {
            let conf = split_conf(
                &self.generator.conf_signature(),
                self.generator.isotope_numbers(),
            );
            Some((self.generator.mass(), self.generator.lprob(), conf))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct JointCandidate {
    lprob: OrderedFloat<f64>,
    indices: Vec<usize>,
}

impl Ord for JointCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lprob
            .cmp(&other.lprob)
            .then_with(|| self.indices.cmp(&other.indices))
    }
}

impl PartialOrd for JointCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Generator of isotopologues sorted by probability of occurrence.
///
/// Merges the per-element marginal treks through a priority frontier over
/// index tuples: each frontier entry points at one revealed configuration per
/// element. Popping a tuple emits it and pushes its successors, deepening the
/// touched marginal lazily, so only the part of the Cartesian product that is
/// actually emitted or compared ever materializes.
pub struct OrderedGenerator {
    treks: Vec<MarginalTrek>,
    heap: BinaryHeap<JointCandidate>,
    visited: HashSet<Vec<usize>>,
    isotope_numbers: Vec<usize>,
    cur_indices: Vec<usize>,
    cur_mass: f64,
    cur_lprob: f64,
    iterated: bool,
}

impl OrderedGenerator {
    fn new(elements: &[ElementIsotopes]) -> Self {
        let treks: Vec<MarginalTrek> = elements
            .iter()
            .map(|e| MarginalTrek::new(e.clone()))
            .collect();
        let isotope_numbers = elements.iter().map(|e| e.isotope_number()).collect();

        let first = vec![0; treks.len()];
        let lprob: f64 = treks.iter().map(|t| t.lprob(0)).sum();

        let mut heap = BinaryHeap::new();
        let mut visited = HashSet::new();
        visited.insert(first.clone());
        heap.push(JointCandidate {
            lprob: OrderedFloat(lprob),
            indices: first,
        });

        OrderedGenerator {
            treks,
            heap,
            visited,
            isotope_numbers,
            cur_indices: Vec::new(),
            cur_mass: f64::NAN,
            cur_lprob: f64::NAN,
            iterated: false,
        }
    }

    fn joint_lprob(&self, indices: &[usize]) -> f64 {
        indices
            .iter()
            .enumerate()
            .map(|(e, &idx)| self.treks[e].lprob(idx))
            .sum()
    }
}

impl IsoGenerator for OrderedGenerator {
    fn advance(&mut self) -> bool {
        let candidate = match self.heap.pop() {
            None => return false,
            Some(c) => c,
        };

        for e in 0..self.treks.len() {
            let mut successor = candidate.indices.clone();
            successor[e] += 1;
            if self.visited.contains(&successor) {
                continue;
            }
            if !self.treks[e].probe(successor[e]) {
                continue;
            }
            let lprob = self.joint_lprob(&successor);
            self.visited.insert(successor.clone());
            self.heap.push(JointCandidate {
                lprob: OrderedFloat(lprob),
                indices: successor,
            });
        }

        self.cur_mass = candidate
            .indices
            .iter()
            .enumerate()
            .map(|(e, &idx)| self.treks[e].mass(idx))
            .sum();
        self.cur_lprob = candidate.lprob.0;
        self.cur_indices = candidate.indices;
        true
    }

    fn mass(&self) -> f64 {
        self.cur_mass
    }

    fn lprob(&self) -> f64 {
        self.cur_lprob
    }

    fn conf_signature(&self) -> Vec<i32> {
        let mut signature = Vec::with_capacity(self.all_dim());
        for (e, &idx) in self.cur_indices.iter().enumerate() {
            signature.extend_from_slice(self.treks[e].conf(idx));
        }
        signature
    }

    fn isotope_numbers(&self) -> &[usize] {
        &self.isotope_numbers
    }

    fn claim_iteration(&mut self) -> Result<(), IsoError> {
        if self.iterated {
            return Err(IsoError::GeneratorConsumed);
        }
        self.iterated = true;
        Ok(())
    }
}

/// Pruned odometer over per-element configuration tables cut at a joint
/// log-probability boundary. Shared by the threshold and layered policies,
/// which differ only in how the cutoff is derived and whether the comparison
/// is strict.
///
/// Each marginal is first revealed down to the local cutoff
/// `cutoff - sum of the other elements' mode log-probabilities`; anything
/// below it cannot take part in a qualifying configuration. The odometer then
/// walks the product of the revealed tables, skipping a whole digit range as
/// soon as the suffix log-probability plus the best achievable prefix falls
/// below the cutoff. The prefix bound is exact once the skipped digits reset
/// to their modes, so every emitted configuration is re-checked exactly and
/// none above the cutoff is missed.
struct CutoffSweep {
    treks: Vec<MarginalTrek>,
    sizes: Vec<usize>,
    counter: Vec<usize>,
    // suffix sums over elements idx..d, entry d is zero
    partial_lprobs: Vec<f64>,
    partial_masses: Vec<f64>,
    // mode_prefix[idx] = best log-probability achievable by elements 0..idx
    mode_prefix: Vec<f64>,
    isotope_numbers: Vec<usize>,
    cutoff: f64,
    strict: bool,
    started: bool,
    terminated: bool,
}

impl CutoffSweep {
    fn new(elements: &[ElementIsotopes], cutoff: f64, strict: bool) -> Self {
        let mut treks: Vec<MarginalTrek> = elements
            .iter()
            .map(|e| MarginalTrek::new(e.clone()))
            .collect();
        let isotope_numbers = elements.iter().map(|e| e.isotope_number()).collect();
        let d = treks.len();

        let mode_lprob: f64 = treks.iter().map(|t| t.mode_lprob()).sum();

        // slack keeps boundary configurations in the tables when the suffix
        // sums and the marginal's own sums round differently; emission is
        // still decided by the exact per-configuration check below
        const CUTOFF_SLACK: f64 = 1e-12;

        let mut sizes = vec![0; d];
        for e in 0..d {
            let local_cutoff = cutoff - (mode_lprob - treks[e].mode_lprob()) - CUTOFF_SLACK;
            sizes[e] = treks[e].probe_above(local_cutoff, strict);
        }
        debug!(
            "cutoff sweep at {:.4} over marginal tables of sizes {:?}",
            cutoff, sizes
        );

        let mut partial_lprobs = vec![0.0; d + 1];
        let mut partial_masses = vec![0.0; d + 1];
        for e in (0..d).rev() {
            partial_lprobs[e] = partial_lprobs[e + 1] + treks[e].lprob(0);
            partial_masses[e] = partial_masses[e + 1] + treks[e].mass(0);
        }

        let mut mode_prefix = vec![0.0; d + 1];
        for e in 0..d {
            mode_prefix[e + 1] = mode_prefix[e] + treks[e].mode_lprob();
        }

        let terminated = sizes.iter().any(|&s| s == 0);

        CutoffSweep {
            treks,
            sizes,
            counter: vec![0; d],
            partial_lprobs,
            partial_masses,
            mode_prefix,
            isotope_numbers,
            cutoff,
            strict,
            started: false,
            terminated,
        }
    }

    fn meets(&self, lprob: f64) -> bool {
        if self.strict {
            lprob > self.cutoff
        } else {
            lprob >= self.cutoff
        }
    }

    fn advance(&mut self) -> bool {
        if self.terminated {
            return false;
        }
        if !self.started {
            self.started = true;
            // the all-modes configuration; if even that misses, nothing can pass
            if self.meets(self.partial_lprobs[0]) {
                return true;
            }
            self.terminated = true;
            return false;
        }

        let d = self.treks.len();
        let mut idx = 0;
        while idx < d {
            self.counter[idx] += 1;
            if self.counter[idx] < self.sizes[idx] {
                let lprob = self.partial_lprobs[idx + 1] + self.treks[idx].lprob(self.counter[idx]);
                if self.meets(lprob + self.mode_prefix[idx]) {
                    self.partial_lprobs[idx] = lprob;
                    self.partial_masses[idx] =
                        self.partial_masses[idx + 1] + self.treks[idx].mass(self.counter[idx]);
                    for e in (0..idx).rev() {
                        self.counter[e] = 0;
                        self.partial_lprobs[e] =
                            self.partial_lprobs[e + 1] + self.treks[e].lprob(0);
                        self.partial_masses[e] =
                            self.partial_masses[e + 1] + self.treks[e].mass(0);
                    }
                    return true;
                }
                // marginal tables are sorted, later entries of this digit only
                // get worse: fall through to the carry
            }
            self.counter[idx] = 0;
            idx += 1;
        }

        self.terminated = true;
        false
    }

    fn conf_signature(&self) -> Vec<i32> {
        let mut signature = Vec::with_capacity(self.isotope_numbers.iter().sum());
        for (e, &idx) in self.counter.iter().enumerate() {
            signature.extend_from_slice(self.treks[e].conf(idx));
        }
        signature
    }
}

/// Generator of isotopologues above a threshold probability.
///
/// The emitted configurations are not ordered; collect them through a
/// [`Tabulator`] for a probability-sorted table.
pub struct ThresholdGenerator {
    sweep: CutoffSweep,
    threshold: f64,
    absolute: bool,
    iterated: bool,
}

impl ThresholdGenerator {
    fn new(iso: &Iso, threshold: f64, absolute: bool) -> Result<Self, IsoError> {
        if !(threshold >= 0.0) {
            return Err(IsoError::InvalidThreshold(threshold));
        }
        let cutoff = if absolute {
            threshold.ln()
        } else {
            threshold.ln() + iso.mode_lprob()
        };
        Ok(ThresholdGenerator {
            sweep: CutoffSweep::new(iso.elements(), cutoff, false),
            threshold,
            absolute,
            iterated: false,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn absolute(&self) -> bool {
        self.absolute
    }
}

impl IsoGenerator for ThresholdGenerator {
    fn advance(&mut self) -> bool {
        self.sweep.advance()
    }

    fn mass(&self) -> f64 {
        self.sweep.partial_masses[0]
    }

    fn lprob(&self) -> f64 {
        self.sweep.partial_lprobs[0]
    }

    fn conf_signature(&self) -> Vec<i32> {
        self.sweep.conf_signature()
    }

    fn isotope_numbers(&self) -> &[usize] {
        &self.sweep.isotope_numbers
    }

    fn claim_iteration(&mut self) -> Result<(), IsoError> {
        if self.iterated {
            return Err(IsoError::GeneratorConsumed);
        }
        self.iterated = true;
        Ok(())
    }
}

/// Generator of all isotopologues within a log-probability margin of the most
/// probable one: everything with `lprob > mode_lprob + delta`.
///
/// The emitted configurations are not ordered; collect them through a
/// [`Tabulator`] for a probability-sorted table.
pub struct LayeredGenerator {
    sweep: CutoffSweep,
    delta: f64,
    iterated: bool,
}

impl LayeredGenerator {
    fn new(iso: &Iso, delta: f64) -> Result<Self, IsoError> {
        if !(delta < 0.0) {
            return Err(IsoError::InvalidDelta(delta));
        }
        let cutoff = iso.mode_lprob() + delta;
        Ok(LayeredGenerator {
            sweep: CutoffSweep::new(iso.elements(), cutoff, true),
            delta,
            iterated: false,
        })
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }
}

impl IsoGenerator for LayeredGenerator {
    fn advance(&mut self) -> bool {
        self.sweep.advance()
    }

    fn mass(&self) -> f64 {
        self.sweep.partial_masses[0]
    }

    fn lprob(&self) -> f64 {
        self.sweep.partial_lprobs[0]
    }

    fn conf_signature(&self) -> Vec<i32> {
        self.sweep.conf_signature()
    }

    fn isotope_numbers(&self) -> &[usize] {
        &self.sweep.isotope_numbers
    }

    fn claim_iteration(&mut self) -> Result<(), IsoError> {
        if self.iterated {
            return Err(IsoError::GeneratorConsumed);
        }
        self.iterated = true;
        Ok(())
    }
}

/// Compute threshold-bounded isotope distributions for a list of formulas
/// using multiple threads.
///
/// # Arguments
///
/// * `formulas` - list of chemical formulas
/// * `threshold` - minimum isotopologue probability
/// * `absolute` - absolute threshold if true, relative to the most probable isotopologue otherwise
/// * `get_confs` - whether the tables keep the configuration signatures
/// * `num_threads` - number of threads to use
///
/// # Returns
///
/// * `Result<Vec<Tabulator>, IsoError>` - one probability-sorted table per formula
pub fn threshold_distributions(
    formulas: &Vec<&str>,
    threshold: f64,
    absolute: bool,
    get_confs: bool,
    num_threads: usize,
) -> Result<Vec<Tabulator>, IsoError> {
    let thread_pool = ThreadPoolBuilder::new().num_threads(num_threads).build().unwrap();

    thread_pool.install(|| {
        formulas
            .par_iter()
            .map(|&formula| {
                let iso = Iso::new(formula)?;
                let generator = iso.threshold_generator(threshold, absolute)?;
                Ok(Tabulator::new(generator, get_confs))
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// All count-vectors of length `isotopes` summing to `total`.
    fn compositions(total: i32, isotopes: usize) -> Vec<Vec<i32>> {
        if isotopes == 1 {
            return vec![vec![total]];
        }
        let mut result = Vec::new();
        for first in (0..=total).rev() {
            for mut rest in compositions(total - first, isotopes - 1) {
                let mut conf = vec![first];
                conf.append(&mut rest);
                result.push(conf);
            }
        }
        result
    }

    /// Exhaustive enumeration of the joint configuration space with exact
    /// log-probabilities, for cross-checking the generators.
    fn brute_force(iso: &Iso) -> Vec<(f64, f64, Vec<Vec<i32>>)> {
        let per_element: Vec<Vec<Vec<i32>>> = iso
            .elements()
            .iter()
            .map(|e| compositions(e.atom_count(), e.isotope_number()))
            .collect();

        let mut result: Vec<(f64, f64, Vec<Vec<i32>>)> = vec![(0.0, 0.0, Vec::new())];
        for (e, confs) in per_element.iter().enumerate() {
            let element = &iso.elements()[e];
            let mut extended = Vec::new();
            for (mass, lprob, partial) in &result {
                for conf in confs {
                    let mut grown = partial.clone();
                    grown.push(conf.clone());
                    extended.push((
                        mass + element.mass_of(conf),
                        lprob + element.log_prob_of(conf),
                        grown,
                    ));
                }
            }
            result = extended;
        }
        result
    }

    fn water() -> Iso {
        Iso::new("H2O").unwrap()
    }

    fn sorted_lprobs(mut lprobs: Vec<f64>) -> Vec<f64> {
        lprobs.sort_by(|a, b| b.partial_cmp(a).unwrap());
        lprobs
    }

    fn assert_same_lprobs(mut left: Vec<f64>, mut right: Vec<f64>) {
        left = sorted_lprobs(left);
        right = sorted_lprobs(right);
        assert_eq!(left.len(), right.len());
        for (a, b) in left.iter().zip(right.iter()) {
            assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
        }
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(Iso::new("Xx2"), Err(IsoError::InvalidFormula(_))));
        assert!(matches!(
            Iso::from_components(vec![1, 2], vec![vec![1.0]], vec![vec![1.0]]),
            Err(IsoError::InvalidComponents(_))
        ));
        assert!(matches!(
            Iso::from_components(vec![], vec![], vec![]),
            Err(IsoError::InvalidComponents(_))
        ));

        let iso = water();
        assert!(matches!(iso.layered_generator(0.0), Err(IsoError::InvalidDelta(_))));
        assert!(matches!(iso.layered_generator(1.5), Err(IsoError::InvalidDelta(_))));
        assert!(matches!(
            iso.threshold_generator(-0.1, true),
            Err(IsoError::InvalidThreshold(_))
        ));
        assert!(matches!(
            iso.threshold_generator(f64::NAN, true),
            Err(IsoError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_masses_and_dimensions() {
        let iso = water();
        assert_eq!(iso.dim_number(), 2);
        assert_eq!(iso.all_dim(), 5);
        assert_eq!(iso.isotope_numbers(), vec![2, 3]);
        assert!((iso.monoisotopic_mass() - 18.0105646837).abs() < 1e-6);
        assert!((iso.lightest_peak_mass() - 18.0105646837).abs() < 1e-6);
        // 2x deuterium + 18O
        assert!((iso.heaviest_peak_mass() - 22.0273645556).abs() < 1e-6);
    }

    #[test]
    fn test_ordered_enumerates_full_product_once() {
        let iso = water();
        let expected = brute_force(&iso);
        // H: 3 compositions of 2 atoms over 2 isotopes, O: 3 of 1 atom over 3
        assert_eq!(expected.len(), 9);

        let mut generator = iso.ordered_generator();
        let mut seen: Vec<(f64, f64, Vec<i32>)> = Vec::new();
        while generator.advance() {
            seen.push((generator.mass(), generator.lprob(), generator.conf_signature()));
        }
        assert_eq!(seen.len(), 9);

        // strictly non-increasing log-probability
        for pair in seen.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }

        // no configuration emitted twice
        let signatures: HashSet<Vec<i32>> = seen.iter().map(|(_, _, c)| c.clone()).collect();
        assert_eq!(signatures.len(), 9);

        assert_same_lprobs(
            seen.iter().map(|(_, lp, _)| *lp).collect(),
            expected.iter().map(|(_, lp, _)| *lp).collect(),
        );
    }

    #[test]
    fn test_full_product_probabilities_sum_to_one() {
        let iso = Iso::new("C10H20").unwrap();
        let mut generator = iso.ordered_generator();
        let mut total = 0.0;
        let mut count = 0;
        while generator.advance() {
            total += generator.prob();
            count += 1;
        }
        // C: 11 compositions, H: 21 compositions
        assert_eq!(count, 231);
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_absolute_matches_brute_force() {
        let iso = water();
        let expected = brute_force(&iso);
        let threshold = 1e-5;

        let mut generator = iso.threshold_generator(threshold, true).unwrap();
        let mut seen = Vec::new();
        while generator.advance() {
            assert!(generator.prob() >= threshold);
            seen.push(generator.lprob());
        }

        let qualifying: Vec<f64> = expected
            .iter()
            .map(|(_, lp, _)| *lp)
            .filter(|lp| lp.exp() >= threshold)
            .collect();
        assert!(!qualifying.is_empty());
        assert_same_lprobs(seen, qualifying);
    }

    #[test]
    fn test_threshold_relative_matches_brute_force() {
        let iso = Iso::new("C5H9NO2S").unwrap();
        let expected = brute_force(&iso);
        let threshold = 1e-3;
        let max_lprob = expected
            .iter()
            .map(|(_, lp, _)| *lp)
            .fold(f64::NEG_INFINITY, f64::max);

        let mut generator = iso.threshold_generator(threshold, false).unwrap();
        let mut seen = Vec::new();
        while generator.advance() {
            seen.push(generator.lprob());
        }

        let qualifying: Vec<f64> = expected
            .iter()
            .map(|(_, lp, _)| *lp)
            .filter(|lp| *lp >= max_lprob + threshold.ln())
            .collect();
        assert_same_lprobs(seen, qualifying);
    }

    #[test]
    fn test_threshold_above_mode_is_empty() {
        let iso = water();
        let mut generator = iso.threshold_generator(0.99999, true).unwrap();
        assert!(!generator.advance());
        assert!(!generator.advance());
    }

    #[test]
    fn test_threshold_zero_yields_full_product() {
        let iso = water();
        let mut generator = iso.threshold_generator(0.0, true).unwrap();
        let mut count = 0;
        let mut total = 0.0;
        while generator.advance() {
            count += 1;
            total += generator.prob();
        }
        assert_eq!(count, 9);
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_layered_matches_brute_force() {
        let iso = Iso::new("C5H9NO2S").unwrap();
        let expected = brute_force(&iso);
        let delta = -7.0;
        let mode_lprob = iso.mode_lprob();

        let mut generator = iso.layered_generator(delta).unwrap();
        let mut seen = Vec::new();
        while generator.advance() {
            assert!(generator.lprob() > mode_lprob + delta);
            seen.push(generator.lprob());
        }

        let qualifying: Vec<f64> = expected
            .iter()
            .map(|(_, lp, _)| *lp)
            .filter(|lp| *lp > mode_lprob + delta)
            .collect();
        assert_same_lprobs(seen, qualifying);
    }

    #[test]
    fn test_layered_unbounded_delta_yields_full_product() {
        let iso = water();
        let mut generator = iso.layered_generator(f64::NEG_INFINITY).unwrap();
        let mut count = 0;
        let mut total = 0.0;
        while generator.advance() {
            count += 1;
            total += generator.prob();
        }
        assert_eq!(count, 9);
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_atom_element_contributes_single_conf() {
        let iso = Iso::from_components(
            vec![0, 1],
            vec![vec![1.0, 2.0], vec![15.99491461956, 16.99913170, 17.9991610]],
            vec![vec![0.5, 0.5], vec![0.99757, 0.00038, 0.00205]],
        )
        .unwrap();
        let mut generator = iso.ordered_generator();
        let mut count = 0;
        while generator.advance() {
            let conf = generator.conf_signature();
            assert_eq!(&conf[0..2], &[0, 0]);
            count += 1;
        }
        // only oxygen varies
        assert_eq!(count, 3);
    }

    #[test]
    fn test_conf_signature_consistent_with_mass_and_lprob() {
        let iso = water();
        let mut generator = iso.ordered_generator();
        while generator.advance() {
            let nested = split_conf(&generator.conf_signature(), generator.isotope_numbers());
            let mass: f64 = nested
                .iter()
                .zip(iso.elements().iter())
                .map(|(conf, element)| element.mass_of(conf))
                .sum();
            let lprob: f64 = nested
                .iter()
                .zip(iso.elements().iter())
                .map(|(conf, element)| element.log_prob_of(conf))
                .sum();
            assert!((mass - generator.mass()).abs() < 1e-9);
            assert!((lprob - generator.lprob()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_peaks_iterator_single_pass() {
        let iso = water();
        let mut generator = iso.ordered_generator();
        let collected: Vec<(f64, f64)> = generator.peaks().unwrap().collect();
        assert_eq!(collected.len(), 9);
        assert!(matches!(generator.peaks(), Err(IsoError::GeneratorConsumed)));
        assert!(matches!(generator.conf_peaks(), Err(IsoError::GeneratorConsumed)));
    }

    #[test]
    fn test_conf_peaks_carry_configurations() {
        let iso = water();
        let mut with_confs = iso.ordered_generator();
        let mut without = iso.ordered_generator();

        let detailed: Vec<(f64, f64, Vec<Vec<i32>>)> =
            with_confs.conf_peaks().unwrap().collect();
        let plain: Vec<(f64, f64)> = without.peaks().unwrap().collect();

        assert_eq!(detailed.len(), plain.len());
        for ((mass_a, lprob_a, conf), (mass_b, lprob_b)) in detailed.iter().zip(plain.iter()) {
            assert_eq!(mass_a, mass_b);
            assert_eq!(lprob_a, lprob_b);
            assert_eq!(conf.len(), 2);
            assert_eq!(conf[0].iter().sum::<i32>(), 2);
            assert_eq!(conf[1].iter().sum::<i32>(), 1);
        }
    }

    #[test]
    fn test_threshold_distributions_batch() {
        let formulas = vec!["H2O", "C6H12O6"];
        let tables = threshold_distributions(&formulas, 1e-6, false, false, 2).unwrap();
        assert_eq!(tables.len(), 2);
        for table in &tables {
            assert!(table.size() > 0);
        }
        assert!(threshold_distributions(&vec!["Zz9"], 1e-6, false, false, 2).is_err());
    }
}
