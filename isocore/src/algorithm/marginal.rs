use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use log::debug;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;

use crate::error::IsoError;

fn ln_factorial(n: i32) -> f64 {
    ln_gamma(n as f64 + 1.0)
}

/// Static description of one element inside a formula: how many atoms it
/// contributes and the mass and log-probability of each of its isotopes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElementIsotopes {
    atom_count: i32,
    masses: Vec<f64>,
    log_probabilities: Vec<f64>,
}

impl ElementIsotopes {
    /// Build an element descriptor from isotope masses and probabilities.
    ///
    /// # Arguments
    ///
    /// * `atom_count` - Number of atoms of this element in the formula.
    /// * `masses` - One mass per isotope variant.
    /// * `probabilities` - One probability per isotope variant, expected to sum to one.
    ///
    /// # Returns
    ///
    /// * `Result<ElementIsotopes, IsoError>` - The descriptor, or `InvalidComponents`.
    pub fn new(atom_count: i32, masses: Vec<f64>, probabilities: Vec<f64>) -> Result<Self, IsoError> {
        if masses.is_empty() {
            return Err(IsoError::InvalidComponents(
                "element needs at least one isotope".to_string(),
            ));
        }
        if masses.len() != probabilities.len() {
            return Err(IsoError::InvalidComponents(format!(
                "{} isotope masses but {} probabilities",
                masses.len(),
                probabilities.len()
            )));
        }
        if atom_count < 0 {
            return Err(IsoError::InvalidComponents(format!(
                "negative atom count: {}",
                atom_count
            )));
        }
        if masses.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(IsoError::InvalidComponents("isotope masses must be finite and non-negative".to_string()));
        }
        if probabilities.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(IsoError::InvalidComponents("isotope probabilities must be finite and positive".to_string()));
        }

        let log_probabilities = probabilities.iter().map(|p| p.ln()).collect();
        Ok(ElementIsotopes {
            atom_count,
            masses,
            log_probabilities,
        })
    }

    pub fn atom_count(&self) -> i32 {
        self.atom_count
    }

    pub fn isotope_number(&self) -> usize {
        self.masses.len()
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn log_probabilities(&self) -> &[f64] {
        &self.log_probabilities
    }

    /// Log-probability of one isotope-count vector, including the multinomial
    /// coefficient for indistinguishable atoms:
    /// ln(n!) - sum(ln(c_i!)) + sum(c_i * ln(p_i)).
    pub fn log_prob_of(&self, conf: &[i32]) -> f64 {
        let mut lprob = ln_factorial(self.atom_count);
        for (idx, &count) in conf.iter().enumerate() {
            lprob -= ln_factorial(count);
            lprob += count as f64 * self.log_probabilities[idx];
        }
        lprob
    }

    /// Mass of one isotope-count vector.
    pub fn mass_of(&self, conf: &[i32]) -> f64 {
        conf.iter()
            .enumerate()
            .map(|(idx, &count)| count as f64 * self.masses[idx])
            .sum()
    }

    /// The most probable isotope-count vector of this element.
    ///
    /// Starts from the rounded expected counts and hill-climbs with single-unit
    /// moves; the multinomial is discretely log-concave, so the local optimum
    /// found this way is the global mode.
    pub fn mode_conf(&self) -> Vec<i32> {
        let isotopes = self.isotope_number();
        let n = self.atom_count;

        let expected: Vec<f64> = self
            .log_probabilities
            .iter()
            .map(|lp| lp.exp() * n as f64)
            .collect();
        let mut conf: Vec<i32> = expected.iter().map(|e| e.floor() as i32).collect();

        let mut remaining = n - conf.iter().sum::<i32>();
        let mut order: Vec<usize> = (0..isotopes).collect();
        order.sort_by(|&a, &b| {
            let fa = expected[a] - expected[a].floor();
            let fb = expected[b] - expected[b].floor();
            fb.partial_cmp(&fa).unwrap()
        });
        let mut slot = 0;
        while remaining > 0 {
            conf[order[slot % isotopes]] += 1;
            remaining -= 1;
            slot += 1;
        }

        loop {
            let mut improved = false;
            for src in 0..isotopes {
                for dst in 0..isotopes {
                    if src == dst || conf[src] == 0 {
                        continue;
                    }
                    let gain = (conf[src] as f64).ln() - (conf[dst] as f64 + 1.0).ln()
                        + self.log_probabilities[dst]
                        - self.log_probabilities[src];
                    if gain > 0.0 {
                        conf[src] -= 1;
                        conf[dst] += 1;
                        improved = true;
                    }
                }
            }
            if !improved {
                break;
            }
        }

        conf
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MarginalCandidate {
    lprob: OrderedFloat<f64>,
    conf: Vec<i32>,
}

impl Ord for MarginalCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lprob
            .cmp(&other.lprob)
            .then_with(|| self.conf.cmp(&other.conf))
    }
}

impl PartialOrd for MarginalCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lazy best-first enumeration of the isotope-count vectors of one element,
/// in non-increasing log-probability order.
///
/// Revealed configurations live in index-addressed parallel arrays so joint
/// generators can re-access them in O(1); the frontier holds the not yet
/// revealed neighbors keyed by their log-probability. Neighbors differ by
/// moving a single unit of count between two isotope slots, which reaches the
/// whole composition lattice from the mode.
pub struct MarginalTrek {
    element: ElementIsotopes,
    heap: BinaryHeap<MarginalCandidate>,
    visited: HashSet<Vec<i32>>,
    confs: Vec<Vec<i32>>,
    lprobs: Vec<f64>,
    masses: Vec<f64>,
}

impl MarginalTrek {
    pub fn new(element: ElementIsotopes) -> Self {
        let mode = element.mode_conf();
        let lprob = element.log_prob_of(&mode);

        let mut heap = BinaryHeap::new();
        let mut visited = HashSet::new();
        visited.insert(mode.clone());
        heap.push(MarginalCandidate {
            lprob: OrderedFloat(lprob),
            conf: mode,
        });

        let mut trek = MarginalTrek {
            element,
            heap,
            visited,
            confs: Vec::new(),
            lprobs: Vec::new(),
            masses: Vec::new(),
        };
        // the mode is always revealed, index 0 is valid from the start
        trek.advance();
        trek
    }

    fn advance(&mut self) -> bool {
        let candidate = match self.heap.pop() {
            None => return false,
            Some(c) => c,
        };

        let isotopes = self.element.isotope_number();
        for src in 0..isotopes {
            if candidate.conf[src] == 0 {
                continue;
            }
            for dst in 0..isotopes {
                if src == dst {
                    continue;
                }
                let mut neighbor = candidate.conf.clone();
                neighbor[src] -= 1;
                neighbor[dst] += 1;
                if self.visited.contains(&neighbor) {
                    continue;
                }
                let lprob = self.element.log_prob_of(&neighbor);
                self.visited.insert(neighbor.clone());
                self.heap.push(MarginalCandidate {
                    lprob: OrderedFloat(lprob),
                    conf: neighbor,
                });
            }
        }

        self.masses.push(self.element.mass_of(&candidate.conf));
        self.lprobs.push(candidate.lprob.0);
        self.confs.push(candidate.conf);
        true
    }

    /// Reveal configurations until index `idx` is valid. Returns false if the
    /// element has fewer configurations than that.
    pub fn probe(&mut self, idx: usize) -> bool {
        while self.confs.len() <= idx {
            if !self.advance() {
                return false;
            }
        }
        true
    }

    /// Reveal every configuration whose log-probability clears `cutoff`
    /// (strictly when `strict` is set) and return how many do.
    pub fn probe_above(&mut self, cutoff: f64, strict: bool) -> usize {
        loop {
            let extend = match self.heap.peek() {
                None => false,
                Some(c) => {
                    if strict {
                        c.lprob.0 > cutoff
                    } else {
                        c.lprob.0 >= cutoff
                    }
                }
            };
            if !extend {
                break;
            }
            self.advance();
        }
        let cleared = self
            .lprobs
            .partition_point(|&lp| if strict { lp > cutoff } else { lp >= cutoff });
        debug!(
            "marginal layer at cutoff {:.4}: {} of {} revealed configurations",
            cutoff,
            cleared,
            self.lprobs.len()
        );
        cleared
    }

    /// Reveal the complete composition space of this element and return its size.
    pub fn probe_all(&mut self) -> usize {
        while self.advance() {}
        self.confs.len()
    }

    pub fn revealed(&self) -> usize {
        self.confs.len()
    }

    pub fn lprob(&self, idx: usize) -> f64 {
        self.lprobs[idx]
    }

    pub fn mass(&self, idx: usize) -> f64 {
        self.masses[idx]
    }

    pub fn conf(&self, idx: usize) -> &[i32] {
        &self.confs[idx]
    }

    pub fn mode_lprob(&self) -> f64 {
        self.lprobs[0]
    }

    pub fn isotope_number(&self) -> usize {
        self.element.isotope_number()
    }
}
