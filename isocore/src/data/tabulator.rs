use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::algorithm::isotope::{split_conf, IsoGenerator};
use crate::chemistry::constants::MASS_PROTON;
use crate::data::spectrum::MzSpectrum;

/// Materialized result of an isotopologue search: parallel arrays of masses,
/// log-probabilities and probabilities sorted by descending probability, with
/// optional flat configuration signatures.
///
/// Configuration signatures cost `all_dim` integers per isotopologue, so they
/// are only stored when requested at collection time.
#[derive(Clone, Debug, Serialize, Deserialize, Encode, Decode)]
pub struct Tabulator {
    masses: Vec<f64>,
    lprobs: Vec<f64>,
    probs: Vec<f64>,
    confs: Option<Vec<i32>>,
    isotope_numbers: Vec<usize>,
    conf_stride: usize,
}

impl Tabulator {
    /// Pull a generator to exhaustion and tabulate its output.
    ///
    /// # Arguments
    ///
    /// * `generator` - Any isotopologue generator; it is consumed.
    /// * `get_confs` - Whether to keep the per-isotopologue configuration signatures.
    pub fn new<G: IsoGenerator>(mut generator: G, get_confs: bool) -> Self {
        let isotope_numbers = generator.isotope_numbers().to_vec();
        let conf_stride = generator.all_dim();

        let mut masses = Vec::new();
        let mut lprobs = Vec::new();
        let mut flat_confs = if get_confs { Some(Vec::new()) } else { None };

        while generator.advance() {
            masses.push(generator.mass());
            lprobs.push(generator.lprob());
            if let Some(confs) = flat_confs.as_mut() {
                confs.extend_from_slice(&generator.conf_signature());
            }
        }

        // present the table sorted by descending probability, mass breaks ties
        let mut order: Vec<usize> = (0..masses.len()).collect();
        order.sort_by(|&a, &b| {
            lprobs[b]
                .partial_cmp(&lprobs[a])
                .unwrap()
                .then_with(|| masses[a].partial_cmp(&masses[b]).unwrap())
        });

        let sorted_masses: Vec<f64> = order.iter().map(|&idx| masses[idx]).collect();
        let sorted_lprobs: Vec<f64> = order.iter().map(|&idx| lprobs[idx]).collect();
        let probs: Vec<f64> = sorted_lprobs.iter().map(|lp| lp.exp()).collect();
        let confs = flat_confs.map(|flat| {
            let mut sorted = Vec::with_capacity(flat.len());
            for &idx in &order {
                sorted.extend_from_slice(&flat[idx * conf_stride..(idx + 1) * conf_stride]);
            }
            sorted
        });

        Tabulator {
            masses: sorted_masses,
            lprobs: sorted_lprobs,
            probs,
            confs,
            isotope_numbers,
            conf_stride,
        }
    }

    /// Number of tabulated isotopologues.
    pub fn size(&self) -> usize {
        self.masses.len()
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn lprobs(&self) -> &[f64] {
        &self.lprobs
    }

    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    pub fn mass(&self, idx: usize) -> f64 {
        self.masses[idx]
    }

    pub fn lprob(&self, idx: usize) -> f64 {
        self.lprobs[idx]
    }

    pub fn prob(&self, idx: usize) -> f64 {
        self.probs[idx]
    }

    /// Flat configuration signature of isotopologue `idx`, if signatures were
    /// collected.
    pub fn conf(&self, idx: usize) -> Option<&[i32]> {
        self.confs
            .as_ref()
            .map(|flat| &flat[idx * self.conf_stride..(idx + 1) * self.conf_stride])
    }

    /// Per-element count vectors of isotopologue `idx`, if signatures were
    /// collected. Reconstruction allocates, so prefer [`Tabulator::conf`] in
    /// hot loops.
    pub fn conf_nested(&self, idx: usize) -> Option<Vec<Vec<i32>>> {
        self.conf(idx).map(|flat| split_conf(flat, &self.isotope_numbers))
    }

    /// Sum of the tabulated probabilities, i.e. the probability mass covered
    /// by the search.
    pub fn total_prob(&self) -> f64 {
        self.probs.iter().sum()
    }

    /// Present the table as a centroided spectrum at the given charge state.
    pub fn to_spectrum(&self, charge: i32) -> MzSpectrum {
        let mz = self
            .masses
            .iter()
            .map(|mass| (mass + charge as f64 * MASS_PROTON) / charge as f64)
            .collect();
        MzSpectrum::new(mz, self.probs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::isotope::Iso;

    #[test]
    fn test_tabulated_threshold_search() {
        let iso = Iso::new("C6H12O6").unwrap();
        let generator = iso.threshold_generator(1e-6, false).unwrap();
        let table = Tabulator::new(generator, false);

        assert!(table.size() > 1);
        for idx in 1..table.size() {
            assert!(table.prob(idx) <= table.prob(idx - 1));
        }
        // almost all probability mass sits above one part in 1e6 of the mode
        assert!(table.total_prob() > 0.999);
        assert!(table.total_prob() <= 1.0 + 1e-9);
        // the most probable glucose isotopologue is the all-light one
        assert!((table.mass(0) - 180.0633881022).abs() < 1e-6);
        assert!(table.conf(0).is_none());
    }

    #[test]
    fn test_conf_reconstruction() {
        let iso = Iso::new("H2O").unwrap();
        let generator = iso.threshold_generator(0.0, true).unwrap();
        let table = Tabulator::new(generator, true);

        assert_eq!(table.size(), 9);
        let flat = table.conf(0).unwrap();
        assert_eq!(flat.len(), 5);
        let nested = table.conf_nested(0).unwrap();
        assert_eq!(nested, vec![vec![2, 0], vec![1, 0, 0]]);
    }

    #[test]
    fn test_get_confs_does_not_change_values() {
        let iso = Iso::new("C3H6O3").unwrap();
        let with_confs = Tabulator::new(iso.threshold_generator(1e-8, false).unwrap(), true);
        let without = Tabulator::new(iso.threshold_generator(1e-8, false).unwrap(), false);

        assert_eq!(with_confs.size(), without.size());
        assert_eq!(with_confs.masses(), without.masses());
        assert_eq!(with_confs.lprobs(), without.lprobs());
        assert!(with_confs.conf(0).is_some());
        assert!(without.conf(0).is_none());
    }

    #[test]
    fn test_to_spectrum_applies_charge() {
        let iso = Iso::new("H2O").unwrap();
        let table = Tabulator::new(iso.threshold_generator(0.0, true).unwrap(), false);
        let spectrum = table.to_spectrum(2);

        assert_eq!(spectrum.mz.len(), table.size());
        let expected = (18.0105646837 + 2.0 * MASS_PROTON) / 2.0;
        assert!((spectrum.mz[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_empty_search_tabulates_empty() {
        let iso = Iso::new("H2O").unwrap();
        let table = Tabulator::new(iso.threshold_generator(0.9999, true).unwrap(), true);
        assert_eq!(table.size(), 0);
        assert_eq!(table.total_prob(), 0.0);
    }

    #[test]
    fn test_roundtrip_bincode() {
        let iso = Iso::new("H2O").unwrap();
        let table = Tabulator::new(iso.threshold_generator(1e-6, false).unwrap(), true);

        let encoded = bincode::encode_to_vec(&table, bincode::config::standard()).unwrap();
        let (decoded, _): (Tabulator, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(decoded.size(), table.size());
        assert_eq!(decoded.masses(), table.masses());
        assert_eq!(decoded.conf(0), table.conf(0));
    }
}
