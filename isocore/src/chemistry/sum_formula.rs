use regex::Regex;

use crate::algorithm::isotope::Iso;
use crate::chemistry::constants::MASS_PROTON;
use crate::chemistry::elements::monoisotopic_weights;
use crate::data::spectrum::MzSpectrum;
use crate::data::tabulator::Tabulator;
use crate::error::IsoError;

/// Parse a chemical formula into an ordered list of elements and their counts.
///
/// Element order is preserved as written, repeated symbols are merged into the
/// first occurrence. Unknown symbols and malformed input are rejected.
///
/// # Arguments
///
/// * `formula` - The chemical formula to parse, e.g. "C6H12O6".
///
/// # Returns
///
/// * `Result<Vec<(String, i32)>, IsoError>` - Elements and their counts.
///
/// # Examples
///
/// ```
/// use isocore::chemistry::sum_formula::parse_formula;
///
/// let elements = parse_formula("H2O").unwrap();
/// assert_eq!(elements, vec![("H".to_string(), 2), ("O".to_string(), 1)]);
/// assert!(parse_formula("H2Xx4").is_err());
/// ```
pub fn parse_formula(formula: &str) -> Result<Vec<(String, i32)>, IsoError> {
    let token = Regex::new(r"([A-Z][a-z]?)(\d*)").unwrap();
    let known = monoisotopic_weights();

    let mut elements: Vec<(String, i32)> = Vec::new();
    let mut covered = 0;

    for caps in token.captures_iter(formula) {
        let whole = caps.get(0).unwrap();
        if whole.start() != covered {
            return Err(IsoError::InvalidFormula(format!(
                "unexpected character at position {} in '{}'", covered, formula
            )));
        }
        covered = whole.end();

        let symbol = caps.get(1).unwrap().as_str();
        if !known.contains_key(symbol) {
            return Err(IsoError::InvalidFormula(format!("unknown element: {}", symbol)));
        }

        let count_str = caps.get(2).unwrap().as_str();
        let count = if count_str.is_empty() {
            1
        } else {
            count_str.parse::<i32>().map_err(|_| {
                IsoError::InvalidFormula(format!("invalid atom count '{}' for {}", count_str, symbol))
            })?
        };

        match elements.iter_mut().find(|(s, _)| s == symbol) {
            Some((_, c)) => *c += count,
            None => elements.push((symbol.to_string(), count)),
        }
    }

    if covered != formula.len() || elements.is_empty() {
        return Err(IsoError::InvalidFormula(format!("malformed formula: '{}'", formula)));
    }

    Ok(elements)
}

pub struct SumFormula {
    pub formula: String,
    pub elements: Vec<(String, i32)>,
}

impl SumFormula {
    pub fn new(formula: &str) -> Result<Self, IsoError> {
        let elements = parse_formula(formula)?;
        Ok(SumFormula {
            formula: formula.to_string(),
            elements,
        })
    }

    /// Calculate the monoisotopic weight of the chemical formula.
    ///
    /// # Returns
    ///
    /// * `f64` - The monoisotopic weight of the chemical formula.
    ///
    /// # Example
    ///
    /// ```
    /// use isocore::chemistry::sum_formula::SumFormula;
    ///
    /// let sum_formula = SumFormula::new("H2O").unwrap();
    /// let weight = (sum_formula.monoisotopic_weight() * 1e5).round() / 1e5;
    /// assert_eq!(weight, 18.01056);
    /// ```
    pub fn monoisotopic_weight(&self) -> f64 {
        let weights = monoisotopic_weights();
        self.elements.iter().fold(0.0, |acc, (element, count)| {
            acc + weights[element.as_str()] * *count as f64
        })
    }

    /// Generate the fine isotope distribution of the chemical formula.
    ///
    /// Peaks below one part in 1e9 of the most intense isotopologue are
    /// discarded, intensities are normalized to sum to one.
    ///
    /// # Arguments
    ///
    /// * `charge` - The charge state of the ion.
    ///
    /// # Returns
    ///
    /// * `MzSpectrum` - The isotope distribution of the chemical formula.
    ///
    /// # Example
    ///
    /// ```
    /// use isocore::chemistry::sum_formula::SumFormula;
    ///
    /// let sum_formula = SumFormula::new("C6H12O6").unwrap();
    /// let distribution = sum_formula.isotope_distribution(1);
    /// let first_mz = (distribution.mz.first().unwrap() * 1e5).round() / 1e5;
    /// assert_eq!(first_mz, 181.07066);
    /// ```
    pub fn isotope_distribution(&self, charge: i32) -> MzSpectrum {
        let iso = self.to_iso().unwrap();
        let generator = iso.threshold_generator(1e-9, false).unwrap();
        let table = Tabulator::new(generator, false);
        let total = table.total_prob();
        table.to_spectrum(charge) * (1.0 / total)
    }

    /// Build the search-ready formula description from the element counts.
    pub fn to_iso(&self) -> Result<Iso, IsoError> {
        Iso::from_element_counts(&self.elements)
    }

    /// m/z of the monoisotopic peak at the given charge state.
    pub fn monoisotopic_mz(&self, charge: i32) -> f64 {
        (self.monoisotopic_weight() + charge as f64 * MASS_PROTON) / charge as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_order() {
        let elements = parse_formula("C6H12O6").unwrap();
        assert_eq!(
            elements,
            vec![
                ("C".to_string(), 6),
                ("H".to_string(), 12),
                ("O".to_string(), 6)
            ]
        );
    }

    #[test]
    fn test_parse_merges_repeated_symbols() {
        let elements = parse_formula("CH3COOH").unwrap();
        assert_eq!(
            elements,
            vec![("C".to_string(), 2), ("H".to_string(), 4), ("O".to_string(), 2)]
        );
    }

    #[test]
    fn test_parse_implicit_count() {
        let elements = parse_formula("NaCl").unwrap();
        assert_eq!(
            elements,
            vec![("Na".to_string(), 1), ("Cl".to_string(), 1)]
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert!(matches!(parse_formula("Qq2"), Err(IsoError::InvalidFormula(_))));
        assert!(matches!(parse_formula("H2O-"), Err(IsoError::InvalidFormula(_))));
        assert!(matches!(parse_formula("2H"), Err(IsoError::InvalidFormula(_))));
        assert!(matches!(parse_formula(""), Err(IsoError::InvalidFormula(_))));
    }

    #[test]
    fn test_monoisotopic_weight_water() {
        let sum_formula = SumFormula::new("H2O").unwrap();
        assert!((sum_formula.monoisotopic_weight() - 18.0105646837).abs() < 1e-6);
    }

    #[test]
    fn test_isotope_distribution_normalized() {
        let sum_formula = SumFormula::new("C6H12O6").unwrap();
        let distribution = sum_formula.isotope_distribution(1);
        let total: f64 = distribution.intensity.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        // centroids come out sorted by m/z
        for pair in distribution.mz.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
