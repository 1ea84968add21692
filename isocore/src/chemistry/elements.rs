use std::collections::HashMap;

// Isotope masses per element, ordered consistently with isotopic_abundance.
pub fn isotopic_weights() -> HashMap<&'static str, Vec<f64>> {
    let mut map = HashMap::new();
    map.insert("H", vec![1.00782503207, 2.0141017778]);
    map.insert("C", vec![12.0, 13.0033548378]);
    map.insert("N", vec![14.0030740048, 15.0001088982]);
    map.insert("O", vec![15.99491461956, 16.99913170, 17.9991610]);
    map.insert("F", vec![18.99840322]);
    map.insert("Na", vec![22.9897692809]);
    map.insert("Mg", vec![23.9850417, 24.98583692, 25.982592929]);
    map.insert("Si", vec![27.9769265325, 28.976494700, 29.97377017]);
    map.insert("P", vec![30.97376163]);
    map.insert("S", vec![31.97207100, 32.97145876, 33.96786690, 35.96708076]);
    map.insert("Cl", vec![34.96885268, 36.96590259]);
    map.insert("K", vec![38.96370668, 39.96399848, 40.96182576]);
    map.insert("Ca", vec![39.96259098, 41.95861801, 42.9587666, 43.9554818, 45.9536926, 47.952534]);
    map.insert("Fe", vec![53.9396105, 55.9349375, 56.9353940, 57.9332756]);
    map.insert("Zn", vec![63.9291422, 65.9260334, 66.9271273, 67.9248442, 69.9253193]);
    map.insert("Se", vec![73.9224764, 75.9192136, 76.9199140, 77.9173091, 79.9165213, 81.9166994]);
    map.insert("Br", vec![78.9183371, 80.9162906]);
    map.insert("I", vec![126.904473]);
    map
}

// Isotope abundances per element, each list sums to one.
pub fn isotopic_abundance() -> HashMap<&'static str, Vec<f64>> {
    let mut map = HashMap::new();
    map.insert("H", vec![0.999885, 0.000115]);
    map.insert("C", vec![0.9893, 0.0107]);
    map.insert("N", vec![0.99636, 0.00364]);
    map.insert("O", vec![0.99757, 0.00038, 0.00205]);
    map.insert("F", vec![1.0]);
    map.insert("Na", vec![1.0]);
    map.insert("Mg", vec![0.7899, 0.1000, 0.1101]);
    map.insert("Si", vec![0.92223, 0.04685, 0.03092]);
    map.insert("P", vec![1.0]);
    map.insert("S", vec![0.9499, 0.0075, 0.0425, 0.0001]);
    map.insert("Cl", vec![0.7576, 0.2424]);
    map.insert("K", vec![0.932581, 0.000117, 0.067302]);
    map.insert("Ca", vec![0.96941, 0.00647, 0.00135, 0.02086, 0.00004, 0.00187]);
    map.insert("Fe", vec![0.05845, 0.91754, 0.02119, 0.00282]);
    map.insert("Zn", vec![0.48268, 0.27975, 0.04102, 0.19024, 0.00631]);
    map.insert("Se", vec![0.0089, 0.0937, 0.0763, 0.2377, 0.4961, 0.0873]);
    map.insert("Br", vec![0.5069, 0.4931]);
    map.insert("I", vec![1.0]);
    map
}

/// mass of the most abundant isotope per element
///
/// # Examples
///
/// ```
/// use isocore::chemistry::elements::monoisotopic_weights;
///
/// let weights = monoisotopic_weights();
/// assert_eq!(weights["C"], 12.0);
/// ```
pub fn monoisotopic_weights() -> HashMap<&'static str, f64> {
    let weights = isotopic_weights();
    let abundance = isotopic_abundance();

    weights
        .iter()
        .map(|(symbol, masses)| {
            let probs = &abundance[symbol];
            let best = probs
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .map(|(idx, _)| idx)
                .unwrap();
            (*symbol, masses[best])
        })
        .collect()
}
