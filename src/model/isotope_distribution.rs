//! Coarse isotope distributions estimated from a mass with the averagine
//! model of peptide elemental composition.
//!
//! Distributions are indexed by nominal mass offset from the monoisotopic
//! peak, so entry `k` is the relative abundance of the `k`-th isotope peak.
use chemical_elements::isotopic_pattern::{
    BafflingRecursiveIsotopicPatternGenerator, TheoreticalIsotopicPattern,
};
use chemical_elements::{neutral_mass, ChemicalComposition, ElementSpecification};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The mass of a proton, in Daltons
pub const PROTON: f64 = chemical_elements::PROTON;

/// Average number of atoms of each element per Dalton of a "typical" peptide
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Averagine {
    pub carbon: f64,
    pub hydrogen: f64,
    pub nitrogen: f64,
    pub oxygen: f64,
    pub sulfur: f64,
}

impl Default for Averagine {
    fn default() -> Self {
        Self {
            carbon: 0.0443,
            hydrogen: 0.007,
            nitrogen: 0.0012,
            oxygen: 0.013,
            sulfur: 0.00037,
        }
    }
}

impl Averagine {
    fn densities(&self) -> [(&'static str, f64); 5] {
        [
            ("C", self.carbon),
            ("H", self.hydrogen),
            ("N", self.nitrogen),
            ("O", self.oxygen),
            ("S", self.sulfur),
        ]
    }

    /// The rounded atom counts of C, H, N, O and S for a neutral `mass`
    pub fn element_counts(&self, mass: f64) -> [i32; 5] {
        self.densities()
            .map(|(_, density)| (density * mass).round().max(0.0) as i32)
    }

    /// The elemental composition of a molecule of neutral `mass`, omitting absent elements
    pub fn composition(&self, mass: f64) -> ChemicalComposition<'static> {
        let mut composition = ChemicalComposition::new();
        for ((symbol, _), count) in self.densities().into_iter().zip(self.element_counts(mass)) {
            if count == 0 {
                continue;
            }
            match ElementSpecification::parse(symbol) {
                Ok(element) => {
                    composition.set(element, count);
                }
                Err(_) => log::warn!("Failed to look up element {symbol}, skipping it"),
            }
        }
        composition
    }
}

/// Relative abundances of successive isotope peaks, summing to 1
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IsotopeDistribution {
    pub abundances: Vec<f64>,
}

impl From<&TheoreticalIsotopicPattern> for IsotopeDistribution {
    fn from(pattern: &TheoreticalIsotopicPattern) -> Self {
        Self::new(pattern.peaks.iter().map(|p| p.intensity).collect())
    }
}

impl IsotopeDistribution {
    pub fn new(abundances: Vec<f64>) -> Self {
        Self { abundances }
    }

    /// A single peak, used when there is no composition to speak of
    pub fn monoisotopic() -> Self {
        Self::new(vec![1.0])
    }

    /// The isotopic pattern of `composition`, keeping at most `max_isotope` peaks
    pub fn from_composition(composition: ChemicalComposition<'_>, charge: i32, max_isotope: usize) -> Self {
        let mut generator = BafflingRecursiveIsotopicPatternGenerator::new();
        let peaks = generator.isotopic_variants(composition, 0, charge, PROTON);
        let pattern = TheoreticalIsotopicPattern::from(peaks);
        let mut this = Self::from(&pattern);
        this.abundances.truncate(max_isotope.max(1));
        if this.abundances.iter().all(|v| *v <= 0.0) {
            return Self::monoisotopic();
        }
        this.normalize();
        this
    }

    /// Estimate the distribution of a peptide-like ion with monoisotopic m/z `mz` at `charge`
    pub fn from_averagine(
        mz: f64,
        charge: i32,
        averagine: &Averagine,
        max_isotope: usize,
        trim_right_cutoff: f64,
    ) -> Self {
        let charge = charge.max(1);
        let mass = neutral_mass(mz, charge, PROTON).max(0.0);
        if averagine.element_counts(mass).iter().all(|c| *c == 0) {
            return Self::monoisotopic();
        }
        let mut this = Self::from_composition(averagine.composition(mass), charge, max_isotope);
        this.trim_right(trim_right_cutoff);
        this.normalize();
        this
    }

    /// Remove trailing entries less than `cutoff` relative to the most abundant entry
    pub fn trim_right(&mut self, cutoff: f64) {
        let max = self.abundances.iter().copied().fold(0.0, f64::max);
        let threshold = max * cutoff;
        while self.abundances.len() > 1
            && self
                .abundances
                .last()
                .is_some_and(|v| *v < threshold)
        {
            self.abundances.pop();
        }
    }

    pub fn normalize(&mut self) {
        let total: f64 = self.abundances.iter().sum();
        if total > 0.0 {
            self.abundances.iter_mut().for_each(|v| *v /= total);
        }
    }

    pub fn len(&self) -> usize {
        self.abundances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abundances.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.abundances.iter()
    }

    /// The index of the most abundant peak
    pub fn base_peak(&self) -> usize {
        self.abundances
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
                if *v > best.1 {
                    (i, *v)
                } else {
                    best
                }
            })
            .0
    }
}
