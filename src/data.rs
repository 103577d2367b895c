//! Input signal containers for one dimensional fits.
//!
//! A [`RawDataArray`] is the ordered sequence of [`Sample`]s a fitter consumes,
//! stored as a pair of parallel position and intensity arrays which may either
//! borrow from the caller or own their data.
use std::{borrow::Cow, iter::FusedIterator, ops::Deref};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use mzpeaks::prelude::TimeArray;
use mzpeaks::{CoordinateLike, IntensityMeasurement};

use crate::arrayops::trapz;

/// A single (position, intensity) observation
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    pub position: f64,
    pub intensity: f64,
}

impl Sample {
    pub fn new(position: f64, intensity: f64) -> Self {
        Self {
            position,
            intensity,
        }
    }
}

impl From<(f64, f64)> for Sample {
    fn from(value: (f64, f64)) -> Self {
        Self::new(value.0, value.1)
    }
}

/// A copying iterator over the (position, intensity) pairs of a [`RawDataArray`]
pub struct RawDataArrayIter<'a> {
    inner: std::iter::Zip<
        std::iter::Copied<std::slice::Iter<'a, f64>>,
        std::iter::Copied<std::slice::Iter<'a, f64>>,
    >,
}

impl<'a> Iterator for RawDataArrayIter<'a> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a> FusedIterator for RawDataArrayIter<'a> {}

impl<'a> ExactSizeIterator for RawDataArrayIter<'a> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// The position-sorted signal a fitter is run on.
///
/// Callers are responsible for the ordering, it is not re-sorted here.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawDataArray<'a> {
    /// The coordinate axis of the signal, m/z or time
    pub position: Cow<'a, [f64]>,
    /// The paired signal intensity to fit against
    pub intensity: Cow<'a, [f64]>,
}

impl<'a> RawDataArray<'a> {
    pub fn new(position: Cow<'a, [f64]>, intensity: Cow<'a, [f64]>) -> Self {
        assert_eq!(
            position.len(),
            intensity.len(),
            "position array length ({}) must equal intensity length ({})",
            position.len(),
            intensity.len()
        );
        Self {
            position,
            intensity,
        }
    }

    /// The length of the arrays
    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    pub fn get(&self, index: usize) -> Sample {
        Sample::new(self.position[index], self.intensity[index])
    }

    pub fn first_position(&self) -> f64 {
        self.position.first().copied().unwrap_or_default()
    }

    pub fn last_position(&self) -> f64 {
        self.position.last().copied().unwrap_or_default()
    }

    /// The distance between the first and last position
    pub fn duration(&self) -> f64 {
        self.last_position() - self.first_position()
    }

    /// The mean distance between adjacent positions, zero with fewer than two samples
    pub fn average_spacing(&self) -> f64 {
        if self.len() < 2 {
            return 0.0;
        }
        self.duration() / (self.len() - 1) as f64
    }

    /// Whether the positions are in ascending order
    pub fn is_sorted(&self) -> bool {
        self.position.windows(2).all(|w| w[0] <= w[1])
    }

    /// Find the index where [`Self::intensity`] achieves its maximum value
    pub fn argmax(&self) -> usize {
        let mut ymax = 0.0;
        let mut ymax_i = 0;
        for (i, (_, y)) in self.iter().enumerate() {
            if y > ymax {
                ymax = y;
                ymax_i = i;
            }
        }
        ymax_i
    }

    /// The sum of all intensities
    pub fn total_intensity(&self) -> f64 {
        self.intensity.iter().sum()
    }

    /// Integrate the area under the signal using trapezoid integration
    pub fn integrate(&self) -> f64 {
        trapz(&self.position, &self.intensity)
    }

    /// Whether any intensity is below zero
    pub fn has_negative_intensity(&self) -> bool {
        self.intensity.iter().any(|y| *y < 0.0)
    }

    /// Replace negative intensities with zero. Only copies the intensity
    /// array if a negative value is present.
    pub fn clamp_negative(&self) -> RawDataArray<'_> {
        let mut dup = self.borrow();
        if dup.has_negative_intensity() {
            dup.intensity.to_mut().iter_mut().for_each(|y| {
                if *y < 0.0 {
                    *y = 0.0;
                }
            });
        }
        dup
    }

    /// Create a new [`RawDataArray`] that borrows its data from this one
    pub fn borrow(&self) -> RawDataArray<'_> {
        RawDataArray::new(
            Cow::Borrowed(self.position.deref()),
            Cow::Borrowed(self.intensity.deref()),
        )
    }

    /// Detach from any borrowed storage
    pub fn into_owned(self) -> RawDataArray<'static> {
        RawDataArray::new(
            Cow::Owned(self.position.into_owned()),
            Cow::Owned(self.intensity.into_owned()),
        )
    }

    pub fn iter(&self) -> RawDataArrayIter<'_> {
        RawDataArrayIter {
            inner: self
                .position
                .iter()
                .copied()
                .zip(self.intensity.iter().copied()),
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.iter().map(Sample::from)
    }
}

impl<'a> From<(Cow<'a, [f64]>, Cow<'a, [f64]>)> for RawDataArray<'a> {
    fn from(pair: (Cow<'a, [f64]>, Cow<'a, [f64]>)) -> RawDataArray<'a> {
        RawDataArray::new(pair.0, pair.1)
    }
}

impl<'a> From<(&'a [f64], &'a [f64])> for RawDataArray<'a> {
    fn from(pair: (&'a [f64], &'a [f64])) -> RawDataArray<'a> {
        RawDataArray::new(Cow::Borrowed(pair.0), Cow::Borrowed(pair.1))
    }
}

impl From<(Vec<f64>, Vec<f64>)> for RawDataArray<'static> {
    fn from(pair: (Vec<f64>, Vec<f64>)) -> RawDataArray<'static> {
        RawDataArray::new(Cow::Owned(pair.0), Cow::Owned(pair.1))
    }
}

impl From<&[Sample]> for RawDataArray<'static> {
    fn from(value: &[Sample]) -> Self {
        let (position, intensity) = value.iter().map(|s| (s.position, s.intensity)).unzip();
        RawDataArray::new(Cow::Owned(position), Cow::Owned(intensity))
    }
}

impl From<Vec<Sample>> for RawDataArray<'static> {
    fn from(value: Vec<Sample>) -> Self {
        value.as_slice().into()
    }
}

impl FromIterator<Sample> for RawDataArray<'static> {
    fn from_iter<T: IntoIterator<Item = Sample>>(iter: T) -> Self {
        let (position, intensity) = iter
            .into_iter()
            .map(|s| (s.position, s.intensity))
            .unzip();
        RawDataArray::new(Cow::Owned(position), Cow::Owned(intensity))
    }
}

/// A centroid peak list, as an m/z dimension projection
impl From<&[mzpeaks::CentroidPeak]> for RawDataArray<'static> {
    fn from(value: &[mzpeaks::CentroidPeak]) -> Self {
        value
            .iter()
            .map(|p| Sample::new(p.coordinate(), p.intensity() as f64))
            .collect()
    }
}

/// The elution profile of a feature, as a time dimension projection
impl<X, Y> From<&mzpeaks::feature::Feature<X, Y>> for RawDataArray<'static> {
    fn from(value: &mzpeaks::feature::Feature<X, Y>) -> Self {
        let time = value.time_view().to_vec();
        let intensity = value
            .intensity_view()
            .iter()
            .map(|y| *y as f64)
            .collect();
        RawDataArray::new(Cow::Owned(time), Cow::Owned(intensity))
    }
}
