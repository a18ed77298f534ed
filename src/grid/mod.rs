//! Source parameter grids.
//!
//! A grid is a discretized (or randomly sampled) source parameter space with
//! a deterministic mapping from a flat integer index to a concrete source:
//!
//! - axes are named and canonically ordered by key, so index decomposition is
//!   a fixed mixed-radix unraveling
//! - regular grids sample each axis evenly; open, closed, and periodic
//!   boundary handling is chosen per parameter semantics
//! - random grids draw all samples once at construction from a seeded RNG,
//!   so `source_at` is a pure lookup and runs are reproducible
//!
//! The coordinate-to-source mapping is a named convention (moment tensor,
//! double couple, force) or a caller-supplied pure function.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::source::{Force, MomentTensor, Source, scalar_moment};

/// Boundary handling for a regular axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spacing {
    /// Endpoints excluded: `count` interior points of an even subdivision.
    /// Used for magnitude-type axes where a boundary value is degenerate.
    Open,
    /// Endpoints included.
    Closed,
    /// `min` included, `max` excluded as an alias of `min` (angle axes).
    Periodic,
}

/// One named grid axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub key: String,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub spacing: Spacing,
}

impl Axis {
    pub fn new(
        key: impl Into<String>,
        min: f64,
        max: f64,
        count: usize,
        spacing: Spacing,
    ) -> Result<Self> {
        let key = key.into();
        if !(min.is_finite() && max.is_finite() && max > min) {
            return Err(Error::config(format!(
                "invalid bounds for axis '{key}': min={min}, max={max}"
            )));
        }
        if count == 0 {
            return Err(Error::config(format!(
                "axis '{key}' must have at least one sample"
            )));
        }
        Ok(Self { key, min, max, count, spacing })
    }

    /// Sample coordinates along this axis.
    pub fn coords(&self) -> Vec<f64> {
        let n = self.count;
        let span = self.max - self.min;
        match self.spacing {
            Spacing::Open => {
                let step = span / (n as f64 + 1.0);
                (1..=n).map(|i| self.min + step * i as f64).collect()
            }
            Spacing::Closed => {
                if n == 1 {
                    vec![0.5 * (self.min + self.max)]
                } else {
                    let step = span / (n as f64 - 1.0);
                    (0..n).map(|i| self.min + step * i as f64).collect()
                }
            }
            Spacing::Periodic => {
                let step = span / n as f64;
                (0..n).map(|i| self.min + step * i as f64).collect()
            }
        }
    }
}

/// Coordinate-to-source mapping convention.
///
/// Each convention declares the axis keys it requires; grid construction
/// validates the axis set against them and fails fast on a mismatch.
/// `values` passed to [`Convention::to_source`] are ordered by sorted key,
/// matching [`Convention::required_keys`].
#[derive(Debug, Clone)]
pub enum Convention {
    /// Six direct tensor-component axes `Mrr, Mtt, Mpp, Mrt, Mrp, Mtp` (N·m).
    MomentTensor,
    /// Fault-plane axes `strike, dip, rake` plus a `magnitude` axis, or a
    /// fixed magnitude with that axis dropped.
    DoubleCouple { magnitude: Option<f64> },
    /// Orientation axes `azimuth, inclination` plus a `magnitude` axis (N),
    /// or a fixed magnitude with that axis dropped.
    PointForce { magnitude: Option<f64> },
    /// Caller-supplied pure mapping; `keys` are the required axis keys.
    Custom { keys: Vec<String>, map: fn(&[f64]) -> Source },
}

impl Convention {
    /// Look up a convention by name. Unknown names are a configuration error.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "moment_tensor" => Ok(Convention::MomentTensor),
            "double_couple" => Ok(Convention::DoubleCouple { magnitude: None }),
            "force" => Ok(Convention::PointForce { magnitude: None }),
            other => Err(Error::config(format!(
                "unknown source convention '{other}' \
                 (expected one of moment_tensor, double_couple, force)"
            ))),
        }
    }

    /// Required axis keys, in sorted order.
    pub fn required_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = match self {
            Convention::MomentTensor => {
                vec!["Mrr", "Mtt", "Mpp", "Mrt", "Mrp", "Mtp"]
                    .into_iter()
                    .map(String::from)
                    .collect()
            }
            Convention::DoubleCouple { magnitude } => {
                let mut v = vec!["strike".to_string(), "dip".to_string(), "rake".to_string()];
                if magnitude.is_none() {
                    v.push("magnitude".to_string());
                }
                v
            }
            Convention::PointForce { magnitude } => {
                let mut v = vec!["azimuth".to_string(), "inclination".to_string()];
                if magnitude.is_none() {
                    v.push("magnitude".to_string());
                }
                v
            }
            Convention::Custom { keys, .. } => keys.clone(),
        };
        keys.sort();
        keys
    }

    /// Map sorted-key-ordered coordinate values to a source.
    pub fn to_source(&self, values: &[f64]) -> Source {
        match self {
            Convention::MomentTensor => {
                // sorted keys: Mpp, Mrp, Mrr, Mrt, Mtp, Mtt
                Source::MomentTensor(MomentTensor::new([
                    values[2], values[5], values[0], values[3], values[1], values[4],
                ]))
            }
            Convention::DoubleCouple { magnitude } => {
                // sorted keys: dip, [magnitude,] rake, strike
                let (dip, mw, rake, strike) = match magnitude {
                    Some(mw) => (values[0], *mw, values[1], values[2]),
                    None => (values[0], values[1], values[2], values[3]),
                };
                Source::MomentTensor(MomentTensor::from_double_couple(strike, dip, rake, mw))
            }
            Convention::PointForce { magnitude } => {
                // sorted keys: azimuth, inclination[, magnitude]
                let (az, inc, mag) = match magnitude {
                    Some(mag) => (values[0], values[1], *mag),
                    None => (values[0], values[1], values[2]),
                };
                Source::Force(Force::from_angles(mag, az, inc))
            }
            Convention::Custom { map, .. } => map(values),
        }
    }
}

#[derive(Debug, Clone)]
enum Samples {
    /// Per-axis coordinate vectors; indexed by mixed-radix decomposition.
    Regular { coords: Vec<Vec<f64>> },
    /// Per-axis draws of length `size`, fixed at construction.
    Random { draws: Vec<Vec<f64>> },
}

/// A discretized or randomly sampled source parameter space.
#[derive(Debug, Clone)]
pub struct ParameterGrid {
    axes: Vec<Axis>,
    convention: Convention,
    samples: Samples,
    size: usize,
}

impl ParameterGrid {
    /// Build a regular grid over the given axes.
    pub fn regular(mut axes: Vec<Axis>, convention: Convention) -> Result<Self> {
        axes.sort_by(|a, b| a.key.cmp(&b.key));
        validate_keys(&axes, &convention)?;

        let size = axes.iter().map(|a| a.count).product();
        let coords = axes.iter().map(Axis::coords).collect();
        Ok(Self { axes, convention, samples: Samples::Regular { coords }, size })
    }

    /// Build a random grid of `size` draws, seeded for reproducibility.
    ///
    /// Each axis independently draws `size` samples from `Uniform(min, max)`
    /// at construction; accesses never regenerate them. Axis `count` and
    /// `spacing` are ignored.
    pub fn random(mut axes: Vec<Axis>, convention: Convention, size: usize, seed: u64) -> Result<Self> {
        axes.sort_by(|a, b| a.key.cmp(&b.key));
        validate_keys(&axes, &convention)?;
        if size == 0 {
            return Err(Error::config("random grid size must be positive"));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let draws = axes
            .iter()
            .map(|a| {
                let dist = Uniform::new(a.min, a.max);
                (0..size).map(|_| dist.sample(&mut rng)).collect()
            })
            .collect();
        Ok(Self { axes, convention, samples: Samples::Random { draws }, size })
    }

    /// Regular double-couple grid at fixed magnitude, `npts` samples per
    /// fault-plane axis.
    ///
    /// Dip uses an open interval so the degenerate horizontal plane (which
    /// duplicates its conjugate representation) is never sampled.
    pub fn double_couple_regular(npts: usize, magnitude: f64) -> Result<Self> {
        Self::regular(
            vec![
                Axis::new("strike", 0.0, 360.0, npts, Spacing::Periodic)?,
                Axis::new("dip", 0.0, 90.0, npts, Spacing::Open)?,
                Axis::new("rake", -180.0, 180.0, npts, Spacing::Periodic)?,
            ],
            Convention::DoubleCouple { magnitude: Some(magnitude) },
        )
    }

    /// Random double-couple grid at fixed magnitude.
    pub fn double_couple_random(size: usize, magnitude: f64, seed: u64) -> Result<Self> {
        Self::random(
            vec![
                Axis::new("strike", 0.0, 360.0, 1, Spacing::Periodic)?,
                Axis::new("dip", 0.0, 90.0, 1, Spacing::Open)?,
                Axis::new("rake", -180.0, 180.0, 1, Spacing::Periodic)?,
            ],
            Convention::DoubleCouple { magnitude: Some(magnitude) },
            size,
            seed,
        )
    }

    /// Regular point-force grid at fixed magnitude.
    pub fn force_regular(npts: usize, magnitude: f64) -> Result<Self> {
        Self::regular(
            vec![
                Axis::new("azimuth", 0.0, 360.0, npts, Spacing::Periodic)?,
                Axis::new("inclination", 0.0, 180.0, npts, Spacing::Open)?,
            ],
            Convention::PointForce { magnitude: Some(magnitude) },
        )
    }

    /// Regular full-moment-tensor grid: each of the six tensor components
    /// sampled on an open interval scaled by the scalar moment of `mw`.
    pub fn moment_tensor_regular(npts: usize, mw: f64) -> Result<Self> {
        let m0 = scalar_moment(mw);
        let axes = ["Mrr", "Mtt", "Mpp", "Mrt", "Mrp", "Mtp"]
            .iter()
            .map(|k| Axis::new(*k, -m0, m0, npts, Spacing::Open))
            .collect::<Result<Vec<_>>>()?;
        Self::regular(axes, Convention::MomentTensor)
    }

    /// Total number of candidate sources.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Per-axis sample counts (regular) or the flat draw count (random).
    pub fn shape(&self) -> Vec<usize> {
        match &self.samples {
            Samples::Regular { .. } => self.axes.iter().map(|a| a.count).collect(),
            Samples::Random { .. } => vec![self.size],
        }
    }

    /// Axis keys in canonical (sorted) order.
    pub fn keys(&self) -> Vec<&str> {
        self.axes.iter().map(|a| a.key.as_str()).collect()
    }

    /// Decompose a flat index into per-axis sample indices (regular grids).
    pub fn tuple_at(&self, index: usize) -> Result<Vec<usize>> {
        self.check_index(index)?;
        match &self.samples {
            Samples::Regular { .. } => {
                let mut rem = index;
                let mut tuple = Vec::with_capacity(self.axes.len());
                for axis in &self.axes {
                    tuple.push(rem % axis.count);
                    rem /= axis.count;
                }
                Ok(tuple)
            }
            Samples::Random { .. } => Err(Error::config(
                "random grids have no per-axis index decomposition",
            )),
        }
    }

    /// Recompose per-axis sample indices into a flat index (regular grids).
    pub fn index_of(&self, tuple: &[usize]) -> Result<usize> {
        match &self.samples {
            Samples::Regular { .. } => {
                if tuple.len() != self.axes.len() {
                    return Err(Error::config(format!(
                        "tuple length {} does not match grid dimension {}",
                        tuple.len(),
                        self.axes.len()
                    )));
                }
                let mut index = 0usize;
                let mut stride = 1usize;
                for (t, axis) in tuple.iter().zip(&self.axes) {
                    if *t >= axis.count {
                        return Err(Error::config(format!(
                            "sample index {t} out of range for axis '{}'",
                            axis.key
                        )));
                    }
                    index += t * stride;
                    stride *= axis.count;
                }
                Ok(index)
            }
            Samples::Random { .. } => Err(Error::config(
                "random grids have no per-axis index decomposition",
            )),
        }
    }

    /// Coordinate values at a flat index, ordered by sorted axis key.
    pub fn coords_at(&self, index: usize) -> Result<Vec<f64>> {
        self.check_index(index)?;
        match &self.samples {
            Samples::Regular { coords } => {
                let tuple = self.tuple_at(index)?;
                Ok(tuple.iter().zip(coords).map(|(t, c)| c[*t]).collect())
            }
            Samples::Random { draws } => Ok(draws.iter().map(|d| d[index]).collect()),
        }
    }

    /// The candidate source at a flat index. Pure function of the index and
    /// the grid configuration.
    pub fn source_at(&self, index: usize) -> Result<Source> {
        let values = self.coords_at(index)?;
        Ok(self.convention.to_source(&values))
    }

    /// Per-axis coordinate metadata `(key, sample values)` for attaching to
    /// a result surface.
    pub fn axis_coords(&self) -> Vec<(String, Vec<f64>)> {
        match &self.samples {
            Samples::Regular { coords } => self
                .axes
                .iter()
                .zip(coords)
                .map(|(a, c)| (a.key.clone(), c.clone()))
                .collect(),
            Samples::Random { draws } => self
                .axes
                .iter()
                .zip(draws)
                .map(|(a, d)| (a.key.clone(), d.clone()))
                .collect(),
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.size {
            return Err(Error::IndexOutOfRange { index, size: self.size });
        }
        Ok(())
    }
}

fn validate_keys(axes: &[Axis], convention: &Convention) -> Result<()> {
    let have: Vec<&str> = axes.iter().map(|a| a.key.as_str()).collect();
    let want = convention.required_keys();
    if have != want.iter().map(String::as_str).collect::<Vec<_>>() {
        return Err(Error::config(format!(
            "axis keys {have:?} do not match convention keys {want:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_spacing_excludes_endpoints() {
        let axis = Axis::new("magnitude", 0.0, 1.0, 3, Spacing::Open).unwrap();
        let c = axis.coords();
        assert_eq!(c.len(), 3);
        assert!((c[0] - 0.25).abs() < 1e-12);
        assert!((c[1] - 0.50).abs() < 1e-12);
        assert!((c[2] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn periodic_spacing_excludes_max() {
        let axis = Axis::new("strike", 0.0, 360.0, 4, Spacing::Periodic).unwrap();
        assert_eq!(axis.coords(), vec![0.0, 90.0, 180.0, 270.0]);
    }

    #[test]
    fn closed_spacing_includes_endpoints() {
        let axis = Axis::new("dip", 0.0, 90.0, 3, Spacing::Closed).unwrap();
        assert_eq!(axis.coords(), vec![0.0, 45.0, 90.0]);
    }

    #[test]
    fn unknown_convention_name_fails() {
        assert!(Convention::from_name("clvd").is_err());
        assert!(Convention::from_name("double_couple").is_ok());
    }

    #[test]
    fn mismatched_axis_keys_fail_at_construction() {
        let axes = vec![Axis::new("strike", 0.0, 360.0, 3, Spacing::Periodic).unwrap()];
        let err = ParameterGrid::regular(
            axes,
            Convention::DoubleCouple { magnitude: Some(4.5) },
        );
        assert!(err.is_err());
    }

    #[test]
    fn index_tuple_round_trip() {
        let grid = ParameterGrid::double_couple_regular(4, 4.5).unwrap();
        assert_eq!(grid.size(), 64);
        for index in 0..grid.size() {
            let tuple = grid.tuple_at(index).unwrap();
            assert_eq!(grid.index_of(&tuple).unwrap(), index);
        }
    }

    #[test]
    fn out_of_range_index_fails() {
        let grid = ParameterGrid::double_couple_regular(2, 4.5).unwrap();
        assert!(matches!(
            grid.source_at(grid.size()),
            Err(crate::error::Error::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn regular_sources_are_injective() {
        let grid = ParameterGrid::double_couple_regular(3, 4.5).unwrap();
        let mut seen: Vec<[f64; 6]> = Vec::new();
        for index in 0..grid.size() {
            let source = grid.source_at(index).unwrap();
            let mut m = [0.0; 6];
            m.copy_from_slice(source.coefficients());
            assert!(
                !seen.iter().any(|s| s
                    .iter()
                    .zip(&m)
                    .all(|(a, b)| (a - b).abs() < 1e-6)),
                "duplicate source at index {index}"
            );
            seen.push(m);
        }
    }

    #[test]
    fn random_grid_is_reproducible() {
        let a = ParameterGrid::double_couple_random(50, 4.5, 7).unwrap();
        let b = ParameterGrid::double_couple_random(50, 4.5, 7).unwrap();
        for i in 0..50 {
            assert_eq!(a.coords_at(i).unwrap(), b.coords_at(i).unwrap());
            // repeated access to the same grid never regenerates draws
            assert_eq!(a.coords_at(i).unwrap(), a.coords_at(i).unwrap());
        }
        let c = ParameterGrid::double_couple_random(50, 4.5, 8).unwrap();
        assert_ne!(a.coords_at(0).unwrap(), c.coords_at(0).unwrap());
    }

    #[test]
    fn random_draws_respect_axis_bounds() {
        let grid = ParameterGrid::double_couple_random(200, 4.5, 11).unwrap();
        for i in 0..grid.size() {
            let v = grid.coords_at(i).unwrap();
            // sorted keys: dip, rake, strike
            assert!(v[0] >= 0.0 && v[0] < 90.0);
            assert!(v[1] >= -180.0 && v[1] < 180.0);
            assert!(v[2] >= 0.0 && v[2] < 360.0);
        }
    }

    #[test]
    fn moment_tensor_convention_orders_components() {
        let m0 = scalar_moment(4.0);
        let grid = ParameterGrid::moment_tensor_regular(1, 4.0).unwrap();
        let source = grid.source_at(0).unwrap();
        // single open-interval sample per axis is the midpoint, i.e. zero
        for c in source.coefficients() {
            assert!(c.abs() < 1e-6 * m0);
        }
        assert_eq!(source.dimension(), 6);
    }
}
