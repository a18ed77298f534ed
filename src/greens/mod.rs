//! Green's-function basis responses.
//!
//! A `GreensTensor` holds, per station and per component, one precomputed
//! elementary response for each independent source generator (6 for moment
//! tensors, 3 for forces). Any source of the matching family combines
//! linearly into a synthetic waveform:
//!
//! ```text
//! s(t) = Σ_k a_k g_k(t)
//! ```
//!
//! Kernels are stored with symmetric padding around the data window so that
//! synthetics can be slid over the allowed time-shift range without
//! truncation. The padding invariant is checked before any misfit
//! evaluation: padded length must cover data window plus both shift bounds.
//!
//! Sign convention: a positive time shift means the synthetic arrives too
//! early and is moved forward in time; shifted sample `i` reads padded
//! sample `npts_left + i - it`.

use crate::domain::{Component, Station, Trace};
use crate::error::{Error, Result};
use crate::source::Source;

/// Per-component kernels, one padded series per source generator.
#[derive(Debug, Clone)]
pub struct ComponentKernels {
    pub component: Component,
    pub kernels: Vec<Vec<f64>>,
}

/// One station's Green's-function basis.
#[derive(Debug, Clone)]
pub struct GreensTensor {
    pub station: Station,

    /// Earth model the kernels were computed for.
    pub model: String,

    /// Sample interval (s); must match the processed data category.
    pub dt: f64,

    /// Padding before the data window (s); covers positive time shifts.
    pub padding_left: f64,
    /// Padding after the data window (s); covers negative time shifts.
    pub padding_right: f64,

    pub components: Vec<ComponentKernels>,
}

impl GreensTensor {
    /// Build a tensor, validating that every kernel has the padded length
    /// implied by the station's window and the declared padding, and that
    /// all components carry the same generator count.
    pub fn new(
        station: Station,
        model: impl Into<String>,
        dt: f64,
        padding_left: f64,
        padding_right: f64,
        components: Vec<ComponentKernels>,
    ) -> Result<Self> {
        let tensor = Self {
            station,
            model: model.into(),
            dt,
            padding_left,
            padding_right,
            components,
        };

        if !(tensor.dt > 0.0) {
            return Err(Error::config(format!(
                "non-positive sample interval for station {}",
                tensor.station.id()
            )));
        }
        if tensor.padding_left < 0.0 || tensor.padding_right < 0.0 {
            return Err(Error::config(format!(
                "negative padding for station {}",
                tensor.station.id()
            )));
        }

        let n_gen = tensor.n_generators();
        let padded = tensor.padded_len();
        for comp in &tensor.components {
            if comp.kernels.len() != n_gen {
                return Err(Error::config(format!(
                    "station {} component {} has {} kernels, expected {}",
                    tensor.station.id(),
                    comp.component,
                    comp.kernels.len(),
                    n_gen
                )));
            }
            for kernel in &comp.kernels {
                if kernel.len() != padded {
                    return Err(Error::config(format!(
                        "station {} component {} kernel length {} does not \
                         match padded window length {}",
                        tensor.station.id(),
                        comp.component,
                        kernel.len(),
                        padded
                    )));
                }
            }
        }
        Ok(tensor)
    }

    /// Padding before the data window, in samples.
    pub fn npts_left(&self) -> usize {
        (self.padding_left / self.dt).round() as usize
    }

    /// Padding after the data window, in samples.
    pub fn npts_right(&self) -> usize {
        (self.padding_right / self.dt).round() as usize
    }

    /// Padded kernel length in samples.
    pub fn padded_len(&self) -> usize {
        self.station.npts + self.npts_left() + self.npts_right()
    }

    /// Number of independent source generators.
    pub fn n_generators(&self) -> usize {
        self.components.first().map_or(0, |c| c.kernels.len())
    }

    /// This station's kernels for a component, if present.
    pub fn component(&self, component: Component) -> Option<&ComponentKernels> {
        self.components.iter().find(|c| c.component == component)
    }

    /// Linearly combine the basis into a synthetic waveform for `source`.
    ///
    /// The synthetic traces keep the full padded length; the misfit engine
    /// selects the shifted window. Generator-count mismatch with the source
    /// family is a configuration error.
    pub fn combine(&self, source: &Source) -> Result<Vec<Trace>> {
        let coeff = source.coefficients();
        if coeff.len() != self.n_generators() {
            return Err(Error::config(format!(
                "source with {} coefficients cannot combine with a basis of \
                 {} generators at station {}",
                coeff.len(),
                self.n_generators(),
                self.station.id()
            )));
        }

        let padded = self.padded_len();
        let mut out = Vec::with_capacity(self.components.len());
        for comp in &self.components {
            let mut data = vec![0.0; padded];
            for (a, kernel) in coeff.iter().zip(&comp.kernels) {
                for (d, g) in data.iter_mut().zip(kernel) {
                    *d += a * g;
                }
            }
            out.push(Trace {
                component: comp.component,
                data,
                start_time: -self.padding_left,
                dt: self.dt,
                weight: 1.0,
            });
        }
        Ok(out)
    }
}

/// Station-keyed collection of Green's tensors for one data category.
#[derive(Debug, Clone, Default)]
pub struct GreensBasis {
    pub tensors: Vec<GreensTensor>,
}

impl GreensBasis {
    pub fn new(tensors: Vec<GreensTensor>) -> Self {
        Self { tensors }
    }

    /// Look up the tensor for a station id (`network.station.location`).
    pub fn for_station(&self, id: &str) -> Option<&GreensTensor> {
        self.tensors.iter().find(|t| t.station.id() == id)
    }

    /// Verify that every tensor's padding covers the requested time-shift
    /// range. Fails fast, naming the first offending station.
    pub fn check_padding(&self, time_shift_min: f64, time_shift_max: f64) -> Result<()> {
        for tensor in &self.tensors {
            let need_left = time_shift_max.max(0.0);
            let need_right = (-time_shift_min).max(0.0);
            if tensor.padding_left + 1e-9 < need_left
                || tensor.padding_right + 1e-9 < need_right
            {
                return Err(Error::InsufficientPadding {
                    station: tensor.station.id(),
                    message: format!(
                        "padding ({:.3}s, {:.3}s) does not cover time shifts in \
                         [{:.3}s, {:.3}s]",
                        tensor.padding_left,
                        tensor.padding_right,
                        time_shift_min,
                        time_shift_max
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Force, MomentTensor};

    fn test_station(npts: usize, dt: f64) -> Station {
        Station {
            network: "AK".into(),
            station: "PAX".into(),
            location: "".into(),
            distance_km: 100.0,
            azimuth_deg: 30.0,
            dt,
            npts,
        }
    }

    fn force_tensor(npts: usize, pad: f64) -> GreensTensor {
        let dt = 1.0;
        let padded = npts + 2 * (pad / dt).round() as usize;
        let kernels = (0..3)
            .map(|k| (0..padded).map(|i| (k + 1) as f64 * i as f64).collect())
            .collect();
        GreensTensor::new(
            test_station(npts, dt),
            "ak135",
            dt,
            pad,
            pad,
            vec![ComponentKernels { component: Component::Z, kernels }],
        )
        .unwrap()
    }

    #[test]
    fn combine_is_linear_in_coefficients() {
        let tensor = force_tensor(5, 0.0);
        let a = tensor
            .combine(&Source::Force(Force::new([1.0, 0.0, 0.0])))
            .unwrap();
        let b = tensor
            .combine(&Source::Force(Force::new([0.0, 2.0, 0.0])))
            .unwrap();
        let ab = tensor
            .combine(&Source::Force(Force::new([1.0, 2.0, 0.0])))
            .unwrap();
        for i in 0..5 {
            assert!((ab[0].data[i] - (a[0].data[i] + b[0].data[i])).abs() < 1e-12);
        }
    }

    #[test]
    fn combine_rejects_wrong_source_family() {
        let tensor = force_tensor(5, 0.0);
        let mt = Source::MomentTensor(MomentTensor::new([1.0; 6]));
        assert!(tensor.combine(&mt).is_err());
    }

    #[test]
    fn kernel_length_mismatch_fails_construction() {
        let result = GreensTensor::new(
            test_station(5, 1.0),
            "ak135",
            1.0,
            0.0,
            0.0,
            vec![ComponentKernels {
                component: Component::Z,
                kernels: vec![vec![0.0; 4]; 3],
            }],
        );
        assert!(result.is_err());
    }

    #[test]
    fn padding_check_names_offending_station() {
        let basis = GreensBasis::new(vec![force_tensor(5, 2.0)]);
        assert!(basis.check_padding(-2.0, 2.0).is_ok());

        match basis.check_padding(-5.0, 5.0) {
            Err(Error::InsufficientPadding { station, .. }) => {
                assert_eq!(station, "AK.PAX.");
            }
            other => panic!("expected InsufficientPadding, got {other:?}"),
        }
    }
}
