//! Waveform misfit evaluation.
//!
//! Scores one candidate source against a processed data category by
//! generating synthetics from the Green's-function basis, time-aligning them
//! per component group, and accumulating a residual norm:
//!
//! 1. per station, per time-shift group, every integer sample offset in the
//!    allowed range is tried
//! 2. the offset minimizing the group's weighted residual norm wins
//!    (near-ties break toward the smaller shift)
//! 3. winning-offset norms accumulate over groups and stations into one
//!    scalar per source
//!
//! Three interchangeable implementations share this contract:
//!
//! - [`Tier::Reference`] is a direct, transparent transcription used to
//!   verify the others; it can also annotate per-trace diagnostics
//! - [`Tier::Optimized`] precomputes cross-correlation and Gram sums so the
//!   per-source offset scan never touches time samples (L2/hybrid)
//! - [`Tier::Accelerated`] additionally requires homogeneous sampling and
//!   assembles contiguous blocks for vectorized evaluation
//!
//! All tiers produce numerically equivalent results (relative tolerance
//! better than 1e-6) and raise equivalent error categories.

mod accelerated;
mod optimized;
mod reference;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Component, Dataset, Norm, Trace, TraceAttrs};
use crate::error::{Error, Result};
use crate::greens::GreensBasis;
use crate::source::Source;

/// Misfit implementation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Transparent direct implementation; the correctness reference.
    Reference,
    /// Same result, restructured around precomputed correlation sums.
    Optimized,
    /// Same result on homogeneously sampled data, via contiguous block
    /// assembly and vectorized evaluation.
    Accelerated,
}

/// Misfit configuration, validated at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MisfitConfig {
    pub norm: Norm,

    /// Partition of component codes into groups constrained to share one
    /// time shift, e.g. `["ZRT"]` or `["ZR", "T"]`.
    pub time_shift_groups: Vec<String>,

    /// Minimum allowed time shift (s); non-positive.
    pub time_shift_min: f64,
    /// Maximum allowed time shift (s); non-negative. A positive shift moves
    /// the synthetic forward in time (it was arriving too early).
    pub time_shift_max: f64,

    pub tier: Tier,
}

impl Default for MisfitConfig {
    fn default() -> Self {
        Self {
            norm: Norm::Hybrid,
            time_shift_groups: vec!["ZRT".to_string()],
            time_shift_min: 0.0,
            time_shift_max: 0.0,
            tier: Tier::Optimized,
        }
    }
}

/// Data misfit function for one data category.
///
/// Construct once per category, then evaluate against any number of sources:
///
/// ```
/// # use mtsearch::misfit::{Misfit, MisfitConfig};
/// let misfit = Misfit::new(MisfitConfig::default()).unwrap();
/// ```
pub struct Misfit {
    norm: Norm,
    groups: Vec<Vec<Component>>,
    time_shift_min: f64,
    time_shift_max: f64,
    tier: Tier,
    strategy: Box<dyn TierEvaluate + Send + Sync>,
}

impl fmt::Debug for Misfit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Misfit")
            .field("norm", &self.norm)
            .field("groups", &self.groups)
            .field("time_shift_min", &self.time_shift_min)
            .field("time_shift_max", &self.time_shift_max)
            .field("tier", &self.tier)
            .finish()
    }
}

impl Misfit {
    pub fn new(config: MisfitConfig) -> Result<Self> {
        let groups = parse_groups(&config.time_shift_groups)?;

        if !(config.time_shift_min.is_finite() && config.time_shift_max.is_finite()) {
            return Err(Error::config("time shift bounds must be finite"));
        }
        if config.time_shift_min > config.time_shift_max {
            return Err(Error::config(format!(
                "inverted time shift bounds: min={} > max={}",
                config.time_shift_min, config.time_shift_max
            )));
        }
        if config.time_shift_min > 0.0 || config.time_shift_max < 0.0 {
            return Err(Error::config(
                "time shift bounds must bracket zero (min <= 0 <= max)",
            ));
        }

        if config.norm == Norm::L1 {
            warn!(
                "norm=L1 is monotonically slower; consider norm=hybrid, \
                 which is nearly as robust against outliers"
            );
        }

        let strategy: Box<dyn TierEvaluate + Send + Sync> = match config.tier {
            Tier::Reference => Box::new(reference::Reference),
            Tier::Optimized => Box::new(optimized::Optimized),
            Tier::Accelerated => Box::new(accelerated::Accelerated),
        };

        Ok(Self {
            norm: config.norm,
            groups,
            time_shift_min: config.time_shift_min,
            time_shift_max: config.time_shift_max,
            tier: config.tier,
            strategy,
        })
    }

    /// Evaluate misfit for a sequence of sources; one value per source.
    ///
    /// An empty data category carries no information and yields an all-zero
    /// result with a diagnostic, not an error.
    pub fn evaluate(
        &self,
        data: &Dataset,
        greens: &GreensBasis,
        sources: &[Source],
    ) -> Result<Vec<f64>> {
        if data.is_empty() {
            warn!(
                category = %data.category,
                "empty data set; no misfit evaluations will be carried out"
            );
            return Ok(vec![0.0; sources.len()]);
        }
        greens.check_padding(self.time_shift_min, self.time_shift_max)?;
        self.strategy.evaluate(data, greens, sources, &self.params())
    }

    /// Evaluate misfit for a single source.
    pub fn evaluate_single(
        &self,
        data: &Dataset,
        greens: &GreensBasis,
        source: &Source,
    ) -> Result<f64> {
        let values = self.evaluate(data, greens, std::slice::from_ref(source))?;
        Ok(values[0])
    }

    /// Evaluate one source and return per-trace diagnostics alongside the
    /// misfit value: winning time shift, cross-correlation, and fractional
    /// misfit contribution.
    ///
    /// Annotation always runs on the reference path regardless of the
    /// configured tier.
    pub fn evaluate_with_attrs(
        &self,
        data: &Dataset,
        greens: &GreensBasis,
        source: &Source,
    ) -> Result<(f64, Vec<TraceAttrs>)> {
        if data.is_empty() {
            warn!(
                category = %data.category,
                "empty data set; no misfit evaluations will be carried out"
            );
            return Ok((0.0, Vec::new()));
        }
        greens.check_padding(self.time_shift_min, self.time_shift_max)?;

        let mut attrs = Vec::new();
        let total =
            reference::evaluate_one(data, greens, source, &self.params(), Some(&mut attrs))?;
        if total > 0.0 {
            for record in &mut attrs {
                record.misfit_contribution /= total;
            }
        }
        Ok((total, attrs))
    }

    fn params(&self) -> EvalParams<'_> {
        EvalParams {
            norm: self.norm,
            groups: &self.groups,
            time_shift_min: self.time_shift_min,
            time_shift_max: self.time_shift_max,
        }
    }
}

/// Shared evaluation parameters handed to a tier implementation.
pub(crate) struct EvalParams<'a> {
    pub norm: Norm,
    pub groups: &'a [Vec<Component>],
    pub time_shift_min: f64,
    pub time_shift_max: f64,
}

/// One misfit implementation. All implementations reproduce the same
/// numerical contract; they differ only in how the work is structured.
pub(crate) trait TierEvaluate {
    fn evaluate(
        &self,
        data: &Dataset,
        greens: &GreensBasis,
        sources: &[Source],
        params: &EvalParams<'_>,
    ) -> Result<Vec<f64>>;
}

fn parse_groups(groups: &[String]) -> Result<Vec<Vec<Component>>> {
    if groups.is_empty() {
        return Err(Error::config("time_shift_groups must not be empty"));
    }

    let mut parsed = Vec::with_capacity(groups.len());
    let mut seen: Vec<Component> = Vec::new();
    for group in groups {
        if group.is_empty() {
            return Err(Error::config("empty time shift group"));
        }
        let mut components = Vec::with_capacity(group.len());
        for c in group.chars() {
            let component = Component::from_char(c)?;
            if seen.contains(&component) {
                return Err(Error::config(format!(
                    "component {component} appears in more than one time \
                     shift group"
                )));
            }
            seen.push(component);
            components.push(component);
        }
        parsed.push(components);
    }
    Ok(parsed)
}

/// Relative tolerance below which two group residuals count as tied.
pub(crate) const TIE_TOLERANCE: f64 = 1e-9;

/// Fraction of the quadratic expansion's term magnitude below which a
/// precomputed residual is dominated by floating-point cancellation and must
/// be recomputed directly from time samples. Source coefficients are O(M0),
/// so the expansion's terms reach ~1e33 while the residual at a good fit can
/// be arbitrarily small.
pub(crate) const CANCELLATION_GUARD: f64 = 1e-9;

/// True when the candidate offset should replace the incumbent best.
///
/// Near-equal residuals break toward the smaller-magnitude shift; an exact
/// magnitude tie keeps the incumbent, so the earlier-visited (more negative)
/// offset wins deterministically. Every tier selects offsets through this
/// one comparator.
pub(crate) fn prefer_offset(best_val: f64, best_it: isize, val: f64, it: isize) -> bool {
    let scale = best_val.abs().max(val.abs());
    if (best_val - val).abs() <= TIE_TOLERANCE * scale {
        it.abs() < best_it.abs()
    } else {
        val < best_val
    }
}

/// Time-shift bounds in integer sample offsets for a given sample interval.
pub(crate) fn offset_bounds(time_shift_min: f64, time_shift_max: f64, dt: f64) -> (isize, isize) {
    (
        (time_shift_min / dt).round() as isize,
        (time_shift_max / dt).round() as isize,
    )
}

/// Slice the padded synthetic at sample offset `it`.
pub(crate) fn shifted_window<'a>(
    padded: &'a [f64],
    npts_left: isize,
    it: isize,
    n: usize,
) -> Result<&'a [f64]> {
    let j0 = npts_left - it;
    if j0 < 0 {
        return Err(Error::config(format!(
            "shift of {it} samples exceeds left padding of {npts_left} samples"
        )));
    }
    let j0 = j0 as usize;
    padded.get(j0..j0 + n).ok_or_else(|| {
        Error::config(format!(
            "synthetic window [{j0}, {}) exceeds padded length {}",
            j0 + n,
            padded.len()
        ))
    })
}

/// Sum of squared residual samples over a window.
pub(crate) fn windowed_l2(data: &[f64], syn: &[f64]) -> f64 {
    data.iter().zip(syn).map(|(d, s)| (d - s) * (d - s)).sum()
}

/// Sum of absolute residual samples over a window.
pub(crate) fn windowed_l1(data: &[f64], syn: &[f64]) -> f64 {
    data.iter().zip(syn).map(|(d, s)| (d - s).abs()).sum()
}

/// Normalized cross-correlation between data and a shifted synthetic window.
pub(crate) fn normalized_cc(data: &[f64], syn: &[f64]) -> f64 {
    let dot: f64 = data.iter().zip(syn).map(|(d, s)| d * s).sum();
    let dd: f64 = data.iter().map(|d| d * d).sum();
    let ss: f64 = syn.iter().map(|s| s * s).sum();
    let denom = (dd * ss).sqrt();
    if denom > 0.0 { dot / denom } else { 0.0 }
}

/// Matched (data, synthetic) pairs for one group at one station.
///
/// Zero-weight and empty channels are excluded; data components with no
/// synthetic counterpart are skipped with a warning-level diagnostic.
pub(crate) fn collect_pairs<'a>(
    station_id: &str,
    traces: &'a [Trace],
    synthetics: &'a [Trace],
    group: &[Component],
) -> Vec<(&'a Trace, &'a Trace)> {
    let mut pairs = Vec::new();
    for &component in group {
        let Some(trace) = traces.iter().find(|t| t.component == component) else {
            continue;
        };
        if trace.weight == 0.0 || trace.data.is_empty() {
            continue;
        }
        let Some(syn) = synthetics.iter().find(|t| t.component == component) else {
            warn!(
                station = %station_id,
                component = %component,
                "data component has no synthetic counterpart; skipping"
            );
            continue;
        };
        pairs.push((trace, syn));
    }
    pairs
}
