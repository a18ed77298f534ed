//! Optimized misfit implementation.
//!
//! Numerically equivalent to the reference tier, restructured so that the
//! per-source offset scan never touches time samples. For a synthetic
//! `s = Σ_k a_k g_k`, the shifted L2 residual expands to
//!
//! ```text
//! ||d - s(it)||² = d·d - 2 Σ_k a_k C_k(it) + Σ_jk a_j a_k G_jk(it)
//! ```
//!
//! where the cross-correlation sums `C_k(it) = ⟨d, g_k(it)⟩` and Gram sums
//! `G_jk(it) = ⟨g_j(it), g_k(it)⟩` depend only on the data and the basis.
//! They are computed once per evaluation call, so the offset scan for each
//! additional source costs `O(n_gen² · n_offsets)` per trace.
//!
//! The expansion subtracts near-equal large terms, so it loses all
//! significance when the residual is small relative to the signal energy. A
//! winning residual inside that cancellation band is recomputed directly from
//! time samples, and an exact data-synthetic match scores exactly zero.
//!
//! The L1 norm admits no such shortcut; it reuses the direct path.

use tracing::warn;

use crate::domain::{Dataset, Norm};
use crate::error::{Error, Result};
use crate::greens::GreensBasis;
use crate::source::Source;

use super::{
    CANCELLATION_GUARD, EvalParams, TierEvaluate, offset_bounds, prefer_offset, reference,
    shifted_window,
};

pub(crate) struct Optimized;

impl TierEvaluate for Optimized {
    fn evaluate(
        &self,
        data: &Dataset,
        greens: &GreensBasis,
        sources: &[Source],
        params: &EvalParams<'_>,
    ) -> Result<Vec<f64>> {
        if params.norm == Norm::L1 {
            return sources
                .iter()
                .map(|source| reference::evaluate_one(data, greens, source, params, None))
                .collect();
        }

        let stations = precompute(data, greens, params)?;
        sources
            .iter()
            .map(|source| evaluate_precomputed(&stations, source, params.norm))
            .collect()
    }
}

struct TracePre<'a> {
    weight: f64,
    /// `d·d` over the data window.
    dd: f64,
    /// Cross-correlation sums, `[n_gen][n_off]`.
    c: Vec<Vec<f64>>,
    /// Gram sums, `[n_gen * n_gen][n_off]` (symmetric).
    g: Vec<Vec<f64>>,
    /// Observed samples, kept for the direct fallback at the winning offset.
    data: &'a [f64],
    /// Padded kernels, one per generator.
    kernels: &'a [Vec<f64>],
}

struct GroupPre<'a> {
    traces: Vec<TracePre<'a>>,
}

struct StationPre<'a> {
    n_gen: usize,
    itmin: isize,
    n_off: usize,
    npts_left: isize,
    groups: Vec<GroupPre<'a>>,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn precompute<'a>(
    data: &'a Dataset,
    greens: &'a GreensBasis,
    params: &EvalParams<'_>,
) -> Result<Vec<StationPre<'a>>> {
    let mut stations = Vec::with_capacity(data.streams.len());

    for stream in &data.streams {
        let id = stream.station.id();
        let tensor = greens
            .for_station(&id)
            .ok_or_else(|| Error::config(format!("no Green's tensor for station {id}")))?;

        let (itmin, itmax) = offset_bounds(params.time_shift_min, params.time_shift_max, tensor.dt);
        let n_off = (itmax - itmin + 1) as usize;
        let npts_left = tensor.npts_left() as isize;
        let n_gen = tensor.n_generators();

        let mut groups = Vec::with_capacity(params.groups.len());
        for group in params.groups {
            let mut traces = Vec::new();
            for &component in group {
                let Some(trace) = stream.trace(component) else {
                    continue;
                };
                if trace.weight == 0.0 || trace.data.is_empty() {
                    continue;
                }
                let Some(kernels) = tensor.component(component) else {
                    warn!(
                        station = %id,
                        component = %component,
                        "data component has no synthetic counterpart; skipping"
                    );
                    continue;
                };

                let n = trace.data.len();
                let dd = dot(&trace.data, &trace.data);

                let mut c = vec![vec![0.0; n_off]; n_gen];
                for (k, kernel) in kernels.kernels.iter().enumerate() {
                    for io in 0..n_off {
                        let it = itmin + io as isize;
                        let window = shifted_window(kernel, npts_left, it, n)?;
                        c[k][io] = dot(&trace.data, window);
                    }
                }

                let mut g = vec![vec![0.0; n_off]; n_gen * n_gen];
                for j in 0..n_gen {
                    for k in j..n_gen {
                        for io in 0..n_off {
                            let it = itmin + io as isize;
                            let wj = shifted_window(&kernels.kernels[j], npts_left, it, n)?;
                            let wk = shifted_window(&kernels.kernels[k], npts_left, it, n)?;
                            let v = dot(wj, wk);
                            g[j * n_gen + k][io] = v;
                            g[k * n_gen + j][io] = v;
                        }
                    }
                }

                traces.push(TracePre {
                    weight: trace.weight,
                    dd,
                    c,
                    g,
                    data: trace.data.as_slice(),
                    kernels: kernels.kernels.as_slice(),
                });
            }
            groups.push(GroupPre { traces });
        }
        stations.push(StationPre { n_gen, itmin, n_off, npts_left, groups });
    }

    Ok(stations)
}

/// Shifted L2 residual of one trace from the precomputed sums, clamped at
/// zero, together with the magnitude of the terms it was formed from. A
/// residual far below that magnitude is cancellation noise.
fn shifted_l2(pre: &TracePre<'_>, a: &[f64], n_gen: usize, io: usize) -> (f64, f64) {
    let mut v = pre.dd;
    for k in 0..n_gen {
        v -= 2.0 * a[k] * pre.c[k][io];
    }
    let mut gram = 0.0;
    for j in 0..n_gen {
        for k in 0..n_gen {
            gram += a[j] * a[k] * pre.g[j * n_gen + k][io];
        }
    }
    v += gram;
    (v.max(0.0), pre.dd + gram.max(0.0))
}

/// L2 residual recomputed from time samples at one offset, mirroring the
/// reference path's accumulation order exactly.
fn direct_l2(pre: &TracePre<'_>, a: &[f64], npts_left: isize, it: isize) -> Result<f64> {
    let n = pre.data.len();
    let windows = pre
        .kernels
        .iter()
        .map(|kernel| shifted_window(kernel, npts_left, it, n))
        .collect::<Result<Vec<_>>>()?;

    let mut v = 0.0;
    for (i, d) in pre.data.iter().enumerate() {
        let mut s = 0.0;
        for (ak, window) in a.iter().zip(&windows) {
            s += ak * window[i];
        }
        let r = d - s;
        v += r * r;
    }
    Ok(v)
}

fn evaluate_precomputed(
    stations: &[StationPre<'_>],
    source: &Source,
    norm: Norm,
) -> Result<f64> {
    let a = source.coefficients();
    let mut total = 0.0;

    for sp in stations {
        if a.len() != sp.n_gen {
            return Err(Error::config(format!(
                "source with {} coefficients cannot combine with a basis of \
                 {} generators",
                a.len(),
                sp.n_gen
            )));
        }
        for gp in &sp.groups {
            if gp.traces.is_empty() {
                continue;
            }
            let mut best: Option<(isize, f64)> = None;
            for io in 0..sp.n_off {
                let it = sp.itmin + io as isize;
                let mut val = 0.0;
                for tp in &gp.traces {
                    let (q, _) = shifted_l2(tp, a, sp.n_gen, io);
                    val += tp.weight
                        * match norm {
                            Norm::Hybrid => q.sqrt(),
                            _ => q,
                        };
                }
                best = Some(match best {
                    None => (it, val),
                    Some((bit, bval)) => {
                        if prefer_offset(bval, bit, val, it) {
                            (it, val)
                        } else {
                            (bit, bval)
                        }
                    }
                });
            }
            let Some((best_it, _)) = best else {
                continue;
            };

            let bio = (best_it - sp.itmin) as usize;
            let mut val = 0.0;
            for tp in &gp.traces {
                let (mut q, scale) = shifted_l2(tp, a, sp.n_gen, bio);
                if q < CANCELLATION_GUARD * scale {
                    q = direct_l2(tp, a, sp.npts_left, best_it)?;
                }
                val += tp.weight
                    * match norm {
                        Norm::Hybrid => q.sqrt(),
                        _ => q,
                    };
            }
            total += val;
        }
    }

    Ok(total)
}
