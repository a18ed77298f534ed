//! Accelerated misfit implementation.
//!
//! Same numerical contract as the other tiers, with two structural
//! differences:
//!
//! - all waveforms in the category must share one sample interval and one
//!   window length; violations fail with an explicit error naming the
//!   offending station rather than silently truncating or resampling
//! - data and kernels are assembled into contiguous `nalgebra` storage
//!   first, so per-source evaluation reduces to dense matrix-vector
//!   products over all offsets at once
//!
//! Assembly is a separate step from the misfit computation proper. As in the
//! precomputed-sums tier, a winning residual inside the quadratic expansion's
//! cancellation band is recomputed directly from time samples.

use nalgebra::{DMatrix, DVector};
use tracing::warn;

use crate::domain::{Dataset, Norm};
use crate::error::{Error, Result};
use crate::greens::GreensBasis;
use crate::source::Source;

use super::{
    CANCELLATION_GUARD, EvalParams, TierEvaluate, offset_bounds, prefer_offset, shifted_window,
};

pub(crate) struct Accelerated;

impl TierEvaluate for Accelerated {
    fn evaluate(
        &self,
        data: &Dataset,
        greens: &GreensBasis,
        sources: &[Source],
        params: &EvalParams<'_>,
    ) -> Result<Vec<f64>> {
        let block = assemble(data, greens, params)?;
        sources
            .iter()
            .map(|source| evaluate_block(&block, source, params.norm))
            .collect()
    }
}

/// One homogeneous trace's share of the assembled block.
struct TraceBlock {
    weight: f64,
    n_gen: usize,
    npts_left: isize,
    /// `d·d` over the data window.
    dd: f64,
    /// Cross-correlation sums, `n_off × n_gen`.
    c: DMatrix<f64>,
    /// Gram sums, `n_off × n_gen²` (rows symmetric in `(j, k)`).
    g: DMatrix<f64>,
    /// Observed samples.
    data: DVector<f64>,
    /// Padded kernels, one column per generator.
    kernels: DMatrix<f64>,
}

struct Block {
    npts: usize,
    itmin: isize,
    n_off: usize,
    traces: Vec<TraceBlock>,
    /// Trace indices per (station, time-shift group) selection unit.
    groups: Vec<Vec<usize>>,
}

/// Combine the category's streams and kernels into one homogeneous block.
///
/// Fails with a sampling-consistency error naming the first station whose
/// sample interval or window length differs from the rest of the category.
fn assemble(data: &Dataset, greens: &GreensBasis, params: &EvalParams<'_>) -> Result<Block> {
    let mut dt: Option<f64> = None;
    let mut npts: Option<usize> = None;

    for stream in &data.streams {
        let id = stream.station.id();
        for trace in &stream.traces {
            // zero-weight channels never enter the block, so their sampling
            // does not constrain the category
            if trace.data.is_empty() || trace.weight == 0.0 {
                continue;
            }
            let dt = *dt.get_or_insert(trace.dt);
            if (trace.dt - dt).abs() > 1e-12 {
                return Err(Error::SamplingConsistency {
                    station: id.clone(),
                    message: format!(
                        "sample interval {} differs from category interval {}",
                        trace.dt, dt
                    ),
                });
            }
            let npts = *npts.get_or_insert(trace.data.len());
            if trace.data.len() != npts {
                return Err(Error::SamplingConsistency {
                    station: id.clone(),
                    message: format!(
                        "window length {} differs from category length {}",
                        trace.data.len(),
                        npts
                    ),
                });
            }
        }
    }
    let (Some(dt), Some(npts)) = (dt, npts) else {
        // nothing to assemble; evaluation degenerates to zero totals
        return Ok(Block { npts: 0, itmin: 0, n_off: 1, traces: Vec::new(), groups: Vec::new() });
    };

    let (itmin, itmax) = offset_bounds(params.time_shift_min, params.time_shift_max, dt);
    let n_off = (itmax - itmin + 1) as usize;

    let mut traces: Vec<TraceBlock> = Vec::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for stream in &data.streams {
        let id = stream.station.id();
        let tensor = greens
            .for_station(&id)
            .ok_or_else(|| Error::config(format!("no Green's tensor for station {id}")))?;
        if (tensor.dt - dt).abs() > 1e-12 {
            return Err(Error::SamplingConsistency {
                station: id.clone(),
                message: format!(
                    "Green's function interval {} differs from category interval {dt}",
                    tensor.dt
                ),
            });
        }
        let npts_left = tensor.npts_left() as isize;
        let n_gen = tensor.n_generators();

        for group in params.groups {
            let mut members = Vec::new();
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

                let d = DVector::from_column_slice(&trace.data);
                let dd = d.dot(&d);

                let mut c = DMatrix::zeros(n_off, n_gen);
                for (k, kernel) in kernels.kernels.iter().enumerate() {
                    for io in 0..n_off {
                        let it = itmin + io as isize;
                        let window = shifted_window(kernel, npts_left, it, npts)?;
                        c[(io, k)] = trace.data.iter().zip(window).map(|(x, y)| x * y).sum();
                    }
                }

                let mut g = DMatrix::zeros(n_off, n_gen * n_gen);
                for j in 0..n_gen {
                    for k in j..n_gen {
                        for io in 0..n_off {
                            let it = itmin + io as isize;
                            let wj = shifted_window(&kernels.kernels[j], npts_left, it, npts)?;
                            let wk = shifted_window(&kernels.kernels[k], npts_left, it, npts)?;
                            let v: f64 = wj.iter().zip(wk).map(|(x, y)| x * y).sum();
                            g[(io, j * n_gen + k)] = v;
                            g[(io, k * n_gen + j)] = v;
                        }
                    }
                }

                let padded = tensor.padded_len();
                let mut kernel_mat = DMatrix::zeros(padded, n_gen);
                for (k, kernel) in kernels.kernels.iter().enumerate() {
                    kernel_mat.set_column(k, &DVector::from_column_slice(kernel));
                }

                members.push(traces.len());
                traces.push(TraceBlock {
                    weight: trace.weight,
                    n_gen,
                    npts_left,
                    dd,
                    c,
                    g,
                    data: d,
                    kernels: kernel_mat,
                });
            }
            if !members.is_empty() {
                groups.push(members);
            }
        }
    }

    Ok(Block { npts, itmin, n_off, traces, groups })
}

/// One trace's values over all offsets: selection values with the norm
/// applied, plus the raw quadratic residuals and their term magnitudes
/// (L2/hybrid only) for the cancellation check.
struct TraceVals {
    vals: DVector<f64>,
    quad: Option<(DVector<f64>, DVector<f64>)>,
}

fn evaluate_block(block: &Block, source: &Source, norm: Norm) -> Result<f64> {
    let a = DVector::from_column_slice(source.coefficients());

    // per-trace residual norms at every offset, computed in one pass
    let mut evals: Vec<TraceVals> = Vec::with_capacity(block.traces.len());
    for tb in &block.traces {
        if a.len() != tb.n_gen {
            return Err(Error::config(format!(
                "source with {} coefficients cannot combine with a basis of \
                 {} generators",
                a.len(),
                tb.n_gen
            )));
        }
        let tv = match norm {
            Norm::L1 => TraceVals { vals: l1_offsets(block, tb, &a)?, quad: None },
            Norm::L2 | Norm::Hybrid => {
                let term2 = &tb.c * &a;
                let mut aa = DVector::zeros(tb.n_gen * tb.n_gen);
                for j in 0..tb.n_gen {
                    for k in 0..tb.n_gen {
                        aa[j * tb.n_gen + k] = a[j] * a[k];
                    }
                }
                let term3 = &tb.g * &aa;
                let qs = DVector::from_fn(block.n_off, |io, _| {
                    (tb.dd - 2.0 * term2[io] + term3[io]).max(0.0)
                });
                let scales =
                    DVector::from_fn(block.n_off, |io, _| tb.dd + term3[io].max(0.0));
                let vals = qs.map(|q| match norm {
                    Norm::Hybrid => q.sqrt(),
                    _ => q,
                });
                TraceVals { vals, quad: Some((qs, scales)) }
            }
        };
        evals.push(tv);
    }

    let mut total = 0.0;
    for members in &block.groups {
        let mut best: Option<(isize, f64)> = None;
        for io in 0..block.n_off {
            let it = block.itmin + io as isize;
            let val: f64 = members
                .iter()
                .map(|&t| block.traces[t].weight * evals[t].vals[io])
                .sum();
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

        // rebuild the winning value, replacing cancellation-dominated
        // residuals with a direct recomputation
        let bio = (best_it - block.itmin) as usize;
        let mut val = 0.0;
        for &t in members {
            let tb = &block.traces[t];
            let v = match &evals[t].quad {
                Some((qs, scales)) => {
                    let mut q = qs[bio];
                    if q < CANCELLATION_GUARD * scales[bio] {
                        q = direct_l2(block, tb, &a, best_it)?;
                    }
                    match norm {
                        Norm::Hybrid => q.sqrt(),
                        _ => q,
                    }
                }
                None => evals[t].vals[bio],
            };
            val += tb.weight * v;
        }
        total += val;
    }
    Ok(total)
}

/// L2 residual recomputed from time samples at one offset, mirroring the
/// reference path's accumulation order exactly.
fn direct_l2(block: &Block, tb: &TraceBlock, a: &DVector<f64>, it: isize) -> Result<f64> {
    let padded = tb.kernels.nrows();
    let kernels = tb.kernels.as_slice();
    let windows = (0..tb.n_gen)
        .map(|k| {
            shifted_window(
                &kernels[k * padded..(k + 1) * padded],
                tb.npts_left,
                it,
                block.npts,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let data = tb.data.as_slice();
    let mut v = 0.0;
    for (i, d) in data.iter().enumerate() {
        let mut s = 0.0;
        for (k, window) in windows.iter().enumerate() {
            s += a[k] * window[i];
        }
        let r = d - s;
        v += r * r;
    }
    Ok(v)
}

/// L1 residuals at every offset for one trace: synthesize once via a dense
/// product, then slide the window.
fn l1_offsets(block: &Block, tb: &TraceBlock, a: &DVector<f64>) -> Result<DVector<f64>> {
    let syn = &tb.kernels * a;
    let syn = syn.as_slice();
    let data = tb.data.as_slice();

    let mut vals = DVector::zeros(block.n_off);
    for io in 0..block.n_off {
        let it = block.itmin + io as isize;
        let window = shifted_window(syn, tb.npts_left, it, block.npts)?;
        vals[io] = data.iter().zip(window).map(|(d, s)| (d - s).abs()).sum();
    }
    Ok(vals)
}
