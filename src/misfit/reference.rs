//! Reference misfit implementation.
//!
//! A direct transcription of the misfit contract, kept deliberately simple:
//! for each station and time-shift group, every candidate offset rebuilds
//! the shifted residual and the group norm from the time samples. The other
//! implementations are verified against this one.
//!
//! This is also the only path that produces per-trace annotations (winning
//! time shift, cross-correlation, misfit contribution).

use crate::domain::{Dataset, Norm, TraceAttrs};
use crate::error::{Error, Result};
use crate::greens::GreensBasis;
use crate::source::Source;

use super::{
    EvalParams, TierEvaluate, collect_pairs, normalized_cc, offset_bounds, prefer_offset,
    shifted_window, windowed_l1, windowed_l2,
};

pub(crate) struct Reference;

impl TierEvaluate for Reference {
    fn evaluate(
        &self,
        data: &Dataset,
        greens: &GreensBasis,
        sources: &[Source],
        params: &EvalParams<'_>,
    ) -> Result<Vec<f64>> {
        sources
            .iter()
            .map(|source| evaluate_one(data, greens, source, params, None))
            .collect()
    }
}

/// Misfit of a single source, optionally annotating per-trace diagnostics.
///
/// `attrs` records raw (unnormalized) misfit contributions; the caller
/// divides by the total.
pub(crate) fn evaluate_one(
    data: &Dataset,
    greens: &GreensBasis,
    source: &Source,
    params: &EvalParams<'_>,
    mut attrs: Option<&mut Vec<TraceAttrs>>,
) -> Result<f64> {
    let mut total = 0.0;

    for stream in &data.streams {
        let id = stream.station.id();
        let tensor = greens
            .for_station(&id)
            .ok_or_else(|| Error::config(format!("no Green's tensor for station {id}")))?;
        let synthetics = tensor.combine(source)?;

        let (itmin, itmax) = offset_bounds(params.time_shift_min, params.time_shift_max, tensor.dt);
        let npts_left = tensor.npts_left() as isize;

        for group in params.groups {
            let pairs = collect_pairs(&id, &stream.traces, &synthetics, group);
            if pairs.is_empty() {
                continue;
            }

            let mut best: Option<(isize, f64)> = None;
            for it in itmin..=itmax {
                let mut val = 0.0;
                for (trace, syn) in &pairs {
                    let window = shifted_window(&syn.data, npts_left, it, trace.data.len())?;
                    val += trace.weight
                        * match params.norm {
                            Norm::L2 => windowed_l2(&trace.data, window),
                            Norm::L1 => windowed_l1(&trace.data, window),
                            Norm::Hybrid => windowed_l2(&trace.data, window).sqrt(),
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
            let Some((best_it, best_val)) = best else {
                continue;
            };
            total += best_val;

            if let Some(records) = attrs.as_mut() {
                for (trace, syn) in &pairs {
                    let window = shifted_window(&syn.data, npts_left, best_it, trace.data.len())?;
                    let contribution = trace.weight
                        * match params.norm {
                            Norm::L2 => windowed_l2(&trace.data, window),
                            Norm::L1 => windowed_l1(&trace.data, window),
                            Norm::Hybrid => windowed_l2(&trace.data, window).sqrt(),
                        };
                    records.push(TraceAttrs {
                        station_id: id.clone(),
                        component: trace.component,
                        time_shift: best_it as f64 * tensor.dt,
                        cross_correlation: normalized_cc(&trace.data, window),
                        misfit_contribution: contribution,
                    });
                }
            }
        }
    }

    Ok(total)
}
