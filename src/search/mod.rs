//! Grid-search driver.
//!
//! Iterates a parameter grid, evaluates every declared data category's
//! misfit at each point, sums category misfits into one total per source,
//! and assembles the result surface.
//!
//! Grid points are independent, so the index range is partitioned into
//! contiguous chunks dispatched to a rayon worker pool. Gathering is keyed
//! by index, never by completion order, so the index-to-coordinate mapping
//! is preserved exactly. A search may be cancelled between chunks; a
//! cancelled search yields no partial values.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::Serialize;

use crate::domain::Dataset;
use crate::error::{Error, Result};
use crate::greens::GreensBasis;
use crate::grid::ParameterGrid;
use crate::misfit::Misfit;

/// One data category entering the search: its processed data, its
/// Green's-function basis, and its independently configured misfit.
#[derive(Debug)]
pub struct Category {
    pub dataset: Dataset,
    pub greens: GreensBasis,
    pub misfit: Misfit,
}

/// Cooperative cancellation token, checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Search tuning knobs.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Number of grid points evaluated per worker dispatch.
    pub chunk_size: usize,
    pub cancel: CancelToken,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { chunk_size: 256, cancel: CancelToken::new() }
    }
}

/// Misfit surface over a parameter grid.
///
/// `totals[i]` is the summed misfit of `grid.source_at(i)` across all
/// categories; per-category values are retained as columns. Smaller is
/// always better; zero occurs only for an exact synthetic-data match.
#[derive(Debug, Clone, Serialize)]
pub struct MisfitResult {
    /// Category tags, in evaluation order.
    pub categories: Vec<String>,

    /// Per-axis sample counts of the underlying grid.
    pub shape: Vec<usize>,

    /// Coordinate metadata: axis key and sample values, for rendering.
    pub axes: Vec<(String, Vec<f64>)>,

    /// Total misfit per grid index.
    pub totals: Vec<f64>,

    /// Per-category misfit per grid index, one column per category.
    pub by_category: Vec<Vec<f64>>,
}

impl MisfitResult {
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Index of the best-fitting (minimum-misfit) grid point; ties break
    /// toward the smaller index.
    pub fn best_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &v) in self.totals.iter().enumerate() {
            match best {
                Some((_, bv)) if v >= bv => {}
                _ => best = Some((i, v)),
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_index().map(|i| self.totals[i])
    }
}

/// Search the full grid with default options.
pub fn grid_search(categories: &[Category], grid: &ParameterGrid) -> Result<MisfitResult> {
    grid_search_with(categories, grid, &SearchOptions::default())
}

/// Search the full grid, evaluating every category at every point.
pub fn grid_search_with(
    categories: &[Category],
    grid: &ParameterGrid,
    options: &SearchOptions,
) -> Result<MisfitResult> {
    if categories.is_empty() {
        return Err(Error::config("grid search requires at least one data category"));
    }
    let size = grid.size();
    let chunk_size = options.chunk_size.max(1);

    let starts: Vec<usize> = (0..size).step_by(chunk_size).collect();
    let chunks: Vec<(usize, Vec<Vec<f64>>)> = starts
        .par_iter()
        .map(|&start| {
            if options.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let end = (start + chunk_size).min(size);
            let sources = (start..end)
                .map(|i| grid.source_at(i))
                .collect::<Result<Vec<_>>>()?;

            let mut per_category = Vec::with_capacity(categories.len());
            for category in categories {
                per_category.push(category.misfit.evaluate(
                    &category.dataset,
                    &category.greens,
                    &sources,
                )?);
            }
            Ok((start, per_category))
        })
        .collect::<Result<Vec<_>>>()?;

    // gather keyed by chunk start index
    let mut totals = vec![0.0; size];
    let mut by_category = vec![vec![0.0; size]; categories.len()];
    for (start, per_category) in chunks {
        for (ci, values) in per_category.into_iter().enumerate() {
            for (offset, value) in values.into_iter().enumerate() {
                by_category[ci][start + offset] = value;
                totals[start + offset] += value;
            }
        }
    }

    Ok(MisfitResult {
        categories: categories.iter().map(|c| c.dataset.category.clone()).collect(),
        shape: grid.shape(),
        axes: grid.axis_coords(),
        totals,
        by_category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Component, Dataset, Norm, Station, StationStream, Trace};
    use crate::greens::{ComponentKernels, GreensTensor};
    use crate::grid::{Axis, Convention, ParameterGrid, Spacing};
    use crate::misfit::{Misfit, MisfitConfig, Tier};
    use crate::source::{Force, Source};

    fn station(name: &str, npts: usize) -> Station {
        Station {
            network: "XX".into(),
            station: name.into(),
            location: "".into(),
            distance_km: 50.0,
            azimuth_deg: 0.0,
            dt: 1.0,
            npts,
        }
    }

    fn scalar_force(values: &[f64]) -> Source {
        Source::Force(Force::new([values[0], 0.0, 0.0]))
    }

    /// Two stations, one vertical component of 5 samples each, with a
    /// single active generator; data equals the synthetic at amplitude 0.5.
    fn scenario() -> (Vec<Category>, ParameterGrid) {
        let shapes = [vec![1.0, 2.0, 3.0, 2.0, 1.0], vec![0.0, 1.0, 0.0, -1.0, 0.0]];

        let mut streams = Vec::new();
        let mut tensors = Vec::new();
        for (i, shape) in shapes.iter().enumerate() {
            let sta = station(&format!("S{i}"), 5);
            let mut kernels = vec![vec![0.0; 5]; 3];
            kernels[0] = shape.clone();
            let tensor = GreensTensor::new(
                sta.clone(),
                "ak135",
                1.0,
                0.0,
                0.0,
                vec![ComponentKernels { component: Component::Z, kernels }],
            )
            .unwrap();
            tensors.push(tensor);

            streams.push(StationStream {
                station: sta,
                traces: vec![Trace {
                    component: Component::Z,
                    data: shape.iter().map(|v| 0.5 * v).collect(),
                    start_time: 0.0,
                    dt: 1.0,
                    weight: 1.0,
                }],
            });
        }

        let misfit = Misfit::new(MisfitConfig {
            norm: Norm::L2,
            time_shift_groups: vec!["Z".into()],
            time_shift_min: 0.0,
            time_shift_max: 0.0,
            tier: Tier::Reference,
        })
        .unwrap();

        let grid = ParameterGrid::regular(
            vec![Axis::new("magnitude", 0.0, 1.0, 3, Spacing::Open).unwrap()],
            Convention::Custom { keys: vec!["magnitude".into()], map: scalar_force },
        )
        .unwrap();

        let categories = vec![Category {
            dataset: Dataset::new("body_waves", streams),
            greens: GreensBasis::new(tensors),
            misfit,
        }];
        (categories, grid)
    }

    #[test]
    fn scenario_minimum_is_exact_at_matching_index() {
        let (categories, grid) = scenario();
        assert_eq!(grid.size(), 3);

        let result = grid_search(&categories, &grid).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result.totals[1], 0.0);
        assert!(result.totals[0] > 0.0);
        assert!(result.totals[2] > 0.0);
        assert_eq!(result.best_index(), Some(1));
        assert_eq!(result.best_value(), Some(0.0));
    }

    #[test]
    fn result_carries_coordinate_metadata() {
        let (categories, grid) = scenario();
        let result = grid_search(&categories, &grid).unwrap();

        assert_eq!(result.shape, vec![3]);
        assert_eq!(result.axes.len(), 1);
        assert_eq!(result.axes[0].0, "magnitude");
        assert_eq!(result.axes[0].1, vec![0.25, 0.5, 0.75]);
        assert_eq!(result.categories, vec!["body_waves".to_string()]);
    }

    #[test]
    fn totals_sum_category_columns() {
        let (mut categories, grid) = scenario();
        // second category: same data tagged as another category
        let extra = Category {
            dataset: Dataset::new("surface_waves", categories[0].dataset.streams.clone()),
            greens: categories[0].greens.clone(),
            misfit: Misfit::new(MisfitConfig {
                norm: Norm::Hybrid,
                time_shift_groups: vec!["Z".into()],
                time_shift_min: 0.0,
                time_shift_max: 0.0,
                tier: Tier::Optimized,
            })
            .unwrap(),
        };
        categories.push(extra);

        let result = grid_search(&categories, &grid).unwrap();
        assert_eq!(result.by_category.len(), 2);
        for i in 0..result.len() {
            let sum = result.by_category[0][i] + result.by_category[1][i];
            assert!((result.totals[i] - sum).abs() < 1e-12);
        }
    }

    #[test]
    fn chunked_gather_matches_single_chunk() {
        let (categories, grid) = scenario();
        let one = grid_search_with(
            &categories,
            &grid,
            &SearchOptions { chunk_size: 1, ..Default::default() },
        )
        .unwrap();
        let all = grid_search_with(
            &categories,
            &grid,
            &SearchOptions { chunk_size: 64, ..Default::default() },
        )
        .unwrap();
        assert_eq!(one.totals, all.totals);
    }

    #[test]
    fn cancelled_search_returns_no_values() {
        let (categories, grid) = scenario();
        let options = SearchOptions::default();
        options.cancel.cancel();

        match grid_search_with(&categories, &grid, &options) {
            Err(Error::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[test]
    fn no_categories_is_a_configuration_error() {
        let (_, grid) = scenario();
        assert!(matches!(
            grid_search(&[], &grid),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn result_serializes() {
        let (categories, grid) = scenario();
        let result = grid_search(&categories, &grid).unwrap();
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"totals\""));
        assert!(json.contains("magnitude"));
    }
}
