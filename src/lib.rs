//! `mtsearch` library crate.
//!
//! Estimates the seismic source mechanism (moment tensor or point force) that
//! best explains a set of observed waveforms, by sampling a parameterized
//! source space and scoring each candidate against the data:
//!
//! - `grid` defines regular or random parameter grids and maps a flat index
//!   to a concrete source
//! - `greens` holds precomputed Green's-function basis responses that combine
//!   linearly into synthetic waveforms
//! - `misfit` scores one source against processed observed data, searching
//!   over per-component-group time shifts
//! - `search` drives the misfit engine over every grid point and assembles
//!   the result surface
//!
//! Waveform I/O, filtering/windowing, and plotting are external concerns;
//! this crate consumes already-processed data and exposes a result surface.

pub mod domain;
pub mod error;
pub mod greens;
pub mod grid;
pub mod misfit;
pub mod search;
pub mod source;
