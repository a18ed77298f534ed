//! Domain types shared across the crate.
//!
//! This module defines:
//!
//! - waveform components and station metadata (`Component`, `Station`)
//! - processed observed waveforms (`Trace`, `StationStream`, `Dataset`)
//! - the misfit norm selector (`Norm`)
//! - per-trace diagnostic records (`TraceAttrs`)

pub mod types;

pub use types::*;
