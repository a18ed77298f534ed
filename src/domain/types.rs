//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during a grid search
//! - exported to JSON alongside a result surface
//! - reloaded later for diagnostics or comparisons
//!
//! All waveforms arrive here already filtered, windowed, and weighted; this
//! crate never mutates them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Waveform component code.
///
/// `Z` is vertical, `R` radial, `T` transverse (rotated into the
/// source-receiver frame by the upstream processing step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    Z,
    R,
    T,
}

impl Component {
    /// Parse a single component code character.
    ///
    /// Anything outside `{Z, R, T}` is a configuration error; component codes
    /// come from user-supplied time-shift group strings.
    pub fn from_char(c: char) -> Result<Self> {
        match c.to_ascii_uppercase() {
            'Z' => Ok(Component::Z),
            'R' => Ok(Component::R),
            'T' => Ok(Component::T),
            other => Err(Error::config(format!(
                "unknown component code '{other}' (expected one of Z, R, T)"
            ))),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Component::Z => 'Z',
            Component::R => 'R',
            Component::T => 'T',
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Station metadata attached to each waveform group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub network: String,
    pub station: String,
    pub location: String,

    /// Epicentral distance to the event (km).
    pub distance_km: f64,
    /// Event-to-station azimuth (degrees clockwise from north).
    pub azimuth_deg: f64,

    /// Sample interval (s).
    pub dt: f64,
    /// Number of samples in the processed data window.
    pub npts: usize,
}

impl Station {
    /// Unique station identifier, `network.station.location`.
    pub fn id(&self) -> String {
        format!("{}.{}.{}", self.network, self.station, self.location)
    }
}

/// A single-channel observed time series.
#[derive(Debug, Clone)]
pub struct Trace {
    pub component: Component,

    /// Amplitude samples.
    pub data: Vec<f64>,

    /// Window start time relative to the event origin (s).
    pub start_time: f64,

    /// Sample interval (s).
    pub dt: f64,

    /// Scalar channel weight assigned by upstream processing.
    ///
    /// A weight of zero excludes the channel from misfit and from the
    /// time-shift search entirely.
    pub weight: f64,
}

/// One station's ordered component waveforms.
#[derive(Debug, Clone)]
pub struct StationStream {
    pub station: Station,
    pub traces: Vec<Trace>,
}

impl StationStream {
    /// Find this station's trace for a component, if the channel exists.
    pub fn trace(&self, component: Component) -> Option<&Trace> {
        self.traces.iter().find(|t| t.component == component)
    }
}

/// A processed data category: ordered per-station waveform groups plus a
/// category tag (e.g. `"body_waves"`, `"surface_waves"`).
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub category: String,
    pub streams: Vec<StationStream>,
}

impl Dataset {
    pub fn new(category: impl Into<String>, streams: Vec<StationStream>) -> Self {
        Self { category: category.into(), streams }
    }

    /// True when the category carries no samples at any station.
    ///
    /// An empty category is not an error: it contributes zero misfit.
    pub fn is_empty(&self) -> bool {
        self.streams
            .iter()
            .all(|s| s.traces.iter().all(|t| t.data.is_empty()))
    }
}

/// Waveform-difference norm used to score residuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    /// Sum of absolute weighted residual samples. Robust but slow.
    L1,
    /// Sum of squared weighted residual samples.
    L2,
    /// Per-component L2 norms summed across components; nearly as robust as
    /// L1 at a fraction of the cost.
    Hybrid,
}

impl FromStr for Norm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l1" => Ok(Norm::L1),
            "l2" => Ok(Norm::L2),
            "hybrid" => Ok(Norm::Hybrid),
            other => Err(Error::config(format!(
                "unknown norm '{other}' (expected one of L1, L2, hybrid)"
            ))),
        }
    }
}

/// Per-trace diagnostic record produced by an annotated misfit evaluation.
///
/// Returned alongside the misfit value rather than written onto the waveform,
/// so the shared inputs stay immutable during a parallel search.
#[derive(Debug, Clone, Serialize)]
pub struct TraceAttrs {
    pub station_id: String,
    pub component: Component,

    /// Winning time shift for this trace's group (s). Positive means the
    /// synthetic was arriving too early and was moved forward in time.
    pub time_shift: f64,

    /// Normalized cross-correlation between data and the shifted synthetic.
    pub cross_correlation: f64,

    /// This trace's share of the total misfit, in `[0, 1]` when the total is
    /// nonzero.
    pub misfit_contribution: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_parses_case_insensitively() {
        assert_eq!(Component::from_char('z').unwrap(), Component::Z);
        assert_eq!(Component::from_char('T').unwrap(), Component::T);
        assert!(Component::from_char('N').is_err());
    }

    #[test]
    fn norm_parses_known_names_only() {
        assert_eq!("L2".parse::<Norm>().unwrap(), Norm::L2);
        assert_eq!("HYBRID".parse::<Norm>().unwrap(), Norm::Hybrid);
        assert!("L3".parse::<Norm>().is_err());
    }

    #[test]
    fn station_id_joins_fields() {
        let sta = Station {
            network: "AK".into(),
            station: "PAX".into(),
            location: "00".into(),
            distance_km: 100.0,
            azimuth_deg: 45.0,
            dt: 0.02,
            npts: 100,
        };
        assert_eq!(sta.id(), "AK.PAX.00");
    }

    #[test]
    fn empty_dataset_detection() {
        let empty = Dataset::new("body_waves", vec![]);
        assert!(empty.is_empty());

        let sta = Station {
            network: "AK".into(),
            station: "PAX".into(),
            location: "".into(),
            distance_km: 1.0,
            azimuth_deg: 0.0,
            dt: 1.0,
            npts: 0,
        };
        let zero_len = Dataset::new(
            "body_waves",
            vec![StationStream {
                station: sta,
                traces: vec![Trace {
                    component: Component::Z,
                    data: vec![],
                    start_time: 0.0,
                    dt: 1.0,
                    weight: 1.0,
                }],
            }],
        );
        assert!(zero_len.is_empty());
    }
}
