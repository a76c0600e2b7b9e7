//! Closed integer time windows

use crate::error::ConstructionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed time window `[tmin, tmax]`; `tmax == None` stands for +∞
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval", into = "RawInterval")]
pub struct Interval {
    tmin: i64,
    tmax: Option<i64>,
}

impl Interval {
    /// `[0, ∞]`
    pub const AMBIENT: Interval = Interval { tmin: 0, tmax: None };

    /// Create a bounded interval
    pub fn new(tmin: i64, tmax: i64) -> Result<Self, ConstructionError> {
        Self::with_bounds(tmin, Some(tmax))
    }

    /// Create an interval open to the right
    pub fn unbounded(tmin: i64) -> Self {
        Self { tmin, tmax: None }
    }

    /// Create an interval from an optional upper bound
    pub fn with_bounds(tmin: i64, tmax: Option<i64>) -> Result<Self, ConstructionError> {
        if let Some(max) = tmax {
            if tmin > max {
                return Err(ConstructionError::InvalidInterval {
                    tmin: tmin.to_string(),
                    tmax: max.to_string(),
                    reason: "tmin must not exceed tmax".to_string(),
                });
            }
        }
        Ok(Self { tmin, tmax })
    }

    pub fn tmin(&self) -> i64 {
        self.tmin
    }

    /// Upper bound, `None` when unbounded
    pub fn tmax(&self) -> Option<i64> {
        self.tmax
    }

    pub fn is_bounded(&self) -> bool {
        self.tmax.is_some()
    }

    /// `tmax - tmin`, `None` when the interval is unbounded
    pub fn width(&self) -> Option<u64> {
        self.tmax.map(|max| max.abs_diff(self.tmin))
    }

    /// Whether an action of the given duration fits inside the window
    pub fn fits(&self, duration: u64) -> bool {
        self.width().map_or(true, |width| duration <= width)
    }

    /// Offset both ends by `delta`; an unbounded end stays unbounded.
    /// `None` when an end leaves the `i64` range.
    pub fn shift(&self, delta: i64) -> Option<Self> {
        let tmax = match self.tmax {
            Some(max) => Some(max.checked_add(delta)?),
            None => None,
        };
        Some(Self {
            tmin: self.tmin.checked_add(delta)?,
            tmax,
        })
    }

    /// `[max(a, c), min(b, d)]`, or `None` when the windows do not meet
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let tmin = self.tmin.max(other.tmin);
        let tmax = match (self.tmax, other.tmax) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        };

        match tmax {
            Some(max) if tmin > max => None,
            _ => Some(Interval { tmin, tmax }),
        }
    }

    /// Whether `other` lies entirely inside this interval
    pub fn contains(&self, other: &Interval) -> bool {
        if other.tmin < self.tmin {
            return false;
        }
        match (self.tmax, other.tmax) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => b <= a,
        }
    }

    /// Whether an action occupying `[start, end]` is allowed by this window
    pub fn admits(&self, start: i64, end: i64) -> bool {
        start >= self.tmin && self.tmax.map_or(true, |max| end <= max)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tmax {
            Some(max) => write!(f, "[{}, {}]", self.tmin, max),
            None => write!(f, "[{}, ∞]", self.tmin),
        }
    }
}

/// Serialized form; `tmax` accepts integers and the spellings of +∞
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawInterval {
    tmin: i64,
    tmax: RawBound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawBound {
    Int(i64),
    Float(f64),
    Text(String),
}

impl TryFrom<RawInterval> for Interval {
    type Error = ConstructionError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        let invalid = |shown: String| ConstructionError::InvalidInterval {
            tmin: raw.tmin.to_string(),
            tmax: shown,
            reason: "tmax must be an integer or infinity".to_string(),
        };

        let tmax = match &raw.tmax {
            RawBound::Int(max) => Some(*max),
            RawBound::Float(value) if value.is_infinite() && value.is_sign_positive() => None,
            RawBound::Float(value)
                if value.fract() == 0.0 && value.abs() <= i64::MAX as f64 =>
            {
                Some(*value as i64)
            }
            RawBound::Float(value) => return Err(invalid(value.to_string())),
            RawBound::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "inf" | "+inf" | "infinity" | "+infinity" | ".inf" | "∞" => None,
                _ => return Err(invalid(text.clone())),
            },
        };

        Interval::with_bounds(raw.tmin, tmax)
    }
}

impl From<Interval> for RawInterval {
    fn from(interval: Interval) -> Self {
        Self {
            tmin: interval.tmin,
            tmax: match interval.tmax {
                Some(max) => RawBound::Int(max),
                None => RawBound::Text("inf".to_string()),
            },
        }
    }
}
