//! Trajectories: which targets each point moves to.
//!
//! - `Scan`: every device steps in lockstep; all point lists have equal length
//! - `Mesh`: outer product of the point lists, last device varying fastest
//! - `Time`: no device moves; points until a repeat or duration limit

use scan_core::{ScanError, ScanResult};
use std::time::Duration;

/// Points for one scannable participant.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanParam {
    mnemonic: String,
    points: Vec<f64>,
}

impl ScanParam {
    /// `steps + 1` evenly spaced points from `start` to `end` inclusive.
    pub fn linear(mnemonic: impl Into<String>, start: f64, end: f64, steps: usize) -> ScanResult<Self> {
        let mnemonic = mnemonic.into();
        if steps < 1 {
            return Err(ScanError::Configuration(format!(
                "'{mnemonic}': at least one step is needed to create scan points"
            )));
        }
        if !start.is_finite() || !end.is_finite() {
            return Err(ScanError::Configuration(format!(
                "'{mnemonic}': scan range must be finite"
            )));
        }
        let diff = (end - start) / steps as f64;
        let points = (0..=steps).map(|i| start + diff * i as f64).collect();
        Ok(Self { mnemonic, points })
    }

    /// Explicit point list.
    pub fn points(mnemonic: impl Into<String>, points: Vec<f64>) -> ScanResult<Self> {
        let mnemonic = mnemonic.into();
        if points.is_empty() {
            return Err(ScanError::Configuration(format!(
                "'{mnemonic}': point list is empty"
            )));
        }
        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            return Err(ScanError::Configuration(format!(
                "'{mnemonic}': point {bad} is not finite"
            )));
        }
        Ok(Self { mnemonic, points })
    }

    /// Device mnemonic.
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// Target list.
    pub fn targets(&self) -> &[f64] {
        &self.points
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for a constructed param.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest and largest target.
    pub fn bounds(&self) -> (f64, f64) {
        self.points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &p| (lo.min(p), hi.max(p)))
    }
}

/// Mesh iteration options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshOptions {
    /// Reverse the innermost device on every other outer row.
    pub snake: bool,
}

/// Stop conditions for a time scan; the first one reached wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeLimits {
    /// Maximum number of points.
    pub repeat: Option<usize>,
    /// Maximum time since scan start; checked before each point.
    pub duration: Option<Duration>,
}

/// Scan flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Lockstep.
    Scan,
    /// Outer product.
    Mesh(MeshOptions),
    /// No moves.
    Time(TimeLimits),
}

impl ScanMode {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ScanMode::Scan => "scan",
            ScanMode::Mesh(_) => "mesh",
            ScanMode::Time(_) => "timescan",
        }
    }
}

/// A scalar applied to every point, or one value per point.
#[derive(Debug, Clone, PartialEq)]
pub enum PerPoint {
    /// Same value everywhere.
    Scalar(f64),
    /// One value per point.
    Values(Vec<f64>),
}

impl PerPoint {
    /// Value for point `index`.
    pub fn at(&self, index: usize) -> Option<f64> {
        match self {
            PerPoint::Scalar(v) => Some(*v),
            PerPoint::Values(values) => values.get(index).copied(),
        }
    }

    /// Check a per-point list against the number of points.
    ///
    /// `points` is `None` for an unbounded time scan, which only accepts a
    /// scalar.
    pub fn validate(&self, what: &str, points: Option<usize>) -> ScanResult<()> {
        let values = match self {
            PerPoint::Scalar(v) => std::slice::from_ref(v),
            PerPoint::Values(values) => {
                match points {
                    Some(n) if n == values.len() => {}
                    Some(n) => {
                        return Err(ScanError::Configuration(format!(
                            "{what} has {} values for {n} points",
                            values.len()
                        )))
                    }
                    None => {
                        return Err(ScanError::Configuration(format!(
                            "per-point {what} needs a bounded number of points"
                        )))
                    }
                }
                values.as_slice()
            }
        };
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ScanError::Configuration(format!("{what} must be finite")));
        }
        if let Some(bad) = values
            .iter()
            .find(|v| Duration::try_from_secs_f64(v.abs()).is_err())
        {
            return Err(ScanError::Configuration(format!(
                "{what} of {bad} s is too long"
            )));
        }
        Ok(())
    }

    /// True when any point is negative.
    pub fn any_negative(&self) -> bool {
        match self {
            PerPoint::Scalar(v) => *v < 0.0,
            PerPoint::Values(values) => values.iter().any(|v| *v < 0.0),
        }
    }
}

impl From<f64> for PerPoint {
    fn from(value: f64) -> Self {
        PerPoint::Scalar(value)
    }
}

impl From<Vec<f64>> for PerPoint {
    fn from(values: Vec<f64>) -> Self {
        PerPoint::Values(values)
    }
}

impl Default for PerPoint {
    fn default() -> Self {
        PerPoint::Scalar(0.0)
    }
}

/// Resolved target sequence of one scan.
#[derive(Debug, Clone)]
pub struct Trajectory {
    mode: ScanMode,
    params: Vec<ScanParam>,
    /// Product of the step counts of the devices after each one.
    strides: Vec<usize>,
    len: Option<usize>,
}

impl Trajectory {
    /// Validate `params` for `mode`.
    pub fn new(mode: ScanMode, params: Vec<ScanParam>) -> ScanResult<Self> {
        let len = match mode {
            ScanMode::Scan => {
                let first = params.first().ok_or_else(|| {
                    ScanError::Configuration("a scan needs at least one device".into())
                })?;
                if let Some(other) = params.iter().find(|p| p.len() != first.len()) {
                    return Err(ScanError::Configuration(format!(
                        "trajectory lengths differ: '{}' has {} points, '{}' has {}",
                        first.mnemonic,
                        first.len(),
                        other.mnemonic,
                        other.len()
                    )));
                }
                Some(first.len())
            }
            ScanMode::Mesh(_) => {
                if params.is_empty() {
                    return Err(ScanError::Configuration(
                        "a mesh needs at least one device".into(),
                    ));
                }
                let total = params
                    .iter()
                    .try_fold(1usize, |acc, p| acc.checked_mul(p.len()))
                    .ok_or_else(|| ScanError::Configuration("mesh is too large".into()))?;
                Some(total)
            }
            ScanMode::Time(limits) => {
                if !params.is_empty() {
                    return Err(ScanError::Configuration(
                        "a time scan does not move devices".into(),
                    ));
                }
                limits.repeat
            }
        };

        let mut strides = vec![1; params.len()];
        for i in (0..params.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * params[i + 1].len();
        }

        Ok(Self {
            mode,
            params,
            strides,
            len,
        })
    }

    /// Scan flavor.
    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Participating scannables.
    pub fn params(&self) -> &[ScanParam] {
        &self.params
    }

    /// Number of points; `None` for a time scan without a repeat limit.
    pub fn len(&self) -> Option<usize> {
        self.len
    }

    /// Whether the trajectory has no points.
    pub fn is_empty(&self) -> bool {
        self.len == Some(0)
    }

    /// Targets of point `index`, one per param. Empty for time scans.
    pub fn targets(&self, index: usize) -> Option<Vec<f64>> {
        if self.len.is_some_and(|n| index >= n) {
            return None;
        }
        match self.mode {
            ScanMode::Scan => Some(self.params.iter().map(|p| p.points[index]).collect()),
            ScanMode::Mesh(options) => {
                let last = self.params.len() - 1;
                let targets = self
                    .params
                    .iter()
                    .enumerate()
                    .map(|(d, p)| {
                        let mut i = (index / self.strides[d]) % p.len();
                        if options.snake && d == last && d > 0 && (index / p.len()) % 2 == 1 {
                            i = p.len() - 1 - i;
                        }
                        p.points[i]
                    })
                    .collect();
                Some(targets)
            }
            ScanMode::Time(_) => Some(Vec::new()),
        }
    }
}
