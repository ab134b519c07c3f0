//! Peak characterization of scan data.
//!
//! [`fit`] takes the X and Y columns of a finished scan and returns:
//!
//! - peak, peak position, minimum and minimum position, read directly from
//!   the data;
//! - center of mass, `sum(x*y) / sum(y)`;
//! - FWHM and FWHM position (the fitted center) from a Gaussian on a linear
//!   background, fitted by Levenberg-Marquardt;
//! - the fitted curve sampled at X and the fit parameters.
//!
//! Invalid input is an error. A Gaussian fit that does not converge still
//! yields the data statistics, with `fit_result` empty and `fit_error` set.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_ITERATIONS: usize = 200;
const PARAMS: usize = 5;
/// FWHM = 2 * sqrt(2 ln 2) * sigma.
const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949;

/// Errors raised by the fitting post-processor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// No data points.
    #[error("no data to fit")]
    Empty,
    /// X and Y differ in length.
    #[error("x has {x} points but y has {y}")]
    LengthMismatch {
        /// X length.
        x: usize,
        /// Y length.
        y: usize,
    },
    /// NaN or infinite sample.
    #[error("non-finite value at index {0}")]
    NonFinite(usize),
    /// Not enough points for the model.
    #[error("need at least {needed} points for a gaussian fit, got {got}")]
    TooFewPoints {
        /// Required count.
        needed: usize,
        /// Available count.
        got: usize,
    },
    /// Normal equations could not be solved.
    #[error("singular fit")]
    Singular,
    /// Iteration limit reached without convergence.
    #[error("fit did not converge after {0} iterations")]
    NoConvergence(usize),
}

/// Parameters of `amplitude * exp(-(x - center)^2 / (2 sigma^2)) + slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianFit {
    /// Peak height above background.
    pub amplitude: f64,
    /// Peak center.
    pub center: f64,
    /// Standard deviation.
    pub sigma: f64,
    /// Background slope.
    pub slope: f64,
    /// Background intercept.
    pub intercept: f64,
    /// Sum of squared residuals.
    pub chi_squared: f64,
    /// Iterations used.
    pub iterations: usize,
}

impl GaussianFit {
    fn from_params(p: &[f64; PARAMS], chi_squared: f64, iterations: usize) -> Self {
        Self {
            amplitude: p[0],
            center: p[1],
            sigma: p[2].abs(),
            slope: p[3],
            intercept: p[4],
            chi_squared,
            iterations,
        }
    }

    /// Full width at half maximum.
    pub fn fwhm(&self) -> f64 {
        FWHM_PER_SIGMA * self.sigma
    }

    /// Model value at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        model(
            &[
                self.amplitude,
                self.center,
                self.sigma,
                self.slope,
                self.intercept,
            ],
            x,
        )
    }
}

/// Everything the post-processor stores back into the result table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOutcome {
    /// Maximum Y.
    pub peak: f64,
    /// X at maximum Y.
    pub peak_at: f64,
    /// Minimum Y.
    pub min: f64,
    /// X at minimum Y.
    pub min_at: f64,
    /// Center of mass; NaN when the Y values sum to zero.
    pub com: f64,
    /// Fitted FWHM, 0 when the fit failed.
    pub fwhm: f64,
    /// Fitted center, `peak_at` when the fit failed.
    pub fwhm_at: f64,
    /// Model sampled at each X; empty when the fit failed.
    pub fitted_curve: Vec<f64>,
    /// Fit parameters.
    pub fit_result: Option<GaussianFit>,
    /// Why the gaussian fit failed, if it did.
    pub fit_error: Option<String>,
}

/// Characterize the peak in `y` over `x`.
pub fn fit(x: &[f64], y: &[f64]) -> Result<FitOutcome, FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if x.is_empty() {
        return Err(FitError::Empty);
    }
    if let Some(i) = (0..x.len()).find(|&i| !x[i].is_finite() || !y[i].is_finite()) {
        return Err(FitError::NonFinite(i));
    }

    let (mut imax, mut imin) = (0, 0);
    for i in 1..y.len() {
        if y[i] > y[imax] {
            imax = i;
        }
        if y[i] < y[imin] {
            imin = i;
        }
    }
    let total: f64 = y.iter().sum();
    let com = if total == 0.0 {
        f64::NAN
    } else {
        x.iter().zip(y).map(|(xi, yi)| xi * yi).sum::<f64>() / total
    };

    let mut outcome = FitOutcome {
        peak: y[imax],
        peak_at: x[imax],
        min: y[imin],
        min_at: x[imin],
        com,
        fwhm: 0.0,
        fwhm_at: x[imax],
        fitted_curve: Vec::new(),
        fit_result: None,
        fit_error: None,
    };

    match fit_gaussian(x, y, imax, imin) {
        Ok(gauss) => {
            outcome.fwhm = gauss.fwhm();
            outcome.fwhm_at = gauss.center;
            outcome.fitted_curve = x.iter().map(|&xi| gauss.eval(xi)).collect();
            outcome.fit_result = Some(gauss);
        }
        Err(e) => outcome.fit_error = Some(e.to_string()),
    }
    Ok(outcome)
}

fn model(p: &[f64; PARAMS], x: f64) -> f64 {
    let d = x - p[1];
    p[0] * (-d * d / (2.0 * p[2] * p[2])).exp() + p[3] * x + p[4]
}

fn chi_squared(p: &[f64; PARAMS], x: &[f64], y: &[f64]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let r = yi - model(p, xi);
            r * r
        })
        .sum()
}

fn initial_guess(x: &[f64], y: &[f64], imax: usize, imin: usize) -> [f64; PARAMS] {
    let background = y[imin];
    let amplitude = y[imax] - background;
    let half = background + amplitude / 2.0;

    let mut left = imax;
    while left > 0 && y[left] > half {
        left -= 1;
    }
    let mut right = imax;
    while right + 1 < y.len() && y[right] > half {
        right += 1;
    }
    let span = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        - x.iter().cloned().fold(f64::INFINITY, f64::min);
    let mut width = (x[right] - x[left]).abs();
    if width <= 0.0 {
        width = span / 4.0;
    }
    let sigma = if width > 0.0 { width / FWHM_PER_SIGMA } else { 1.0 };
    [amplitude, x[imax], sigma, 0.0, background]
}

fn jacobian_row(p: &[f64; PARAMS], x: f64) -> [f64; PARAMS] {
    let d = x - p[1];
    let s2 = p[2] * p[2];
    let e = (-d * d / (2.0 * s2)).exp();
    [e, p[0] * e * d / s2, p[0] * e * d * d / (s2 * p[2]), x, 1.0]
}

fn fit_gaussian(x: &[f64], y: &[f64], imax: usize, imin: usize) -> Result<GaussianFit, FitError> {
    if x.len() < PARAMS {
        return Err(FitError::TooFewPoints {
            needed: PARAMS,
            got: x.len(),
        });
    }

    let mut p = initial_guess(x, y, imax, imin);
    let mut chi2 = chi_squared(&p, x, y);
    let mut lambda = 1e-3;

    for iteration in 1..=MAX_ITERATIONS {
        let mut jtj = [[0.0; PARAMS]; PARAMS];
        let mut jtr = [0.0; PARAMS];
        for (&xi, &yi) in x.iter().zip(y) {
            let row = jacobian_row(&p, xi);
            let r = yi - model(&p, xi);
            for a in 0..PARAMS {
                jtr[a] += row[a] * r;
                for b in 0..PARAMS {
                    jtj[a][b] += row[a] * row[b];
                }
            }
        }

        loop {
            let mut lhs = jtj;
            for (k, row) in lhs.iter_mut().enumerate() {
                row[k] += lambda * jtj[k][k].max(1e-12);
            }
            let step = solve(lhs, jtr).ok_or(FitError::Singular)?;
            let mut trial = p;
            for k in 0..PARAMS {
                trial[k] += step[k];
            }
            let trial_chi2 = chi_squared(&trial, x, y);

            if trial_chi2.is_finite() && trial_chi2 <= chi2 && trial[2].abs() > f64::EPSILON {
                let improvement = chi2 - trial_chi2;
                p = trial;
                chi2 = trial_chi2;
                lambda = (lambda / 10.0).max(1e-12);
                if improvement <= 1e-12 * chi2.max(f64::MIN_POSITIVE) || chi2 < 1e-24 {
                    return Ok(GaussianFit::from_params(&p, chi2, iteration));
                }
                break;
            }

            lambda *= 10.0;
            if lambda > 1e12 {
                // No direction improves chi-square: at a minimum.
                return Ok(GaussianFit::from_params(&p, chi2, iteration));
            }
        }
    }
    Err(FitError::NoConvergence(MAX_ITERATIONS))
}

/// Solve `a * v = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: [[f64; PARAMS]; PARAMS], mut b: [f64; PARAMS]) -> Option<[f64; PARAMS]> {
    for col in 0..PARAMS {
        let pivot = (col..PARAMS).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 || !a[pivot][col].is_finite() {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..PARAMS {
            let factor = a[row][col] / a[col][col];
            for k in col..PARAMS {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut v = [0.0; PARAMS];
    for row in (0..PARAMS).rev() {
        let tail: f64 = (row + 1..PARAMS).map(|k| a[row][k] * v[k]).sum();
        v[row] = (b[row] - tail) / a[row][row];
    }
    Some(v)
}
