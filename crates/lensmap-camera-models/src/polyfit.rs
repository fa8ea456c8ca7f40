//! Univariate polynomials and weighted least-squares fitting.
//!
//! Fits are solved on a scaled variable `t = x / domain_max` so that high
//! degree fits stay well conditioned. Design-matrix columns are additionally
//! normalised before the SVD solve and the solution is rescaled afterwards.
//!
//! # Mathematical Model
//!
//! ```text
//! p(x) = Σᵢ cᵢ · (x / s)ⁱ
//! ```
//!
//! where `s` is the domain scale chosen at fit time.

use crate::CameraModelError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Imaginary parts below this count as real roots.
const REAL_ROOT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    coefficients: Vec<f64>,
    scale: f64,
}

impl Polynomial {
    /// Polynomial in the plain variable, lowest degree first.
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self {
            coefficients,
            scale: 1.0,
        }
    }

    /// Polynomial in `x / scale`, lowest degree first.
    pub fn with_scale(coefficients: Vec<f64>, scale: f64) -> Result<Self, CameraModelError> {
        crate::require_positive("polynomial domain scale", scale)?;
        Ok(Self {
            coefficients,
            scale,
        })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let t = x / self.scale;
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * t + c)
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Coefficients of the scaled variable, lowest degree first.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Coefficients in the plain variable `x`, lowest degree first.
    pub fn monomial_coefficients(&self) -> Vec<f64> {
        let mut factor = 1.0;
        self.coefficients
            .iter()
            .map(|c| {
                let value = c / factor;
                factor *= self.scale;
                value
            })
            .collect()
    }

    pub fn derivative(&self) -> Polynomial {
        let coefficients = self
            .coefficients
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, c)| i as f64 * c / self.scale)
            .collect();
        Polynomial {
            coefficients,
            scale: self.scale,
        }
    }

    /// Real roots in the plain variable.
    pub fn real_roots(&self) -> Result<Vec<f64>, CameraModelError> {
        real_roots(&self.monomial_coefficients())
    }
}

/// Diagnostics of a least-squares fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    /// Sum of squared (weighted) residuals.
    pub residuals: f64,
    pub rank: usize,
    pub singular_values: Vec<f64>,
    /// Relative cutoff applied to the singular values.
    pub rcond: f64,
}

/// Builder for a weighted least-squares polynomial fit.
#[derive(Debug, Clone)]
pub struct PolyFit<'a> {
    degree: usize,
    weights: Option<&'a [f64]>,
    domain_max: Option<f64>,
    zero_constant: bool,
}

impl<'a> PolyFit<'a> {
    pub fn new(degree: usize) -> Self {
        Self {
            degree,
            weights: None,
            domain_max: None,
            zero_constant: false,
        }
    }

    pub fn with_weights(mut self, weights: &'a [f64]) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Upper end of the sample domain, mapped to `t = 1`.
    pub fn with_domain_max(mut self, domain_max: f64) -> Self {
        self.domain_max = Some(domain_max);
        self
    }

    /// Pins the constant term to zero.
    pub fn without_constant(mut self) -> Self {
        self.zero_constant = true;
        self
    }

    /// Fits `y ≈ p(x)`.
    ///
    /// # Returns
    ///
    /// The fitted polynomial and its [`FitQuality`].
    pub fn fit(&self, x: &[f64], y: &[f64]) -> Result<(Polynomial, FitQuality), CameraModelError> {
        if x.len() != y.len() {
            return Err(CameraModelError::InvalidParams(format!(
                "sample count mismatch: {} x values, {} y values",
                x.len(),
                y.len()
            )));
        }
        if let Some(w) = self.weights
            && w.len() != x.len()
        {
            return Err(CameraModelError::InvalidParams(format!(
                "weight count {} does not match sample count {}",
                w.len(),
                x.len()
            )));
        }

        let first = usize::from(self.zero_constant);
        let n_cols = self.degree + 1 - first;
        let n_rows = x.len();
        if n_cols == 0 || n_rows < n_cols {
            return Err(CameraModelError::InvalidParams(format!(
                "degree {} fit needs at least {n_cols} samples, got {n_rows}",
                self.degree
            )));
        }

        let scale = match self.domain_max {
            Some(s) => s,
            None => x.iter().fold(0.0_f64, |m, v| m.max(v.abs())),
        };
        crate::require_positive("fit domain", scale)?;

        let mut a = DMatrix::<f64>::zeros(n_rows, n_cols);
        let mut b = DVector::<f64>::zeros(n_rows);
        for (i, (&xi, &yi)) in x.iter().zip(y).enumerate() {
            let w = self.weights.map_or(1.0, |w| w[i]);
            let t = xi / scale;
            let mut power = t.powi(first as i32);
            for j in 0..n_cols {
                a[(i, j)] = w * power;
                power *= t;
            }
            b[i] = w * yi;
        }

        let column_norms: Vec<f64> = (0..n_cols)
            .map(|j| {
                let norm = a.column(j).norm();
                if norm > 0.0 { norm } else { 1.0 }
            })
            .collect();
        for (j, norm) in column_norms.iter().enumerate() {
            a.column_mut(j).unscale_mut(*norm);
        }

        let rcond = n_rows as f64 * f64::EPSILON;
        let svd = a.clone().svd(true, true);
        let cutoff = rcond * svd.singular_values.max();
        let rank = svd.rank(cutoff);
        let solution = svd
            .solve(&b, cutoff)
            .map_err(|e| CameraModelError::NumericalError(e.to_string()))?;

        let residuals = (&a * &solution - &b).norm_squared();
        let mut coefficients = vec![0.0; self.degree + 1];
        for j in 0..n_cols {
            coefficients[j + first] = solution[j] / column_norms[j];
        }
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(CameraModelError::NumericalError(
                "polynomial fit produced non-finite coefficients".to_string(),
            ));
        }

        let quality = FitQuality {
            residuals,
            rank,
            singular_values: svd.singular_values.iter().copied().collect(),
            rcond,
        };
        Ok((Polynomial::with_scale(coefficients, scale)?, quality))
    }
}

/// Real roots of a polynomial given in monomial form, lowest degree first.
///
/// Roots are the eigenvalues of the companion matrix.
pub fn real_roots(coefficients: &[f64]) -> Result<Vec<f64>, CameraModelError> {
    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(CameraModelError::NumericalError(
            "polynomial has non-finite coefficients".to_string(),
        ));
    }
    let Some(top) = coefficients.iter().rposition(|c| *c != 0.0) else {
        return Ok(Vec::new());
    };
    let coefficients = &coefficients[..=top];
    let degree = coefficients.len() - 1;
    match degree {
        0 => Ok(Vec::new()),
        1 => Ok(vec![-coefficients[0] / coefficients[1]]),
        _ => {
            let lead = coefficients[degree];
            let mut companion = DMatrix::<f64>::zeros(degree, degree);
            for i in 1..degree {
                companion[(i, i - 1)] = 1.0;
            }
            for i in 0..degree {
                companion[(i, degree - 1)] = -coefficients[i] / lead;
            }
            let mut roots: Vec<f64> = companion
                .complex_eigenvalues()
                .iter()
                .filter(|z| z.im.abs() <= REAL_ROOT_TOLERANCE * z.re.abs().max(1.0))
                .map(|z| z.re)
                .collect();
            roots.sort_by(f64::total_cmp);
            Ok(roots)
        }
    }
}
