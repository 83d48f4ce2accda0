//! Standard test integrands for Monte Carlo integration over the unit hypercube.
use crate::integrand::Integrand;

use libm::erf;
use std::f64::consts::PI;

/// Returns the parameters for the Genz test functions.
fn genz_params(dim: usize) -> (Vec<f64>, Vec<f64>) {
    let mut c = Vec::with_capacity(dim);
    let mut w = Vec::with_capacity(dim);
    for i in 1..=dim {
        c.push(((i as f64).sqrt() * 12345.).fract());
        w.push(((i as f64).sqrt() * 54321.).fract());
    }
    (c, w)
}

// Genz Oscillatory
#[derive(Clone)]
pub struct GenzOscillatory {
    dim: usize,
    c: Vec<f64>,
    w: Vec<f64>,
}

impl GenzOscillatory {
    pub fn new(dim: usize) -> Self {
        let (c, w) = genz_params(dim);
        Self { dim, c, w }
    }

    /// Frequency `c` and phase `w`, shared by every dimension.
    pub fn with_params(dim: usize, c: f64, w: f64) -> Self {
        Self {
            dim,
            c: vec![c; dim],
            w: vec![w; dim],
        }
    }

    /// Real part of the product of the one-dimensional integrals of
    /// `exp(i c (x - w))`.
    pub fn analytical_result(&self) -> f64 {
        let (re, _) = self
            .c
            .iter()
            .zip(&self.w)
            .fold((1.0, 0.0), |(re, im), (&c, &w)| {
                let (a, b) = (c * (1. - w), c * w);
                let f_re = (a.sin() + b.sin()) / c;
                let f_im = (b.cos() - a.cos()) / c;
                (re * f_re - im * f_im, re * f_im + im * f_re)
            });
        re
    }
}

impl Integrand for GenzOscillatory {
    fn dim(&self) -> usize {
        self.dim
    }

    fn eval(&self, x: &[f64]) -> f64 {
        let mut sum = 0.;
        for i in 0..self.dim {
            sum += self.c[i] * (x[i] - self.w[i]);
        }
        sum.cos()
    }
}

// Genz Product Peak
#[derive(Clone)]
pub struct GenzProductPeak {
    dim: usize,
    c: Vec<f64>,
    w: Vec<f64>,
}

impl GenzProductPeak {
    pub fn new(dim: usize) -> Self {
        let (c, w) = genz_params(dim);
        Self { dim, c, w }
    }

    /// Peak sharpness `c` and position `w`, shared by every dimension.
    pub fn with_params(dim: usize, c: f64, w: f64) -> Self {
        Self {
            dim,
            c: vec![c; dim],
            w: vec![w; dim],
        }
    }

    pub fn analytical_result(&self) -> f64 {
        self.c
            .iter()
            .zip(&self.w)
            .map(|(&c, &w)| c * ((c * (1. - w)).atan() + (c * w).atan()))
            .product()
    }
}

impl Integrand for GenzProductPeak {
    fn dim(&self) -> usize {
        self.dim
    }

    fn eval(&self, x: &[f64]) -> f64 {
        let mut result = 1.0;
        for i in 0..self.dim {
            result *= 1.0 / (self.c[i].powi(-2) + (x[i] - self.w[i]).powi(2));
        }
        result
    }
}

// Genz Gaussian
#[derive(Clone)]
pub struct GenzGaussian {
    dim: usize,
    c: Vec<f64>,
    w: Vec<f64>,
}

impl GenzGaussian {
    pub fn new(dim: usize) -> Self {
        let (c, w) = genz_params(dim);
        Self { dim, c, w }
    }

    /// Width parameter `c` and centre `w`, shared by every dimension.
    pub fn with_params(dim: usize, c: f64, w: f64) -> Self {
        Self {
            dim,
            c: vec![c; dim],
            w: vec![w; dim],
        }
    }

    pub fn analytical_result(&self) -> f64 {
        self.c
            .iter()
            .zip(&self.w)
            .map(|(&c, &w)| (PI.sqrt() / (2. * c)) * (erf(c * (1. - w)) + erf(c * w)))
            .product()
    }
}

impl Integrand for GenzGaussian {
    fn dim(&self) -> usize {
        self.dim
    }

    fn eval(&self, x: &[f64]) -> f64 {
        let mut sum = 0.0;
        for i in 0..self.dim {
            sum += self.c[i].powi(2) * (x[i] - self.w[i]).powi(2);
        }
        (-sum).exp()
    }
}

// Endpoint Singularity
#[derive(Clone)]
pub struct EndpointSingularity {
    dim: usize,
}

impl EndpointSingularity {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn analytical_result(&self) -> f64 {
        2.0f64.powi(self.dim as i32)
    }
}

impl Integrand for EndpointSingularity {
    fn dim(&self) -> usize {
        self.dim
    }

    fn eval(&self, x: &[f64]) -> f64 {
        let mut result = 1.0;
        for &val in x {
            if val <= 0.0 {
                return 0.0;
            }
            result *= val.powf(-0.5);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Midpoint rule in one dimension.
    fn midpoint<F: Integrand>(f: &F, n: usize) -> f64 {
        (0..n)
            .map(|i| f.eval(&[(i as f64 + 0.5) / n as f64]))
            .sum::<f64>()
            / n as f64
    }

    #[test]
    fn test_gaussian_analytical_result() {
        let f = GenzGaussian::with_params(1, 5.0, 0.3);
        assert_relative_eq!(f.analytical_result(), midpoint(&f, 100_000), epsilon = 1e-8);
    }

    #[test]
    fn test_oscillatory_analytical_result() {
        let f = GenzOscillatory::with_params(2, 4.0, 0.25);
        let n = 1000;
        let mut sum = 0.0;
        for i in 0..n {
            for j in 0..n {
                let x = [(i as f64 + 0.5) / n as f64, (j as f64 + 0.5) / n as f64];
                sum += f.eval(&x);
            }
        }
        assert_relative_eq!(f.analytical_result(), sum / (n * n) as f64, epsilon = 1e-5);
    }

    #[test]
    fn test_product_peak_analytical_result() {
        let f = GenzProductPeak::with_params(1, 10.0, 0.6);
        assert_relative_eq!(f.analytical_result(), midpoint(&f, 100_000), epsilon = 1e-6);
    }
}
