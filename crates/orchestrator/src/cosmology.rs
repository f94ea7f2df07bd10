//! Power-spectrum and growth-factor providers.
//!
//! The engine treats both as opaque pure functions; the real solvers
//! (Boltzmann codes, growth ODE integrators) live outside this crate. What is
//! provided here is the trait boundary plus the two spectrum forms runs
//! actually use: an analytic power law for tests and a tabulated spectrum for
//! tables produced by external tools.

use kernel::{MeshError, MeshResult};

/// Linear matter power spectrum `P(k)`, evaluated at physical wavenumbers.
pub trait PowerSpectrum: Send + Sync {
    /// Power at wavenumber `k` (h/Mpc). Must be non-negative for `k > 0`.
    fn eval(&self, k: f32) -> f32;
}

/// Linear growth factor `D(a)`.
pub trait GrowthFactor {
    /// Growth factor at expansion scale factor `a`.
    fn eval(&self, a: f32) -> f32;
}

/// Analytic power law `P(k) = amplitude * k^index`.
#[derive(Debug, Clone, Copy)]
pub struct PowerLawSpectrum {
    /// Normalization.
    pub amplitude: f32,
    /// Spectral index.
    pub index: f32,
}

impl PowerSpectrum for PowerLawSpectrum {
    fn eval(&self, k: f32) -> f32 {
        self.amplitude * k.powf(self.index)
    }
}

/// Tabulated spectrum with log-log linear interpolation between samples.
///
/// Evaluation outside the tabulated range clamps to the endpoint values.
#[derive(Debug, Clone)]
pub struct TabulatedPowerSpectrum {
    log_k: Vec<f32>,
    log_p: Vec<f32>,
}

impl TabulatedPowerSpectrum {
    /// Build from `(k, P)` samples, which must be positive and sorted by `k`.
    pub fn new(samples: &[(f32, f32)]) -> MeshResult<Self> {
        if samples.len() < 2 {
            return Err(MeshError::Config(
                "tabulated power spectrum needs at least two samples".into(),
            ));
        }
        let mut log_k = Vec::with_capacity(samples.len());
        let mut log_p = Vec::with_capacity(samples.len());
        for &(k, p) in samples {
            if k <= 0.0 || p <= 0.0 {
                return Err(MeshError::Config(format!(
                    "power spectrum samples must be positive, got ({}, {})",
                    k, p
                )));
            }
            if let Some(&prev) = log_k.last() {
                if k.ln() <= prev {
                    return Err(MeshError::Config(
                        "power spectrum samples must be strictly increasing in k".into(),
                    ));
                }
            }
            log_k.push(k.ln());
            log_p.push(p.ln());
        }
        Ok(Self { log_k, log_p })
    }
}

impl PowerSpectrum for TabulatedPowerSpectrum {
    fn eval(&self, k: f32) -> f32 {
        let lk = k.ln();
        let n = self.log_k.len();
        if lk <= self.log_k[0] {
            return self.log_p[0].exp();
        }
        if lk >= self.log_k[n - 1] {
            return self.log_p[n - 1].exp();
        }
        let hi = self.log_k.partition_point(|&v| v < lk).max(1);
        let lo = hi - 1;
        let t = (lk - self.log_k[lo]) / (self.log_k[hi] - self.log_k[lo]);
        (self.log_p[lo] + t * (self.log_p[hi] - self.log_p[lo])).exp()
    }
}

/// Matter-domination growth, `D(a) = a`.
///
/// Stands in for a full growth-ODE solver; adequate for validation runs where
/// only the linear scaling of the displacement matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearGrowth;

impl GrowthFactor for LinearGrowth {
    fn eval(&self, a: f32) -> f32 {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_law_evaluates() {
        let p = PowerLawSpectrum { amplitude: 2.0, index: -1.0 };
        assert!((p.eval(0.5) - 4.0).abs() < 1e-6);
        assert!((p.eval(2.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn tabulated_interpolates_power_laws_exactly() {
        // Samples on P = k^-2 lie on a line in log-log space, so linear
        // interpolation there reproduces the law exactly.
        let samples: Vec<(f32, f32)> =
            [0.01_f32, 0.1, 1.0, 10.0].iter().map(|&k| (k, k.powi(-2))).collect();
        let table = TabulatedPowerSpectrum::new(&samples).unwrap();
        for &k in &[0.02_f32, 0.3, 2.5] {
            let want = k.powi(-2);
            let got = table.eval(k);
            assert!(
                (got - want).abs() / want < 1e-4,
                "P({}) = {}, want {}",
                k, got, want
            );
        }
    }

    #[test]
    fn tabulated_clamps_outside_range() {
        let table =
            TabulatedPowerSpectrum::new(&[(0.1, 5.0), (1.0, 2.0)]).unwrap();
        assert!((table.eval(0.001) - 5.0).abs() < 1e-5);
        assert!((table.eval(100.0) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn tabulated_rejects_bad_samples() {
        assert!(TabulatedPowerSpectrum::new(&[(0.1, 1.0)]).is_err());
        assert!(TabulatedPowerSpectrum::new(&[(0.1, 1.0), (0.1, 2.0)]).is_err());
        assert!(TabulatedPowerSpectrum::new(&[(0.1, 1.0), (1.0, -2.0)]).is_err());
    }

    #[test]
    fn linear_growth_is_identity() {
        let g = LinearGrowth;
        assert_eq!(g.eval(0.0), 0.0);
        assert_eq!(g.eval(0.5), 0.5);
        assert_eq!(g.eval(1.0), 1.0);
    }
}
