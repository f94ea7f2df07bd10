//! Fourier-space wavevectors and differential-operator kernels.
//!
//! All kernels are pure functions of the global grid shape: each worker
//! computes the local block of every kernel directly from global indices,
//! so no communication is ever needed to build or apply them. Kernels live
//! in the X-pencil layout, the layout spectral fields come out of the
//! forward transform in.

use std::collections::HashMap;
use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;

use crate::error::MeshResult;
use crate::field::ComplexField;
use crate::grid::{GridShape, PencilStage, ProcessorGrid, WorkerCoord};

/// Discrete wavevector for an axis of length `n`, in cell units:
/// `k(i) = 2*pi*m/n` with `m = i` for `i < n/2` and the mirrored negative
/// frequency `m = i - n` beyond (the standard DFT ordering).
pub fn wavevector(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let m = if i < n.div_ceil(2) {
                i as f32
            } else {
                i as f32 - n as f32
            };
            2.0 * PI * m / n as f32
        })
        .collect()
}

/// Finite-difference-corrected gradient coefficient.
///
/// This is the four-point centered stencil `(8*sin(k) - sin(2k)) / 6` rather
/// than the naive `k`; the two differ at the percent level near the Nyquist
/// frequency, and the stencil form is what the displacement results are
/// defined against. The full kernel is `i` times this value.
#[inline]
pub fn gradient_coefficient(k: f32) -> f32 {
    (8.0 * k.sin() - (2.0 * k).sin()) / 6.0
}

/// The derived Fourier-space operators for one grid shape: one gradient
/// kernel per axis plus the inverse-Laplace kernel.
///
/// The inverse Laplacian is `-1 / (kx^2 + ky^2 + kz^2)` with the zero-
/// frequency mode mapped to exactly zero, so the DC mode never contributes
/// displacement and no division by zero can occur downstream.
pub struct KernelSet {
    /// Gradient kernels for x, y, z (pure imaginary).
    pub gradient: [ComplexField; 3],
    /// Inverse-Laplace kernel (real-valued coefficients).
    pub laplace: ComplexField,
}

impl KernelSet {
    /// Compute the local kernel blocks for one worker.
    pub fn build(
        shape: GridShape,
        grid: ProcessorGrid,
        coord: WorkerCoord,
    ) -> MeshResult<Self> {
        let stage = PencilStage::XPencil;
        let kx = wavevector(shape.nx);
        let ky = wavevector(shape.ny);
        let kz = wavevector(shape.nz);

        let mut gradient = [
            ComplexField::zeros(shape, 1, stage, grid, coord)?,
            ComplexField::zeros(shape, 1, stage, grid, coord)?,
            ComplexField::zeros(shape, 1, stage, grid, coord)?,
        ];
        let mut laplace = ComplexField::zeros(shape, 1, stage, grid, coord)?;

        let (d1, d2, d3) = stage.local_dims(shape, grid);
        for i1 in 0..d1 {
            for i2 in 0..d2 {
                for i3 in 0..d3 {
                    let (gx, gy, gz) = stage.global_of(shape, grid, coord, i1, i2, i3);
                    let k = [kx[gx], ky[gy], kz[gz]];
                    let idx = laplace.index(0, i1, i2, i3);
                    for axis in 0..3 {
                        gradient[axis].data[idx] =
                            Complex::new(0.0, gradient_coefficient(k[axis]));
                    }
                    let kk = k[0] * k[0] + k[1] * k[1] + k[2] * k[2];
                    laplace.data[idx] = if kk == 0.0 {
                        Complex::new(0.0, 0.0)
                    } else {
                        Complex::new(-1.0 / kk, 0.0)
                    };
                }
            }
        }

        Ok(Self { gradient, laplace })
    }
}

/// Explicit kernel cache, one per worker.
///
/// Owned by the caller and passed where needed, rather than living in
/// process-global state; entries are keyed by grid shape and reused for every
/// transform of that shape.
pub struct KernelCache {
    grid: ProcessorGrid,
    coord: WorkerCoord,
    entries: HashMap<GridShape, Arc<KernelSet>>,
}

impl KernelCache {
    /// Empty cache for one worker.
    pub fn new(grid: ProcessorGrid, coord: WorkerCoord) -> Self {
        Self { grid, coord, entries: HashMap::new() }
    }

    /// The kernel set for `shape`, building it on first use.
    pub fn get(&mut self, shape: GridShape) -> MeshResult<Arc<KernelSet>> {
        if let Some(set) = self.entries.get(&shape) {
            return Ok(set.clone());
        }
        let set = Arc::new(KernelSet::build(shape, self.grid, self.coord)?);
        self.entries.insert(shape, set.clone());
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single() -> (ProcessorGrid, WorkerCoord) {
        (ProcessorGrid::new(1, 1).unwrap(), WorkerCoord { row: 0, col: 0 })
    }

    #[test]
    fn wavevector_ordering() {
        let k = wavevector(8);
        assert_eq!(k[0], 0.0);
        assert!((k[1] - PI / 4.0).abs() < 1e-6);
        assert!((k[3] - 3.0 * PI / 4.0).abs() < 1e-6);
        // Nyquist and mirrored negative frequencies.
        assert!((k[4] + PI).abs() < 1e-6);
        assert!((k[7] + PI / 4.0).abs() < 1e-6);
    }

    #[test]
    fn wavevector_odd_length() {
        let k = wavevector(5);
        assert!(k[2] > 0.0);
        assert!(k[3] < 0.0);
        assert!((k[1] + k[4]).abs() < 1e-6);
    }

    #[test]
    fn dc_mode_is_exactly_zero() {
        let (grid, coord) = single();
        let set = KernelSet::build(GridShape::cube(4), grid, coord).unwrap();
        // Global (0,0,0) sits at local (0,0,0) on a single worker.
        let idx = set.laplace.index(0, 0, 0, 0);
        assert_eq!(set.laplace.data[idx], Complex::new(0.0, 0.0));
        for axis in 0..3 {
            assert_eq!(set.gradient[axis].data[idx], Complex::new(0.0, 0.0));
        }
    }

    #[test]
    fn gradient_vanishes_at_nyquist() {
        // sin(pi) and sin(2*pi) are both zero, so the stencil kills the
        // Nyquist mode entirely.
        assert!(gradient_coefficient(-PI).abs() < 1e-6);
        assert!(gradient_coefficient(PI).abs() < 1e-6);
    }

    #[test]
    fn laplace_value_at_known_mode() {
        let (grid, coord) = single();
        let n = 8;
        let set = KernelSet::build(GridShape::cube(n), grid, coord).unwrap();
        // Mode (1,0,0): local (y=0, z=0, x=1) in X-pencil memory order.
        let idx = set.laplace.index(0, 0, 0, 1);
        let k = 2.0 * PI / n as f32;
        assert!((set.laplace.data[idx].re + 1.0 / (k * k)).abs() < 1e-5);
        assert_eq!(set.laplace.data[idx].im, 0.0);
        // Gradient along x is i times the stencil coefficient there.
        assert_eq!(set.gradient[0].data[idx].re, 0.0);
        assert!((set.gradient[0].data[idx].im - gradient_coefficient(k)).abs() < 1e-6);
    }

    #[test]
    fn distributed_blocks_match_single_worker() {
        let shape = GridShape::cube(8);
        let single_grid = ProcessorGrid::new(1, 1).unwrap();
        let reference =
            KernelSet::build(shape, single_grid, WorkerCoord { row: 0, col: 0 }).unwrap();

        let grid = ProcessorGrid::new(2, 2).unwrap();
        let stage = PencilStage::XPencil;
        for id in 0..grid.num_workers() {
            let coord = grid.coordinate_of(id);
            let set = KernelSet::build(shape, grid, coord).unwrap();
            let (d1, d2, d3) = stage.local_dims(shape, grid);
            for i1 in 0..d1 {
                for i2 in 0..d2 {
                    for i3 in 0..d3 {
                        let (gx, gy, gz) = stage.global_of(shape, grid, coord, i1, i2, i3);
                        // On the single worker the local index is the global one.
                        let ref_idx = reference.laplace.index(0, gy, gz, gx);
                        let loc_idx = set.laplace.index(0, i1, i2, i3);
                        assert_eq!(set.laplace.data[loc_idx], reference.laplace.data[ref_idx]);
                        assert_eq!(
                            set.gradient[2].data[loc_idx],
                            reference.gradient[2].data[ref_idx]
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn cache_reuses_entries() {
        let (grid, coord) = single();
        let mut cache = KernelCache::new(grid, coord);
        let a = cache.get(GridShape::cube(4)).unwrap();
        let b = cache.get(GridShape::cube(4)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = cache.get(GridShape::cube(8)).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
