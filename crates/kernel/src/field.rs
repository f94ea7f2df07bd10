//! Tagged distributed field types.
//!
//! A field is conceptually a global `(batch, nx, ny, nz)` array, physically
//! held as one contiguous local block per worker according to its current
//! [`PencilStage`]. Workers never touch each other's blocks; data changes
//! owner only through the fabric exchange primitives in [`crate::fft`] and
//! [`crate::painter`].

use rustfft::num_complex::Complex;

use crate::error::{MeshError, MeshResult};
use crate::grid::{GridShape, PencilStage, ProcessorGrid, WorkerCoord};

/// Real-valued distributed field (one local block).
#[derive(Debug, Clone)]
pub struct RealField {
    /// Global spatial shape.
    pub shape: GridShape,
    /// Leading batch extent (independent draws).
    pub batch: usize,
    /// Current pencil layout.
    pub stage: PencilStage,
    /// Processor grid the field is partitioned over.
    pub grid: ProcessorGrid,
    /// Owning worker's coordinate.
    pub coord: WorkerCoord,
    /// Local block, memory order `(batch, d1, d2, d3)` per `stage`.
    pub data: Vec<f32>,
}

/// Complex-valued distributed field (one local block).
#[derive(Debug, Clone)]
pub struct ComplexField {
    /// Global spatial shape.
    pub shape: GridShape,
    /// Leading batch extent.
    pub batch: usize,
    /// Current pencil layout.
    pub stage: PencilStage,
    /// Processor grid the field is partitioned over.
    pub grid: ProcessorGrid,
    /// Owning worker's coordinate.
    pub coord: WorkerCoord,
    /// Local block, memory order `(batch, d1, d2, d3)` per `stage`.
    pub data: Vec<Complex<f32>>,
}

impl RealField {
    /// Zero-initialized field. Fails if `shape` does not divide over `grid`.
    pub fn zeros(
        shape: GridShape,
        batch: usize,
        stage: PencilStage,
        grid: ProcessorGrid,
        coord: WorkerCoord,
    ) -> MeshResult<Self> {
        stage.check_divisible(shape, grid)?;
        let (d1, d2, d3) = stage.local_dims(shape, grid);
        Ok(Self {
            shape,
            batch,
            stage,
            grid,
            coord,
            data: vec![0.0; batch * d1 * d2 * d3],
        })
    }

    /// Field wrapping an existing local block.
    pub fn from_data(
        shape: GridShape,
        batch: usize,
        stage: PencilStage,
        grid: ProcessorGrid,
        coord: WorkerCoord,
        data: Vec<f32>,
    ) -> MeshResult<Self> {
        stage.check_divisible(shape, grid)?;
        let (d1, d2, d3) = stage.local_dims(shape, grid);
        if data.len() != batch * d1 * d2 * d3 {
            return Err(MeshError::ShapeMismatch(format!(
                "local block has {} elements, layout wants {}",
                data.len(),
                batch * d1 * d2 * d3
            )));
        }
        Ok(Self { shape, batch, stage, grid, coord, data })
    }

    /// Local block extents in memory order (excluding batch).
    pub fn local_dims(&self) -> (usize, usize, usize) {
        self.stage.local_dims(self.shape, self.grid)
    }

    /// Number of spatial cells in the local block (excluding batch).
    pub fn local_volume(&self) -> usize {
        let (d1, d2, d3) = self.local_dims();
        d1 * d2 * d3
    }

    /// Flat index of `(b, i1, i2, i3)` in memory order.
    #[inline]
    pub fn index(&self, b: usize, i1: usize, i2: usize, i3: usize) -> usize {
        let (d1, d2, d3) = self.local_dims();
        debug_assert!(b < self.batch && i1 < d1 && i2 < d2 && i3 < d3);
        ((b * d1 + i1) * d2 + i2) * d3 + i3
    }

    /// Multiply every element by `factor`.
    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    /// Promote to a complex field (zero imaginary parts).
    pub fn to_complex(&self) -> ComplexField {
        ComplexField {
            shape: self.shape,
            batch: self.batch,
            stage: self.stage,
            grid: self.grid,
            coord: self.coord,
            data: self.data.iter().map(|&v| Complex::new(v, 0.0)).collect(),
        }
    }
}

impl ComplexField {
    /// Zero-initialized field. Fails if `shape` does not divide over `grid`.
    pub fn zeros(
        shape: GridShape,
        batch: usize,
        stage: PencilStage,
        grid: ProcessorGrid,
        coord: WorkerCoord,
    ) -> MeshResult<Self> {
        stage.check_divisible(shape, grid)?;
        let (d1, d2, d3) = stage.local_dims(shape, grid);
        Ok(Self {
            shape,
            batch,
            stage,
            grid,
            coord,
            data: vec![Complex::new(0.0, 0.0); batch * d1 * d2 * d3],
        })
    }

    /// Local block extents in memory order (excluding batch).
    pub fn local_dims(&self) -> (usize, usize, usize) {
        self.stage.local_dims(self.shape, self.grid)
    }

    /// Number of spatial cells in the local block (excluding batch).
    pub fn local_volume(&self) -> usize {
        let (d1, d2, d3) = self.local_dims();
        d1 * d2 * d3
    }

    /// Flat index of `(b, i1, i2, i3)` in memory order.
    #[inline]
    pub fn index(&self, b: usize, i1: usize, i2: usize, i3: usize) -> usize {
        let (d1, d2, d3) = self.local_dims();
        debug_assert!(b < self.batch && i1 < d1 && i2 < d2 && i3 < d3);
        ((b * d1 + i1) * d2 + i2) * d3 + i3
    }

    /// Elementwise multiply by `kernel`, broadcasting over batch.
    ///
    /// `kernel` must be a batch-1 field with the same shape, layout, and
    /// processor grid; both operands are local blocks of the same worker, so
    /// no communication is involved.
    pub fn mul_kernel(&mut self, kernel: &ComplexField) -> MeshResult<()> {
        if kernel.batch != 1 {
            return Err(MeshError::ShapeMismatch(format!(
                "kernel field has batch {}, expected 1",
                kernel.batch
            )));
        }
        if self.shape != kernel.shape
            || self.stage != kernel.stage
            || self.grid != kernel.grid
        {
            return Err(MeshError::ShapeMismatch(format!(
                "cannot combine {} field in {:?} layout with {} kernel in {:?} layout",
                self.shape, self.stage, kernel.shape, kernel.stage
            )));
        }
        let vol = self.local_volume();
        for b in 0..self.batch {
            let base = b * vol;
            for i in 0..vol {
                self.data[base + i] *= kernel.data[i];
            }
        }
        Ok(())
    }

    /// Extract real parts into a [`RealField`] with the same layout.
    pub fn to_real(&self) -> RealField {
        RealField {
            shape: self.shape,
            batch: self.batch,
            stage: self.stage,
            grid: self.grid,
            coord: self.coord,
            data: self.data.iter().map(|c| c.re).collect(),
        }
    }
}
