//! Pencil-decomposed distributed 3D FFT.
//!
//! The 3D transform runs as three local 1D passes over whichever axis is
//! currently contiguous, separated by two all-to-all transposes that re-shard
//! the field so the next axis becomes local:
//!
//! ```text
//! Z-pencil --fft(z)--> Z-pencil --transpose cols--> Y-pencil --fft(y)-->
//! Y-pencil --transpose rows--> X-pencil --fft(x)--> X-pencil (spectral)
//! ```
//!
//! Each transpose exchanges exactly the blocks that change owner within one
//! processor-grid axis group and nothing else. The inverse transform walks
//! the same path backwards and applies the `1/(nx*ny*nz)` normalization, so
//! `inverse(forward(f)) == f` up to round-off.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::error::{MeshError, MeshResult};
use crate::fabric::{FabricHandle, Payload};
use crate::field::{ComplexField, RealField};
use crate::grid::PencilStage;

/// Distributed FFT engine for one worker.
///
/// Holds the rustfft planner so per-axis plans are built once per length and
/// reused across every transform of the run. Pure apart from that cache.
pub struct DistributedFft {
    planner: FftPlanner<f32>,
}

impl Default for DistributedFft {
    fn default() -> Self {
        Self::new()
    }
}

impl DistributedFft {
    /// New engine with an empty plan cache.
    pub fn new() -> Self {
        Self { planner: FftPlanner::new() }
    }

    /// Forward 3D transform of a real-space Z-pencil field.
    ///
    /// Returns the unnormalized spectrum as an X-pencil complex field.
    pub fn forward(
        &mut self,
        field: &RealField,
        fabric: &mut FabricHandle,
    ) -> MeshResult<ComplexField> {
        check_alignment(field.stage, PencilStage::ZPencil, field.grid == fabric.grid())?;
        let mut work = field.to_complex();
        self.pass(&mut work, true);
        let mut work = transpose_z_to_y(work, fabric)?;
        self.pass(&mut work, true);
        let mut work = transpose_y_to_x(work, fabric)?;
        self.pass(&mut work, true);
        Ok(work)
    }

    /// Inverse 3D transform of an X-pencil spectrum, normalized by the grid
    /// volume.
    ///
    /// The result is returned as a real Z-pencil field; the imaginary residue
    /// of a Hermitian-symmetric input is round-off and is discarded.
    pub fn inverse(
        &mut self,
        field: &ComplexField,
        fabric: &mut FabricHandle,
    ) -> MeshResult<RealField> {
        check_alignment(field.stage, PencilStage::XPencil, field.grid == fabric.grid())?;
        let mut work = field.clone();
        self.pass(&mut work, false);
        let mut work = transpose_x_to_y(work, fabric)?;
        self.pass(&mut work, false);
        let mut work = transpose_y_to_z(work, fabric)?;
        self.pass(&mut work, false);
        let norm = 1.0 / field.shape.volume() as f32;
        for v in &mut work.data {
            *v = v.scale(norm);
        }
        Ok(work.to_real())
    }

    /// One local 1D pass over the contiguous axis of `field`.
    fn pass(&mut self, field: &mut ComplexField, forward: bool) {
        let (_, _, d3) = field.local_dims();
        let fft = if forward {
            self.planner.plan_fft_forward(d3)
        } else {
            self.planner.plan_fft_inverse(d3)
        };
        // The contiguous axis is innermost, so the whole block is a multiple
        // of the transform length and processes in one call.
        fft.process(&mut field.data);
    }
}

fn check_alignment(stage: PencilStage, expected: PencilStage, grid_ok: bool) -> MeshResult<()> {
    if stage != expected {
        return Err(MeshError::ShapeMismatch(format!(
            "transform expects a {:?} field, got {:?}",
            expected, stage
        )));
    }
    if !grid_ok {
        return Err(MeshError::Config(
            "field and fabric use different processor grids".into(),
        ));
    }
    Ok(())
}

fn take_complex(payload: Payload) -> MeshResult<Vec<Complex<f32>>> {
    match payload {
        Payload::Complex(v) => Ok(v),
        other => Err(MeshError::Communication(format!(
            "unexpected payload {:?} during transpose",
            other
        ))),
    }
}

/// Z-pencil -> Y-pencil: all-to-all within the row (cols axis group).
///
/// The local z axis is split into `cols` segments; segment `j` goes to column
/// `j`, which in return contributes its y range, leaving y fully local.
fn transpose_z_to_y(src: ComplexField, fabric: &mut FabricHandle) -> MeshResult<ComplexField> {
    let (a1, a2, _) = src.local_dims();
    let grid = src.grid;
    let zseg = src.shape.nz / grid.cols;
    let yseg = src.shape.ny / grid.cols;
    let batch = src.batch;

    let mut outgoing = Vec::with_capacity(grid.cols);
    for j in 0..grid.cols {
        let mut block = Vec::with_capacity(batch * a1 * a2 * zseg);
        for b in 0..batch {
            for i1 in 0..a1 {
                for i2 in 0..a2 {
                    for i3 in 0..zseg {
                        block.push(src.data[src.index(b, i1, i2, j * zseg + i3)]);
                    }
                }
            }
        }
        outgoing.push(Payload::Complex(block));
    }

    let incoming = fabric.all_to_all_cols(outgoing)?;
    let mut dst =
        ComplexField::zeros(src.shape, batch, PencilStage::YPencil, grid, src.coord)?;
    for (j, payload) in incoming.into_iter().enumerate() {
        let block = take_complex(payload)?;
        expect_block_len(&block, batch * a1 * yseg * zseg, "z->y transpose")?;
        for b in 0..batch {
            for i1 in 0..a1 {
                for iy in 0..yseg {
                    for iz in 0..zseg {
                        let idx = dst.index(b, i1, iz, j * yseg + iy);
                        dst.data[idx] = block[((b * a1 + i1) * yseg + iy) * zseg + iz];
                    }
                }
            }
        }
    }
    Ok(dst)
}

/// Y-pencil -> X-pencil: all-to-all within the column (rows axis group).
///
/// The local y axis is split into `rows` segments; segment `i` goes to row
/// `i`, which in return contributes its x range, leaving x fully local.
fn transpose_y_to_x(src: ComplexField, fabric: &mut FabricHandle) -> MeshResult<ComplexField> {
    let (a1, a2, _) = src.local_dims();
    let grid = src.grid;
    let xseg = src.shape.nx / grid.rows;
    let yseg = src.shape.ny / grid.rows;
    let batch = src.batch;

    let mut outgoing = Vec::with_capacity(grid.rows);
    for i in 0..grid.rows {
        let mut block = Vec::with_capacity(batch * a1 * a2 * yseg);
        for b in 0..batch {
            for i1 in 0..a1 {
                for i2 in 0..a2 {
                    for i3 in 0..yseg {
                        block.push(src.data[src.index(b, i1, i2, i * yseg + i3)]);
                    }
                }
            }
        }
        outgoing.push(Payload::Complex(block));
    }

    let incoming = fabric.all_to_all_rows(outgoing)?;
    let mut dst =
        ComplexField::zeros(src.shape, batch, PencilStage::XPencil, grid, src.coord)?;
    for (r, payload) in incoming.into_iter().enumerate() {
        let block = take_complex(payload)?;
        expect_block_len(&block, batch * xseg * a2 * yseg, "y->x transpose")?;
        for b in 0..batch {
            for ix in 0..xseg {
                for iz in 0..a2 {
                    for iy in 0..yseg {
                        let idx = dst.index(b, iy, iz, r * xseg + ix);
                        dst.data[idx] = block[((b * xseg + ix) * a2 + iz) * yseg + iy];
                    }
                }
            }
        }
    }
    Ok(dst)
}

/// X-pencil -> Y-pencil: exact reverse of [`transpose_y_to_x`].
fn transpose_x_to_y(src: ComplexField, fabric: &mut FabricHandle) -> MeshResult<ComplexField> {
    let (a1, a2, _) = src.local_dims();
    let grid = src.grid;
    let xseg = src.shape.nx / grid.rows;
    let yseg = src.shape.ny / grid.rows;
    let batch = src.batch;

    let mut outgoing = Vec::with_capacity(grid.rows);
    for i in 0..grid.rows {
        let mut block = Vec::with_capacity(batch * a1 * a2 * xseg);
        for b in 0..batch {
            for i1 in 0..a1 {
                for i2 in 0..a2 {
                    for i3 in 0..xseg {
                        block.push(src.data[src.index(b, i1, i2, i * xseg + i3)]);
                    }
                }
            }
        }
        outgoing.push(Payload::Complex(block));
    }

    let incoming = fabric.all_to_all_rows(outgoing)?;
    let mut dst =
        ComplexField::zeros(src.shape, batch, PencilStage::YPencil, grid, src.coord)?;
    for (r, payload) in incoming.into_iter().enumerate() {
        let block = take_complex(payload)?;
        expect_block_len(&block, batch * yseg * a2 * xseg, "x->y transpose")?;
        for b in 0..batch {
            for iy in 0..yseg {
                for iz in 0..a2 {
                    for ix in 0..xseg {
                        let idx = dst.index(b, ix, iz, r * yseg + iy);
                        dst.data[idx] = block[((b * yseg + iy) * a2 + iz) * xseg + ix];
                    }
                }
            }
        }
    }
    Ok(dst)
}

/// Y-pencil -> Z-pencil: exact reverse of [`transpose_z_to_y`].
fn transpose_y_to_z(src: ComplexField, fabric: &mut FabricHandle) -> MeshResult<ComplexField> {
    let (a1, a2, _) = src.local_dims();
    let grid = src.grid;
    let zseg = src.shape.nz / grid.cols;
    let yseg = src.shape.ny / grid.cols;
    let batch = src.batch;

    let mut outgoing = Vec::with_capacity(grid.cols);
    for j in 0..grid.cols {
        let mut block = Vec::with_capacity(batch * a1 * a2 * yseg);
        for b in 0..batch {
            for i1 in 0..a1 {
                for i2 in 0..a2 {
                    for i3 in 0..yseg {
                        block.push(src.data[src.index(b, i1, i2, j * yseg + i3)]);
                    }
                }
            }
        }
        outgoing.push(Payload::Complex(block));
    }

    let incoming = fabric.all_to_all_cols(outgoing)?;
    let mut dst =
        ComplexField::zeros(src.shape, batch, PencilStage::ZPencil, grid, src.coord)?;
    for (j, payload) in incoming.into_iter().enumerate() {
        let block = take_complex(payload)?;
        expect_block_len(&block, batch * a1 * zseg * yseg, "y->z transpose")?;
        for b in 0..batch {
            for i1 in 0..a1 {
                for iz in 0..zseg {
                    for iy in 0..yseg {
                        let idx = dst.index(b, i1, iy, j * zseg + iz);
                        dst.data[idx] = block[((b * a1 + i1) * zseg + iz) * yseg + iy];
                    }
                }
            }
        }
    }
    Ok(dst)
}

fn expect_block_len(block: &[Complex<f32>], want: usize, what: &str) -> MeshResult<()> {
    if block.len() != want {
        return Err(MeshError::Communication(format!(
            "{} received a block of {} elements, expected {}",
            what,
            block.len(),
            want
        )));
    }
    Ok(())
}
