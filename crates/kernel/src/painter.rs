//! Cloud-in-cell deposition of the displaced particle lattice onto a mesh.
//!
//! Every cell of the displacement grid carries one unit-mass particle that
//! starts at the cell's integer coordinate. Each worker deposits all eight
//! corner contributions for every particle it owns; contributions whose
//! destination cell belongs to another worker's block are routed there in one
//! collective exchange and accumulated by the owner. Accumulation order is
//! fixed (local sweep first, then received payloads in source-rank order), so
//! repeating a run reproduces the mesh bit for bit.

use crate::error::{MeshError, MeshResult};
use crate::fabric::{Deposit, FabricHandle, Payload};
use crate::field::RealField;
use crate::grid::{GridShape, PencilStage};

/// Deposit the lattice displaced by `displacement` onto a fresh mesh of shape
/// `out_shape`, returning this worker's Z-pencil block of the result.
///
/// The output resolution may differ from the displacement grid; lattice
/// positions are rescaled by the resolution ratio per axis before deposition.
/// Positions wrap periodically. Cloud-in-cell weights for one particle always
/// sum to one, so the global mesh total equals the particle count per batch
/// element.
pub fn paint(
    displacement: &[RealField; 3],
    out_shape: GridShape,
    fabric: &mut FabricHandle,
) -> MeshResult<RealField> {
    let psi = &displacement[0];
    for component in displacement.iter() {
        if component.stage != PencilStage::ZPencil {
            return Err(MeshError::ShapeMismatch(format!(
                "painter expects Z-pencil displacement, got {:?}",
                component.stage
            )));
        }
        if component.shape != psi.shape
            || component.batch != psi.batch
            || component.grid != psi.grid
        {
            return Err(MeshError::ShapeMismatch(
                "displacement components disagree on shape or layout".into(),
            ));
        }
    }
    if psi.grid != fabric.grid() {
        return Err(MeshError::Config(
            "displacement field and fabric use different processor grids".into(),
        ));
    }
    let grid = psi.grid;
    let coord = psi.coord;
    let batch = psi.batch;
    let shape = psi.shape;

    let mut mesh = RealField::zeros(out_shape, batch, PencilStage::ZPencil, grid, coord)?;
    let (ox, oy, _) = mesh.local_dims();
    let x0 = coord.row * ox;
    let y0 = coord.col * oy;

    let scale = [
        out_shape.nx as f32 / shape.nx as f32,
        out_shape.ny as f32 / shape.ny as f32,
        out_shape.nz as f32 / shape.nz as f32,
    ];
    let extent = [out_shape.nx, out_shape.ny, out_shape.nz];

    let num_workers = grid.num_workers();
    let mut routed: Vec<Vec<Deposit>> = (0..num_workers).map(|_| Vec::new()).collect();

    let (d1, d2, d3) = psi.local_dims();
    for b in 0..batch {
        for i1 in 0..d1 {
            for i2 in 0..d2 {
                for i3 in 0..d3 {
                    let (gx, gy, gz) =
                        PencilStage::ZPencil.global_of(shape, grid, coord, i1, i2, i3);
                    let idx = psi.index(b, i1, i2, i3);
                    let lattice = [gx as f32, gy as f32, gz as f32];

                    let mut corner = [0_usize; 3];
                    let mut frac = [0.0_f32; 3];
                    for axis in 0..3 {
                        let pos = (lattice[axis] + displacement[axis].data[idx])
                            * scale[axis];
                        if !pos.is_finite() {
                            return Err(MeshError::Numerical(format!(
                                "non-finite particle position on axis {} at lattice {:?}",
                                axis, lattice
                            )));
                        }
                        let wrapped = wrap(pos, extent[axis]);
                        corner[axis] = wrapped as usize;
                        frac[axis] = wrapped - wrapped.floor();
                    }

                    for dx in 0..2 {
                        for dy in 0..2 {
                            for dz in 0..2 {
                                let cx = (corner[0] + dx) % extent[0];
                                let cy = (corner[1] + dy) % extent[1];
                                let cz = (corner[2] + dz) % extent[2];
                                let weight = pick(frac[0], dx)
                                    * pick(frac[1], dy)
                                    * pick(frac[2], dz);
                                let owner_row = cx / ox;
                                let owner_col = cy / oy;
                                if owner_row == coord.row && owner_col == coord.col {
                                    let m = mesh.index(b, cx - x0, cy - y0, cz);
                                    mesh.data[m] += weight;
                                } else {
                                    let owner = owner_row * grid.cols + owner_col;
                                    routed[owner].push(Deposit {
                                        cell: flat_cell(out_shape, b, cx, cy, cz),
                                        value: weight,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    if num_workers == 1 {
        return Ok(mesh);
    }

    let routed_total: usize = routed.iter().map(|r| r.len()).sum();
    tracing::debug!(
        worker = fabric.id(),
        routed = routed_total,
        "routing out-of-partition contributions"
    );

    let outgoing = routed.into_iter().map(Payload::Deposits).collect();
    let incoming = fabric.all_to_all(outgoing)?;
    for (src, payload) in incoming.into_iter().enumerate() {
        let deposits = match payload {
            Payload::Deposits(d) => d,
            other => {
                return Err(MeshError::Communication(format!(
                    "unexpected payload {:?} from worker {} during paint",
                    other, src
                )))
            }
        };
        for d in deposits {
            let (b, cx, cy, cz) = split_cell(out_shape, d.cell);
            if cx / ox != coord.row || cy / oy != coord.col || b >= batch {
                return Err(MeshError::Communication(format!(
                    "worker {} misrouted a contribution for cell ({}, {}, {}, {})",
                    src, b, cx, cy, cz
                )));
            }
            let m = mesh.index(b, cx - x0, cy - y0, cz);
            mesh.data[m] += d.value;
        }
    }

    Ok(mesh)
}

/// Periodic wrap of a position into `[0, n)`.
#[inline]
fn wrap(pos: f32, n: usize) -> f32 {
    let n = n as f32;
    let wrapped = pos.rem_euclid(n);
    // Rounding in rem_euclid can land exactly on n for tiny negative inputs.
    if wrapped >= n {
        0.0
    } else {
        wrapped
    }
}

#[inline]
fn pick(frac: f32, hi: usize) -> f32 {
    if hi == 0 {
        1.0 - frac
    } else {
        frac
    }
}

#[inline]
fn flat_cell(shape: GridShape, b: usize, x: usize, y: usize, z: usize) -> u64 {
    (((b * shape.nx + x) * shape.ny + y) * shape.nz + z) as u64
}

#[inline]
fn split_cell(shape: GridShape, cell: u64) -> (usize, usize, usize, usize) {
    let cell = cell as usize;
    let z = cell % shape.nz;
    let rest = cell / shape.nz;
    let y = rest % shape.ny;
    let rest = rest / shape.ny;
    let x = rest % shape.nx;
    let b = rest / shape.nx;
    (b, x, y, z)
}
