//! Distributed painting validation: boundary-crossing contributions must be
//! routed and accumulated so the gathered mesh matches the single-worker
//! result.

use std::thread;

use kernel::{
    paint, Fabric, GridShape, PencilStage, ProcessorGrid, RealField, WorkerCoord,
};

/// Deterministic displacement per global lattice site, large enough to cross
/// worker boundaries in both sharded axes.
fn displacement_value(axis: usize, b: usize, x: usize, y: usize, z: usize) -> f32 {
    let i = (((b * 7 + x) * 11 + y) * 5 + z) * 3 + axis;
    ((i % 13) as f32 - 6.0) * 0.22
}

fn local_displacement(
    shape: GridShape,
    batch: usize,
    grid: ProcessorGrid,
    coord: WorkerCoord,
) -> [RealField; 3] {
    let mut out = Vec::with_capacity(3);
    for axis in 0..3 {
        let mut field =
            RealField::zeros(shape, batch, PencilStage::ZPencil, grid, coord).unwrap();
        let (d1, d2, d3) = field.local_dims();
        for b in 0..batch {
            for i1 in 0..d1 {
                for i2 in 0..d2 {
                    for i3 in 0..d3 {
                        let (gx, gy, gz) =
                            PencilStage::ZPencil.global_of(shape, grid, coord, i1, i2, i3);
                        let idx = field.index(b, i1, i2, i3);
                        field.data[idx] = displacement_value(axis, b, gx, gy, gz);
                    }
                }
            }
        }
        out.push(field);
    }
    let z = out.pop().unwrap();
    let y = out.pop().unwrap();
    let x = out.pop().unwrap();
    [x, y, z]
}

/// Run the painter on `grid` and gather the global mesh in (b, x, y, z) order.
fn paint_on_grid(
    shape: GridShape,
    out_shape: GridShape,
    batch: usize,
    grid: ProcessorGrid,
) -> Vec<f32> {
    let handles = Fabric::build(grid);
    let joins: Vec<_> = handles
        .into_iter()
        .map(|mut fabric| {
            thread::spawn(move || {
                let coord = fabric.coord();
                let psi = local_displacement(shape, batch, grid, coord);
                let mesh = paint(&psi, out_shape, &mut fabric).unwrap();
                (coord, mesh)
            })
        })
        .collect();

    let mut global = vec![0.0_f32; batch * out_shape.volume()];
    for join in joins {
        let (coord, mesh) = join.join().expect("worker thread panicked");
        let (d1, d2, d3) = mesh.local_dims();
        for b in 0..batch {
            for i1 in 0..d1 {
                for i2 in 0..d2 {
                    for i3 in 0..d3 {
                        let (gx, gy, gz) =
                            PencilStage::ZPencil.global_of(out_shape, grid, coord, i1, i2, i3);
                        global[((b * out_shape.nx + gx) * out_shape.ny + gy) * out_shape.nz
                            + gz] = mesh.data[mesh.index(b, i1, i2, i3)];
                    }
                }
            }
        }
    }
    global
}

#[test]
fn distributed_paint_matches_single_worker() {
    let shape = GridShape::cube(8);
    let batch = 2;
    let reference = paint_on_grid(shape, shape, batch, ProcessorGrid::new(1, 1).unwrap());

    for (rows, cols) in [(2, 2), (2, 4)] {
        let grid = ProcessorGrid::new(rows, cols).unwrap();
        let mesh = paint_on_grid(shape, shape, batch, grid);
        let mut max_err = 0.0_f32;
        for (a, b) in mesh.iter().zip(&reference) {
            max_err = max_err.max((a - b).abs());
        }
        assert!(
            max_err < 1e-4,
            "distributed mesh deviates by {} on {}x{}",
            max_err,
            rows,
            cols
        );
    }
}

#[test]
fn distributed_paint_conserves_mass() {
    let shape = GridShape::cube(8);
    let batch = 2;
    let grid = ProcessorGrid::new(2, 2).unwrap();
    let mesh = paint_on_grid(shape, shape, batch, grid);
    for b in 0..batch {
        let total: f32 = mesh[b * shape.volume()..(b + 1) * shape.volume()].iter().sum();
        assert!(
            (total - shape.volume() as f32).abs() < 1e-2,
            "batch {} total {}",
            b,
            total
        );
    }
}

#[test]
fn distributed_paint_onto_coarser_mesh() {
    let shape = GridShape::cube(8);
    let out_shape = GridShape::cube(4);
    let batch = 1;
    let reference = paint_on_grid(shape, out_shape, batch, ProcessorGrid::new(1, 1).unwrap());
    let mesh = paint_on_grid(shape, out_shape, batch, ProcessorGrid::new(2, 2).unwrap());
    for (a, b) in mesh.iter().zip(&reference) {
        assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
    }
    let total: f32 = mesh.iter().sum();
    assert!((total - shape.volume() as f32).abs() < 1e-2);
}
