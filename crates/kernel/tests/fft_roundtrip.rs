//! Distributed FFT validation: round-trip identity and processor-grid
//! invariance across worker-count factorizations.

use std::thread;

use kernel::{
    DistributedFft, Fabric, GridShape, PencilStage, ProcessorGrid, RealField, WorkerCoord,
};

/// Deterministic global test field, defined per global index so every
/// processor grid sees the same data.
fn global_value(b: usize, x: usize, y: usize, z: usize) -> f32 {
    let i = ((b * 31 + x) * 17 + y) * 13 + z;
    (i as f32 * 0.37).sin() + 0.25 * (i as f32 * 0.11).cos()
}

/// This worker's Z-pencil block of the global test field.
fn scatter(
    shape: GridShape,
    batch: usize,
    grid: ProcessorGrid,
    coord: WorkerCoord,
) -> RealField {
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
                    field.data[idx] = global_value(b, gx, gy, gz);
                }
            }
        }
    }
    field
}

#[test]
fn round_trip_identity_for_every_factorization() {
    let shape = GridShape::cube(8);
    let batch = 2;
    for (rows, cols) in [(1, 1), (2, 1), (1, 2), (2, 2), (2, 4)] {
        let grid = ProcessorGrid::new(rows, cols).unwrap();
        let handles = Fabric::build(grid);
        let joins: Vec<_> = handles
            .into_iter()
            .map(|mut fabric| {
                thread::spawn(move || {
                    let coord = fabric.coord();
                    let field = scatter(shape, batch, grid, coord);
                    let mut fft = DistributedFft::new();
                    let spectrum = fft.forward(&field, &mut fabric).unwrap();
                    let back = fft.inverse(&spectrum, &mut fabric).unwrap();
                    let mut max_err = 0.0_f32;
                    for (a, b) in back.data.iter().zip(&field.data) {
                        max_err = max_err.max((a - b).abs());
                    }
                    max_err
                })
            })
            .collect();
        for join in joins {
            let max_err = join.join().expect("worker thread panicked");
            assert!(
                max_err < 1e-5,
                "round-trip error {} on {}x{} grid",
                max_err,
                rows,
                cols
            );
        }
    }
}

#[test]
fn spectrum_is_invariant_under_processor_grid() {
    let shape = GridShape::cube(8);
    let batch = 1;

    // Single-worker reference spectrum.
    let single = ProcessorGrid::new(1, 1).unwrap();
    let mut reference_fabric = Fabric::build(single).pop().unwrap();
    let reference_field = scatter(shape, batch, single, WorkerCoord { row: 0, col: 0 });
    let mut fft = DistributedFft::new();
    let reference = fft.forward(&reference_field, &mut reference_fabric).unwrap();

    for (rows, cols) in [(2, 2), (4, 2)] {
        let grid = ProcessorGrid::new(rows, cols).unwrap();
        let handles = Fabric::build(grid);
        let joins: Vec<_> = handles
            .into_iter()
            .map(|mut fabric| {
                thread::spawn(move || {
                    let coord = fabric.coord();
                    let field = scatter(shape, batch, grid, coord);
                    let mut fft = DistributedFft::new();
                    let spectrum = fft.forward(&field, &mut fabric).unwrap();
                    (coord, spectrum)
                })
            })
            .collect();

        for join in joins {
            let (coord, spectrum) = join.join().expect("worker thread panicked");
            let stage = PencilStage::XPencil;
            let (d1, d2, d3) = stage.local_dims(shape, grid);
            for i1 in 0..d1 {
                for i2 in 0..d2 {
                    for i3 in 0..d3 {
                        let (gx, gy, gz) = stage.global_of(shape, grid, coord, i1, i2, i3);
                        // Reference block is the whole domain in (y, z, x) order.
                        let want = reference.data[reference.index(0, gy, gz, gx)];
                        let got = spectrum.data[spectrum.index(0, i1, i2, i3)];
                        let err = (want - got).norm();
                        assert!(
                            err < 1e-3,
                            "mode ({},{},{}) differs on {}x{}: {:?} vs {:?}",
                            gx, gy, gz, rows, cols, got, want
                        );
                    }
                }
            }
        }
    }
}
