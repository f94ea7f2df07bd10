//! Distributed run coordinator.
//!
//! Each worker of the processor grid runs the full pipeline on its own block
//! in a separate thread: draw the linear field, transform it, apply the LPT
//! kernels, paint the displaced lattice. Workers communicate only through the
//! fabric's collective exchanges; the coordinator spawns them, joins them,
//! and gathers the per-worker mesh blocks into the global result.
//!
//! `run_single_instance` runs the identical pipeline on a 1x1 grid and is the
//! reference the distributed result is validated against.

use std::sync::Arc;
use std::thread;

use kernel::{
    generate_linear_field, lpt_displacement, paint, DistributedFft, Fabric, FabricHandle,
    GridShape, KernelCache, MeshError, MeshResult, PencilStage, RealField, WorkerCoord,
};

use crate::config::SimulationConfig;
use crate::cosmology::{GrowthFactor, PowerSpectrum};

/// Result of a distributed run.
#[derive(Debug, Clone)]
pub struct DistributedResult {
    /// Gathered output mesh in `(batch, x, y, z)` order.
    pub mesh: Vec<f32>,
    /// Shape of the output mesh.
    pub shape: GridShape,
    /// Number of batch elements.
    pub batch: usize,
}

impl DistributedResult {
    /// Value at `(b, x, y, z)`.
    pub fn at(&self, b: usize, x: usize, y: usize, z: usize) -> f32 {
        self.mesh[((b * self.shape.nx + x) * self.shape.ny + y) * self.shape.nz + z]
    }

    /// Total deposited mass of one batch element.
    pub fn batch_total(&self, b: usize) -> f64 {
        let vol = self.shape.volume();
        self.mesh[b * vol..(b + 1) * vol]
            .iter()
            .map(|&v| v as f64)
            .sum()
    }

    /// Largest absolute cell difference against another run of the same shape.
    pub fn max_residual(&self, other: &DistributedResult) -> MeshResult<f32> {
        if self.shape != other.shape || self.batch != other.batch {
            return Err(MeshError::ShapeMismatch(format!(
                "cannot compare {} x{} mesh with {} x{}",
                self.shape, self.batch, other.shape, other.batch
            )));
        }
        Ok(self
            .mesh
            .iter()
            .zip(&other.mesh)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max))
    }
}

/// Run the full LPT pipeline across the configured processor grid.
///
/// Validates the configuration, spawns one worker thread per grid slot, and
/// gathers the painted mesh. Any worker failure aborts the whole run.
pub fn run_distributed(
    config: &SimulationConfig,
    power: Arc<dyn PowerSpectrum>,
    growth: &dyn GrowthFactor,
) -> MeshResult<DistributedResult> {
    config.validate()?;
    let grid = config.processor_grid()?;
    let shape = config.shape();
    let paint_shape = config.paint_shape();
    let batch = config.batch_size;
    let growth_factor = growth.eval(config.scale_factor);

    tracing::info!(
        "run '{}': grid {} -> mesh {}, batch {}, {} workers ({}), D(a={}) = {}",
        config.name,
        shape,
        paint_shape,
        batch,
        grid.num_workers(),
        grid,
        config.scale_factor,
        growth_factor,
    );

    let box_size = config.box_size;
    let seed = config.seed;
    let handles = Fabric::build(grid);
    let joins: Vec<_> = handles
        .into_iter()
        .map(|fabric| {
            let power = power.clone();
            thread::spawn(move || {
                worker_pipeline(
                    fabric,
                    shape,
                    paint_shape,
                    batch,
                    box_size,
                    seed,
                    growth_factor,
                    power,
                )
            })
        })
        .collect();

    let mut blocks = Vec::with_capacity(grid.num_workers());
    for (id, join) in joins.into_iter().enumerate() {
        let block = join
            .join()
            .map_err(|_| {
                MeshError::Communication(format!("worker {} panicked during the run", id))
            })??;
        blocks.push((grid.coordinate_of(id), block));
    }

    let mesh = gather(paint_shape, batch, &blocks);
    tracing::info!("run '{}' complete: {} mesh cells gathered", config.name, mesh.len());

    Ok(DistributedResult { mesh, shape: paint_shape, batch })
}

/// Run the identical pipeline on a single worker, for validation.
pub fn run_single_instance(
    config: &SimulationConfig,
    power: Arc<dyn PowerSpectrum>,
    growth: &dyn GrowthFactor,
) -> MeshResult<DistributedResult> {
    let mut reference = config.clone();
    reference.processor_rows = 1;
    reference.processor_cols = 1;
    tracing::info!("running single-instance reference for '{}'", config.name);
    run_distributed(&reference, power, growth)
}

/// The full per-worker pipeline: linear field, forward transform, LPT
/// displacement, paint.
#[allow(clippy::too_many_arguments)]
fn worker_pipeline(
    mut fabric: FabricHandle,
    shape: GridShape,
    paint_shape: GridShape,
    batch: usize,
    box_size: f32,
    seed: u64,
    growth_factor: f32,
    power: Arc<dyn PowerSpectrum>,
) -> MeshResult<RealField> {
    let grid = fabric.grid();
    let coord = fabric.coord();
    let mut fft = DistributedFft::new();
    let mut kernels = KernelCache::new(grid, coord);

    let initial = generate_linear_field(
        shape,
        batch,
        box_size,
        seed,
        &|k| power.eval(k),
        &mut fft,
        &mut fabric,
    )?;
    let spectrum = fft.forward(&initial, &mut fabric)?;
    let kernel_set = kernels.get(shape)?;
    let displacement =
        lpt_displacement(&spectrum, &kernel_set, growth_factor, &mut fft, &mut fabric)?;
    paint(&displacement, paint_shape, &mut fabric)
}

/// Assemble per-worker Z-pencil blocks into a global `(batch, x, y, z)` mesh.
fn gather(shape: GridShape, batch: usize, blocks: &[(WorkerCoord, RealField)]) -> Vec<f32> {
    let mut mesh = vec![0.0_f32; batch * shape.volume()];
    for (coord, block) in blocks {
        let (d1, d2, d3) = block.local_dims();
        for b in 0..batch {
            for i1 in 0..d1 {
                for i2 in 0..d2 {
                    for i3 in 0..d3 {
                        let (gx, gy, gz) = PencilStage::ZPencil
                            .global_of(shape, block.grid, *coord, i1, i2, i3);
                        mesh[((b * shape.nx + gx) * shape.ny + gy) * shape.nz + gz] =
                            block.data[block.index(b, i1, i2, i3)];
                    }
                }
            }
        }
    }
    mesh
}
