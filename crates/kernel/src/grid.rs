//! Global grid shapes, the 2D processor grid, and the partition arithmetic
//! every other module relies on.
//!
//! A field is always partitioned as a "pencil": two of its three spatial axes
//! are sharded over the processor-grid axes and the third is fully local, so
//! every 1D transform runs over contiguous memory. [`PencilStage`] enumerates
//! the three layouts used by the engine and owns the block arithmetic.

use std::fmt;

use crate::error::{MeshError, MeshResult};

/// Immutable global size of a 3D field. Shared by every field of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridShape {
    /// Extent along x.
    pub nx: usize,
    /// Extent along y.
    pub ny: usize,
    /// Extent along z.
    pub nz: usize,
}

impl GridShape {
    /// Cubic shape with `n` cells per axis.
    pub fn cube(n: usize) -> Self {
        Self { nx: n, ny: n, nz: n }
    }

    /// Total number of grid cells.
    pub fn volume(&self) -> usize {
        self.nx * self.ny * self.nz
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.nx, self.ny, self.nz)
    }
}

/// Fixed 2-axis processor grid. `rows * cols` workers participate in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessorGrid {
    /// Workers along the "rows" mesh axis.
    pub rows: usize,
    /// Workers along the "cols" mesh axis.
    pub cols: usize,
}

impl ProcessorGrid {
    /// Create a processor grid, rejecting degenerate factorizations.
    pub fn new(rows: usize, cols: usize) -> MeshResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(MeshError::Config(format!(
                "processor grid {}x{} has an empty axis",
                rows, cols
            )));
        }
        Ok(Self { rows, cols })
    }

    /// Total number of workers.
    pub fn num_workers(&self) -> usize {
        self.rows * self.cols
    }

    /// Coordinate of a worker id (row-major numbering).
    pub fn coordinate_of(&self, worker_id: usize) -> WorkerCoord {
        WorkerCoord {
            row: worker_id / self.cols,
            col: worker_id % self.cols,
        }
    }

    /// Worker id of a coordinate (row-major numbering).
    pub fn id_of(&self, coord: WorkerCoord) -> usize {
        coord.row * self.cols + coord.col
    }
}

impl fmt::Display for ProcessorGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// A worker's position on the processor grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerCoord {
    /// Position along the "rows" mesh axis.
    pub row: usize,
    /// Position along the "cols" mesh axis.
    pub col: usize,
}

/// Logical dimension of a distributed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    /// Leading batch dimension (independent field draws).
    Batch,
    /// Spatial x.
    X,
    /// Spatial y.
    Y,
    /// Spatial z.
    Z,
}

/// Axis of the processor grid a logical dimension may be sharded over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshAxis {
    /// The "rows" axis.
    Rows,
    /// The "cols" axis.
    Cols,
}

/// Mapping from logical dimensions to processor-grid axes.
///
/// Invariant: each mesh axis is the target of exactly one sharded dimension,
/// so no dimension is ever split across both axes at once. The batch
/// dimension is never sharded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutRule {
    /// Dimension sharded over [`MeshAxis::Rows`].
    pub on_rows: Dim,
    /// Dimension sharded over [`MeshAxis::Cols`].
    pub on_cols: Dim,
}

impl LayoutRule {
    /// Mesh axis a dimension is sharded over, or `None` if it is local.
    pub fn axis_of(&self, dim: Dim) -> Option<MeshAxis> {
        if dim == self.on_rows {
            Some(MeshAxis::Rows)
        } else if dim == self.on_cols {
            Some(MeshAxis::Cols)
        } else {
            None
        }
    }
}

/// The three pencil layouts a field moves through during a 3D transform.
///
/// The memory order of a local block is chosen so that the one fully-local
/// spatial axis is always innermost (contiguous), which is the axis the next
/// 1D transform pass runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PencilStage {
    /// x over rows, y over cols; z local. Memory order (b, x, y, z).
    /// Real-space fields live here.
    ZPencil,
    /// x over rows, z over cols; y local. Memory order (b, x, z, y).
    YPencil,
    /// y over rows, z over cols; x local. Memory order (b, y, z, x).
    /// Spectral fields live here.
    XPencil,
}

impl PencilStage {
    /// The layout rule this stage realizes.
    pub fn rule(self) -> LayoutRule {
        match self {
            PencilStage::ZPencil => LayoutRule { on_rows: Dim::X, on_cols: Dim::Y },
            PencilStage::YPencil => LayoutRule { on_rows: Dim::X, on_cols: Dim::Z },
            PencilStage::XPencil => LayoutRule { on_rows: Dim::Y, on_cols: Dim::Z },
        }
    }

    /// Check that `shape` divides evenly over `grid` in this layout.
    pub fn check_divisible(self, shape: GridShape, grid: ProcessorGrid) -> MeshResult<()> {
        let rule = self.rule();
        for (dim, axis, extent) in [
            (rule.on_rows, "rows", Self::extent_of(rule.on_rows, shape)),
            (rule.on_cols, "cols", Self::extent_of(rule.on_cols, shape)),
        ] {
            let parts = match axis {
                "rows" => grid.rows,
                _ => grid.cols,
            };
            if extent % parts != 0 {
                return Err(MeshError::NotDivisible {
                    axis: Self::dim_name(dim),
                    extent,
                    parts,
                });
            }
        }
        Ok(())
    }

    /// Local block extents in memory order (excluding batch): `(d1, d2, d3)`
    /// with `d3` the contiguous transform axis.
    pub fn local_dims(self, shape: GridShape, grid: ProcessorGrid) -> (usize, usize, usize) {
        match self {
            PencilStage::ZPencil => (shape.nx / grid.rows, shape.ny / grid.cols, shape.nz),
            PencilStage::YPencil => (shape.nx / grid.rows, shape.nz / grid.cols, shape.ny),
            PencilStage::XPencil => (shape.ny / grid.rows, shape.nz / grid.cols, shape.nx),
        }
    }

    /// Map local block indices (memory order) to global spatial `(x, y, z)`.
    pub fn global_of(
        self,
        shape: GridShape,
        grid: ProcessorGrid,
        coord: WorkerCoord,
        i1: usize,
        i2: usize,
        i3: usize,
    ) -> (usize, usize, usize) {
        match self {
            PencilStage::ZPencil => (
                coord.row * (shape.nx / grid.rows) + i1,
                coord.col * (shape.ny / grid.cols) + i2,
                i3,
            ),
            PencilStage::YPencil => (
                coord.row * (shape.nx / grid.rows) + i1,
                i3,
                coord.col * (shape.nz / grid.cols) + i2,
            ),
            PencilStage::XPencil => (
                i3,
                coord.row * (shape.ny / grid.rows) + i1,
                coord.col * (shape.nz / grid.cols) + i2,
            ),
        }
    }

    fn extent_of(dim: Dim, shape: GridShape) -> usize {
        match dim {
            Dim::X => shape.nx,
            Dim::Y => shape.ny,
            Dim::Z => shape.nz,
            Dim::Batch => 0,
        }
    }

    fn dim_name(dim: Dim) -> &'static str {
        match dim {
            Dim::X => "x",
            Dim::Y => "y",
            Dim::Z => "z",
            Dim::Batch => "batch",
        }
    }
}
