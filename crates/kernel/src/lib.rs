//! Distributed particle-mesh compute kernel.
//!
//! This crate provides the compute core for first-order LPT simulations on a
//! 2D processor grid. It is designed to be separable and compute-focused.
//!
//! # Modules
//! - [`grid`] -- Grid shapes, processor grid, pencil layouts, partition arithmetic.
//! - [`error`] -- Error taxonomy (configuration / communication / numerical).
//! - [`fabric`] -- Worker topology and blocking collective exchange.
//! - [`field`] -- Real and complex distributed field types.
//! - [`spectral`] -- Wavevectors, gradient and inverse-Laplace kernels, kernel cache.
//! - [`fft`] -- Pencil-decomposed distributed 3D FFT.
//! - [`linear`] -- Gaussian random field synthesis with a prescribed spectrum.
//! - [`displacement`] -- LPT displacement solver.
//! - [`painter`] -- Cloud-in-cell deposition with halo routing.

#![warn(missing_docs)]

pub mod displacement;
pub mod error;
pub mod fabric;
pub mod fft;
pub mod field;
pub mod grid;
pub mod linear;
pub mod painter;
pub mod spectral;

pub use displacement::lpt_displacement;
pub use error::{MeshError, MeshResult};
pub use fabric::{Deposit, Fabric, FabricHandle, Payload};
pub use fft::DistributedFft;
pub use field::{ComplexField, RealField};
pub use grid::{GridShape, PencilStage, ProcessorGrid, WorkerCoord};
pub use linear::generate_linear_field;
pub use painter::paint;
pub use spectral::{KernelCache, KernelSet};
