//! First-order LPT displacement from a Fourier-space density field.
//!
//! For each axis the spectrum is multiplied elementwise by the gradient and
//! inverse-Laplace kernels (no communication: field and kernels share the
//! X-pencil partition), inverse-transformed, and scaled by the growth factor.

use crate::error::MeshResult;
use crate::fabric::FabricHandle;
use crate::fft::DistributedFft;
use crate::field::{ComplexField, RealField};
use crate::spectral::KernelSet;

/// Compute the three displacement components `growth * IFFT(delta_k * grad_a * lap)`.
///
/// The result is a Z-pencil real vector field aligned with the particle
/// lattice. The DC mode contributes exactly zero displacement because both
/// kernels vanish there by construction.
pub fn lpt_displacement(
    spectrum: &ComplexField,
    kernels: &KernelSet,
    growth: f32,
    fft: &mut DistributedFft,
    fabric: &mut FabricHandle,
) -> MeshResult<[RealField; 3]> {
    Ok([
        component(0, spectrum, kernels, growth, fft, fabric)?,
        component(1, spectrum, kernels, growth, fft, fabric)?,
        component(2, spectrum, kernels, growth, fft, fabric)?,
    ])
}

fn component(
    axis: usize,
    spectrum: &ComplexField,
    kernels: &KernelSet,
    growth: f32,
    fft: &mut DistributedFft,
    fabric: &mut FabricHandle,
) -> MeshResult<RealField> {
    let mut shaped = spectrum.clone();
    shaped.mul_kernel(&kernels.gradient[axis])?;
    shaped.mul_kernel(&kernels.laplace)?;
    let mut psi = fft.inverse(&shaped, fabric)?;
    psi.scale(growth);
    Ok(psi)
}
