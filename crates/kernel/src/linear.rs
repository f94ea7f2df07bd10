//! Gaussian random field synthesis with a prescribed power spectrum.
//!
//! White noise is drawn in real space from a single global seed: every worker
//! walks the full global `(batch, x, y, z)` sampling order with the same
//! ChaCha8 stream and keeps only the samples that fall inside its own block,
//! so the draw is invariant under the processor grid chosen. The noise is
//! then transformed, shaped by `sqrt(P(|k|))` in Fourier space, and
//! transformed back; because the noise is real, Hermitian symmetry of the
//! shaped spectrum is automatic and the inverse transform is real.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::error::{MeshError, MeshResult};
use crate::fabric::FabricHandle;
use crate::fft::DistributedFft;
use crate::field::RealField;
use crate::grid::{GridShape, PencilStage};
use crate::spectral::wavevector;

/// Draw one batch of linear density fields.
///
/// Fourier coefficients of the result are complex Gaussian with variance
/// `P(|k|) * box_volume / grid_volume`, Hermitian-symmetric, with the DC
/// amplitude fixed to zero (the mean carries no perturbation). `power` is
/// evaluated at the physical wavenumber `2*pi*m / box_size`.
pub fn generate_linear_field(
    shape: GridShape,
    batch: usize,
    box_size: f32,
    seed: u64,
    power: &dyn Fn(f32) -> f32,
    fft: &mut DistributedFft,
    fabric: &mut FabricHandle,
) -> MeshResult<RealField> {
    if box_size <= 0.0 {
        return Err(MeshError::Config(format!(
            "box size must be positive, got {}",
            box_size
        )));
    }
    let grid = fabric.grid();
    let coord = fabric.coord();
    let mut noise = RealField::zeros(shape, batch, PencilStage::ZPencil, grid, coord)?;

    let (d1, d2, _) = noise.local_dims();
    let x_range = coord.row * d1..(coord.row + 1) * d1;
    let y_range = coord.col * d2..(coord.col + 1) * d2;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for b in 0..batch {
        for gx in 0..shape.nx {
            for gy in 0..shape.ny {
                for gz in 0..shape.nz {
                    let sample: f32 = rng.sample(StandardNormal);
                    if x_range.contains(&gx) && y_range.contains(&gy) {
                        let idx =
                            noise.index(b, gx - x_range.start, gy - y_range.start, gz);
                        noise.data[idx] = sample;
                    }
                }
            }
        }
    }

    let mut spectrum = fft.forward(&noise, fabric)?;

    // Physical wavenumbers per axis: cell-unit wavevector rescaled by n/L.
    let kx: Vec<f32> = scaled_wavevector(shape.nx, box_size);
    let ky: Vec<f32> = scaled_wavevector(shape.ny, box_size);
    let kz: Vec<f32> = scaled_wavevector(shape.nz, box_size);

    let volume = box_size * box_size * box_size;
    let ngrid = shape.volume() as f32;
    let stage = spectrum.stage;
    let (s1, s2, s3) = spectrum.local_dims();
    let mut amplitude = vec![0.0_f32; s1 * s2 * s3];
    for i1 in 0..s1 {
        for i2 in 0..s2 {
            for i3 in 0..s3 {
                let (gx, gy, gz) = stage.global_of(shape, grid, coord, i1, i2, i3);
                let kk = kx[gx] * kx[gx] + ky[gy] * ky[gy] + kz[gz] * kz[gz];
                let amp = if kk == 0.0 {
                    0.0
                } else {
                    (power(kk.sqrt()) * volume).sqrt() / ngrid
                };
                if !amp.is_finite() {
                    return Err(MeshError::Numerical(format!(
                        "power spectrum produced a non-finite amplitude at |k| = {}",
                        kk.sqrt()
                    )));
                }
                amplitude[(i1 * s2 + i2) * s3 + i3] = amp;
            }
        }
    }
    let vol = spectrum.local_volume();
    for b in 0..batch {
        let base = b * vol;
        for i in 0..vol {
            spectrum.data[base + i] = spectrum.data[base + i].scale(amplitude[i]);
        }
    }

    fft.inverse(&spectrum, fabric)
}

fn scaled_wavevector(n: usize, box_size: f32) -> Vec<f32> {
    wavevector(n)
        .into_iter()
        .map(|k| k * n as f32 / box_size)
        .collect()
}
