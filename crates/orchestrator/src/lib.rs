//! Orchestration layer.
//!
//! This crate provides run coordination for the distributed LPT engine:
//! - Configuration loading and fail-fast validation
//! - Power-spectrum and growth-factor provider traits
//! - The thread-per-worker distributed coordinator and result gathering

#![warn(missing_docs)]

pub mod config;
pub mod cosmology;
pub mod distributed;

pub use config::SimulationConfig;
pub use cosmology::{
    GrowthFactor, LinearGrowth, PowerLawSpectrum, PowerSpectrum, TabulatedPowerSpectrum,
};
pub use distributed::{run_distributed, run_single_instance, DistributedResult};

use std::sync::Arc;

use kernel::MeshResult;

/// Create and run a simulation from a configuration file.
///
/// Loads and validates the JSON configuration, then runs the distributed
/// pipeline with the given providers.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use orchestrator::{run_from_config, LinearGrowth, PowerLawSpectrum};
///
/// let power = Arc::new(PowerLawSpectrum { amplitude: 5.0, index: -1.0 });
/// let result = run_from_config("config/lpt_demo.json", power, &LinearGrowth)?;
/// println!("mesh cells: {}", result.mesh.len());
/// # Ok::<(), kernel::MeshError>(())
/// ```
pub fn run_from_config(
    config_path: &str,
    power: Arc<dyn PowerSpectrum>,
    growth: &dyn GrowthFactor,
) -> MeshResult<DistributedResult> {
    tracing::info!("loading run configuration: {}", config_path);
    let config = SimulationConfig::load(config_path)?;
    run_distributed(&config, power, growth)
}
