//! Configuration parsing and validation for LPT mesh runs.

use serde::{Deserialize, Serialize};
use std::fs;

use kernel::{GridShape, MeshError, MeshResult, PencilStage, ProcessorGrid};

/// Main run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable run name.
    pub name: String,
    /// Cells per axis of the (cubic) displacement grid.
    pub grid_size: usize,
    /// Cells per axis of the output mesh; defaults to `grid_size`.
    #[serde(default)]
    pub paint_size: Option<usize>,
    /// Physical box size (Mpc/h).
    pub box_size: f32,
    /// Number of independent field draws.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Expansion scale factor the growth factor is evaluated at.
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f32,
    /// Seed for the initial-conditions draw.
    #[serde(default)]
    pub seed: u64,
    /// Workers along the "rows" axis of the processor grid.
    #[serde(default = "default_processor_axis")]
    pub processor_rows: usize,
    /// Workers along the "cols" axis of the processor grid.
    #[serde(default = "default_processor_axis")]
    pub processor_cols: usize,
}

fn default_batch_size() -> usize {
    1
}

fn default_scale_factor() -> f32 {
    1.0
}

fn default_processor_axis() -> usize {
    1
}

impl SimulationConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &str) -> MeshResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            MeshError::Config(format!("failed to read config file {}: {}", path, e))
        })?;
        let config: SimulationConfig = serde_json::from_str(&contents)
            .map_err(|e| MeshError::Config(format!("failed to parse config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. All checks run before any worker is
    /// spawned; a violation aborts the run with a configuration error.
    pub fn validate(&self) -> MeshResult<()> {
        if self.grid_size == 0 {
            return Err(MeshError::Config("grid_size must be positive".into()));
        }
        if let Some(paint) = self.paint_size {
            if paint == 0 {
                return Err(MeshError::Config("paint_size must be positive".into()));
            }
        }
        if self.box_size <= 0.0 {
            return Err(MeshError::Config(format!(
                "box_size must be positive, got {}",
                self.box_size
            )));
        }
        if self.batch_size == 0 {
            return Err(MeshError::Config("batch_size must be at least 1".into()));
        }
        if self.scale_factor <= 0.0 {
            return Err(MeshError::Config(format!(
                "scale_factor must be positive, got {}",
                self.scale_factor
            )));
        }

        let grid = self.processor_grid()?;
        // Every pencil stage the transform moves through must divide evenly;
        // there is no padding or remainder-worker policy.
        let shape = self.shape();
        for stage in [PencilStage::ZPencil, PencilStage::YPencil, PencilStage::XPencil] {
            stage.check_divisible(shape, grid)?;
        }
        // The painter holds the output mesh in the Z-pencil layout.
        PencilStage::ZPencil.check_divisible(self.paint_shape(), grid)?;
        Ok(())
    }

    /// Shape of the displacement grid.
    pub fn shape(&self) -> GridShape {
        GridShape::cube(self.grid_size)
    }

    /// Shape of the output mesh.
    pub fn paint_shape(&self) -> GridShape {
        GridShape::cube(self.paint_size.unwrap_or(self.grid_size))
    }

    /// The processor grid of this run.
    pub fn processor_grid(&self) -> MeshResult<ProcessorGrid> {
        ProcessorGrid::new(self.processor_rows, self.processor_cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SimulationConfig {
        SimulationConfig {
            name: "test".to_string(),
            grid_size: 16,
            paint_size: None,
            box_size: 100.0,
            batch_size: 1,
            scale_factor: 1.0,
            seed: 0,
            processor_rows: 2,
            processor_cols: 2,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_non_divisible_grid() {
        let mut config = base_config();
        config.grid_size = 18;
        config.processor_cols = 4;
        match config.validate() {
            Err(MeshError::NotDivisible { parts: 4, .. }) => {}
            other => panic!("expected NotDivisible, got {:?}", other),
        }
    }

    #[test]
    fn rejects_non_divisible_paint_mesh() {
        let mut config = base_config();
        config.paint_size = Some(10);
        config.processor_cols = 4;
        assert!(matches!(
            config.validate(),
            Err(MeshError::NotDivisible { .. })
        ));
    }

    #[test]
    fn rejects_empty_processor_axis() {
        let mut config = base_config();
        config.processor_rows = 0;
        assert!(matches!(config.validate(), Err(MeshError::Config(_))));
    }

    #[test]
    fn rejects_bad_scalars() {
        let mut config = base_config();
        config.box_size = -1.0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.scale_factor = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn paint_shape_defaults_to_grid() {
        let mut config = base_config();
        assert_eq!(config.paint_shape(), GridShape::cube(16));
        config.paint_size = Some(32);
        assert_eq!(config.paint_shape(), GridShape::cube(32));
    }

    #[test]
    fn parses_minimal_json() {
        let json = r#"{
            "name": "lpt-demo",
            "grid_size": 16,
            "box_size": 200.0
        }"#;
        let config: SimulationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.processor_rows, 1);
        assert_eq!(config.processor_cols, 1);
        assert_eq!(config.scale_factor, 1.0);
        assert!(config.validate().is_ok());
    }
}
