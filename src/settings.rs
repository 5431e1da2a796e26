// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{ConfigurationError, SetupError};
use crate::kernels;

pub const SETTINGS_FILE_NAME: &str = "plasmodium_settings.json";
pub const SETTINGS_ENV_VAR: &str = "PLASMODIUM_SETTINGS";
pub const MAX_DIFFUSE_RADIUS: u32 = 8;
/// WebGPU default for `max_compute_workgroups_per_dimension`.
pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65_535;
/// WebGPU default for `max_compute_invocations_per_workgroup`.
pub const MAX_INVOCATIONS_PER_WORKGROUP: u32 = 256;
/// WebGPU default for `max_storage_buffer_binding_size` (128 MiB).
pub const MAX_STORAGE_BINDING_BYTES: u64 = 128 << 20;
/// Bytes per field texel and per agent record.
const RECORD_BYTES: u64 = 16;

/// How an agent picks its heading each frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MotionPolicy {
    /// Heading is a pure function of tick and the agent's phase scalar.
    Wave { frequency: f32 },
    /// Steer toward the strongest of three trail samples.
    Sense {
        sensor_angle: f32,
        sensor_distance: f32,
        turn_angle: f32,
    },
}

impl MotionPolicy {
    pub(crate) fn code(&self) -> u32 {
        match self {
            MotionPolicy::Wave { .. } => kernels::MOTION_WAVE,
            MotionPolicy::Sense { .. } => kernels::MOTION_SENSE,
        }
    }
}

impl Default for MotionPolicy {
    fn default() -> Self {
        MotionPolicy::Sense {
            sensor_angle: std::f32::consts::FRAC_PI_4,
            sensor_distance: 9.0,
            turn_angle: std::f32::consts::FRAC_PI_8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMode {
    #[default]
    Wrap,
    Clamp,
}

impl EdgeMode {
    pub(crate) fn code(self) -> u32 {
        match self {
            EdgeMode::Wrap => 0,
            EdgeMode::Clamp => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowShape {
    #[default]
    Square,
    Disk,
}

impl WindowShape {
    pub(crate) fn code(self) -> u32 {
        match self {
            WindowShape::Square => 0,
            WindowShape::Disk => 1,
        }
    }
}

/// Initial agent distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlacementPolicy {
    /// Uniform in a centred disk; radius is a fraction of half the shorter side.
    Disk { radius: f32 },
    /// Uniform over the whole field.
    Scatter,
    /// Uniform over mask pixels at or above `mask_threshold`.
    Mask,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        PlacementPolicy::Disk { radius: 0.8 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub population: u32,
    pub buffer_count: usize,
    pub update_group_size: u32,
    pub diffuse_group_size: [u32; 2],
    pub step_size: f32,
    pub deposit: f32,
    pub decay: f32,
    pub diffuse_radius: u32,
    pub diffuse_window: WindowShape,
    pub motion: MotionPolicy,
    pub edge: EdgeMode,
    pub placement: PlacementPolicy,
    pub mask_path: Option<PathBuf>,
    pub mask_threshold: u8,
    pub seed: Option<u64>,
    pub exposure: f32,
    pub gamma: f32,
    pub vsync: bool,
    pub shader_dir: PathBuf,
    pub snapshot_dir: PathBuf,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            title: "Plasmodium".to_string(),
            width: 800,
            height: 600,
            population: 65_536,
            buffer_count: 2,
            update_group_size: 64,
            diffuse_group_size: [16, 16],
            step_size: 1.0,
            deposit: 1.0,
            decay: 0.97,
            diffuse_radius: 1,
            diffuse_window: WindowShape::Square,
            motion: MotionPolicy::default(),
            edge: EdgeMode::Wrap,
            placement: PlacementPolicy::default(),
            mask_path: None,
            mask_threshold: 128,
            seed: None,
            exposure: 2.0,
            gamma: 1.0,
            vsync: true,
            shader_dir: PathBuf::from("shaders"),
            snapshot_dir: PathBuf::from("snapshots"),
        }
    }
}

impl SimulationSettings {
    /// `$PLASMODIUM_SETTINGS` if set, otherwise the settings file in the working directory.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(SETTINGS_ENV_VAR) {
            return PathBuf::from(path);
        }
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(SETTINGS_FILE_NAME)
    }

    pub fn load_from_disk(path: &Path) -> Result<Self, SetupError> {
        let data = fs::read_to_string(path).map_err(|source| SetupError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| SetupError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` when it exists, fall back to defaults otherwise.
    /// The result is sanitized and validated.
    pub fn load_or_default(path: &Path) -> Result<Self, SetupError> {
        let mut settings = if path.exists() {
            let settings = Self::load_from_disk(path)?;
            log::info!("Loaded settings from {}", path.display());
            settings
        } else {
            log::info!("No settings at {}, using defaults", path.display());
            Self::default()
        };
        settings.sanitize();
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to_disk(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Clamp tuning parameters into ranges the kernels handle well.
    pub fn sanitize(&mut self) {
        self.step_size = self.step_size.clamp(0.0, 16.0);
        self.deposit = self.deposit.clamp(0.0, 1000.0);
        self.exposure = self.exposure.clamp(0.01, 100.0);
        self.gamma = self.gamma.clamp(0.1, 5.0);
        if let MotionPolicy::Sense {
            sensor_angle,
            sensor_distance,
            turn_angle,
        } = &mut self.motion
        {
            *sensor_angle = sensor_angle.clamp(0.0, std::f32::consts::PI);
            *sensor_distance = sensor_distance.clamp(0.0, 64.0);
            *turn_angle = turn_angle.clamp(0.0, std::f32::consts::PI);
        }
        if let PlacementPolicy::Disk { radius } = &mut self.placement {
            *radius = radius.clamp(0.0, 1.0);
        }
    }

    /// Reject settings the pipeline cannot run with. Nothing here changes at runtime.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.population == 0 {
            return Err(ConfigurationError::EmptyPopulation);
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigurationError::EmptyField {
                width: self.width,
                height: self.height,
            });
        }
        if !(2..=3).contains(&self.buffer_count) {
            return Err(ConfigurationError::BufferCount(self.buffer_count));
        }
        if self.update_group_size == 0 {
            return Err(ConfigurationError::ZeroGroupSize { stage: "update" });
        }
        let [gx, gy] = self.diffuse_group_size;
        if gx == 0 || gy == 0 {
            return Err(ConfigurationError::ZeroGroupSize { stage: "diffuse" });
        }
        if self.update_group_size > MAX_INVOCATIONS_PER_WORKGROUP {
            return Err(ConfigurationError::DispatchTooLarge {
                stage: "update",
                groups: self.update_group_size,
                limit: MAX_INVOCATIONS_PER_WORKGROUP,
            });
        }
        let diffuse_invocations = gx.checked_mul(gy);
        if diffuse_invocations.map_or(true, |n| n > MAX_INVOCATIONS_PER_WORKGROUP) {
            return Err(ConfigurationError::DispatchTooLarge {
                stage: "diffuse",
                groups: diffuse_invocations.unwrap_or(u32::MAX),
                limit: MAX_INVOCATIONS_PER_WORKGROUP,
            });
        }
        let update_groups = crate::backend::workgroup_count(self.population, self.update_group_size);
        if update_groups > MAX_WORKGROUPS_PER_DIMENSION {
            return Err(ConfigurationError::DispatchTooLarge {
                stage: "update",
                groups: update_groups,
                limit: MAX_WORKGROUPS_PER_DIMENSION,
            });
        }
        let diffuse_groups = crate::backend::workgroup_count(self.width, gx)
            .max(crate::backend::workgroup_count(self.height, gy));
        if diffuse_groups > MAX_WORKGROUPS_PER_DIMENSION {
            return Err(ConfigurationError::DispatchTooLarge {
                stage: "diffuse",
                groups: diffuse_groups,
                limit: MAX_WORKGROUPS_PER_DIMENSION,
            });
        }
        let field_bytes = self.width as u64 * self.height as u64 * RECORD_BYTES;
        if field_bytes > MAX_STORAGE_BINDING_BYTES {
            return Err(ConfigurationError::BufferTooLarge {
                buffer: "field",
                bytes: field_bytes,
                limit: MAX_STORAGE_BINDING_BYTES,
            });
        }
        let agent_bytes = self.population as u64 * RECORD_BYTES;
        if agent_bytes > MAX_STORAGE_BINDING_BYTES {
            return Err(ConfigurationError::BufferTooLarge {
                buffer: "agent",
                bytes: agent_bytes,
                limit: MAX_STORAGE_BINDING_BYTES,
            });
        }
        if self.diffuse_radius > MAX_DIFFUSE_RADIUS {
            return Err(ConfigurationError::Radius(self.diffuse_radius));
        }
        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return Err(ConfigurationError::Decay(self.decay));
        }
        if self.placement == PlacementPolicy::Mask && self.mask_path.is_none() {
            return Err(ConfigurationError::MaskPathMissing);
        }
        Ok(())
    }

    /// Resolve the shader directory, falling back to the one shipped with the crate.
    pub fn resolved_shader_dir(&self) -> PathBuf {
        if self.shader_dir.is_dir() {
            return self.shader_dir.clone();
        }
        let bundled = Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders");
        if bundled.is_dir() {
            log::debug!(
                "Shader dir {} not found, using {}",
                self.shader_dir.display(),
                bundled.display()
            );
            return bundled;
        }
        self.shader_dir.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let settings = SimulationSettings::default();
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    fn zero_population_is_rejected() {
        let settings = SimulationSettings {
            population: 0,
            ..SimulationSettings::default()
        };
        assert_eq!(settings.validate(), Err(ConfigurationError::EmptyPopulation));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let settings = SimulationSettings {
            height: 0,
            ..SimulationSettings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(ConfigurationError::EmptyField {
                width: 800,
                height: 0
            })
        );
    }

    #[test]
    fn buffer_count_must_be_two_or_three() {
        for count in [0, 1, 4] {
            let settings = SimulationSettings {
                buffer_count: count,
                ..SimulationSettings::default()
            };
            assert_eq!(settings.validate(), Err(ConfigurationError::BufferCount(count)));
        }
    }

    #[test]
    fn oversized_update_dispatch_is_rejected() {
        let settings = SimulationSettings {
            population: 65_536 * 64 + 1,
            update_group_size: 64,
            ..SimulationSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigurationError::DispatchTooLarge { stage: "update", .. })
        ));
    }

    #[test]
    fn huge_diffuse_group_is_rejected_without_overflow() {
        let settings = SimulationSettings {
            diffuse_group_size: [65_536, 65_536],
            ..SimulationSettings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(ConfigurationError::DispatchTooLarge {
                stage: "diffuse",
                groups: u32::MAX,
                limit: MAX_INVOCATIONS_PER_WORKGROUP,
            })
        );
    }

    #[test]
    fn field_larger_than_a_storage_binding_is_rejected() {
        let settings = SimulationSettings {
            width: 4096,
            height: 4096,
            ..SimulationSettings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(ConfigurationError::BufferTooLarge {
                buffer: "field",
                bytes: 268_435_456,
                limit: MAX_STORAGE_BINDING_BYTES,
            })
        );
    }

    #[test]
    fn agents_larger_than_a_storage_binding_are_rejected() {
        let settings = SimulationSettings {
            population: 16_000_000,
            update_group_size: 256,
            ..SimulationSettings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(ConfigurationError::BufferTooLarge {
                buffer: "agent",
                bytes: 256_000_000,
                limit: MAX_STORAGE_BINDING_BYTES,
            })
        );
    }

    #[test]
    fn largest_bindable_field_is_accepted() {
        let settings = SimulationSettings {
            width: 4096,
            height: 2048,
            diffuse_group_size: [16, 16],
            ..SimulationSettings::default()
        };
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    fn mask_placement_needs_a_path() {
        let settings = SimulationSettings {
            placement: PlacementPolicy::Mask,
            ..SimulationSettings::default()
        };
        assert_eq!(settings.validate(), Err(ConfigurationError::MaskPathMissing));
    }

    #[test]
    fn sanitize_clamps_tuning_parameters() {
        let mut settings = SimulationSettings {
            step_size: 100.0,
            gamma: 0.0,
            placement: PlacementPolicy::Disk { radius: 3.0 },
            ..SimulationSettings::default()
        };
        settings.sanitize();
        assert_eq!(settings.step_size, 16.0);
        assert_eq!(settings.gamma, 0.1);
        assert_eq!(settings.placement, PlacementPolicy::Disk { radius: 1.0 });
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{ "population": 17, "motion": { "kind": "wave", "frequency": 0.02 } }"#;
        let settings: SimulationSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.population, 17);
        assert_eq!(settings.motion, MotionPolicy::Wave { frequency: 0.02 });
        assert_eq!(settings.width, 800);
        assert_eq!(settings.buffer_count, 2);
    }

    #[test]
    fn settings_survive_disk() {
        let path = std::env::temp_dir().join(format!(
            "plasmodium_settings_test_{}.json",
            std::process::id()
        ));
        let settings = SimulationSettings {
            population: 1234,
            buffer_count: 3,
            edge: EdgeMode::Clamp,
            seed: Some(7),
            ..SimulationSettings::default()
        };
        settings.save_to_disk(&path).unwrap();
        let loaded = SimulationSettings::load_or_default(&path).unwrap();
        assert_eq!(loaded, settings);
        let _ = fs::remove_file(&path);
    }
}
