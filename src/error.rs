// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Error taxonomy.
//!
//! Everything that can fail does so before the frame loop starts. Once the
//! driver is running there is nothing to recover from: a misordered barrier
//! is a bug, not an error value.

use std::path::PathBuf;

use thiserror::Error;

/// Structural misconfiguration, rejected at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("population must be at least 1")]
    EmptyPopulation,

    #[error("expected {expected} agents, got {actual}")]
    PopulationMismatch { expected: u32, actual: usize },

    #[error("field dimensions must be non-zero, got {width}x{height}")]
    EmptyField { width: u32, height: u32 },

    #[error("buffer count must be 2 or 3, got {0}")]
    BufferCount(usize),

    #[error("{stage} group size must be non-zero")]
    ZeroGroupSize { stage: &'static str },

    #[error("{stage} dispatch needs {groups} workgroups per dimension, limit is {limit}")]
    DispatchTooLarge {
        stage: &'static str,
        groups: u32,
        limit: u32,
    },

    #[error("diffusion radius {0} is out of range (0..={max})", max = crate::settings::MAX_DIFFUSE_RADIUS)]
    Radius(u32),

    #[error("{buffer} buffer needs {bytes} bytes, storage binding limit is {limit}")]
    BufferTooLarge {
        buffer: &'static str,
        bytes: u64,
        limit: u64,
    },

    #[error("decay must lie in (0, 1], got {0}")]
    Decay(f32),

    #[error("mask placement requires a mask path")]
    MaskPathMissing,
}

/// Fatal failure while bringing the simulation up.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    #[error("failed to read settings from {path}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings from {path}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("window creation failed: {0}")]
    Window(String),

    #[error("failed to create rendering surface")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to acquire GPU device")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("failed to read program source {path}")]
    ProgramIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("program `{program}` failed to compile:\n{log}")]
    Compile { program: String, log: String },

    #[error("failed to load mask {path}")]
    Mask {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("mask selects no pixels at threshold {threshold}")]
    EmptyMaskSelection { threshold: u8 },

    #[error("mask placement requested but no mask was loaded")]
    MissingMask,
}
