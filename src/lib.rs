// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! GPU-resident physarum trail simulation.
//!
//! A fixed population of agents moves over a grid of trail texels. Each
//! frame the agents deposit into one field buffer, a box or disk filter
//! diffuses that buffer into another, and the result is presented. Two or
//! three physical buffers rotate through the roles so no stage ever reads
//! and writes the same buffer.

pub mod agent;
pub mod backend;
pub mod driver;
pub mod error;
pub mod field;
pub mod kernels;
pub mod mask;
pub mod present;
pub mod profiler;
pub mod program;
pub mod settings;
pub mod snapshot;

pub use agent::{generate_initial_agents, Agent, AgentStore};
pub use backend::{CpuBackend, DispatchLayout, DispatchStats, GpuBackend, Hazard, StageBackend};
pub use driver::{FrameDriver, FrameReport, FrameStage};
pub use error::{ConfigurationError, SetupError};
pub use field::{Field, FieldId, FieldRing, FrameBindings, Role};
pub use settings::SimulationSettings;

use rand::{rngs::StdRng, SeedableRng};

/// Build the initial population described by `settings`, loading the mask
/// when placement asks for one.
pub fn initial_agents(settings: &SimulationSettings) -> Result<AgentStore, SetupError> {
    let mask = match (&settings.placement, &settings.mask_path) {
        (settings::PlacementPolicy::Mask, Some(path)) => {
            Some(mask::load_mask(path, settings.width, settings.height)?)
        }
        _ => None,
    };
    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    generate_initial_agents(
        settings.population,
        &settings.placement,
        mask.as_ref(),
        settings.width,
        settings.height,
        settings.mask_threshold,
        &mut rng,
    )
}
