// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! # Stage backends
//!
//! The frame driver issues the same command sequence to any backend:
//! Update, barrier, Diffuse, barrier, present. [`GpuBackend`] records it into
//! wgpu passes; [`CpuBackend`] executes it on the host, emulating workgroups
//! and checking every read against the barriers it has seen.

mod cpu;
mod gpu;

pub use cpu::{CpuBackend, Hazard};
pub use gpu::GpuBackend;

use crate::field::FieldId;
use crate::kernels::FrameUniforms;
use crate::settings::SimulationSettings;

/// Number of workgroups of size `group` needed to cover `n` items.
#[inline]
pub fn workgroup_count(n: u32, group: u32) -> u32 {
    n.div_ceil(group)
}

/// Workgroup geometry for both compute stages, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchLayout {
    pub update_group_size: u32,
    pub update_groups: u32,
    pub diffuse_group_size: [u32; 2],
    pub diffuse_groups: [u32; 2],
}

impl DispatchLayout {
    pub fn from_settings(settings: &SimulationSettings) -> Self {
        let [gx, gy] = settings.diffuse_group_size;
        Self {
            update_group_size: settings.update_group_size,
            update_groups: workgroup_count(settings.population, settings.update_group_size),
            diffuse_group_size: [gx, gy],
            diffuse_groups: [
                workgroup_count(settings.width, gx),
                workgroup_count(settings.height, gy),
            ],
        }
    }

    pub fn update_invocations(&self) -> u64 {
        self.update_groups as u64 * self.update_group_size as u64
    }

    pub fn diffuse_invocations(&self) -> u64 {
        let [gx, gy] = self.diffuse_group_size;
        let [nx, ny] = self.diffuse_groups;
        (nx as u64 * gx as u64) * (ny as u64 * gy as u64)
    }
}

/// Running counters kept by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub frames: u64,
    pub update_invocations: u64,
    pub update_guarded: u64,
    pub deposits: u64,
    pub diffuse_invocations: u64,
    pub diffuse_guarded: u64,
    pub texel_writes: u64,
    pub barriers: u64,
    pub presents: u64,
}

/// Executes the per-frame stage commands. Field ids are resolved by the
/// caller; a backend never decides which buffer plays which role.
pub trait StageBackend {
    fn name(&self) -> &'static str;

    fn population(&self) -> u32;

    fn begin_frame(&mut self, frame: FrameUniforms);

    /// Move every agent and deposit into `deposit`, sensing from `sense`.
    fn dispatch_update(&mut self, sense: FieldId, deposit: FieldId);

    /// Make all prior writes visible to later stages.
    fn barrier(&mut self);

    fn dispatch_diffuse(&mut self, src: FieldId, dst: FieldId);

    fn present(&mut self, field: FieldId);

    fn end_frame(&mut self);

    fn stats(&self) -> DispatchStats;
}
