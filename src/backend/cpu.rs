// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! # CPU Backend
//!
//! Host execution of the stage commands using Rayon for Diffuse.
//!
//! Every dispatch runs the full padded grid, so out-of-range invocations
//! go through the same guards as on the GPU and are counted. The backend
//! also tracks which fields were written since the last barrier and records
//! a [`Hazard`] when a stage reads one of them or binds one field twice.

use rayon::prelude::*;

use super::{DispatchLayout, DispatchStats, StageBackend};
use crate::agent::AgentStore;
use crate::error::ConfigurationError;
use crate::field::{Field, FieldId};
use crate::kernels::{self, FrameUniforms, SimParams};
use crate::settings::SimulationSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hazard {
    /// A stage read a field written since the last barrier.
    UnfencedRead { field: FieldId, stage: &'static str },
    /// A stage was bound to the same field for reading and writing.
    /// The dispatch is dropped.
    Aliased { field: FieldId, stage: &'static str },
}

pub struct CpuBackend {
    params: SimParams,
    layout: DispatchLayout,
    agents: AgentStore,
    fields: Vec<Field>,
    frame: FrameUniforms,
    /// Written since the last barrier.
    dirty: Vec<bool>,
    stats: DispatchStats,
    hazards: Vec<Hazard>,
    presented: Option<FieldId>,
}

impl CpuBackend {
    pub fn new(settings: &SimulationSettings, agents: AgentStore) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        if agents.len() != settings.population as usize {
            return Err(ConfigurationError::PopulationMismatch {
                expected: settings.population,
                actual: agents.len(),
            });
        }
        let fields = (0..settings.buffer_count)
            .map(|_| Field::new(settings.width, settings.height))
            .collect();
        Ok(Self {
            params: SimParams::from_settings(settings),
            layout: DispatchLayout::from_settings(settings),
            agents,
            fields,
            frame: FrameUniforms::new(0, settings.population),
            dirty: vec![false; settings.buffer_count],
            stats: DispatchStats::default(),
            hazards: Vec::new(),
            presented: None,
        })
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.index()]
    }

    pub fn field_mut(&mut self, id: FieldId) -> &mut Field {
        &mut self.fields[id.index()]
    }

    pub fn agents(&self) -> &AgentStore {
        &self.agents
    }

    pub fn hazards(&self) -> &[Hazard] {
        &self.hazards
    }

    /// Field handed to the last `present` call.
    pub fn presented(&self) -> Option<FieldId> {
        self.presented
    }

    pub fn presented_field(&self) -> Option<&Field> {
        self.presented.map(|id| self.field(id))
    }

    fn check_read(&mut self, field: FieldId, stage: &'static str) {
        if self.dirty[field.index()] {
            log::warn!("{stage} reads field {field} before a barrier");
            self.hazards.push(Hazard::UnfencedRead { field, stage });
        }
    }

    fn check_alias(&mut self, read: FieldId, write: FieldId, stage: &'static str) -> bool {
        if read == write {
            log::error!("{stage} binds field {read} for both reading and writing, skipping");
            self.hazards.push(Hazard::Aliased { field: read, stage });
            return false;
        }
        true
    }
}

/// Borrow one field shared and a different one exclusively.
fn split_pair(fields: &mut [Field], read: FieldId, write: FieldId) -> (&Field, &mut Field) {
    let (r, w) = (read.index(), write.index());
    if r < w {
        let (lo, hi) = fields.split_at_mut(w);
        (&lo[r], &mut hi[0])
    } else {
        let (lo, hi) = fields.split_at_mut(r);
        (&hi[0], &mut lo[w])
    }
}

impl StageBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn population(&self) -> u32 {
        self.agents.len() as u32
    }

    fn begin_frame(&mut self, frame: FrameUniforms) {
        self.frame = frame;
    }

    fn dispatch_update(&mut self, sense: FieldId, deposit: FieldId) {
        if !self.check_alias(sense, deposit, "update") {
            return;
        }
        self.check_read(sense, "update");

        let (src, dst) = split_pair(&mut self.fields, sense, deposit);
        let agents = self.agents.as_mut_slice();
        let mut deposits = 0u64;
        let mut guarded = 0u64;
        for group in 0..self.layout.update_groups {
            for local in 0..self.layout.update_group_size {
                let index = group * self.layout.update_group_size + local;
                if kernels::update_invocation(index, &self.frame, &self.params, agents, src, dst) {
                    deposits += 1;
                } else {
                    guarded += 1;
                }
            }
        }

        self.stats.update_invocations += deposits + guarded;
        self.stats.update_guarded += guarded;
        self.stats.deposits += deposits;
        self.dirty[deposit.index()] = true;
    }

    fn barrier(&mut self) {
        self.dirty.fill(false);
        self.stats.barriers += 1;
    }

    fn dispatch_diffuse(&mut self, src: FieldId, dst: FieldId) {
        if !self.check_alias(src, dst, "diffuse") {
            return;
        }
        self.check_read(src, "diffuse");

        let params = self.params;
        let (source, target) = split_pair(&mut self.fields, src, dst);
        let width = source.width() as usize;
        target
            .texels_mut()
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, texel) in row.iter_mut().enumerate() {
                    *texel = kernels::diffuse_texel(source, x as u32, y as u32, &params);
                }
            });

        let writes = params.width as u64 * params.height as u64;
        let invocations = self.layout.diffuse_invocations();
        self.stats.diffuse_invocations += invocations;
        self.stats.diffuse_guarded += invocations - writes;
        self.stats.texel_writes += writes;
        self.dirty[dst.index()] = true;
    }

    fn present(&mut self, field: FieldId) {
        self.check_read(field, "present");
        self.presented = Some(field);
        self.stats.presents += 1;
    }

    fn end_frame(&mut self) {
        // Submission boundary.
        self.dirty.fill(false);
        self.stats.frames += 1;
    }

    fn stats(&self) -> DispatchStats {
        self.stats
    }
}
