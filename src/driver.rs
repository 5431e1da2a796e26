// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Frame sequencing.
//!
//! One frame is always DEPOSIT, BARRIER1, DIFFUSE, BARRIER2, PRESENT, SWAP.
//! The driver owns the role ring and the tick counter; backends only see
//! resolved field ids.

use crate::backend::StageBackend;
use crate::error::ConfigurationError;
use crate::field::{FieldRing, FrameBindings};
use crate::kernels::FrameUniforms;
use crate::settings::SimulationSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Deposit,
    Barrier1,
    Diffuse,
    Barrier2,
    Present,
    Swap,
}

impl FrameStage {
    pub const ORDER: [FrameStage; 6] = [
        FrameStage::Deposit,
        FrameStage::Barrier1,
        FrameStage::Diffuse,
        FrameStage::Barrier2,
        FrameStage::Present,
        FrameStage::Swap,
    ];

    /// Stage that follows `self`; Swap wraps to the next frame's Deposit.
    pub fn next(self) -> FrameStage {
        match self {
            FrameStage::Deposit => FrameStage::Barrier1,
            FrameStage::Barrier1 => FrameStage::Diffuse,
            FrameStage::Diffuse => FrameStage::Barrier2,
            FrameStage::Barrier2 => FrameStage::Present,
            FrameStage::Present => FrameStage::Swap,
            FrameStage::Swap => FrameStage::Deposit,
        }
    }
}

/// What one `run_frame` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub tick: u32,
    pub bindings: FrameBindings,
}

#[derive(Debug, Clone)]
pub struct FrameDriver {
    ring: FieldRing,
    tick: u32,
    population: u32,
    population_warned: bool,
}

impl FrameDriver {
    pub fn new(settings: &SimulationSettings) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        Ok(Self {
            ring: FieldRing::new(settings.buffer_count)?,
            tick: 0,
            population: settings.population,
            population_warned: false,
        })
    }

    pub fn ring(&self) -> &FieldRing {
        &self.ring
    }

    /// Frames completed so far.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Issue one full frame to `backend`.
    pub fn run_frame<B: StageBackend + ?Sized>(&mut self, backend: &mut B) -> FrameReport {
        // Never dispatch past the agents the backend actually holds.
        let population = self.population.min(backend.population());
        if population != self.population && !self.population_warned {
            log::warn!(
                "{} backend holds {} agents, driver expects {}; updating {}",
                backend.name(),
                backend.population(),
                self.population,
                population
            );
            self.population_warned = true;
        }
        let bindings = self.ring.bindings();
        let tick = self.tick;

        backend.begin_frame(FrameUniforms::new(tick, population));
        for stage in FrameStage::ORDER {
            match stage {
                FrameStage::Deposit => backend.dispatch_update(bindings.sense, bindings.deposit),
                FrameStage::Barrier1 | FrameStage::Barrier2 => backend.barrier(),
                FrameStage::Diffuse => {
                    backend.dispatch_diffuse(bindings.diffuse_src, bindings.diffuse_dst)
                }
                FrameStage::Present => backend.present(bindings.present),
                FrameStage::Swap => {
                    backend.end_frame();
                    self.ring.advance();
                }
            }
        }
        self.tick = self.tick.wrapping_add(1);

        log::trace!(
            "frame {} on {}: sense {} deposit {} diffuse {}->{} present {}",
            tick,
            backend.name(),
            bindings.sense,
            bindings.deposit,
            bindings.diffuse_src,
            bindings.diffuse_dst,
            bindings.present
        );
        FrameReport { tick, bindings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DispatchStats;
    use crate::field::FieldId;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Begin(u32),
        Update(FieldId, FieldId),
        Barrier,
        Diffuse(FieldId, FieldId),
        Present(FieldId),
        End,
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
    }

    impl StageBackend for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }
        fn population(&self) -> u32 {
            5
        }
        fn begin_frame(&mut self, frame: FrameUniforms) {
            self.calls.push(Call::Begin(frame.tick));
        }
        fn dispatch_update(&mut self, sense: FieldId, deposit: FieldId) {
            self.calls.push(Call::Update(sense, deposit));
        }
        fn barrier(&mut self) {
            self.calls.push(Call::Barrier);
        }
        fn dispatch_diffuse(&mut self, src: FieldId, dst: FieldId) {
            self.calls.push(Call::Diffuse(src, dst));
        }
        fn present(&mut self, field: FieldId) {
            self.calls.push(Call::Present(field));
        }
        fn end_frame(&mut self) {
            self.calls.push(Call::End);
        }
        fn stats(&self) -> DispatchStats {
            DispatchStats::default()
        }
    }

    fn driver(buffers: usize) -> FrameDriver {
        FrameDriver::new(&SimulationSettings {
            population: 5,
            buffer_count: buffers,
            ..SimulationSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn stage_order_cycles() {
        let mut stage = FrameStage::Deposit;
        for expected in FrameStage::ORDER.iter().cycle().skip(1).take(12) {
            stage = stage.next();
            assert_eq!(stage, *expected);
        }
    }

    #[test]
    fn ping_pong_frames_issue_fenced_sequence() {
        let mut driver = driver(2);
        let mut rec = Recorder::default();
        driver.run_frame(&mut rec);
        driver.run_frame(&mut rec);
        use FieldId as F;
        assert_eq!(
            rec.calls,
            vec![
                Call::Begin(0),
                Call::Update(F::A, F::B),
                Call::Barrier,
                Call::Diffuse(F::B, F::A),
                Call::Barrier,
                Call::Present(F::A),
                Call::End,
                Call::Begin(1),
                Call::Update(F::B, F::A),
                Call::Barrier,
                Call::Diffuse(F::A, F::B),
                Call::Barrier,
                Call::Present(F::B),
                Call::End,
            ]
        );
        assert_eq!(driver.tick(), 2);
    }

    #[test]
    fn rotation_presents_each_buffer_in_turn() {
        let mut driver = driver(3);
        let mut rec = Recorder::default();
        let presented: Vec<FieldId> = (0..6).map(|_| driver.run_frame(&mut rec).bindings.present).collect();
        assert_eq!(
            presented,
            vec![FieldId::C, FieldId::A, FieldId::B, FieldId::C, FieldId::A, FieldId::B]
        );
    }

    #[test]
    fn invalid_buffer_count_is_rejected() {
        let settings = SimulationSettings {
            buffer_count: 4,
            ..SimulationSettings::default()
        };
        assert_eq!(
            FrameDriver::new(&settings).unwrap_err(),
            ConfigurationError::BufferCount(4)
        );
    }
}
