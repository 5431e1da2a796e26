// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use plasmodium::settings::{MotionPolicy, PlacementPolicy};
use plasmodium::{
    initial_agents, Agent, AgentStore, CpuBackend, FieldId, FrameDriver, SimulationSettings,
    StageBackend,
};

fn still_settings(width: u32, height: u32, population: u32, buffers: usize) -> SimulationSettings {
    SimulationSettings {
        width,
        height,
        population,
        buffer_count: buffers,
        step_size: 0.0,
        deposit: 1.0,
        decay: 1.0,
        diffuse_radius: 1,
        // heading = PI * sin(scalar) = 0 for scalar 0
        motion: MotionPolicy::Wave { frequency: 0.0 },
        ..SimulationSettings::default()
    }
}

fn single_agent(settings: &SimulationSettings, x: f32, y: f32) -> (CpuBackend, FrameDriver) {
    let agents = AgentStore::new(vec![Agent::new(x, y, 0.0, 0.0)]);
    (
        CpuBackend::new(settings, agents).unwrap(),
        FrameDriver::new(settings).unwrap(),
    )
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn centre_deposit_spreads_over_nine_texels() {
    let settings = still_settings(9, 9, 1, 2);
    let (mut cpu, mut driver) = single_agent(&settings, 4.5, 4.5);

    let report = driver.run_frame(&mut cpu);
    assert_eq!(report.bindings.present, FieldId::A);
    let field = cpu.presented_field().unwrap();
    for (x, y) in [(3, 3), (4, 4), (5, 5), (3, 5)] {
        assert!(close(field.get(x, y)[0], 1.0 / 9.0), "({x},{y})");
    }
    assert_eq!(field.get(2, 4)[0], 0.0);
    assert!(cpu.hazards().is_empty());
}

#[test]
fn corner_deposit_divides_by_four() {
    let settings = still_settings(9, 9, 1, 2);
    let (mut cpu, mut driver) = single_agent(&settings, 0.5, 0.5);
    driver.run_frame(&mut cpu);
    let field = cpu.presented_field().unwrap();
    assert!(close(field.get(0, 0)[0], 0.25));
    // Edge texel sees six in-bounds samples, the diagonal one all nine.
    assert!(close(field.get(1, 0)[0], 1.0 / 6.0));
    assert!(close(field.get(1, 1)[0], 1.0 / 9.0));
}

#[test]
fn trail_accumulates_on_the_presented_field() {
    let settings = still_settings(9, 9, 1, 2);
    let (mut cpu, mut driver) = single_agent(&settings, 4.5, 4.5);
    driver.run_frame(&mut cpu);
    driver.run_frame(&mut cpu);
    // Second deposit overwrites the centre of the first diffused field.
    let field = cpu.presented_field().unwrap();
    assert!(close(field.get(4, 4)[0], (1.0 + 8.0 / 9.0) / 9.0));
}

#[test]
fn sense_buffer_is_untouched_with_three_buffers() {
    let settings = SimulationSettings {
        width: 48,
        height: 32,
        population: 300,
        buffer_count: 3,
        seed: Some(9),
        ..SimulationSettings::default()
    };
    let agents = initial_agents(&settings).unwrap();
    let mut cpu = CpuBackend::new(&settings, agents).unwrap();
    let mut driver = FrameDriver::new(&settings).unwrap();
    for _ in 0..12 {
        let sense = driver.ring().bindings().sense;
        let before = cpu.field(sense).clone();
        driver.run_frame(&mut cpu);
        assert_eq!(cpu.field(sense), &before);
    }
}

#[test]
fn long_runs_stay_in_bounds_and_fenced() {
    for buffers in [2, 3] {
        let settings = SimulationSettings {
            width: 37,
            height: 23,
            population: 257,
            buffer_count: buffers,
            update_group_size: 64,
            diffuse_group_size: [8, 8],
            placement: PlacementPolicy::Scatter,
            seed: Some(1),
            ..SimulationSettings::default()
        };
        let agents = initial_agents(&settings).unwrap();
        let mut cpu = CpuBackend::new(&settings, agents).unwrap();
        let mut driver = FrameDriver::new(&settings).unwrap();
        let frames = 60;
        for _ in 0..frames {
            driver.run_frame(&mut cpu);
        }

        assert!(cpu.hazards().is_empty(), "{buffers} buffers: {:?}", cpu.hazards());
        assert_eq!(cpu.agents().len(), 257);
        for agent in cpu.agents().as_slice() {
            assert!((0.0..37.0).contains(&agent.position[0]));
            assert!((0.0..23.0).contains(&agent.position[1]));
        }

        let stats = cpu.stats();
        assert_eq!(stats.frames, frames);
        assert_eq!(stats.deposits, 257 * frames);
        assert_eq!(stats.update_guarded, (320 - 257) * frames);
        assert_eq!(stats.texel_writes, 37 * 23 * frames);
        assert_eq!(stats.barriers, 2 * frames);
        assert_eq!(stats.presents, frames);
    }
}

#[test]
fn driver_never_updates_past_the_backend_population() {
    let backend_settings = still_settings(9, 9, 4, 2);
    let agents = AgentStore::new(vec![Agent::new(4.5, 4.5, 0.0, 0.0); 4]);
    let mut cpu = CpuBackend::new(&backend_settings, agents).unwrap();
    let mut driver = FrameDriver::new(&still_settings(9, 9, 8, 2)).unwrap();

    driver.run_frame(&mut cpu);
    driver.run_frame(&mut cpu);

    let stats = cpu.stats();
    assert_eq!(stats.deposits, 4 * 2);
    assert_eq!(cpu.agents().len(), 4);
    assert!(cpu.hazards().is_empty());
}

#[test]
fn diffusion_never_raises_the_peak() {
    let settings = SimulationSettings {
        width: 40,
        height: 40,
        population: 500,
        deposit: 2.0,
        decay: 0.95,
        seed: Some(4),
        ..SimulationSettings::default()
    };
    let agents = initial_agents(&settings).unwrap();
    let mut cpu = CpuBackend::new(&settings, agents).unwrap();
    let mut driver = FrameDriver::new(&settings).unwrap();
    for _ in 0..30 {
        let report = driver.run_frame(&mut cpu);
        let presented = cpu.field(report.bindings.present);
        assert!(presented.max_intensity() <= 2.0 * 0.95 + 1e-6);
        assert!(presented.texels().iter().all(|t| t[0] >= 0.0));
    }
}
