// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Runs the pipeline on the CPU backend without a window and writes a
//! snapshot of the last presented field.
//!
//! Usage: `headless [FRAMES] [SETTINGS.json]`

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use env_logger::Env;

use plasmodium::present::ToneMap;
use plasmodium::profiler::StartupProfiler;
use plasmodium::snapshot::{save_snapshot, snapshot_path, SnapshotMeta};
use plasmodium::{initial_agents, CpuBackend, FrameDriver, SimulationSettings, StageBackend};

const DEFAULT_FRAMES: u32 = 600;
const LOG_EVERY: u32 = 100;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn,plasmodium=info,headless=info"))
        .init();

    let mut args = std::env::args().skip(1);
    let frames = match args.next() {
        Some(arg) => arg
            .parse::<u32>()
            .with_context(|| format!("invalid frame count `{arg}`"))?,
        None => DEFAULT_FRAMES,
    };
    let settings_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(SimulationSettings::default_path);

    let mut profiler = StartupProfiler::new();
    let settings = SimulationSettings::load_or_default(&settings_path)?;
    let agents = initial_agents(&settings)?;
    profiler.mark("Agents placed");
    let mut backend = CpuBackend::new(&settings, agents)?;
    let mut driver = FrameDriver::new(&settings)?;
    profiler.mark("CPU backend");

    log::info!(
        "Headless run: {} frames, {} agents, {}x{} field, {} buffers",
        frames,
        settings.population,
        settings.width,
        settings.height,
        settings.buffer_count
    );

    let start = Instant::now();
    for _ in 0..frames {
        let report = driver.run_frame(&mut backend);
        if (report.tick + 1) % LOG_EVERY == 0 {
            let field = backend.field(report.bindings.present);
            log::info!(
                "tick {:>6}: total {:.3}, peak {:.4}",
                report.tick,
                field.total_intensity(),
                field.max_intensity()
            );
        }
    }
    let elapsed = start.elapsed().as_secs_f64();

    let stats = backend.stats();
    log::info!(
        "{} frames in {:.2}s ({:.1} fps), {:?}",
        stats.frames,
        elapsed,
        stats.frames as f64 / elapsed.max(1e-9),
        stats
    );
    if !backend.hazards().is_empty() {
        log::warn!("{} hazards recorded: {:?}", backend.hazards().len(), backend.hazards());
    }

    let Some(field) = backend.presented_field() else {
        log::warn!("Nothing was presented, skipping snapshot");
        return Ok(());
    };
    let meta = SnapshotMeta::new(&settings, driver.tick(), backend.agents());
    let path = snapshot_path(&settings.snapshot_dir, driver.tick());
    save_snapshot(&path, field, ToneMap::from_settings(&settings), &meta)?;
    println!("{}", path.display());
    Ok(())
}
