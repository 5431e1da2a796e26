// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

mod app;

use std::path::PathBuf;

use env_logger::Env;
use winit::event_loop::{ControlFlow, EventLoop};

use plasmodium::SimulationSettings;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn,plasmodium=info"))
        .init();

    let settings_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(SimulationSettings::default_path);
    let settings = SimulationSettings::load_or_default(&settings_path)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = app::App::new(settings);
    event_loop.run_app(&mut app)?;
    app.into_result()
}
