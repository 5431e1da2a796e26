// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{Key, NamedKey},
    window::{WindowAttributes, WindowId},
};

use plasmodium::present::ToneMap;
use plasmodium::profiler::StartupProfiler;
use plasmodium::snapshot::{save_snapshot, snapshot_path, SnapshotMeta};
use plasmodium::{
    initial_agents, FrameDriver, FrameReport, GpuBackend, SimulationSettings, StageBackend,
};

const TITLE_INTERVAL_SECS: f32 = 0.5;

pub struct App {
    settings: SimulationSettings,
    state: Option<AppState>,
    error: Option<anyhow::Error>,
}

struct AppState {
    backend: GpuBackend,
    driver: FrameDriver,
    last_report: Option<FrameReport>,
    paused: bool,
    frames_since_title: u32,
    last_title: Instant,
}

impl App {
    pub fn new(settings: SimulationSettings) -> Self {
        Self {
            settings,
            state: None,
            error: None,
        }
    }

    /// Setup failure recorded while the event loop was running, if any.
    pub fn into_result(self) -> anyhow::Result<()> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn init(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState> {
        let mut profiler = StartupProfiler::new();

        let attrs = WindowAttributes::default()
            .with_title(self.settings.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.settings.width,
                self.settings.height,
            ));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(|e| plasmodium::SetupError::Window(e.to_string()))?,
        );
        profiler.mark("Window");

        let agents = initial_agents(&self.settings)?;
        profiler.mark("Agents placed");

        let backend = pollster::block_on(GpuBackend::new(window.clone(), &self.settings, &agents))?;
        profiler.mark("GPU backend");

        let driver = FrameDriver::new(&self.settings)?;
        profiler.mark("Driver");

        log::info!(
            "Running {} agents on a {}x{} field with {} buffers",
            self.settings.population,
            self.settings.width,
            self.settings.height,
            self.settings.buffer_count
        );

        window.request_redraw();
        Ok(AppState {
            backend,
            driver,
            last_report: None,
            paused: false,
            frames_since_title: 0,
            last_title: Instant::now(),
        })
    }

    fn write_snapshot(&self, state: &AppState) -> anyhow::Result<PathBuf> {
        let report = state
            .last_report
            .context("no frame has been presented yet")?;
        let field = pollster::block_on(state.backend.read_field(report.bindings.present))?;
        let agents = pollster::block_on(state.backend.read_agents())?;
        let meta = SnapshotMeta::new(&self.settings, state.driver.tick(), &agents);
        let path = snapshot_path(&self.settings.snapshot_dir, state.driver.tick());
        save_snapshot(&path, &field, ToneMap::from_settings(&self.settings), &meta)?;
        Ok(path)
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => event_loop.exit(),
            Key::Named(NamedKey::Space) => {
                if let Some(state) = &mut self.state {
                    state.paused = !state.paused;
                    log::info!("{}", if state.paused { "Paused" } else { "Resumed" });
                }
            }
            Key::Character(c) if c.as_str().eq_ignore_ascii_case("s") => {
                let Some(state) = &self.state else {
                    return;
                };
                match self.write_snapshot(state) {
                    Ok(path) => log::info!("Snapshot written to {}", path.display()),
                    Err(err) => log::error!("Snapshot failed: {err:#}"),
                }
            }
            _ => {}
        }
    }
}

fn redraw(state: &mut AppState, event_loop: &ActiveEventLoop) {
    if state.paused {
        return;
    }

    state.last_report = Some(state.driver.run_frame(&mut state.backend));

    match state.backend.take_surface_error() {
        None => {}
        Some(wgpu::SurfaceError::Lost) | Some(wgpu::SurfaceError::Outdated) => {
            let size = state.backend.window().inner_size();
            state.backend.resize(size);
        }
        Some(wgpu::SurfaceError::OutOfMemory) => {
            log::error!("Surface out of memory, exiting");
            event_loop.exit();
        }
        Some(err) => log::warn!("Skipped frame: {err:?}"),
    }

    state.frames_since_title += 1;
    let elapsed = state.last_title.elapsed().as_secs_f32();
    if elapsed >= TITLE_INTERVAL_SECS {
        let fps = state.frames_since_title as f32 / elapsed;
        let stats = state.backend.stats();
        state.backend.window().set_title(&format!(
            "Plasmodium - {:.1} FPS - tick {}",
            fps,
            state.driver.tick()
        ));
        log::debug!("{:.1} FPS, {:?}", fps, stats);
        state.frames_since_title = 0;
        state.last_title = Instant::now();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(state) => self.state = Some(state),
            Err(err) => {
                log::error!("Startup failed: {err:#}");
                self.error = Some(err);
                event_loop.exit();
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.backend.window().request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if self.state.is_none() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            WindowEvent::Resized(new_size) => {
                if let Some(state) = &mut self.state {
                    state.backend.resize(new_size);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    redraw(state, event_loop);
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.backend.drain();
            log::info!(
                "Stopped after {} frames: {:?}",
                state.driver.tick(),
                state.backend.stats()
            );
        }
    }
}

