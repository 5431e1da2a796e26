// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! # GPU Backend
//!
//! Records the stage commands into one command encoder per frame. Update
//! and Diffuse dispatches go into compute passes; a barrier closes the open
//! pass so the next stage starts a new one, and wgpu synchronises storage
//! accesses at pass boundaries. Present draws a full-screen triangle that
//! samples the chosen field buffer straight from storage.

use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{DispatchLayout, DispatchStats, StageBackend};
use crate::agent::{Agent, AgentStore};
use crate::error::SetupError;
use crate::field::{Field, FieldId, Texel};
use crate::kernels::{FrameUniforms, SimParams};
use crate::present::{PresentParams, ToneMap};
use crate::program::{ProgramKind, ProgramLoader};
use crate::settings::SimulationSettings;

const TEXEL_BYTES: u64 = std::mem::size_of::<Texel>() as u64;

pub struct GpuBackend {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    device: wgpu::Device,
    queue: wgpu::Queue,

    layout: DispatchLayout,
    population: u32,
    width: u32,
    height: u32,

    fields: Vec<wgpu::Buffer>,
    agents_buffer: wgpu::Buffer,
    frame_buffer: wgpu::Buffer,

    update_pipeline: wgpu::ComputePipeline,
    diffuse_pipeline: wgpu::ComputePipeline,
    render_pipeline: wgpu::RenderPipeline,
    /// One bind group per ordered (read, write) pair, indexed `read * len + write`.
    /// The diagonal stays empty so an aliased binding cannot be expressed.
    stage_bind_groups: Vec<Option<wgpu::BindGroup>>,
    present_bind_groups: Vec<wgpu::BindGroup>,

    encoder: Option<wgpu::CommandEncoder>,
    pass: Option<wgpu::ComputePass<'static>>,
    output: Option<wgpu::SurfaceTexture>,
    surface_error: Option<wgpu::SurfaceError>,
    stats: DispatchStats,
}

impl GpuBackend {
    pub async fn new(
        window: Arc<Window>,
        settings: &SimulationSettings,
        agents: &AgentStore,
    ) -> Result<Self, SetupError> {
        settings.validate()?;

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(SetupError::NoAdapter)?;
        log::info!("GPU: {} ({:?})", adapter.get_info().name, adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Plasmodium Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if settings.vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let layout = DispatchLayout::from_settings(settings);
        let programs = ProgramLoader::new(settings.resolved_shader_dir());
        log::info!("Loading programs from {}", programs.root().display());

        // ------------------------------------------------------------------
        // Buffers
        // ------------------------------------------------------------------
        let field_size = settings.width as u64 * settings.height as u64 * TEXEL_BYTES;
        let fields: Vec<wgpu::Buffer> = (0..settings.buffer_count)
            .map(|i| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("Trail Field {}", ['A', 'B', 'C'][i])),
                    size: field_size,
                    usage: wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_DST
                        | wgpu::BufferUsages::COPY_SRC,
                    // Fresh buffers are zero-initialised.
                    mapped_at_creation: false,
                })
            })
            .collect();

        let agents_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Agents"),
            contents: agents.as_bytes(),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        });

        let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Frame Uniforms"),
            contents: bytemuck::cast_slice(&[FrameUniforms::new(0, settings.population)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let sim_params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sim Params"),
            contents: bytemuck::cast_slice(&[SimParams::from_settings(settings)]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let present_params = PresentParams::new(
            settings.width,
            settings.height,
            ToneMap::from_settings(settings),
        );
        let present_params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Present Params"),
            contents: bytemuck::cast_slice(&[present_params]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        // ------------------------------------------------------------------
        // Compute stages
        // ------------------------------------------------------------------
        let storage = |binding: u32, read_only: bool, visibility: wgpu::ShaderStages| {
            wgpu::BindGroupLayoutEntry {
                binding,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }
        };
        let uniform = |binding: u32, visibility: wgpu::ShaderStages| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let compute = wgpu::ShaderStages::COMPUTE;
        let stage_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Stage Bind Group Layout"),
                entries: &[
                    storage(0, false, compute), // agents
                    storage(1, true, compute),  // read field
                    storage(2, false, compute), // write field
                    uniform(3, compute),        // frame
                    uniform(4, compute),        // sim params
                ],
            });

        let compute_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Stage Pipeline Layout"),
            bind_group_layouts: &[&stage_bind_group_layout],
            push_constant_ranges: &[],
        });

        let update_module = programs.compile(
            &device,
            "update",
            ProgramKind::Compute,
            &[("UPDATE_GROUP_SIZE", layout.update_group_size)],
        )?;
        let diffuse_module = programs.compile(
            &device,
            "diffuse",
            ProgramKind::Compute,
            &[
                ("DIFFUSE_GROUP_X", layout.diffuse_group_size[0]),
                ("DIFFUSE_GROUP_Y", layout.diffuse_group_size[1]),
            ],
        )?;

        let update_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Update Agents"),
            layout: Some(&compute_layout),
            module: &update_module,
            entry_point: "update_agents",
            compilation_options: Default::default(),
            cache: None,
        });
        let diffuse_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Diffuse Trails"),
            layout: Some(&compute_layout),
            module: &diffuse_module,
            entry_point: "diffuse",
            compilation_options: Default::default(),
            cache: None,
        });

        let len = fields.len();
        let mut stage_bind_groups = Vec::with_capacity(len * len);
        for read in 0..len {
            for write in 0..len {
                if read == write {
                    stage_bind_groups.push(None);
                    continue;
                }
                let label = format!(
                    "Stage Bind Group ({} -> {})",
                    ['A', 'B', 'C'][read],
                    ['A', 'B', 'C'][write]
                );
                stage_bind_groups.push(Some(device.create_bind_group(
                    &wgpu::BindGroupDescriptor {
                        label: Some(&label),
                        layout: &stage_bind_group_layout,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: agents_buffer.as_entire_binding(),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: fields[read].as_entire_binding(),
                            },
                            wgpu::BindGroupEntry {
                                binding: 2,
                                resource: fields[write].as_entire_binding(),
                            },
                            wgpu::BindGroupEntry {
                                binding: 3,
                                resource: frame_buffer.as_entire_binding(),
                            },
                            wgpu::BindGroupEntry {
                                binding: 4,
                                resource: sim_params_buffer.as_entire_binding(),
                            },
                        ],
                    },
                )));
            }
        }

        // ------------------------------------------------------------------
        // Present
        // ------------------------------------------------------------------
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let present_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Present Bind Group Layout"),
                entries: &[storage(0, true, fragment), uniform(1, fragment)],
            });
        let present_bind_groups: Vec<wgpu::BindGroup> = fields
            .iter()
            .enumerate()
            .map(|(i, field)| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Present Bind Group ({})", ['A', 'B', 'C'][i])),
                    layout: &present_bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: field.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: present_params_buffer.as_entire_binding(),
                        },
                    ],
                })
            })
            .collect();

        let present_module = programs.compile(&device, "present", ProgramKind::Render, &[])?;
        let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Present Pipeline Layout"),
            bind_group_layouts: &[&present_bind_group_layout],
            push_constant_ranges: &[],
        });
        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Present Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &present_module,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &present_module,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        log::info!(
            "GPU backend ready: {}x{} field, {} buffers, {} agents, {} update groups, {}x{} diffuse groups",
            settings.width,
            settings.height,
            len,
            settings.population,
            layout.update_groups,
            layout.diffuse_groups[0],
            layout.diffuse_groups[1]
        );

        Ok(Self {
            window,
            surface,
            surface_config,
            device,
            queue,
            layout,
            population: settings.population,
            width: settings.width,
            height: settings.height,
            fields,
            agents_buffer,
            frame_buffer,
            update_pipeline,
            diffuse_pipeline,
            render_pipeline,
            stage_bind_groups,
            present_bind_groups,
            encoder: None,
            pass: None,
            output: None,
            surface_error: None,
            stats: DispatchStats::default(),
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.surface_config.width = new_size.width;
            self.surface_config.height = new_size.height;
            self.surface.configure(&self.device, &self.surface_config);
        }
    }

    /// Error from the last surface acquisition, if the frame was skipped.
    pub fn take_surface_error(&mut self) -> Option<wgpu::SurfaceError> {
        self.surface_error.take()
    }

    /// Block until every submitted frame has finished on the device.
    pub fn drain(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }

    fn pair_slot(&self, read: FieldId, write: FieldId) -> usize {
        read.index() * self.fields.len() + write.index()
    }

    /// Open a compute pass on the frame encoder unless one is already open.
    fn open_pass(&mut self) -> bool {
        if self.pass.is_none() {
            let Some(encoder) = self.encoder.as_mut() else {
                return false;
            };
            let pass = encoder
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Stage Pass"),
                    timestamp_writes: None,
                })
                .forget_lifetime();
            self.pass = Some(pass);
        }
        true
    }

    async fn read_buffer(&self, source: &wgpu::Buffer, size: u64) -> anyhow::Result<Vec<u8>> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback"),
            });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            sender.send(result).ok();
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .receive()
            .await
            .ok_or_else(|| anyhow::anyhow!("readback channel closed"))??;

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }

    /// Copy one field back to the host. Must not be called mid-frame.
    pub async fn read_field(&self, id: FieldId) -> anyhow::Result<Field> {
        let size = self.width as u64 * self.height as u64 * TEXEL_BYTES;
        let bytes = self.read_buffer(&self.fields[id.index()], size).await?;
        Ok(Field::from_bytes(self.width, self.height, &bytes))
    }

    pub async fn read_agents(&self) -> anyhow::Result<AgentStore> {
        let size = self.population as u64 * std::mem::size_of::<Agent>() as u64;
        let bytes = self.read_buffer(&self.agents_buffer, size).await?;
        Ok(AgentStore::from_bytes(&bytes))
    }
}

impl StageBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn population(&self) -> u32 {
        self.population
    }

    fn begin_frame(&mut self, frame: FrameUniforms) {
        self.queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::cast_slice(&[frame]));
        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        );
    }

    fn dispatch_update(&mut self, sense: FieldId, deposit: FieldId) {
        let slot = self.pair_slot(sense, deposit);
        if self.stage_bind_groups[slot].is_none() {
            log::error!("update binds field {sense} for both reading and writing, skipping");
            return;
        }
        if !self.open_pass() {
            return;
        }
        let (Some(pass), Some(bind_group)) =
            (self.pass.as_mut(), self.stage_bind_groups[slot].as_ref())
        else {
            return;
        };
        pass.set_pipeline(&self.update_pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(self.layout.update_groups, 1, 1);

        let invocations = self.layout.update_invocations();
        self.stats.update_invocations += invocations;
        self.stats.update_guarded += invocations - self.population as u64;
        self.stats.deposits += self.population as u64;
    }

    fn barrier(&mut self) {
        // Ending the pass is the synchronisation point.
        self.pass = None;
        self.stats.barriers += 1;
    }

    fn dispatch_diffuse(&mut self, src: FieldId, dst: FieldId) {
        let slot = self.pair_slot(src, dst);
        if self.stage_bind_groups[slot].is_none() {
            log::error!("diffuse binds field {src} for both reading and writing, skipping");
            return;
        }
        if !self.open_pass() {
            return;
        }
        let (Some(pass), Some(bind_group)) =
            (self.pass.as_mut(), self.stage_bind_groups[slot].as_ref())
        else {
            return;
        };
        let [gx, gy] = self.layout.diffuse_groups;
        pass.set_pipeline(&self.diffuse_pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(gx, gy, 1);

        let invocations = self.layout.diffuse_invocations();
        let writes = self.width as u64 * self.height as u64;
        self.stats.diffuse_invocations += invocations;
        self.stats.diffuse_guarded += invocations - writes;
        self.stats.texel_writes += writes;
    }

    fn present(&mut self, field: FieldId) {
        self.pass = None;
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(err) => {
                self.surface_error = Some(err);
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Present Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rpass.set_pipeline(&self.render_pipeline);
            rpass.set_bind_group(0, &self.present_bind_groups[field.index()], &[]);
            rpass.draw(0..3, 0..1);
        }
        self.output = Some(output);
        self.stats.presents += 1;
    }

    fn end_frame(&mut self) {
        self.pass = None;
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        if let Some(output) = self.output.take() {
            output.present();
        }
        self.stats.frames += 1;
    }

    fn stats(&self) -> DispatchStats {
        self.stats
    }
}
