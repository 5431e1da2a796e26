// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Host mirror of `update.wgsl` and `diffuse.wgsl`.
//!
//! Both GPU programs are written against the uniform layouts below; the CPU
//! backend runs the same per-invocation bodies so the two can be compared
//! texel for texel in tests.

use std::f32::consts::{PI, TAU};

use bytemuck::{Pod, Zeroable};

use crate::agent::Agent;
use crate::field::{Field, Texel};
use crate::settings::{MotionPolicy, SimulationSettings};

/// Per-frame uniforms shared by both compute programs.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub tick: u32,
    pub population: u32,
    pub _pad: [u32; 2],
}

const _: [(); 16] = [(); std::mem::size_of::<FrameUniforms>()];

impl FrameUniforms {
    pub fn new(tick: u32, population: u32) -> Self {
        Self {
            tick,
            population,
            _pad: [0; 2],
        }
    }
}

/// Static simulation parameters, uploaded once.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SimParams {
    pub width: u32,
    pub height: u32,
    pub motion: u32, // 0 = wave, 1 = sense
    pub edge: u32,   // 0 = wrap, 1 = clamp
    pub step_size: f32,
    pub deposit: f32,
    pub wave_frequency: f32,
    pub sensor_angle: f32,
    pub sensor_distance: f32,
    pub turn_angle: f32,
    pub radius: i32,
    pub window: u32, // 0 = square, 1 = disk
    pub decay: f32,
    pub _pad: [u32; 3],
}

// Keep host layout in sync with the WGSL uniform (64 bytes total).
const _: [(); 64] = [(); std::mem::size_of::<SimParams>()];

pub const MOTION_WAVE: u32 = 0;
pub const MOTION_SENSE: u32 = 1;
pub const EDGE_WRAP: u32 = 0;
pub const WINDOW_DISK: u32 = 1;

impl SimParams {
    pub fn from_settings(settings: &SimulationSettings) -> Self {
        let (wave_frequency, sensor_angle, sensor_distance, turn_angle) = match settings.motion {
            MotionPolicy::Wave { frequency } => (frequency, 0.0, 0.0, 0.0),
            MotionPolicy::Sense {
                sensor_angle,
                sensor_distance,
                turn_angle,
            } => (0.0, sensor_angle, sensor_distance, turn_angle),
        };
        Self {
            width: settings.width,
            height: settings.height,
            motion: settings.motion.code(),
            edge: settings.edge.code(),
            step_size: settings.step_size,
            deposit: settings.deposit,
            wave_frequency,
            sensor_angle,
            sensor_distance,
            turn_angle,
            radius: settings.diffuse_radius as i32,
            window: settings.diffuse_window.code(),
            decay: settings.decay,
            _pad: [0; 3],
        }
    }
}

/// Largest f32 strictly below `extent`. `extent` must be positive.
#[inline]
pub fn domain_max(extent: f32) -> f32 {
    debug_assert!(extent > 0.0);
    f32::from_bits(extent.to_bits() - 1)
}

/// Integer mixer used for tie-breaking. Matches `hash_u32` in update.wgsl.
#[inline]
pub fn hash_u32(seed: u32) -> u32 {
    let mut x = seed;
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}

#[inline]
fn wrap_angle(a: f32) -> f32 {
    a - TAU * (a / TAU).floor()
}

#[inline]
fn wrap_coord(v: f32, extent: f32) -> f32 {
    (v - extent * (v / extent).floor()).min(domain_max(extent))
}

/// Channel 0 at a continuous position, resolved with the edge mode.
fn sample(field: &Field, x: f32, y: f32, params: &SimParams) -> f32 {
    let w = params.width as i32;
    let h = params.height as i32;
    let (mut ix, mut iy) = (x.floor() as i32, y.floor() as i32);
    if params.edge == EDGE_WRAP {
        ix = ix.rem_euclid(w);
        iy = iy.rem_euclid(h);
    } else {
        ix = ix.clamp(0, w - 1);
        iy = iy.clamp(0, h - 1);
    }
    field.intensity_at(ix, iy).unwrap_or(0.0)
}

fn sense_heading(index: u32, tick: u32, agent: &Agent, field: &Field, params: &SimParams) -> f32 {
    let [x, y] = agent.position;
    let probe = |angle: f32| {
        let a = agent.heading + angle;
        sample(
            field,
            x + a.cos() * params.sensor_distance,
            y + a.sin() * params.sensor_distance,
            params,
        )
    };
    let front = probe(0.0);
    let left = probe(params.sensor_angle);
    let right = probe(-params.sensor_angle);

    let turn = params.turn_angle;
    if front > left && front > right {
        agent.heading
    } else if left > right {
        agent.heading + turn
    } else if right > left {
        agent.heading - turn
    } else if front < left {
        // Both sides equally stronger than ahead.
        if hash_u32(index ^ tick.wrapping_mul(0x9e37_79b9)) & 1 == 0 {
            agent.heading + turn
        } else {
            agent.heading - turn
        }
    } else {
        agent.heading
    }
}

/// One Update invocation. Returns `false` when the invocation falls past the
/// population and must not touch anything.
pub fn update_invocation(
    index: u32,
    frame: &FrameUniforms,
    params: &SimParams,
    agents: &mut [Agent],
    sense: &Field,
    deposit: &mut Field,
) -> bool {
    if index >= frame.population {
        return false;
    }
    let Some(agent) = agents.get_mut(index as usize) else {
        return false;
    };

    let heading = match params.motion {
        MOTION_WAVE => PI * (frame.tick as f32 * params.wave_frequency + agent.scalar).sin(),
        _ => sense_heading(index, frame.tick, agent, sense, params),
    };

    let w = params.width as f32;
    let h = params.height as f32;
    let mut x = agent.position[0] + heading.cos() * params.step_size;
    let mut y = agent.position[1] + heading.sin() * params.step_size;
    let mut heading = wrap_angle(heading);

    if params.edge == EDGE_WRAP {
        x = wrap_coord(x, w);
        y = wrap_coord(y, h);
    } else if x < 0.0 || x >= w || y < 0.0 || y >= h {
        x = x.clamp(0.0, domain_max(w));
        y = y.clamp(0.0, domain_max(h));
        heading = wrap_angle(heading + PI);
    }

    agent.position = [x, y];
    agent.heading = heading;

    let px = (x.floor() as u32).min(params.width - 1);
    let py = (y.floor() as u32).min(params.height - 1);
    deposit.set(px, py, [params.deposit; 4]);
    true
}

#[inline]
fn in_window(dx: i32, dy: i32, params: &SimParams) -> bool {
    params.window != WINDOW_DISK || dx * dx + dy * dy <= params.radius * params.radius
}

/// One Diffuse invocation: decayed mean over the in-bounds part of the window.
pub fn diffuse_texel(src: &Field, x: u32, y: u32, params: &SimParams) -> Texel {
    let r = params.radius;
    let mut sum = [0.0f32; 4];
    let mut count = 0u32;
    for dy in -r..=r {
        for dx in -r..=r {
            if !in_window(dx, dy, params) {
                continue;
            }
            let sx = x as i32 + dx;
            let sy = y as i32 + dy;
            if sx < 0 || sy < 0 || sx >= src.width() as i32 || sy >= src.height() as i32 {
                continue;
            }
            let t = src.get(sx as u32, sy as u32);
            for c in 0..4 {
                sum[c] += t[c];
            }
            count += 1;
        }
    }
    // The centre is always in the window, so count >= 1.
    let scale = params.decay / count as f32;
    sum.map(|v| v * scale)
}
