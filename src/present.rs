// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use bytemuck::{Pod, Zeroable};

use crate::field::Field;
use crate::settings::SimulationSettings;

/// Display curve applied to channel 0 before it reaches the screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneMap {
    pub exposure: f32,
    pub gamma: f32,
}

impl ToneMap {
    pub fn from_settings(settings: &SimulationSettings) -> Self {
        Self {
            exposure: settings.exposure,
            gamma: settings.gamma,
        }
    }

    /// Same curve as `tone` in present.wgsl.
    #[inline]
    pub fn apply(&self, value: f32) -> f32 {
        let v = 1.0 - (-value.max(0.0) * self.exposure).exp();
        v.powf(1.0 / self.gamma).clamp(0.0, 1.0)
    }
}

impl Default for ToneMap {
    fn default() -> Self {
        Self {
            exposure: 2.0,
            gamma: 1.0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PresentParams {
    pub width: u32,
    pub height: u32,
    pub exposure: f32,
    pub gamma: f32,
}

const _: [(); 16] = [(); std::mem::size_of::<PresentParams>()];

impl PresentParams {
    pub fn new(width: u32, height: u32, tone: ToneMap) -> Self {
        Self {
            width,
            height,
            exposure: tone.exposure,
            gamma: tone.gamma,
        }
    }
}

/// Grayscale RGB8 rendering of a field, row 0 first.
pub fn render_rgb8(field: &Field, tone: ToneMap) -> Vec<u8> {
    let mut out = Vec::with_capacity(field.texels().len() * 3);
    for texel in field.texels() {
        let v = (tone.apply(texel[0]) * 255.0).round() as u8;
        out.extend_from_slice(&[v, v, v]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_maps_to_black() {
        let tone = ToneMap::default();
        assert_eq!(tone.apply(0.0), 0.0);
        assert_eq!(tone.apply(-3.0), 0.0);
    }

    #[test]
    fn curve_is_monotone_and_bounded() {
        let tone = ToneMap {
            exposure: 1.5,
            gamma: 2.2,
        };
        let mut last = 0.0;
        for i in 1..200 {
            let v = tone.apply(i as f32 * 0.05);
            assert!(v >= last);
            assert!(v <= 1.0);
            last = v;
        }
    }

    #[test]
    fn renders_one_gray_pixel_per_texel() {
        let mut field = Field::new(2, 1);
        field.set(1, 0, [100.0, 0.0, 0.0, 0.0]);
        let rgb = render_rgb8(&field, ToneMap::default());
        assert_eq!(rgb, vec![0, 0, 0, 255, 255, 255]);
    }
}
