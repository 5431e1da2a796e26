// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Trail fields and the role bookkeeping that keeps them apart.
//!
//! The physical buffers never move. A [`FieldRing`] maps the two roles,
//! [`Role::Current`] and [`Role::Next`], onto buffer ids and rotates that
//! mapping once per frame. Everything that binds a field asks the ring for
//! a [`FrameBindings`] value instead of tracking indices itself.

use std::fmt;

use crate::error::ConfigurationError;

pub type Texel = [f32; 4];

/// Physical field buffer (A, B, C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(u8);

impl FieldId {
    pub const A: FieldId = FieldId(0);
    pub const B: FieldId = FieldId(1);
    pub const C: FieldId = FieldId(2);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = ['A', 'B', 'C'][self.index()];
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Read by the Update stage for sensing.
    Current,
    /// Receives deposits; holds the last fully diffused result at frame start.
    Next,
}

/// Buffer ids for every binding of one frame, resolved once by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBindings {
    pub sense: FieldId,
    pub deposit: FieldId,
    pub diffuse_src: FieldId,
    pub diffuse_dst: FieldId,
    pub present: FieldId,
}

/// Role assignment over two (ping-pong) or three (rotating) physical fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRing {
    len: usize,
    head: usize,
}

impl FieldRing {
    pub fn new(len: usize) -> Result<Self, ConfigurationError> {
        if !(2..=3).contains(&len) {
            return Err(ConfigurationError::BufferCount(len));
        }
        Ok(Self { len, head: 0 })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of frames after which the labelling repeats.
    pub fn period(&self) -> usize {
        self.len
    }

    fn slot(&self, offset: usize) -> FieldId {
        FieldId(((self.head + offset) % self.len) as u8)
    }

    pub fn resolve(&self, role: Role) -> FieldId {
        match role {
            Role::Current => self.slot(0),
            Role::Next => self.slot(1),
        }
    }

    /// Target of the Diffuse stage: the buffer after Next. With two buffers
    /// this wraps back onto Current, with three it is the spare buffer that
    /// neither role touches.
    pub fn diffuse_target(&self) -> FieldId {
        self.slot(2)
    }

    pub fn bindings(&self) -> FrameBindings {
        let next = self.resolve(Role::Next);
        let target = self.diffuse_target();
        debug_assert_ne!(next, target);
        FrameBindings {
            sense: self.resolve(Role::Current),
            deposit: next,
            diffuse_src: next,
            diffuse_dst: target,
            present: target,
        }
    }

    /// Rotate the labels one step. Afterwards Next resolves to the buffer
    /// that was presented, so deposits land on the latest diffused field.
    pub fn advance(&mut self) {
        self.head = (self.head + 1) % self.len;
    }
}

/// Host-side trail field, row-major with row 0 at the top.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    width: u32,
    height: u32,
    texels: Vec<Texel>,
}

impl Field {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            texels: vec![[0.0; 4]; width as usize * height as usize],
        }
    }

    pub fn from_texels(width: u32, height: u32, texels: Vec<Texel>) -> Self {
        assert_eq!(texels.len(), width as usize * height as usize);
        Self {
            width,
            height,
            texels,
        }
    }

    /// Decode a tightly packed texel buffer. `bytes` may be unaligned.
    pub fn from_bytes(width: u32, height: u32, bytes: &[u8]) -> Self {
        Self::from_texels(width, height, bytemuck::pod_collect_to_vec(bytes))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[Texel] {
        &self.texels
    }

    pub fn texels_mut(&mut self) -> &mut [Texel] {
        &mut self.texels
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Texel {
        self.texels[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, texel: Texel) {
        let idx = self.index(x, y);
        self.texels[idx] = texel;
    }

    /// Channel 0 at signed coordinates, or `None` outside the grid.
    #[inline]
    pub fn intensity_at(&self, x: i32, y: i32) -> Option<f32> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(self.texels[self.index(x as u32, y as u32)][0])
    }

    /// Sum of channel 0.
    pub fn total_intensity(&self) -> f64 {
        self.texels.iter().map(|t| t[0] as f64).sum()
    }

    pub fn max_intensity(&self) -> f32 {
        self.texels.iter().map(|t| t[0]).fold(0.0, f32::max)
    }
}
