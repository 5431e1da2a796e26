// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use std::path::Path;

use image::imageops::FilterType;

use crate::error::SetupError;

/// Grayscale placement mask, row 0 at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Mask {
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        assert_eq!(pixels.len(), width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn luma(&self, x: u32, y: u32) -> u8 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Coordinates of every pixel with luma at or above `threshold`.
    pub fn selected_pixels(&self, threshold: u8) -> Vec<(u32, u32)> {
        let width = self.width as usize;
        self.pixels
            .iter()
            .enumerate()
            .filter(|(_, &luma)| luma >= threshold)
            .map(|(i, _)| ((i % width) as u32, (i / width) as u32))
            .collect()
    }
}

/// Load an image file as a mask resampled to the field size.
pub fn load_mask(path: &Path, width: u32, height: u32) -> Result<Mask, SetupError> {
    let image = image::open(path).map_err(|source| SetupError::Mask {
        path: path.to_path_buf(),
        source,
    })?;
    let gray = image
        .resize_exact(width, height, FilterType::Lanczos3)
        .to_luma8();
    log::info!(
        "Loaded mask from {} ({}x{} -> {}x{})",
        path.display(),
        image.width(),
        image.height(),
        width,
        height
    );
    Ok(Mask::from_raw(gray.width(), gray.height(), gray.into_raw()))
}
