// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Snapshot files: a tone-mapped PNG of the presented field with the run
//! metadata packed into a text chunk (JSON, zstd, base64).

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentStore};
use crate::field::Field;
use crate::present::{render_rgb8, ToneMap};
use crate::settings::SimulationSettings;

pub const SNAPSHOT_VERSION: u32 = 1;
const SNAPSHOT_CHUNK: &str = "PlasmodiumSnapshot";
/// Upper bound on agents stored in the metadata.
pub const MAX_SNAPSHOT_AGENTS: usize = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub version: u32,
    pub timestamp: String,
    pub tick: u32,
    pub population: u32,
    pub width: u32,
    pub height: u32,
    pub buffer_count: usize,
    pub settings: SimulationSettings,
    /// Evenly spaced sample of the population.
    pub agents: Vec<Agent>,
}

impl SnapshotMeta {
    pub fn new(settings: &SimulationSettings, tick: u32, agents: &AgentStore) -> Self {
        let all = agents.as_slice();
        let stride = all.len().div_ceil(MAX_SNAPSHOT_AGENTS).max(1);
        Self {
            version: SNAPSHOT_VERSION,
            timestamp: chrono::Local::now().to_rfc3339(),
            tick,
            population: settings.population,
            width: settings.width,
            height: settings.height,
            buffer_count: settings.buffer_count,
            settings: settings.clone(),
            agents: all.iter().step_by(stride).copied().collect(),
        }
    }
}

/// `plasmodium_<timestamp>_t<tick>.png` under `dir`.
pub fn snapshot_path(dir: &Path, tick: u32) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("plasmodium_{stamp}_t{tick}.png"))
}

pub fn save_snapshot(
    path: &Path,
    field: &Field,
    tone: ToneMap,
    meta: &SnapshotMeta,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let img_data = render_rgb8(field, tone);

    let json = serde_json::to_string(meta)?;
    let compressed = zstd::encode_all(json.as_bytes(), 3)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&compressed);

    let file = std::fs::File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), field.width(), field.height());
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.add_text_chunk(SNAPSHOT_CHUNK.to_string(), encoded)?;

    let mut writer = encoder.write_header()?;
    writer.write_image_data(&img_data)?;

    log::info!(
        "Saved snapshot {} (tick {}, {} agents sampled)",
        path.display(),
        meta.tick,
        meta.agents.len()
    );
    Ok(())
}

/// Read a snapshot back as its grayscale image and metadata.
pub fn load_snapshot(path: &Path) -> anyhow::Result<(Vec<u8>, SnapshotMeta)> {
    let file = std::fs::File::open(path)?;
    let decoder = png::Decoder::new(BufReader::new(file));
    let mut reader = decoder.read_info()?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    buf.truncate(info.buffer_size());

    let chunk = reader
        .info()
        .uncompressed_latin1_text
        .iter()
        .find(|chunk| chunk.keyword == SNAPSHOT_CHUNK)
        .ok_or_else(|| anyhow::anyhow!("{} carries no snapshot metadata", path.display()))?;
    let compressed = base64::engine::general_purpose::STANDARD.decode(&chunk.text)?;
    let json = zstd::decode_all(&compressed[..])?;
    let meta: SnapshotMeta = serde_json::from_slice(&json)?;

    if info.width != meta.width || info.height != meta.height {
        anyhow::bail!(
            "Invalid snapshot size: {}x{}, metadata says {}x{}",
            info.width,
            info.height,
            meta.width,
            meta.height
        );
    }

    let gray = buf.chunks_exact(3).map(|px| px[0]).collect();
    log::info!("Loaded snapshot: tick {}, saved {}", meta.tick, meta.timestamp);
    Ok((gray, meta))
}
