// Plasmodium - GPU Physarum Trail Simulator
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Shader program loading.
//!
//! Sources live as `<name>.wgsl` under a root directory. Workgroup sizes are
//! injected as WGSL `const` declarations ahead of the source so a single file
//! serves every configured group size.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::SetupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    Compute,
    Render,
}

#[derive(Debug, Clone)]
pub struct ProgramLoader {
    root: PathBuf,
}

impl ProgramLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.wgsl"))
    }

    pub fn load_source(&self, name: &str) -> Result<String, SetupError> {
        let path = self.path_of(name);
        std::fs::read_to_string(&path).map_err(|source| SetupError::ProgramIo { path, source })
    }

    /// Read, assemble and compile one program. Validation failures come back
    /// as [`SetupError::Compile`] carrying the compiler log.
    pub fn compile(
        &self,
        device: &wgpu::Device,
        name: &str,
        kind: ProgramKind,
        consts: &[(&str, u32)],
    ) -> Result<wgpu::ShaderModule, SetupError> {
        let source = assemble(&self.load_source(name)?, consts);

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(SetupError::Compile {
                program: name.to_string(),
                log: err.to_string(),
            });
        }
        log::debug!("Compiled {:?} program `{}`", kind, name);
        Ok(module)
    }
}

/// Prepend `const NAME: u32 = VALUE;` for each entry.
pub fn assemble(source: &str, consts: &[(&str, u32)]) -> String {
    let mut out = String::with_capacity(source.len() + consts.len() * 32);
    for (name, value) in consts {
        let _ = writeln!(out, "const {name}: u32 = {value}u;");
    }
    if !consts.is_empty() {
        out.push('\n');
    }
    out.push_str(source);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_precede_source() {
        let out = assemble("fn main() {}\n", &[("UPDATE_GROUP_SIZE", 64), ("X", 1)]);
        assert_eq!(
            out,
            "const UPDATE_GROUP_SIZE: u32 = 64u;\nconst X: u32 = 1u;\n\nfn main() {}\n"
        );
        assert_eq!(assemble("body", &[]), "body");
    }

    #[test]
    fn missing_source_reports_path() {
        let loader = ProgramLoader::new("/nonexistent/plasmodium");
        match loader.load_source("update") {
            Err(SetupError::ProgramIo { path, .. }) => {
                assert!(path.ends_with("update.wgsl"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bundled_programs_declare_their_entry_points() {
        let loader = ProgramLoader::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders"));
        for (name, entry) in [
            ("update", "fn update_agents"),
            ("diffuse", "fn diffuse"),
            ("present", "fn fs_main"),
        ] {
            let source = loader.load_source(name).unwrap();
            assert!(source.contains(entry), "{name} lacks {entry}");
        }
    }
}
