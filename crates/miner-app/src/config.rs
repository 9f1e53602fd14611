// SPDX-License-Identifier: CEPL-1.0
use std::{fs, io, path::Path, path::PathBuf};

use miner_render_vk::{ContextConfig, ShaderSource, Winding};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
    #[serde(default)]
    pub camera: CameraCfg,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: 800,
            height: 600,
            title: "OpenMiner".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrontFaceCfg {
    #[default]
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderCfg {
    #[serde(default = "default_validation")]
    pub validation: bool,
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub front_face: FrontFaceCfg,
    #[serde(default = "default_shader_dir")]
    pub shader_dir: PathBuf,
    #[serde(default)]
    pub embedded_shaders: bool,
    #[serde(default = "default_capacity")]
    pub vertex_capacity: u64,
    #[serde(default = "default_capacity")]
    pub index_capacity: u64,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            validation: default_validation(),
            clear_color: default_clear(),
            front_face: FrontFaceCfg::Clockwise,
            shader_dir: default_shader_dir(),
            embedded_shaders: false,
            vertex_capacity: default_capacity(),
            index_capacity: default_capacity(),
        }
    }
}

fn default_validation() -> bool {
    cfg!(debug_assertions)
}
fn default_clear() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}
fn default_shader_dir() -> PathBuf {
    PathBuf::from("Shaders")
}
fn default_capacity() -> u64 {
    miner_render_vk::context::DEFAULT_BUFFER_CAPACITY
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CameraCfg {
    /// Degrees per pixel of cursor movement.
    pub sensitivity: f32,
    /// World units per second.
    pub speed: f32,
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraCfg {
    fn default() -> Self {
        CameraCfg {
            sensitivity: 0.05,
            speed: 2.5,
            fov_deg: 45.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl RenderCfg {
    pub fn context_config(&self) -> ContextConfig {
        let winding = match self.front_face {
            FrontFaceCfg::Clockwise => Winding::Clockwise,
            FrontFaceCfg::CounterClockwise => Winding::CounterClockwise,
        };
        ContextConfig {
            validation: self.validation,
            clear_color: self.clear_color,
            winding,
            blend: true,
            shaders: self.shader_source(),
            vertex_capacity: self.vertex_capacity,
            index_capacity: self.index_capacity,
        }
    }

    #[cfg(feature = "embedded-shaders")]
    fn shader_source(&self) -> ShaderSource {
        if self.embedded_shaders {
            ShaderSource::Embedded
        } else {
            ShaderSource::Dir(self.shader_dir.clone())
        }
    }

    #[cfg(not(feature = "embedded-shaders"))]
    fn shader_source(&self) -> ShaderSource {
        if self.embedded_shaders {
            warn!("embedded shaders requested but not compiled in; reading {}", self.shader_dir.display());
        }
        ShaderSource::Dir(self.shader_dir.clone())
    }
}

pub fn parse(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str::<AppCfg>(text)
}

/// Missing file: defaults. Unreadable or malformed file: a warning, then defaults.
pub fn load(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(text) => match parse(&text) {
            Ok(cfg) => {
                info!("loaded config from {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("ignoring malformed {}: {e}", path.display());
                AppCfg::default()
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => AppCfg::default(),
        Err(e) => {
            warn!("could not read {}: {e}", path.display());
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!((cfg.window.width, cfg.window.height), (800, 600));
        assert_eq!(cfg.window.title, "OpenMiner");
        assert_eq!(cfg.render.vertex_capacity, 10240);
        assert_eq!(cfg.render.front_face, FrontFaceCfg::Clockwise);
        assert_eq!(cfg.camera.fov_deg, 45.0);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse(
            r#"
            [window]
            width = 1280

            [render]
            validation = false
            front_face = "counter_clockwise"
            clear_color = [0.1, 0.2, 0.3, 1.0]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.window.height, 600);
        let ctx = cfg.render.context_config();
        assert!(!ctx.validation);
        assert_eq!(ctx.winding, Winding::CounterClockwise);
        assert_eq!(ctx.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(ctx.shaders, ShaderSource::Dir(PathBuf::from("Shaders")));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        assert!(parse("[window]\nwidth = \"wide\"").is_err());
        let path = std::env::temp_dir().join(format!("miner-cfg-{}.toml", std::process::id()));
        fs::write(&path, "[render\nvalidation = ").unwrap();
        let cfg = load(&path);
        assert_eq!(cfg.window.width, 800);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_defaults() {
        let cfg = load(Path::new("/nonexistent/miner.toml"));
        assert_eq!(cfg.camera.sensitivity, 0.05);
    }
}
