//! Persistent viewer settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::pipeline::{PipelineConfig, MAX_BOUNCES};

/// Settings that persist between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Window
    pub window_width: f32,
    pub window_height: f32,
    pub side_panel_width: f32,

    // Rendering
    pub bounces: u32,
    pub target_samples: u32,
    pub samples_per_frame: u32,
    pub exposure: f32,

    // Camera
    pub fov: f32,
    pub camera_distance: f32,
    pub camera_yaw: f32,
    pub camera_pitch: f32,

    /// Directory with WGSL stage files; embedded shaders when unset.
    pub shader_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let config = PipelineConfig::default();
        Self {
            window_width: 1280.0,
            window_height: 720.0,
            side_panel_width: 220.0,
            bounces: config.bounces,
            target_samples: config.target_samples,
            samples_per_frame: config.samples_per_frame,
            exposure: 1.0,
            fov: 45.0,
            camera_distance: 4.6,
            camera_yaw: 0.0,
            camera_pitch: -9.0,
            shader_dir: None,
        }
    }
}

/// Environment override for [`Settings::shader_dir`].
pub const SHADER_DIR_ENV: &str = "RAYGL_SHADER_DIR";

impl Settings {
    /// Get settings file path
    fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("raygl");
            std::fs::create_dir_all(&p).ok();
            p.push("settings.json");
            p
        })
    }

    /// Load settings from file, falling back to defaults
    pub fn load() -> Self {
        let settings: Self = Self::path()
            .and_then(|p| std::fs::read_to_string(&p).ok())
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        settings.sanitized()
    }

    /// Save settings to file
    pub fn save(&self) {
        if let Some(path) = Self::path() {
            match serde_json::to_string_pretty(self) {
                Ok(json) => {
                    if let Err(e) = std::fs::write(&path, json) {
                        log::warn!("could not save settings to {}: {e}", path.display());
                    }
                }
                Err(e) => log::warn!("could not serialize settings: {e}"),
            }
        }
    }

    /// Clamp hand-edited values into the ranges the pipeline accepts.
    pub fn sanitized(mut self) -> Self {
        self.bounces = self.bounces.clamp(1, MAX_BOUNCES);
        self.target_samples = self.target_samples.max(1);
        self.samples_per_frame = self.samples_per_frame.clamp(1, 64);
        self.fov = self.fov.clamp(5.0, 150.0);
        if !self.exposure.is_finite() || self.exposure <= 0.0 {
            self.exposure = 1.0;
        }
        self
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            bounces: self.bounces,
            target_samples: self.target_samples,
            samples_per_frame: self.samples_per_frame,
        }
    }

    /// Shader directory: environment first, then settings.
    pub fn shader_dir(&self) -> Option<PathBuf> {
        std::env::var_os(SHADER_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| self.shader_dir.clone())
    }
}
