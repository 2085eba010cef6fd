//! Shader sources, stage compilation and program linking.
//!
//! Every stage is compiled from `common.wgsl` followed by its own file.
//! Compilation runs inside a validation error scope and its diagnostics are
//! collected with `get_compilation_info`; pipeline creation runs inside a
//! second scope so interface mismatches surface as [`Error::Link`].

use std::borrow::Cow;
use std::path::Path;

use crate::util::{Error, Result};

use super::FLOAT_TARGET;

const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");
const CAMERA_WGSL: &str = include_str!("shaders/camera.wgsl");
const BOUNCE_WGSL: &str = include_str!("shaders/bounce.wgsl");
const ACCUMULATE_WGSL: &str = include_str!("shaders/accumulate.wgsl");
const BLEND_WGSL: &str = include_str!("shaders/blend.wgsl");
const PRESENT_WGSL: &str = include_str!("shaders/present.wgsl");

/// Shading stage, one WGSL file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Camera,
    Bounce,
    Accumulate,
    Blend,
    Present,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Camera,
        Stage::Bounce,
        Stage::Accumulate,
        Stage::Blend,
        Stage::Present,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Bounce => "bounce",
            Self::Accumulate => "accumulate",
            Self::Blend => "blend",
            Self::Present => "present",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Camera => "camera.wgsl",
            Self::Bounce => "bounce.wgsl",
            Self::Accumulate => "accumulate.wgsl",
            Self::Blend => "blend.wgsl",
            Self::Present => "present.wgsl",
        }
    }

    /// Fragment entry point.
    pub fn entry_point(self) -> &'static str {
        match self {
            Self::Camera => "fs_camera",
            Self::Bounce => "fs_bounce",
            Self::Accumulate => "fs_accumulate",
            Self::Blend => "fs_blend",
            Self::Present => "fs_present",
        }
    }
}

/// WGSL text of every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    pub common: String,
    pub camera: String,
    pub bounce: String,
    pub accumulate: String,
    pub blend: String,
    pub present: String,
}

impl ShaderSources {
    /// Sources compiled into the binary.
    pub fn embedded() -> Self {
        Self {
            common: COMMON_WGSL.to_owned(),
            camera: CAMERA_WGSL.to_owned(),
            bounce: BOUNCE_WGSL.to_owned(),
            accumulate: ACCUMULATE_WGSL.to_owned(),
            blend: BLEND_WGSL.to_owned(),
            present: PRESENT_WGSL.to_owned(),
        }
    }

    /// Read `common.wgsl` and every stage file from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let read = |name: &str| -> Result<String> {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|e| {
                Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))
            })
        };
        let sources = Self {
            common: read("common.wgsl")?,
            camera: read(Stage::Camera.file_name())?,
            bounce: read(Stage::Bounce.file_name())?,
            accumulate: read(Stage::Accumulate.file_name())?,
            blend: read(Stage::Blend.file_name())?,
            present: read(Stage::Present.file_name())?,
        };
        log::info!("loaded shader sources from {}", dir.display());
        Ok(sources)
    }

    pub fn stage_source(&self, stage: Stage) -> &str {
        match stage {
            Stage::Camera => &self.camera,
            Stage::Bounce => &self.bounce,
            Stage::Accumulate => &self.accumulate,
            Stage::Blend => &self.blend,
            Stage::Present => &self.present,
        }
    }

    /// Full module text of `stage`: the shared prefix, then the stage.
    pub fn module_source(&self, stage: Stage) -> String {
        format!("{}\n{}", self.common, self.stage_source(stage))
    }

    /// Map a line of [`module_source`](Self::module_source) back to its file.
    pub fn locate(&self, stage: Stage, line: u32) -> (&'static str, u32) {
        let prefix = self.common.matches('\n').count() as u32 + 1;
        if line > prefix {
            (stage.file_name(), line - prefix)
        } else {
            ("common.wgsl", line)
        }
    }
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self::embedded()
    }
}

/// Compile one stage. Fails with [`Error::Compile`] carrying the compiler log.
pub fn compile_stage(device: &wgpu::Device, sources: &ShaderSources, stage: Stage) -> Result<wgpu::ShaderModule> {
    let _span = tracing::debug_span!("compile_stage", stage = stage.name()).entered();
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(stage.name()),
        source: wgpu::ShaderSource::Wgsl(Cow::Owned(sources.module_source(stage))),
    });
    let info = pollster::block_on(module.get_compilation_info());
    let scope = pollster::block_on(device.pop_error_scope());

    let mut diagnostics = String::new();
    for msg in &info.messages {
        if !matches!(msg.message_type, wgpu::CompilationMessageType::Error) {
            log::warn!("{} stage: {}", stage.name(), msg.message);
            continue;
        }
        match &msg.location {
            Some(loc) => {
                let (file, line) = sources.locate(stage, loc.line_number);
                diagnostics.push_str(&format!("{file}:{line}:{}: {}\n", loc.line_position, msg.message));
            }
            None => diagnostics.push_str(&format!("{}\n", msg.message)),
        }
    }
    if diagnostics.is_empty() {
        if let Some(err) = scope {
            diagnostics = err.to_string();
        }
    }
    if !diagnostics.is_empty() {
        return Err(Error::Compile {
            stage: stage.name(),
            log: diagnostics,
        });
    }
    Ok(module)
}

/// One linked program: pipeline plus its group-0 layout.
#[derive(Debug)]
pub struct Program {
    pub pipeline: wgpu::RenderPipeline,
    pub layout: wgpu::BindGroupLayout,
}

/// Link a fullscreen program writing `targets`.
pub fn link_program(
    device: &wgpu::Device,
    program: &'static str,
    module: &wgpu::ShaderModule,
    entry_point: &'static str,
    entries: &[wgpu::BindGroupLayoutEntry],
    targets: &[Option<wgpu::ColorTargetState>],
) -> Result<Program> {
    let _span = tracing::debug_span!("link_program", program).entered();
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(program),
        entries,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(program),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(program),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_fullscreen"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            targets,
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(Error::Link {
            program,
            log: err.to_string(),
        });
    }
    Ok(Program { pipeline, layout })
}

pub(crate) fn uniform_entry(binding: u32, dynamic: bool, size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: wgpu::BufferSize::new(size),
        },
        count: None,
    }
}

pub(crate) fn texture_entry(binding: u32, view_dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension,
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
        },
        count: None,
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn float_targets(n: usize) -> Vec<Option<wgpu::ColorTargetState>> {
    vec![Some(FLOAT_TARGET); n]
}

/// The four pass programs.
#[derive(Debug)]
pub struct Programs {
    pub camera: Program,
    pub bounce: Program,
    pub accumulate: Program,
    pub blend: Program,
}

impl Programs {
    /// Compile and link every pass program. Nothing is returned unless all
    /// of them succeed.
    pub fn build(device: &wgpu::Device, sources: &ShaderSources) -> Result<Self> {
        use std::mem::size_of;
        use wgpu::TextureViewDimension::{D2, D2Array};

        use crate::pipeline::{AccumulateUniform, BounceUniform, CameraUniform};

        let camera = link_program(
            device,
            "camera",
            &compile_stage(device, sources, Stage::Camera)?,
            Stage::Camera.entry_point(),
            &[uniform_entry(0, false, size_of::<CameraUniform>() as u64)],
            &float_targets(2),
        )?;
        let bounce = link_program(
            device,
            "bounce",
            &compile_stage(device, sources, Stage::Bounce)?,
            Stage::Bounce.entry_point(),
            &[
                uniform_entry(0, true, size_of::<BounceUniform>() as u64),
                storage_entry(1),
                texture_entry(2, D2),
                texture_entry(3, D2),
            ],
            &float_targets(4),
        )?;
        let accumulate = link_program(
            device,
            "accumulate",
            &compile_stage(device, sources, Stage::Accumulate)?,
            Stage::Accumulate.entry_point(),
            &[
                uniform_entry(0, false, size_of::<AccumulateUniform>() as u64),
                texture_entry(1, D2Array),
                texture_entry(2, D2Array),
            ],
            &float_targets(1),
        )?;
        let blend = link_program(
            device,
            "blend",
            &compile_stage(device, sources, Stage::Blend)?,
            Stage::Blend.entry_point(),
            &[
                uniform_entry(0, false, size_of::<super::BlendUniform>() as u64),
                texture_entry(1, D2),
                texture_entry(2, D2),
            ],
            &float_targets(1),
        )?;
        log::debug!("pass programs linked");
        Ok(Self {
            camera,
            bounce,
            accumulate,
            blend,
        })
    }
}
