//! Pixelation composite pass

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::censor::error::{CensorError, CensorResult};
use crate::pipeline::censor::settings::CensorSettings;
use crate::pipeline::postprocess::fullscreen_shader;
use crate::render_graph::TargetRef;
use crate::resources::{ShaderLibrary, CENSOR_COMPOSITE_SHADER};
use crate::scene::Projection;
use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;

/// Uniform block of the composite shader. The software reference consumes
/// the same block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CensorParams {
    pub screen_size: [f32; 2],
    pub mask_size: [f32; 2],
    pub pixel_size: f32,
    pub hard_edges: f32,
    pub show_mask: f32,
    pub depth_tolerance: f32,
    pub near: f32,
    pub far: f32,
    pub orthographic: f32,
    pub _pad: f32,
}

impl CensorParams {
    pub fn new(
        settings: &CensorSettings,
        screen: (u32, u32),
        mask: (u32, u32),
        projection: &Projection,
    ) -> Self {
        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        Self {
            screen_size: [screen.0 as f32, screen.1 as f32],
            mask_size: [mask.0 as f32, mask.1 as f32],
            pixel_size: settings.pixel_size() as f32,
            hard_edges: flag(settings.hard_edges),
            show_mask: flag(settings.show_mask),
            depth_tolerance: settings.depth_tolerance,
            near: projection.near(),
            far: projection.far(),
            orthographic: flag(projection.is_orthographic()),
            _pad: 0.0,
        }
    }

    /// Drop the silhouette test, e.g. while no depth snapshot exists
    pub fn without_hard_edges(mut self) -> Self {
        self.hard_edges = 0.0;
        self
    }

    pub fn hard_edges(&self) -> bool {
        self.hard_edges > 0.5
    }

    pub fn show_mask(&self) -> bool {
        self.show_mask > 0.5
    }

    pub fn linearize(&self, depth: f32) -> f32 {
        if self.orthographic > 0.5 {
            self.near + depth * (self.far - self.near)
        } else {
            self.near * self.far / (self.far - depth * (self.far - self.near))
        }
    }
}

/// Textures read by one composite draw
#[derive(Debug, Clone, Copy)]
pub struct CompositeInputs {
    pub source: TargetRef,
    pub mask: TargetRef,
    /// Only sampled with hard edges; a fallback is bound otherwise
    pub scene_depth: Option<TargetRef>,
    pub mask_depth: Option<TargetRef>,
}

pub struct CompositePipeline {
    source: String,
    layout: Option<BindGroupLayoutHandle>,
    params_buffer: Option<BufferHandle>,
    fallback_depth: Option<(TextureHandle, TextureViewHandle)>,
    pipelines: HashMap<TextureFormat, RenderPipelineHandle>,
}

impl CompositePipeline {
    /// Everything is torn down again if any allocation fails
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        shaders: &ShaderLibrary,
        format: TextureFormat,
    ) -> CensorResult<Self> {
        let source = shaders
            .find(CENSOR_COMPOSITE_SHADER)
            .ok_or_else(|| CensorError::ShaderNotFound(CENSOR_COMPOSITE_SHADER.to_string()))?;
        let mut pipeline = Self {
            source: fullscreen_shader(source),
            layout: None,
            params_buffer: None,
            fallback_depth: None,
            pipelines: HashMap::new(),
        };
        if let Err(e) = pipeline.allocate(backend, format) {
            pipeline.release(backend);
            return Err(e.into());
        }
        Ok(pipeline)
    }

    fn allocate<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        format: TextureFormat,
    ) -> BackendResult<()> {
        let texture = |binding: u32, sample_type: TextureSampleType| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Texture { sample_type },
        };
        let color = TextureSampleType::Float { filterable: false };
        self.layout = Some(backend.create_bind_group_layout(&[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::UniformBuffer,
            },
            texture(1, color),
            texture(2, color),
            texture(3, TextureSampleType::Depth),
            texture(4, TextureSampleType::Depth),
        ])?);

        self.params_buffer = Some(backend.create_buffer(&BufferDescriptor::uniform(
            "Censor Params",
            std::mem::size_of::<CensorParams>() as u64,
        ))?);

        let fallback = backend.create_texture(&TextureDescriptor::render_target(
            "Censor Fallback Depth",
            1,
            1,
            TextureFormat::Depth32Float,
        ))?;
        match backend.create_texture_view(fallback) {
            Ok(view) => self.fallback_depth = Some((fallback, view)),
            Err(e) => {
                backend.destroy_texture(fallback);
                return Err(e);
            }
        }

        self.ensure_format(backend, format)
    }

    /// Make sure the composite can write `format` targets
    pub fn ensure_format<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        format: TextureFormat,
    ) -> BackendResult<()> {
        if self.pipelines.contains_key(&format) {
            return Ok(());
        }
        let Some(layout) = self.layout else {
            return Err(BackendError::PipelineCreationFailed(
                "censor composite already released".into(),
            ));
        };
        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Censor Composite Pipeline".into()),
            vertex_shader: self.source.clone(),
            fragment_shader: Some(self.source.clone()),
            vertex_layouts: vec![],
            bind_group_layouts: vec![layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: None,
            color_targets: vec![ColorTargetState {
                format,
                write_mask: ColorWrites::ALL,
            }],
        })?;
        self.pipelines.insert(format, pipeline);
        Ok(())
    }

    /// Run the composite from `inputs.source` into `destination`
    pub fn draw<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        params: &CensorParams,
        inputs: CompositeInputs,
        destination: TargetRef,
    ) -> BackendResult<()> {
        self.ensure_format(backend, destination.format)?;
        let (Some(layout), Some(buffer), Some((_, fallback)), Some(&pipeline)) = (
            self.layout,
            self.params_buffer,
            self.fallback_depth,
            self.pipelines.get(&destination.format),
        ) else {
            return Err(BackendError::PipelineCreationFailed(
                "censor composite not initialized".into(),
            ));
        };

        backend.write_buffer(buffer, 0, bytemuck::bytes_of(params));

        let scene_depth = inputs.scene_depth.map_or(fallback, |t| t.view);
        let mask_depth = inputs.mask_depth.map_or(fallback, |t| t.view);
        let bind_group = backend.create_bind_group(
            layout,
            &[
                (
                    0,
                    BindGroupEntry::Buffer {
                        buffer,
                        offset: 0,
                        size: None,
                    },
                ),
                (1, BindGroupEntry::Texture(inputs.source.view)),
                (2, BindGroupEntry::Texture(inputs.mask.view)),
                (3, BindGroupEntry::Texture(scene_depth)),
                (4, BindGroupEntry::Texture(mask_depth)),
            ],
        )?;

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Censor Composite".into()),
            color_attachments: vec![ColorAttachment {
                view: destination.view,
                load_op: LoadOp::Clear([0.0, 0.0, 0.0, 1.0]),
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });
        let (width, height) = (destination.width as f32, destination.height as f32);
        backend.set_viewport(0.0, 0.0, width, height, 0.0, 1.0);
        backend.set_render_pipeline(pipeline);
        backend.set_bind_group(0, bind_group);
        backend.draw(0..3, 0..1);
        backend.end_render_pass();

        // Bind groups must not outlive the temporaries they reference
        backend.destroy_bind_group(bind_group);
        Ok(())
    }

    /// Safe after a partial allocation and on repeated calls
    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for (_, pipeline) in self.pipelines.drain() {
            backend.destroy_render_pipeline(pipeline);
        }
        if let Some((texture, view)) = self.fallback_depth.take() {
            backend.destroy_texture_view(view);
            backend.destroy_texture(texture);
        }
        if let Some(buffer) = self.params_buffer.take() {
            backend.destroy_buffer(buffer);
        }
        if let Some(layout) = self.layout.take() {
            backend.destroy_bind_group_layout(layout);
        }
    }
}
