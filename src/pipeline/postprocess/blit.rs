//! Fullscreen copy between render targets

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::postprocess::fullscreen_shader;
use crate::render_graph::TargetRef;
use std::collections::HashMap;

/// Copies a texture onto a render target with a fullscreen triangle. Unlike
/// a texture copy this works for targets without a backing texture (the
/// swapchain) and across formats.
pub struct Blitter {
    layout: BindGroupLayoutHandle,
    pipelines: HashMap<TextureFormat, RenderPipelineHandle>,
}

impl Blitter {
    pub fn new<B: GraphicsBackend>(backend: &mut B, format: TextureFormat) -> BackendResult<Self> {
        let layout = backend.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Texture {
                sample_type: TextureSampleType::Float { filterable: false },
            },
        }])?;
        let mut blitter = Self {
            layout,
            pipelines: HashMap::new(),
        };
        if let Err(e) = blitter.ensure_format(backend, format) {
            blitter.release(backend);
            return Err(e);
        }
        Ok(blitter)
    }

    /// Make sure blits into `format` targets are possible
    pub fn ensure_format<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        format: TextureFormat,
    ) -> BackendResult<()> {
        if self.pipelines.contains_key(&format) {
            return Ok(());
        }
        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(format!("Blit Pipeline {:?}", format)),
            vertex_shader: fullscreen_shader(BLIT_FRAGMENT),
            fragment_shader: Some(fullscreen_shader(BLIT_FRAGMENT)),
            vertex_layouts: vec![],
            bind_group_layouts: vec![self.layout],
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

    pub fn blit<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        source: TargetRef,
        destination: TargetRef,
    ) -> BackendResult<()> {
        let Some(&pipeline) = self.pipelines.get(&destination.format) else {
            return Err(BackendError::PipelineCreationFailed(format!(
                "no blit pipeline for {:?}",
                destination.format
            )));
        };
        let bind_group =
            backend.create_bind_group(self.layout, &[(0, BindGroupEntry::Texture(source.view))])?;

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Blit".into()),
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

        backend.destroy_bind_group(bind_group);
        Ok(())
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for (_, pipeline) in self.pipelines.drain() {
            backend.destroy_render_pipeline(pipeline);
        }
        backend.destroy_bind_group_layout(self.layout);
    }
}

/// 1:1 texel fetch
const BLIT_FRAGMENT: &str = r#"
@group(0) @binding(0) var source_texture: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) position: vec4<f32>) -> @location(0) vec4<f32> {
    let size = vec2<i32>(textureDimensions(source_texture));
    let coord = clamp(vec2<i32>(floor(position.xy)), vec2<i32>(0), size - vec2<i32>(1));
    return textureLoad(source_texture, coord, 0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blit_shader_validates() {
        let module = crate::pipeline::validate_wgsl("blit", &fullscreen_shader(BLIT_FRAGMENT));
        let stages: Vec<_> = module
            .entry_points
            .iter()
            .map(|e| (e.name.as_str(), e.stage))
            .collect();
        assert_eq!(
            stages,
            vec![("vs_main", naga::ShaderStage::Vertex), ("fs_main", naga::ShaderStage::Fragment)]
        );
    }
}
