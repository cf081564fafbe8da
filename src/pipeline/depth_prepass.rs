//! Depth pre-pass
//!
//! Lays down the main camera's depth before anything else draws. Camera
//! commands attached at [`CameraEvent::AfterDepthTexture`] run right after it.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::geometry::SceneGeometry;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::render_graph::CameraEvent;
use crate::scene::ClearFlags;
use std::any::Any;
use std::marker::PhantomData;

/// Depth pre-pass
pub struct DepthPrepass<B: GraphicsBackend> {
    depth_texture: ResourceId,
    _backend: PhantomData<fn() -> B>,
}

impl<B: GraphicsBackend + 'static> DepthPrepass<B> {
    pub fn new(depth_texture: ResourceId) -> Self {
        Self {
            depth_texture,
            _backend: PhantomData,
        }
    }

    pub fn depth_texture(&self) -> ResourceId {
        self.depth_texture
    }
}

/// Depth target the prepass expects: sampleable for edge tests and copyable
/// for depth snapshots
pub fn scene_depth_descriptor(width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor::render_target("scene_depth", width, height, TextureFormat::Depth32Float)
        .with_usage(
            TextureUsage::RENDER_ATTACHMENT
                | TextureUsage::TEXTURE_BINDING
                | TextureUsage::COPY_SRC,
        )
}

impl<B: GraphicsBackend + 'static> RenderPass for DepthPrepass<B> {
    fn name(&self) -> &str {
        "Depth Prepass"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.write(self.depth_texture, ResourceUsage::DepthStencilWrite);
    }

    fn execute(&mut self, ctx: &mut PassExecuteContext) {
        let width = ctx.width;
        let height = ctx.height;
        let depth_view = ctx.get_texture(self.depth_texture);
        let scene = ctx.scene;
        let geometry: &SceneGeometry = ctx.geometry;

        let Some(backend) = ctx.backend::<B>() else {
            return;
        };

        let Some(depth_view) = depth_view else {
            return;
        };

        let depth_load_op = match scene.camera.clear {
            ClearFlags::Nothing => LoadOp::Load,
            ClearFlags::SolidColor(_) | ClearFlags::DepthOnly => {
                LoadOp::Clear([1.0, 0.0, 0.0, 0.0])
            }
        };

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Depth Prepass".into()),
            color_attachments: vec![],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: depth_view,
                depth_load_op,
                depth_store_op: StoreOp::Store,
                depth_clear_value: 1.0,
            }),
        });

        backend.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        backend.set_render_pipeline(geometry.depth_pipeline());
        backend.set_bind_group(0, geometry.main_camera().bind_group);
        let draws = geometry.draw_objects(backend, scene, scene.camera.culling_mask, false);
        log::trace!("Depth prepass drew {} objects", draws);
        backend.end_render_pass();
    }

    fn completes(&self) -> Option<CameraEvent> {
        Some(CameraEvent::AfterDepthTexture)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
