//! Lit scene pass

use crate::backend::traits::*;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::scene::ClearFlags;
use std::any::Any;
use std::marker::PhantomData;

/// Draws the main camera's visible objects with their materials, testing
/// against the prepass depth.
pub struct ScenePass<B: GraphicsBackend> {
    depth: ResourceId,
    color: ResourceId,
    _backend: PhantomData<fn() -> B>,
}

impl<B: GraphicsBackend + 'static> ScenePass<B> {
    /// `color` is a graph texture when post processing follows, or the
    /// swapchain otherwise
    pub fn new(depth: ResourceId, color: ResourceId) -> Self {
        Self {
            depth,
            color,
            _backend: PhantomData,
        }
    }

    pub fn color(&self) -> ResourceId {
        self.color
    }
}

impl<B: GraphicsBackend + 'static> RenderPass for ScenePass<B> {
    fn name(&self) -> &str {
        "Scene Pass"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read(self.depth, ResourceUsage::DepthStencilRead);
        ctx.write(self.color, ResourceUsage::RenderTarget);
    }

    fn execute(&mut self, ctx: &mut PassExecuteContext) {
        let width = ctx.width;
        let height = ctx.height;
        let color_view = ctx.get_texture(self.color);
        let depth_view = ctx.get_texture(self.depth);
        let scene = ctx.scene;
        let geometry = ctx.geometry;

        let Some(backend) = ctx.backend::<B>() else {
            return;
        };
        let (Some(color_view), Some(depth_view)) = (color_view, depth_view) else {
            return;
        };

        let load_op = match scene.camera.clear {
            ClearFlags::SolidColor(color) => LoadOp::Clear(color),
            ClearFlags::DepthOnly | ClearFlags::Nothing => LoadOp::Load,
        };

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Scene Pass".into()),
            color_attachments: vec![ColorAttachment {
                view: color_view,
                load_op,
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: depth_view,
                depth_load_op: LoadOp::Load,
                depth_store_op: StoreOp::Store,
                depth_clear_value: 1.0,
            }),
        });

        backend.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        backend.set_render_pipeline(geometry.lit_pipeline());
        backend.set_bind_group(0, geometry.main_camera().bind_group);
        geometry.draw_objects(backend, scene, scene.camera.culling_mask, true);
        backend.end_render_pass();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
