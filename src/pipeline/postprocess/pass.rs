//! Render graph pass hosting the post-process stack

use crate::backend::traits::*;
use crate::pipeline::postprocess::{EffectPrepareContext, PostProcessStack};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::render_graph::{CameraCommands, CameraEvent, SharedResourceHandle};
use std::any::Any;
use std::marker::PhantomData;

/// Reads the scene color and depth, writes the final image to `output`
pub struct PostProcessPass<B: GraphicsBackend> {
    scene_color: ResourceId,
    scene_depth: ResourceId,
    output: ResourceId,
    stack: Option<PostProcessStack<B>>,
    _backend: PhantomData<fn() -> B>,
}

impl<B: GraphicsBackend + 'static> PostProcessPass<B> {
    pub fn new(scene_color: ResourceId, scene_depth: ResourceId, output: ResourceId) -> Self {
        Self {
            scene_color,
            scene_depth,
            output,
            stack: Some(PostProcessStack::new()),
            _backend: PhantomData,
        }
    }

    pub fn stack(&self) -> Option<&PostProcessStack<B>> {
        self.stack.as_ref()
    }

    pub fn stack_mut(&mut self) -> Option<&mut PostProcessStack<B>> {
        self.stack.as_mut()
    }

    /// Move the stack out, e.g. to carry it over into a rebuilt graph
    pub fn take_stack(&mut self) -> Option<PostProcessStack<B>> {
        self.stack.take()
    }

    pub fn set_stack(&mut self, stack: PostProcessStack<B>) {
        self.stack = Some(stack);
    }
}

impl<B: GraphicsBackend + 'static> RenderPass for PostProcessPass<B> {
    fn name(&self) -> &str {
        "Post Processing"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read(self.scene_color, ResourceUsage::TextureRead);
        ctx.read(self.scene_depth, ResourceUsage::DepthStencilRead);
        ctx.write(self.output, ResourceUsage::RenderTarget);
    }

    fn prepare(&mut self, ctx: &mut PassPrepareContext) {
        let Some(stack) = self.stack.as_mut() else {
            return;
        };
        let Some(backend) = ctx.backend.downcast_mut::<B>() else {
            return;
        };
        let mut effect_ctx = EffectPrepareContext {
            backend,
            scene: ctx.scene,
            geometry: ctx.geometry,
            shaders: ctx.shaders,
            commands: &mut *ctx.commands,
            shared: ctx.shared,
            color_format: ctx.color_format,
        };
        stack.prepare(&mut effect_ctx);
    }

    fn execute(&mut self, ctx: &mut PassExecuteContext) {
        let source = ctx.get_target(self.scene_color);
        let destination = ctx.get_target(self.output);
        let scene_depth = ctx.get_target(self.scene_depth);
        let (Some(source), Some(destination)) = (source, destination) else {
            log::warn!("Post processing skipped: scene color or output target missing");
            return;
        };
        let Some(stack) = self.stack.as_mut() else {
            return;
        };

        let scene = ctx.scene;
        let geometry = ctx.geometry;
        let shared = ctx.shared;
        let Some(backend) = ctx.backend.downcast_mut::<B>() else {
            return;
        };
        stack.render(
            backend,
            scene,
            geometry,
            shared,
            &mut *ctx.temporaries,
            scene_depth,
            source,
            destination,
        );
    }

    fn begins(&self) -> Option<CameraEvent> {
        Some(CameraEvent::BeforeImageEffects)
    }

    fn completes(&self) -> Option<CameraEvent> {
        Some(CameraEvent::AfterImageEffects)
    }

    fn release(
        &mut self,
        backend: &mut dyn Any,
        commands: &mut CameraCommands,
        shared: &SharedResourceHandle,
    ) {
        let (Some(stack), Some(backend)) = (self.stack.as_mut(), backend.downcast_mut::<B>()) else {
            return;
        };
        stack.release(backend, commands, shared);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
