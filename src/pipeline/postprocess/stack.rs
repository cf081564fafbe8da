//! Ordered list of screen-space effects
//!
//! The stack runs every active effect in order, ping-ponging between pooled
//! temporaries, and writes the last result into the destination. With no
//! active effect the source is blitted through unchanged.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::geometry::SceneGeometry;
use crate::pipeline::postprocess::Blitter;
use crate::render_graph::{CameraCommands, SharedResourceHandle, TargetRef, TemporaryTargets};
use crate::resources::ShaderLibrary;
use crate::scene::Scene;
use std::any::Any;

/// Per-frame setup data handed to every effect before rendering
pub struct EffectPrepareContext<'a, B> {
    pub backend: &'a mut B,
    pub scene: &'a Scene,
    pub geometry: &'a SceneGeometry,
    pub shaders: &'a ShaderLibrary,
    pub commands: &'a mut CameraCommands,
    pub shared: &'a SharedResourceHandle,
    pub color_format: TextureFormat,
}

/// Everything an effect may use while rendering
pub struct PostProcessContext<'a, B> {
    pub backend: &'a mut B,
    pub scene: &'a Scene,
    pub geometry: &'a SceneGeometry,
    pub shared: &'a SharedResourceHandle,
    pub temporaries: &'a mut TemporaryTargets,
    pub blitter: &'a Blitter,
    /// Depth written by the scene's depth prepass
    pub scene_depth: Option<TargetRef>,
}

impl<'a, B: GraphicsBackend> PostProcessContext<'a, B> {
    /// Copy `source` to `destination` unchanged. Aliased targets are left alone.
    pub fn passthrough(&mut self, source: TargetRef, destination: TargetRef) {
        if source.aliases(&destination) {
            return;
        }
        if let Err(e) = self.blitter.blit(self.backend, source, destination) {
            log::error!("Post-process passthrough failed: {}", e);
        }
    }
}

pub trait PostProcessEffect<B: GraphicsBackend>: Send + Sync {
    fn name(&self) -> &str;

    /// Inactive effects are skipped entirely
    fn is_enabled_and_supported(&self, scene: &Scene) -> bool;

    /// Runs every frame for every effect, active or not
    fn prepare(&mut self, _ctx: &mut EffectPrepareContext<B>) {}

    /// Render `source` into `destination`. Must not fail: effects degrade to
    /// a passthrough instead.
    fn render(
        &mut self,
        ctx: &mut PostProcessContext<B>,
        source: TargetRef,
        destination: TargetRef,
    );

    /// Release everything the effect owns. Must be safe to call repeatedly.
    fn release(
        &mut self,
        backend: &mut B,
        commands: &mut CameraCommands,
        shared: &SharedResourceHandle,
    );

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub struct PostProcessStack<B: GraphicsBackend> {
    effects: Vec<Box<dyn PostProcessEffect<B>>>,
    blitter: Option<Blitter>,
}

impl<B: GraphicsBackend + 'static> PostProcessStack<B> {
    pub fn new() -> Self {
        Self {
            effects: Vec::new(),
            blitter: None,
        }
    }

    /// Append an effect; it runs after every effect added before it
    pub fn add_effect<E: PostProcessEffect<B> + 'static>(&mut self, effect: E) -> usize {
        log::info!("Adding post effect '{}'", effect.name());
        self.effects.push(Box::new(effect));
        self.effects.len() - 1
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn effect_names(&self) -> Vec<&str> {
        self.effects.iter().map(|e| e.name()).collect()
    }

    pub fn find_effect<E: PostProcessEffect<B> + 'static>(&self) -> Option<&E> {
        self.effects.iter().find_map(|e| e.as_any().downcast_ref::<E>())
    }

    pub fn find_effect_mut<E: PostProcessEffect<B> + 'static>(&mut self) -> Option<&mut E> {
        self.effects
            .iter_mut()
            .find_map(|e| e.as_any_mut().downcast_mut::<E>())
    }

    /// Remove an effect by index. The caller releases it.
    pub fn remove_effect(&mut self, index: usize) -> Option<Box<dyn PostProcessEffect<B>>> {
        (index < self.effects.len()).then(|| self.effects.remove(index))
    }

    pub fn prepare(&mut self, ctx: &mut EffectPrepareContext<B>) {
        match self.blitter.as_mut() {
            Some(blitter) => {
                if let Err(e) = blitter.ensure_format(ctx.backend, ctx.color_format) {
                    log::error!("Failed to create blit pipeline: {}", e);
                }
            }
            None => match Blitter::new(ctx.backend, ctx.color_format) {
                Ok(blitter) => self.blitter = Some(blitter),
                Err(e) => log::error!("Failed to create blitter: {}", e),
            },
        }

        for effect in &mut self.effects {
            effect.prepare(ctx);
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        geometry: &SceneGeometry,
        shared: &SharedResourceHandle,
        temporaries: &mut TemporaryTargets,
        scene_depth: Option<TargetRef>,
        source: TargetRef,
        destination: TargetRef,
    ) {
        let Some(blitter) = self.blitter.as_ref() else {
            log::warn!("Post-process stack rendered before it was prepared");
            return;
        };

        let active: Vec<usize> = self
            .effects
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_enabled_and_supported(scene))
            .map(|(i, _)| i)
            .collect();

        let mut ctx = PostProcessContext {
            backend,
            scene,
            geometry,
            shared,
            temporaries,
            blitter,
            scene_depth,
        };

        if active.is_empty() {
            ctx.passthrough(source, destination);
            return;
        }

        let mut current = source;
        let mut current_temp = None;
        for (step, &index) in active.iter().enumerate() {
            let last = step + 1 == active.len();
            let mut next_temp = None;
            let target = if last {
                destination
            } else {
                match ctx.temporaries.acquire(
                    ctx.backend,
                    "Post Effect Target",
                    source.width,
                    source.height,
                    source.format,
                    TextureUsage::RENDER_ATTACHMENT
                        | TextureUsage::TEXTURE_BINDING
                        | TextureUsage::COPY_SRC,
                ) {
                    Ok(temp) => {
                        let target = temp.as_target();
                        next_temp = Some(temp);
                        target
                    }
                    Err(e) => {
                        log::error!("Failed to allocate post effect target: {}", e);
                        ctx.passthrough(current, destination);
                        break;
                    }
                }
            };

            self.effects[index].render(&mut ctx, current, target);

            if let Some(temp) = current_temp.take() {
                ctx.temporaries.release(temp);
            }
            current = target;
            current_temp = next_temp;
        }

        if let Some(temp) = current_temp {
            ctx.temporaries.release(temp);
        }
    }

    pub fn release(
        &mut self,
        backend: &mut B,
        commands: &mut CameraCommands,
        shared: &SharedResourceHandle,
    ) {
        for effect in &mut self.effects {
            effect.release(backend, commands, shared);
        }
        if let Some(mut blitter) = self.blitter.take() {
            blitter.release(backend);
        }
    }
}

impl<B: GraphicsBackend + 'static> Default for PostProcessStack<B> {
    fn default() -> Self {
        Self::new()
    }
}
