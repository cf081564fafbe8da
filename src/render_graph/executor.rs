//! Render graph executor

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::geometry::SceneGeometry;
use crate::render_graph::events::*;
use crate::render_graph::graph::*;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::render_graph::shared::SharedResourceHandle;
use crate::render_graph::temporary::TemporaryTargets;
use crate::resources::ShaderLibrary;
use crate::scene::Scene;
use std::any::Any;
use std::collections::HashMap;

/// Everything a frame reads besides the graph itself
pub struct FrameInputs<'a> {
    pub scene: &'a Scene,
    pub geometry: &'a SceneGeometry,
    pub shaders: &'a ShaderLibrary,
    pub shared: &'a SharedResourceHandle,
    pub color_format: TextureFormat,
    pub width: u32,
    pub height: u32,
}

/// Executor for running the compiled render graph
pub struct RenderGraphExecutor {
    /// Allocated textures mapped by resource ID
    allocated: HashMap<ResourceId, TargetRef>,

    /// External targets (like swapchain)
    external: HashMap<ResourceId, TargetRef>,

    commands: CameraCommands,
    temporaries: TemporaryTargets,
}

impl RenderGraphExecutor {
    pub fn new() -> Self {
        Self {
            allocated: HashMap::new(),
            external: HashMap::new(),
            commands: CameraCommands::new(),
            temporaries: TemporaryTargets::new(),
        }
    }

    /// Set an external target (e.g., swapchain image)
    pub fn set_external_target(&mut self, resource: ResourceId, target: TargetRef) {
        self.external.insert(resource, target);
    }

    pub fn commands(&self) -> &CameraCommands {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut CameraCommands {
        &mut self.commands
    }

    pub fn temporaries(&self) -> &TemporaryTargets {
        &self.temporaries
    }

    /// Allocate textures declared by the graph's passes
    pub fn allocate_resources<B: GraphicsBackend>(
        &mut self,
        graph: &RenderGraph,
        backend: &mut B,
    ) -> BackendResult<()> {
        for resource in graph.resources() {
            let VirtualResource::Texture(tex) = resource else {
                // External resources are set via set_external_target
                continue;
            };
            if self.allocated.contains_key(&tex.id) {
                continue;
            }
            let handle = backend.create_texture(&tex.desc)?;
            let view = match backend.create_texture_view(handle) {
                Ok(view) => view,
                Err(e) => {
                    backend.destroy_texture(handle);
                    return Err(e);
                }
            };
            log::debug!(
                "Allocated graph texture '{}' {}x{} {:?}",
                tex.name,
                tex.desc.width,
                tex.desc.height,
                tex.desc.format
            );
            self.allocated.insert(
                tex.id,
                TargetRef {
                    texture: Some(handle),
                    view,
                    width: tex.desc.width,
                    height: tex.desc.height,
                    format: tex.desc.format,
                },
            );
        }

        Ok(())
    }

    /// Execute the render graph.
    ///
    /// Every pass is prepared first, then passes execute in compiled order.
    /// Camera events declared by a pass fire around its execution.
    pub fn execute<B: GraphicsBackend + 'static>(
        &mut self,
        graph: &mut RenderGraph,
        compiled: &CompiledGraph,
        backend: &mut B,
        inputs: &FrameInputs,
    ) {
        let mut targets: HashMap<ResourceId, TargetRef> = HashMap::new();
        targets.extend(self.allocated.iter().map(|(&k, &v)| (k, v)));
        targets.extend(self.external.iter().map(|(&k, &v)| (k, v)));

        let camera_color = graph.camera_color().and_then(|id| targets.get(&id).copied());
        let camera_depth = graph.camera_depth().and_then(|id| targets.get(&id).copied());
        let camera_id = inputs.scene.camera.id();

        for &pass_id in &compiled.pass_order {
            if let Some(pass) = graph.get_pass_mut(pass_id) {
                let mut ctx = PassPrepareContext {
                    backend: &mut *backend as &mut dyn Any,
                    scene: inputs.scene,
                    geometry: inputs.geometry,
                    shaders: inputs.shaders,
                    commands: &mut self.commands,
                    shared: inputs.shared,
                    color_format: inputs.color_format,
                };
                pass.prepare(&mut ctx);
            }
        }

        for &pass_id in &compiled.pass_order {
            let Some(pass) = graph.get_pass_mut(pass_id) else {
                continue;
            };

            let fire = |commands: &mut CameraCommands, backend: &mut B, event: CameraEvent| {
                let mut ctx = CommandContext {
                    backend: backend as &mut dyn Any,
                    camera: &inputs.scene.camera,
                    depth: camera_depth,
                    color: camera_color,
                    shared: inputs.shared,
                };
                commands.run(camera_id, event, &mut ctx);
            };

            if let Some(event) = pass.begins() {
                fire(&mut self.commands, &mut *backend, event);
            }

            {
                let mut ctx = PassExecuteContext {
                    backend: &mut *backend as &mut dyn Any,
                    scene: inputs.scene,
                    geometry: inputs.geometry,
                    shared: inputs.shared,
                    temporaries: &mut self.temporaries,
                    width: inputs.width,
                    height: inputs.height,
                    resource_targets: &targets,
                };
                pass.execute(&mut ctx);
            }

            if let Some(event) = pass.completes() {
                fire(&mut self.commands, &mut *backend, event);
            }
        }

        self.temporaries.end_frame(backend);
    }

    /// Release everything owned by the graph's passes, commands and pools
    pub fn release_passes<B: GraphicsBackend + 'static>(
        &mut self,
        graph: &mut RenderGraph,
        backend: &mut B,
        shared: &SharedResourceHandle,
    ) {
        for pass in graph.passes_mut() {
            pass.release(&mut *backend, &mut self.commands, shared);
        }
        for mut command in self.commands.drain() {
            log::debug!("Disposing camera command '{}'", command.name());
            command.dispose(&mut *backend, shared);
        }
    }

    /// Destroy the textures allocated for the current graph. Camera commands
    /// and pooled temporaries survive, so a rebuilt graph can reuse them.
    pub fn free_graph_targets<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for (_, target) in self.allocated.drain() {
            backend.destroy_texture_view(target.view);
            if let Some(texture) = target.texture {
                backend.destroy_texture(texture);
            }
        }
        self.external.clear();
    }

    /// Clean up allocated resources
    pub fn cleanup<B: GraphicsBackend>(&mut self, backend: &mut B) {
        self.free_graph_targets(backend);
        self.temporaries.clear(backend);
    }
}

impl Default for RenderGraphExecutor {
    fn default() -> Self {
        Self::new()
    }
}
