//! Render pass definitions for the render graph

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::geometry::SceneGeometry;
use crate::render_graph::events::{CameraCommands, CameraEvent};
use crate::render_graph::resource::*;
use crate::render_graph::shared::SharedResourceHandle;
use crate::render_graph::temporary::TemporaryTargets;
use crate::resources::ShaderLibrary;
use crate::scene::Scene;
use std::any::Any;
use std::collections::HashMap;

/// Unique identifier for a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) u32);

/// Context for setting up pass resources
pub struct PassSetupContext<'a> {
    pub(crate) resources: &'a mut Vec<VirtualResource>,
    pub(crate) inputs: &'a mut Vec<ResourceAccess>,
    pub(crate) outputs: &'a mut Vec<ResourceAccess>,
    pub(crate) next_resource_id: &'a mut u32,
    pub(crate) screen_width: u32,
    pub(crate) screen_height: u32,
}

impl<'a> PassSetupContext<'a> {
    /// Create a new texture resource
    pub fn create_texture(&mut self, name: &str, desc: TextureDescriptor) -> ResourceId {
        let id = ResourceId(*self.next_resource_id);
        *self.next_resource_id += 1;

        self.resources.push(VirtualResource::Texture(VirtualTexture {
            id,
            desc,
            name: name.to_string(),
        }));

        id
    }

    /// Create a texture with size relative to screen
    pub fn create_texture_relative(
        &mut self,
        name: &str,
        size: TextureSize,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> ResourceId {
        let (width, height) = size.resolve(self.screen_width, self.screen_height);

        self.create_texture(
            name,
            TextureDescriptor {
                label: Some(name.to_string()),
                width,
                height,
                depth: 1,
                mip_levels: 1,
                format,
                usage,
            },
        )
    }

    /// Declare that this pass reads from a resource
    pub fn read(&mut self, resource: ResourceId, usage: ResourceUsage) {
        self.inputs.push(ResourceAccess { resource, usage });
    }

    /// Declare that this pass writes to a resource
    pub fn write(&mut self, resource: ResourceId, usage: ResourceUsage) {
        self.outputs.push(ResourceAccess { resource, usage });
    }

    /// Get screen dimensions
    pub fn screen_size(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }
}

/// Context for the prepare phase, which runs for every pass before any pass
/// executes. Passes create pipelines and attach camera commands here.
pub struct PassPrepareContext<'a> {
    pub backend: &'a mut dyn Any,
    pub scene: &'a Scene,
    pub geometry: &'a SceneGeometry,
    pub shaders: &'a ShaderLibrary,
    pub commands: &'a mut CameraCommands,
    pub shared: &'a SharedResourceHandle,
    pub color_format: TextureFormat,
}

impl<'a> PassPrepareContext<'a> {
    /// Get backend as concrete type
    pub fn backend<B: GraphicsBackend + 'static>(&mut self) -> Option<&mut B> {
        self.backend.downcast_mut::<B>()
    }
}

/// Context for executing a render pass
pub struct PassExecuteContext<'a> {
    pub backend: &'a mut dyn Any,
    pub scene: &'a Scene,
    pub geometry: &'a SceneGeometry,
    pub shared: &'a SharedResourceHandle,
    pub temporaries: &'a mut TemporaryTargets,
    pub width: u32,
    pub height: u32,
    pub resource_targets: &'a HashMap<ResourceId, TargetRef>,
}

impl<'a> PassExecuteContext<'a> {
    /// Get backend as concrete type
    pub fn backend<B: GraphicsBackend + 'static>(&mut self) -> Option<&mut B> {
        self.backend.downcast_mut::<B>()
    }

    /// Get a texture view handle for a resource
    pub fn get_texture(&self, resource: ResourceId) -> Option<TextureViewHandle> {
        self.resource_targets.get(&resource).map(|t| t.view)
    }

    /// Get the resolved target (view, backing texture, size) for a resource
    pub fn get_target(&self, resource: ResourceId) -> Option<TargetRef> {
        self.resource_targets.get(&resource).copied()
    }
}

/// Trait for render passes
pub trait RenderPass: Send + Sync {
    /// Get the pass name for debugging
    fn name(&self) -> &str;

    /// Setup phase - declare resources and dependencies
    fn setup(&mut self, ctx: &mut PassSetupContext);

    /// Prepare phase - runs once per frame for all passes before execution
    fn prepare(&mut self, _ctx: &mut PassPrepareContext) {}

    /// Execute phase - record commands
    fn execute(&mut self, ctx: &mut PassExecuteContext);

    /// Camera event fired right before this pass executes
    fn begins(&self) -> Option<CameraEvent> {
        None
    }

    /// Camera event fired right after this pass executes
    fn completes(&self) -> Option<CameraEvent> {
        None
    }

    /// Release GPU resources owned by the pass
    fn release(
        &mut self,
        _backend: &mut dyn Any,
        _commands: &mut CameraCommands,
        _shared: &SharedResourceHandle,
    ) {
    }

    /// Allow downcasting
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Type of render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassType {
    /// Graphics render pass
    Graphics,
    /// Transfer/copy pass
    Transfer,
}

/// Metadata about a pass in the graph
#[derive(Debug)]
pub struct PassNode {
    pub id: PassId,
    pub name: String,
    pub pass_type: PassType,
    pub inputs: Vec<ResourceAccess>,
    pub outputs: Vec<ResourceAccess>,
}

impl PassNode {
    pub fn reads_resource(&self, resource: ResourceId) -> bool {
        self.inputs.iter().any(|a| a.resource == resource)
    }

    pub fn writes_resource(&self, resource: ResourceId) -> bool {
        self.outputs.iter().any(|a| a.resource == resource)
    }
}
