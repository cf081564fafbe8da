//! Render graph definition and compilation

use crate::backend::types::TextureDescriptor;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Render graph has a dependency cycle between passes: {0:?}")]
    Cycle(Vec<String>),
}

/// The main render graph structure
pub struct RenderGraph {
    passes: Vec<Box<dyn RenderPass>>,
    pass_nodes: Vec<PassNode>,
    resources: Vec<VirtualResource>,
    next_pass_id: u32,
    next_resource_id: u32,

    /// External resources (like swapchain)
    external_resources: HashMap<String, ResourceId>,

    /// Targets the main camera renders into, exposed to camera commands
    camera_color: Option<ResourceId>,
    camera_depth: Option<ResourceId>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            pass_nodes: Vec::new(),
            resources: Vec::new(),
            next_pass_id: 0,
            next_resource_id: 0,
            external_resources: HashMap::new(),
            camera_color: None,
            camera_depth: None,
        }
    }

    /// Register an external resource (like swapchain image)
    pub fn register_external(&mut self, name: &str) -> ResourceId {
        let id = ResourceId(self.next_resource_id);
        self.next_resource_id += 1;
        self.resources.push(VirtualResource::External {
            id,
            name: name.to_string(),
        });
        self.external_resources.insert(name.to_string(), id);
        id
    }

    /// Get external resource by name
    pub fn get_external(&self, name: &str) -> Option<ResourceId> {
        self.external_resources.get(name).copied()
    }

    /// Declare a graph-owned texture up front, so several passes can be
    /// wired to it before any of them is added
    pub fn create_texture(&mut self, name: &str, desc: TextureDescriptor) -> ResourceId {
        let id = ResourceId(self.next_resource_id);
        self.next_resource_id += 1;
        self.resources.push(VirtualResource::Texture(VirtualTexture {
            id,
            desc,
            name: name.to_string(),
        }));
        id
    }

    /// Find a resource declared by any pass by name
    pub fn find_resource(&self, name: &str) -> Option<ResourceId> {
        self.resources.iter().find(|r| r.name() == name).map(|r| r.id())
    }

    pub fn set_camera_targets(&mut self, color: ResourceId, depth: ResourceId) {
        self.camera_color = Some(color);
        self.camera_depth = Some(depth);
    }

    pub fn camera_color(&self) -> Option<ResourceId> {
        self.camera_color
    }

    pub fn camera_depth(&self) -> Option<ResourceId> {
        self.camera_depth
    }

    /// Add a render pass to the graph
    pub fn add_pass<P: RenderPass + 'static>(
        &mut self,
        pass: P,
        pass_type: PassType,
        screen_width: u32,
        screen_height: u32,
    ) -> PassId {
        let id = PassId(self.next_pass_id);
        self.next_pass_id += 1;

        let name = pass.name().to_string();
        let mut boxed_pass = Box::new(pass);

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        {
            let mut ctx = PassSetupContext {
                resources: &mut self.resources,
                inputs: &mut inputs,
                outputs: &mut outputs,
                next_resource_id: &mut self.next_resource_id,
                screen_width,
                screen_height,
            };
            boxed_pass.setup(&mut ctx);
        }

        self.passes.push(boxed_pass);
        self.pass_nodes.push(PassNode {
            id,
            name,
            pass_type,
            inputs,
            outputs,
        });

        id
    }

    /// Compile the graph - topological sort and resource lifetimes.
    ///
    /// Independent passes keep their insertion order.
    pub fn compile(&self) -> Result<CompiledGraph, GraphError> {
        // A pass depends on another if it reads a resource that the other writes
        let mut dependencies: HashMap<PassId, HashSet<PassId>> = HashMap::new();
        for reader in &self.pass_nodes {
            let deps = dependencies.entry(reader.id).or_default();
            for writer in &self.pass_nodes {
                if reader.id != writer.id
                    && reader.inputs.iter().any(|input| writer.writes_resource(input.resource))
                {
                    deps.insert(writer.id);
                }
            }
        }

        // Kahn's algorithm, always taking the lowest ready id
        let mut in_degree: HashMap<PassId, usize> = dependencies
            .iter()
            .map(|(id, deps)| (*id, deps.len()))
            .collect();
        let mut ready: BTreeSet<PassId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut sorted_passes = Vec::with_capacity(self.pass_nodes.len());
        while let Some(pass_id) = ready.pop_first() {
            sorted_passes.push(pass_id);

            for node in &self.pass_nodes {
                let depends = dependencies
                    .get(&node.id)
                    .map_or(false, |deps| deps.contains(&pass_id));
                if !depends {
                    continue;
                }
                if let Some(degree) = in_degree.get_mut(&node.id) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(node.id);
                    }
                }
            }
        }

        if sorted_passes.len() != self.pass_nodes.len() {
            let stuck = self
                .pass_nodes
                .iter()
                .filter(|n| !sorted_passes.contains(&n.id))
                .map(|n| n.name.clone())
                .collect();
            return Err(GraphError::Cycle(stuck));
        }

        let mut resource_lifetimes: HashMap<ResourceId, ResourceLifetime> = HashMap::new();
        for (order, &pass_id) in sorted_passes.iter().enumerate() {
            let Some(node) = self.get_pass_node(pass_id) else {
                continue;
            };
            for access in node.inputs.iter().chain(node.outputs.iter()) {
                let lifetime = resource_lifetimes
                    .entry(access.resource)
                    .or_insert(ResourceLifetime {
                        first_use: order,
                        last_use: order,
                    });
                lifetime.last_use = order;
            }
        }

        Ok(CompiledGraph {
            pass_order: sorted_passes,
            resource_lifetimes,
        })
    }

    /// Get all passes
    pub fn passes(&self) -> &[Box<dyn RenderPass>] {
        &self.passes
    }

    /// Get mutable passes
    pub fn passes_mut(&mut self) -> &mut [Box<dyn RenderPass>] {
        &mut self.passes
    }

    /// Get pass nodes (metadata)
    pub fn pass_nodes(&self) -> &[PassNode] {
        &self.pass_nodes
    }

    /// Get all resources
    pub fn resources(&self) -> &[VirtualResource] {
        &self.resources
    }

    /// Get pass by ID
    pub fn get_pass(&self, id: PassId) -> Option<&dyn RenderPass> {
        let index = self.pass_nodes.iter().position(|n| n.id == id)?;
        Some(self.passes[index].as_ref())
    }

    /// Get mutable pass by ID
    pub fn get_pass_mut(&mut self, id: PassId) -> Option<&mut (dyn RenderPass + 'static)> {
        let index = self.pass_nodes.iter().position(|n| n.id == id)?;
        Some(self.passes[index].as_mut())
    }

    /// Get pass node by ID
    pub fn get_pass_node(&self, id: PassId) -> Option<&PassNode> {
        self.pass_nodes.iter().find(|n| n.id == id)
    }

    /// Find the first pass of a concrete type
    pub fn find_pass<P: RenderPass + 'static>(&self) -> Option<&P> {
        self.passes.iter().find_map(|p| p.as_any().downcast_ref::<P>())
    }

    /// Find the first pass of a concrete type, mutably
    pub fn find_pass_mut<P: RenderPass + 'static>(&mut self) -> Option<&mut P> {
        self.passes
            .iter_mut()
            .find_map(|p| p.as_any_mut().downcast_mut::<P>())
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource lifetime in terms of pass execution order
#[derive(Debug, Clone, Copy)]
pub struct ResourceLifetime {
    pub first_use: usize,
    pub last_use: usize,
}

/// Compiled render graph with execution order and resource lifetimes
#[derive(Debug)]
pub struct CompiledGraph {
    pub pass_order: Vec<PassId>,
    pub resource_lifetimes: HashMap<ResourceId, ResourceLifetime>,
}

impl CompiledGraph {
    /// Check if a resource is alive at a given execution step
    pub fn is_resource_alive(&self, resource: ResourceId, step: usize) -> bool {
        if let Some(lifetime) = self.resource_lifetimes.get(&resource) {
            step >= lifetime.first_use && step <= lifetime.last_use
        } else {
            false
        }
    }
}
