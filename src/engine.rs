//! Main engine orchestrator

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::censor::{CensorMaskGenerator, CensorResult};
use crate::pipeline::postprocess::PostProcessStack;
use crate::pipeline::{build_censor_graph, CensorGraphResources, PostProcessPass, SceneGeometry};
use crate::render_graph::{
    new_shared_resources, CompiledGraph, FrameInputs, GraphError, RenderGraph, RenderGraphExecutor,
    SharedResourceHandle, TargetRef,
};
use crate::resources::{Material, Mesh, ShaderLibrary};
use crate::scene::{ClearFlags, Scene};
use crate::EngineConfig;
use thiserror::Error;

#[cfg(not(target_arch = "wasm32"))]
use crate::backend::wgpu_backend::WgpuBackend;
#[cfg(not(target_arch = "wasm32"))]
use std::sync::Arc;
#[cfg(not(target_arch = "wasm32"))]
use winit::window::Window as WinitWindow;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// The main graphics engine
///
/// Owns the backend, the scene and the frame graph. Each [`render`](Self::render)
/// runs the persistent mask generator (when installed) and then the graph:
/// depth prepass, scene pass and post processing.
pub struct Engine<B: GraphicsBackend + 'static> {
    backend: B,
    graph: RenderGraph,
    compiled: CompiledGraph,
    graph_resources: CensorGraphResources,
    executor: RenderGraphExecutor,
    geometry: SceneGeometry,
    scene: Scene,
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
    shaders: ShaderLibrary,
    shared: SharedResourceHandle,
    mask_generator: Option<CensorMaskGenerator>,
    color_format: TextureFormat,
    width: u32,
    height: u32,
    config: EngineConfig,
    frame_count: u64,
    shut_down: bool,
}

#[cfg(not(target_arch = "wasm32"))]
impl Engine<WgpuBackend> {
    /// Create an engine rendering into `window`
    pub fn with_window(
        window: Arc<WinitWindow>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let backend = WgpuBackend::new(window, config.vsync)?;
        Self::new(backend, config)
    }
}

impl<B: GraphicsBackend + 'static> Engine<B> {
    pub fn new(mut backend: B, config: EngineConfig) -> Result<Self, EngineError> {
        let (width, height) = backend.surface_size();
        let color_format = backend.swapchain_format();

        let mut geometry = SceneGeometry::new(&mut backend, color_format)?;
        let (graph, graph_resources) =
            build_censor_graph::<B>(width, height, color_format, config.post_processing);
        let mut executor = RenderGraphExecutor::new();
        let prepared = graph.compile().map_err(EngineError::from).and_then(|compiled| {
            executor.allocate_resources(&graph, &mut backend)?;
            Ok(compiled)
        });
        let compiled = match prepared {
            Ok(compiled) => compiled,
            Err(e) => {
                executor.cleanup(&mut backend);
                geometry.release(&mut backend);
                return Err(e);
            }
        };

        let mut scene = Scene::new();
        scene.camera.clear = ClearFlags::SolidColor(config.clear_color);
        scene.camera.set_aspect(width as f32, height as f32);

        log::info!(
            "Engine initialized: {}x{} {:?}, post processing {}",
            width,
            height,
            color_format,
            if config.post_processing { "on" } else { "off" }
        );

        Ok(Self {
            backend,
            graph,
            compiled,
            graph_resources,
            executor,
            geometry,
            scene,
            meshes: Vec::new(),
            materials: Vec::new(),
            shaders: ShaderLibrary::with_builtins(),
            shared: new_shared_resources(),
            mask_generator: None,
            color_format,
            width,
            height,
            config,
            frame_count: 0,
            shut_down: false,
        })
    }

    /// Get mutable reference to the scene
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Get reference to the scene
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Add a mesh and return its ID
    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        let id = self.meshes.len();
        self.meshes.push(mesh);
        id
    }

    /// Add a material and return its ID
    pub fn add_material(&mut self, material: Material) -> usize {
        let id = self.materials.len();
        self.materials.push(material);
        id
    }

    pub fn get_mesh(&self, id: usize) -> Option<&Mesh> {
        self.meshes.get(id)
    }

    pub fn get_material(&self, id: usize) -> Option<&Material> {
        self.materials.get(id)
    }

    pub fn shaders(&self) -> &ShaderLibrary {
        &self.shaders
    }

    /// Shaders are resolved when effects initialize, so edits only affect
    /// effects that have not rendered yet
    pub fn shaders_mut(&mut self) -> &mut ShaderLibrary {
        &mut self.shaders
    }

    pub fn shared(&self) -> &SharedResourceHandle {
        &self.shared
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn executor(&self) -> &RenderGraphExecutor {
        &self.executor
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    pub fn graph_resources(&self) -> CensorGraphResources {
        self.graph_resources
    }

    /// The post-processing layer; `None` when the engine was configured
    /// without post processing
    pub fn post_process_stack(&self) -> Option<&PostProcessStack<B>> {
        self.graph
            .find_pass::<PostProcessPass<B>>()
            .and_then(|pass| pass.stack())
    }

    pub fn post_process_stack_mut(&mut self) -> Option<&mut PostProcessStack<B>> {
        self.graph
            .find_pass_mut::<PostProcessPass<B>>()
            .and_then(|pass| pass.stack_mut())
    }

    pub fn mask_generator(&self) -> Option<&CensorMaskGenerator> {
        self.mask_generator.as_ref()
    }

    /// Enable `generator` and make it the engine's mask generator. A
    /// generator that fails to enable is still installed, disabled.
    pub fn set_mask_generator(&mut self, mut generator: CensorMaskGenerator) -> CensorResult<()> {
        self.remove_mask_generator();
        let result = generator.on_enable(&mut self.backend, &self.geometry, &self.shaders);
        self.mask_generator = Some(generator);
        result
    }

    /// Disable and drop the installed generator, if any
    pub fn remove_mask_generator(&mut self) -> bool {
        match self.mask_generator.take() {
            Some(mut generator) => {
                generator.on_disable(&mut self.backend, &self.shared);
                true
            }
            None => false,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get current dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Handle window resize. The graph is rebuilt at the new size; the
    /// post-process stack and attached camera commands carry over.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        if width == 0 || height == 0 || self.shut_down {
            return Ok(());
        }
        self.backend.resize(width, height);

        // Get actual surface size (may be clamped by device limits)
        let (actual_width, actual_height) = self.backend.surface_size();
        if actual_width == self.width && actual_height == self.height {
            return Ok(());
        }
        self.width = actual_width;
        self.height = actual_height;
        self.scene.camera.set_aspect(actual_width as f32, actual_height as f32);

        let stack = self
            .graph
            .find_pass_mut::<PostProcessPass<B>>()
            .and_then(|pass| pass.take_stack());
        self.executor.free_graph_targets(&mut self.backend);

        let (graph, graph_resources) = build_censor_graph::<B>(
            actual_width,
            actual_height,
            self.color_format,
            self.config.post_processing,
        );
        self.graph = graph;
        self.graph_resources = graph_resources;
        if let (Some(stack), Some(pass)) =
            (stack, self.graph.find_pass_mut::<PostProcessPass<B>>())
        {
            pass.set_stack(stack);
        }
        self.compiled = self.graph.compile()?;
        self.executor.allocate_resources(&self.graph, &mut self.backend)?;

        log::info!("Resized to {}x{}", actual_width, actual_height);
        Ok(())
    }

    /// Render and present one frame
    pub fn render(&mut self) -> Result<(), EngineError> {
        if self.shut_down {
            return Ok(());
        }
        self.geometry
            .sync(&mut self.backend, &self.scene, &self.meshes, &self.materials)?;

        let frame = self.backend.begin_frame()?;
        self.executor.set_external_target(
            self.graph_resources.swapchain,
            TargetRef {
                texture: None,
                view: frame.swapchain_view,
                width: frame.width,
                height: frame.height,
                format: self.color_format,
            },
        );

        SceneGeometry::write_camera(
            &mut self.backend,
            self.geometry.main_camera(),
            &self.scene.camera,
        );
        let frame_index = self.shared.write().begin_frame();
        log::trace!("Frame {}", frame_index);

        if let Some(generator) = self.mask_generator.as_mut() {
            generator.update(&mut self.backend, &self.scene, &self.geometry, &self.shared);
        }

        self.executor.execute(
            &mut self.graph,
            &self.compiled,
            &mut self.backend,
            &FrameInputs {
                scene: &self.scene,
                geometry: &self.geometry,
                shaders: &self.shaders,
                shared: &self.shared,
                color_format: self.color_format,
                width: self.width,
                height: self.height,
            },
        );

        self.backend.end_frame()?;
        self.frame_count += 1;
        Ok(())
    }

    /// Release every GPU resource the engine owns. Safe to call more than
    /// once; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let shared = self.shared.clone();
        self.executor.release_passes(&mut self.graph, &mut self.backend, &shared);
        self.remove_mask_generator();
        self.geometry.release(&mut self.backend);
        self.executor.cleanup(&mut self.backend);
        log::info!("Engine shut down after {} frame(s)", self.frame_count);
    }
}

impl<B: GraphicsBackend + 'static> Drop for Engine<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
