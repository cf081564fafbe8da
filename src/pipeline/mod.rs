//! Frame pipeline
//!
//! The graph built here renders one camera:
//! 1. Depth prepass - main camera depth, then `AfterDepthTexture` commands
//! 2. Scene pass - lit objects into the scene color target
//! 3. Post processing - the effect stack writes the swapchain

pub mod censor;
pub mod depth_prepass;
pub mod geometry;
pub mod postprocess;
pub mod scene_pass;

pub use depth_prepass::DepthPrepass;
pub use geometry::{CameraBinding, SceneGeometry};
pub use postprocess::PostProcessPass;
pub use scene_pass::ScenePass;

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::*;
use crate::render_graph::{PassType, RenderGraph, ResourceId};

/// Name of the external resource the final image goes to
pub const SWAPCHAIN: &str = "swapchain";

/// Resources created by the censor graph
#[derive(Debug, Clone, Copy)]
pub struct CensorGraphResources {
    pub swapchain: ResourceId,
    pub scene_depth: ResourceId,
    /// Equal to `swapchain` when post processing is off
    pub scene_color: ResourceId,
}

/// Build the frame graph. Without post processing the scene pass draws
/// straight into the swapchain.
pub fn build_censor_graph<B: GraphicsBackend + 'static>(
    width: u32,
    height: u32,
    color_format: TextureFormat,
    post_processing: bool,
) -> (RenderGraph, CensorGraphResources) {
    let mut graph = RenderGraph::new();

    // Register swapchain as external resource
    let swapchain = graph.register_external(SWAPCHAIN);

    let scene_depth =
        graph.create_texture("scene_depth", depth_prepass::scene_depth_descriptor(width, height));
    let scene_color = if post_processing {
        graph.create_texture(
            "scene_color",
            TextureDescriptor::render_target("scene_color", width, height, color_format).with_usage(
                TextureUsage::RENDER_ATTACHMENT
                    | TextureUsage::TEXTURE_BINDING
                    | TextureUsage::COPY_SRC
                    | TextureUsage::COPY_DST,
            ),
        )
    } else {
        swapchain
    };
    graph.set_camera_targets(scene_color, scene_depth);

    graph.add_pass(DepthPrepass::<B>::new(scene_depth), PassType::Graphics, width, height);
    graph.add_pass(
        ScenePass::<B>::new(scene_depth, scene_color),
        PassType::Graphics,
        width,
        height,
    );
    if post_processing {
        graph.add_pass(
            PostProcessPass::<B>::new(scene_color, scene_depth, swapchain),
            PassType::Graphics,
            width,
            height,
        );
    }

    let resources = CensorGraphResources {
        swapchain,
        scene_depth,
        scene_color,
    };
    (graph, resources)
}

/// Parse and validate a WGSL module, panicking with the diagnostic
#[cfg(test)]
pub(crate) fn validate_wgsl(label: &str, source: &str) -> naga::Module {
    let module = naga::front::wgsl::parse_str(source)
        .unwrap_or_else(|e| panic!("{}: {}", label, e.emit_to_string(source)));
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .unwrap_or_else(|e| panic!("{}: {:?}", label, e));
    module
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn passes_run_depth_scene_post() {
        let (graph, resources) =
            build_censor_graph::<DummyBackend>(320, 200, TextureFormat::Bgra8UnormSrgb, true);
        let compiled = graph.compile().unwrap();
        let names: Vec<&str> = compiled
            .pass_order
            .iter()
            .filter_map(|&id| graph.get_pass_node(id))
            .map(|node| node.name.as_str())
            .collect();
        assert_eq!(names, vec!["Depth Prepass", "Scene Pass", "Post Processing"]);
        assert_eq!(graph.camera_depth(), Some(resources.scene_depth));
        assert!(graph.find_pass::<PostProcessPass<DummyBackend>>().is_some());
    }

    #[test]
    fn without_post_processing_scene_draws_to_swapchain() {
        let (graph, resources) =
            build_censor_graph::<DummyBackend>(64, 64, TextureFormat::Bgra8UnormSrgb, false);
        assert_eq!(resources.scene_color, resources.swapchain);
        assert_eq!(graph.pass_nodes().len(), 2);
        assert!(graph.find_pass::<PostProcessPass<DummyBackend>>().is_none());
    }
}
