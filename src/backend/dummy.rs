//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out handles,
//! keeps track of which resources are alive and records every render pass so
//! tests can check the frame structure without requiring GPU hardware.
//!
//! Misuse that a real device would reject (destroying an unknown handle,
//! copying inside a render pass, binding a destroyed view) is logged and
//! recorded in [`DummyStats::validation_errors`].

use std::collections::{HashMap, HashSet};

use crate::backend::traits::*;
use crate::backend::types::*;

/// One recorded render pass.
#[derive(Debug, Clone, Default)]
pub struct RecordedPass {
    pub label: String,
    pub color_views: Vec<TextureViewHandle>,
    pub color_load: Vec<LoadOp>,
    pub depth_view: Option<TextureViewHandle>,
    /// Labels of the pipelines bound during the pass, in order.
    pub pipelines: Vec<String>,
    pub bind_groups: Vec<BindGroupHandle>,
    pub draws: usize,
}

/// Counters and logs collected by the dummy backend.
#[derive(Debug, Clone, Default)]
pub struct DummyStats {
    pub frames_begun: u64,
    pub frames_presented: u64,
    pub textures_created: usize,
    pub textures_destroyed: usize,
    pub buffers_created: usize,
    pub buffers_destroyed: usize,
    pub pipelines_created: usize,
    pub pipelines_destroyed: usize,
    pub buffer_writes: usize,
    pub draws: usize,
    pub copies: Vec<(TextureHandle, TextureHandle)>,
    pub passes: Vec<RecordedPass>,
    pub validation_errors: Vec<String>,
}

impl DummyStats {
    /// Labels of all recorded render passes, in submission order.
    pub fn pass_labels(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.label.as_str()).collect()
    }

    /// Number of recorded passes with the given label.
    pub fn pass_count(&self, label: &str) -> usize {
        self.passes.iter().filter(|p| p.label == label).count()
    }
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    width: u32,
    height: u32,
    format: TextureFormat,

    textures: HashMap<u64, TextureDescriptor>,
    texture_views: HashMap<u64, TextureHandle>,
    buffers: HashMap<u64, Vec<u8>>,
    bind_group_layouts: HashSet<u64>,
    bind_groups: HashMap<u64, Vec<(u32, BindGroupEntry)>>,
    render_pipelines: HashMap<u64, String>,
    failing_pipelines: HashSet<String>,

    next_id: u64,
    current_view_id: Option<u64>,
    in_frame: bool,
    current_pass: Option<RecordedPass>,

    stats: DummyStats,
}

impl DummyBackend {
    /// Create a new dummy backend with a swapchain of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            format: TextureFormat::Bgra8UnormSrgb,
            textures: HashMap::new(),
            texture_views: HashMap::new(),
            buffers: HashMap::new(),
            bind_group_layouts: HashSet::new(),
            bind_groups: HashMap::new(),
            render_pipelines: HashMap::new(),
            failing_pipelines: HashSet::new(),
            next_id: 1,
            current_view_id: None,
            in_frame: false,
            current_pass: None,
            stats: DummyStats::default(),
        }
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    /// Make every subsequent `create_render_pipeline` with this label fail.
    pub fn fail_pipeline(&mut self, label: &str) {
        self.failing_pipelines.insert(label.to_string());
    }

    /// Allow a pipeline previously passed to [`fail_pipeline`](Self::fail_pipeline).
    pub fn allow_pipeline(&mut self, label: &str) {
        self.failing_pipelines.remove(label);
    }

    pub fn stats(&self) -> &DummyStats {
        &self.stats
    }

    /// Forget recorded passes and counters. Live resources are kept.
    pub fn reset_stats(&mut self) {
        self.stats = DummyStats::default();
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_texture_views(&self) -> usize {
        self.texture_views.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_bind_groups(&self) -> usize {
        self.bind_groups.len()
    }

    pub fn live_bind_group_layouts(&self) -> usize {
        self.bind_group_layouts.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.render_pipelines.len()
    }

    /// Total number of live resources of every kind.
    pub fn live_resources(&self) -> usize {
        self.live_textures()
            + self.live_texture_views()
            + self.live_buffers()
            + self.live_bind_groups()
            + self.live_bind_group_layouts()
            + self.live_pipelines()
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    /// Live textures whose label matches exactly.
    pub fn textures_labelled(&self, label: &str) -> Vec<TextureHandle> {
        let mut found: Vec<TextureHandle> = self
            .textures
            .iter()
            .filter(|(_, desc)| desc.label.as_deref() == Some(label))
            .map(|(id, _)| TextureHandle(*id))
            .collect();
        found.sort_by_key(|h| h.0);
        found
    }

    /// Last contents written to a buffer.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|data| data.as_slice())
    }

    /// Texture views referenced by a bind group.
    pub fn bind_group_views(&self, bind_group: BindGroupHandle) -> Vec<TextureViewHandle> {
        self.bind_groups
            .get(&bind_group.0)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(_, entry)| match entry {
                        BindGroupEntry::Texture(view) => Some(*view),
                        BindGroupEntry::Buffer { .. } => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Texture backing a view, if the view is alive.
    pub fn view_texture(&self, view: TextureViewHandle) -> Option<TextureHandle> {
        self.texture_views.get(&view.0).copied()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn validation_error(&mut self, message: String) {
        log::warn!("DummyBackend: {}", message);
        self.stats.validation_errors.push(message);
    }

    fn is_swapchain(&self, view: TextureViewHandle) -> bool {
        self.current_view_id == Some(view.0)
    }

    fn check_view(&mut self, view: TextureViewHandle, usage: &str) {
        if !self.is_swapchain(view) && !self.texture_views.contains_key(&view.0) {
            self.validation_error(format!("{} uses unknown texture view {:?}", usage, view));
        }
    }

    fn record<F: FnOnce(&mut RecordedPass)>(&mut self, command: &str, f: F) {
        match self.current_pass.as_mut() {
            Some(pass) => f(pass),
            None => self.validation_error(format!("{} recorded outside of a render pass", command)),
        }
    }
}

impl GraphicsBackend for DummyBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            log::trace!("DummyBackend: resize to {}x{}", width, height);
            self.width = width;
            self.height = height;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        if self.in_frame {
            self.validation_error("begin_frame called twice without end_frame".into());
        }
        let view_id = self.allocate_id();
        self.current_view_id = Some(view_id);
        self.in_frame = true;
        self.stats.frames_begun += 1;
        log::trace!("DummyBackend: begin frame {}", self.stats.frames_begun);

        Ok(FrameContext {
            swapchain_view: TextureViewHandle(view_id),
            width: self.width,
            height: self.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if self.current_pass.is_some() {
            self.validation_error("end_frame with an open render pass".into());
            self.current_pass = None;
        }
        self.in_frame = false;
        self.current_view_id = None;
        self.stats.frames_presented += 1;
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        self.format
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let id = self.allocate_id();
        self.buffers.insert(id, vec![0; desc.size as usize]);
        self.stats.buffers_created += 1;
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        log::trace!(
            "DummyBackend: creating buffer {:?} with {} bytes",
            desc.label,
            data.len()
        );
        let id = self.allocate_id();
        self.buffers.insert(id, data.to_vec());
        self.stats.buffers_created += 1;
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(contents) = self.buffers.get_mut(&buffer.0) else {
            self.validation_error(format!("write to unknown buffer {:?}", buffer));
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[start..end].copy_from_slice(data);
        self.stats.buffer_writes += 1;
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has a zero extent",
                desc.label
            )));
        }
        let id = self.allocate_id();
        self.textures.insert(id, desc.clone());
        self.stats.textures_created += 1;
        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::TextureCreationFailed("Texture not found".into()));
        }
        let id = self.allocate_id();
        self.texture_views.insert(id, texture);
        Ok(TextureViewHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        log::trace!("DummyBackend: creating bind group layout with {} entries", entries.len());
        let id = self.allocate_id();
        self.bind_group_layouts.insert(id);
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        if !self.bind_group_layouts.contains(&layout.0) {
            return Err(BackendError::PipelineCreationFailed("Layout not found".into()));
        }
        for (binding, entry) in entries {
            match entry {
                BindGroupEntry::Buffer { buffer, .. } if !self.buffers.contains_key(&buffer.0) => {
                    return Err(BackendError::PipelineCreationFailed(format!(
                        "Buffer for binding {} not found",
                        binding
                    )));
                }
                BindGroupEntry::Texture(view) if !self.texture_views.contains_key(&view.0) => {
                    return Err(BackendError::PipelineCreationFailed(format!(
                        "Texture view for binding {} not found",
                        binding
                    )));
                }
                _ => {}
            }
        }
        let id = self.allocate_id();
        self.bind_groups.insert(id, entries.to_vec());
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        let label = desc.label.clone().unwrap_or_default();
        log::trace!("DummyBackend: creating render pipeline {:?}", label);
        if self.failing_pipelines.contains(&label) {
            return Err(BackendError::PipelineCreationFailed(format!(
                "{} rejected by test configuration",
                label
            )));
        }
        if desc.vertex_shader.trim().is_empty() {
            return Err(BackendError::ShaderCreationFailed(format!(
                "{} has an empty shader module",
                label
            )));
        }
        for layout in &desc.bind_group_layouts {
            if !self.bind_group_layouts.contains(&layout.0) {
                return Err(BackendError::PipelineCreationFailed(format!(
                    "{} references an unknown bind group layout",
                    label
                )));
            }
        }
        let id = self.allocate_id();
        self.render_pipelines.insert(id, label);
        self.stats.pipelines_created += 1;
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if !self.in_frame {
            self.validation_error("render pass begun outside of a frame".into());
        }
        if self.current_pass.is_some() {
            self.validation_error("render pass begun while another is open".into());
        }
        for attachment in &desc.color_attachments {
            self.check_view(attachment.view, "color attachment");
        }
        if let Some(depth) = &desc.depth_stencil_attachment {
            self.check_view(depth.view, "depth attachment");
        }
        let label = desc.label.clone().unwrap_or_default();
        log::trace!("DummyBackend: begin render pass {:?}", label);
        self.current_pass = Some(RecordedPass {
            label,
            color_views: desc.color_attachments.iter().map(|a| a.view).collect(),
            color_load: desc.color_attachments.iter().map(|a| a.load_op.clone()).collect(),
            depth_view: desc.depth_stencil_attachment.as_ref().map(|a| a.view),
            ..Default::default()
        });
    }

    fn end_render_pass(&mut self) {
        match self.current_pass.take() {
            Some(pass) => self.stats.passes.push(pass),
            None => self.validation_error("end_render_pass without an open pass".into()),
        }
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        let Some(label) = self.render_pipelines.get(&pipeline.0).cloned() else {
            self.validation_error(format!("unknown pipeline {:?} bound", pipeline));
            return;
        };
        self.record("set_render_pipeline", |pass| pass.pipelines.push(label));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        if !self.bind_groups.contains_key(&bind_group.0) {
            self.validation_error(format!(
                "unknown bind group {:?} at index {}",
                bind_group, index
            ));
            return;
        }
        let views = self.bind_group_views(bind_group);
        for view in views {
            if !self.texture_views.contains_key(&view.0) {
                self.validation_error(format!(
                    "bind group {:?} samples a destroyed view",
                    bind_group
                ));
            }
        }
        self.record("set_bind_group", |pass| pass.bind_groups.push(bind_group));
    }

    fn set_vertex_buffer(&mut self, _slot: u32, buffer: BufferHandle, _offset: u64) {
        if !self.buffers.contains_key(&buffer.0) {
            self.validation_error(format!("unknown vertex buffer {:?}", buffer));
        }
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, _offset: u64, _format: IndexFormat) {
        if !self.buffers.contains_key(&buffer.0) {
            self.validation_error(format!("unknown index buffer {:?}", buffer));
        }
    }

    fn set_viewport(
        &mut self,
        _x: f32,
        _y: f32,
        _width: f32,
        _height: f32,
        _min_depth: f32,
        _max_depth: f32,
    ) {
    }

    fn draw(&mut self, _vertices: std::ops::Range<u32>, _instances: std::ops::Range<u32>) {
        self.stats.draws += 1;
        self.record("draw", |pass| pass.draws += 1);
    }

    fn draw_indexed(
        &mut self,
        _indices: std::ops::Range<u32>,
        _base_vertex: i32,
        _instances: std::ops::Range<u32>,
    ) {
        self.stats.draws += 1;
        self.record("draw_indexed", |pass| pass.draws += 1);
    }

    fn copy_texture_to_texture(
        &mut self,
        source: TextureHandle,
        destination: TextureHandle,
        width: u32,
        height: u32,
    ) {
        if self.current_pass.is_some() {
            self.validation_error("copy recorded inside a render pass".into());
        }
        let (Some(src), Some(dst)) = (
            self.textures.get(&source.0),
            self.textures.get(&destination.0),
        ) else {
            self.validation_error(format!(
                "copy between unknown textures {:?} -> {:?}",
                source, destination
            ));
            return;
        };
        if src.format != dst.format {
            let message = format!("copy between formats {:?} -> {:?}", src.format, dst.format);
            self.validation_error(message);
        } else if width > src.width.min(dst.width) || height > src.height.min(dst.height) {
            self.validation_error(format!("copy extent {}x{} out of bounds", width, height));
        }
        self.stats.copies.push((source, destination));
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_none() {
            self.validation_error(format!("double destroy of buffer {:?}", buffer));
            return;
        }
        self.stats.buffers_destroyed += 1;
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture.0).is_none() {
            self.validation_error(format!("double destroy of texture {:?}", texture));
            return;
        }
        self.stats.textures_destroyed += 1;
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        if self.texture_views.remove(&view.0).is_none() {
            self.validation_error(format!("double destroy of texture view {:?}", view));
        }
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        if self.bind_groups.remove(&bind_group.0).is_none() {
            self.validation_error(format!("double destroy of bind group {:?}", bind_group));
        }
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutHandle) {
        if !self.bind_group_layouts.remove(&layout.0) {
            self.validation_error(format!("double destroy of bind group layout {:?}", layout));
        }
    }

    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        if self.render_pipelines.remove(&pipeline.0).is_none() {
            self.validation_error(format!("double destroy of pipeline {:?}", pipeline));
            return;
        }
        self.stats.pipelines_destroyed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_texture_lifetime() {
        let mut backend = DummyBackend::new(64, 32);
        let desc = TextureDescriptor::render_target("mask", 64, 32, TextureFormat::R8Unorm);
        let texture = backend.create_texture(&desc).unwrap();
        let view = backend.create_texture_view(texture).unwrap();
        assert_eq!(backend.live_textures(), 1);
        assert_eq!(backend.view_texture(view), Some(texture));
        assert_eq!(backend.textures_labelled("mask"), vec![texture]);

        backend.destroy_texture_view(view);
        backend.destroy_texture(texture);
        assert_eq!(backend.live_resources(), 0);
        assert!(backend.stats().validation_errors.is_empty());

        backend.destroy_texture(texture);
        assert_eq!(backend.stats().validation_errors.len(), 1);
    }

    #[test]
    fn records_render_passes() {
        let mut backend = DummyBackend::new(8, 8);
        let frame = backend.begin_frame().unwrap();
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Blit".into()),
            color_attachments: vec![ColorAttachment {
                view: frame.swapchain_view,
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });
        backend.draw(0..3, 0..1);
        backend.end_render_pass();
        backend.end_frame().unwrap();

        assert_eq!(backend.stats().pass_labels(), vec!["Blit"]);
        assert_eq!(backend.stats().passes[0].draws, 1);
        assert!(backend.stats().validation_errors.is_empty());
    }

    #[test]
    fn configured_pipeline_failure() {
        let mut backend = DummyBackend::new(8, 8);
        backend.fail_pipeline("Censor Composite Pipeline");
        let desc = RenderPipelineDescriptor {
            label: Some("Censor Composite Pipeline".into()),
            vertex_shader: "@vertex fn vs_main() {}".into(),
            fragment_shader: None,
            vertex_layouts: vec![],
            bind_group_layouts: vec![],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: None,
            color_targets: vec![],
        };
        assert!(backend.create_render_pipeline(&desc).is_err());
        backend.allow_pipeline("Censor Composite Pipeline");
        assert!(backend.create_render_pipeline(&desc).is_ok());
    }

    #[test]
    fn copy_inside_pass_is_flagged() {
        let mut backend = DummyBackend::new(8, 8);
        let desc = TextureDescriptor::render_target("a", 8, 8, TextureFormat::Depth32Float);
        let a = backend.create_texture(&desc).unwrap();
        let b = backend.create_texture(&desc).unwrap();
        backend.begin_frame().unwrap();
        backend.copy_texture_to_texture(a, b, 8, 8);
        assert!(backend.stats().validation_errors.is_empty());

        backend.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: vec![],
            depth_stencil_attachment: None,
        });
        backend.copy_texture_to_texture(a, b, 8, 8);
        backend.end_render_pass();
        assert_eq!(backend.stats().validation_errors.len(), 1);
        assert_eq!(backend.stats().copies.len(), 2);
    }
}
