//! GPU copies of the scene's meshes, materials and objects.
//!
//! Every pass that draws scene geometry (depth prepass, lit scene pass, mask
//! rendering) goes through [`SceneGeometry`], so they all agree on bind group
//! layouts and object filtering.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::{Material, MaterialUniformData, Mesh};
use crate::scene::{Camera, CameraUniformData, LayerMask, Scene, TransformUniformData};
use bytemuck::Zeroable;
use std::collections::HashMap;

/// Camera uniform buffer and its bind group (group 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraBinding {
    pub buffer: BufferHandle,
    pub bind_group: BindGroupHandle,
}

/// GPU resources for a mesh
struct GpuMesh {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_count: u32,
}

struct GpuMaterial {
    buffer: BufferHandle,
    bind_group: BindGroupHandle,
}

/// Per-object GPU resources
struct GpuObject {
    transform_buffer: BufferHandle,
    transform_bind_group: BindGroupHandle,
}

pub struct SceneGeometry {
    camera_layout: BindGroupLayoutHandle,
    object_layout: BindGroupLayoutHandle,
    material_layout: BindGroupLayoutHandle,

    main_camera: CameraBinding,

    lit_pipeline: RenderPipelineHandle,
    depth_pipeline: RenderPipelineHandle,

    gpu_meshes: HashMap<usize, GpuMesh>,
    gpu_materials: HashMap<usize, GpuMaterial>,
    gpu_objects: Vec<GpuObject>,
    released: bool,
}

// Lit shader for scene meshes
const BASIC_SHADER: &str = r#"
struct CameraUniform {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    position: vec4<f32>,
    near_far: vec4<f32>,
}

struct ObjectUniform {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
}

struct MaterialUniform {
    base_color: vec4<f32>,
    metallic: f32,
    roughness: f32,
    _padding: vec2<f32>,
}

@group(0) @binding(0) var<uniform> camera: CameraUniform;
@group(1) @binding(0) var<uniform> object: ObjectUniform;
@group(2) @binding(0) var<uniform> material: MaterialUniform;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_pos = object.model * vec4<f32>(in.position, 1.0);
    out.world_position = world_pos.xyz;
    out.clip_position = camera.view_proj * world_pos;
    out.world_normal = normalize((object.normal_matrix * vec4<f32>(in.normal, 0.0)).xyz);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let light_dir = normalize(vec3<f32>(1.0, 1.0, 1.0));
    let light_color = vec3<f32>(1.0, 0.98, 0.95);
    let ambient = vec3<f32>(0.1, 0.1, 0.12);

    let normal = normalize(in.world_normal);
    let ndotl = max(dot(normal, light_dir), 0.0);

    let view_dir = normalize(camera.position.xyz - in.world_position);
    let reflect_dir = reflect(-light_dir, normal);
    let spec_angle = max(dot(view_dir, reflect_dir), 0.0);
    let shininess = mix(16.0, 128.0, 1.0 - material.roughness);
    let specular = pow(spec_angle, shininess) * (1.0 - material.roughness);

    let diffuse = material.base_color.rgb * (1.0 - material.metallic);
    let spec_color = mix(vec3<f32>(1.0), material.base_color.rgb, material.metallic);

    let color = ambient * material.base_color.rgb
              + diffuse * light_color * ndotl
              + spec_color * specular;

    return vec4<f32>(color, material.base_color.a);
}
"#;

// Depth-only variant, no fragment stage
const DEPTH_ONLY_SHADER: &str = r#"
struct CameraUniform {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    position: vec4<f32>,
    near_far: vec4<f32>,
}

struct ObjectUniform {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> camera: CameraUniform;
@group(1) @binding(0) var<uniform> object: ObjectUniform;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return camera.view_proj * object.model * vec4<f32>(position, 1.0);
}
"#;

fn uniform_layout<B: GraphicsBackend>(
    backend: &mut B,
    visibility: ShaderStageFlags,
) -> BackendResult<BindGroupLayoutHandle> {
    backend.create_bind_group_layout(&[BindGroupLayoutEntry {
        binding: 0,
        visibility,
        ty: BindingType::UniformBuffer,
    }])
}

fn uniform_buffer<B: GraphicsBackend>(
    backend: &mut B,
    label: String,
    layout: BindGroupLayoutHandle,
    data: &[u8],
) -> BackendResult<(BufferHandle, BindGroupHandle)> {
    let buffer = backend.create_buffer_init(
        &BufferDescriptor {
            label: Some(label),
            size: data.len() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        },
        data,
    )?;
    let bind_group = match backend.create_bind_group(
        layout,
        &[(
            0,
            BindGroupEntry::Buffer {
                buffer,
                offset: 0,
                size: None,
            },
        )],
    ) {
        Ok(bind_group) => bind_group,
        Err(e) => {
            backend.destroy_buffer(buffer);
            return Err(e);
        }
    };
    Ok((buffer, bind_group))
}

impl SceneGeometry {
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        color_format: TextureFormat,
    ) -> BackendResult<Self> {
        let camera_layout = uniform_layout(backend, ShaderStageFlags::VERTEX_FRAGMENT)?;
        let object_layout = uniform_layout(backend, ShaderStageFlags::VERTEX)?;
        let material_layout = uniform_layout(backend, ShaderStageFlags::FRAGMENT)?;

        let main_camera = Self::camera_binding(backend, camera_layout, "Main Camera Buffer")?;

        let lit_pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Basic Pipeline".into()),
            vertex_shader: BASIC_SHADER.into(),
            fragment_shader: Some(BASIC_SHADER.into()),
            vertex_layouts: vec![Vertex::layout()],
            bind_group_layouts: vec![camera_layout, object_layout, material_layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::Back,
            // Depth was laid down by the prepass
            depth_stencil: Some(DepthStencilState {
                format: TextureFormat::Depth32Float,
                depth_write_enabled: false,
                depth_compare: CompareFunction::LessEqual,
            }),
            color_targets: vec![ColorTargetState {
                format: color_format,
                write_mask: ColorWrites::ALL,
            }],
        })?;

        let depth_pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Depth Only Pipeline".into()),
            vertex_shader: DEPTH_ONLY_SHADER.into(),
            fragment_shader: None,
            vertex_layouts: vec![Vertex::layout()],
            bind_group_layouts: vec![camera_layout, object_layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::Back,
            depth_stencil: Some(DepthStencilState {
                format: TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: CompareFunction::Less,
            }),
            color_targets: vec![],
        })?;

        Ok(Self {
            camera_layout,
            object_layout,
            material_layout,
            main_camera,
            lit_pipeline,
            depth_pipeline,
            gpu_meshes: HashMap::new(),
            gpu_materials: HashMap::new(),
            gpu_objects: Vec::new(),
            released: false,
        })
    }

    fn camera_binding<B: GraphicsBackend>(
        backend: &mut B,
        layout: BindGroupLayoutHandle,
        label: &str,
    ) -> BackendResult<CameraBinding> {
        let data = CameraUniformData::zeroed();
        let (buffer, bind_group) =
            uniform_buffer(backend, label.to_string(), layout, bytemuck::bytes_of(&data))?;
        Ok(CameraBinding { buffer, bind_group })
    }

    /// Camera uniforms for an extra viewpoint, such as a mask camera
    pub fn create_camera_binding<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        label: &str,
    ) -> BackendResult<CameraBinding> {
        Self::camera_binding(backend, self.camera_layout, label)
    }

    pub fn destroy_camera_binding<B: GraphicsBackend>(backend: &mut B, binding: CameraBinding) {
        backend.destroy_bind_group(binding.bind_group);
        backend.destroy_buffer(binding.buffer);
    }

    pub fn write_camera<B: GraphicsBackend>(
        backend: &mut B,
        binding: &CameraBinding,
        camera: &Camera,
    ) {
        backend.write_buffer(binding.buffer, 0, bytemuck::bytes_of(&camera.uniform_data()));
    }

    pub fn main_camera(&self) -> &CameraBinding {
        &self.main_camera
    }

    pub fn camera_layout(&self) -> BindGroupLayoutHandle {
        self.camera_layout
    }

    pub fn object_layout(&self) -> BindGroupLayoutHandle {
        self.object_layout
    }

    pub fn lit_pipeline(&self) -> RenderPipelineHandle {
        self.lit_pipeline
    }

    pub fn depth_pipeline(&self) -> RenderPipelineHandle {
        self.depth_pipeline
    }

    /// Upload meshes and materials added since the last sync and refresh
    /// every object transform.
    pub fn sync<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        meshes: &[Mesh],
        materials: &[Material],
    ) -> BackendResult<()> {
        for (id, mesh) in meshes.iter().enumerate() {
            if self.gpu_meshes.contains_key(&id) || mesh.indices.is_empty() {
                continue;
            }
            let vertex_buffer = backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("Vertex Buffer {}", id)),
                    size: mesh.vertex_bytes().len() as u64,
                    usage: BufferUsage::VERTEX,
                    mapped_at_creation: false,
                },
                mesh.vertex_bytes(),
            )?;
            let index_buffer = match backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("Index Buffer {}", id)),
                    size: mesh.index_bytes().len() as u64,
                    usage: BufferUsage::INDEX,
                    mapped_at_creation: false,
                },
                mesh.index_bytes(),
            ) {
                Ok(buffer) => buffer,
                Err(e) => {
                    backend.destroy_buffer(vertex_buffer);
                    return Err(e);
                }
            };
            log::debug!("Uploaded mesh '{}' ({} triangles)", mesh.name, mesh.triangle_count());
            self.gpu_meshes.insert(
                id,
                GpuMesh {
                    vertex_buffer,
                    index_buffer,
                    index_count: mesh.index_count() as u32,
                },
            );
        }

        for (id, material) in materials.iter().enumerate() {
            if self.gpu_materials.contains_key(&id) {
                continue;
            }
            let uniform: MaterialUniformData = material.uniform_data();
            let (buffer, bind_group) = uniform_buffer(
                backend,
                format!("Material Buffer {}", id),
                self.material_layout,
                bytemuck::bytes_of(&uniform),
            )?;
            self.gpu_materials.insert(id, GpuMaterial { buffer, bind_group });
        }

        while self.gpu_objects.len() > scene.objects.len() {
            if let Some(object) = self.gpu_objects.pop() {
                backend.destroy_bind_group(object.transform_bind_group);
                backend.destroy_buffer(object.transform_buffer);
            }
        }

        for (id, object) in scene.objects.iter().enumerate() {
            let data: TransformUniformData = object.transform.uniform_data();
            match self.gpu_objects.get(id) {
                Some(gpu) => {
                    backend.write_buffer(gpu.transform_buffer, 0, bytemuck::bytes_of(&data))
                }
                None => {
                    let (transform_buffer, transform_bind_group) = uniform_buffer(
                        backend,
                        format!("Transform Buffer {}", id),
                        self.object_layout,
                        bytemuck::bytes_of(&data),
                    )?;
                    self.gpu_objects.push(GpuObject {
                        transform_buffer,
                        transform_bind_group,
                    });
                }
            }
        }

        Ok(())
    }

    /// Draw every uploaded object on a layer in `filter`. The caller binds
    /// the pipeline and the camera group. Material groups are bound at index 2
    /// only when `with_materials` is set. Returns the number of draws.
    pub fn draw_objects<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        scene: &Scene,
        filter: LayerMask,
        with_materials: bool,
    ) -> usize {
        let mut draws = 0;
        for (index, object) in scene.objects.iter().enumerate() {
            if !object.visible_in(filter) {
                continue;
            }
            let (Some(mesh), Some(gpu_object)) =
                (self.gpu_meshes.get(&object.mesh_id), self.gpu_objects.get(index))
            else {
                continue;
            };

            if with_materials {
                let Some(material) = self.gpu_materials.get(&object.material_id) else {
                    continue;
                };
                backend.set_bind_group(2, material.bind_group);
            }

            backend.set_bind_group(1, gpu_object.transform_bind_group);
            backend.set_vertex_buffer(0, mesh.vertex_buffer, 0);
            backend.set_index_buffer(mesh.index_buffer, 0, IndexFormat::Uint32);
            backend.draw_indexed(0..mesh.index_count, 0, 0..1);
            draws += 1;
        }
        draws
    }

    /// Destroy every GPU resource. Safe to call more than once.
    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if self.released {
            return;
        }
        self.released = true;

        for (_, mesh) in self.gpu_meshes.drain() {
            backend.destroy_buffer(mesh.vertex_buffer);
            backend.destroy_buffer(mesh.index_buffer);
        }
        for (_, material) in self.gpu_materials.drain() {
            backend.destroy_bind_group(material.bind_group);
            backend.destroy_buffer(material.buffer);
        }
        for object in self.gpu_objects.drain(..) {
            backend.destroy_bind_group(object.transform_bind_group);
            backend.destroy_buffer(object.transform_buffer);
        }
        Self::destroy_camera_binding(backend, self.main_camera);
        backend.destroy_render_pipeline(self.lit_pipeline);
        backend.destroy_render_pipeline(self.depth_pipeline);
        backend.destroy_bind_group_layout(self.camera_layout);
        backend.destroy_bind_group_layout(self.object_layout);
        backend.destroy_bind_group_layout(self.material_layout);
    }
}
