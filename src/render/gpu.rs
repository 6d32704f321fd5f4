use std::sync::Arc;

use bytemuck::{bytes_of, Pod, Zeroable};
use glam::Vec4;
use log::{debug, info};
use wgpu::util::DeviceExt;

use crate::error::BatchError;
use crate::vertex::{BatchVertex, SLOTS_PER_VERTEX};

use super::common::{CameraParams, SHADER};
use super::{MeshSink, RenderBackend};

/// wgpu backend drawing batches into an offscreen colour/depth target.
///
/// Every mesh created by the backend shares its device, pipeline and
/// target, so several engines can draw into the same frame.
#[derive(Clone)]
pub struct GpuBackend {
    shared: Arc<GpuShared>,
}

struct GpuShared {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    target: OffscreenTarget,
}

impl GpuBackend {
    /// Acquires an adapter without a surface and builds the batch pipeline.
    pub async fn headless(width: u32, height: u32) -> Result<Self, BatchError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| BatchError::AdapterUnavailable)?;
        info!("using GPU adapter {}", adapter.get_info().name);

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("batch-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .map_err(|err| BatchError::DeviceRequest(err.to_string()))?;

        Ok(Self::from_device(device, queue, width, height))
    }

    /// Builds the pipeline on an existing device.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let target = OffscreenTarget::create(&device, width, height);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("batch-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("camera-bind-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<CameraUniform>() as u64,
                    ),
                },
                count: None,
            }],
        });

        // Fill texture: sampled view plus sampler
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("batch-pipeline-layout"),
            bind_group_layouts: &[&camera_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("camera-uniform"),
            contents: bytes_of(&CameraUniform::IDENTITY),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera-bind-group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("batch-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[BatchVertex::LAYOUT],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: OffscreenTarget::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: OffscreenTarget::COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        Self {
            shared: Arc::new(GpuShared {
                device,
                queue,
                pipeline,
                texture_layout,
                camera_buffer,
                camera_bind_group,
                target,
            }),
        }
    }

    /// Updates the camera used by every subsequent draw.
    pub fn update_camera(&self, camera: &CameraParams) {
        let uniform = CameraUniform {
            view_proj: camera.view_proj.to_cols_array_2d(),
            position: camera.position.extend(1.0).into(),
        };
        self.shared
            .queue
            .write_buffer(&self.shared.camera_buffer, 0, bytes_of(&uniform));
    }

    /// Clears the offscreen target to `color` and resets depth.
    pub fn clear(&self, color: Vec4) {
        let shared = &self.shared;
        let mut encoder = shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("clear-encoder"),
            });
        let clear = wgpu::Color {
            r: f64::from(color.x),
            g: f64::from(color.y),
            b: f64::from(color.z),
            a: f64::from(color.w),
        };
        drop(shared.target.begin_pass(
            &mut encoder,
            wgpu::LoadOp::Clear(clear),
            wgpu::LoadOp::Clear(1.0),
        ));
        shared.queue.submit(std::iter::once(encoder.finish()));
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.shared.device
    }

    /// Offscreen colour texture the batches are drawn into.
    pub fn target(&self) -> &wgpu::Texture {
        &self.shared.target.color
    }
}

impl RenderBackend for GpuBackend {
    type Texture = GpuTexture;
    type Mesh = GpuMesh;

    fn create_mesh(&self, label: &str, max_vertices: usize) -> Result<GpuMesh, BatchError> {
        let device = &self.shared.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = create_vertex_buffer(device, label, max_vertices);
        if pollster::block_on(device.pop_error_scope()).is_some() {
            return Err(BatchError::Allocation {
                what: "GPU vertex buffer",
                slots: max_vertices.saturating_mul(SLOTS_PER_VERTEX),
            });
        }
        Ok(GpuMesh {
            shared: Arc::clone(&self.shared),
            label: label.to_string(),
            buffer,
            capacity: max_vertices.max(1),
        })
    }

    fn create_placeholder_texture(&self, label: &str) -> Result<GpuTexture, BatchError> {
        let shared = &self.shared;
        shared.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = GpuTexture::solid(shared, label, [255; 4]);
        if pollster::block_on(shared.device.pop_error_scope()).is_some() {
            return Err(BatchError::Allocation {
                what: "placeholder texture",
                slots: 1,
            });
        }
        Ok(texture)
    }
}

fn create_vertex_buffer(device: &wgpu::Device, label: &str, vertices: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(&format!("{label}-vertices")),
        size: (vertices.max(1) * std::mem::size_of::<BatchVertex>()) as u64,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Vertex buffer owned by one batch engine.
pub struct GpuMesh {
    shared: Arc<GpuShared>,
    label: String,
    buffer: wgpu::Buffer,
    capacity: usize,
}

impl GpuMesh {
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl MeshSink for GpuMesh {
    type Texture = GpuTexture;

    fn upload(&mut self, vertices: &[BatchVertex]) {
        if vertices.len() > self.capacity {
            debug!(
                "growing {} vertex buffer from {} to {} vertices",
                self.label,
                self.capacity,
                vertices.len()
            );
            self.buffer = create_vertex_buffer(&self.shared.device, &self.label, vertices.len());
            self.capacity = vertices.len();
        }
        if !vertices.is_empty() {
            self.shared
                .queue
                .write_buffer(&self.buffer, 0, bytemuck::cast_slice(vertices));
        }
    }

    fn draw(&mut self, vertex_count: u32, texture: &GpuTexture) {
        let shared = &self.shared;
        let mut encoder = shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("batch-encoder"),
            });
        {
            let mut pass =
                shared
                    .target
                    .begin_pass(&mut encoder, wgpu::LoadOp::Load, wgpu::LoadOp::Load);
            pass.set_pipeline(&shared.pipeline);
            pass.set_bind_group(0, &shared.camera_bind_group, &[]);
            pass.set_bind_group(1, &texture.bind_group, &[]);
            pass.set_vertex_buffer(0, self.buffer.slice(..));
            pass.draw(0..vertex_count, 0..1);
        }
        shared.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// Texture bound as the fill of a batch.
pub struct GpuTexture {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

impl GpuTexture {
    fn solid(shared: &GpuShared, label: &str, rgba: [u8; 4]) -> Self {
        let texture = shared.device.create_texture_with_data(
            &shared.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &rgba,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = shared.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            ..Default::default()
        });
        let bind_group = shared.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &shared.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });
        Self {
            _texture: texture,
            bind_group,
        }
    }

    /// Creates a 1x1 texture of a single colour on the backend's device.
    pub fn from_rgba(backend: &GpuBackend, label: &str, rgba: [u8; 4]) -> Self {
        Self::solid(&backend.shared, label, rgba)
    }
}

struct OffscreenTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    _depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
}

impl OffscreenTarget {
    const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
    const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("batch-color-target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("batch-depth-target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            color,
            color_view,
            _depth: depth,
            depth_view,
        }
    }

    fn begin_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        color: wgpu::LoadOp<wgpu::Color>,
        depth: wgpu::LoadOp<f32>,
    ) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("batch-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.color_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    position: [f32; 4],
}

impl CameraUniform {
    const IDENTITY: Self = Self {
        view_proj: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
        position: [0.0, 0.0, 0.0, 1.0],
    };
}
