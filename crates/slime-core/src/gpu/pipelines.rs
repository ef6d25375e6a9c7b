use wgpu::util::DeviceExt;
use wgpu::{CommandEncoder, ComputePipeline, Device, Queue, RenderPipeline, TextureView};

use slime_params::bindings::{validate_agent_uniforms, validate_decay_uniforms, AGENT_WORKGROUP, FIELD_WORKGROUP};
use slime_params::{AgentUniforms, ColorUniforms, DecayUniforms, SimulationConfig, TrailParams};

use crate::gpu::layouts::Layouts;
use crate::gpu::textures::FieldHandle;
use crate::gpu::GpuDevice;
use crate::shaders;
use crate::sim::Agent;

/// Compute pipelines for the simulation
pub struct ComputePipelines {
    pub decay_pipeline: ComputePipeline,
    pub deposit_pipeline: ComputePipeline,
    pub composite_pipeline: ComputePipeline,
}

impl ComputePipelines {
    pub fn new(device: &Device, layouts: &Layouts) -> Self {
        let decay_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("decay_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::decay().into()),
        });
        let agent_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("agent_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::agent_step().into()),
        });

        let decay_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("decay_pl"),
            bind_group_layouts: &[&layouts.decay],
            push_constant_ranges: &[],
        });
        let agent_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("agent_pl"),
            bind_group_layouts: &[&layouts.agent],
            push_constant_ranges: &[],
        });

        let compute = |label: &str, layout: &wgpu::PipelineLayout, module: &wgpu::ShaderModule, entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                module,
                entry_point,
            })
        };

        Self {
            decay_pipeline: compute("decay_pipeline", &decay_pl, &decay_shader, "main"),
            deposit_pipeline: compute("deposit_pipeline", &agent_pl, &agent_shader, "deposit"),
            composite_pipeline: compute("composite_pipeline", &agent_pl, &agent_shader, "composite"),
        }
    }
}

/// Full-screen quad that maps the trail channels through the species palette
pub struct FieldRenderer {
    render_pipeline: RenderPipeline,
    sampler: wgpu::Sampler,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
}

impl FieldRenderer {
    pub fn new(device: &Device, layouts: &Layouts, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("field_render_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::render().into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("field_pipeline_layout"),
            bind_group_layouts: &[&layouts.render],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("field_render_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[Vertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        // Repeat addressing keeps filtering seamless across the torus seam
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("field_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        // Row 0 of the field lands at the top of the target
        let vertices = [
            Vertex { position: [-1.0, -1.0], tex_coords: [0.0, 1.0] },
            Vertex { position: [1.0, -1.0], tex_coords: [1.0, 1.0] },
            Vertex { position: [1.0, 1.0], tex_coords: [1.0, 0.0] },
            Vertex { position: [-1.0, 1.0], tex_coords: [0.0, 0.0] },
        ];
        let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("field_vertex_buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("field_index_buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            render_pipeline,
            sampler,
            vertex_buffer,
            index_buffer,
            num_indices: indices.len() as u32,
        }
    }
}

/// Vertex structure for the full-screen quad
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
    tex_coords: [f32; 2],
}

impl Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// GPU buffers owned by one driver for its whole lifetime
pub struct PassBuffers {
    pub agents: wgpu::Buffer,
    pub agent_staging: wgpu::Buffer,
    pub deposits: wgpu::Buffer,
    pub agent_uniforms: wgpu::Buffer,
    pub decay_uniforms: wgpu::Buffer,
    pub colors: wgpu::Buffer,
    pub agent_count: u32,
    pub field_size: [u32; 2],
}

impl PassBuffers {
    pub fn new(
        gpu: &GpuDevice,
        agents: &[Agent],
        field_size: [u32; 2],
        config: &SimulationConfig,
        trail: &TrailParams,
    ) -> Self {
        assert!(!agents.is_empty(), "agent population must not be empty");
        let agents_bytes = std::mem::size_of_val(agents) as u64;

        Self {
            agents: gpu.create_agents_buffer(agents),
            agent_staging: gpu.create_staging_buffer("agents_staging", agents_bytes),
            deposits: gpu.create_deposit_buffer(field_size),
            agent_uniforms: gpu.create_uniform_buffer("agent_params", &AgentUniforms::new(config, trail, field_size)),
            decay_uniforms: gpu.create_uniform_buffer("decay_params", &DecayUniforms::new(trail, field_size)),
            colors: gpu.create_uniform_buffer("palette", &ColorUniforms::from(config)),
            agent_count: agents.len() as u32,
            field_size,
        }
    }

    /// Refresh every uniform block from the config snapshot
    pub fn write_uniforms(&self, queue: &Queue, config: &SimulationConfig, trail: &TrailParams) {
        let agent = AgentUniforms::new(config, trail, self.field_size);
        let decay = DecayUniforms::new(trail, self.field_size);
        debug_assert!(validate_agent_uniforms(&agent, self.field_size).is_ok());
        if let Err(msg) = validate_decay_uniforms(&decay) {
            log::warn!("{}", msg);
        }
        queue.write_buffer(&self.agent_uniforms, 0, bytemuck::bytes_of(&agent));
        queue.write_buffer(&self.decay_uniforms, 0, bytemuck::bytes_of(&decay));
        queue.write_buffer(&self.colors, 0, bytemuck::bytes_of(&ColorUniforms::from(config)));
    }

    /// Upload the host population into the agent storage buffer
    pub fn write_agents(&self, queue: &Queue, agents: &[Agent]) {
        assert_eq!(agents.len() as u32, self.agent_count, "population size is fixed");
        queue.write_buffer(&self.agents, 0, bytemuck::cast_slice(agents));
    }
}

/// The closed set of passes one step is made of
pub enum Pass<'a> {
    /// Read `src`, write the decayed/diffused field into `dst`
    Decay { src: FieldHandle<'a>, dst: FieldHandle<'a> },
    /// Move every agent against `src`, write `src` plus deposits into `dst`,
    /// then copy the agent buffer into the staging buffer
    AgentStep { src: FieldHandle<'a>, dst: FieldHandle<'a> },
    /// Draw `src` into `target`
    Render { src: FieldHandle<'a>, target: &'a TextureView },
}

impl Pass<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            Pass::Decay { .. } => "decay",
            Pass::AgentStep { .. } => "agent_step",
            Pass::Render { .. } => "render",
        }
    }
}

/// Records passes into command encoders
pub struct PassEncoder {
    pub layouts: Layouts,
    pub compute: ComputePipelines,
    pub renderer: FieldRenderer,
}

impl PassEncoder {
    pub fn new(device: &Device, target_format: wgpu::TextureFormat) -> Self {
        slime_params::bindings::log_binding_layouts();
        let layouts = Layouts::new(device);
        let compute = ComputePipelines::new(device, &layouts);
        let renderer = FieldRenderer::new(device, &layouts, target_format);
        Self {
            layouts,
            compute,
            renderer,
        }
    }

    pub fn record(&self, device: &Device, encoder: &mut CommandEncoder, buffers: &PassBuffers, pass: Pass<'_>) {
        log::trace!("recording {} pass", pass.label());
        match pass {
            Pass::Decay { src, dst } => {
                assert_ne!(src.slot, dst.slot, "decay pass would read and write one texture");
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("decay_bg"),
                    layout: &self.layouts.decay,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(src.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(dst.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: buffers.decay_uniforms.as_entire_binding(),
                        },
                    ],
                });

                let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("decay pass"),
                    timestamp_writes: None,
                });
                cpass.set_pipeline(&self.compute.decay_pipeline);
                cpass.set_bind_group(0, &bind_group, &[]);
                let (gx, gy) = field_workgroups(buffers.field_size);
                cpass.dispatch_workgroups(gx, gy, 1);
            }
            Pass::AgentStep { src, dst } => {
                assert_ne!(src.slot, dst.slot, "agent pass would read and write one texture");
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("agent_bg"),
                    layout: &self.layouts.agent,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: buffers.agents.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(src.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(dst.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: buffers.agent_uniforms.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: buffers.deposits.as_entire_binding(),
                        },
                    ],
                });

                {
                    let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("agent deposit pass"),
                        timestamp_writes: None,
                    });
                    cpass.set_pipeline(&self.compute.deposit_pipeline);
                    cpass.set_bind_group(0, &bind_group, &[]);
                    let gx = (buffers.agent_count + AGENT_WORKGROUP - 1) / AGENT_WORKGROUP;
                    cpass.dispatch_workgroups(gx, 1, 1);
                } // cpass is dropped here

                {
                    let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("agent composite pass"),
                        timestamp_writes: None,
                    });
                    cpass.set_pipeline(&self.compute.composite_pipeline);
                    cpass.set_bind_group(0, &bind_group, &[]);
                    let (gx, gy) = field_workgroups(buffers.field_size);
                    cpass.dispatch_workgroups(gx, gy, 1);
                }

                encoder.copy_buffer_to_buffer(&buffers.agents, 0, &buffers.agent_staging, 0, buffers.agent_staging.size());
            }
            Pass::Render { src, target } => {
                let r = &self.renderer;
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("render_bg"),
                    layout: &self.layouts.render,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(src.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&r.sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: buffers.colors.as_entire_binding(),
                        },
                    ],
                });

                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("field_render_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                });
                render_pass.set_pipeline(&r.render_pipeline);
                render_pass.set_bind_group(0, &bind_group, &[]);
                render_pass.set_vertex_buffer(0, r.vertex_buffer.slice(..));
                render_pass.set_index_buffer(r.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                render_pass.draw_indexed(0..r.num_indices, 0, 0..1);
            }
        }
    }
}

fn field_workgroups(size: [u32; 2]) -> (u32, u32) {
    (
        (size[0] + FIELD_WORKGROUP - 1) / FIELD_WORKGROUP,
        (size[1] + FIELD_WORKGROUP - 1) / FIELD_WORKGROUP,
    )
}
