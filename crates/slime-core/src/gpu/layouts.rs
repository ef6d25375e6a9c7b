use wgpu::{BindGroupLayout, Device};

use crate::gpu::textures::FIELD_FORMAT;

/// Centralized registry that owns all bind group layouts
///
/// Pipelines and per-dispatch bind groups borrow these by reference.
pub struct Layouts {
    /// Decay/diffuse compute shader layout
    pub decay: BindGroupLayout,

    /// Agent step compute shader layout (deposit + composite entries)
    pub agent: BindGroupLayout,

    /// Field render shader layout (sampled field + sampler + palette)
    pub render: BindGroupLayout,
}

impl Layouts {
    /// Create all bind group layouts once
    pub fn new(device: &Device) -> Self {
        Self {
            decay: Self::create_decay_layout(device),
            agent: Self::create_agent_layout(device),
            render: Self::create_render_layout(device),
        }
    }

    fn sampled_field(binding: u32, visibility: wgpu::ShaderStages, filterable: bool) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }
    }

    fn storage_field(binding: u32) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: FIELD_FORMAT,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        }
    }

    fn buffer(binding: u32, visibility: wgpu::ShaderStages, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }

    fn create_decay_layout(device: &Device) -> BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("decay_bgl"),
            entries: &[
                // @binding(0) src field (read role)
                Self::sampled_field(0, wgpu::ShaderStages::COMPUTE, false),
                // @binding(1) dst field (write role)
                Self::storage_field(1),
                // @binding(2) DecayParams
                Self::buffer(2, wgpu::ShaderStages::COMPUTE, wgpu::BufferBindingType::Uniform),
            ],
        })
    }

    fn create_agent_layout(device: &Device) -> BindGroupLayout {
        let storage = wgpu::BufferBindingType::Storage { read_only: false };
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("agent_bgl"),
            entries: &[
                // @binding(0) agents (read_write)
                Self::buffer(0, wgpu::ShaderStages::COMPUTE, storage),
                // @binding(1) src field (read role, post-decay)
                Self::sampled_field(1, wgpu::ShaderStages::COMPUTE, false),
                // @binding(2) dst field (write role)
                Self::storage_field(2),
                // @binding(3) AgentParams
                Self::buffer(3, wgpu::ShaderStages::COMPUTE, wgpu::BufferBindingType::Uniform),
                // @binding(4) deposit accumulator (atomic u32 x3 per texel)
                Self::buffer(4, wgpu::ShaderStages::COMPUTE, storage),
            ],
        })
    }

    fn create_render_layout(device: &Device) -> BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("render_bgl"),
            entries: &[
                Self::sampled_field(0, wgpu::ShaderStages::FRAGMENT, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                Self::buffer(2, wgpu::ShaderStages::FRAGMENT, wgpu::BufferBindingType::Uniform),
            ],
        })
    }
}
