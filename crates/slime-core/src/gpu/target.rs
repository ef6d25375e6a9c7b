use wgpu::{Texture, TextureView};

use crate::error::Result;
use crate::gpu::textures::read_rgba8_texture;
use crate::gpu::GpuDevice;

/// Owned render target for headless rendering and tests
pub struct OffscreenTarget {
    pub texture: Texture,
    pub view: TextureView,
    pub size: [u32; 2],
}

impl OffscreenTarget {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    pub fn new(gpu: &GpuDevice, size: [u32; 2]) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen_target"),
            size: wgpu::Extent3d {
                width: size[0],
                height: size[1],
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view, size }
    }

    /// RGBA8 pixels, row-major, top row first
    pub fn read_pixels(&self, gpu: &GpuDevice) -> Result<Vec<u8>> {
        read_rgba8_texture(gpu, &self.texture, self.size)
    }
}
