use wgpu::{Device, Queue, Texture, TextureView, TextureViewDescriptor};

use crate::error::Result;
use crate::gpu::GpuDevice;
use crate::sim::TrailField;

/// Pixel format of both trail textures
pub const FIELD_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Two equally shaped values with alternating read/write roles.
///
/// Exactly one slot holds the read role at any time; the other holds the
/// write role. `swap` only flips an index.
#[derive(Debug, Clone)]
pub struct PingPong<T> {
    slots: [T; 2],
    read: usize,
}

impl<T> PingPong<T> {
    /// `front` starts with the read role
    pub fn new(front: T, back: T) -> Self {
        Self {
            slots: [front, back],
            read: 0,
        }
    }

    pub fn read_slot(&self) -> usize {
        self.read
    }

    pub fn write_slot(&self) -> usize {
        self.read ^ 1
    }

    pub fn read(&self) -> &T {
        &self.slots[self.read_slot()]
    }

    pub fn write(&self) -> &T {
        &self.slots[self.write_slot()]
    }

    /// Borrow the read side shared and the write side exclusively
    pub fn split_mut(&mut self) -> (&T, &mut T) {
        let (first, second) = self.slots.split_at_mut(1);
        if self.read == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    pub fn slot(&self, slot: usize) -> &T {
        &self.slots[slot]
    }

    pub fn swap(&mut self) {
        self.read ^= 1;
    }
}

/// Which role to address when reading a field back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Read,
    Write,
}

/// One trail texture and its default view (bindable as sampled or storage)
pub struct FieldTexture {
    pub texture: Texture,
    pub view: TextureView,
}

/// Borrowed view of one of the two field textures
#[derive(Clone, Copy)]
pub struct FieldHandle<'a> {
    pub slot: usize,
    pub texture: &'a Texture,
    pub view: &'a TextureView,
}

/// Field texture pair for ping-pong operations
pub struct DoubleBufferedField {
    textures: PingPong<FieldTexture>,
    size: [u32; 2],
}

impl DoubleBufferedField {
    /// Allocate both textures with identical size, format and usage.
    ///
    /// Panics on a zero dimension.
    pub fn new(device: &Device, size: [u32; 2]) -> Self {
        assert!(
            size[0] > 0 && size[1] > 0,
            "trail field dimensions must be positive, got {:?}",
            size
        );

        let usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;

        let extent = wgpu::Extent3d {
            width: size[0],
            height: size[1],
            depth_or_array_layers: 1,
        };

        let create = |label: &str| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: FIELD_FORMAT,
                usage,
                view_formats: &[],
            });
            let view = texture.create_view(&TextureViewDescriptor::default());
            FieldTexture { texture, view }
        };

        Self {
            textures: PingPong::new(create("trail_field_a"), create("trail_field_b")),
            size,
        }
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    fn handle(&self, slot: usize) -> FieldHandle<'_> {
        let tex = self.textures.slot(slot);
        FieldHandle {
            slot,
            texture: &tex.texture,
            view: &tex.view,
        }
    }

    pub fn current_for_read(&self) -> FieldHandle<'_> {
        self.handle(self.textures.read_slot())
    }

    pub fn current_for_write(&self) -> FieldHandle<'_> {
        self.handle(self.textures.write_slot())
    }

    /// Swap the ping-pong roles
    pub fn swap(&mut self) {
        self.textures.swap();
    }

    /// Overwrite the read-role texture with host data
    pub fn upload(&self, queue: &Queue, field: &TrailField) {
        assert_eq!(field.size, self.size, "uploaded field must match the texture size");
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: self.current_for_read().texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            field.as_bytes(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.size[0] * 4),
                rows_per_image: Some(self.size[1]),
            },
            self.extent(),
        );
    }

    /// Reset both textures to an empty field
    pub fn clear(&self, queue: &Queue) {
        let empty = TrailField::new(self.size);
        for slot in 0..2 {
            queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: self.handle(slot).texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                empty.as_bytes(),
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.size[0] * 4),
                    rows_per_image: Some(self.size[1]),
                },
                self.extent(),
            );
        }
    }

    /// Download the texture currently holding `role`
    pub fn download(&self, gpu: &GpuDevice, role: FieldRole) -> Result<TrailField> {
        let handle = match role {
            FieldRole::Read => self.current_for_read(),
            FieldRole::Write => self.current_for_write(),
        };
        let bytes = read_rgba8_texture(gpu, handle.texture, self.size)?;
        Ok(TrailField::from_bytes(self.size, &bytes))
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.size[0],
            height: self.size[1],
            depth_or_array_layers: 1,
        }
    }
}

/// Copy a 4-byte-per-texel texture into host memory, stripping the row
/// padding the copy requires
pub fn read_rgba8_texture(gpu: &GpuDevice, texture: &Texture, size: [u32; 2]) -> Result<Vec<u8>> {
    let unpadded_bpr = size[0] * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bpr = (unpadded_bpr + align - 1) / align * align;

    let staging = gpu.create_staging_buffer("texture_download_staging", padded_bpr as u64 * size[1] as u64);

    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("texture_download_encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bpr),
                rows_per_image: Some(size[1]),
            },
        },
        wgpu::Extent3d {
            width: size[0],
            height: size[1],
            depth_or_array_layers: 1,
        },
    );
    gpu.submit(encoder.finish());

    gpu.read_buffer(&staging, |data| {
        let mut out = Vec::with_capacity((unpadded_bpr * size[1]) as usize);
        for row in data.chunks_exact(padded_bpr as usize) {
            out.extend_from_slice(&row[..unpadded_bpr as usize]);
        }
        out
    })
}
