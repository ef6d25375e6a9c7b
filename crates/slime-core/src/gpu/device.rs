use std::sync::mpsc;

use wgpu::util::DeviceExt;
use wgpu::{Adapter, Device, Instance, Queue, RequestAdapterOptions};

use crate::error::{Result, SimError};
use crate::sim::Agent;

/// GPU device manager shared by every pass of one driver
pub struct GpuDevice {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
}

impl GpuDevice {
    /// Request a device for headless compute (no surface)
    pub async fn headless() -> Result<Self> {
        Self::request(Instance::default(), None).await
    }

    /// Request a device able to present to `compatible_surface`.
    ///
    /// The surface must have been created from `instance`.
    pub async fn request(instance: Instance, compatible_surface: Option<&wgpu::Surface<'_>>) -> Result<Self> {
        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| SimError::UnsupportedAccelerator("no suitable adapter".into()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("slime_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await?;

        let gpu = Self {
            instance,
            adapter,
            device,
            queue,
        };
        log::info!("{}", gpu.info());
        Ok(gpu)
    }

    /// Get device info for logging
    pub fn info(&self) -> String {
        let info = self.adapter.get_info();
        format!(
            "GPU: {} ({:?}), max storage buffer: {} MB",
            info.name,
            info.backend,
            self.device.limits().max_storage_buffer_binding_size / (1024 * 1024)
        )
    }

    /// Create a buffer with initial data
    pub fn create_buffer_with_data<T: bytemuck::Pod>(
        &self,
        label: &str,
        usage: wgpu::BufferUsages,
        data: &[T],
    ) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(data),
            usage,
        })
    }

    /// Create a uniform buffer holding one `T`
    pub fn create_uniform_buffer<T: bytemuck::Pod>(&self, label: &str, value: &T) -> wgpu::Buffer {
        self.create_buffer_with_data(
            label,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            std::slice::from_ref(value),
        )
    }

    /// Create the agent storage buffer; it is rewritten from the host every step
    pub fn create_agents_buffer(&self, agents: &[Agent]) -> wgpu::Buffer {
        self.create_buffer_with_data(
            "agents",
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            agents,
        )
    }

    /// Create the host-mappable copy target for agent read-back
    pub fn create_staging_buffer(&self, label: &str, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        })
    }

    /// Create the per-texel deposit accumulator (zeroed)
    pub fn create_deposit_buffer(&self, size: [u32; 2]) -> wgpu::Buffer {
        let lanes = size[0] as u64 * size[1] as u64 * slime_params::bindings::DEPOSIT_CHANNELS as u64;
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("trail_deposits"),
            size: lanes * std::mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Submit commands to the GPU
    pub fn submit(&self, commands: wgpu::CommandBuffer) {
        self.queue.submit(Some(commands));
    }

    /// Wait for GPU operations to complete
    pub fn wait(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }

    /// Map `buffer` for reading, block until it is host-visible, and hand the
    /// bytes to `read`. The buffer is unmapped again before returning.
    pub fn read_buffer<R>(&self, buffer: &wgpu::Buffer, read: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let slice = buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // receiver outlives the poll below
            let _ = tx.send(result);
        });
        self.wait();

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(SimError::BufferMapFailure(err)),
            Err(_) => return Err(SimError::BufferMapFailure(wgpu::BufferAsyncError)),
        }

        let out = {
            let data = slice.get_mapped_range();
            read(&data)
        };
        buffer.unmap();
        Ok(out)
    }
}
