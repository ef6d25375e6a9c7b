use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Result;
use csv::Writer;
use image::{GrayImage, ImageBuffer, Luma, RgbaImage};
use slime_core::{Agent, TrailField};

/// Snapshot writer for rendered frames, trail channels and agent data
pub struct SnapshotWriter {
    output_dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(output_dir: &Path) -> Result<Self> {
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Save a rendered RGBA8 frame as `frame_<step>.png`
    pub fn write_frame(&self, step: u64, size: [u32; 2], rgba: Vec<u8>) -> Result<()> {
        let img: RgbaImage = ImageBuffer::from_raw(size[0], size[1], rgba)
            .ok_or_else(|| anyhow::anyhow!("frame buffer does not match {}x{}", size[0], size[1]))?;
        img.save(self.output_dir.join(format!("frame_{:05}.png", step)))?;
        Ok(())
    }

    /// Save each species trail channel as a grayscale `trail_<species>_<step>.png`
    pub fn write_trail_channels(&self, step: u64, field: &TrailField) -> Result<()> {
        for (channel, name) in ["a", "b", "c"].iter().enumerate() {
            let img: GrayImage = ImageBuffer::from_fn(field.width(), field.height(), |x, y| Luma([field.get(x, y)[channel]]));
            img.save(self.output_dir.join(format!("trail_{}_{:05}.png", name, step)))?;
        }
        Ok(())
    }

    /// Write agent species, positions and velocities to CSV
    pub fn write_agents(&self, step: u64, agents: &[Agent]) -> Result<()> {
        let file = File::create(self.output_dir.join(format!("agents_{:05}.csv", step)))?;
        let mut csv_writer = Writer::from_writer(file);

        csv_writer.write_record(["id", "species", "x", "y", "vx", "vy"])?;
        for (i, agent) in agents.iter().enumerate() {
            csv_writer.write_record(&[
                i.to_string(),
                format!("{:?}", agent.species()),
                agent.position[0].to_string(),
                agent.position[1].to_string(),
                agent.velocity[0].to_string(),
                agent.velocity[1].to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}
