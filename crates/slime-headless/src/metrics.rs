use std::fs::File;
use std::path::Path;
use std::time::Duration;

use csv::Writer;
use serde::Serialize;
use slime_core::{AgentStats, FieldStats};

/// One metrics.csv row
#[derive(Debug, Serialize)]
struct MetricsRow {
    step: u64,
    mean_a: f32,
    mean_b: f32,
    mean_c: f32,
    max_a: f32,
    max_b: f32,
    max_c: f32,
    coverage: f32,
    agents: u32,
    agents_a: u32,
    agents_b: u32,
    agents_c: u32,
    mean_speed: f32,
    heading_alignment: f32,
    out_of_domain: u32,
    wall_time_ms: f64,
}

/// Metrics writer for CSV output
pub struct MetricsWriter {
    csv_writer: Writer<File>,
    rows: u32,
}

impl MetricsWriter {
    pub fn new(output_dir: &Path) -> anyhow::Result<Self> {
        let file = File::create(output_dir.join("metrics.csv"))?;
        Ok(Self {
            csv_writer: Writer::from_writer(file),
            rows: 0,
        })
    }

    pub fn write_step(
        &mut self,
        step: u64,
        field: &FieldStats,
        agents: &AgentStats,
        step_time: Duration,
    ) -> anyhow::Result<()> {
        let row = MetricsRow {
            step,
            mean_a: field.mean[0],
            mean_b: field.mean[1],
            mean_c: field.mean[2],
            max_a: field.max[0],
            max_b: field.max[1],
            max_c: field.max[2],
            coverage: field.coverage,
            agents: agents.count,
            agents_a: agents.per_species[0],
            agents_b: agents.per_species[1],
            agents_c: agents.per_species[2],
            mean_speed: agents.mean_speed,
            heading_alignment: agents.heading_alignment,
            out_of_domain: agents.out_of_domain,
            wall_time_ms: step_time.as_secs_f64() * 1000.0,
        };

        self.csv_writer.serialize(row)?;
        self.csv_writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }
}
