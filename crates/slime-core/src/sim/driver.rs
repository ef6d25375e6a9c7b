//! Step scheduling and GPU resource ownership for one simulation

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use wgpu::TextureView;

use slime_params::bindings::{AGENT_WORKGROUP, DEPOSIT_CHANNELS};
use slime_params::{SimulationConfig, TrailParams};

use crate::error::{Result, SimError};
use crate::gpu::{DoubleBufferedField, FieldRole, GpuDevice, Pass, PassBuffers, PassEncoder};
use crate::sim::agents::{Agent, AgentPopulation, AgentStats};
use crate::sim::field::TrailField;

/// Startup parameters that stay fixed for the lifetime of a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    pub field_size: [u32; 2],
    pub agent_count: u32,
    pub seed: u64,
    /// Upper bound of each seeded velocity component, normalized units
    pub initial_speed: f32,
    pub trail: TrailParams,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            field_size: [1024, 1024],
            agent_count: 200_000,
            seed: 1337,
            initial_speed: 0.001,
            trail: TrailParams::default(),
        }
    }
}

impl DriverSettings {
    /// Reject settings no driver can be built from
    pub fn validate(&self) -> Result<()> {
        if self.agent_count == 0 {
            return Err(SimError::InvalidSettings("agent_count must be positive".into()));
        }
        if self.field_size[0] == 0 || self.field_size[1] == 0 {
            return Err(SimError::InvalidSettings(format!(
                "field_size must be positive, got {:?}",
                self.field_size
            )));
        }
        Ok(())
    }

    /// Check the field and population against what `limits` can bind.
    ///
    /// The deposit accumulator (three `u32` lanes per texel) and the agent
    /// buffer are each bound whole as a storage buffer.
    pub fn check_limits(&self, limits: &wgpu::Limits) -> Result<()> {
        let [w, h] = self.field_size;
        let max_dim = limits.max_texture_dimension_2d;
        if w > max_dim || h > max_dim {
            return Err(SimError::UnsupportedAccelerator(format!(
                "field {}x{} exceeds max_texture_dimension_2d {}",
                w, h, max_dim
            )));
        }

        let max_binding = limits.max_storage_buffer_binding_size as u64;
        let max_buffer = limits.max_buffer_size.min(max_binding);
        let deposit_bytes = w as u64 * h as u64 * DEPOSIT_CHANNELS as u64 * std::mem::size_of::<u32>() as u64;
        if deposit_bytes > max_buffer {
            return Err(SimError::UnsupportedAccelerator(format!(
                "field {}x{} needs a {} B deposit buffer, device allows {} B",
                w, h, deposit_bytes, max_buffer
            )));
        }

        let agent_bytes = self.agent_count as u64 * std::mem::size_of::<Agent>() as u64;
        if agent_bytes > max_buffer {
            return Err(SimError::UnsupportedAccelerator(format!(
                "{} agents need a {} B buffer, device allows {} B",
                self.agent_count, agent_bytes, max_buffer
            )));
        }

        let groups = self.agent_count.div_ceil(AGENT_WORKGROUP);
        if groups > limits.max_compute_workgroups_per_dimension {
            return Err(SimError::UnsupportedAccelerator(format!(
                "{} agents need {} workgroups, device allows {}",
                self.agent_count, groups, limits.max_compute_workgroups_per_dimension
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// No device or resources yet
    Idle,
    Ready,
    /// Between upload and read-back of one step
    Stepping,
}

/// Play/pause/single-step bookkeeping polled once per host frame
#[derive(Debug, Clone, Copy, Default)]
pub struct Playback {
    playing: bool,
    step_requested: bool,
}

impl Playback {
    pub fn play(&mut self) {
        self.playing = true;
    }

    /// Takes effect at the next frame; a step in flight completes
    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn request_step(&mut self) {
        self.step_requested = true;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Whether a step is due this frame. Consumes a pending single-step request.
    pub fn take_due(&mut self) -> bool {
        let requested = std::mem::take(&mut self.step_requested);
        self.playing || requested
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StepReport {
    /// 1-based index of the completed step
    pub step: u64,
    pub elapsed: Duration,
}

/// Everything that only exists once a device is available
struct Engine {
    gpu: GpuDevice,
    field: DoubleBufferedField,
    passes: PassEncoder,
    buffers: PassBuffers,
}

/// Owns the trail fields, agent buffers and pipelines of one simulation and
/// advances it one step at a time.
///
/// Each step uploads the host agents, runs decay and agent passes with a role
/// swap after each, reads the agents back and renders the newest field.
pub struct SimulationDriver {
    settings: DriverSettings,
    config: SimulationConfig,
    population: AgentPopulation,
    playback: Playback,
    state: DriverState,
    steps: u64,
    engine: Option<Engine>,
}

impl SimulationDriver {
    /// Panics on settings that fail [`DriverSettings::validate`]; callers
    /// taking settings from users validate them first.
    pub fn new(settings: DriverSettings, config: SimulationConfig) -> Self {
        if let Err(err) = settings.validate() {
            panic!("{}", err);
        }
        config.log_out_of_range();

        Self {
            settings,
            config,
            population: AgentPopulation::from_agents(Vec::new()),
            playback: Playback::default(),
            state: DriverState::Idle,
            steps: 0,
            engine: None,
        }
    }

    /// Acquire a headless device and allocate every resource
    pub async fn initialize(&mut self, target_format: wgpu::TextureFormat) -> Result<()> {
        let gpu = GpuDevice::headless().await?;
        self.initialize_with(gpu, target_format)
    }

    /// Allocate every resource on an already acquired device. `target_format`
    /// is the format of the views later passed to [`Self::step`].
    ///
    /// Fails with [`SimError::UnsupportedAccelerator`] when the field or the
    /// population does not fit the device limits; the driver then stays as it was.
    pub fn initialize_with(&mut self, gpu: GpuDevice, target_format: wgpu::TextureFormat) -> Result<()> {
        self.settings.check_limits(&gpu.device.limits())?;
        if self.engine.is_some() {
            log::warn!("re-initializing driver, previous resources are dropped");
        }

        let size = self.settings.field_size;
        self.population = AgentPopulation::new(self.settings.agent_count, self.settings.initial_speed, self.settings.seed);

        let field = DoubleBufferedField::new(&gpu.device, size);
        field.clear(&gpu.queue);
        let passes = PassEncoder::new(&gpu.device, target_format);
        let buffers = PassBuffers::new(&gpu, &self.population.agents, size, &self.config, &self.settings.trail);

        log::info!(
            "driver ready: {}x{} field, {} agents, seed {}",
            size[0],
            size[1],
            self.population.len(),
            self.settings.seed
        );

        self.engine = Some(Engine {
            gpu,
            field,
            passes,
            buffers,
        });
        self.state = DriverState::Ready;
        self.steps = 0;
        Ok(())
    }

    /// Advance one step and render the result into `target`.
    ///
    /// On failure the host agents keep their pre-step values and the driver
    /// returns to `Ready`.
    pub fn step(&mut self, target: &TextureView) -> Result<StepReport> {
        let engine = self.engine.as_mut().ok_or(SimError::NotInitialized)?;
        if self.state == DriverState::Stepping {
            return Err(SimError::StepInProgress);
        }

        self.state = DriverState::Stepping;
        let started = Instant::now();
        let result = Self::run_step(engine, &self.population.agents, &self.config, &self.settings.trail, target);
        self.state = DriverState::Ready;

        let agents = result.map_err(|err| {
            log::warn!("step {} failed: {}", self.steps + 1, err);
            err
        })?;
        self.population.agents = agents;
        self.steps += 1;

        let report = StepReport {
            step: self.steps,
            elapsed: started.elapsed(),
        };
        log::debug!("step {} took {:?}", report.step, report.elapsed);
        Ok(report)
    }

    fn run_step(
        engine: &mut Engine,
        agents: &[Agent],
        config: &SimulationConfig,
        trail: &TrailParams,
        target: &TextureView,
    ) -> Result<Vec<Agent>> {
        let Engine {
            gpu,
            field,
            passes,
            buffers,
        } = engine;

        buffers.write_agents(&gpu.queue, agents);
        buffers.write_uniforms(&gpu.queue, config, trail);

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("step_encoder"),
        });

        passes.record(
            &gpu.device,
            &mut encoder,
            buffers,
            Pass::Decay {
                src: field.current_for_read(),
                dst: field.current_for_write(),
            },
        );
        field.swap();

        passes.record(
            &gpu.device,
            &mut encoder,
            buffers,
            Pass::AgentStep {
                src: field.current_for_read(),
                dst: field.current_for_write(),
            },
        );
        field.swap();

        passes.record(
            &gpu.device,
            &mut encoder,
            buffers,
            Pass::Render {
                src: field.current_for_read(),
                target,
            },
        );

        gpu.submit(encoder.finish());
        gpu.read_buffer(&buffers.agent_staging, |bytes| {
            bytemuck::cast_slice::<u8, Agent>(bytes).to_vec()
        })
    }

    /// Draw the current field into `target` without stepping
    pub fn render(&self, target: &TextureView) -> Result<()> {
        let engine = self.engine.as_ref().ok_or(SimError::NotInitialized)?;
        engine.buffers.write_uniforms(&engine.gpu.queue, &self.config, &self.settings.trail);

        let mut encoder = engine.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("render_encoder"),
        });
        engine.passes.record(
            &engine.gpu.device,
            &mut encoder,
            &engine.buffers,
            Pass::Render {
                src: engine.field.current_for_read(),
                target,
            },
        );
        engine.gpu.submit(encoder.finish());
        Ok(())
    }

    /// Replace the configuration used from the next step on
    pub fn set_config(&mut self, config: SimulationConfig) {
        config.log_out_of_range();
        self.config = config;
    }

    /// Replace the configuration with a randomized one; locked interactions are kept
    pub fn randomize_config<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let config = self.config.randomized(rng);
        log::info!("randomized config: {:?}", config);
        self.set_config(config);
    }

    pub fn play(&mut self) {
        self.playback.play();
    }

    pub fn pause(&mut self) {
        self.playback.pause();
    }

    pub fn request_step(&mut self) {
        self.playback.request_step();
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    /// Host frame callback: steps once when playing or when a single step was
    /// requested, otherwise does nothing
    pub fn on_frame(&mut self, target: &TextureView) -> Result<Option<StepReport>> {
        if !self.playback.take_due() {
            return Ok(None);
        }
        self.step(target).map(Some)
    }

    /// Reseed the agents from the settings seed and clear both fields
    pub fn reset(&mut self) -> Result<()> {
        let engine = self.engine.as_ref().ok_or(SimError::NotInitialized)?;
        self.population.reset(self.settings.initial_speed, self.settings.seed);
        engine.field.clear(&engine.gpu.queue);
        self.steps = 0;
        log::info!("driver reset");
        Ok(())
    }

    pub fn agents(&self) -> &[Agent] {
        &self.population.agents
    }

    /// Replace the host population; it is uploaded at the start of the next step.
    ///
    /// Panics if the count differs from the one the driver was sized for.
    pub fn set_agents(&mut self, agents: Vec<Agent>) {
        assert_eq!(
            agents.len(),
            self.settings.agent_count as usize,
            "population size is fixed per driver"
        );
        self.population = AgentPopulation::from_agents(agents);
    }

    /// Recompute and return population statistics
    pub fn agent_stats(&mut self) -> &AgentStats {
        self.population.update_stats();
        &self.population.stats
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn step_count(&self) -> u64 {
        self.steps
    }

    /// Read the newest trail field back to the host
    pub fn download_field(&self) -> Result<TrailField> {
        let engine = self.engine.as_ref().ok_or(SimError::NotInitialized)?;
        engine.field.download(&engine.gpu, FieldRole::Read)
    }

    pub fn gpu(&self) -> Option<&GpuDevice> {
        self.engine.as_ref().map(|e| &e.gpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_steps_only_when_due() {
        let mut p = Playback::default();
        assert!(!p.take_due());

        p.request_step();
        assert!(p.take_due());
        assert!(!p.take_due(), "single step is consumed");

        p.play();
        assert!(p.take_due());
        assert!(p.take_due());

        p.pause();
        assert!(!p.is_playing());
        assert!(!p.take_due());
    }

    #[test]
    fn new_driver_is_idle_and_rejects_io() {
        let settings = DriverSettings {
            field_size: [32, 32],
            agent_count: 16,
            ..Default::default()
        };
        let mut driver = SimulationDriver::new(settings, SimulationConfig::default());
        assert_eq!(driver.state(), DriverState::Idle);
        assert!(driver.agents().is_empty());
        assert!(driver.gpu().is_none());
        assert!(matches!(driver.download_field(), Err(SimError::NotInitialized)));
        assert!(matches!(driver.reset(), Err(SimError::NotInitialized)));
    }

    #[test]
    fn set_config_replaces_snapshot() {
        let mut driver = SimulationDriver::new(DriverSettings::default(), SimulationConfig::default());
        let next = SimulationConfig::default().map_species(|s| s.speed = 1.0);
        driver.set_config(next);
        assert_eq!(driver.config(), &next);
    }

    #[test]
    fn settings_validation_rejects_empty_runs() {
        assert!(DriverSettings::default().validate().is_ok());

        let no_agents = DriverSettings {
            agent_count: 0,
            ..Default::default()
        };
        assert!(matches!(no_agents.validate(), Err(SimError::InvalidSettings(_))));

        for field_size in [[0, 64], [64, 0], [0, 0]] {
            let empty = DriverSettings {
                field_size,
                ..Default::default()
            };
            assert!(matches!(empty.validate(), Err(SimError::InvalidSettings(_))), "{:?}", field_size);
        }
    }

    #[test]
    fn oversized_field_exceeds_default_limits() {
        let limits = wgpu::Limits::default();
        assert!(DriverSettings::default().check_limits(&limits).is_ok());

        // 3400 * 3400 * 3 * 4 = 138_720_000 B, over the 128 MiB binding limit
        let large = DriverSettings {
            field_size: [3400, 3400],
            ..Default::default()
        };
        match large.check_limits(&limits) {
            Err(SimError::UnsupportedAccelerator(msg)) => assert!(msg.contains("138720000"), "{}", msg),
            other => panic!("expected UnsupportedAccelerator, got {:?}", other),
        }

        let wide = DriverSettings {
            field_size: [limits.max_texture_dimension_2d + 1, 1],
            ..Default::default()
        };
        assert!(matches!(wide.check_limits(&limits), Err(SimError::UnsupportedAccelerator(_))));

        let crowd = DriverSettings {
            agent_count: 5_000_000,
            ..Default::default()
        };
        assert!(matches!(crowd.check_limits(&limits), Err(SimError::UnsupportedAccelerator(_))));
    }

    #[test]
    #[should_panic(expected = "agent_count must be positive")]
    fn empty_population_is_rejected() {
        SimulationDriver::new(
            DriverSettings {
                agent_count: 0,
                ..Default::default()
            },
            SimulationConfig::default(),
        );
    }
}
