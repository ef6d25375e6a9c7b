//! Interactive viewer for the slimeworks simulation

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use wgpu::{Instance, Surface, SurfaceConfiguration};
use winit::{
    dpi::LogicalSize,
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::EventLoop,
    keyboard::{Key, NamedKey},
    window::{Window, WindowBuilder},
};

use slime_core::{GpuDevice, SimulationDriver};
use slime_params::Species;

use crate::AppConfig;

/// Window, surface and the driver rendering into it
pub struct Viewer {
    window: Arc<Window>,
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    driver: SimulationDriver,
    rng: ChaCha8Rng,
    last_report: Instant,
}

impl Viewer {
    fn gpu(&self) -> Result<&GpuDevice> {
        Ok(self.driver.gpu().ok_or(slime_core::SimError::NotInitialized)?)
    }

    /// Handle window resize
    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) -> Result<()> {
        if new_size.width > 0 && new_size.height > 0 {
            self.surface_config.width = new_size.width;
            self.surface_config.height = new_size.height;
            self.surface.configure(&self.gpu()?.device, &self.surface_config);
        }
        Ok(())
    }

    /// Step if due, then draw the newest field
    pub fn frame(&mut self) -> Result<()> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = self.window.inner_size();
                self.resize(size)?;
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("surface timeout, skipping frame");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        match self.driver.on_frame(&view)? {
            Some(report) => {
                if self.last_report.elapsed().as_secs() >= 1 {
                    self.last_report = Instant::now();
                    log::info!("step {} ({:?} per step)", report.step, report.elapsed);
                }
            }
            None => self.driver.render(&view)?,
        }

        output.present();
        Ok(())
    }

    fn randomize_species(&mut self, species: Species) {
        let mut config = *self.driver.config();
        let randomized = config.species(species).randomized(&mut self.rng);
        *config.species_mut(species) = randomized;
        log::info!("randomized species {:?}: {:?}", species, config.species(species));
        self.driver.set_config(config);
    }

    fn toggle_locks(&mut self) {
        let locked = !Species::ALL.iter().all(|s| self.driver.config().species(*s).interactions_locked);
        let config = (*self.driver.config()).map_species(|s| s.interactions_locked = locked);
        log::info!("interaction locks: {}", locked);
        self.driver.set_config(config);
    }

    /// Space: play/pause, N or Right: single step, R: randomize all,
    /// 1/2/3: randomize one species, L: toggle interaction locks
    pub fn handle_key(&mut self, key: &Key) -> Result<()> {
        match key {
            Key::Named(NamedKey::Space) => {
                if self.driver.is_playing() {
                    self.driver.pause();
                    log::info!("paused at step {}", self.driver.step_count());
                } else {
                    self.driver.play();
                    log::info!("playing");
                }
            }
            Key::Named(NamedKey::ArrowRight) => self.driver.request_step(),
            Key::Character(c) if c == "n" || c == "N" => self.driver.request_step(),
            Key::Character(c) if c == "r" || c == "R" => self.driver.randomize_config(&mut self.rng),
            Key::Character(c) if c == "1" => self.randomize_species(Species::A),
            Key::Character(c) if c == "2" => self.randomize_species(Species::B),
            Key::Character(c) if c == "3" => self.randomize_species(Species::C),
            Key::Character(c) if c == "l" || c == "L" => self.toggle_locks(),
            Key::Character(c) if c == "0" => self.driver.reset()?,
            _ => {}
        }
        Ok(())
    }
}

/// Run the interactive viewer
pub async fn run_viewer(app: AppConfig, start_playing: bool) -> Result<()> {
    let event_loop = EventLoop::new()?;

    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Slimeworks")
            .with_inner_size(LogicalSize::new(1024.0, 1024.0))
            .build(&event_loop)?,
    );

    let instance = Instance::default();
    let surface = instance.create_surface(window.clone())?;
    let gpu = GpuDevice::request(instance, Some(&surface)).await?;

    let surface_caps = surface.get_capabilities(&gpu.adapter);
    let surface_format = surface_caps
        .formats
        .iter()
        .copied()
        .find(|f| !f.is_srgb())
        .or_else(|| surface_caps.formats.first().copied())
        .ok_or_else(|| anyhow::anyhow!("surface reports no formats"))?;

    let surface_config = SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface_format,
        width: window.inner_size().width.max(1),
        height: window.inner_size().height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        alpha_mode: surface_caps.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&gpu.device, &surface_config);

    let seed = app.settings.seed;
    let mut driver = SimulationDriver::new(app.settings, app.config);
    driver.initialize_with(gpu, surface_format)?;
    if start_playing {
        driver.play();
    }

    let mut viewer = Viewer {
        window,
        surface,
        surface_config,
        driver,
        rng: ChaCha8Rng::seed_from_u64(seed ^ 0x5eed),
        last_report: Instant::now(),
    };
    viewer.window.request_redraw();

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { ref event, window_id } if window_id == viewer.window.id() => match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::Resized(physical_size) => {
                if let Err(e) = viewer.resize(*physical_size) {
                    log::error!("Resize error: {}", e);
                }
                viewer.window.request_redraw();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => elwt.exit(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                if let Err(e) = viewer.handle_key(logical_key) {
                    log::error!("Key handling error: {}", e);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = viewer.frame() {
                    log::error!("Frame error: {}", e);
                    elwt.exit();
                }
                viewer.window.request_redraw();
            }
            _ => {}
        },
        _ => {}
    })?;

    Ok(())
}
