//! Shared parameter types for the slimeworks simulation
//!
//! Everything the UI side hands to the engine lives here, together with the
//! `#[repr(C)]` uniform blocks the kernels consume, so that the headless
//! runner and the viewer can never drift apart on layout.

use bytemuck::{Pod, Zeroable};
use rand::Rng;
use std::f32::consts::{FRAC_PI_4, PI};

/// Upper bound used when randomizing `sample_distance` (texels)
pub const MAX_SAMPLE_DISTANCE: f32 = 20.0;

/// Upper bound used when randomizing `speed` (texels per step)
pub const MAX_SPEED: f32 = 10.0;

/// One of the three agent populations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Species {
    A,
    B,
    C,
}

impl Species {
    pub const ALL: [Species; 3] = [Species::A, Species::B, Species::C];

    pub fn index(self) -> usize {
        match self {
            Species::A => 0,
            Species::B => 1,
            Species::C => 2,
        }
    }

    /// Round-robin assignment used when seeding a population
    pub fn from_index(i: usize) -> Self {
        Self::ALL[i % 3]
    }

    /// One-hot weight vector; doubles as the RGB deposit of this species
    pub fn weight(self) -> [f32; 3] {
        let mut w = [0.0; 3];
        w[self.index()] = 1.0;
        w
    }
}

/// Display tint of a species. Never read by the simulation kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const RED: Color = Color::rgb(0xff, 0x00, 0x00);
    pub const GREEN: Color = Color::rgb(0x00, 0xff, 0x00);
    pub const BLUE: Color = Color::rgb(0x00, 0x00, 0xff);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Normalized components with a zero fourth lane (uniform vec4 slot)
    pub fn to_vec4(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            0.0,
        ]
    }
}

/// Signed attraction (positive) / repulsion (negative) toward each trail
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interactions {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    /// Reserved; not consumed by any kernel
    pub alpha: f32,
}

impl Interactions {
    pub const ZERO: Interactions = Interactions { a: 0.0, b: 0.0, c: 0.0, alpha: 0.0 };

    /// Attracted to one trail only
    pub fn only(species: Species) -> Self {
        let [a, b, c] = species.weight();
        Self { a, b, c, alpha: 0.0 }
    }

    /// Draw all four coefficients uniformly from [-1, 1]
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            a: rng.gen_range(-1.0..=1.0),
            b: rng.gen_range(-1.0..=1.0),
            c: rng.gen_range(-1.0..=1.0),
            alpha: rng.gen_range(-1.0..=1.0),
        }
    }
}

/// Sensing and interaction parameters of one species
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpeciesConfig {
    pub color: Color,
    /// Half-angle between the forward probe and each side probe, radians
    pub sample_angle: f32,
    /// Probe offset, texels
    pub sample_distance: f32,
    /// Displacement per step, texels
    pub speed: f32,
    pub interactions: Interactions,
    /// UI flag: randomization leaves `interactions` alone when set
    #[cfg_attr(feature = "serde", serde(default))]
    pub interactions_locked: bool,
}

impl SpeciesConfig {
    /// Stock parameters: each species is drawn to its own trail only
    pub fn default_for(species: Species) -> Self {
        let color = match species {
            Species::A => Color::RED,
            Species::B => Color::GREEN,
            Species::C => Color::BLUE,
        };
        Self {
            color,
            sample_angle: FRAC_PI_4,
            sample_distance: 5.0,
            speed: 5.0,
            interactions: Interactions::only(species),
            interactions_locked: true,
        }
    }

    /// Redraw angle, distance and speed; redraw interactions unless locked
    pub fn randomized<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        Self {
            sample_angle: rng.gen_range(0.0..=PI),
            sample_distance: rng.gen_range(0.0..=MAX_SAMPLE_DISTANCE),
            speed: rng.gen_range(0.0..=MAX_SPEED),
            interactions: if self.interactions_locked {
                self.interactions
            } else {
                Interactions::random(rng)
            },
            ..*self
        }
    }
}

/// Complete per-step snapshot handed to the engine
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationConfig {
    pub a: SpeciesConfig,
    pub b: SpeciesConfig,
    pub c: SpeciesConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            a: SpeciesConfig::default_for(Species::A),
            b: SpeciesConfig::default_for(Species::B),
            c: SpeciesConfig::default_for(Species::C),
        }
    }
}

impl SimulationConfig {
    pub fn species(&self, species: Species) -> &SpeciesConfig {
        match species {
            Species::A => &self.a,
            Species::B => &self.b,
            Species::C => &self.c,
        }
    }

    pub fn species_mut(&mut self, species: Species) -> &mut SpeciesConfig {
        match species {
            Species::A => &mut self.a,
            Species::B => &mut self.b,
            Species::C => &mut self.c,
        }
    }

    /// Apply the same change to all three species
    pub fn map_species(mut self, f: impl Fn(&mut SpeciesConfig)) -> Self {
        for s in Species::ALL {
            f(self.species_mut(s));
        }
        self
    }

    /// "Randomize all"
    pub fn randomized<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        Self {
            a: self.a.randomized(rng),
            b: self.b.randomized(rng),
            c: self.c.randomized(rng),
        }
    }

    /// Warn about values outside the conventional ranges. Nothing is rejected.
    pub fn log_out_of_range(&self) {
        for s in Species::ALL {
            let cfg = self.species(s);
            if !(0.0..=PI).contains(&cfg.sample_angle) {
                log::warn!("species {:?}: sample_angle {} outside [0, pi]", s, cfg.sample_angle);
            }
            if cfg.sample_distance < 0.0 || cfg.speed < 0.0 {
                log::warn!(
                    "species {:?}: negative distance/speed ({}, {})",
                    s, cfg.sample_distance, cfg.speed
                );
            }
        }
    }
}

/// Trail evaporation, diffusion and deposit strength
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrailParams {
    /// Multiplicative loss per step
    pub decay: f32,
    /// Subtractive loss per step, normalized units
    pub evaporation: f32,
    /// 0 = no blur, 1 = full 3x3 box blur
    pub diffusion: f32,
    /// Normalized intensity one agent adds to its own channel per step
    pub deposit: f32,
}

impl Default for TrailParams {
    fn default() -> Self {
        Self {
            decay: 0.02,
            evaporation: 1.0 / 255.0,
            diffusion: 0.5,
            deposit: 0.2,
        }
    }
}

/// Per-species agent parameters, one vec4 row per quantity (lanes = A, B, C, unused).
/// Interaction row k holds every species' coefficient toward trail k.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct AgentUniforms {
    pub speed: [f32; 4],
    pub sample_distance: [f32; 4],
    pub sample_angle: [f32; 4],
    pub toward_a: [f32; 4],
    pub toward_b: [f32; 4],
    pub toward_c: [f32; 4],
    /// (width, height, deposit, unused)
    pub field: [f32; 4],
}

impl AgentUniforms {
    pub fn new(config: &SimulationConfig, trail: &TrailParams, size: [u32; 2]) -> Self {
        fn row(config: &SimulationConfig, f: impl Fn(&SpeciesConfig) -> f32) -> [f32; 4] {
            [f(&config.a), f(&config.b), f(&config.c), 0.0]
        }
        Self {
            speed: row(config, |s| s.speed),
            sample_distance: row(config, |s| s.sample_distance),
            sample_angle: row(config, |s| s.sample_angle),
            toward_a: row(config, |s| s.interactions.a),
            toward_b: row(config, |s| s.interactions.b),
            toward_c: row(config, |s| s.interactions.c),
            field: [size[0] as f32, size[1] as f32, trail.deposit, 0.0],
        }
    }
}

/// Decay/diffuse kernel parameters
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DecayUniforms {
    pub decay: f32,
    pub evaporation: f32,
    pub diffusion: f32,
    pub _pad: f32,
    pub size: [u32; 2],
    pub _pad2: [u32; 2],
}

impl DecayUniforms {
    pub fn new(trail: &TrailParams, size: [u32; 2]) -> Self {
        Self {
            decay: trail.decay,
            evaporation: trail.evaporation,
            diffusion: trail.diffusion,
            _pad: 0.0,
            size,
            _pad2: [0, 0],
        }
    }
}

/// Species color table for the render pass
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ColorUniforms {
    pub colors: [[f32; 4]; 3],
}

impl From<&SimulationConfig> for ColorUniforms {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            colors: [config.a.color.to_vec4(), config.b.color.to_vec4(), config.c.color.to_vec4()],
        }
    }
}

/// WGSL binding layout documentation and validation
///
/// Both the GPU kernels and the host reference implementation follow these
/// layouts; changing one side without the other breaks parity.
pub mod bindings {
    use super::*;

    /// Decay/diffuse compute shader bindings (group 0)
    ///
    /// ```wgsl
    /// @group(0) @binding(0) var src: texture_2d<f32>;
    /// @group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
    /// @group(0) @binding(2) var<uniform> params: DecayParams;
    /// ```
    pub const DECAY_BINDINGS: &str = "Decay Group 0: src(texture2D), dst(storage2D rgba8unorm write), DecayParams(uniform)";

    /// Agent step compute shader bindings (group 0), shared by `deposit` and `composite`
    ///
    /// ```wgsl
    /// @group(0) @binding(0) var<storage, read_write> agents: array<Agent>;
    /// @group(0) @binding(1) var src: texture_2d<f32>;
    /// @group(0) @binding(2) var dst: texture_storage_2d<rgba8unorm, write>;
    /// @group(0) @binding(3) var<uniform> params: AgentParams;
    /// @group(0) @binding(4) var<storage, read_write> deposits: array<atomic<u32>>;
    /// ```
    pub const AGENT_BINDINGS: &str = "Agent Group 0: Agents SSBO, src(texture2D), dst(storage2D rgba8unorm write), AgentParams(uniform), Deposits(storage atomic u32 x3)";

    /// Render pass bindings (group 0)
    ///
    /// ```wgsl
    /// @group(0) @binding(0) var trail_tex: texture_2d<f32>;
    /// @group(0) @binding(1) var field_sampler: sampler;
    /// @group(0) @binding(2) var<uniform> palette: Palette;
    /// ```
    pub const RENDER_BINDINGS: &str = "Render Group 0: trail_tex(texture2D filterable), sampler(filtering), Palette(uniform)";

    /// Fixed-point scale of the deposit accumulator: one unit is one 8-bit step
    pub const DEPOSIT_SCALE: f32 = 255.0;

    /// Accumulator lanes per texel (one per species)
    pub const DEPOSIT_CHANNELS: u32 = 3;

    /// Agent kernel workgroup width
    pub const AGENT_WORKGROUP: u32 = 64;

    /// Field kernels use square workgroups of this edge
    pub const FIELD_WORKGROUP: u32 = 8;

    /// Check that the uniform block describes a field of the expected size
    pub fn validate_agent_uniforms(params: &AgentUniforms, expected_size: [u32; 2]) -> Result<(), String> {
        let expected = [expected_size[0] as f32, expected_size[1] as f32];
        if params.field[..2] != expected {
            Err(format!("Size mismatch: expected {:?}, got {:?}", expected, &params.field[..2]))
        } else {
            Ok(())
        }
    }

    pub fn validate_decay_uniforms(params: &DecayUniforms) -> Result<(), String> {
        if !(0.0..=1.0).contains(&params.decay) || !(0.0..=1.0).contains(&params.diffusion) {
            Err(format!(
                "decay {} / diffusion {} must lie in [0, 1]",
                params.decay, params.diffusion
            ))
        } else {
            Ok(())
        }
    }

    /// Log binding layout information for debugging
    pub fn log_binding_layouts() {
        log::info!("Decay Bindings: {}", DECAY_BINDINGS);
        log::info!("Agent Bindings: {}", AGENT_BINDINGS);
        log::info!("Render Bindings: {}", RENDER_BINDINGS);
        log::info!("DEPOSIT_SCALE: {}", DEPOSIT_SCALE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn locked_interactions_survive_randomize() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut cfg = SpeciesConfig::default_for(Species::B);
        cfg.interactions = Interactions { a: 0.3, b: -0.7, c: 0.1, alpha: 0.9 };
        cfg.interactions_locked = true;

        for _ in 0..50 {
            let next = cfg.randomized(&mut rng);
            assert_eq!(next.interactions, cfg.interactions);
            assert!(next.interactions_locked);
        }
    }

    #[test]
    fn unlocked_interactions_redrawn_in_unit_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut cfg = SpeciesConfig::default_for(Species::C);
        cfg.interactions_locked = false;

        let mut changed = 0;
        for _ in 0..200 {
            let next = cfg.randomized(&mut rng);
            let i = next.interactions;
            for v in [i.a, i.b, i.c, i.alpha] {
                assert!((-1.0..=1.0).contains(&v), "coefficient {} out of range", v);
            }
            if i.a != cfg.interactions.a
                && i.b != cfg.interactions.b
                && i.c != cfg.interactions.c
                && i.alpha != cfg.interactions.alpha
            {
                changed += 1;
            }
        }
        assert!(changed > 190, "only {} of 200 draws replaced every coefficient", changed);
    }

    #[test]
    fn randomized_sensing_stays_in_slider_ranges() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let cfg = SimulationConfig::default();
        for _ in 0..100 {
            let r = cfg.randomized(&mut rng);
            for s in Species::ALL {
                let sc = r.species(s);
                assert!((0.0..=PI).contains(&sc.sample_angle));
                assert!((0.0..=MAX_SAMPLE_DISTANCE).contains(&sc.sample_distance));
                assert!((0.0..=MAX_SPEED).contains(&sc.speed));
                assert_eq!(sc.color, cfg.species(s).color);
            }
        }
    }

    #[test]
    fn uniform_rows_follow_species_lanes() {
        let mut cfg = SimulationConfig::default();
        cfg.b.speed = 2.5;
        cfg.c.interactions.a = -0.5;
        let u = AgentUniforms::new(&cfg, &TrailParams::default(), [256, 128]);

        assert_eq!(u.speed, [5.0, 2.5, 5.0, 0.0]);
        // row "toward A": A's, B's and C's coefficient on trail A
        assert_eq!(u.toward_a, [1.0, 0.0, -0.5, 0.0]);
        assert_eq!(u.toward_b, [0.0, 1.0, 0.0, 0.0]);
        assert!(bindings::validate_agent_uniforms(&u, [256, 128]).is_ok());
        assert!(bindings::validate_agent_uniforms(&u, [128, 128]).is_err());
    }

    #[test]
    fn uniform_blocks_are_vec4_aligned() {
        assert_eq!(std::mem::size_of::<AgentUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<DecayUniforms>(), 32);
        assert_eq!(std::mem::size_of::<ColorUniforms>(), 48);
    }
}
