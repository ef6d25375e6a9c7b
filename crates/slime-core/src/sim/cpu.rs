//! Host reference implementation of the decay, agent and render kernels.
//!
//! Follows the same numeric contract as the WGSL sources: toroidal probes,
//! integer deposit accumulation with sum-then-clamp, 8-bit trail storage.
//! Used by the headless CPU backend and to pin kernel behavior in tests.

use glam::Vec2;
use slime_params::bindings::DEPOSIT_SCALE;
use slime_params::{AgentUniforms, SimulationConfig, TrailParams};

use crate::gpu::PingPong;
use crate::sim::agents::{Agent, AgentPopulation};
use crate::sim::field::{to_unorm, unorm, TrailField};

/// Decay + 3x3 diffusion of `src` into every texel of `dst`
pub fn decay_into(src: &TrailField, dst: &mut TrailField, trail: &TrailParams) {
    assert_eq!(src.size, dst.size, "decay needs equally sized fields");
    let [w, h] = src.size;

    for y in 0..h {
        for x in 0..w {
            let centre = src.sample(x as i64, y as i64);

            let mut sum = [0.0f32; 3];
            for dy in -1..=1i64 {
                for dx in -1..=1i64 {
                    let s = src.sample(x as i64 + dx, y as i64 + dy);
                    for c in 0..3 {
                        sum[c] += s[c];
                    }
                }
            }

            let mut out = [0u8, 0, 0, 255];
            for c in 0..3 {
                let blur = sum[c] / 9.0;
                let mixed = centre[c] + trail.diffusion * (blur - centre[c]);
                out[c] = to_unorm(mixed * (1.0 - trail.decay) - trail.evaporation);
            }
            dst.set(x, y, out);
        }
    }
}

pub fn decay(src: &TrailField, trail: &TrailParams) -> TrailField {
    let mut dst = TrailField::new(src.size);
    decay_into(src, &mut dst, trail);
    dst
}

fn lanes(row: &[f32; 4], weight: [f32; 3]) -> f32 {
    row[0] * weight[0] + row[1] * weight[1] + row[2] * weight[2]
}

/// Wrap into [0,1); a value that rounds up to 1.0 folds to 0.0
pub fn wrap_unit(p: f32) -> f32 {
    let w = p - p.floor();
    if w >= 1.0 {
        0.0
    } else {
        w
    }
}

/// Sense, steer and move one agent against `field`. Returns the moved agent.
pub fn advance_agent(agent: &Agent, field: &TrailField, params: &AgentUniforms) -> Agent {
    let w = agent.species_weight;
    let speed = lanes(&params.speed, w);
    let dist = lanes(&params.sample_distance, w);
    let angle = lanes(&params.sample_angle, w);
    let coeff = [
        lanes(&params.toward_a, w),
        lanes(&params.toward_b, w),
        lanes(&params.toward_c, w),
    ];
    let size = Vec2::new(params.field[0], params.field[1]);

    let heading = agent.heading();
    let origin = agent.position() * size;
    let desirability = |theta: f32| {
        let p = origin + Vec2::from_angle(theta) * dist;
        let rgb = field.sample(p.x.floor() as i64, p.y.floor() as i64);
        rgb[0] * coeff[0] + rgb[1] * coeff[1] + rgb[2] * coeff[2]
    };

    let ahead = desirability(heading);
    let left = desirability(heading + angle);
    let right = desirability(heading - angle);

    let turned = if ahead >= left && ahead >= right {
        heading
    } else if left > right {
        heading + angle
    } else if right > left {
        heading - angle
    } else {
        heading
    };

    let velocity = Vec2::from_angle(turned) * speed / size;
    let moved = agent.position() + velocity;

    Agent {
        velocity: velocity.into(),
        position: [wrap_unit(moved.x), wrap_unit(moved.y)],
        ..*agent
    }
}

/// Fixed-point amount one agent adds to each channel
pub fn deposit_amount(weight: [f32; 3], deposit: f32) -> [u32; 3] {
    weight.map(|w| (w * deposit * DEPOSIT_SCALE + 0.5).floor().max(0.0) as u32)
}

/// Move every agent against `src`, then write `src` plus all deposits
/// (summed, then clamped) into `dst`
pub fn step_agents(agents: &mut [Agent], src: &TrailField, dst: &mut TrailField, params: &AgentUniforms) {
    assert_eq!(src.size, dst.size, "agent step needs equally sized fields");

    let mut acc = vec![[0u32; 3]; src.data.len()];
    for agent in agents.iter_mut() {
        *agent = advance_agent(agent, src, params);
        let (x, y) = src.texel_at(agent.position);
        let amount = deposit_amount(agent.species_weight, params.field[2]);
        let cell = &mut acc[src.get_index(x as u32, y as u32)];
        for c in 0..3 {
            cell[c] = cell[c].saturating_add(amount[c]);
        }
    }

    for (i, (texel, added)) in src.data.iter().zip(&acc).enumerate() {
        let mut out = [0u8, 0, 0, 255];
        for c in 0..3 {
            out[c] = (texel[c] as u32).saturating_add(added[c]).min(255) as u8;
        }
        dst.data[i] = out;
    }
}

/// Map trail channels through the species palette, one pixel per texel
pub fn render(field: &TrailField, config: &SimulationConfig) -> Vec<[u8; 4]> {
    let palette = [config.a.color.to_vec4(), config.b.color.to_vec4(), config.c.color.to_vec4()];
    field
        .data
        .iter()
        .map(|t| {
            let mut out = [0u8, 0, 0, 255];
            for (c, px) in out.iter_mut().take(3).enumerate() {
                let v: f32 = (0..3).map(|k| unorm(t[k]) * palette[k][c]).sum();
                *px = to_unorm(v);
            }
            out
        })
        .collect()
}

/// Complete simulation on the host, same step order as the GPU driver
pub struct CpuSimulation {
    pub population: AgentPopulation,
    pub field: PingPong<TrailField>,
    pub config: SimulationConfig,
    pub trail: TrailParams,
    steps: u64,
}

impl CpuSimulation {
    pub fn new(size: [u32; 2], population: AgentPopulation, config: SimulationConfig, trail: TrailParams) -> Self {
        assert!(!population.is_empty(), "agent population must not be empty");
        Self {
            population,
            field: PingPong::new(TrailField::new(size), TrailField::new(size)),
            config,
            trail,
            steps: 0,
        }
    }

    pub fn with_agents(size: [u32; 2], agents: Vec<Agent>, config: SimulationConfig) -> Self {
        Self::new(size, AgentPopulation::from_agents(agents), config, TrailParams::default())
    }

    pub fn size(&self) -> [u32; 2] {
        self.field.read().size
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Decay, swap, agent step, swap
    pub fn step(&mut self) {
        let size = self.size();
        {
            let (src, dst) = self.field.split_mut();
            decay_into(src, dst, &self.trail);
        }
        self.field.swap();

        let params = AgentUniforms::new(&self.config, &self.trail, size);
        {
            let (src, dst) = self.field.split_mut();
            step_agents(&mut self.population.agents, src, dst, &params);
        }
        self.field.swap();

        self.steps += 1;
        log::debug!("cpu step {} complete", self.steps);
    }

    /// Field holding the latest trails
    pub fn field(&self) -> &TrailField {
        self.field.read()
    }

    pub fn render(&self) -> Vec<[u8; 4]> {
        render(self.field(), &self.config)
    }
}
