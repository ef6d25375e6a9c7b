use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use slime_params::Species;

/// Agent record shared with the GPU (8 x f32, std430 compatible)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Agent {
    pub species_weight: [f32; 3], // One-hot species id, also the RGB deposit
    pub _pad: f32,
    pub position: [f32; 2],       // Normalized, [0,1) x [0,1)
    pub velocity: [f32; 2],       // Normalized units per step
}

impl Agent {
    pub fn new(species: Species, pos: Vec2, vel: Vec2) -> Self {
        Self {
            species_weight: species.weight(),
            _pad: 0.0,
            position: [pos.x, pos.y],
            velocity: [vel.x, vel.y],
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::from(self.position)
    }

    pub fn velocity(&self) -> Vec2 {
        Vec2::from(self.velocity)
    }

    /// Forward direction in radians; a zero velocity faces +x
    pub fn heading(&self) -> f32 {
        let v = self.velocity();
        if v == Vec2::ZERO {
            0.0
        } else {
            v.y.atan2(v.x)
        }
    }

    /// Species with the largest weight
    pub fn species(&self) -> Species {
        let w = self.species_weight;
        if w[0] >= w[1] && w[0] >= w[2] {
            Species::A
        } else if w[1] >= w[2] {
            Species::B
        } else {
            Species::C
        }
    }

    pub fn in_domain(&self) -> bool {
        self.position.iter().all(|p| (0.0..1.0).contains(p))
    }
}

/// Population statistics for metrics collection
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentStats {
    pub count: u32,
    pub per_species: [u32; 3],
    pub mean_speed: f32,
    /// Length of the mean unit heading vector: 0 = isotropic, 1 = all aligned
    pub heading_alignment: f32,
    pub out_of_domain: u32,
}

/// Host-resident agent population; the GPU copy is refreshed from it every step
pub struct AgentPopulation {
    pub agents: Vec<Agent>,
    pub stats: AgentStats,
}

impl AgentPopulation {
    /// Seed `count` agents: uniform positions, species round-robin, velocity
    /// components of random magnitude below `speed_scale` and random sign
    pub fn new(count: u32, speed_scale: f32, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut agents = Vec::with_capacity(count as usize);

        for i in 0..count as usize {
            let pos = Vec2::new(rng.gen::<f32>(), rng.gen::<f32>());
            let mut component = || {
                let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                rng.gen::<f32>() * speed_scale * sign
            };
            let vel = Vec2::new(component(), component());
            agents.push(Agent::new(Species::from_index(i), pos, vel));
        }

        Self {
            agents,
            stats: AgentStats::default(),
        }
    }

    pub fn from_agents(agents: Vec<Agent>) -> Self {
        Self {
            agents,
            stats: AgentStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn update_stats(&mut self) {
        if self.agents.is_empty() {
            self.stats = AgentStats::default();
            return;
        }

        let mut per_species = [0u32; 3];
        let mut speed_sum = 0.0;
        let mut heading_sum = Vec2::ZERO;
        let mut out_of_domain = 0;

        for agent in &self.agents {
            per_species[agent.species().index()] += 1;
            let v = agent.velocity();
            speed_sum += v.length();
            heading_sum += Vec2::from_angle(agent.heading());
            if !agent.in_domain() {
                out_of_domain += 1;
            }
        }

        let n = self.agents.len() as f32;
        self.stats = AgentStats {
            count: self.agents.len() as u32,
            per_species,
            mean_speed: speed_sum / n,
            heading_alignment: heading_sum.length() / n,
            out_of_domain,
        };
    }

    pub fn reset(&mut self, speed_scale: f32, seed: u64) {
        *self = Self::new(self.agents.len() as u32, speed_scale, seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_record_is_eight_floats() {
        assert_eq!(std::mem::size_of::<Agent>(), 8 * 4);
        assert_eq!(std::mem::align_of::<Agent>(), 4);
    }

    #[test]
    fn seeding_is_round_robin_and_in_domain() {
        let pop = AgentPopulation::new(300, 0.001, 42);
        assert_eq!(pop.len(), 300);
        for (i, agent) in pop.agents.iter().enumerate() {
            assert_eq!(agent.species(), Species::from_index(i));
            assert_eq!(agent.species_weight.iter().sum::<f32>(), 1.0);
            assert!(agent.in_domain());
            assert!(agent.velocity[0].abs() <= 0.001 && agent.velocity[1].abs() <= 0.001);
        }
    }

    #[test]
    fn seeding_is_deterministic_per_seed() {
        let a = AgentPopulation::new(64, 0.01, 9);
        let b = AgentPopulation::new(64, 0.01, 9);
        let c = AgentPopulation::new(64, 0.01, 10);
        assert_eq!(a.agents, b.agents);
        assert_ne!(a.agents, c.agents);
    }

    #[test]
    fn stats_count_species() {
        let mut pop = AgentPopulation::new(10, 0.01, 1);
        pop.update_stats();
        assert_eq!(pop.stats.count, 10);
        assert_eq!(pop.stats.per_species, [4, 3, 3]);
        assert_eq!(pop.stats.out_of_domain, 0);
    }
}
