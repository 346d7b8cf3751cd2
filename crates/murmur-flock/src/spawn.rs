//! Deterministic flock spawning.

use glam::Vec2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{BodyId, Boid, World};

/// Configuration for spawning a flock on the z = 0 plane.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpawnConfig {
    /// Number of boids to spawn.
    pub count: usize,
    /// Positions are drawn uniformly from a disk of this radius.
    pub position_radius: f32,
    /// Initial velocities are drawn uniformly from a disk of this radius.
    pub speed_radius: f32,
    /// Speed cap for every spawned boid.
    pub max_speed: f32,
    /// Force cap for every spawned boid.
    pub max_force: f32,
    /// Teams are assigned uniformly from `0..teams`.
    pub teams: u32,
    /// Random seed. Identical seeds produce bitwise identical flocks.
    pub seed: u64,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            count: 40,
            position_radius: 200.0,
            speed_radius: 10.0,
            max_speed: 40.0,
            max_force: 1.0,
            teams: 2,
            seed: 12345,
        }
    }
}

/// Simple random number generator for flock spawning.
#[derive(Debug, Clone)]
struct SpawnRng {
    state: u64,
}

impl SpawnRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Returns a random f32 in [0, 1).
    fn next_f32(&mut self) -> f32 {
        (self.next_u64() as f32) / (u64::MAX as f32)
    }

    /// Returns a random point inside a disk of the given radius.
    fn disk(&mut self, radius: f32) -> Vec2 {
        let angle = self.next_f32() * std::f32::consts::TAU;
        let r = radius * self.next_f32().sqrt();
        Vec2::new(angle.cos(), angle.sin()) * r
    }
}

/// Spawns a flock into `world` and returns the new body ids in spawn order.
///
/// Positions and velocities are drawn from disks in the z = 0 plane; teams
/// are assigned at random from `0..teams`.
///
/// # Panics
///
/// Panics if `config.teams` is zero.
pub fn spawn_disk(world: &mut World, config: &SpawnConfig) -> Vec<BodyId> {
    assert!(config.teams > 0, "spawn: team count must be > 0");

    let mut rng = SpawnRng::new(config.seed);
    let mut ids = Vec::with_capacity(config.count);
    for _ in 0..config.count {
        let mut boid = Boid::new(rng.disk(config.position_radius).extend(0.0));
        boid.velocity = rng.disk(config.speed_radius).extend(0.0);
        boid.max_speed = config.max_speed;
        boid.max_force = config.max_force;
        boid.team = (rng.next_u64() % u64::from(config.teams)) as u32;
        ids.push(world.add_body(boid));
    }
    tracing::debug!(count = config.count, seed = config.seed, "spawned flock");
    ids
}
