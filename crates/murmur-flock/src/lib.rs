//! Boid flocking simulation driven by a quadtree spatial index.
//!
//! Provides a headless Reynolds-style flocking core:
//! - [`Boid`] - kinematic agent with a team tag and per-instance limits
//! - [`steering`] - pure, individually weighted steering behaviors
//! - [`World`] - owns the flock and a [`murmur_spatial::Quadtree`], and
//!   advances the simulation one fixed step at a time
//! - [`spawn`] - seeded, deterministic flock spawning
//!
//! The simulation is single-threaded and deterministic: a fixed seed and a
//! fixed time step reproduce a run bitwise.
//!
//! # Example
//!
//! ```
//! use glam::Vec3;
//! use murmur_flock::{Boid, World};
//!
//! let mut world = World::default();
//! let mut leader = Boid::new(Vec3::ZERO);
//! leader.velocity = Vec3::new(5.0, 0.0, 0.0);
//! let id = world.add_body(leader);
//!
//! world.tick(1.0 / 60.0, Vec3::new(100.0, 0.0, 0.0));
//! assert!(world.body(id).position.x > 0.0);
//! ```

pub mod spawn;
pub mod steering;

mod boid;
mod world;

pub use boid::{Boid, orientation_frame};
pub use spawn::{SpawnConfig, spawn_disk};
pub use steering::{FlockConfig, Neighbor};
pub use world::{BodyId, World, WorldConfig};
