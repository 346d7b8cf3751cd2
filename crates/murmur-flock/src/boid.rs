//! The flocking agent.

use glam::{Mat3, Vec3};
use murmur_spatial::SpatialHandle;

const EPSILON_SQ: f32 = 1e-12;

/// A single flocking agent.
///
/// Fields are freely writable while the boid is being configured; once it is
/// handed to [`World::add_body`](crate::World::add_body) the world owns it and
/// exposes it read-only through [`World::body`](crate::World::body).
#[derive(Clone, Debug)]
pub struct Boid {
    /// Position in world space. The spatial index sees the XY projection.
    pub position: Vec3,
    /// Linear velocity.
    pub velocity: Vec3,
    /// Team tag. Alignment and cohesion only consider same-team neighbors.
    pub team: u32,
    /// Speed cap applied after integration.
    pub max_speed: f32,
    /// Magnitude cap for each steering force.
    pub max_force: f32,
    /// Link to the spatial index, managed exclusively by the world.
    pub(crate) handle: Option<SpatialHandle>,
}

impl Boid {
    /// Creates a boid at rest at `position` with the default limits
    /// (max speed 40, max force 1, team 0).
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            team: 0,
            max_speed: 40.0,
            max_force: 1.0,
            handle: None,
        }
    }
}

/// Builds an orthonormal orientation frame from a velocity.
///
/// The columns are right, forward, up with `forward = -v̂`,
/// `right = normalize(forward × Z)` and `up = right × forward`, suitable as a
/// model rotation for a host renderer. Degenerate inputs (near-zero velocity,
/// or velocity parallel to the Z axis) return the identity frame.
pub fn orientation_frame(velocity: Vec3) -> Mat3 {
    let forward = -velocity.normalize_or_zero();
    let right = forward.cross(Vec3::Z);
    if right.length_squared() < EPSILON_SQ {
        return Mat3::IDENTITY;
    }
    let right = right.normalize();
    let up = right.cross(forward);
    Mat3::from_cols(right, forward, up)
}
