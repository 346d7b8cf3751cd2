//! Steering behaviors.
//!
//! Each behavior is a pure function from the boid's state, its neighbor set,
//! and an optional target to a bounded steering force. Weighting lives in
//! [`FlockConfig`]; [`flock_acceleration`] composes the weighted sum the
//! simulation integrates each tick.

use glam::Vec3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Boid;

/// Desired directions shorter than this steer nowhere.
const STEER_EPSILON: f32 = 1e-6;

/// Neighbors closer than this are treated as colocated and skipped by the
/// distance-weighted behaviors.
const CONTACT_EPSILON: f32 = 1e-5;

/// Radii and weights for the composed steering behaviors.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlockConfig {
    /// Radius of the shared neighbor query all behaviors read from.
    pub perception_radius: f32,
    /// Separation acts on neighbors of any team within this radius.
    pub separation_radius: f32,
    /// Weight of the separation force.
    pub separation_weight: f32,
    /// Alignment acts on same-team neighbors within this radius.
    pub alignment_radius: f32,
    /// Weight of the alignment force.
    pub alignment_weight: f32,
    /// Cohesion acts on same-team neighbors within this radius.
    pub cohesion_radius: f32,
    /// Weight of the cohesion force.
    pub cohesion_weight: f32,
    /// Vertical de-layering acts on neighbors of any team within this radius.
    pub z_separation_radius: f32,
    /// Weight of the vertical de-layering force.
    pub z_separation_weight: f32,
    /// Weight of the pull toward the z = 0 plane.
    pub plane_hug_weight: f32,
    /// Weight of the pull toward the external target point.
    pub seek_weight: f32,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            perception_radius: 50.0,
            separation_radius: 20.0,
            separation_weight: 1.5,
            alignment_radius: 50.0,
            alignment_weight: 1.0,
            cohesion_radius: 50.0,
            cohesion_weight: 1.0,
            z_separation_radius: 20.0,
            z_separation_weight: 1.0,
            plane_hug_weight: 1.0,
            seek_weight: 1.0,
        }
    }
}

/// Snapshot of one neighbor as seen by the steering functions.
///
/// The boid itself is never part of its own neighbor set.
#[derive(Clone, Copy, Debug)]
pub struct Neighbor {
    /// Neighbor position.
    pub position: Vec3,
    /// Neighbor velocity.
    pub velocity: Vec3,
    /// Neighbor team tag.
    pub team: u32,
}

/// Clamps `v` to length `max_len`, leaving shorter vectors untouched.
pub fn limit(v: Vec3, max_len: f32) -> Vec3 {
    let len = v.length();
    if len > max_len { v * (max_len / len) } else { v }
}

/// Steers toward a desired direction.
///
/// The direction is rescaled to the boid's max speed, the current velocity is
/// subtracted, and the result is clamped to the boid's max force. Directions
/// shorter than an epsilon produce no force.
pub fn steer(boid: &Boid, desired: Vec3) -> Vec3 {
    let len = desired.length();
    if len < STEER_EPSILON {
        return Vec3::ZERO;
    }
    limit(desired * (boid.max_speed / len) - boid.velocity, boid.max_force)
}

/// Steers toward a world-space point.
pub fn seek(boid: &Boid, target: Vec3) -> Vec3 {
    steer(boid, target - boid.position)
}

/// Steers toward the z = 0 plane.
pub fn plane_hug(boid: &Boid) -> Vec3 {
    steer(boid, Vec3::new(0.0, 0.0, -boid.position.z))
}

/// Inverse-distance weighted repulsion from nearby neighbors of any team.
pub fn separation(boid: &Boid, neighbors: &[Neighbor], config: &FlockConfig) -> Vec3 {
    let mut sum = Vec3::ZERO;
    let mut count = 0;
    for neighbor in neighbors {
        let d = boid.position - neighbor.position;
        let len = d.length();
        if len > config.separation_radius || len <= CONTACT_EPSILON {
            continue;
        }
        sum += d / len / len;
        count += 1;
    }
    if count == 0 {
        return Vec3::ZERO;
    }
    steer(boid, sum / count as f32)
}

/// Steers toward the average velocity of same-team neighbors.
pub fn alignment(boid: &Boid, neighbors: &[Neighbor], config: &FlockConfig) -> Vec3 {
    let mut sum = Vec3::ZERO;
    let mut count = 0;
    for neighbor in neighbors {
        if neighbor.team != boid.team {
            continue;
        }
        if boid.position.distance(neighbor.position) > config.alignment_radius {
            continue;
        }
        sum += neighbor.velocity;
        count += 1;
    }
    if count == 0 {
        return Vec3::ZERO;
    }
    steer(boid, sum / count as f32)
}

/// Steers toward the centroid of same-team neighbors.
pub fn cohesion(boid: &Boid, neighbors: &[Neighbor], config: &FlockConfig) -> Vec3 {
    let mut sum = Vec3::ZERO;
    let mut count = 0;
    for neighbor in neighbors {
        if neighbor.team != boid.team {
            continue;
        }
        if boid.position.distance(neighbor.position) > config.cohesion_radius {
            continue;
        }
        sum += neighbor.position;
        count += 1;
    }
    if count == 0 {
        return Vec3::ZERO;
    }
    steer(boid, sum / count as f32 - boid.position)
}

/// Vertical de-layering force scattering boids that would sit coplanar.
///
/// Each nearby neighbor contributes `sign(dz) / distance` on the Z axis. An
/// exactly-zero `dz` falls back to the dot product of the two unit velocities
/// for its sign; if that is also zero the neighbor contributes nothing
/// (`sign(0) = 0`).
pub fn z_separation(boid: &Boid, neighbors: &[Neighbor], config: &FlockConfig) -> Vec3 {
    let mut sum = Vec3::ZERO;
    let mut count = 0;
    for neighbor in neighbors {
        let d = boid.position - neighbor.position;
        let len = d.length();
        if len > config.z_separation_radius || len <= CONTACT_EPSILON {
            continue;
        }
        let mut dz = d.z;
        if dz == 0.0 {
            dz = boid
                .velocity
                .normalize_or_zero()
                .dot(neighbor.velocity.normalize_or_zero());
        }
        if dz != 0.0 {
            sum.z += dz.signum() / len;
        }
        count += 1;
    }
    if count == 0 {
        return Vec3::ZERO;
    }
    steer(boid, sum / count as f32)
}

/// Weighted sum of all steering behaviors for one boid.
///
/// `neighbors` is the result of the shared perception-radius query with the
/// boid itself excluded; `target` is the external seek point snapshotted for
/// the whole tick.
pub fn flock_acceleration(
    boid: &Boid,
    neighbors: &[Neighbor],
    target: Vec3,
    config: &FlockConfig,
) -> Vec3 {
    separation(boid, neighbors, config) * config.separation_weight
        + alignment(boid, neighbors, config) * config.alignment_weight
        + cohesion(boid, neighbors, config) * config.cohesion_weight
        + plane_hug(boid) * config.plane_hug_weight
        + z_separation(boid, neighbors, config) * config.z_separation_weight
        + seek(boid, target) * config.seek_weight
}
