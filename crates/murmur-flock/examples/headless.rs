//! Headless flocking run: spawn a flock, chase a circling target, print a
//! summary.

use glam::Vec3;
use murmur_flock::{SpawnConfig, World, spawn_disk};

fn main() {
    let mut world = World::default();
    let ids = spawn_disk(&mut world, &SpawnConfig::default());

    let dt = 1.0 / 60.0;
    for step in 0..600 {
        let angle = step as f32 * dt * 0.5;
        let target = Vec3::new(300.0 * angle.cos(), 300.0 * angle.sin(), 0.0);
        world.tick(dt, target);
    }

    let mut centroid = Vec3::ZERO;
    for (_, boid) in world.bodies() {
        centroid += boid.position;
    }
    centroid /= world.len() as f32;
    println!("flock of {} after 600 ticks, centroid {:.1}", world.len(), centroid);

    let first = world.body(ids[0]);
    println!(
        "first boid at {:.1} moving {:.1} (speed {:.1})",
        first.position,
        first.velocity,
        first.velocity.length()
    );
}
