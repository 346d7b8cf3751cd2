//! Simulation world.
//!
//! Contains the `World` container that owns the flock and its spatial index
//! and drives the discrete simulation tick.

use glam::{Vec2, Vec3};
use murmur_spatial::{Aabb2, Quadtree, SpatialHandle};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::steering::{self, FlockConfig, Neighbor};
use crate::Boid;

/// Configuration for a simulation world.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConfig {
    /// Square domain covered by the spatial index.
    pub domain: Aabb2,
    /// Maximum quadtree depth.
    pub max_depth: u8,
    /// Leaf occupancy above which a quadtree leaf subdivides.
    pub split_threshold: usize,
    /// Subtree occupancy at or below which a quadtree branch collapses.
    pub merge_threshold: usize,
    /// Steering radii and weights.
    pub flock: FlockConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            domain: Aabb2::from_center_half_extents(Vec2::ZERO, Vec2::splat(1000.0)),
            max_depth: 7,
            split_threshold: 8,
            merge_threshold: 4,
            flock: FlockConfig::default(),
        }
    }
}

/// Handle to a boid owned by a [`World`].
///
/// Ids are generational: after the boid is removed the id goes stale and any
/// further use of it is rejected loudly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct BodySlot {
    generation: u32,
    boid: Option<Boid>,
}

/// The simulation world: a flock of boids and the quadtree indexing them.
///
/// Bodies are updated sequentially in slot order; each body queries the index
/// and writes its new position back before the next body runs, so a body sees
/// the index state left by the bodies updated earlier in the same tick. This
/// ordering is deterministic and load-bearing for reproducible runs.
#[derive(Debug)]
pub struct World {
    slots: Vec<BodySlot>,
    free: Vec<u32>,
    index: Quadtree<BodyId>,
    config: WorldConfig,
    len: usize,
    query_scratch: Vec<SpatialHandle>,
    neighbor_scratch: Vec<Neighbor>,
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl World {
    /// Creates an empty world.
    ///
    /// # Panics
    ///
    /// Panics if the configured domain has non-positive area or the merge
    /// threshold is not strictly below the split threshold.
    pub fn new(config: WorldConfig) -> Self {
        let index = Quadtree::with_thresholds(
            config.domain,
            config.max_depth,
            config.split_threshold,
            config.merge_threshold,
        );
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index,
            config,
            len: 0,
            query_scratch: Vec::new(),
            neighbor_scratch: Vec::new(),
        }
    }

    /// Returns the world configuration.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Returns the number of bodies in the world.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the world holds no bodies.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the spatial index, e.g. for outline introspection by a host
    /// renderer.
    pub fn quadtree(&self) -> &Quadtree<BodyId> {
        &self.index
    }

    /// Adds a boid and returns its id.
    ///
    /// The world takes ownership; afterwards the boid is observable read-only
    /// through [`World::body`] and mutated only by [`World::tick`].
    ///
    /// # Panics
    ///
    /// Panics if the boid is already indexed (it was cloned out of a live
    /// world entry).
    pub fn add_body(&mut self, mut boid: Boid) -> BodyId {
        assert!(
            boid.handle.is_none(),
            "world: add_body on a boid that is already indexed"
        );
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(BodySlot {
                    generation: 0,
                    boid: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let generation = self.slots[index as usize].generation;
        let id = BodyId { index, generation };

        boid.handle = Some(self.index.insert(boid.position.truncate(), id));
        self.slots[index as usize].boid = Some(boid);
        self.len += 1;
        id
    }

    /// Removes a boid, unregistering it from the index, and returns it.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale or was never issued by this world.
    pub fn remove_body(&mut self, id: BodyId) -> Boid {
        let index = self.check_id(id, "remove_body");
        let slot = &mut self.slots[index as usize];
        let mut boid = slot.boid.take().unwrap();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;

        let handle = boid.handle.take().expect("world body lost its index link");
        self.index.remove(handle);
        boid
    }

    /// Returns a boid by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale or was never issued by this world.
    pub fn body(&self, id: BodyId) -> &Boid {
        let index = self.check_id(id, "body");
        self.slots[index as usize].boid.as_ref().unwrap()
    }

    /// Iterates all bodies in deterministic slot order.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &Boid)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.boid.as_ref().map(|boid| {
                (
                    BodyId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    boid,
                )
            })
        })
    }

    /// Advances the simulation by one step.
    ///
    /// `target` is the external seek point; it is snapshotted here, so every
    /// body steers toward the same point this tick. Each body queries its
    /// neighbors, accumulates the weighted steering forces, integrates
    /// (semi-implicit Euler with the speed capped at its max speed), and
    /// re-registers with the index.
    ///
    /// # Panics
    ///
    /// Panics unless `dt > 0`.
    pub fn tick(&mut self, dt: f32, target: Vec3) {
        assert!(dt > 0.0, "world: tick requires dt > 0, got {dt}");

        let flock = self.config.flock.clone();
        let mut handles = std::mem::take(&mut self.query_scratch);
        let mut neighbors = std::mem::take(&mut self.neighbor_scratch);

        for slot_index in 0..self.slots.len() {
            let Some(boid) = self.slots[slot_index].boid.clone() else {
                continue;
            };

            handles.clear();
            self.index.query_radius(
                boid.position.truncate(),
                flock.perception_radius,
                &mut handles,
            );

            neighbors.clear();
            for &handle in &handles {
                let id = *self.index.get(handle);
                if id.index as usize == slot_index {
                    continue;
                }
                let other = self.slots[id.index as usize]
                    .boid
                    .as_ref()
                    .expect("indexed body is missing from the world");
                neighbors.push(Neighbor {
                    position: other.position,
                    velocity: other.velocity,
                    team: other.team,
                });
            }

            let acceleration = steering::flock_acceleration(&boid, &neighbors, target, &flock);
            let velocity = steering::limit(boid.velocity + acceleration * dt, boid.max_speed);
            let position = boid.position + velocity * dt;

            let slot_boid = self.slots[slot_index].boid.as_mut().unwrap();
            slot_boid.velocity = velocity;
            slot_boid.position = position;
            let handle = slot_boid.handle.expect("world body lost its index link");
            self.index.update(handle, position.truncate());
        }

        self.query_scratch = handles;
        self.neighbor_scratch = neighbors;
    }

    fn check_id(&self, id: BodyId, op: &str) -> u32 {
        match self.slots.get(id.index as usize) {
            Some(slot) if slot.generation == id.generation && slot.boid.is_some() => id.index,
            _ => panic!("world: {op} on {id:?}, which is not in this world"),
        }
    }
}
