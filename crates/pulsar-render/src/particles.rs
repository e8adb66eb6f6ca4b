// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use rand::{rngs::StdRng, Rng, SeedableRng};

pub const SPAWN_RADIUS: f32 = 0.25;
pub const SPAWN_SPEED: f32 = 0.00025;

/// One simulated particle. Layout matches the std430 struct in the compute
/// shader and the graphics pipeline's vertex input.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub color: [f32; 4],
}

impl Particle {
    pub const POSITION_OFFSET: u32 = std::mem::offset_of!(Particle, position) as u32;
    pub const COLOR_OFFSET: u32 = std::mem::offset_of!(Particle, color) as u32;
    pub const STRIDE: u32 = std::mem::size_of::<Particle>() as u32;
}

/// Per-frame compute parameters, written by the CPU into the slot's uniform
/// buffer right before the compute submission.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SimParams {
    pub delta_time: f32,
    pub particle_count: u32,
    _pad: [u32; 2],
}

impl SimParams {
    pub fn new(frame_time_ms: f32, time_scale: f32, particle_count: u32) -> Self {
        Self {
            delta_time: frame_time_ms * time_scale,
            particle_count,
            _pad: [0; 2],
        }
    }
}

/// Deterministic initial distribution for a given seed: positions on a disk
/// of radius [`SPAWN_RADIUS`] (x squashed by `aspect = height / width`),
/// velocities pointing outwards at [`SPAWN_SPEED`], random opaque colours.
pub fn seed_particles(count: usize, seed: u64, aspect: f32) -> Vec<Particle> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let r = SPAWN_RADIUS * rng.gen::<f32>().sqrt();
            let theta = rng.gen::<f32>() * std::f32::consts::TAU;
            let pos = Vec2::new(r * theta.cos() * aspect, r * theta.sin());
            let vel = pos.normalize_or_zero() * SPAWN_SPEED;
            Particle {
                position: pos.to_array(),
                velocity: vel.to_array(),
                color: [rng.gen(), rng.gen(), rng.gen(), 1.0],
            }
        })
        .collect()
}
