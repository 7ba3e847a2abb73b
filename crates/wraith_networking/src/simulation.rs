//! # Reference Simulation
//!
//! Minimal collaborators for tests and the soak driver:
//!
//! - [`GhostWorld`]: in-memory ghost storage implementing [`GhostSpawner`]
//!   and [`SimulationSource`].
//! - [`ThrustMovement`]: deterministic movement shared by the server step
//!   and client prediction replay.
//! - [`LossyLink`]: a seeded, lossy, in-order packet pipe.
//!
//! Everything here runs in the quantized domain: the world stores
//! [`GhostState`], so server and client step from bit-identical inputs.

use std::collections::{BTreeMap, VecDeque};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use wraith_shared::{Quaternion, Vec3, TICK_RATE};

use crate::client::CommandSimulation;
use crate::command::Command;
use crate::server::{GhostSpawner, ReplicatedGhost, SimulationSource};
use crate::session::NetworkId;
use crate::snapshot::{AvatarSnapshot, GhostId, GhostState, GhostType, ProjectileSnapshot};
use crate::tick::Tick;

// =============================================================================
// MOVEMENT
// =============================================================================

/// Turn-and-thrust movement for avatars, ballistic flight for projectiles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThrustMovement {
    /// Yaw change per tick at full turn input, radians.
    pub turn_per_tick: f32,
    /// Distance per tick at full thrust, units.
    pub speed_per_tick: f32,
    /// Seconds per tick, for projectile velocity.
    pub tick_seconds: f32,
}

impl Default for ThrustMovement {
    #[allow(clippy::cast_precision_loss)]
    fn default() -> Self {
        Self {
            turn_per_tick: 0.05,
            speed_per_tick: 0.1,
            tick_seconds: 1.0 / TICK_RATE as f32,
        }
    }
}

impl CommandSimulation for ThrustMovement {
    fn step(&self, state: &GhostState, command: &Command) -> GhostState {
        match state {
            GhostState::Avatar(avatar) => {
                let yaw = avatar.rotation().yaw()
                    + f32::from(command.horizontal.clamp(-1, 1)) * self.turn_per_tick;
                let rotation = Quaternion::from_yaw(yaw);
                let thrust = f32::from(command.vertical.clamp(-1, 1)) * self.speed_per_tick;
                let position = avatar.position() + rotation.rotate(Vec3::Z) * thrust;
                GhostState::Avatar(AvatarSnapshot::new(command.tick, position, rotation))
            }
            GhostState::Projectile(projectile) => {
                let position = projectile.position() + projectile.velocity() * self.tick_seconds;
                GhostState::Projectile(ProjectileSnapshot::new(
                    command.tick,
                    position,
                    projectile.velocity(),
                ))
            }
        }
    }
}

// =============================================================================
// WORLD
// =============================================================================

#[derive(Clone, Debug)]
struct WorldGhost {
    owner: Option<NetworkId>,
    state: GhostState,
}

/// In-memory ghost storage.
#[derive(Clone, Debug, Default)]
pub struct GhostWorld {
    tick: Tick,
    next_id: u32,
    ghosts: BTreeMap<GhostId, WorldGhost>,
}

impl GhostWorld {
    /// Empty world at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tick.
    #[inline]
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Number of live ghosts.
    #[must_use]
    pub fn ghost_count(&self) -> usize {
        self.ghosts.len()
    }

    /// State of one ghost.
    #[must_use]
    pub fn state(&self, ghost: GhostId) -> Option<&GhostState> {
        self.ghosts.get(&ghost).map(|g| &g.state)
    }

    fn insert(&mut self, owner: Option<NetworkId>, state: GhostState) -> GhostId {
        self.next_id = self.next_id.wrapping_add(1);
        let id = GhostId(self.next_id);
        self.ghosts.insert(id, WorldGhost { owner, state });
        id
    }

    /// Spawns a server-owned projectile.
    pub fn spawn_projectile(&mut self, position: Vec3, velocity: Vec3) -> GhostId {
        let state = ProjectileSnapshot::new(self.tick, position, velocity);
        self.insert(None, GhostState::Projectile(state))
    }

    /// Advances one tick with no movement.
    pub fn advance_tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        for ghost in self.ghosts.values_mut() {
            ghost.state = ghost.state.at_tick(self.tick);
        }
    }

    /// Advances one tick, stepping every ghost with the input `input`
    /// returns for it.
    pub fn step<S, F>(&mut self, movement: &S, input: F)
    where
        S: CommandSimulation,
        F: Fn(GhostId, Tick) -> Command,
    {
        self.tick = self.tick.wrapping_add(1);
        let tick = self.tick;
        for (&id, ghost) in &mut self.ghosts {
            let command = match ghost.owner {
                Some(_) => input(id, tick),
                None => Command::neutral(tick),
            };
            ghost.state = movement.step(&ghost.state, &command);
        }
    }
}

impl GhostSpawner for GhostWorld {
    fn spawn_ghost(&mut self, ghost_type: GhostType, owner: NetworkId) -> GhostId {
        let state = match ghost_type {
            GhostType::Avatar => {
                GhostState::Avatar(AvatarSnapshot::new(self.tick, Vec3::ZERO, Quaternion::IDENTITY))
            }
            GhostType::Projectile => GhostState::zero(GhostType::Projectile, self.tick),
        };
        self.insert(Some(owner), state)
    }

    fn despawn_ghost(&mut self, ghost: GhostId) {
        self.ghosts.remove(&ghost);
    }
}

impl SimulationSource for GhostWorld {
    fn current_tick(&self) -> Tick {
        self.tick
    }

    fn ghosts(&self) -> Vec<ReplicatedGhost> {
        self.ghosts
            .iter()
            .map(|(&id, ghost)| ReplicatedGhost {
                id,
                owner: ghost.owner,
                state: ghost.state.clone(),
            })
            .collect()
    }
}

// =============================================================================
// LOSSY LINK
// =============================================================================

/// Link conditions, in ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkConditions {
    /// One-way delay in ticks.
    pub latency_ticks: u32,
    /// Packet loss percentage (0-100).
    pub packet_loss_percent: u8,
}

impl LinkConditions {
    /// No delay, no loss.
    pub const PERFECT: Self = Self {
        latency_ticks: 0,
        packet_loss_percent: 0,
    };

    /// 50ms at 60Hz, 5% loss.
    pub const LOSSY: Self = Self {
        latency_ticks: 3,
        packet_loss_percent: 5,
    };
}

impl Default for LinkConditions {
    fn default() -> Self {
        Self::LOSSY
    }
}

/// One-way, in-order pipe that drops packets at random.
///
/// Seeded, so a run is reproducible.
#[derive(Debug)]
pub struct LossyLink {
    conditions: LinkConditions,
    rng: ChaCha8Rng,
    in_flight: VecDeque<(Tick, Vec<u8>)>,
    sent: u64,
    dropped: u64,
    bytes: u64,
}

impl LossyLink {
    /// Creates a link.
    #[must_use]
    pub fn new(conditions: LinkConditions, seed: u64) -> Self {
        Self {
            conditions,
            rng: ChaCha8Rng::seed_from_u64(seed),
            in_flight: VecDeque::new(),
            sent: 0,
            dropped: 0,
            bytes: 0,
        }
    }

    /// Queues a packet sent at `now`. May drop it.
    pub fn send(&mut self, now: Tick, packet: Vec<u8>) {
        self.sent += 1;
        self.bytes += packet.len() as u64;
        if self.rng.gen_range(0..100u8) < self.conditions.packet_loss_percent {
            self.dropped += 1;
            return;
        }
        self.in_flight
            .push_back((now.wrapping_add(self.conditions.latency_ticks), packet));
    }

    /// Packets due at `now`, in send order.
    pub fn deliver(&mut self, now: Tick) -> Vec<Vec<u8>> {
        let mut due = Vec::new();
        while let Some((at, _)) = self.in_flight.front() {
            if at.is_newer_than(now) {
                break;
            }
            if let Some((_, packet)) = self.in_flight.pop_front() {
                due.push(packet);
            }
        }
        due
    }

    /// Packets offered to the link.
    #[must_use]
    pub const fn sent(&self) -> u64 {
        self.sent
    }

    /// Packets dropped.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Bytes offered to the link.
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_avatar() -> GhostState {
        GhostState::Avatar(AvatarSnapshot::new(Tick(0), Vec3::ZERO, Quaternion::IDENTITY))
    }

    #[test]
    fn test_thrust_moves_along_facing() {
        let movement = ThrustMovement::default();
        let start = idle_avatar();
        let moved = movement.step(&start, &Command::new(Tick(1), 0, 1));
        let avatar = moved.as_avatar().unwrap();
        assert_eq!(avatar.tick, Tick(1));
        assert_eq!(avatar.position, [0, 0, 10]);

        let idle = movement.step(&moved, &Command::neutral(Tick(2)));
        assert_eq!(idle.as_avatar().unwrap().position, [0, 0, 10]);
    }

    #[test]
    fn test_turning_changes_rotation() {
        let movement = ThrustMovement::default();
        let start = idle_avatar();
        let turned = movement.step(&start, &Command::new(Tick(1), 1, 0));
        assert!(turned.as_avatar().unwrap().rotation > 0);
        assert_eq!(turned.as_avatar().unwrap().position, [0, 0, 0]);
    }

    #[test]
    fn test_projectile_flies_regardless_of_input() {
        let movement = ThrustMovement {
            tick_seconds: 0.5,
            ..ThrustMovement::default()
        };
        let start = GhostState::Projectile(ProjectileSnapshot::new(
            Tick(0),
            Vec3::ZERO,
            Vec3::new(2.0, 0.0, 0.0),
        ));
        let next = movement.step(&start, &Command::new(Tick(1), 1, 1));
        assert_eq!(next.as_projectile().unwrap().position, [100, 0, 0]);
    }

    #[test]
    fn test_world_spawn_and_step() {
        let mut world = GhostWorld::new();
        let avatar = world.spawn_ghost(GhostType::Avatar, NetworkId(1));
        let bullet = world.spawn_projectile(Vec3::ZERO, Vec3::new(0.0, 0.0, 60.0));
        assert_ne!(avatar, bullet);
        assert_eq!(world.ghosts().len(), 2);

        world.step(&ThrustMovement::default(), |ghost, tick| {
            assert_eq!(ghost, avatar);
            Command::new(tick, 0, 1)
        });
        assert_eq!(world.tick(), Tick(1));
        assert_eq!(world.state(avatar).unwrap().tick(), Tick(1));
        assert_eq!(world.state(bullet).unwrap().as_projectile().unwrap().position, [0, 0, 100]);

        world.despawn_ghost(avatar);
        assert_eq!(world.ghost_count(), 1);
    }

    #[test]
    fn test_lossy_link_is_reproducible() {
        let conditions = LinkConditions {
            latency_ticks: 2,
            packet_loss_percent: 50,
        };
        let run = |seed| {
            let mut link = LossyLink::new(conditions, seed);
            let mut received = Vec::new();
            for tick in 0..200u32 {
                link.send(Tick(tick), tick.to_le_bytes().to_vec());
                received.extend(link.deliver(Tick(tick)));
            }
            (received, link.dropped())
        };

        let (first, dropped) = run(7);
        assert_eq!(run(7), (first.clone(), dropped));
        assert!(dropped > 60 && dropped < 140, "dropped {dropped}");

        // In order, and nothing arrives early.
        let ticks: Vec<u32> = first
            .iter()
            .map(|p| u32::from_le_bytes([p[0], p[1], p[2], p[3]]))
            .collect();
        assert!(ticks.windows(2).all(|w| w[0] < w[1]));
        assert!(ticks.iter().all(|&t| t <= 197));
    }

    #[test]
    fn test_perfect_link_delivers_everything() {
        let mut link = LossyLink::new(LinkConditions::PERFECT, 1);
        link.send(Tick(5), vec![1]);
        link.send(Tick(5), vec![2]);
        assert_eq!(link.deliver(Tick(5)), vec![vec![1], vec![2]]);
        assert_eq!(link.dropped(), 0);
    }
}
