//! # Replication Server
//!
//! Authoritative side of the ghost protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    REPLICATION SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ Transport    │  │ Handshake +  │  │ Snapshot     │       │
//! │  │ events (chan)│──│ commands     │──│ frames       │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! │                          │                 │                │
//! │              ┌───────────▼─────────────────▼──┐             │
//! │              │ Per connection:                │             │
//! │              │ - session state                │             │
//! │              │ - command buffer               │             │
//! │              │ - sent frames, acked baselines │             │
//! │              └────────────────────────────────┘             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tick Order
//!
//! 1. [`ReplicationServer::poll_events`]: drain transport events, run the
//!    handshake, record commands and acks.
//! 2. The simulation steps, reading input via [`ReplicationServer::command_for_ghost`].
//! 3. [`ReplicationServer::build_snapshots`]: one frame per in-game connection.
//!
//! Physics, entity storage and spawning are external; they are reached
//! through [`GhostSpawner`] and [`SimulationSource`].

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::baseline::{BaselineStore, SentFrame, SentHistory};
use crate::command::{Command, CommandBuffer};
use crate::config::ReplicationConfig;
use crate::error::{NetError, NetResult};
use crate::protocol::{to_bytes, CompressionModel, NetworkIdPacket, Packet, SnapshotWriter};
use crate::session::{JoinOutcome, NetworkId, ServerSession, SessionState};
use crate::snapshot::{GhostId, GhostState, GhostType};
use crate::tick::Tick;

/// Transport-level connection handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Event from the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// Transport link established.
    Connected(ConnectionId),
    /// Packet received.
    Packet {
        /// Source connection.
        connection: ConnectionId,
        /// Packet bytes.
        data: Vec<u8>,
    },
    /// Transport link closed.
    Disconnected(ConnectionId),
}

/// Creates and destroys ghosts in the simulation.
pub trait GhostSpawner {
    /// Instantiates a ghost of `ghost_type` controlled by `owner`.
    fn spawn_ghost(&mut self, ghost_type: GhostType, owner: NetworkId) -> GhostId;

    /// Destroys a ghost.
    fn despawn_ghost(&mut self, ghost: GhostId);
}

/// A ghost as the simulation reports it for this tick.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicatedGhost {
    /// Ghost instance.
    pub id: GhostId,
    /// Controlling client, if any.
    pub owner: Option<NetworkId>,
    /// Quantized state.
    pub state: GhostState,
}

/// Read access to the simulation.
pub trait SimulationSource {
    /// Tick the simulation has just completed.
    fn current_tick(&self) -> Tick;

    /// Every ghost that needs replicating, in a stable order.
    fn ghosts(&self) -> Vec<ReplicatedGhost>;
}

/// Server counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Connections accepted.
    pub connections_accepted: u64,
    /// Connections refused at the cap.
    pub connections_rejected: u64,
    /// Connections dropped for silence.
    pub timeouts: u64,
    /// Join requests that spawned a ghost.
    pub joins_accepted: u64,
    /// Join requests ignored (duplicate or out of state).
    pub joins_ignored: u64,
    /// Commands stored.
    pub commands_received: u64,
    /// Packets rejected (undecodable or out of state).
    pub packets_rejected: u64,
    /// Acks that promoted a sent frame.
    pub frames_acked: u64,
    /// Snapshot frames built.
    pub snapshots_sent: u64,
    /// Snapshot bytes built.
    pub snapshot_bytes: u64,
    /// Ghost entries left out of a full frame, summed over frames.
    pub ghosts_deferred: u64,
}

struct ServerConnection {
    session: ServerSession,
    commands: Option<CommandBuffer>,
    controlled: Option<GhostId>,
    sent: SentHistory,
    /// Ghosts this connection has been sent, with the tick each was last written.
    known: HashMap<GhostId, Tick>,
    /// Despawns to repeat until a frame carrying them is acked.
    pending_despawns: Vec<(GhostId, Tick)>,
    last_heard: Tick,
}

/// The authoritative replication endpoint.
pub struct ReplicationServer {
    config: ReplicationConfig,
    model: CompressionModel,
    event_tx: Sender<TransportEvent>,
    event_rx: Receiver<TransportEvent>,
    connections: HashMap<ConnectionId, ServerConnection>,
    baselines: BaselineStore,
    next_network_id: u32,
    stats: ServerStats,
}

impl ReplicationServer {
    /// Creates a server. Fails on invalid config or a model mismatch.
    pub fn new(config: ReplicationConfig) -> NetResult<Self> {
        config.validate()?;
        let model = config.compression_model()?;
        let (event_tx, event_rx) = bounded(config.event_queue_capacity);
        tracing::info!(
            "Replication server ready: {} Hz, model {:#018x}",
            config.tick_rate,
            model.fingerprint()
        );
        Ok(Self {
            config,
            model,
            event_tx,
            event_rx,
            connections: HashMap::new(),
            baselines: BaselineStore::new(),
            next_network_id: 1,
            stats: ServerStats::default(),
        })
    }

    /// Sender half of the inbound event queue, for the transport.
    #[must_use]
    pub fn event_sender(&self) -> Sender<TransportEvent> {
        self.event_tx.clone()
    }

    /// Active configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Shared compression model.
    #[inline]
    #[must_use]
    pub const fn model(&self) -> &CompressionModel {
        &self.model
    }

    /// Counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Handshake state of a connection.
    #[must_use]
    pub fn session_state(&self, connection: ConnectionId) -> Option<SessionState> {
        self.connections.get(&connection).map(|c| c.session.state())
    }

    /// Network id assigned to a connection.
    #[must_use]
    pub fn network_id(&self, connection: ConnectionId) -> Option<NetworkId> {
        self.connections.get(&connection)?.session.network_id()
    }

    /// Ghost a connection controls, once in game.
    #[must_use]
    pub fn controlled_ghost(&self, connection: ConnectionId) -> Option<GhostId> {
        self.connections.get(&connection)?.controlled
    }

    /// Acked baselines, for inspection.
    #[must_use]
    pub const fn baselines(&self) -> &BaselineStore {
        &self.baselines
    }

    /// Drains queued transport events and expires silent connections.
    ///
    /// Returns packets to send (network id assignments).
    pub fn poll_events<S: GhostSpawner>(
        &mut self,
        now: Tick,
        spawner: &mut S,
    ) -> Vec<(ConnectionId, Vec<u8>)> {
        let mut outgoing = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                TransportEvent::Connected(id) => {
                    if let Some(packet) = self.accept(id, now) {
                        outgoing.push((id, packet));
                    }
                }
                TransportEvent::Packet { connection, data } => {
                    if let Err(e) = self.handle_packet(connection, &data, now, spawner) {
                        self.stats.packets_rejected += 1;
                        tracing::warn!("Rejected packet from {}: {}", connection, e);
                    }
                }
                TransportEvent::Disconnected(id) => self.disconnect(id, spawner),
            }
        }
        self.expire_silent(now, spawner);
        outgoing
    }

    fn accept(&mut self, id: ConnectionId, now: Tick) -> Option<Vec<u8>> {
        if self.connections.contains_key(&id) {
            tracing::warn!("Duplicate connect for {}", id);
            return None;
        }
        if self.connections.len() >= self.config.max_connections {
            self.stats.connections_rejected += 1;
            let err = NetError::ServerFull(self.connections.len());
            tracing::warn!("Refusing {}: {}", id, err);
            return None;
        }

        let network_id = NetworkId(self.next_network_id);
        self.next_network_id = self.next_network_id.wrapping_add(1).max(1);

        let mut session = ServerSession::new();
        session.assign_network_id(network_id);
        self.connections.insert(
            id,
            ServerConnection {
                session,
                commands: None,
                controlled: None,
                sent: SentHistory::new(self.config.sent_history),
                known: HashMap::new(),
                pending_despawns: Vec::new(),
                last_heard: now,
            },
        );
        self.stats.connections_accepted += 1;
        tracing::info!("Client connected: {} (network id {})", id, network_id);
        Some(to_bytes(&NetworkIdPacket::new(network_id.0)))
    }

    fn handle_packet<S: GhostSpawner>(
        &mut self,
        id: ConnectionId,
        data: &[u8],
        now: Tick,
        spawner: &mut S,
    ) -> NetResult<()> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(NetError::UnknownConnection(id.0))?;
        connection.last_heard = now;

        match Packet::parse(data)? {
            Packet::JoinRequest(_) => {
                match connection.session.on_join_request() {
                    JoinOutcome::Accepted => {
                        // Accepted implies an assigned id.
                        let owner = connection.session.network_id().unwrap_or(NetworkId(0));
                        let ghost = spawner.spawn_ghost(GhostType::Avatar, owner);
                        connection.controlled = Some(ghost);
                        connection.commands =
                            Some(CommandBuffer::new(self.config.command_buffer_capacity));
                        self.stats.joins_accepted += 1;
                        tracing::info!("{} joined, controlling {}", id, ghost);
                    }
                    outcome => {
                        self.stats.joins_ignored += 1;
                        tracing::warn!("Ignored join request from {}: {:?}", id, outcome);
                    }
                }
                Ok(())
            }
            Packet::Command(packet) => {
                let state = connection.session.state();
                let Some(commands) = connection.commands.as_mut().filter(|_| state.is_in_game())
                else {
                    return Err(NetError::NotInGame(state));
                };
                commands.put(packet.command());
                self.stats.commands_received += 1;

                if let Some(ack) = packet.ack() {
                    if let Some(frame) = connection.sent.acknowledge(ack) {
                        for (ghost, snapshot) in frame.ghosts {
                            if connection.known.contains_key(&ghost) {
                                self.baselines.promote(id, ghost, snapshot);
                            }
                        }
                        self.stats.frames_acked += 1;
                    }
                    connection.pending_despawns.retain(|&(_, since)| since.is_newer_than(ack));
                }
                Ok(())
            }
            Packet::NetworkId(_) | Packet::Snapshot(_) => {
                Err(NetError::UnknownPacket(data.first().copied().unwrap_or(0)))
            }
        }
    }

    /// Tears down a connection and despawns its ghost.
    pub fn disconnect<S: GhostSpawner>(&mut self, id: ConnectionId, spawner: &mut S) {
        let Some(connection) = self.connections.remove(&id) else {
            return;
        };
        if let Some(ghost) = connection.controlled {
            spawner.despawn_ghost(ghost);
        }
        self.baselines.remove_connection(id);
        tracing::info!("Client disconnected: {} (was {:?})", id, connection.session.state());
    }

    fn expire_silent<S: GhostSpawner>(&mut self, now: Tick, spawner: &mut S) {
        let timeout = i64::from(self.config.timeout_ticks);
        let expired: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, c)| i64::from(now.diff(c.last_heard)) > timeout)
            .map(|(&id, _)| id)
            .collect();
        for id in expired {
            self.stats.timeouts += 1;
            tracing::info!("Connection {} timed out", id);
            self.disconnect(id, spawner);
        }
    }

    /// Input of a connection for `tick`; neutral when missing or not in game.
    #[must_use]
    pub fn command_for_tick(&self, connection: ConnectionId, tick: Tick) -> Command {
        self.connections
            .get(&connection)
            .filter(|c| c.session.state().is_in_game())
            .and_then(|c| c.commands.as_ref())
            .map_or_else(|| Command::neutral(tick), |buffer| buffer.get_or_neutral(tick))
    }

    /// Input for the ghost a connection controls.
    #[must_use]
    pub fn command_for_ghost(&self, ghost: GhostId, tick: Tick) -> Command {
        self.connections
            .iter()
            .find(|(_, c)| c.controlled == Some(ghost))
            .map_or_else(|| Command::neutral(tick), |(&id, _)| self.command_for_tick(id, tick))
    }

    /// Encodes one snapshot frame per in-game connection.
    ///
    /// Each ghost is delta-encoded against the newest baseline that
    /// connection acked within `snapshot_history` ticks, else against zero.
    /// When the world does not fit in `max_packet_size`, the frame carries
    /// what fits and the rest follow on later ticks.
    pub fn build_snapshots<S: SimulationSource>(
        &mut self,
        sim: &S,
    ) -> Vec<(ConnectionId, Vec<u8>)> {
        let tick = sim.current_tick();
        let ghosts = sim.ghosts();
        let live: HashSet<GhostId> = ghosts.iter().map(|g| g.id).collect();
        let max_age = self.config.max_baseline_age();
        let max_packet_size = self.config.max_packet_size;

        let mut frames = Vec::new();
        for (&id, connection) in &mut self.connections {
            if !connection.session.state().is_in_game() {
                continue;
            }

            let gone: Vec<GhostId> = connection
                .known
                .keys()
                .filter(|ghost| !live.contains(ghost))
                .copied()
                .collect();
            for ghost in gone {
                connection.known.remove(&ghost);
                connection.pending_despawns.push((ghost, tick));
                self.baselines.remove_ghost(id, ghost);
                tracing::debug!("Despawning {} on {}", ghost, id);
            }

            let known = &connection.known;
            let baselines = &self.baselines;
            let encoded = encode_frame(
                &self.model,
                max_packet_size,
                tick,
                &ghosts,
                &connection.pending_despawns,
                |ghost| known.get(&ghost).copied(),
                |ghost| baselines.choose(id, ghost, tick, max_age),
            );
            match encoded {
                Ok((bytes, sent)) => {
                    let deferred = ghosts.len() - sent.ghosts.len();
                    if deferred > 0 {
                        self.stats.ghosts_deferred += deferred as u64;
                        tracing::debug!(
                            "Frame for {} at {} full: {} of {} ghosts deferred",
                            id,
                            tick,
                            deferred,
                            ghosts.len()
                        );
                    }
                    connection.known.extend(sent.ghosts.iter().map(|(ghost, _)| (*ghost, tick)));
                    connection.sent.record(sent);
                    self.stats.snapshots_sent += 1;
                    self.stats.snapshot_bytes += bytes.len() as u64;
                    frames.push((id, bytes));
                }
                Err(e) => tracing::warn!("Snapshot for {} at {} dropped: {}", id, tick, e),
            }
        }
        frames.sort_by_key(|(id, _)| *id);
        frames
    }
}

/// Encodes as many ghosts as fit in one packet.
///
/// Ghosts the connection has never received go first, then those whose
/// acked baseline is oldest (no usable baseline counts as oldest), then
/// those written longest ago. Ghosts that do not fit are left for a later
/// tick; the returned frame lists only what was written.
fn encode_frame<'b, K, B>(
    model: &CompressionModel,
    max_packet_size: usize,
    tick: Tick,
    ghosts: &[ReplicatedGhost],
    despawns: &[(GhostId, Tick)],
    last_sent: K,
    baseline_for: B,
) -> NetResult<(Vec<u8>, SentFrame)>
where
    K: Fn(GhostId) -> Option<Tick>,
    B: Fn(GhostId) -> Option<&'b GhostState>,
{
    let mut order: Vec<(&ReplicatedGhost, Option<&GhostState>)> =
        ghosts.iter().map(|ghost| (ghost, baseline_for(ghost.id))).collect();
    let age = |since: Tick| tick.diff(since).unsigned_abs();
    order.sort_by_cached_key(|(ghost, baseline)| {
        let sent = last_sent(ghost.id);
        (
            sent.is_some(),
            Reverse(baseline.map_or(u32::MAX, |b| age(b.tick()))),
            Reverse(sent.map_or(u32::MAX, age)),
        )
    });

    let despawn_ids: Vec<GhostId> = despawns.iter().map(|&(ghost, _)| ghost).collect();
    let mut writer = SnapshotWriter::begin(model, max_packet_size, tick, &despawn_ids)?;
    let mut sent = Vec::with_capacity(ghosts.len());
    for (ghost, baseline) in order {
        match writer.write_ghost(ghost.id, ghost.owner, baseline, &ghost.state) {
            Ok(state) => sent.push((ghost.id, state)),
            // Smaller ghosts later in the order may still fit.
            Err(NetError::PacketOverflow { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    let bytes = writer.finish()?;
    Ok((bytes, SentFrame { tick, ghosts: sent }))
}
