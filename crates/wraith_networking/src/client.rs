//! # Replication Client
//!
//! Client side of the ghost protocol.
//!
//! - Decodes snapshot frames against its per-ghost [`SnapshotHistory`].
//! - Samples input into a [`CommandBuffer`] and sends it with a snapshot ack.
//! - Predicts the controlled ghost by replaying buffered commands from the
//!   newest confirmed snapshot.
//! - Interpolates every other ghost a few ticks behind the newest snapshot.

use std::collections::HashMap;

use crate::baseline::SnapshotHistory;
use crate::command::{Command, CommandBuffer};
use crate::config::ReplicationConfig;
use crate::error::{NetError, NetResult};
use crate::interpolation::{self, RenderTime};
use crate::protocol::{
    to_bytes, CommandPacket, CompressionModel, GhostEntry, JoinRequest, Packet, SnapshotReader,
};
use crate::session::{ClientSession, NetworkId, SessionState};
use crate::snapshot::{GhostId, GhostState};
use crate::tick::Tick;

/// Advances one ghost by one tick of input.
///
/// Must match the server's simulation exactly for predicted ghosts to
/// agree with confirmed snapshots.
pub trait CommandSimulation {
    /// State after applying `command`. The result belongs to `command.tick`.
    fn step(&self, state: &GhostState, command: &Command) -> GhostState;
}

#[derive(Debug)]
struct RemoteGhost {
    owner: Option<NetworkId>,
    history: SnapshotHistory,
}

/// Client counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Snapshot frames applied.
    pub snapshots_applied: u64,
    /// Frames older than one already applied.
    pub snapshots_stale: u64,
    /// Frames that failed to decode.
    pub snapshots_rejected: u64,
    /// Snapshot bytes received.
    pub snapshot_bytes: u64,
    /// Commands sent.
    pub commands_sent: u64,
}

/// The client replication endpoint.
pub struct ReplicationClient {
    config: ReplicationConfig,
    model: CompressionModel,
    session: ClientSession,
    commands: CommandBuffer,
    ghosts: HashMap<GhostId, RemoteGhost>,
    last_snapshot: Option<Tick>,
    controlled: Option<GhostId>,
    stats: ClientStats,
}

impl ReplicationClient {
    /// Creates a client. Fails on invalid config or a model mismatch.
    pub fn new(config: ReplicationConfig) -> NetResult<Self> {
        config.validate()?;
        let model = config.compression_model()?;
        let commands = CommandBuffer::new(config.command_buffer_capacity);
        Ok(Self {
            config,
            model,
            session: ClientSession::new(),
            commands,
            ghosts: HashMap::new(),
            last_snapshot: None,
            controlled: None,
            stats: ClientStats::default(),
        })
    }

    /// Handshake state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Our network id.
    #[inline]
    #[must_use]
    pub const fn network_id(&self) -> Option<NetworkId> {
        self.session.network_id()
    }

    /// Ghost we control, once a snapshot named us as its owner.
    #[inline]
    #[must_use]
    pub const fn controlled_ghost(&self) -> Option<GhostId> {
        self.controlled
    }

    /// Newest snapshot tick applied.
    #[inline]
    #[must_use]
    pub const fn last_snapshot_tick(&self) -> Option<Tick> {
        self.last_snapshot
    }

    /// Counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// Shared compression model.
    #[inline]
    #[must_use]
    pub const fn model(&self) -> &CompressionModel {
        &self.model
    }

    /// Ghosts currently mirrored, sorted.
    #[must_use]
    pub fn ghost_ids(&self) -> Vec<GhostId> {
        let mut ids: Vec<GhostId> = self.ghosts.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Received history of one ghost.
    #[must_use]
    pub fn history(&self, ghost: GhostId) -> Option<&SnapshotHistory> {
        self.ghosts.get(&ghost).map(|g| &g.history)
    }

    /// Owner of a mirrored ghost.
    #[must_use]
    pub fn owner(&self, ghost: GhostId) -> Option<NetworkId> {
        self.ghosts.get(&ghost)?.owner
    }

    /// State of `ghost` at `tick`, predicted from the two newest snapshots
    /// when that tick never arrived.
    #[must_use]
    pub fn confirmed_state(&self, ghost: GhostId, tick: Tick) -> Option<GhostState> {
        self.ghosts.get(&ghost)?.history.state_at(tick)
    }

    /// Resets to `Connecting` for a fresh transport link.
    pub fn on_transport_connected(&mut self) {
        self.disconnect();
        tracing::info!("Transport connected, awaiting network id");
    }

    /// Records the server-assigned network id.
    pub fn on_network_id(&mut self, id: NetworkId) -> bool {
        let accepted = self.session.on_network_id(id);
        if accepted {
            tracing::info!("Assigned network id {}", id);
        } else {
            tracing::warn!("Ignored network id {} in {:?}", id, self.session.state());
        }
        accepted
    }

    /// The one-shot join request. `None` unless connected and not yet sent.
    pub fn join_request(&mut self) -> Option<Vec<u8>> {
        if !self.session.begin_join() {
            return None;
        }
        tracing::info!("Requesting to join the game");
        Some(to_bytes(&JoinRequest::new(0)))
    }

    /// Handles a packet from the server.
    pub fn receive(&mut self, bytes: &[u8]) -> NetResult<()> {
        match Packet::parse(bytes)? {
            Packet::NetworkId(packet) => {
                self.on_network_id(NetworkId(packet.network_id));
                Ok(())
            }
            Packet::Snapshot(frame) => self.apply_snapshot(frame).map_err(|e| {
                self.stats.snapshots_rejected += 1;
                e
            }),
            Packet::JoinRequest(_) | Packet::Command(_) => {
                Err(NetError::UnknownPacket(bytes.first().copied().unwrap_or(0)))
            }
        }
    }

    fn apply_snapshot(&mut self, frame: &[u8]) -> NetResult<()> {
        let state = self.session.state();
        if !matches!(state, SessionState::EnteringGame | SessionState::InGame) {
            return Err(NetError::NotInGame(state));
        }

        let mut reader = SnapshotReader::open(&self.model, frame)?;
        let tick = reader.tick();
        if self.last_snapshot.is_some_and(|last| !tick.is_newer_than(last)) {
            self.stats.snapshots_stale += 1;
            tracing::debug!("Dropping stale snapshot {}", tick);
            return Ok(());
        }

        // Decode everything before touching state so a bad frame changes nothing.
        let mut entries: Vec<GhostEntry> = Vec::with_capacity(reader.remaining().min(256) as usize);
        while let Some(entry) = reader.next_ghost(|ghost, baseline| {
            self.ghosts.get(&ghost)?.history.get(baseline).cloned()
        })? {
            entries.push(entry);
        }
        let despawns = reader.despawns()?;

        if self.session.on_snapshot() {
            tracing::info!("Entered game at {}", tick);
        }

        let me = self.session.network_id();
        let capacity = self.config.snapshot_history;
        for entry in entries {
            if entry.owner.is_some() && entry.owner == me && self.controlled != Some(entry.ghost) {
                self.controlled = Some(entry.ghost);
                tracing::info!("Controlling {}", entry.ghost);
            }
            let ghost = self.ghosts.entry(entry.ghost).or_insert_with(|| RemoteGhost {
                owner: entry.owner,
                history: SnapshotHistory::new(capacity),
            });
            ghost.owner = entry.owner;
            ghost.history.insert(entry.state);
        }

        for ghost in despawns {
            if self.ghosts.remove(&ghost).is_some() {
                tracing::debug!("Despawned {}", ghost);
            }
            if self.controlled == Some(ghost) {
                self.controlled = None;
            }
        }

        self.last_snapshot = Some(tick);
        self.stats.snapshots_applied += 1;
        self.stats.snapshot_bytes += frame.len() as u64;
        Ok(())
    }

    /// Samples input for `tick`. Returns the command packet to send.
    ///
    /// `None` until in game: no command traffic before that.
    pub fn sample_command(&mut self, tick: Tick, horizontal: i8, vertical: i8) -> Option<Vec<u8>> {
        if !self.session.state().is_in_game() {
            return None;
        }
        let command = Command::new(tick, horizontal, vertical);
        self.commands.put(command);
        self.stats.commands_sent += 1;
        Some(to_bytes(&CommandPacket::new(command, self.last_snapshot)))
    }

    /// Locally stored input for `tick`.
    #[must_use]
    pub fn command(&self, tick: Tick) -> Option<Command> {
        self.commands.get(tick)
    }

    /// Predicted state of the controlled ghost at `current`.
    ///
    /// Starts from the newest confirmed snapshot and replays buffered input
    /// up to and including `current`; missing ticks replay as neutral.
    #[must_use]
    pub fn predicted_state<S: CommandSimulation>(
        &self,
        current: Tick,
        simulation: &S,
    ) -> Option<GhostState> {
        let ghost = self.ghosts.get(&self.controlled?)?;
        let confirmed = ghost.history.latest()?;
        let state = self
            .commands
            .replay(confirmed.tick(), current)
            .fold(confirmed.clone(), |state, command| simulation.step(&state, &command));
        Some(state)
    }

    /// Render time `interpolation_delay_ticks` behind the newest snapshot.
    ///
    /// `fraction` is how far into the next tick the renderer is, in `[0, 1)`.
    #[must_use]
    pub fn render_time(&self, fraction: f32) -> Option<RenderTime> {
        let latest = self.last_snapshot?;
        Some(RenderTime::behind(latest, self.config.interpolation_delay_ticks, fraction))
    }

    /// Interpolated state of a ghost we do not predict.
    ///
    /// `None` for the controlled ghost and for unknown ghosts.
    #[must_use]
    pub fn interpolated_state(&self, ghost: GhostId, at: RenderTime) -> Option<GhostState> {
        if self.controlled == Some(ghost) {
            return None;
        }
        interpolation::sample(&self.ghosts.get(&ghost)?.history, at)
    }

    /// Drops the session, input and every mirrored ghost.
    pub fn disconnect(&mut self) {
        if self.session.state() != SessionState::Connecting {
            tracing::info!("Disconnected in {:?}", self.session.state());
        }
        self.session = ClientSession::new();
        self.commands.clear();
        self.ghosts.clear();
        self.last_snapshot = None;
        self.controlled = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{NetworkIdPacket, SnapshotWriter};
    use crate::snapshot::AvatarSnapshot;
    use crate::simulation::ThrustMovement;
    use wraith_shared::{Quaternion, Vec3};

    fn client_in_game() -> ReplicationClient {
        let mut client = ReplicationClient::new(ReplicationConfig::default()).unwrap();
        client.receive(&to_bytes(&NetworkIdPacket::new(7))).unwrap();
        client.join_request().unwrap();
        client
    }

    fn avatar(tick: u32, x: f32) -> GhostState {
        GhostState::Avatar(AvatarSnapshot::new(
            Tick(tick),
            Vec3::new(x, 0.0, 0.0),
            Quaternion::IDENTITY,
        ))
    }

    fn frame(
        model: &CompressionModel,
        tick: u32,
        ghosts: &[(GhostId, Option<NetworkId>, Option<&GhostState>, &GhostState)],
        despawns: &[GhostId],
    ) -> Vec<u8> {
        let mut writer = SnapshotWriter::begin(model, 1200, Tick(tick), despawns).unwrap();
        for &(ghost, owner, baseline, state) in ghosts {
            writer.write_ghost(ghost, owner, baseline, state).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_handshake_gates_traffic() {
        let mut client = ReplicationClient::new(ReplicationConfig::default()).unwrap();
        assert!(client.join_request().is_none());
        assert!(client.sample_command(Tick(1), 1, 0).is_none());

        client.receive(&to_bytes(&NetworkIdPacket::new(7))).unwrap();
        assert_eq!(client.state(), SessionState::Connected);
        assert!(client.join_request().is_some());
        assert!(client.join_request().is_none());
        assert_eq!(client.state(), SessionState::EnteringGame);
        assert!(client.sample_command(Tick(1), 1, 0).is_none());
    }

    #[test]
    fn test_first_snapshot_enters_game() {
        let mut client = client_in_game();
        let model = CompressionModel::default();
        let state = avatar(3, 1.0);
        let bytes = frame(&model, 3, &[(GhostId(1), Some(NetworkId(7)), None, &state)], &[]);

        client.receive(&bytes).unwrap();
        assert_eq!(client.state(), SessionState::InGame);
        assert_eq!(client.controlled_ghost(), Some(GhostId(1)));
        assert_eq!(client.last_snapshot_tick(), Some(Tick(3)));

        let packet = client.sample_command(Tick(4), 0, 1).unwrap();
        let Packet::Command(command) = Packet::parse(&packet).unwrap() else {
            panic!("expected command packet");
        };
        assert_eq!(command.ack(), Some(Tick(3)));
    }

    #[test]
    fn test_snapshot_before_join_is_rejected() {
        let mut client = ReplicationClient::new(ReplicationConfig::default()).unwrap();
        let model = CompressionModel::default();
        let state = avatar(3, 1.0);
        let bytes = frame(&model, 3, &[(GhostId(1), None, None, &state)], &[]);
        assert_eq!(
            client.receive(&bytes),
            Err(NetError::NotInGame(SessionState::Connecting))
        );
        assert!(client.ghost_ids().is_empty());
    }

    #[test]
    fn test_bad_frame_changes_nothing() {
        let mut client = client_in_game();
        let model = CompressionModel::default();
        let first = avatar(3, 1.0);
        client
            .receive(&frame(&model, 3, &[(GhostId(2), None, None, &first)], &[]))
            .unwrap();

        // Names a baseline at tick 2 the client never received.
        let stale = avatar(2, 0.0);
        let next = avatar(5, 2.0);
        let bytes = frame(
            &model,
            5,
            &[(GhostId(3), None, None, &next), (GhostId(2), None, Some(&stale), &next)],
            &[],
        );
        assert!(matches!(client.receive(&bytes), Err(NetError::MissingBaseline { .. })));
        assert_eq!(client.ghost_ids(), vec![GhostId(2)]);
        assert_eq!(client.last_snapshot_tick(), Some(Tick(3)));
        assert_eq!(client.stats().snapshots_rejected, 1);
    }

    #[test]
    fn test_stale_frame_is_ignored() {
        let mut client = client_in_game();
        let model = CompressionModel::default();
        let newer = avatar(6, 1.0);
        let older = avatar(5, 9.0);
        client
            .receive(&frame(&model, 6, &[(GhostId(1), None, None, &newer)], &[]))
            .unwrap();
        client
            .receive(&frame(&model, 5, &[(GhostId(1), None, None, &older)], &[]))
            .unwrap();

        assert_eq!(client.stats().snapshots_stale, 1);
        assert_eq!(client.history(GhostId(1)).map(SnapshotHistory::len), Some(1));
    }

    #[test]
    fn test_despawn_removes_ghost() {
        let mut client = client_in_game();
        let model = CompressionModel::default();
        let state = avatar(3, 1.0);
        client
            .receive(&frame(&model, 3, &[(GhostId(1), None, None, &state)], &[]))
            .unwrap();
        client.receive(&frame(&model, 4, &[], &[GhostId(1)])).unwrap();
        assert!(client.ghost_ids().is_empty());
    }

    #[test]
    fn test_prediction_replays_input() {
        let mut client = client_in_game();
        let model = CompressionModel::default();
        let state = avatar(10, 0.0);
        client
            .receive(&frame(&model, 10, &[(GhostId(1), Some(NetworkId(7)), None, &state)], &[]))
            .unwrap();

        let movement = ThrustMovement::default();
        client.sample_command(Tick(11), 0, 1);
        client.sample_command(Tick(12), 0, 1);

        let predicted = client.predicted_state(Tick(12), &movement).unwrap();
        let expected = [Command::new(Tick(11), 0, 1), Command::new(Tick(12), 0, 1)]
            .iter()
            .fold(client.history(GhostId(1)).unwrap().latest().unwrap().clone(), |s, c| {
                movement.step(&s, c)
            });
        assert_eq!(predicted, expected);
        assert_eq!(predicted.tick(), Tick(12));
        assert_ne!(predicted.as_avatar().unwrap().position, [0, 0, 0]);

        // Nothing to replay at the confirmed tick.
        let confirmed = client.predicted_state(Tick(10), &movement).unwrap();
        assert_eq!(confirmed.as_avatar().unwrap().position, [0, 0, 0]);
    }

    #[test]
    fn test_interpolation_skips_controlled_ghost() {
        let mut client = client_in_game();
        let model = CompressionModel::default();
        let mine = avatar(10, 0.0);
        let theirs = avatar(10, 4.0);
        client
            .receive(&frame(
                &model,
                10,
                &[
                    (GhostId(1), Some(NetworkId(7)), None, &mine),
                    (GhostId(2), Some(NetworkId(8)), None, &theirs),
                ],
                &[],
            ))
            .unwrap();

        let at = client.render_time(0.0).unwrap();
        assert!(client.interpolated_state(GhostId(1), at).is_none());
        let remote = client.interpolated_state(GhostId(2), at).unwrap();
        assert_eq!(remote.as_avatar().map(|a| a.position), theirs.as_avatar().map(|a| a.position));
    }

    #[test]
    fn test_disconnect_tears_down() {
        let mut client = client_in_game();
        let model = CompressionModel::default();
        let state = avatar(3, 1.0);
        client
            .receive(&frame(&model, 3, &[(GhostId(1), Some(NetworkId(7)), None, &state)], &[]))
            .unwrap();
        client.sample_command(Tick(4), 1, 1);

        client.disconnect();
        assert_eq!(client.state(), SessionState::Connecting);
        assert!(client.ghost_ids().is_empty());
        assert!(client.controlled_ghost().is_none());
        assert!(client.command(Tick(4)).is_none());

        // A reconnect runs the full handshake again.
        client.receive(&to_bytes(&NetworkIdPacket::new(9))).unwrap();
        assert!(client.join_request().is_some());
    }
}
