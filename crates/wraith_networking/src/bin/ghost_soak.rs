//! # Ghost Soak
//!
//! Runs a replication server and N clients over seeded lossy links and
//! reports bandwidth and prediction error.
//!
//! ```bash
//! RUST_LOG=wraith_networking=debug ghost_soak --clients 8 --ticks 3600 --loss 5
//! ```
//!
//! Handshake packets ride the reliable channel; snapshots and commands go
//! over [`LossyLink`]s. Clients run `latency + 1` ticks ahead of the server
//! so their input arrives before the server simulates it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wraith_networking::{
    ConnectionId, GhostWorld, LinkConditions, LossyLink, NetResult, ReplicationClient,
    ReplicationConfig, ReplicationServer, ThrustMovement, Tick, TickClock, TransportEvent,
};

struct SoakArgs {
    clients: u32,
    ticks: u32,
    loss: u8,
    latency: u32,
    seed: u64,
    projectiles: u32,
    realtime: bool,
    config: Option<String>,
}

impl Default for SoakArgs {
    fn default() -> Self {
        Self {
            clients: 4,
            ticks: 1800,
            loss: 5,
            latency: 3,
            seed: 0x5EED,
            projectiles: 8,
            realtime: false,
            config: None,
        }
    }
}

fn parse_args() -> Result<SoakArgs, String> {
    let mut args = SoakArgs::default();
    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        if flag == "--realtime" {
            args.realtime = true;
            continue;
        }
        let value = iter.next().ok_or_else(|| format!("{flag} needs a value"))?;
        let bad = |e: std::num::ParseIntError| format!("{flag} {value}: {e}");
        match flag.as_str() {
            "--clients" => args.clients = value.parse().map_err(bad)?,
            "--ticks" => args.ticks = value.parse().map_err(bad)?,
            "--loss" => args.loss = value.parse::<u8>().map_err(bad)?.min(100),
            "--latency" => args.latency = value.parse().map_err(bad)?,
            "--seed" => args.seed = value.parse().map_err(bad)?,
            "--projectiles" => args.projectiles = value.parse().map_err(bad)?,
            "--config" => args.config = Some(value.clone()),
            other => return Err(format!("unknown flag {other}")),
        }
    }
    Ok(args)
}

fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

struct SoakClient {
    connection: ConnectionId,
    replication: ReplicationClient,
    uplink: LossyLink,
    downlink: LossyLink,
    input: (i8, i8),
    /// Predicted position per client tick, checked once the server gets there.
    predicted: HashMap<u32, [i32; 3]>,
}

#[derive(Default)]
struct PredictionError {
    samples: u64,
    exact: u64,
    total_units: f64,
    worst_units: f64,
}

impl PredictionError {
    fn record(&mut self, predicted: [i32; 3], actual: [i32; 3]) {
        let dist = predicted
            .iter()
            .zip(actual)
            .map(|(&p, a)| {
                let d = f64::from(p) - f64::from(a);
                d * d
            })
            .sum::<f64>()
            .sqrt()
            / 100.0;
        self.samples += 1;
        if predicted == actual {
            self.exact += 1;
        }
        self.total_units += dist;
        self.worst_units = self.worst_units.max(dist);
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total_units / self.samples as f64
        }
    }
}

struct Soak {
    args: SoakArgs,
    server: ReplicationServer,
    world: GhostWorld,
    movement: ThrustMovement,
    clients: Vec<SoakClient>,
    rng: ChaCha8Rng,
    error: PredictionError,
}

impl Soak {
    fn new(args: SoakArgs) -> NetResult<Self> {
        let config = match &args.config {
            Some(path) => ReplicationConfig::from_toml_file(path)?,
            None => ReplicationConfig::default(),
        };
        let conditions = LinkConditions {
            latency_ticks: args.latency,
            packet_loss_percent: args.loss,
        };

        let server = ReplicationServer::new(config.clone())?;
        let mut clients = Vec::new();
        for i in 0..args.clients {
            let seed = args.seed.wrapping_add(u64::from(i) * 2);
            clients.push(SoakClient {
                connection: ConnectionId(i + 1),
                replication: ReplicationClient::new(config.clone())?,
                uplink: LossyLink::new(conditions, seed),
                downlink: LossyLink::new(conditions, seed + 1),
                input: (0, 0),
                predicted: HashMap::new(),
            });
        }

        let mut world = GhostWorld::new();
        let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
        for _ in 0..args.projectiles {
            let position = wraith_shared::Vec3::new(rng.gen_range(-50.0..50.0), 1.0, 0.0);
            let velocity = wraith_shared::Vec3::new(0.0, 0.0, rng.gen_range(-20.0..20.0));
            world.spawn_projectile(position, velocity);
        }

        Ok(Self {
            args,
            server,
            world,
            movement: ThrustMovement::default(),
            clients,
            rng,
            error: PredictionError::default(),
        })
    }

    fn connect_all(&mut self) {
        let events = self.server.event_sender();
        for client in &mut self.clients {
            client.replication.on_transport_connected();
            if events.try_send(TransportEvent::Connected(client.connection)).is_err() {
                tracing::warn!("Event queue full, dropping connect");
            }
        }
    }

    fn tick(&mut self) {
        let now = self.world.tick();
        let events = self.server.event_sender();

        // Uplink: commands that have arrived by now.
        for client in &mut self.clients {
            for data in client.uplink.deliver(now) {
                let event = TransportEvent::Packet {
                    connection: client.connection,
                    data,
                };
                if events.try_send(event).is_err() {
                    tracing::warn!("Event queue full, dropping command");
                }
            }
        }

        // Reliable channel: network ids down, join requests up.
        let outgoing = self.server.poll_events(now, &mut self.world);
        for (connection, packet) in outgoing {
            if let Some(client) = self.clients.iter_mut().find(|c| c.connection == connection) {
                if let Err(e) = client.replication.receive(&packet) {
                    tracing::warn!("{} rejected control packet: {}", connection, e);
                }
                if let Some(join) = client.replication.join_request() {
                    let event = TransportEvent::Packet {
                        connection,
                        data: join,
                    };
                    if events.try_send(event).is_err() {
                        tracing::warn!("Event queue full, dropping join");
                    }
                }
            }
        }

        let server = &self.server;
        self.world
            .step(&self.movement, |ghost, tick| server.command_for_ghost(ghost, tick));
        let now = self.world.tick();

        for client in &mut self.clients {
            let Some(ghost) = self.server.controlled_ghost(client.connection) else {
                continue;
            };
            if let Some(predicted) = client.predicted.remove(&now.0) {
                if let Some(actual) = self.world.state(ghost).and_then(|s| s.as_avatar()) {
                    self.error.record(predicted, actual.position);
                }
            }
        }

        for (connection, frame) in self.server.build_snapshots(&self.world) {
            if let Some(client) = self.clients.iter_mut().find(|c| c.connection == connection) {
                client.downlink.send(now, frame);
            }
        }

        let lead = self.args.latency + 1;
        for client in &mut self.clients {
            for frame in client.downlink.deliver(now) {
                if let Err(e) = client.replication.receive(&frame) {
                    tracing::debug!("{} dropped snapshot: {}", client.connection, e);
                }
            }

            if now.0 % 30 == 0 {
                client.input = (self.rng.gen_range(-1..=1), self.rng.gen_range(-1..=1));
            }
            let client_tick = now.wrapping_add(lead);
            let (horizontal, vertical) = client.input;
            if let Some(packet) =
                client.replication.sample_command(client_tick, horizontal, vertical)
            {
                client.uplink.send(now, packet);
            }
            let predicted = client
                .replication
                .predicted_state(client_tick, &self.movement)
                .and_then(|s| s.as_avatar().map(|a| a.position));
            if let Some(position) = predicted {
                client.predicted.insert(client_tick.0, position);
            }
            client.predicted.retain(|&t, _| Tick(t).is_newer_than(now));
        }
    }

    fn run(&mut self) {
        self.connect_all();
        let total = self.args.ticks;

        if self.args.realtime {
            let mut clock = TickClock::new(self.server.config().tick_rate);
            let mut last = Instant::now();
            let mut done = 0;
            while done < total {
                let elapsed = last.elapsed();
                last = Instant::now();
                for _ in 0..clock.advance(elapsed).min(total - done) {
                    self.tick();
                    done += 1;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            let stats = clock.stats();
            tracing::info!(
                "Clock: {} ticks, {} catch-up, max burst {}",
                stats.total_ticks,
                stats.catch_up_ticks,
                stats.max_burst
            );
        } else {
            for _ in 0..total {
                self.tick();
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn report(&self, elapsed: Duration) {
        let seconds = f64::from(self.args.ticks) / f64::from(self.server.config().tick_rate);
        let stats = self.server.stats();

        println!("═══════════════════════════════════════════════════════════════════");
        println!("                       GHOST SOAK RESULTS");
        println!("═══════════════════════════════════════════════════════════════════");
        println!("Clients:            {}", self.args.clients);
        println!("Ghosts:             {}", self.world.ghost_count());
        println!("Ticks:              {} ({seconds:.1}s simulated)", self.args.ticks);
        println!("Wall time:          {:.2}s", elapsed.as_secs_f64());
        println!("Link:               {} ticks, {}% loss", self.args.latency, self.args.loss);
        println!();
        println!("Snapshots built:    {}", stats.snapshots_sent);
        println!("Frames acked:       {}", stats.frames_acked);
        println!("Commands received:  {}", stats.commands_received);
        println!("Packets rejected:   {}", stats.packets_rejected);
        println!("Ghosts deferred:    {}", stats.ghosts_deferred);
        if stats.snapshots_sent > 0 {
            println!(
                "Avg snapshot:       {:.1} bytes",
                stats.snapshot_bytes as f64 / stats.snapshots_sent as f64
            );
        }
        for client in &self.clients {
            let replication = client.replication.stats();
            println!(
                "{}: {:.0} B/s down, {}/{} frames lost, {} stale, {} rejected",
                client.connection,
                client.downlink.bytes() as f64 / seconds,
                client.downlink.dropped(),
                client.downlink.sent(),
                replication.snapshots_stale,
                replication.snapshots_rejected,
            );
        }
        println!();
        println!(
            "Prediction error:   mean {:.3} units, worst {:.3} units, {}/{} exact",
            self.error.mean(),
            self.error.worst_units,
            self.error.exact,
            self.error.samples
        );
    }
}

fn main() {
    init_tracing("info");

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("ghost_soak: {e}");
            eprintln!(
                "usage: ghost_soak [--clients N] [--ticks N] [--loss PCT] [--latency TICKS] \
                 [--seed N] [--projectiles N] [--config PATH] [--realtime]"
            );
            std::process::exit(2);
        }
    };

    let mut soak = match Soak::new(args) {
        Ok(soak) => soak,
        Err(e) => {
            tracing::error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let start = Instant::now();
    soak.run();
    soak.report(start.elapsed());
}
