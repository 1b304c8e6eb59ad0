//! # presence-sim
//!
//! Simulated participant for exercising a presence relay: joins, wanders
//! around a square world, turns to face where it is heading and keeps its
//! presence alive with periodic pings. Other participants' comings and
//! goings are logged as they arrive.

use clap::Parser;
use presence_client::{
    ClientConfig, ClientError, ClientPresenceAdapter, PresenceClient, PresenceObserver,
    ReconnectPolicy,
};
use presence_core::{JoinPayload, ParticipantId, ParticipantRecord, Rotation, Vec3};
use rand::Rng;
use std::time::Duration;
use tokio::time::{interval, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "presence-sim")]
#[command(about = "Simulated participant for a presence relay")]
struct Args {
    /// Relay WebSocket URL
    #[arg(short, long, default_value = "ws://127.0.0.1:8835")]
    url: String,

    /// Display name
    #[arg(short = 'n', long, default_value = "wanderer")]
    username: String,

    /// Participant id (random UUID when omitted)
    #[arg(long)]
    id: Option<String>,

    /// Movement updates per second
    #[arg(short, long, default_value = "2.0")]
    move_freq: f64,

    /// Seconds between liveness pings
    #[arg(short, long, default_value = "10")]
    ping_interval: u64,

    /// Simulation duration in seconds
    #[arg(short, long, default_value = "60")]
    duration: u64,

    /// World size (square area in meters)
    #[arg(short, long, default_value = "100.0")]
    world_size: f64,

    /// Reconnection attempts before giving up
    #[arg(long, default_value = "30")]
    max_reconnect_attempts: u32,
}

/// Logs what the relay tells us about everyone else.
struct LoggingObserver;

impl PresenceObserver for LoggingObserver {
    fn participant_joined(&mut self, record: &ParticipantRecord) {
        info!("👋 {} ({}) is here at {:?}", record.username, record.id, record.position);
    }

    fn participant_left(&mut self, id: &ParticipantId) {
        info!("🚪 {} left", id);
    }
}

/// Random walk towards a target that changes whenever it is reached.
struct Wanderer {
    position: Vec3,
    target: Vec3,
    world_size: f64,
}

impl Wanderer {
    /// Walking speed in meters per second
    const SPEED: f64 = 1.5;

    fn new(world_size: f64) -> Self {
        let spawn = random_point(world_size);
        Self {
            position: spawn,
            target: random_point(world_size),
            world_size,
        }
    }

    /// Advances by `dt` seconds. Returns the new position and heading.
    fn step(&mut self, dt: f64) -> (Vec3, Rotation) {
        if self.position.distance(self.target) < 0.5 {
            self.target = random_point(self.world_size);
        }

        let dx = self.target.x - self.position.x;
        let dz = self.target.z - self.position.z;
        let distance = (dx * dx + dz * dz).sqrt();
        let stride = (Self::SPEED * dt).min(distance);
        if distance > 0.01 {
            self.position = Vec3::new(
                self.position.x + dx / distance * stride,
                self.position.y,
                self.position.z + dz / distance * stride,
            );
        }

        let heading = dx.atan2(dz).to_degrees();
        (self.position, Rotation::euler(0.0, heading, 0.0))
    }
}

/// Time between movement updates for `move_freq` updates per second.
///
/// Clamped to 0.1 Hz at the slow end and 1 ms at the fast end, since
/// `interval` panics on a zero period. Non-numeric rates fall back to 1 Hz.
fn movement_period(move_freq: f64) -> Duration {
    let freq = if move_freq.is_nan() { 1.0 } else { move_freq.max(0.1) };
    Duration::from_secs_f64(1.0 / freq).max(Duration::from_millis(1))
}

fn random_point(world_size: f64) -> Vec3 {
    let half = (world_size / 2.0).max(1.0);
    let mut rng = rand::thread_rng();
    Vec3::new(rng.gen_range(-half..half), 0.0, rng.gen_range(-half..half))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let id = args
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    info!("🚀 Starting presence simulation");
    info!("   • Relay: {}", args.url);
    info!("   • Participant: {} ({})", args.username, id);
    info!("   • World: {}x{} meters", args.world_size, args.world_size);
    info!("   • Movement: {:.1} Hz", args.move_freq);
    info!("   • Duration: {} seconds", args.duration);

    let mut wanderer = Wanderer::new(args.world_size);
    let adapter = ClientPresenceAdapter::with_observer(
        JoinPayload {
            id: ParticipantId::new(id),
            username: args.username.clone(),
            position: wanderer.position,
            rotation: Rotation::identity(),
        },
        LoggingObserver,
    );

    let config = ClientConfig {
        url: args.url.clone(),
        ping_interval: Duration::from_secs(args.ping_interval.max(1)),
        reconnect: ReconnectPolicy {
            max_attempts: args.max_reconnect_attempts,
            ..Default::default()
        },
    };
    let (client, handle) = PresenceClient::new(config, adapter);
    let mut running = tokio::spawn(client.run());

    let period = movement_period(args.move_freq);
    let mut ticker = interval(period);
    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    let outcome = loop {
        tokio::select! {
            finished = &mut running => break finished,
            _ = tokio::time::sleep_until(deadline) => {
                info!("⏱️ Simulation time is up");
                handle.close();
                break (&mut running).await;
            }
            _ = &mut interrupted => {
                info!("🛑 Interrupted");
                handle.close();
                break (&mut running).await;
            }
            _ = ticker.tick() => {
                let (position, rotation) = wanderer.step(period.as_secs_f64());
                handle.move_to(position);
                handle.rotate_to(rotation);
            }
        }
    };

    match outcome {
        Ok(Ok(adapter)) => {
            info!(
                "🏁 Finished at {:?}; {} participants were visible",
                adapter.local().position,
                adapter.participants().len()
            );
            Ok(())
        }
        Ok(Err(ClientError::GaveUp { attempts })) => {
            error!("❌ Relay unreachable after {} attempts", attempts);
            Err(ClientError::GaveUp { attempts }.into())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(format!("client task failed: {e}").into()),
    }
}
