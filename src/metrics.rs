//! Prometheus-compatible metrics endpoint
//!
//! Exposes arena metrics in Prometheus text format and JSON.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::game::engine::EngineStats;
use crate::game::state::RoundPhase;

/// Rolling window used for tick percentiles
const TICK_HISTORY_LEN: usize = 1000;

/// Metrics registry for the arena server
#[derive(Debug)]
pub struct Metrics {
    // Session
    pub registered_players: AtomicU64,
    pub connected_displays: AtomicU64,
    pub connections_active: AtomicU64,
    pub physics_host_attached: AtomicU64,
    /// 0=Idle, 1=Active, 2=Ended
    pub round_phase: AtomicU64,
    pub marbles_in_flight: AtomicU64,

    // Engine totals
    pub marbles_spawned: AtomicU64,
    pub marbles_scored: AtomicU64,
    pub marbles_recycled: AtomicU64,
    pub marbles_destroyed: AtomicU64,
    pub anomalies: AtomicU64,
    pub rounds_started: AtomicU64,
    pub rounds_ended: AtomicU64,

    // Network
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_rejected: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            registered_players: AtomicU64::new(0),
            connected_displays: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            physics_host_attached: AtomicU64::new(0),
            round_phase: AtomicU64::new(0),
            marbles_in_flight: AtomicU64::new(0),
            marbles_spawned: AtomicU64::new(0),
            marbles_scored: AtomicU64::new(0),
            marbles_recycled: AtomicU64::new(0),
            marbles_destroyed: AtomicU64::new(0),
            anomalies: AtomicU64::new(0),
            rounds_started: AtomicU64::new(0),
            rounds_ended: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_rejected: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY_LEN)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Mirror the engine's running totals
    pub fn sync_engine(&self, stats: &EngineStats) {
        self.marbles_spawned.store(stats.marbles_spawned, Ordering::Relaxed);
        self.marbles_scored.store(stats.marbles_scored, Ordering::Relaxed);
        self.marbles_recycled.store(stats.marbles_recycled, Ordering::Relaxed);
        self.marbles_destroyed.store(stats.marbles_destroyed, Ordering::Relaxed);
        self.anomalies.store(stats.anomalies, Ordering::Relaxed);
        self.rounds_started.store(stats.rounds_started, Ordering::Relaxed);
        self.rounds_ended.store(stats.rounds_ended, Ordering::Relaxed);
    }

    pub fn set_round_phase(&self, phase: RoundPhase) {
        let value = match phase {
            RoundPhase::Idle => 0,
            RoundPhase::Active => 1,
            RoundPhase::Ended => 2,
        };
        self.round_phase.store(value, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("marble_arena_players_registered", "Registered players", "gauge",
            self.registered_players.load(Ordering::Relaxed));
        metric!("marble_arena_displays_connected", "Attached arena displays", "gauge",
            self.connected_displays.load(Ordering::Relaxed));
        metric!("marble_arena_connections_active", "Active WebTransport connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("marble_arena_physics_host_attached", "Physics host attached (0/1)", "gauge",
            self.physics_host_attached.load(Ordering::Relaxed));
        metric!("marble_arena_round_phase", "Round phase (0=Idle, 1=Active, 2=Ended)", "gauge",
            self.round_phase.load(Ordering::Relaxed));
        metric!("marble_arena_marbles_in_flight", "Marbles currently in the world", "gauge",
            self.marbles_in_flight.load(Ordering::Relaxed));

        metric!("marble_arena_marbles_spawned_total", "Marbles spawned", "counter",
            self.marbles_spawned.load(Ordering::Relaxed));
        metric!("marble_arena_marbles_scored_total", "Marbles that scored", "counter",
            self.marbles_scored.load(Ordering::Relaxed));
        metric!("marble_arena_marbles_recycled_total", "Marbles sent back to the spawn line", "counter",
            self.marbles_recycled.load(Ordering::Relaxed));
        metric!("marble_arena_marbles_destroyed_total", "Marbles removed from the world", "counter",
            self.marbles_destroyed.load(Ordering::Relaxed));
        metric!("marble_arena_scoring_anomalies_total", "Dropped unattributed or stale scoring events", "counter",
            self.anomalies.load(Ordering::Relaxed));
        metric!("marble_arena_rounds_started_total", "Rounds started", "counter",
            self.rounds_started.load(Ordering::Relaxed));
        metric!("marble_arena_rounds_ended_total", "Rounds ended", "counter",
            self.rounds_ended.load(Ordering::Relaxed));

        metric!("marble_arena_messages_received_total", "Client messages received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("marble_arena_messages_sent_total", "Server messages queued", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("marble_arena_messages_rejected_total", "Client messages rejected", "counter",
            self.messages_rejected.load(Ordering::Relaxed));

        metric!("marble_arena_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("marble_arena_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("marble_arena_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("marble_arena_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("marble_arena_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("marble_arena_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON view of the same metrics
    pub fn to_json(&self) -> String {
        let load = |value: &AtomicU64| value.load(Ordering::Relaxed);
        serde_json::json!({
            "session": {
                "players": load(&self.registered_players),
                "displays": load(&self.connected_displays),
                "connections": load(&self.connections_active),
                "physics_host": load(&self.physics_host_attached) == 1,
                "round_phase": load(&self.round_phase),
                "marbles_in_flight": load(&self.marbles_in_flight),
            },
            "marbles": {
                "spawned": load(&self.marbles_spawned),
                "scored": load(&self.marbles_scored),
                "recycled": load(&self.marbles_recycled),
                "destroyed": load(&self.marbles_destroyed),
                "anomalies": load(&self.anomalies),
            },
            "rounds": {
                "started": load(&self.rounds_started),
                "ended": load(&self.rounds_ended),
            },
            "network": {
                "messages_received": load(&self.messages_received),
                "messages_sent": load(&self.messages_sent),
                "messages_rejected": load(&self.messages_rejected),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_p99_us": load(&self.tick_time_p99_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "tick_count": load(&self.tick_count),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

/// Route one raw HTTP request
fn respond(metrics: &Metrics, request: &str) -> String {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("GET "))
        .and_then(|rest| rest.split_whitespace().next());

    match path {
        Some("/metrics/json") | Some("/json") => {
            http_response("200 OK", "application/json", &metrics.to_json())
        }
        Some("/metrics") => http_response(
            "200 OK",
            "text/plain; version=0.0.4",
            &metrics.to_prometheus(),
        ),
        Some("/health") | Some("/") => http_response("200 OK", "text/plain", "OK"),
        _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = respond(&metrics, &request);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
