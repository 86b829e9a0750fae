use crate::config::CaptureConfig;
use crate::model::{Entity, PacketEvent};
use crate::net;
use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

pub mod index;
pub mod parser;

use index::{Aggregates, CorrelationIndex, EventRing, TtlWindows};

const PERMISSION_HINT: &str = "Packet capture needs read access to the BPF devices. \
Install Wireshark's ChmodBPF helper or add your user to the access_bpf group, then restart the capture.";
const INSTALL_HINT: &str =
    "tshark was not found on PATH. Install Wireshark (e.g. `brew install --cask wireshark`) to enable packet capture.";

/// Capture lifecycle. Error edges land back on `Idle` with `last_error` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Starting,
    Capturing,
    Stopping,
}

/// Snapshot answered to `packet.status`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureStatus {
    pub available: bool,
    pub has_permission: bool,
    pub capturing: bool,
    pub interface: Option<String>,
    pub interfaces: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug)]
struct Shared {
    state: CaptureState,
    interface: Option<String>,
    last_error: Option<String>,
    has_permission: bool,
    seq: u64,
    ring: EventRing,
    aggregates: Aggregates,
    ttl: TtlWindows,
    index: CorrelationIndex,
}

/// Live packet pipeline
///
/// Owns the capture subprocess, the correlation index, per-peer aggregates,
/// the bounded event ring, and the drain/flush timers. A single capture is
/// active at a time; starting over a running capture stops it first.
pub struct PacketPipeline {
    config: CaptureConfig,
    shared: Arc<Mutex<Shared>>,
    child: Arc<AsyncMutex<Option<Child>>>,
    session: Mutex<Option<CancellationToken>>,
    event_sink: Arc<Mutex<Option<Box<dyn Fn(PacketEvent) + Send + Sync>>>>,
    flush_hook: Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>,
}

impl PacketPipeline {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: CaptureState::Idle,
                interface: None,
                last_error: None,
                has_permission: true,
                seq: 0,
                ring: EventRing::new(config.ring_capacity),
                aggregates: Aggregates::default(),
                ttl: TtlWindows::default(),
                index: CorrelationIndex::default(),
            })),
            config,
            child: Arc::new(AsyncMutex::new(None)),
            session: Mutex::new(None),
            event_sink: Arc::new(Mutex::new(None)),
            flush_hook: Arc::new(Mutex::new(None)),
        }
    }

    /// Register the per-event consumer callback. Events drain at the timer's
    /// bounded rate regardless of ingress.
    pub fn set_event_sink(&self, sink: Box<dyn Fn(PacketEvent) + Send + Sync>) {
        *self.event_sink.lock().unwrap() = Some(sink);
    }

    /// Register the periodic enrichment hook (runs on the flush timer).
    pub fn set_flush_hook(&self, hook: Box<dyn Fn() + Send + Sync>) {
        *self.flush_hook.lock().unwrap() = Some(hook);
    }

    /// Tool presence plus capture-device permission, both resolvable without
    /// spawning a capture.
    pub fn status(&self) -> CaptureStatus {
        let shared = self.shared.lock().unwrap();
        CaptureStatus {
            available: tool_available(),
            has_permission: shared.has_permission && device_readable(),
            capturing: shared.state == CaptureState::Capturing,
            interface: shared.interface.clone(),
            interfaces: net::interface::interface_names(),
            error: shared.last_error.clone(),
        }
    }

    pub fn events_snapshot(&self) -> Vec<PacketEvent> {
        self.shared.lock().unwrap().ring.snapshot()
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.lock().unwrap().state == CaptureState::Capturing
    }

    /// Rebuild the IP→entity index from current store content.
    pub fn rebuild_index<'a>(
        &self,
        entities: impl Iterator<Item = &'a Entity>,
        host_ips: impl Iterator<Item = String>,
    ) {
        self.shared
            .lock()
            .unwrap()
            .index
            .rebuild(entities, host_ips);
    }

    /// Copy of the per-IP aggregates for the enrichment flush.
    #[allow(clippy::type_complexity)]
    pub fn aggregate_snapshot(&self) -> HashMap<String, (BTreeMap<String, u64>, u64, u64)> {
        let shared = self.shared.lock().unwrap();
        let mut out = HashMap::new();
        for (ip, protocols) in &shared.aggregates.protocols_by_ip {
            let bytes = shared.aggregates.bytes_by_ip.get(ip).copied().unwrap_or(0);
            let packets = shared
                .aggregates
                .packets_by_ip
                .get(ip)
                .copied()
                .unwrap_or(0);
            out.insert(ip.clone(), (protocols.clone(), bytes, packets));
        }
        out
    }

    /// Lower-median TTL for an IP's rolling sample window.
    pub fn ttl_median(&self, ip: &str) -> Option<u8> {
        self.shared.lock().unwrap().ttl.median(ip)
    }

    /// Start capturing. A caller-provided interface is honored when it is in
    /// the enumerated set; otherwise the default-route interface is used.
    pub async fn start(&self, interface: Option<String>) -> Result<String, String> {
        if !tool_available() {
            let mut shared = self.shared.lock().unwrap();
            shared.last_error = Some(INSTALL_HINT.to_string());
            return Err(INSTALL_HINT.to_string());
        }

        // Restarting over a live capture cleanly stops the previous one.
        if !matches!(self.shared.lock().unwrap().state, CaptureState::Idle) {
            self.stop().await;
        }

        let iface = match interface {
            Some(name) if net::interface::interface_names().contains(&name) => name,
            _ => net::interface::default_interface().await,
        };

        {
            let mut shared = self.shared.lock().unwrap();
            shared.state = CaptureState::Starting;
            shared.interface = Some(iface.clone());
            shared.last_error = None;
        }

        let spawned = Command::new("tshark")
            .args([
                "-i", iface.as_str(), "-l", "-n", "-T", "fields",
                "-E", "separator=|",
                "-E", "occurrence=f",
                "-e", "frame.time_epoch",
                "-e", "ip.src",
                "-e", "ip.dst",
                "-e", "ipv6.src",
                "-e", "ipv6.dst",
                "-e", "_ws.col.Protocol",
                "-e", "frame.len",
                "-e", "ip.ttl",
                "-e", "_ws.col.Info",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to spawn capture tool: {}", e);
                let mut shared = self.shared.lock().unwrap();
                shared.state = CaptureState::Idle;
                shared.last_error = Some(message.clone());
                return Err(message);
            }
        };

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");
        *self.child.lock().await = Some(child);

        let token = CancellationToken::new();
        *self.session.lock().unwrap() = Some(token.clone());

        self.spawn_stdout_reader(stdout, token.clone());
        self.spawn_stderr_reader(stderr, token.clone());
        self.spawn_drain_timer(token.clone());
        self.spawn_flush_timer(token);

        self.shared.lock().unwrap().state = CaptureState::Capturing;
        Ok(iface)
    }

    /// Stop the capture: termination with a hard-kill escalation, then timer
    /// teardown. Idempotent.
    pub async fn stop(&self) {
        {
            let mut shared = self.shared.lock().unwrap();
            if shared.state == CaptureState::Idle {
                return;
            }
            shared.state = CaptureState::Stopping;
        }
        if let Some(token) = self.session.lock().unwrap().take() {
            token.cancel();
        }
        if let Some(mut child) = self.child.lock().await.take() {
            crate::cmd::terminate(&mut child, self.config.kill_grace).await;
        }
        let mut shared = self.shared.lock().unwrap();
        shared.state = CaptureState::Idle;
        shared.interface = None;
    }

    fn spawn_stdout_reader(&self, stdout: tokio::process::ChildStdout, token: CancellationToken) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if let Some(packet) = parser::parse_line(&line) {
                                ingest(&shared, packet);
                            }
                        }
                        _ => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
        });
    }

    fn spawn_stderr_reader(&self, stderr: tokio::process::ChildStderr, token: CancellationToken) {
        let shared = Arc::clone(&self.shared);
        let child = Arc::clone(&self.child);
        let session = token.clone();
        let kill_grace = self.config.kill_grace;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            let lower = line.to_lowercase();
                            if lower.contains("permission denied")
                                || lower.contains("don't have permission")
                            {
                                {
                                    let mut s = shared.lock().unwrap();
                                    s.has_permission = false;
                                    s.last_error = Some(PERMISSION_HINT.to_string());
                                    s.state = CaptureState::Stopping;
                                }
                                session.cancel();
                                if let Some(mut c) = child.lock().await.take() {
                                    crate::cmd::terminate(&mut c, kill_grace).await;
                                }
                                let mut s = shared.lock().unwrap();
                                s.state = CaptureState::Idle;
                                s.interface = None;
                                break;
                            }
                            if line.contains("Capturing on") || line.contains("packets captured") {
                                continue;
                            }
                            if !line.trim().is_empty() {
                                tracing::warn!(source = "capture", "{}", line);
                            }
                        }
                        _ => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
        });
    }

    /// Bounds the outbound event rate to `drain_batch / drain_interval`
    /// per consumer, irrespective of ingress rate.
    fn spawn_drain_timer(&self, token: CancellationToken) {
        let shared = Arc::clone(&self.shared);
        let sink = Arc::clone(&self.event_sink);
        let interval = self.config.drain_interval;
        let batch = self.config.drain_batch;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let events = {
                            let sink_guard = sink.lock().unwrap();
                            if sink_guard.is_none() {
                                continue;
                            }
                            drop(sink_guard);
                            shared.lock().unwrap().ring.drain_batch(batch)
                        };
                        if events.is_empty() {
                            continue;
                        }
                        let sink_guard = sink.lock().unwrap();
                        if let Some(callback) = sink_guard.as_ref() {
                            for event in events {
                                callback(event);
                            }
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });
    }

    fn spawn_flush_timer(&self, token: CancellationToken) {
        let hook = Arc::clone(&self.flush_hook);
        let interval = self.config.flush_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Some(callback) = hook.lock().unwrap().as_ref() {
                            callback();
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });
    }
}

/// Per-packet work: event construction, ring append, aggregation, TTL
/// sampling. Host IPs are excluded from aggregation and TTL windows.
fn ingest(shared: &Mutex<Shared>, packet: parser::ParsedPacket) {
    let mut s = shared.lock().unwrap();
    s.seq += 1;
    let node_id = s.index.attribute(&packet.src, &packet.dst);
    let event = PacketEvent {
        id: format!("pkt-{}", s.seq),
        timestamp: packet.timestamp_ms,
        node_id,
        src_ip: packet.src.clone(),
        dst_ip: packet.dst.clone(),
        protocol: packet.protocol.clone(),
        length: packet.length,
        info: packet.info.clone(),
    };
    s.ring.push(event);

    for ip in [&packet.src, &packet.dst] {
        if !s.index.is_host_ip(ip) {
            s.aggregates.record(ip, &packet.protocol, packet.length);
        }
    }
    if let Some(ttl) = packet.ttl {
        if !s.index.is_host_ip(&packet.src) {
            s.ttl.record(&packet.src, ttl);
        }
    }
}

/// PATH walk for the capture tool; resolved once per run.
fn tool_available() -> bool {
    static AVAILABLE: once_cell::sync::OnceCell<bool> = once_cell::sync::OnceCell::new();
    *AVAILABLE.get_or_init(|| {
        std::env::var_os("PATH")
            .map(|path| {
                std::env::split_paths(&path).any(|dir| dir.join("tshark").is_file())
            })
            .unwrap_or(false)
    })
}

/// The kernel packet-access device must be readable for capture to work.
fn device_readable() -> bool {
    use std::fs::OpenOptions;
    OpenOptions::new().read(true).open("/dev/bpf0").is_ok()
}
