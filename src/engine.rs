use crate::capture::{CaptureStatus, PacketPipeline};
use crate::collect::bluetooth::BluetoothCollector;
use crate::collect::mdns::MdnsCollector;
use crate::collect::neighbors::NeighborCollector;
use crate::collect::sockets::SocketCollector;
use crate::collect::throughput::ThroughputCollector;
use crate::collect::topology::TopologyCollector;
use crate::collect::wifi::WifiCollector;
use crate::collect::{Collector, CollectorResult};
use crate::config::EngineConfig;
use crate::constants::HOST_ID;
use crate::db::vendor::MacVendorDatabase;
use crate::enrich::{classify, os as os_inference, probe};
use crate::errors::DiscoveryError;
use crate::model::{now_ms, Entity, EntityPatch, PacketEvent, SignalKind};
use crate::net;
use crate::store::EntityStore;
use crate::transport::{ControlReply, OutboundMessage, Publisher};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

const WRITER_QUEUE: usize = 256;

/// Messages funneled into the single writer context. No two of these are
/// ever processed concurrently.
enum WriterMsg {
    Apply {
        source: &'static str,
        result: CollectorResult,
    },
    Tick,
    TransportReady,
    InitialScanDone,
    FlushAggregates,
    ProbeCompleted {
        ip: String,
        result: probe::ProbeResult,
    },
    Control(ControlMsg),
}

enum ControlMsg {
    Pause,
    Resume,
    ScanNow {
        collector: Option<String>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    FullState {
        reply: oneshot::Sender<OutboundMessage>,
    },
    PacketStart {
        interface: Option<String>,
        reply: oneshot::Sender<Result<String, String>>,
    },
    PacketStop {
        reply: oneshot::Sender<()>,
    },
    PacketStatus {
        reply: oneshot::Sender<CaptureStatus>,
    },
    PacketEvents {
        reply: oneshot::Sender<Vec<PacketEvent>>,
    },
    Probe {
        ip: String,
        reply: oneshot::Sender<ControlReply>,
    },
    ProbeStatus {
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Cheap handle onto the engine's control surface.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<WriterMsg>,
}

impl EngineHandle {
    pub async fn pause(&self) {
        let _ = self.tx.send(WriterMsg::Control(ControlMsg::Pause)).await;
    }

    pub async fn resume(&self) {
        let _ = self.tx.send(WriterMsg::Control(ControlMsg::Resume)).await;
    }

    /// Signal that the downstream transport can accept publications.
    pub async fn transport_ready(&self) {
        let _ = self.tx.send(WriterMsg::TransportReady).await;
    }

    pub async fn scan_now(&self, collector: Option<String>) -> Result<(), String> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(WriterMsg::Control(ControlMsg::ScanNow { collector, reply }))
            .await;
        rx.await.unwrap_or_else(|_| Err("engine stopped".to_string()))
    }

    pub async fn full_state(&self) -> Option<OutboundMessage> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(WriterMsg::Control(ControlMsg::FullState { reply }))
            .await;
        rx.await.ok()
    }

    pub async fn packet_start(&self, interface: Option<String>) -> Result<String, String> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(WriterMsg::Control(ControlMsg::PacketStart { interface, reply }))
            .await;
        rx.await.unwrap_or_else(|_| Err("engine stopped".to_string()))
    }

    pub async fn packet_stop(&self) {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(WriterMsg::Control(ControlMsg::PacketStop { reply }))
            .await;
        let _ = rx.await;
    }

    pub async fn packet_status(&self) -> Option<CaptureStatus> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(WriterMsg::Control(ControlMsg::PacketStatus { reply }))
            .await;
        rx.await.ok()
    }

    pub async fn packet_events(&self) -> Vec<PacketEvent> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(WriterMsg::Control(ControlMsg::PacketEvents { reply }))
            .await;
        rx.await.unwrap_or_default()
    }

    pub async fn nmap_scan(&self, ip: String) -> ControlReply {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(WriterMsg::Control(ControlMsg::Probe { ip: ip.clone(), reply }))
            .await;
        rx.await.unwrap_or(ControlReply::NmapScan {
            success: false,
            ip,
            os_family: None,
            os_version: None,
            confidence: None,
            error: Some("engine stopped".to_string()),
        })
    }

    pub async fn nmap_status(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(WriterMsg::Control(ControlMsg::ProbeStatus { reply }))
            .await;
        rx.await.unwrap_or(false)
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(WriterMsg::Control(ControlMsg::Shutdown)).await;
    }
}

/// The orchestrator: sole writer to the store, sole publisher of snapshots.
///
/// Collector scans run on their own tasks; every apply/classify/enrich/
/// publish sequence funnels through the writer loop in `run`.
pub struct Engine {
    config: EngineConfig,
    store: EntityStore,
    neighbors: Arc<NeighborCollector>,
    wifi: Arc<WifiCollector>,
    bluetooth: Arc<BluetoothCollector>,
    sockets: Arc<SocketCollector>,
    mdns: Arc<MdnsCollector>,
    topology: Arc<TopologyCollector>,
    throughput: Arc<ThroughputCollector>,
    pipeline: Arc<PacketPipeline>,
    publisher: Arc<dyn Publisher>,
    paused: Arc<AtomicBool>,
    probe_families: HashMap<String, String>,
    cancel: CancellationToken,
    tx: mpsc::Sender<WriterMsg>,
    rx: Option<mpsc::Receiver<WriterMsg>>,
    transport_ready: bool,
    initial_scan_done: bool,
    /// Shared with the packet event sink: nothing reaches the wire before
    /// the first snapshot.
    published_initial: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(config: EngineConfig, publisher: Arc<dyn Publisher>) -> Result<Self, DiscoveryError> {
        let vendor_db = Arc::new(Mutex::new(MacVendorDatabase::new()?));
        let (tx, rx) = mpsc::channel(WRITER_QUEUE);
        let timeouts = &config.timeouts;

        Ok(Self {
            neighbors: Arc::new(NeighborCollector::new(vendor_db, timeouts)),
            wifi: Arc::new(WifiCollector::new(timeouts)),
            bluetooth: Arc::new(BluetoothCollector::new(timeouts)),
            sockets: Arc::new(SocketCollector::new(timeouts)),
            mdns: Arc::new(MdnsCollector::new(timeouts)),
            topology: Arc::new(TopologyCollector::new(timeouts)),
            throughput: Arc::new(ThroughputCollector::new(timeouts)),
            pipeline: Arc::new(PacketPipeline::new(config.capture)),
            publisher,
            paused: Arc::new(AtomicBool::new(false)),
            probe_families: HashMap::new(),
            cancel: CancellationToken::new(),
            store: EntityStore::new(),
            config,
            tx,
            rx: Some(rx),
            transport_ready: false,
            initial_scan_done: false,
            published_initial: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.tx.clone(),
        }
    }

    fn polled_collectors(&self) -> Vec<(Arc<dyn Collector>, Duration)> {
        let schedule = &self.config.schedule;
        vec![
            (self.neighbors.clone() as Arc<dyn Collector>, schedule.neighbors_interval),
            (self.sockets.clone() as Arc<dyn Collector>, schedule.sockets_interval),
            (self.bluetooth.clone() as Arc<dyn Collector>, schedule.bluetooth_interval),
            (self.wifi.clone() as Arc<dyn Collector>, schedule.wifi_interval),
            (self.topology.clone() as Arc<dyn Collector>, schedule.topology_interval),
            (self.throughput.clone() as Arc<dyn Collector>, schedule.throughput_interval),
        ]
    }

    fn collector_by_name(&self, name: &str) -> Option<Arc<dyn Collector>> {
        let all: Vec<Arc<dyn Collector>> = vec![
            self.neighbors.clone(),
            self.sockets.clone(),
            self.bluetooth.clone(),
            self.wifi.clone(),
            self.topology.clone(),
            self.throughput.clone(),
            self.mdns.clone(),
        ];
        all.into_iter().find(|c| c.name() == name)
    }

    /// Run the engine until shutdown. This is the writer context: every
    /// store mutation and every publication happens inside this loop.
    pub async fn run(mut self) {
        self.seed_host();
        self.start_mdns();
        self.install_capture_hooks();
        self.spawn_schedulers();
        self.spawn_tick();
        self.spawn_initial_scan();

        let mut rx = self.rx.take().expect("run called once");
        while let Some(msg) = rx.recv().await {
            match msg {
                WriterMsg::Apply { source, result } => self.apply(source, result),
                WriterMsg::Tick => self.tick(),
                WriterMsg::TransportReady => {
                    self.transport_ready = true;
                    self.try_publish_initial();
                }
                WriterMsg::InitialScanDone => {
                    self.initial_scan_done = true;
                    tracing::info!("initial scan complete, {} entities", self.store.len());
                    self.try_publish_initial();
                }
                WriterMsg::FlushAggregates => self.flush_aggregates(),
                WriterMsg::ProbeCompleted { ip, result } => self.apply_probe(ip, result),
                WriterMsg::Control(control) => {
                    if self.handle_control(control) {
                        break;
                    }
                }
            }
        }

        self.cancel.cancel();
        self.pipeline.stop().await;
        tracing::info!("engine stopped");
    }

    /// Seed the Host entity from interface enumeration. An empty interface
    /// list is survivable; the Host just carries no address.
    fn seed_host(&mut self) {
        let interfaces = match net::interface::host_interfaces() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                tracing::warn!("interface enumeration failed: {}", e.concise());
                Vec::new()
            }
        };
        if interfaces.is_empty() {
            tracing::warn!("no non-loopback IPv4 interface found; host entity has no address");
        }
        let hostname = dns_lookup::get_hostname().unwrap_or_else(|_| "localhost".to_string());
        let mut host = Entity::observed(
            HOST_ID,
            SignalKind::Host {
                hostname: hostname.clone(),
                interfaces: interfaces.clone(),
            },
            hostname,
        );
        if let Some(first) = interfaces.first() {
            host.ip = Some(first.ipv4.clone());
            host.mac = first.mac.clone();
        }
        self.store.upsert(host, now_ms());
    }

    fn start_mdns(&self) {
        let (update_tx, mut update_rx) = mpsc::channel::<CollectorResult>(16);
        self.mdns.start(update_tx, self.cancel.child_token());
        let writer = self.tx.clone();
        tokio::spawn(async move {
            while let Some(result) = update_rx.recv().await {
                if writer
                    .send(WriterMsg::Apply {
                        source: "mdns",
                        result,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
    }

    fn install_capture_hooks(&self) {
        let publisher = Arc::clone(&self.publisher);
        let published_initial = Arc::clone(&self.published_initial);
        self.pipeline.set_event_sink(Box::new(move |event| {
            if published_initial.load(Ordering::Relaxed) {
                publisher.publish(&OutboundMessage::PacketEvent { event });
            }
        }));
        let writer = self.tx.clone();
        self.pipeline.set_flush_hook(Box::new(move || {
            let _ = writer.try_send(WriterMsg::FlushAggregates);
        }));
    }

    fn spawn_schedulers(&self) {
        for (collector, interval) in self.polled_collectors() {
            let writer = self.tx.clone();
            let paused = Arc::clone(&self.paused);
            let cancel = self.cancel.child_token();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                // The initial parallel scan covers the first run.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if paused.load(Ordering::Relaxed) {
                                continue;
                            }
                            let result = collector.scan().await;
                            let msg = WriterMsg::Apply { source: collector.name(), result };
                            if writer.send(msg).await.is_err() {
                                break;
                            }
                        }
                        _ = cancel.cancelled() => break,
                    }
                }
            });
        }
    }

    fn spawn_tick(&self) {
        let writer = self.tx.clone();
        let cancel = self.cancel.child_token();
        let interval = self.config.schedule.tick_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if writer.send(WriterMsg::Tick).await.is_err() {
                            break;
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }

    /// Run every polled collector once, in parallel, and report readiness
    /// when all results have been handed to the writer.
    fn spawn_initial_scan(&self) {
        let collectors = self.polled_collectors();
        let writer = self.tx.clone();
        tokio::spawn(async move {
            let mut tasks = Vec::new();
            for (collector, _) in collectors {
                let writer = writer.clone();
                tasks.push(tokio::spawn(async move {
                    let result = collector.scan().await;
                    let _ = writer
                        .send(WriterMsg::Apply {
                            source: collector.name(),
                            result,
                        })
                        .await;
                }));
            }
            for task in tasks {
                let _ = task.await;
            }
            let _ = writer.send(WriterMsg::InitialScanDone).await;
        });
    }

    fn host_ips(&self) -> Vec<String> {
        self.store
            .get(HOST_ID)
            .map(|host| match &host.kind {
                SignalKind::Host { interfaces, .. } => {
                    interfaces.iter().map(|i| i.ipv4.clone()).collect()
                }
                _ => Vec::new(),
            })
            .unwrap_or_default()
    }

    /// Post-scan sequence: apply, classify, refresh the capture index,
    /// publish topology, fingerprint, publish.
    fn apply(&mut self, source: &'static str, result: CollectorResult) {
        let now = now_ms();
        for entity in result.entities {
            self.store.upsert(entity, now);
        }
        for relation in result.relations {
            self.store.upsert_relation(relation);
        }

        if source == "topology" {
            self.refresh_host();
        }

        if source == "neighbors" || source == "mdns" {
            for (id, patch) in classify::classify(&self.store) {
                self.store.patch(&id, patch);
            }
        }

        if source == "neighbors" && self.pipeline.is_capturing() {
            self.refresh_capture_index();
        }

        if source == "topology" && self.published_initial.load(Ordering::Relaxed) {
            self.publisher.publish(&OutboundMessage::Topology {
                subnets: self.topology.subnets(),
                timestamp: now_ms(),
            });
        }

        self.run_fingerprinter();
        self.publish_update(Vec::new());
    }

    /// Re-enumerate host interfaces so address changes surface without a
    /// restart. The Host stays lifecycle-exempt either way.
    fn refresh_host(&mut self) {
        if let Ok(interfaces) = net::interface::host_interfaces() {
            if let Some(host) = self.store.get(HOST_ID) {
                let hostname = match &host.kind {
                    SignalKind::Host { hostname, .. } => hostname.clone(),
                    _ => return,
                };
                let mut refreshed = Entity::observed(
                    HOST_ID,
                    SignalKind::Host {
                        hostname: hostname.clone(),
                        interfaces: interfaces.clone(),
                    },
                    hostname,
                );
                if let Some(first) = interfaces.first() {
                    refreshed.ip = Some(first.ipv4.clone());
                    refreshed.mac = first.mac.clone();
                }
                self.store.upsert(refreshed, now_ms());
            }
        }
    }

    fn refresh_capture_index(&self) {
        self.pipeline
            .rebuild_index(self.store.iter_entities(), self.host_ips().into_iter());
    }

    fn run_fingerprinter(&mut self) {
        let pipeline = Arc::clone(&self.pipeline);
        let ttl_median = move |ip: &str| pipeline.ttl_median(ip);
        let ctx = os_inference::FingerprintContext {
            ttl_median: &ttl_median,
            probe_families: &self.probe_families,
        };
        let patches = os_inference::fingerprint(&self.store, &ctx);
        for (id, patch) in patches {
            self.store.patch(&id, patch);
        }
    }

    fn tick(&mut self) {
        let outcome = self.store.tick(now_ms(), &self.config.lifecycle);
        if !outcome.is_noop() {
            tracing::debug!(
                removed = outcome.removed.len(),
                "lifecycle tick changed state"
            );
            self.publish_update(outcome.removed);
        }
    }

    /// The enrich-protocols hook: refresh the index, patch aggregates onto
    /// entities through the lifecycle-safe path, publish when anything
    /// changed.
    fn flush_aggregates(&mut self) {
        self.refresh_capture_index();
        let aggregates = self.pipeline.aggregate_snapshot();
        if aggregates.is_empty() {
            return;
        }
        let targets: Vec<(String, EntityPatch)> = self
            .store
            .iter_entities()
            .filter_map(|entity| {
                let ip = entity.ip.as_deref()?;
                let (protocols, bytes, packets) = aggregates.get(ip)?;
                Some((
                    entity.id.clone(),
                    EntityPatch {
                        protocols: Some(protocols.clone()),
                        total_bytes: Some(*bytes),
                        total_packets: Some(*packets),
                        ..EntityPatch::default()
                    },
                ))
            })
            .collect();
        let mut changed = false;
        for (id, patch) in targets {
            changed |= self.store.patch(&id, patch);
        }
        if changed {
            self.publish_update(Vec::new());
        }
    }

    fn apply_probe(&mut self, ip: String, result: probe::ProbeResult) {
        self.probe_families.insert(ip.clone(), result.family.clone());
        let target = self
            .store
            .iter_entities()
            .find(|e| {
                matches!(e.kind, SignalKind::Lan { .. }) && e.ip.as_deref() == Some(ip.as_str())
            })
            .map(|e| e.id.clone());
        if let Some(id) = target {
            self.store.patch(
                &id,
                EntityPatch {
                    os_family: Some(result.family),
                    os_version: result.version,
                    os_fingerprint_confidence: Some(result.confidence),
                    ..EntityPatch::default()
                },
            );
            self.publish_update(Vec::new());
        }
    }

    fn try_publish_initial(&mut self) {
        if self.published_initial.load(Ordering::Relaxed)
            || !self.transport_ready
            || !self.initial_scan_done
        {
            return;
        }
        self.published_initial.store(true, Ordering::Relaxed);
        let full = self.compose_full_state();
        self.publisher.publish(&full);
        // Topology observed while the gate was closed follows the snapshot.
        let subnets = self.topology.subnets();
        if !subnets.is_empty() {
            self.publisher.publish(&OutboundMessage::Topology {
                subnets,
                timestamp: now_ms(),
            });
        }
    }

    fn publish_update(&mut self, removed: Vec<String>) {
        if !self.published_initial.load(Ordering::Relaxed) {
            return;
        }
        let (entities, relations) = self.enriched_snapshot();
        self.publisher.publish(&OutboundMessage::NodeUpdate {
            entities,
            relations,
            removed,
            timestamp: now_ms(),
        });
    }

    fn compose_full_state(&self) -> OutboundMessage {
        let (entities, relations) = self.enriched_snapshot();
        OutboundMessage::FullState {
            entities,
            relations,
            timestamp: now_ms(),
        }
    }

    /// Snapshot copies with throughput rates attached at the boundary.
    /// The store itself never carries rate fields.
    fn enriched_snapshot(&self) -> (Vec<Entity>, Vec<crate::model::Relation>) {
        let mut entities = self.store.entities();
        let mut relations = self.store.relations();
        let rates = self.throughput.rates();
        if rates.is_empty() {
            return (entities, relations);
        }
        for entity in &mut entities {
            if let Some(rate) = rates.get(&entity.id) {
                entity.bytes_per_sec = Some(rate.bytes_per_sec);
                entity.bytes_in_per_sec = Some(rate.bytes_in_per_sec);
                entity.bytes_out_per_sec = Some(rate.bytes_out_per_sec);
            }
        }
        for relation in &mut relations {
            let rate = rates
                .get(&relation.source)
                .or_else(|| rates.get(&relation.target));
            if let Some(rate) = rate {
                relation.bytes_per_sec = Some(rate.bytes_per_sec);
                relation.bytes_in_per_sec = Some(rate.bytes_in_per_sec);
                relation.bytes_out_per_sec = Some(rate.bytes_out_per_sec);
            }
        }
        (entities, relations)
    }

    /// Returns true when the engine should shut down.
    fn handle_control(&mut self, control: ControlMsg) -> bool {
        match control {
            ControlMsg::Pause => {
                self.paused.store(true, Ordering::Relaxed);
            }
            ControlMsg::Resume => {
                self.paused.store(false, Ordering::Relaxed);
            }
            ControlMsg::ScanNow { collector, reply } => {
                let outcome = self.dispatch_scan_now(collector);
                let _ = reply.send(outcome);
            }
            ControlMsg::FullState { reply } => {
                let _ = reply.send(self.compose_full_state());
            }
            ControlMsg::PacketStart { interface, reply } => {
                let pipeline = Arc::clone(&self.pipeline);
                let writer = self.tx.clone();
                tokio::spawn(async move {
                    let outcome = pipeline.start(interface).await;
                    if outcome.is_ok() {
                        // Capture start needs a fresh correlation index.
                        let _ = writer.try_send(WriterMsg::FlushAggregates);
                    }
                    let _ = reply.send(outcome);
                });
            }
            ControlMsg::PacketStop { reply } => {
                let pipeline = Arc::clone(&self.pipeline);
                tokio::spawn(async move {
                    pipeline.stop().await;
                    let _ = reply.send(());
                });
            }
            ControlMsg::PacketStatus { reply } => {
                let _ = reply.send(self.pipeline.status());
            }
            ControlMsg::PacketEvents { reply } => {
                let _ = reply.send(self.pipeline.events_snapshot());
            }
            ControlMsg::Probe { ip, reply } => {
                let writer = self.tx.clone();
                let deadline = self.config.timeouts.probe;
                tokio::spawn(async move {
                    match probe::run_probe(&ip, deadline).await {
                        Ok(result) => {
                            let _ = reply.send(ControlReply::NmapScan {
                                success: true,
                                ip: ip.clone(),
                                os_family: Some(result.family.clone()),
                                os_version: result.version.clone(),
                                confidence: Some(result.confidence),
                                error: None,
                            });
                            let _ = writer.send(WriterMsg::ProbeCompleted { ip, result }).await;
                        }
                        Err(e) => {
                            let _ = reply.send(ControlReply::NmapScan {
                                success: false,
                                ip,
                                os_family: None,
                                os_version: None,
                                confidence: None,
                                error: Some(e.concise()),
                            });
                        }
                    }
                });
            }
            ControlMsg::ProbeStatus { reply } => {
                let _ = reply.send(probe::probe_available());
            }
            ControlMsg::Shutdown => return true,
        }
        false
    }

    /// `scanNow` runs regardless of pause; unknown names surface an error.
    fn dispatch_scan_now(&self, collector: Option<String>) -> Result<(), String> {
        let targets: Vec<Arc<dyn Collector>> = match collector {
            Some(name) => match self.collector_by_name(&name) {
                Some(found) => vec![found],
                None => return Err(format!("unknown collector: {}", name)),
            },
            None => self
                .polled_collectors()
                .into_iter()
                .map(|(c, _)| c)
                .collect(),
        };
        for target in targets {
            let writer = self.tx.clone();
            tokio::spawn(async move {
                let result = target.scan().await;
                let _ = writer
                    .send(WriterMsg::Apply {
                        source: target.name(),
                        result,
                    })
                    .await;
            });
        }
        Ok(())
    }
}
