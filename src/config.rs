use std::time::Duration;

/// Scheduling intervals for the polled collectors and the lifecycle tick.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub neighbors_interval: Duration,
    pub sockets_interval: Duration,
    pub bluetooth_interval: Duration,
    pub wifi_interval: Duration,
    pub topology_interval: Duration,
    pub throughput_interval: Duration,
    pub tick_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            neighbors_interval: Duration::from_secs(5),
            sockets_interval: Duration::from_secs(3),
            bluetooth_interval: Duration::from_secs(8),
            wifi_interval: Duration::from_secs(10),
            topology_interval: Duration::from_secs(30),
            throughput_interval: Duration::from_secs(3),
            tick_interval: Duration::from_secs(5),
        }
    }
}

/// Age thresholds driving entity lifecycle transitions.
///
/// Ages are computed against `lastSeen`; an entity past `remove` is deleted
/// together with every relation that references it.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleConfig {
    pub stale_after: Duration,
    pub expired_after: Duration,
    pub remove_after: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            expired_after: Duration::from_secs(60),
            remove_after: Duration::from_secs(90),
        }
    }
}

/// Per-command hard deadlines.
#[derive(Debug, Clone, Copy)]
pub struct CommandTimeouts {
    pub neighbor_table: Duration,
    pub profiler: Duration,
    pub sockets: Duration,
    pub routing_table: Duration,
    pub throughput: Duration,
    pub dynamic_mdns: Duration,
    pub probe: Duration,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            neighbor_table: Duration::from_secs(5),
            profiler: Duration::from_secs(15),
            sockets: Duration::from_secs(10),
            routing_table: Duration::from_secs(5),
            throughput: Duration::from_secs(10),
            dynamic_mdns: Duration::from_secs(5),
            probe: Duration::from_secs(15),
        }
    }
}

/// Packet pipeline tunables.
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Maximum events retained in the ring buffer.
    pub ring_capacity: usize,
    /// Maximum events handed to the consumer per drain tick.
    pub drain_batch: usize,
    pub drain_interval: Duration,
    pub flush_interval: Duration,
    /// Grace period between termination and hard kill.
    pub kill_grace: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 10_000,
            drain_batch: 10,
            drain_interval: Duration::from_millis(100),
            flush_interval: Duration::from_secs(2),
            kill_grace: Duration::from_secs(2),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub schedule: ScheduleConfig,
    pub lifecycle: LifecycleConfig,
    pub timeouts: CommandTimeouts,
    pub capture: CaptureConfig,
}
