use super::{Collector, CollectorResult};
use crate::cmd;
use crate::config::CommandTimeouts;
use crate::model::{now_ms, Millis};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-key throughput rates derived from two consecutive byte samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    pub bytes_per_sec: f64,
    pub bytes_in_per_sec: f64,
    pub bytes_out_per_sec: f64,
}

/// Previous-sample state. Keys follow the socket collector's id scheme so
/// the publish boundary can match rates onto entities and relations.
#[derive(Debug, Default)]
struct RateState {
    prev_sample: HashMap<String, (u64, u64)>,
    prev_ts: Option<Millis>,
    rates: HashMap<String, Rate>,
}

/// Throughput collector
///
/// Samples the per-connection byte counter and keeps a rate map on the side.
/// Rates are never written to the store; they would be clobbered by the next
/// socket scan. The engine reads them at the publish boundary.
pub struct ThroughputCollector {
    sample_timeout: Duration,
    state: Arc<Mutex<RateState>>,
}

impl ThroughputCollector {
    pub fn new(timeouts: &CommandTimeouts) -> Self {
        Self {
            sample_timeout: timeouts.throughput,
            state: Arc::new(Mutex::new(RateState::default())),
        }
    }

    /// Snapshot of the current rate map.
    pub fn rates(&self) -> HashMap<String, Rate> {
        self.state.lock().unwrap().rates.clone()
    }

    async fn scan_inner(&self) -> CollectorResult {
        let stdout = match cmd::run_complete(
            "nettop",
            &["-m", "tcp", "-L", "1", "-J", "bytes_in,bytes_out", "-n", "-x"],
            self.sample_timeout,
        )
        .await
        {
            Ok(stdout) => stdout,
            Err(e) => {
                tracing::warn!(collector = "throughput", "{}", e.concise());
                return CollectorResult::default();
            }
        };

        let sample = parse_byte_sample(&stdout);
        let now = now_ms();
        let mut state = self.state.lock().unwrap();
        state.rates = compute_rates(&state.prev_sample, state.prev_ts, &sample, now);
        state.prev_sample = sample;
        state.prev_ts = Some(now);
        CollectorResult::default()
    }
}

#[async_trait]
impl Collector for ThroughputCollector {
    fn name(&self) -> &'static str {
        "throughput"
    }

    async fn scan(&self) -> CollectorResult {
        self.scan_inner().await
    }
}

/// Parse one nettop CSV sample into `key → (bytes_in, bytes_out)`.
///
/// Process rows (`name.pid`) set the current process; connection rows carry
/// `local<->remote` in the key field. Keys match the socket collector's
/// `conn-TCP-{host}-{port}-{process}` scheme.
pub fn parse_byte_sample(stdout: &str) -> HashMap<String, (u64, u64)> {
    let mut sample = HashMap::new();
    let mut current_process = String::new();

    for line in stdout.lines() {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 4 {
            continue;
        }
        let key_field = fields[1].trim();
        if key_field.is_empty() {
            continue;
        }

        if key_field.contains("<->") || key_field.contains("->") {
            let Some((host, port)) = remote_endpoint(key_field) else {
                continue;
            };
            if host == "127.0.0.1" || host == "::1" {
                continue;
            }
            let bytes_in: u64 = fields[2].trim().parse().unwrap_or(0);
            let bytes_out: u64 = fields[3].trim().parse().unwrap_or(0);
            let key = format!("conn-TCP-{}-{}-{}", host, port, current_process);
            sample.insert(key, (bytes_in, bytes_out));
        } else if let Some(name) = strip_pid_suffix(key_field) {
            current_process = name.to_string();
        }
    }
    sample
}

/// `firefox.123` → `firefox`; rows without a trailing `.digits` are not
/// process rows.
pub fn strip_pid_suffix(key: &str) -> Option<&str> {
    let (name, pid) = key.rsplit_once('.')?;
    if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) || name.is_empty() {
        return None;
    }
    Some(name)
}

/// Remote host/port from a connection key like
/// `tcp4 192.168.1.2:54321<->142.250.80.46:443`.
fn remote_endpoint(key: &str) -> Option<(String, u16)> {
    let remote = key
        .split_once("<->")
        .or_else(|| key.split_once("->"))
        .map(|(_, r)| r.trim())?;
    super::sockets::split_host_port(remote)
}

/// Rates for keys present in both samples; only positive totals publish.
pub fn compute_rates(
    prev: &HashMap<String, (u64, u64)>,
    prev_ts: Option<Millis>,
    curr: &HashMap<String, (u64, u64)>,
    now: Millis,
) -> HashMap<String, Rate> {
    let Some(prev_ts) = prev_ts else {
        return HashMap::new();
    };
    let elapsed = (now - prev_ts) as f64 / 1000.0;
    if elapsed <= 0.0 {
        return HashMap::new();
    }

    let mut rates = HashMap::new();
    for (key, (curr_in, curr_out)) in curr {
        let Some((prev_in, prev_out)) = prev.get(key) else {
            continue;
        };
        let in_rate = curr_in.saturating_sub(*prev_in) as f64 / elapsed;
        let out_rate = curr_out.saturating_sub(*prev_out) as f64 / elapsed;
        let total = in_rate + out_rate;
        if total > 0.0 {
            rates.insert(
                key.clone(),
                Rate {
                    bytes_per_sec: total,
                    bytes_in_per_sec: in_rate,
                    bytes_out_per_sec: out_rate,
                },
            );
        }
    }
    rates
}
