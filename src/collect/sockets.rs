use super::{Collector, CollectorResult};
use crate::cmd;
use crate::config::CommandTimeouts;
use crate::constants::{service_name_for_port, HOST_ID};
use crate::model::{Entity, Relation, RelationKind, SignalKind};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Socket endpoint collector
///
/// Reads the socket table in field-coded form, resolves executable names for
/// the PIDs it saw, and assembles display names from a cached, non-blocking
/// reverse-DNS resolver. Resolutions started this scan surface on the next.
pub struct SocketCollector {
    sockets_timeout: Duration,
    resolved: Arc<Mutex<HashMap<String, Option<String>>>>,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl SocketCollector {
    pub fn new(timeouts: &CommandTimeouts) -> Self {
        Self {
            sockets_timeout: timeouts.sockets,
            resolved: Arc::new(Mutex::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    async fn scan_inner(&self) -> CollectorResult {
        let stdout = match cmd::run_complete(
            "lsof",
            &["-i", "-P", "-n", "-F", "cnPTs"],
            self.sockets_timeout,
        )
        .await
        {
            Ok(stdout) => stdout,
            Err(e) => {
                tracing::warn!(collector = "sockets", "{}", e.concise());
                return CollectorResult::default();
            }
        };

        let mut records = parse_socket_table(&stdout);

        // One executable-name lookup for the whole PID set; a differing
        // basename overrides the socket lister's truncated command name.
        let pids: Vec<u32> = {
            let mut set: Vec<u32> = records.iter().map(|r| r.pid).collect();
            set.sort_unstable();
            set.dedup();
            set
        };
        if !pids.is_empty() {
            let commands = executable_names(&pids).await;
            for record in &mut records {
                if let Some(resolved) = commands.get(&record.pid) {
                    if *resolved != record.process {
                        record.process = resolved.clone();
                    }
                }
            }
        }

        self.kick_off_resolutions(&records);

        let resolved = self.resolved.lock().unwrap().clone();
        let mut result = CollectorResult::default();
        let mut seen = HashSet::new();
        for record in records {
            let id = format!(
                "conn-{}-{}-{}-{}",
                record.protocol, record.remote_host, record.remote_port, record.process
            );
            if !seen.insert(id.clone()) {
                continue;
            }
            let resolved_hostname = resolved.get(&record.remote_host).cloned().flatten();
            let service_name =
                service_name_for_port(record.remote_port).map(str::to_string);
            let name = display_name(
                &record.process,
                &record.remote_host,
                record.remote_port,
                resolved_hostname.as_deref(),
            );

            let entity = Entity::observed(
                id.clone(),
                SignalKind::Socket {
                    protocol: record.protocol.clone(),
                    local_port: record.local_port,
                    remote_port: record.remote_port,
                    remote_host: record.remote_host.clone(),
                    state: record.state.clone(),
                    process_name: record.process.clone(),
                    resolved_hostname,
                    service_name,
                },
                name,
            )
            .with_ip(record.remote_host.clone());

            result
                .relations
                .push(Relation::link(id, HOST_ID, RelationKind::ConnectedTo));
            result.entities.push(entity);
        }
        result
    }

    /// Start an async reverse lookup for every remote host not yet cached
    /// and not already in flight. This scan uses whatever is cached.
    fn kick_off_resolutions(&self, records: &[SocketRecord]) {
        let mut hosts: Vec<String> = Vec::new();
        {
            let resolved = self.resolved.lock().unwrap();
            let mut pending = self.pending.lock().unwrap();
            for record in records {
                let host = &record.remote_host;
                if resolved.contains_key(host) || pending.contains(host) {
                    continue;
                }
                pending.insert(host.clone());
                hosts.push(host.clone());
            }
        }
        for host in hosts {
            let resolved = Arc::clone(&self.resolved);
            let pending = Arc::clone(&self.pending);
            tokio::spawn(async move {
                let outcome = match IpAddr::from_str(&host) {
                    Ok(ip) => {
                        tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip).ok())
                            .await
                            .unwrap_or(None)
                    }
                    Err(_) => None,
                };
                resolved.lock().unwrap().insert(host.clone(), outcome);
                pending.lock().unwrap().remove(&host);
            });
        }
    }
}

#[async_trait]
impl Collector for SocketCollector {
    fn name(&self) -> &'static str {
        "sockets"
    }

    async fn scan(&self) -> CollectorResult {
        self.scan_inner().await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SocketRecord {
    pub pid: u32,
    pub process: String,
    pub protocol: String,
    pub state: Option<String>,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

/// Parse `lsof -F cnPTs` output. Field character prefixes: `p` resets the
/// per-process block, `c` command, `P` protocol, `T` state (`ST=` variant
/// only), `n` connection name. State lines may trail the name line.
pub fn parse_socket_table(stdout: &str) -> Vec<SocketRecord> {
    let mut records: Vec<SocketRecord> = Vec::new();
    let mut pid: Option<u32> = None;
    let mut process = String::new();
    let mut protocol = String::new();
    let mut state: Option<String> = None;
    let mut last_emitted_for_file = false;

    for line in stdout.lines() {
        let mut chars = line.chars();
        let Some(field) = chars.next() else { continue };
        let value = chars.as_str();
        match field {
            'p' => {
                pid = value.parse().ok();
                process.clear();
                state = None;
                last_emitted_for_file = false;
            }
            'c' => process = value.to_string(),
            'f' => {
                state = None;
                last_emitted_for_file = false;
            }
            'P' => protocol = value.to_string(),
            'T' => {
                if let Some(st) = value.strip_prefix("ST=") {
                    if last_emitted_for_file {
                        if let Some(last) = records.last_mut() {
                            if last.state.is_none() {
                                last.state = Some(st.to_string());
                            }
                        }
                    } else {
                        state = Some(st.to_string());
                    }
                }
            }
            'n' => {
                let Some(pid) = pid else { continue };
                if let Some((local, remote)) = parse_connection_name(value) {
                    records.push(SocketRecord {
                        pid,
                        process: process.clone(),
                        protocol: protocol.clone(),
                        state: state.take(),
                        local_port: local.1,
                        remote_host: remote.0,
                        remote_port: remote.1,
                    });
                    last_emitted_for_file = true;
                } else {
                    last_emitted_for_file = false;
                }
            }
            _ => {}
        }
    }
    records
}

/// Split `local->remote` and extract host/port from each side. Loopback,
/// wildcard, and zero-port remotes are skipped.
fn parse_connection_name(name: &str) -> Option<((String, u16), (String, u16))> {
    let (local_raw, remote_raw) = name.split_once("->")?;
    let local = split_host_port(local_raw)?;
    let remote = split_host_port(remote_raw)?;
    if remote.1 == 0 || is_local_host(&remote.0) {
        return None;
    }
    Some((local, remote))
}

fn is_local_host(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "::1" | "localhost" | "*")
}

/// `192.168.1.2:443` or `[2601:db8::1]:443` → (host, port)
pub fn split_host_port(raw: &str) -> Option<(String, u16)> {
    if let Some(rest) = raw.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = after.strip_prefix(':')?.parse().ok()?;
        return Some((host.to_string(), port));
    }
    let (host, port) = raw.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

/// Resolve executable basenames for a PID set via one `ps` invocation.
async fn executable_names(pids: &[u32]) -> HashMap<u32, String> {
    let list = pids
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let stdout = match cmd::run_complete(
        "ps",
        &["-p", &list, "-o", "pid=,comm="],
        Duration::from_secs(5),
    )
    .await
    {
        Ok(stdout) => stdout,
        Err(e) => {
            tracing::debug!(collector = "sockets", "ps lookup failed: {}", e.concise());
            return HashMap::new();
        }
    };
    parse_executable_names(&stdout)
}

pub fn parse_executable_names(stdout: &str) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    for line in stdout.lines() {
        let trimmed = line.trim_start();
        let Some((pid_str, path)) = trimmed.split_once(char::is_whitespace) else {
            continue;
        };
        let Ok(pid) = pid_str.parse() else { continue };
        map.insert(pid, executable_basename(path.trim()));
    }
    map
}

/// `/Applications/Firefox.app/Contents/MacOS/firefox` → `Firefox`;
/// anything else → path basename.
pub fn executable_basename(path: &str) -> String {
    if let Some(idx) = path.find(".app/") {
        let bundle = &path[..idx];
        if let Some(name) = bundle.rsplit('/').next() {
            return name.to_string();
        }
    }
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// `example.co.uk` keeps three labels (ccTLD heuristic: second-to-last label
/// of three or fewer characters), everything else keeps two.
pub fn registrable_domain(host: &str) -> String {
    let trimmed = host.trim_end_matches('.');
    let labels: Vec<&str> = trimmed.split('.').collect();
    let keep = if labels.len() >= 3 && labels[labels.len() - 2].len() <= 3 {
        3
    } else {
        2.min(labels.len())
    };
    labels[labels.len() - keep..].join(".")
}

pub fn display_name(
    process: &str,
    remote_host: &str,
    remote_port: u16,
    resolved: Option<&str>,
) -> String {
    match resolved {
        Some(host) => {
            let short = registrable_domain(host);
            match service_name_for_port(remote_port) {
                Some(service) => format!("{} → {} ({})", process, short, service),
                None => format!("{} → {}:{}", process, short, remote_port),
            }
        }
        None => format!("{} → {}:{}", process, remote_host, remote_port),
    }
}
