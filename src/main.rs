use clap::Parser;
use netscope::transport::{ControlReply, ControlRequest, JsonLinePublisher, OutboundMessage};
use netscope::{Engine, EngineConfig, EngineHandle};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Continuous network environment discovery, publishing line-delimited JSON
/// snapshots on stdout and accepting control requests on stdin.
#[derive(Parser, Debug)]
#[command(name = "netscope", version, about)]
struct Args {
    /// Log filter (tracing EnvFilter syntax), e.g. "info" or "netscope=debug"
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let engine = Engine::new(EngineConfig::default(), Arc::new(JsonLinePublisher))?;
    let handle = engine.handle();
    let runner = tokio::spawn(engine.run());

    // stdout is always ready to accept publications.
    handle.transport_ready().await;

    let control = handle.clone();
    let stdin_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ControlRequest>(&line) {
                Ok(request) => {
                    if let Some(reply) = dispatch(&control, request).await {
                        print_reply(&reply);
                    }
                }
                Err(e) => print_reply(&ControlReply::Error {
                    message: format!("bad request: {}", e),
                }),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    handle.shutdown().await;
    stdin_task.abort();
    let _ = runner.await;
    Ok(())
}

async fn dispatch(handle: &EngineHandle, request: ControlRequest) -> Option<ControlReply> {
    match request {
        ControlRequest::Pause => {
            handle.pause().await;
            Some(ControlReply::Ack { ok: true })
        }
        ControlRequest::Resume => {
            handle.resume().await;
            Some(ControlReply::Ack { ok: true })
        }
        ControlRequest::ScanNow { collector } => match handle.scan_now(collector).await {
            Ok(()) => Some(ControlReply::Ack { ok: true }),
            Err(message) => Some(ControlReply::Error { message }),
        },
        ControlRequest::GetFullState => {
            if let Some(full) = handle.full_state().await {
                print_message(&full);
            }
            None
        }
        ControlRequest::PacketStart { interface } => {
            let reply = match handle.packet_start(interface).await {
                Ok(_) => ControlReply::PacketStart {
                    success: true,
                    error: None,
                },
                Err(error) => ControlReply::PacketStart {
                    success: false,
                    error: Some(error),
                },
            };
            Some(reply)
        }
        ControlRequest::PacketStop => {
            handle.packet_stop().await;
            Some(ControlReply::Ack { ok: true })
        }
        ControlRequest::PacketStatus => handle.packet_status().await.map(|status| {
            ControlReply::PacketStatus {
                available: status.available,
                has_permission: status.has_permission,
                capturing: status.capturing,
                interface: status.interface,
                interfaces: status.interfaces,
                error: status.error,
            }
        }),
        ControlRequest::PacketGetEvents => Some(ControlReply::PacketEvents {
            events: handle.packet_events().await,
        }),
        ControlRequest::NmapScan { ip } => Some(handle.nmap_scan(ip).await),
        ControlRequest::NmapStatus => Some(ControlReply::NmapStatus {
            available: handle.nmap_status().await,
        }),
    }
}

fn print_message(message: &OutboundMessage) {
    if let Ok(line) = serde_json::to_string(message) {
        println!("{}", line);
    }
}

fn print_reply(reply: &ControlReply) {
    if let Ok(line) = serde_json::to_string(reply) {
        println!("{}", line);
    }
}
