use thiserror::Error;

/// Error types for discovery, enrichment, and capture operations
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Vendor Database Error: {0}")]
    VendorDatabaseError(String),

    #[error("Command Error: {0}")]
    CommandError(String),

    #[error("Parse Error: {0}")]
    ParseError(String),

    #[error("Capture Error: {0}")]
    CaptureError(String),

    #[error("Probe Error: {0}")]
    ProbeError(String),

    #[error("I/O Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Network Interface Error: {0}")]
    NetworkInterfaceWrapped(#[from] network_interface::Error),

    #[error("Network Interface Error: {0}")]
    NetworkInterfaceCustom(String),

    #[error("Transport Error: {0}")]
    TransportError(String),

    #[error("Error: {0}")]
    Other(String),
}

impl DiscoveryError {
    /// One-line reason for a fail-closed collector log. Truncated so a
    /// runaway stderr dump cannot flood the log stream.
    pub fn concise(&self) -> String {
        let full = self.to_string();
        let mut line = full.lines().next().unwrap_or("").to_string();
        if line.len() > 200 {
            line.truncate(200);
            line.push('…');
        }
        line
    }
}
