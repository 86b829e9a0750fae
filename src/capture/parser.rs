/// Maximum stored length of the dissector's info column.
const INFO_MAX: usize = 80;

/// One parsed capture line, pre-attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPacket {
    pub timestamp_ms: i64,
    pub src: String,
    pub dst: String,
    pub protocol: String,
    pub length: u64,
    pub ttl: Option<u8>,
    pub info: String,
}

/// Parse one pipe-separated field line as emitted by the capture tool:
/// `epoch|ip.src|ip.dst|ipv6.src|ipv6.dst|protocol|frame.len|ip.ttl|info`.
///
/// IPv4 wins over IPv6 per side; a line missing either resolved side is
/// dropped, as is anything with fewer than seven fields (truncated writes
/// mid-kill produce those).
pub fn parse_line(line: &str) -> Option<ParsedPacket> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() < 7 {
        return None;
    }

    let timestamp_ms = (fields[0].trim().parse::<f64>().ok()? * 1000.0) as i64;
    let src = pick_address(fields[1], fields[3])?;
    let dst = pick_address(fields[2], fields[4])?;
    let protocol = fields[5].trim();
    let length: u64 = fields[6].trim().parse().ok()?;
    let ttl = fields
        .get(7)
        .and_then(|f| f.trim().parse::<u8>().ok());
    let info = fields.get(8).map(|f| truncate_info(f)).unwrap_or_default();

    Some(ParsedPacket {
        timestamp_ms,
        src: src.to_string(),
        dst: dst.to_string(),
        protocol: if protocol.is_empty() {
            "UNKNOWN".to_string()
        } else {
            protocol.to_string()
        },
        length,
        ttl,
        info,
    })
}

fn pick_address<'a>(v4: &'a str, v6: &'a str) -> Option<&'a str> {
    let v4 = v4.trim();
    if !v4.is_empty() {
        return Some(v4);
    }
    let v6 = v6.trim();
    if !v6.is_empty() {
        return Some(v6);
    }
    None
}

fn truncate_info(info: &str) -> String {
    let trimmed = info.trim();
    if trimmed.len() <= INFO_MAX {
        return trimmed.to_string();
    }
    let mut cut = INFO_MAX;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    trimmed[..cut].to_string()
}
