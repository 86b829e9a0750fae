use crate::cmd;
use crate::errors::DiscoveryError;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

const VERSION_MAX: usize = 80;

/// Outcome of one on-demand OS detection probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub family: String,
    pub version: Option<String>,
    pub confidence: f64,
}

/// Family matchers, tried in order against the detection line.
static FAMILY_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("windows", r"windows"),
        ("macos", r"mac os|macos|os x|darwin"),
        ("ios", r"\bios\b|iphone|ipad"),
        ("android", r"android"),
        ("freebsd", r"freebsd"),
        ("linux", r"linux"),
    ]
    .into_iter()
    .filter_map(|(family, pattern)| {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .ok()
            .map(|re| (family, re))
    })
    .collect()
});

static DETAIL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:OS details:|Running(?: \(JUST GUESSING\))?:)\s*(.+)$").expect("valid pattern")
});

static PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d+)%\)").expect("valid pattern"));

/// Whether the probe tool is on PATH.
pub fn probe_available() -> bool {
    std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).any(|dir| dir.join("nmap").is_file()))
        .unwrap_or(false)
}

/// Run one OS detection probe against `ip`. Never patches anything itself;
/// the caller decides what to do with the result.
pub async fn run_probe(ip: &str, deadline: Duration) -> Result<ProbeResult, DiscoveryError> {
    let parsed = IpAddr::from_str(ip)
        .map_err(|_| DiscoveryError::ProbeError(format!("not an IP address: {}", ip)))?;
    let target = parsed.to_string();

    let stdout = cmd::run_complete(
        "nmap",
        &[
            "-O",
            "--osscan-guess",
            "-T4",
            "--max-os-tries",
            "1",
            "-n",
            &target,
        ],
        deadline,
    )
    .await?;

    parse_probe_output(&stdout)
        .ok_or_else(|| DiscoveryError::ProbeError(format!("no OS match for {}", target)))
}

/// Take the first `OS details:` or `Running(: JUST GUESSING)?` line; family
/// is the first matching pattern, confidence comes from a `(NN%)` suffix or
/// defaults to 0.9, version is the first comma-delimited entry.
pub fn parse_probe_output(stdout: &str) -> Option<ProbeResult> {
    let detail = stdout
        .lines()
        .find_map(|line| DETAIL_LINE.captures(line.trim()))
        .map(|caps| caps[1].to_string())?;

    let family = FAMILY_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(&detail))
        .map(|(family, _)| (*family).to_string())?;

    let confidence = PERCENT
        .captures(&detail)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(|pct| pct / 100.0)
        .unwrap_or(0.9);

    let version = detail.split(',').next().map(|first| {
        let mut cleaned = PERCENT.replace_all(first, "").trim().to_string();
        if cleaned.len() > VERSION_MAX {
            let mut cut = VERSION_MAX;
            while !cleaned.is_char_boundary(cut) {
                cut -= 1;
            }
            cleaned.truncate(cut);
        }
        cleaned
    });

    Some(ProbeResult {
        family,
        version,
        confidence,
    })
}
