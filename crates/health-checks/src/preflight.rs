//! Host preflight checks
//!
//! Disk space is evaluated from `df -Pk` output so the same code serves local
//! and remote hosts.

use command_executor::{RunOptions, Runner, shell_quote};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::DEFAULT_TIMEOUT;

/// Outcome of a preflight check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreflightCheck {
    /// Check name, e.g. `disk-root`
    pub name: String,
    /// Whether the requirement is met
    pub ok: bool,
    /// Human readable detail
    pub detail: String,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PreflightCheck {
    fn new(name: impl Into<String>, ok: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok,
            detail: detail.into(),
            error: None,
        }
    }

    fn failed(name: impl Into<String>, detail: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: false,
            detail: detail.into(),
            error: Some(error.into()),
        }
    }
}

/// Check name for a mount path: `disk-root` for `/`, else `disk-<path-with-dashes>`
pub fn disk_check_name(path: &str) -> String {
    if path == "/" {
        return "disk-root".to_string();
    }
    let clean = path.trim_start_matches('/');
    if clean.is_empty() {
        return "disk".to_string();
    }
    format!("disk-{}", clean.replace('/', "-"))
}

fn parse_df_kilobytes(output: &str) -> Result<(u64, u64), String> {
    let lines: Vec<&str> = output.trim().lines().collect();
    if lines.len() < 2 {
        return Err("expected df output with header and data".to_string());
    }
    let fields: Vec<&str> = lines[lines.len() - 1].split_whitespace().collect();
    if fields.len() < 5 {
        return Err("unexpected df output format".to_string());
    }
    let total_kb: u64 = fields[1]
        .parse()
        .map_err(|e| format!("invalid total size: {}", e))?;
    let avail_kb: u64 = fields[3]
        .parse()
        .map_err(|e| format!("invalid available size: {}", e))?;
    Ok((avail_kb * 1024, total_kb * 1024))
}

/// Render a byte count with 1024-based units and one decimal
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    const SUFFIXES: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];
    if bytes < UNIT {
        return format!("{}B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < SUFFIXES.len() - 1 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1}{}", bytes as f64 / div as f64, SUFFIXES[exp])
}

fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

fn evaluate_disk_space(
    name: String,
    free_bytes: u64,
    total_bytes: u64,
    min_free_bytes: u64,
    min_free_percent: f64,
) -> PreflightCheck {
    if total_bytes == 0 {
        return PreflightCheck::new(name, false, "disk total reported as 0");
    }

    let free_percent = free_bytes as f64 / total_bytes as f64 * 100.0;
    let meets_bytes = min_free_bytes == 0 || free_bytes >= min_free_bytes;
    let meets_percent = min_free_percent == 0.0 || free_percent >= min_free_percent;

    let mut detail = format!(
        "{} free ({} of {})",
        format_bytes(free_bytes),
        format_percent(free_percent),
        format_bytes(total_bytes)
    );
    if min_free_bytes > 0 || min_free_percent > 0.0 {
        detail = format!(
            "{} (min {}, {})",
            detail,
            format_bytes(min_free_bytes),
            format_percent(min_free_percent)
        );
    }
    PreflightCheck::new(name, meets_bytes && meets_percent, detail)
}

/// Evaluate free space from `df -Pk <path>` output
pub fn disk_space_from_df(
    output: &str,
    path: &str,
    min_free_bytes: u64,
    min_free_percent: f64,
) -> PreflightCheck {
    let name = disk_check_name(path);
    match parse_df_kilobytes(output) {
        Ok((free, total)) => evaluate_disk_space(name, free, total, min_free_bytes, min_free_percent),
        Err(e) => PreflightCheck::failed(name, "df parse failed", e),
    }
}

/// Run `df -Pk` through a runner and evaluate the result
pub async fn remote_disk_space(
    runner: &dyn Runner,
    path: &str,
    min_free_bytes: u64,
    min_free_percent: f64,
) -> PreflightCheck {
    let name = disk_check_name(path);
    let script = format!("df -Pk {}", shell_quote(path));
    debug!("Running '{}' on {}", script, runner.describe());

    match runner.run(&script, &RunOptions::with_timeout(DEFAULT_TIMEOUT)).await {
        Ok(out) if out.success() => {
            disk_space_from_df(&out.stdout, path, min_free_bytes, min_free_percent)
        }
        Ok(out) => PreflightCheck::failed(
            name,
            "df failed",
            format!("exit code {}: {}", out.exit_code(), out.stderr.trim()),
        ),
        Err(e) => PreflightCheck::failed(name, "df failed", e.to_string()),
    }
}
