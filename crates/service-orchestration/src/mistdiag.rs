//! MistServer analyzer diagnostics
//!
//! Runs the `MistAnalyser*` binaries shipped with MistServer on an edge node,
//! either directly or inside the `mistserver` container.

use cluster_manifest::DeployMode;
use command_executor::{RunOptions, Runner, shell_quote};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::{Error, Result};

/// Analyzers that ship with MistServer
pub const KNOWN_ANALYZERS: &[&str] = &[
    "AV1", "DTSC", "EBML", "FLAC", "FLV", "H264", "HLS", "MP4", "OGG", "RIFF", "RTMP", "RTSP", "TS",
];

const ANALYZER_PREFIX: &str = "MistAnalyser";
const BIN_DIR: &str = "/usr/local/bin";
const MAX_DETAIL: u32 = 10;
const MAX_TIMEOUT_SECS: u32 = 300;
/// Extra time granted to the remote command beyond the analyzer's own timeout
const COMMAND_GRACE: Duration = Duration::from_secs(30);
/// Container name in docker mode
pub const MIST_CONTAINER: &str = "mistserver";

/// One analyzer invocation
#[derive(Debug, Clone, Default)]
pub struct AnalyzerOptions {
    /// Analyzer name, case-insensitive (`hls`, `TS`, ...)
    pub analyzer: String,
    /// URL, file path, or `-` for stdin
    pub target: String,
    /// Detail level, clamped to 0..=10
    pub detail: u32,
    /// Pass `-V`
    pub validate: bool,
    /// Analyzer timeout in seconds, 0 for none, clamped to 300
    pub timeout: u32,
}

/// Parsed analyzer run
#[derive(Debug, Clone, Default)]
pub struct AnalyzerResult {
    /// Analyzer exited 0
    pub ok: bool,
    /// stdout followed by stderr
    pub output: String,
    /// Lines reporting errors
    pub errors: Vec<String>,
    /// Lines reporting warnings
    pub warnings: Vec<String>,
    /// Exit code, -1 when killed by a signal
    pub exit_code: i32,
    /// Wall time including the remote round trip
    pub duration: Duration,
}

/// Error and warning lines of analyzer output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    /// Lines mentioning error, fail or invalid
    pub errors: Vec<String>,
    /// Lines mentioning warn
    pub warnings: Vec<String>,
}

/// Collect lines that mention errors or warnings
pub fn parse_output(stdout: &str, stderr: &str) -> ParsedOutput {
    let mut parsed = ParsedOutput::default();
    for line in stdout.lines().chain(stderr.lines()) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let lower = line.to_ascii_lowercase();
        if lower.contains("error") || lower.contains("fail") || lower.contains("invalid") {
            parsed.errors.push(line.to_string());
        } else if lower.contains("warn") {
            parsed.warnings.push(line.to_string());
        }
    }
    parsed
}

/// Canonical casing of a known analyzer name, or the input unchanged
pub fn normalize_analyzer_name(name: &str) -> String {
    KNOWN_ANALYZERS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(name))
        .map(|known| known.to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Reject names that are not known analyzers
pub fn validate_analyzer_name(name: &str) -> Result<()> {
    if KNOWN_ANALYZERS.iter().any(|known| known.eq_ignore_ascii_case(name)) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "unknown analyzer \"{}\" (known: {})",
            name,
            KNOWN_ANALYZERS.join(", ")
        )))
    }
}

/// Runs analyzers on one node
pub struct AnalyzerRunner {
    runner: Arc<dyn Runner>,
    mode: DeployMode,
    container: String,
}

impl AnalyzerRunner {
    /// Runner for a node deployed in `mode`
    pub fn new(runner: Arc<dyn Runner>, mode: DeployMode) -> Self {
        Self {
            runner,
            mode,
            container: MIST_CONTAINER.to_string(),
        }
    }

    /// Prefix with `docker exec` in docker mode
    pub fn wrap_command(&self, cmd: &str) -> String {
        match self.mode {
            DeployMode::Docker => format!(
                "docker exec {} sh -c {}",
                shell_quote(&self.container),
                shell_quote(cmd)
            ),
            DeployMode::Native => cmd.to_string(),
        }
    }

    /// Shell line for an invocation
    pub fn build_command(&self, opts: &AnalyzerOptions) -> String {
        let mut parts = vec![format!(
            "{}/{}{}",
            BIN_DIR,
            ANALYZER_PREFIX,
            normalize_analyzer_name(&opts.analyzer)
        )];
        parts.push(format!("--detail {}", opts.detail.min(MAX_DETAIL)));
        if opts.validate {
            parts.push("-V".to_string());
        }
        let timeout = opts.timeout.min(MAX_TIMEOUT_SECS);
        if timeout > 0 {
            parts.push(format!("--timeout {}", timeout));
        }
        if !opts.target.is_empty() && opts.target != "-" {
            parts.push(shell_quote(&opts.target));
        }
        self.wrap_command(&parts.join(" "))
    }

    /// Analyzer names installed on the node
    pub async fn available(&self) -> Result<Vec<String>> {
        let cmd = self.wrap_command(&format!("ls {}/{}* 2>/dev/null", BIN_DIR, ANALYZER_PREFIX));
        let output = self
            .runner
            .run(&cmd, &RunOptions::with_timeout(COMMAND_GRACE))
            .await?;

        Ok(output
            .stdout
            .lines()
            .filter_map(|line| line.trim().rsplit('/').next())
            .filter_map(|base| base.strip_prefix(ANALYZER_PREFIX))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Run an analyzer and parse its output
    pub async fn run(&self, opts: &AnalyzerOptions) -> Result<AnalyzerResult> {
        validate_analyzer_name(&opts.analyzer)?;
        let cmd = self.build_command(opts);
        let deadline = Duration::from_secs(u64::from(opts.timeout.min(MAX_TIMEOUT_SECS))) + COMMAND_GRACE;

        info!("Running {} analyzer on {}", normalize_analyzer_name(&opts.analyzer), self.runner.describe());
        debug!("{}", cmd);
        let started = Instant::now();
        let output = self
            .runner
            .run(&cmd, &RunOptions::with_timeout(deadline))
            .await
            .map_err(|e| Error::execution(format!("analyzer execution failed: {}", e)))?;

        let parsed = parse_output(&output.stdout, &output.stderr);
        let mut text = output.stdout.clone();
        if !output.stderr.is_empty() {
            text.push('\n');
            text.push_str(&output.stderr);
        }
        Ok(AnalyzerResult {
            ok: output.success(),
            output: text,
            errors: parsed.errors,
            warnings: parsed.warnings,
            exit_code: output.exit_code(),
            duration: started.elapsed(),
        })
    }

    /// Run an analyzer in validation mode at detail level 2
    pub async fn validate(&self, analyzer: &str, target: &str, timeout: u32) -> Result<AnalyzerResult> {
        self.run(&AnalyzerOptions {
            analyzer: analyzer.to_string(),
            target: target.to_string(),
            detail: 2,
            validate: true,
            timeout,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use command_executor::{Command, CommandOutput, ExitStatus};
    use std::sync::Mutex;

    struct ScriptedRunner {
        stdout: &'static str,
        stderr: &'static str,
        code: i32,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new(stdout: &'static str, stderr: &'static str, code: i32) -> Arc<Self> {
            Arc::new(Self {
                stdout,
                stderr,
                code,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Runner for ScriptedRunner {
        async fn run_command(
            &self,
            _command: &Command,
            _opts: &RunOptions,
        ) -> command_executor::Result<CommandOutput> {
            unreachable!("analyzers run through Runner::run")
        }

        async fn run(&self, script: &str, _opts: &RunOptions) -> command_executor::Result<CommandOutput> {
            self.seen.lock().unwrap().push(script.to_string());
            Ok(CommandOutput {
                status: ExitStatus {
                    code: Some(self.code),
                    signal: None,
                },
                stdout: self.stdout.to_string(),
                stderr: self.stderr.to_string(),
                duration: Duration::ZERO,
            })
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    fn runner(mode: DeployMode) -> AnalyzerRunner {
        AnalyzerRunner::new(ScriptedRunner::new("", "", 0), mode)
    }

    #[test]
    fn test_validate_analyzer_name() {
        for ok in ["HLS", "hls", "TS", "RTMP", "H264"] {
            assert!(validate_analyzer_name(ok).is_ok(), "{}", ok);
        }
        for bad in ["unknown", "", "../evil"] {
            assert!(validate_analyzer_name(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_normalize_analyzer_name() {
        assert_eq!(normalize_analyzer_name("hls"), "HLS");
        assert_eq!(normalize_analyzer_name("h264"), "H264");
        assert_eq!(normalize_analyzer_name("rtmp"), "RTMP");
        assert_eq!(normalize_analyzer_name("unknown"), "unknown");
    }

    #[test]
    fn test_build_command_docker() {
        let cmd = runner(DeployMode::Docker).build_command(&AnalyzerOptions {
            analyzer: "hls".into(),
            target: "http://localhost:8080/hls/live/index.m3u8".into(),
            detail: 2,
            validate: true,
            timeout: 10,
        });
        assert_eq!(
            cmd,
            "docker exec mistserver sh -c '/usr/local/bin/MistAnalyserHLS --detail 2 -V --timeout 10 \
             http://localhost:8080/hls/live/index.m3u8'"
        );
    }

    #[test]
    fn test_build_command_native() {
        let cmd = runner(DeployMode::Native).build_command(&AnalyzerOptions {
            analyzer: "TS".into(),
            target: "/tmp/recording.ts".into(),
            detail: 5,
            ..Default::default()
        });
        assert_eq!(cmd, "/usr/local/bin/MistAnalyserTS --detail 5 /tmp/recording.ts");
    }

    #[test]
    fn test_build_command_clamps() {
        let cmd = runner(DeployMode::Native).build_command(&AnalyzerOptions {
            analyzer: "HLS".into(),
            target: "-".into(),
            detail: 99,
            timeout: 999,
            ..Default::default()
        });
        assert_eq!(cmd, "/usr/local/bin/MistAnalyserHLS --detail 10 --timeout 300");
    }

    #[test]
    fn test_parse_output() {
        let parsed = parse_output(
            "Segment 1 ok\nWARNING: discontinuity at 12.0s\n",
            "Error: invalid PES header\n",
        );
        assert_eq!(parsed.warnings, vec!["WARNING: discontinuity at 12.0s"]);
        assert_eq!(parsed.errors, vec!["Error: invalid PES header"]);
    }

    #[tokio::test]
    async fn test_available_parses_listing() {
        let scripted = ScriptedRunner::new(
            "/usr/local/bin/MistAnalyserHLS\n/usr/local/bin/MistAnalyserTS\n/usr/local/bin/MistAnalyserRTMP\n",
            "",
            0,
        );
        let analyzers = AnalyzerRunner::new(scripted.clone(), DeployMode::Docker);
        assert_eq!(analyzers.available().await.unwrap(), vec!["HLS", "TS", "RTMP"]);
        assert_eq!(
            scripted.seen.lock().unwrap()[0],
            "docker exec mistserver sh -c 'ls /usr/local/bin/MistAnalyser* 2>/dev/null'"
        );
    }

    #[tokio::test]
    async fn test_run_rejects_unknown_and_reports_exit() {
        let scripted = ScriptedRunner::new("", "Error: stream not found", 1);
        let analyzers = AnalyzerRunner::new(scripted.clone(), DeployMode::Native);
        assert!(analyzers.validate("bogus", "x", 5).await.is_err());
        assert!(scripted.seen.lock().unwrap().is_empty());

        let result = analyzers.validate("hls", "http://edge/live.m3u8", 5).await.unwrap();
        assert!(!result.ok);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.errors, vec!["Error: stream not found"]);
        assert!(scripted.seen.lock().unwrap()[0].contains("--detail 2 -V --timeout 5"));
    }
}
