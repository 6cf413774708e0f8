//! Vector tile generation via an external tippecanoe process.
//!
//! The binary is an opaque collaborator: we build a fixed argument list,
//! run it once, and hand back its exit status and captured output. No
//! retries and no interpretation of what tippecanoe prints.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::TileError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulateRule {
    pub attribute: String,
    pub operation: String,
}

impl AccumulateRule {
    fn new(attribute: &str, operation: &str) -> Self {
        AccumulateRule {
            attribute: attribute.to_string(),
            operation: operation.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingOptions {
    pub binary: String,
    pub output: PathBuf,
    pub layer: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Pixels.
    pub cluster_distance: u32,
    pub simplification: u32,
    pub max_tile_bytes: u64,
    pub accumulate: Vec<AccumulateRule>,
    pub id_attribute: String,
    /// Unset means wait for tippecanoe indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for TilingOptions {
    fn default() -> Self {
        TilingOptions {
            binary: "tippecanoe".to_string(),
            output: PathBuf::from("property_sales.mbtiles"),
            layer: "property_sales".to_string(),
            min_zoom: 4,
            max_zoom: 14,
            cluster_distance: 50,
            simplification: 10,
            max_tile_bytes: 5_000_000,
            accumulate: vec![
                AccumulateRule::new("price", "sum"),
                AccumulateRule::new("date", "comma"),
            ],
            id_attribute: "date".to_string(),
            timeout_secs: None,
        }
    }
}

/// Flags that never vary: the dataset is points only, and tile/feature
/// limits are lifted in favour of dropping the densest features.
const FIXED_FLAGS: [&str; 8] = [
    "--drop-densest-as-needed",
    "--extend-zooms-if-still-dropping",
    "--force",
    "--no-tile-size-limit",
    "--no-feature-limit",
    "--no-line-simplification",
    "--no-tiny-polygon-reduction",
    "--read-parallel",
];

impl TilingOptions {
    pub fn args(&self, input: &Path) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            self.output.display().to_string(),
            "-l".to_string(),
            self.layer.clone(),
        ];
        args.extend(FIXED_FLAGS.iter().map(|f| f.to_string()));
        args.push(format!("--minimum-zoom={}", self.min_zoom));
        args.push(format!("--maximum-zoom={}", self.max_zoom));
        args.push(format!("--cluster-distance={}", self.cluster_distance));
        args.push(format!("--simplification={}", self.simplification));
        for rule in &self.accumulate {
            args.push(format!(
                "--accumulate-attribute={}:{}",
                rule.attribute, rule.operation
            ));
        }
        args.push(format!("--maximum-tile-bytes={}", self.max_tile_bytes));
        args.push(format!("--use-attribute-for-id={}", self.id_attribute));
        args.push(input.display().to_string());
        args
    }

    pub fn command_line(&self, input: &Path) -> String {
        std::iter::once(self.binary.clone())
            .chain(self.args(input))
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an external program to completion.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput, TileError>;
}

#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        ProcessExecutor { timeout }
    }
}

/// How long to wait for the pipes to close after a timed-out child is killed.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            // A read error ends the capture; whatever arrived is kept.
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn collect(task: JoinHandle<Vec<u8>>, grace: Option<Duration>) -> String {
    let bytes = match grace {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => Vec::new(),
        },
        None => task.await.unwrap_or_default(),
    };
    String::from_utf8_lossy(&bytes).into_owned()
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput, TileError> {
        let spawn_err = |source: std::io::Error| TileError::Spawn {
            program: program.to_string(),
            source,
        };
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, program, "failed to kill timed-out process");
                    }
                    return Err(TileError::TimedOut {
                        program: program.to_string(),
                        secs: limit.as_secs(),
                        stdout: collect(stdout, Some(DRAIN_GRACE)).await,
                        stderr: collect(stderr, Some(DRAIN_GRACE)).await,
                    });
                }
            },
            None => child.wait().await,
        }
        .map_err(spawn_err)?;

        Ok(CommandOutput {
            code: status.code(),
            stdout: collect(stdout, None).await,
            stderr: collect(stderr, None).await,
        })
    }
}

/// Run tippecanoe over `input`. A non-zero exit is an error carrying the
/// full captured output.
pub async fn generate_tiles(
    executor: &dyn CommandExecutor,
    options: &TilingOptions,
    input: &Path,
) -> Result<CommandOutput, TileError> {
    let args = options.args(input);
    info!(command = %options.command_line(input), "generating tiles");

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("{} -> {}", options.binary, options.output.display()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = executor.execute(&options.binary, &args).await;
    spinner.finish_and_clear();

    let output = result?;
    if !output.success() {
        error!(code = ?output.code, stderr = %output.stderr, "tile generation failed");
        return Err(TileError::Failed {
            program: options.binary.clone(),
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    info!(output = ?options.output, "tiles written");
    Ok(output)
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingExecutor;
    use super::*;

    fn expected_args() -> Vec<&'static str> {
        vec![
            "-o",
            "property_sales.mbtiles",
            "-l",
            "property_sales",
            "--drop-densest-as-needed",
            "--extend-zooms-if-still-dropping",
            "--force",
            "--no-tile-size-limit",
            "--no-feature-limit",
            "--no-line-simplification",
            "--no-tiny-polygon-reduction",
            "--read-parallel",
            "--minimum-zoom=4",
            "--maximum-zoom=14",
            "--cluster-distance=50",
            "--simplification=10",
            "--accumulate-attribute=price:sum",
            "--accumulate-attribute=date:comma",
            "--maximum-tile-bytes=5000000",
            "--use-attribute-for-id=date",
            "property_sales.geojson",
        ]
    }

    #[test]
    fn default_arguments_match_documented_set() {
        let args = TilingOptions::default().args(Path::new("property_sales.geojson"));
        assert_eq!(args, expected_args());
    }

    #[test]
    fn command_line_starts_with_binary() {
        let line = TilingOptions::default().command_line(Path::new("in.geojson"));
        assert!(line.starts_with("tippecanoe -o property_sales.mbtiles -l property_sales "));
        assert!(line.ends_with(" in.geojson"));
    }

    #[tokio::test]
    async fn executor_receives_fixed_invocation() {
        let exec = RecordingExecutor::exiting_with(0, "ok", "");
        let out = generate_tiles(
            &exec,
            &TilingOptions::default(),
            Path::new("property_sales.geojson"),
        )
        .await
        .unwrap();
        assert!(out.success());

        let calls = exec.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "tippecanoe");
        assert_eq!(calls[0].1, expected_args());
    }

    #[tokio::test]
    async fn non_zero_exit_carries_captured_output() {
        let exec = RecordingExecutor::exiting_with(101, "partial", "tile too big");
        let err = generate_tiles(&exec, &TilingOptions::default(), Path::new("x.geojson"))
            .await
            .unwrap_err();
        match &err {
            TileError::Failed {
                code,
                stdout,
                stderr,
                ..
            } => {
                assert_eq!(*code, Some(101));
                assert_eq!(stdout, "partial");
                assert_eq!(stderr, "tile too big");
            }
            other => panic!("unexpected error {other:?}"),
        }
        let msg = err.to_string();
        assert!(msg.contains("status 101"));
        assert!(msg.contains("tile too big"));
        // No retry.
        assert_eq!(exec.calls().len(), 1);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let exec = ProcessExecutor::new(None);
        let err = exec
            .execute("definitely-not-a-real-tippecanoe-binary", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, TileError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_executor_captures_output() {
        let exec = ProcessExecutor::new(Some(Duration::from_secs(10)));
        let args = vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()];
        let out = exec.execute("sh", &args).await.unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_executor_times_out() {
        let exec = ProcessExecutor::new(Some(Duration::from_millis(100)));
        let args = vec!["5".to_string()];
        let err = exec.execute("sleep", &args).await.unwrap_err();
        assert!(matches!(err, TileError::TimedOut { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_keeps_output_written_so_far() {
        let exec = ProcessExecutor::new(Some(Duration::from_millis(500)));
        let args = vec![
            "-c".to_string(),
            "echo 'reading features'; echo 'zoom 4' >&2; exec sleep 5".to_string(),
        ];
        let err = exec.execute("sh", &args).await.unwrap_err();
        match &err {
            TileError::TimedOut { stdout, stderr, .. } => {
                assert_eq!(stdout.trim(), "reading features");
                assert_eq!(stderr.trim(), "zoom 4");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("zoom 4"));
    }
}
