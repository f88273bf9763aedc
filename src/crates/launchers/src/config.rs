use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LauncherResult;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// How a launcher asks the process to exit before falling back to a forced kill.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopRequest {
    /// Close the child's stdin and wait for it to notice.
    #[default]
    CloseStdin,
    /// Write a console command line to stdin, then close it.
    Command(String),
    /// Skip the graceful phase and kill immediately.
    Kill,
}

/// Everything needed to start one process under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Executable to spawn (for Android targets, the APK to deploy).
    pub executable: PathBuf,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Optional working directory override for the child process.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    /// Extra environment variables applied to the child process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Upper bound for `wait`/`run` to see the process exit.
    #[serde(
        rename = "timeout_ms",
        default = "default_timeout",
        with = "duration_ms"
    )]
    pub timeout: Duration,
    /// Upper bound on how long to wait for `ready_line` after spawning.
    #[serde(
        rename = "startup_timeout_ms",
        default = "default_startup_timeout",
        with = "duration_ms"
    )]
    pub startup_timeout: Duration,
    /// How long `stop` waits after the graceful request before killing.
    #[serde(
        rename = "grace_period_ms",
        default = "default_grace_period",
        with = "duration_ms"
    )]
    pub grace_period: Duration,
    /// Output line (substring) that marks the process as ready.
    #[serde(default)]
    pub ready_line: Option<String>,
    /// Log file written by the process that should be tailed alongside stdout/stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub stop_request: StopRequest,
    /// Extra crash signature patterns (regular expressions).
    #[serde(default)]
    pub crash_signatures: Vec<String>,
}

impl LaunchConfig {
    /// Create a new config targeting a specific executable.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_directory: None,
            env: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            ready_line: None,
            log_file: None,
            stop_request: StopRequest::default(),
            crash_signatures: Vec::new(),
        }
    }

    /// Parse a config from JSON text.
    pub fn from_json_str(text: &str) -> LauncherResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> LauncherResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Add a single argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments in order.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Override the working directory for the spawned process.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Override the run timeout used by `wait` and `run`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override how long to wait for the ready line.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Override the grace period between the stop request and a forced kill.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Require a line containing `line` before `launch` returns.
    pub fn with_ready_line(mut self, line: impl Into<String>) -> Self {
        self.ready_line = Some(line.into());
        self
    }

    /// Tail a log file written by the process.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn with_stop_request(mut self, request: StopRequest) -> Self {
        self.stop_request = request;
        self
    }

    /// Add a crash signature pattern on top of the defaults.
    pub fn with_crash_signature(mut self, pattern: impl Into<String>) -> Self {
        self.crash_signatures.push(pattern.into());
        self
    }

    /// Display name used in errors and logs.
    pub(crate) fn target_name(&self) -> String {
        self.executable.display().to_string()
    }
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_startup_timeout() -> Duration {
    DEFAULT_STARTUP_TIMEOUT
}

fn default_grace_period() -> Duration {
    DEFAULT_GRACE_PERIOD
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
