use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::capture::{LogLine, LogStream};
use crate::config::{LaunchConfig, StopRequest};
use crate::error::{LauncherError, LauncherResult};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const TAIL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to wait for capture threads to drain once the child is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Outcome of waiting for a line of output.
#[derive(Debug)]
pub(crate) enum LineWait {
    Seen,
    Exited(ExitStatus),
    TimedOut,
}

/// A spawned child process together with its log capture threads.
pub(crate) struct ProcessHandle {
    child: Child,
    stdin: Option<ChildStdin>,
    log_buffer: Arc<Mutex<Vec<LogLine>>>,
    /// Capture threads that have not reported completion yet.
    pending_workers: usize,
    worker_done: Receiver<()>,
    tail_stop: Arc<AtomicBool>,
    exit_status: Option<ExitStatus>,
}

impl ProcessHandle {
    /// Spawn the configured executable with piped stdio and start capturing output.
    pub(crate) fn spawn(config: &LaunchConfig) -> LauncherResult<Self> {
        let mut cmd = Command::new(&config.executable);
        cmd.args(&config.args);
        if let Some(dir) = &config.working_directory {
            cmd.current_dir(dir);
        }
        cmd.envs(&config.env);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        log::debug!(
            "spawning {} {}",
            config.executable.display(),
            config.args.join(" ")
        );
        let mut child = cmd
            .spawn()
            .map_err(|err| LauncherError::launch(config.target_name(), err.to_string()))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LauncherError::launch(config.target_name(), "failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LauncherError::launch(config.target_name(), "failed to capture stderr"))?;

        let log_buffer = Arc::new(Mutex::new(Vec::new()));
        let tail_stop = Arc::new(AtomicBool::new(false));
        let (done_tx, worker_done) = mpsc::channel();
        spawn_log_reader(stdout, LogStream::Stdout, log_buffer.clone(), done_tx.clone());
        spawn_log_reader(stderr, LogStream::Stderr, log_buffer.clone(), done_tx.clone());
        let mut pending_workers = 2;
        if let Some(path) = &config.log_file {
            spawn_log_tail(path.clone(), log_buffer.clone(), tail_stop.clone(), done_tx);
            pending_workers += 1;
        }

        Ok(Self {
            child,
            stdin,
            log_buffer,
            pending_workers,
            worker_done,
            tail_stop,
            exit_status: None,
        })
    }

    pub(crate) fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Exit status if the process has already been reaped.
    pub(crate) fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Poll the child without blocking, reaping it and draining capture threads on exit.
    pub(crate) fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.exit_status.is_some() {
            return Ok(self.exit_status);
        }
        if let Some(status) = self.child.try_wait()? {
            self.exit_status = Some(status);
            self.drain_workers();
        }
        Ok(self.exit_status)
    }

    /// Wait up to `timeout` for the child to exit.
    pub(crate) fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Wait until a captured line contains `needle`, the process exits, or `timeout` elapses.
    pub(crate) fn wait_for_line(&mut self, needle: &str, timeout: Duration) -> io::Result<LineWait> {
        let start = Instant::now();
        let mut cursor = 0;
        loop {
            if self.scan_from(&mut cursor, needle) {
                return Ok(LineWait::Seen);
            }
            if let Some(status) = self.try_wait()? {
                // Capture threads are drained on exit; the line may have arrived last.
                if self.scan_from(&mut cursor, needle) {
                    return Ok(LineWait::Seen);
                }
                return Ok(LineWait::Exited(status));
            }
            if start.elapsed() >= timeout {
                return Ok(LineWait::TimedOut);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn scan_from(&self, cursor: &mut usize, needle: &str) -> bool {
        self.with_lines_since(cursor, |fresh| {
            fresh.iter().any(|line| line.line.contains(needle))
        })
        .unwrap_or(false)
    }

    /// Run `f` over lines captured since `cursor` under the buffer lock, then advance it.
    pub(crate) fn with_lines_since<T>(
        &self,
        cursor: &mut usize,
        f: impl FnOnce(&[LogLine]) -> T,
    ) -> Option<T> {
        lines_since(&self.log_buffer, cursor, f)
    }

    /// Return all captured log lines across streams.
    pub(crate) fn lines(&self) -> Vec<LogLine> {
        self.log_buffer
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default()
    }

    /// Ask the process to exit, then force-terminate it once `grace` has elapsed.
    pub(crate) fn stop(&mut self, request: &StopRequest, grace: Duration) -> io::Result<ExitStatus> {
        if let Some(status) = self.try_wait()? {
            return Ok(status);
        }

        match request {
            StopRequest::Kill => {}
            StopRequest::CloseStdin => {
                self.stdin.take();
            }
            StopRequest::Command(command) => {
                if let Some(mut stdin) = self.stdin.take() {
                    // The child may already be on its way out; a broken pipe is fine here.
                    let _ = writeln!(stdin, "{command}").and_then(|_| stdin.flush());
                }
            }
        }

        if *request != StopRequest::Kill {
            if let Some(status) = self.wait_timeout(grace)? {
                return Ok(status);
            }
            log::warn!(
                "process {} ignored stop request after {grace:?}, killing it",
                self.pid()
            );
        }

        self.kill()
    }

    fn kill(&mut self) -> io::Result<ExitStatus> {
        // The child can exit between the last poll and the kill.
        let _ = self.child.kill();
        let status = self.child.wait()?;
        self.exit_status = Some(status);
        self.stdin.take();
        self.drain_workers();
        Ok(status)
    }

    /// Give capture threads a bounded window to flush their last lines.
    ///
    /// A grandchild that inherited stdout keeps the pipe open after the child exits;
    /// readers still blocked on such a pipe are left detached.
    fn drain_workers(&mut self) {
        self.tail_stop.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while self.pending_workers > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.worker_done.recv_timeout(remaining) {
                Ok(()) => self.pending_workers -= 1,
                Err(_) => break,
            }
        }
        if self.pending_workers > 0 {
            log::debug!(
                "process {} exited with {} capture threads still attached to its output",
                self.pid(),
                self.pending_workers
            );
            self.pending_workers = 0;
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.exit_status.is_none() {
            let _ = self.kill();
        }
    }
}

fn spawn_log_reader<R: Read + Send + 'static>(
    reader: R,
    stream: LogStream,
    buffer: Arc<Mutex<Vec<LogLine>>>,
    done: Sender<()>,
) {
    thread::spawn(move || {
        let buf_reader = BufReader::new(reader);
        for line in buf_reader.lines().map_while(Result::ok) {
            if let Ok(mut guard) = buffer.lock() {
                guard.push(LogLine::new(stream, line.trim_end()));
            }
        }
        let _ = done.send(());
    });
}

/// Follow a log file the process writes, from its start, until `stop` is raised.
fn spawn_log_tail(
    path: PathBuf,
    buffer: Arc<Mutex<Vec<LogLine>>>,
    stop: Arc<AtomicBool>,
    done: Sender<()>,
) {
    thread::spawn(move || {
        let mut offset = 0u64;
        let mut partial = String::new();
        loop {
            // Read once more after the stop flag so the final lines are not lost.
            let stopping = stop.load(Ordering::SeqCst);
            if let Ok(file) = File::open(&path) {
                offset = read_new_lines(file, offset, &mut partial, &buffer);
            }
            if stopping {
                break;
            }
            thread::sleep(TAIL_INTERVAL);
        }
        if !partial.is_empty() {
            if let Ok(mut guard) = buffer.lock() {
                guard.push(LogLine::new(LogStream::File, partial.trim_end()));
            }
        }
        let _ = done.send(());
    });
}

fn lines_since<T>(
    buffer: &Mutex<Vec<LogLine>>,
    cursor: &mut usize,
    f: impl FnOnce(&[LogLine]) -> T,
) -> Option<T> {
    let buffer = buffer.lock().ok()?;
    let fresh = &buffer[(*cursor).min(buffer.len())..];
    let result = f(fresh);
    *cursor = buffer.len();
    Some(result)
}

fn read_new_lines(
    mut file: File,
    offset: u64,
    partial: &mut String,
    buffer: &Arc<Mutex<Vec<LogLine>>>,
) -> u64 {
    let len = file.metadata().map(|meta| meta.len()).unwrap_or(0);
    // A truncated file was rewritten from scratch.
    let start = if len < offset { 0 } else { offset };
    if file.seek(SeekFrom::Start(start)).is_err() {
        return offset;
    }
    let mut bytes = Vec::new();
    let Ok(read) = file.read_to_end(&mut bytes) else {
        return offset;
    };
    partial.push_str(&String::from_utf8_lossy(&bytes));

    let mut complete = Vec::new();
    while let Some(idx) = partial.find('\n') {
        let line: String = partial.drain(..=idx).collect();
        complete.push(LogLine::new(LogStream::File, line.trim_end()));
    }
    if !complete.is_empty() {
        if let Ok(mut guard) = buffer.lock() {
            guard.extend(complete);
        }
    }
    start + read as u64
}
