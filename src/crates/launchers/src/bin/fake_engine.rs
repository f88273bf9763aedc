use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Stand-in for an engine executable, driven entirely by its command line.
#[derive(Debug, Default)]
struct Behaviour {
    stdout_lines: Vec<String>,
    stderr_lines: Vec<String>,
    file_only_lines: Vec<String>,
    ready_line: Option<String>,
    log_file: Option<PathBuf>,
    env_keys: Vec<String>,
    print_cwd: bool,
    run_for: Option<Duration>,
    exit_code: i32,
    crash_after: Option<Duration>,
    ignore_quit: bool,
    max_runtime: Duration,
}

fn parse_args() -> Result<Behaviour, String> {
    let mut behaviour = Behaviour {
        max_runtime: Duration::from_secs(30),
        ..Behaviour::default()
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().ok_or_else(|| format!("{name} needs a value"));
        match arg.as_str() {
            "--print" => behaviour.stdout_lines.push(value("--print")?),
            "--stderr" => behaviour.stderr_lines.push(value("--stderr")?),
            "--log-line" => behaviour.file_only_lines.push(value("--log-line")?),
            "--ready" => behaviour.ready_line = Some(value("--ready")?),
            "--log-file" => behaviour.log_file = Some(PathBuf::from(value("--log-file")?)),
            "--print-env" => behaviour.env_keys.push(value("--print-env")?),
            "--print-cwd" => behaviour.print_cwd = true,
            "--run-ms" => behaviour.run_for = Some(parse_ms(&value("--run-ms")?)?),
            "--exit-code" => {
                behaviour.exit_code = value("--exit-code")?
                    .parse()
                    .map_err(|err| format!("bad exit code: {err}"))?
            }
            "--crash-after-ms" => {
                behaviour.crash_after = Some(parse_ms(&value("--crash-after-ms")?)?)
            }
            "--ignore-quit" => behaviour.ignore_quit = true,
            "--max-ms" => behaviour.max_runtime = parse_ms(&value("--max-ms")?)?,
            // Engine arguments such as --regset or -rhi=null are accepted and ignored.
            _ => {}
        }
    }
    Ok(behaviour)
}

fn parse_ms(text: &str) -> Result<Duration, String> {
    text.parse()
        .map(Duration::from_millis)
        .map_err(|err| format!("bad duration {text:?}: {err}"))
}

struct Output {
    log_file: Option<File>,
}

impl Output {
    fn line(&mut self, line: &str) {
        println!("{line}");
        self.file_line(line);
    }

    fn file_line(&mut self, line: &str) {
        if let Some(file) = self.log_file.as_mut() {
            let _ = writeln!(file, "{line}").and_then(|_| file.flush());
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let behaviour = parse_args()?;
    let log_file = match &behaviour.log_file {
        Some(path) => Some(File::create(path)?),
        None => None,
    };
    let mut out = Output { log_file };

    if behaviour.print_cwd {
        out.line(&format!("cwd={}", std::env::current_dir()?.display()));
    }
    for key in &behaviour.env_keys {
        let value = std::env::var(key).unwrap_or_default();
        out.line(&format!("{key}={value}"));
    }
    for line in &behaviour.stdout_lines {
        out.line(line);
    }
    for line in &behaviour.stderr_lines {
        eprintln!("{line}");
    }
    for line in &behaviour.file_only_lines {
        out.file_line(line);
    }
    if let Some(ready) = &behaviour.ready_line {
        out.line(ready);
    }

    let quit = Arc::new(AtomicBool::new(false));
    spawn_stdin_watcher(quit.clone(), behaviour.ignore_quit);

    let start = Instant::now();
    loop {
        if quit.load(Ordering::SeqCst) {
            out.line("shutting down");
            return Ok(());
        }
        let elapsed = start.elapsed();
        if behaviour.crash_after.is_some_and(|after| elapsed >= after) {
            eprintln!("Fatal error: simulated access violation");
            std::process::abort();
        }
        if behaviour.run_for.is_some_and(|run_for| elapsed >= run_for) {
            out.line("run finished");
            std::process::exit(behaviour.exit_code);
        }
        if elapsed >= behaviour.max_runtime {
            std::process::exit(behaviour.exit_code);
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// Treat a `quit` line or a closed stdin as a shutdown request.
fn spawn_stdin_watcher(quit: Arc<AtomicBool>, ignore_quit: bool) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if line.trim() == "quit" => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        if !ignore_quit {
            quit.store(true, Ordering::SeqCst);
        }
    });
}
