use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Pid the fake device hands out for a started app.
const APP_PID: &str = "4242";

/// Stand-in for `adb` against one fake device.
///
/// The device serial (`-s <serial>`) is a directory holding the device state:
/// `pid` while the app runs, `logcat` with the device log, `start_error` to make
/// `am start` fail, and `commands.log` recording every invocation.
fn main() -> ExitCode {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 || args[0] != "-s" {
        eprintln!("error: no devices/emulators found");
        return ExitCode::from(1);
    }
    let device = PathBuf::from(args.remove(1));
    args.remove(0);

    if let Err(err) = record(&device, &args) {
        eprintln!("error: device state unavailable: {err}");
        return ExitCode::from(1);
    }

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["install", "-r", apk] => {
            if Path::new(apk).is_file() {
                println!("Performing Streamed Install");
                println!("Success");
                ExitCode::SUCCESS
            } else {
                println!("Failure [INSTALL_FAILED_INVALID_URI]");
                ExitCode::from(1)
            }
        }
        ["shell", "am", "start", ..] => {
            if let Ok(message) = fs::read_to_string(device.join("start_error")) {
                // `am start` reports failures on stdout and still exits 0.
                println!("Error: {}", message.trim());
                return ExitCode::SUCCESS;
            }
            if fs::write(device.join("pid"), APP_PID).is_err() {
                return ExitCode::from(1);
            }
            println!("Status: ok");
            println!("LaunchState: COLD");
            ExitCode::SUCCESS
        }
        ["shell", "pidof", _package] => match fs::read_to_string(device.join("pid")) {
            Ok(pid) => {
                println!("{}", pid.trim());
                ExitCode::SUCCESS
            }
            Err(_) => ExitCode::from(1),
        },
        ["shell", "am", "force-stop", _package] => {
            let _ = fs::remove_file(device.join("pid"));
            ExitCode::SUCCESS
        }
        ["logcat", "-d", pid] if pid.starts_with("--pid=") => {
            if let Ok(log) = fs::read_to_string(device.join("logcat")) {
                print!("{log}");
            }
            ExitCode::SUCCESS
        }
        other => {
            eprintln!("fake_adb: unsupported command {other:?}");
            ExitCode::from(1)
        }
    }
}

fn record(device: &Path, args: &[String]) -> std::io::Result<()> {
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(device.join("commands.log"))?;
    writeln!(log, "{}", args.join(" "))
}
