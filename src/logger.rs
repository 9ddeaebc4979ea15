use crate::config;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::{Mutex, OnceLock};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

static LOG_FILE: OnceLock<Mutex<std::fs::File>> = OnceLock::new();

// 256 KiB before the current log is rotated aside.
const ROTATE_AT: u64 = 256 * 1024;

pub fn init() {
    let log_dir = config::get_config_dir().join("logs");
    fs::create_dir_all(&log_dir).ok();

    let log_path = log_dir.join("linku.log");

    // Size-based rotation: keep exactly one previous generation.
    if let Ok(meta) = fs::metadata(&log_path) {
        if meta.len() >= ROTATE_AT {
            let old_path = log_dir.join("linku.log.1");
            if old_path.exists() {
                let _ = fs::remove_file(&old_path);
            }
            let _ = fs::rename(&log_path, old_path);
        }
    }

    let mut options = OpenOptions::new();
    options.create(true).append(true);

    #[cfg(unix)]
    {
        options.mode(0o600);
    }

    if let Ok(file) = options.open(log_path) {
        let _ = LOG_FILE.set(Mutex::new(file));
    }
}

fn write_line(level: &str, msg: &str) {
    if let Some(mutex) = LOG_FILE.get() {
        if let Ok(mut file) = mutex.lock() {
            let _ = writeln!(
                file,
                "{} [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                level,
                msg
            );
        }
    }
}

pub fn log(msg: &str) {
    write_line("info", msg);
}

pub fn warn(msg: &str) {
    write_line("warn", msg);
}

pub fn error(msg: &str) {
    write_line("error", msg);
}
