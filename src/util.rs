use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

/// Install a fmt subscriber honoring `RUST_LOG` (default `info`). Later calls are no-ops,
/// and an already-installed global subscriber is left alone.
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).try_init();
    });
}

// -------- robust file ops with backoff (AV scanners, network shares, Windows sharing) --------

/// Transient OS errors worth another attempt.
fn is_retriable_io_error(e: &io::Error) -> bool {
    if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) {
        return true;
    }
    // Windows: access denied (AV), sharing/lock violation, AV block, device not ready,
    // volume altered, I/O device error, user-mapped section open.
    cfg!(windows) && matches!(e.raw_os_error(), Some(5 | 21 | 32 | 33 | 225 | 433 | 1006 | 1117 | 1224))
}

/// Run `op` up to `tries` times, sleeping `delay_ms * attempt` between transient failures.
fn retry_io<T>(tries: usize, delay_ms: u64, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let tries = tries.max(1);
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match op() {
            Err(e) if attempt < tries && is_retriable_io_error(&e) => {
                sleep(Duration::from_millis(delay_ms.saturating_mul(attempt as u64)));
            }
            other => return other,
        }
    }
}

pub fn open_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    retry_io(tries, delay_ms, || File::open(path))
}

pub fn create_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    retry_io(tries, delay_ms, || File::create(path))
}

/// Remove a file; a missing file counts as success.
pub fn remove_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> Result<()> {
    match retry_io(tries, delay_ms, || fs::remove_file(path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

/// Promote `tmp` to `dest`, replacing any previous `dest`.
/// Falls back to copy + remove when rename is refused (e.g. across volumes).
pub fn replace_file_atomic_backoff(tmp: &Path, dest: &Path) -> Result<()> {
    const TRIES: usize = 20;
    const DELAY_MS: u64 = 50;
    if dest.exists() {
        remove_with_backoff(dest, TRIES, DELAY_MS)?;
    }
    if retry_io(TRIES, DELAY_MS, || fs::rename(tmp, dest)).is_ok() {
        return Ok(());
    }
    retry_io(TRIES, DELAY_MS, || fs::copy(tmp, dest))
        .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
    remove_with_backoff(tmp, TRIES, DELAY_MS)
}
