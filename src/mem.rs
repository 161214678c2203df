use parking_lot::Mutex;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use sysinfo::{System, SystemExt};

/// Process-wide cached view of available/total RAM. Refreshing sysinfo is not free,
/// so readings are reused for `REFRESH_EVERY`.
struct MemState {
    sys: System,
    last_check: Option<Instant>,
    last_frac: f64,
}

static STATE: OnceLock<Mutex<MemState>> = OnceLock::new();
const REFRESH_EVERY: Duration = Duration::from_millis(500);

/// Recent estimate of the available memory fraction (0.0..=1.0).
pub fn available_memory_fraction() -> f64 {
    let state = STATE.get_or_init(|| {
        let mut sys = System::new();
        sys.refresh_memory();
        Mutex::new(MemState { sys, last_check: None, last_frac: 1.0 })
    });
    let mut st = state.lock();
    if st.last_check.map_or(true, |t| t.elapsed() >= REFRESH_EVERY) {
        st.sys.refresh_memory();
        let total = st.sys.total_memory() as f64;
        let avail = st.sys.available_memory() as f64;
        st.last_frac = if total > 0.0 { (avail / total).clamp(0.0, 1.0) } else { 1.0 };
        st.last_check = Some(Instant::now());
    }
    st.last_frac
}

/// Per-run watcher over the in-memory thread buffers. Warns once when the machine runs
/// low, naming how much text is buffered, so operators can shrink the post set or window.
pub struct MemoryWatch {
    threshold: f64,
    warned: bool,
}

impl MemoryWatch {
    pub fn new(threshold: f64) -> Self {
        Self { threshold, warned: threshold <= 0.0 }
    }

    pub fn check(&mut self, buffered_bytes: usize, table_entries: usize) {
        if self.warned {
            return;
        }
        let frac = available_memory_fraction();
        if frac < self.threshold {
            self.warned = true;
            tracing::warn!(
                available_pct = (frac * 1000.0).round() / 10.0,
                buffered_bytes,
                table_entries,
                "low memory while accumulating threads"
            );
        }
    }
}
