//! Progress reporting: a record counter for the resolution pass and a count bar for
//! the archive stage. Both draw into an optional shared `MultiProgress`.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

static GLOBAL_MP: OnceLock<Arc<MultiProgress>> = OnceLock::new();

/// Install a global MultiProgress used by all subsequently created bars.
/// Safe to call once; additional calls are ignored.
pub fn set_global_multiprogress(mp: Arc<MultiProgress>) {
    let _ = GLOBAL_MP.set(mp);
}

fn attach(pb: ProgressBar) -> ProgressBar {
    match GLOBAL_MP.get() {
        Some(mp) => mp.add(pb),
        None => pb,
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
}

/// Open-ended counter: the stream length is unknown up front.
pub fn make_record_progress(label: Option<&str>) -> ProgressBar {
    let pb = attach(ProgressBar::new_spinner());
    pb.set_style(style(
        "{spinner:.green} {msg} {human_pos} records  {per_sec}  elapsed: {elapsed_precise}",
    ));
    pb.set_message(label.unwrap_or("Resolving comments").to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Count-style bar (items processed out of total), with a label.
pub fn make_count_progress(total: u64, label: &str) -> ProgressBar {
    let pb = attach(ProgressBar::new(total));
    pb.set_style(style(
        "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  \
         elapsed: {elapsed_precise}  eta: {eta_precise}",
    ));
    if !label.is_empty() {
        pb.set_message(label.to_string());
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
