// src/progress.rs

use indicatif::ProgressBar;

/// A bar for one fan-out stage, hidden when progress output is off.
pub fn stage_bar(len: usize, message: &'static str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_message(message);
    bar
}
