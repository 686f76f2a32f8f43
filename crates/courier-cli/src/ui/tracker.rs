use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;

// Progress arrives as a fraction; the bar counts in tenths of a percent.
const RESOLUTION: u64 = 1000;

const PB_STYLE: &str = "{spinner:.blue} {prefix:>12.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {percent:>3}% {wide_msg}";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    ProgressStyle::with_template(PB_STYLE)
        .ok()
        .map(|style| style.tick_chars(TICK).progress_chars(PB_CHARS))
});

/// A terminal bar driven by transfer progress.
#[derive(Clone)]
pub struct ProgressTracker {
    pb: ProgressBar,
}

impl ProgressTracker {
    pub fn new(prefix: &str) -> Self {
        let pb = ProgressBar::new(RESOLUTION);
        let pb = match PB_TEMPLATE.as_ref() {
            Some(style) => pb.with_style(style.clone()),
            None => pb,
        };
        pb.set_prefix(prefix.to_string());
        Self { pb }
    }

    pub fn set_fraction(&self, fraction: f32) {
        self.pb.set_position((fraction.clamp(0.0, 1.0) * RESOLUTION as f32) as u64);
    }

    pub fn finish(&self, msg: &str) { self.pb.finish_with_message(msg.to_string()); }

    pub fn abandon(&self, msg: &str) { self.pb.abandon_with_message(msg.to_string()); }
}
