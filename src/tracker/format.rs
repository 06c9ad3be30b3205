// Summary-text rendering of the night history.
// Deterministic function of the ordered history; the screen binds the
// result directly to its summary label.

use crate::tracker::night::Night;
use std::fmt::Write;

/// Render the full history, most recent night first. An empty history
/// renders an empty string so the label collapses.
pub fn format_nights(nights: &[Night]) -> String {
    if nights.is_empty() {
        return String::new();
    }

    let mut out = String::from("Here is your sleep data:\n");
    for night in nights.iter().rev() {
        out.push('\n');
        format_night(&mut out, night);
    }
    out
}

fn format_night(out: &mut String, night: &Night) {
    let started = night.start_time.format("%Y-%m-%d %H:%M UTC");
    if night.is_open() {
        let _ = write!(out, "#{} started {} - in progress", night.id, started);
        return;
    }

    let minutes = night.duration().num_minutes();
    let _ = write!(
        out,
        "#{} started {} - slept {}h {:02}m",
        night.id,
        started,
        minutes / 60,
        minutes % 60
    );
    if let Some(quality) = night.quality {
        let _ = write!(out, ", quality {}/5", quality);
    }
}
