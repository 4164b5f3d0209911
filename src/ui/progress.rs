use crate::upload::UploadStatus;
use std::io::{self, Write};
use std::time::Instant;

pub(crate) const SPINNER_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];

#[cfg(feature = "color-output")]
mod palette {
    pub const GREEN: &str = "\x1b[38;5;82m";
    pub const GRAY: &str = "\x1b[38;5;240m";
    pub const CYAN: &str = "\x1b[38;5;51m";
    pub const YELLOW: &str = "\x1b[38;5;220m";
    pub const BOLD: &str = "\x1b[1m";
    pub const RESET: &str = "\x1b[0m";
}

#[cfg(not(feature = "color-output"))]
mod palette {
    pub const GREEN: &str = "";
    pub const GRAY: &str = "";
    pub const CYAN: &str = "";
    pub const YELLOW: &str = "";
    pub const BOLD: &str = "";
    pub const RESET: &str = "";
}

/// Single-line terminal progress bar for uploads
pub struct ProgressBar {
    width: usize,
    spinner_frame: usize,
    start: Instant,
    rendered: bool,
}

impl ProgressBar {
    /// width = number of bar character slots (not including the brackets)
    pub fn new(width: usize) -> Self {
        Self {
            width,
            spinner_frame: 0,
            start: Instant::now(),
            rendered: false,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Redraw the bar in place
    /// - `percent`: upload progress, clamped to 100
    /// - `total_bytes`: file size, used for the speed and ETA readout
    pub fn render(&mut self, status: UploadStatus, percent: u8, total_bytes: u64) {
        self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAMES.len();
        let line = self.line(status, percent, total_bytes);

        if self.rendered {
            print!("\x1b[2K\r{}", line);
        } else {
            print!("{}", line);
            self.rendered = true;
        }
        io::stdout().flush().ok();
    }

    /// Finish the line so later output starts on a fresh one
    pub fn finish(&mut self) {
        if self.rendered {
            println!();
            self.rendered = false;
        }
    }

    /// Build the bar line without printing it
    pub fn line(&self, status: UploadStatus, percent: u8, total_bytes: u64) -> String {
        let pct = percent.min(100) as usize;
        let filled = (pct * self.width + 50) / 100;
        let empty = self.width.saturating_sub(filled);

        let bar = format!(
            "{}{}{}{}{}{}{}",
            palette::BOLD,
            palette::GREEN,
            "█".repeat(filled),
            palette::RESET,
            palette::GRAY,
            "░".repeat(empty),
            palette::RESET
        );

        let info = match status {
            UploadStatus::Uploading if total_bytes > 0 => {
                let sent = total_bytes * pct as u64 / 100;
                let elapsed = self.start.elapsed().as_secs_f64().max(0.0001);
                let speed = sent as f64 / elapsed;
                let eta_secs = if speed > 0.0 {
                    ((total_bytes - sent) as f64 / speed).round() as u64
                } else {
                    0
                };
                format!(
                    "{}@ {}/s  ETA {}{}",
                    palette::CYAN,
                    human_bytes(speed),
                    format_duration(eta_secs),
                    palette::RESET
                )
            }
            UploadStatus::Retrying => format!(
                "{}retrying {}{}",
                palette::YELLOW,
                SPINNER_FRAMES[self.spinner_frame],
                palette::RESET
            ),
            other => format!("{}{}{}", palette::CYAN, other, palette::RESET),
        };

        format!(
            "[{}] {}{:>3}%{}  {}",
            bar,
            palette::BOLD,
            pct,
            palette::RESET,
            info
        )
    }
}

/// Convert bytes/sec to readable string
pub(crate) fn human_bytes(bps: f64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    if bps <= 0.0 || bps.is_nan() {
        return "0B".to_string();
    }
    let mut val = bps;
    let mut i = 0usize;
    while val >= 1024.0 && i + 1 < units.len() {
        val /= 1024.0;
        i += 1;
    }
    format!("{:.2}{}", val, units[i])
}

/// Format seconds to H:MM:SS or M:SS
pub(crate) fn format_duration(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
