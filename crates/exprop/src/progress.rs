//! 📊 progress.rs -- "Are we there yet?" -- every export, every file, forever.
//!
//! 🚀 One progress bar per object being propagated, sized by the object's listed size, with a
//! comfy-table underneath: bytes and lines read, chunks propagated, throughput, elapsed and ETA.
//! Bars hang off a shared `MultiProgress` so parallel file workers don't draw over each other.
//!
//! ⚠️ Watching this progress bar will not make it go faster. The throttler made sure of that.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

// -- 📏 one mebibyte. not a megabyte. there's a difference and I will die on this hill.
const MIB: u64 = 1024 * 1024;

// -- ⏱️ how far back the throughput window reaches
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// 🖥️ Where progress bars get drawn. Hidden means nowhere, for tests and `show_progress = false`.
pub fn progress_board(show_progress: bool) -> MultiProgress {
    if show_progress {
        MultiProgress::new()
    } else {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }
}

/// 📦 Raw bytes to something a human can read, scaled to the total size.
fn format_bytes(bytes: u64, total_size: u64) -> String {
    if total_size >= 512 * MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if total_size >= MIB {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} bytes", bytes)
    }
}

/// 🔢 "1000000" → "1,000,000".
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS once it gets embarrassing.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📡 Throughput over the sliding window.
struct Rates {
    lines_per_sec: f64,
    mib_per_sec: f64,
    percent_per_sec: f64,
}

/// 📊 Progress for one object: totals, a rate window, and the bar that shows them.
pub(crate) struct ProgressMetrics {
    source_location: String,
    /// 📏 0 when unknown (inflated gzip objects), which turns percent and ETA off
    total_size: u64,
    total_bytes: u64,
    total_lines: u64,
    total_chunks: u64,
    progress_bar: ProgressBar,
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- ProgressBar doesn't derive Debug, and printing a terminal widget is a choice anyway
        f.debug_struct("ProgressMetrics")
            .field("source_location", &self.source_location)
            .field("total_size", &self.total_size)
            .field("total_bytes", &self.total_bytes)
            .field("total_lines", &self.total_lines)
            .field("total_chunks", &self.total_chunks)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 A fresh bar on `board` for one object. `total_size` 0 means "no idea".
    pub(crate) fn new(board: &MultiProgress, source_location: String, total_size: u64) -> Self {
        let progress_bar = board.add(ProgressBar::new(total_size));
        let style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        progress_bar.set_style(style);

        let start_time = Instant::now();
        // -- seed the window with t=0 so the first rate isn't a division by zero
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            source_location,
            total_size,
            total_bytes: 0,
            total_lines: 0,
            total_chunks: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    /// 🔄 Add what was read since the last call and set the chunk count, then redraw.
    pub(crate) fn update(&mut self, bytes_read: u64, lines_read: u64, chunks_propagated: u64) {
        self.total_bytes += bytes_read;
        self.total_lines += lines_read;
        self.total_chunks = chunks_propagated;

        let rates = self.calculate_rates();
        self.render(rates);
        self.progress_bar.set_position(self.total_bytes);
    }

    pub(crate) fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub(crate) fn total_lines(&self) -> u64 {
        self.total_lines
    }

    /// ✅ Done, one way or another. The bar is cleared so the next file gets the space.
    pub(crate) fn finish(&self) {
        self.progress_bar.finish_and_clear();
    }

    fn calculate_rates(&mut self) -> Rates {
        let now = Instant::now();
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > RATE_WINDOW {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples
            .push_back((now, self.total_bytes, self.total_lines));

        if let Some(&(oldest_time, oldest_bytes, oldest_lines)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                let bytes_delta = self.total_bytes.saturating_sub(oldest_bytes);
                let lines_delta = self.total_lines.saturating_sub(oldest_lines);
                let percent_delta = if self.total_size > 0 {
                    (bytes_delta as f64 / self.total_size as f64) * 100.0
                } else {
                    0.0
                };
                return Rates {
                    lines_per_sec: lines_delta as f64 / elapsed,
                    mib_per_sec: (bytes_delta as f64 / elapsed) / MIB as f64,
                    percent_per_sec: percent_delta / elapsed,
                };
            }
        }

        Rates {
            lines_per_sec: 0.0,
            mib_per_sec: 0.0,
            percent_per_sec: 0.0,
        }
    }

    /// 🎨 Layout:
    /// ```text
    /// source: <location>
    /// | [=====>----------]
    ///   <lines/s>     <total lines>
    ///   <MiB/s>       <bytes progress>
    ///   <%/s>         <%>
    ///   <chunks>      <elapsed> / <remaining>
    /// ```
    fn render(&self, rates: Rates) {
        let bytes_progress = format!(
            "{} / {}",
            format_bytes(self.total_bytes, self.total_size),
            format_bytes(self.total_size, self.total_size)
        );
        let percent = if self.total_size > 0 {
            ((self.total_bytes as f64 / self.total_size as f64) * 100.0).min(100.0)
        } else {
            0.0
        };

        let elapsed = self.start_time.elapsed();
        let remaining = if percent > 0.0 {
            // -- 🔮 linear extrapolation. throttled files are linear, for once.
            let total_estimated = elapsed.as_secs_f64() / (percent / 100.0);
            let remaining_secs = total_estimated - elapsed.as_secs_f64();
            if remaining_secs > 0.0 {
                format_duration(Duration::from_secs_f64(remaining_secs))
            } else {
                "--:--".to_string()
            }
        } else {
            "--:--".to_string()
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Lines/s", format_number(rates.lines_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} Lines", format_number(self.total_lines)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", rates.mib_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(bytes_progress).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} %/s", rates.percent_per_sec))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}%", percent)).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} Chunks", format_number(self.total_chunks)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} elapsed / {} remaining",
                format_duration(elapsed),
                remaining
            ))
            .set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("source: {}\n{}", self.source_location, table));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn the_one_where_bytes_scale_with_the_file() {
        assert_eq!(format_bytes(512, 1_000), "512 bytes");
        assert_eq!(format_bytes(2048, 2 * MIB), "2.00 KiB");
        assert_eq!(format_bytes(MIB, 600 * MIB), "1.00 MiB");
    }

    #[test]
    fn the_one_where_long_runs_grow_an_hours_column() {
        assert_eq!(format_duration(Duration::from_secs(61)), "01:01");
        assert_eq!(format_duration(Duration::from_secs(3_661)), "01:01:01");
    }

    #[test]
    fn the_one_where_a_hidden_board_still_counts() {
        let board = progress_board(false);
        let mut the_metrics = ProgressMetrics::new(&board, "memory:///x".to_string(), 100);
        the_metrics.update(40, 2, 0);
        the_metrics.update(60, 3, 1);
        assert_eq!(the_metrics.total_bytes(), 100);
        assert_eq!(the_metrics.total_lines(), 5);
        the_metrics.finish();
    }
}
