// AI
//! 📊 progress.rs: "Are we there yet?" Every migration, every time, forever.
//!
//! 🚀 This module answers the age-old question: "how fast is this index moving?"
//! With cold hard numbers, a progress bar, and a table so comfy it has lumbar support.
//!
//! ⚠️  Warning: Watching this progress bar will not make the scroll go faster.
//! Neither will refreshing it. We've tried. Science says no.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
/// "1000000 docs" → "1,000,000 docs": you're welcome, eyes.
pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    // -- 🧵 pre-allocate like we know what we're doing (we do, we read the book)
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, you should probably call your mom. It's been a while.
pub(crate) fn format_duration(duration: Duration) -> String {
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

/// 📊 The brains behind the migration progress display.
///
/// Uses a sliding 5-second window for the docs/s rate so one slow bulk page
/// doesn't make the number look like a seismograph.
///
/// # Ancient Proverb
/// "He who reindexes without a progress bar, reindexes alone and in darkness."
pub(crate) struct ProgressMetrics {
    /// 🏷️ which legacy index is on the operating table
    source_name: String,
    /// 📏 total hits the scroll promised us: 0 if the cluster was coy about it
    total_hits: u64,
    /// 📄 docs processed so far: each one a tiny victory
    processed: u64,
    /// 📦 pages handed to the bulk sink
    pages: u64,
    /// 💀 pages the bulk sink refused. each one a log line somebody should read.
    failed_pages: u64,
    progress_bar: ProgressBar,
    /// 🔄 sliding window of (timestamp, processed) for rate calculation
    rate_samples: VecDeque<(Instant, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 custom Debug impl because ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("source_name", &self.source_name)
            .field("total_hits", &self.total_hits)
            .field("processed", &self.processed)
            .field("pages", &self.pages)
            .field("failed_pages", &self.failed_pages)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 Spin up a new ProgressMetrics.
    ///
    /// `visible = false` gives you a hidden bar: all the accounting, none of the terminal art.
    /// Tests and log-only deployments appreciate the silence.
    pub(crate) fn new(source_name: String, total_hits: u64, visible: bool) -> Self {
        let progress_bar = if visible {
            ProgressBar::new(total_hits)
        } else {
            ProgressBar::hidden()
        };
        // -- 🎨 cyan because it's classy, blue because it's calm
        let style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        progress_bar.set_style(style);

        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        // -- 🔄 seed the rate window with t=0 so we don't divide by zero like animals
        rate_samples.push_back((start_time, 0u64));

        Self {
            source_name,
            total_hits,
            processed: 0,
            pages: 0,
            failed_pages: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    /// 🔄 Feed the metrics engine one finished page.
    pub(crate) fn record_page(&mut self, docs: u64, failed: bool) {
        self.processed += docs;
        self.pages += 1;
        if failed {
            self.failed_pages += 1;
        }
        let docs_per_sec = self.calculate_rate();
        self.render(docs_per_sec);
        self.progress_bar.set_position(self.processed);
    }

    /// ✅ Mark the progress bar done. Ring the bell. We made it.
    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }

    /// 📈 docs/s over the last 5 seconds.
    fn calculate_rate(&mut self) -> f64 {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        // -- 🔄 evict samples older than the window, like a bouncer at a club, but for data points
        while let Some(&(timestamp, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples.push_back((now, self.processed));

        match self.rate_samples.front() {
            Some(&(oldest_time, oldest_processed)) => {
                let elapsed = now.duration_since(oldest_time).as_secs_f64();
                if elapsed > 0.0 {
                    self.processed.saturating_sub(oldest_processed) as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    /// 🎨 Render the comfy-table as the progress bar message.
    ///
    /// ```text
    /// | index: <name>
    /// | [=====>----------]
    ///   <docs/s>        <processed / total>
    ///   <pages>         <failed pages>
    ///   <elapsed>       <remaining>
    /// ```
    fn render(&self, docs_per_sec: f64) {
        let percent = if self.total_hits > 0 {
            (self.processed as f64 / self.total_hits as f64) * 100.0
        } else {
            0.0
        };

        let elapsed = self.start_time.elapsed();
        let remaining = if percent > 0.0 && percent < 100.0 {
            // 🔮 linear extrapolation: assumes the future looks like the past
            let total_estimated = elapsed.as_secs_f64() / (percent / 100.0);
            format_duration(Duration::from_secs_f64(
                (total_estimated - elapsed.as_secs_f64()).max(0.0),
            ))
        } else {
            "--:--".to_string()
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Docs/s", format_number(docs_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} / {} Docs ({:.2}%)",
                format_number(self.processed),
                format_number(self.total_hits),
                percent
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} pages", format_number(self.pages)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} failed pages", format_number(self.failed_pages)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining", remaining)).set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("index: {}\n{}", self.source_name, table));
    }
}
