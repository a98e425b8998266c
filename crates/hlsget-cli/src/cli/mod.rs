//! CLI for the hlsget HLS downloader.

use anyhow::{bail, Result};
use clap::Parser;
use hlsget_core::config::{self, DownloadConfig};
use hlsget_core::downloader::Downloader;
use hlsget_core::progress::ProgressStats;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Resumable concurrent downloader for HLS (m3u8) streams.
#[derive(Debug, Parser)]
#[command(name = "hlsget")]
#[command(about = "hlsget: resumable concurrent HLS segment downloader", long_about = None)]
pub struct Cli {
    /// URL of the m3u8 media playlist.
    #[arg(short = 'u', long = "url")]
    pub url: Option<String>,

    /// Path to a local m3u8 media playlist file.
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file name.
    #[arg(short = 'o', long = "output", default_value = "output.mp4")]
    pub output: String,

    /// Directory holding the output file and the download scratch space.
    /// Defaults to the current directory.
    #[arg(short = 'd', long = "dir")]
    pub dir: Option<PathBuf>,

    /// Base URL for resolving relative segment URIs. Defaults to the
    /// playlist URL with its final path component trimmed.
    #[arg(short = 'b', long = "base-url")]
    pub base_url: Option<String>,

    /// Proxy URL, e.g. http://localhost:3000 or socks5://localhost:1080.
    #[arg(long = "proxy")]
    pub proxy: Option<String>,

    /// Maximum concurrent segment downloads.
    #[arg(short = 'n', long = "concurrency")]
    pub concurrency: Option<usize>,

    /// Retry budget per segment (timeouts and fetch errors share it).
    #[arg(short = 'r', long = "retry")]
    pub retry: Option<u32>,

    /// Per-attempt segment timeout in seconds.
    #[arg(short = 't', long = "timeout")]
    pub timeout: Option<u64>,
}

impl Cli {
    pub async fn run_from_args() -> Result<()> {
        Cli::parse().run().await
    }

    async fn run(self) -> Result<()> {
        let defaults = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", defaults);

        if self.url.is_none() && self.input.is_none() {
            bail!("pass a playlist URL (-u) or a local playlist file (-i)");
        }
        let work_dir = match self.dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };

        let mut cfg = DownloadConfig::from_defaults(&defaults, &self.output, &work_dir);
        cfg.playlist_url = self.url;
        cfg.playlist_path = self.input;
        cfg.base_url = self.base_url;
        cfg.proxy = self.proxy;
        if let Some(n) = self.concurrency {
            cfg.max_concurrency = n;
        }
        if let Some(r) = self.retry {
            cfg.retry_count = r;
        }
        if let Some(t) = self.timeout {
            cfg.segment_timeout = Duration::from_secs(t);
        }
        let output_path = cfg.output_path();

        let handle = Downloader::new(cfg)?.start().await?;
        let done = handle.done();
        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        loop {
            tokio::select! {
                _ = done.cancelled() => break,
                _ = ticker.tick() => print_progress(&handle.stats()),
                _ = tokio::signal::ctrl_c() => {
                    eprintln!();
                    tracing::info!("interrupt received, cancelling download");
                    handle.cancel();
                }
            }
        }
        let stats = handle.stats();
        print_progress(&stats);
        println!();

        handle.wait().await?;
        println!(
            "saved {} ({})",
            output_path.display(),
            fmt_bytes(stats.bytes_transferred)
        );
        Ok(())
    }
}

fn print_progress(stats: &ProgressStats) {
    print!(
        "\r{}/{} segments  {}  {:.1}%",
        stats.completed_segments,
        stats.total_segments,
        fmt_bytes(stats.bytes_transferred),
        stats.fraction() * 100.0
    );
    let _ = std::io::stdout().flush();
}

fn fmt_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests;
