use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::playlist::{PlaylistError, PlaylistSource};

/// Persistent tool defaults loaded from `~/.config/hlsget/config.toml`.
/// Per-run settings (`DownloadConfig`) are built from these plus CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HlsgetConfig {
    /// Maximum concurrent segment downloads.
    pub max_concurrency: usize,
    /// Retry budget per segment; timeouts and fetch errors share it.
    pub retry_count: u32,
    /// Per-attempt segment timeout in seconds.
    pub segment_timeout_secs: u64,
}

impl Default for HlsgetConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            retry_count: 5,
            segment_timeout_secs: 15,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("hlsget")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<HlsgetConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = HlsgetConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: HlsgetConfig = toml::from_str(&data)?;
    Ok(cfg)
}

/// Configuration for one download run.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// URL of the m3u8 media playlist (mutually optional with `playlist_path`).
    pub playlist_url: Option<String>,
    /// Path to a local m3u8 media playlist file.
    pub playlist_path: Option<PathBuf>,
    /// Name of the final output file.
    pub save_name: String,
    /// Directory holding the output file and the scratch directory.
    pub work_dir: PathBuf,
    /// Base URL for resolving relative segment URIs. When absent, derived
    /// from the playlist URL by trimming its final path segment.
    pub base_url: Option<String>,
    /// Proxy URL, e.g. `http://localhost:3000` or `socks5://localhost:1080`.
    pub proxy: Option<String>,
    /// Maximum concurrent segment downloads.
    pub max_concurrency: usize,
    /// Retry budget per segment.
    pub retry_count: u32,
    /// Per-attempt segment timeout.
    pub segment_timeout: Duration,
}

impl DownloadConfig {
    /// Builds a run config from persistent defaults, output name, and work dir.
    pub fn from_defaults(defaults: &HlsgetConfig, save_name: &str, work_dir: &Path) -> Self {
        Self {
            playlist_url: None,
            playlist_path: None,
            save_name: save_name.to_string(),
            work_dir: work_dir.to_path_buf(),
            base_url: None,
            proxy: None,
            max_concurrency: defaults.max_concurrency,
            retry_count: defaults.retry_count,
            segment_timeout: Duration::from_secs(defaults.segment_timeout_secs),
        }
    }

    /// Scratch directory for this run: `<work_dir>/<save_name>.tmp/`.
    /// Its finalized `<index>.seg` files are the resume anchor across runs.
    pub fn scratch_dir(&self) -> PathBuf {
        self.work_dir.join(format!("{}.tmp", self.save_name))
    }

    /// Final output file path: `<work_dir>/<save_name>`.
    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(&self.save_name)
    }

    /// Playlist source for this run; URL wins when both are set.
    pub fn playlist_source(&self) -> Result<PlaylistSource, PlaylistError> {
        if let Some(url) = &self.playlist_url {
            return Ok(PlaylistSource::Url(url.clone()));
        }
        if let Some(path) = &self.playlist_path {
            return Ok(PlaylistSource::File(path.clone()));
        }
        Err(PlaylistError::NoSource)
    }
}
