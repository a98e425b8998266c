//! HTTP transport for playlist, key, and segment fetches.
//!
//! Thin wrapper over reqwest: configured timeout and proxy, base-URL
//! resolution for relative segment URIs, and a streaming fetch that reports
//! every written chunk to a byte counter. The engine treats every
//! `FetchError` as transient and charges it against the retry budget.

use bytes::Bytes;
use futures_util::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::config::DownloadConfig;

/// Transient fetch failure: request/transport error, non-success status,
/// body write error, or a watcher-declared attempt timeout.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{url} returned HTTP {status}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("invalid url {uri}: {source}")]
    Url {
        uri: String,
        source: url::ParseError,
    },
    #[error("writing response body failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// HTTP client shared by the whole run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: Option<Url>,
}

impl HttpClient {
    /// Builds a client from the run config: timeout, optional proxy, and the
    /// base URL (explicit, or the playlist URL with its basename trimmed).
    pub fn new(cfg: &DownloadConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .timeout(cfg.segment_timeout)
            .connect_timeout(cfg.segment_timeout);
        if let Some(proxy) = &cfg.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let inner = builder.build()?;

        let base_url = match (&cfg.base_url, &cfg.playlist_url) {
            (Some(base), _) => Some(parse_url(base)?),
            // "." resolves to the playlist's directory, e.g.
            // http://h/a/list.m3u8 -> http://h/a/
            (None, Some(playlist)) => parse_url(playlist)?.join(".").ok(),
            (None, None) => None,
        };

        Ok(Self { inner, base_url })
    }

    /// Resolves a possibly-relative URI against the base URL.
    pub fn resolve(&self, uri: &str) -> Result<Url, FetchError> {
        match Url::parse(uri) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base.join(uri).map_err(|source| FetchError::Url {
                    uri: uri.to_string(),
                    source,
                }),
                None => Err(FetchError::Url {
                    uri: uri.to_string(),
                    source: url::ParseError::RelativeUrlWithoutBase,
                }),
            },
            Err(source) => Err(FetchError::Url {
                uri: uri.to_string(),
                source,
            }),
        }
    }

    /// Fetches a URI fully into memory (playlist, key).
    pub async fn fetch(&self, uri: &str) -> Result<Bytes, FetchError> {
        let url = self.resolve(uri)?;
        let resp = self.inner.get(url.clone()).send().await?;
        check_status(&url, &resp)?;
        Ok(resp.bytes().await?)
    }

    /// Streams a URI into `file`, invoking `on_bytes` for every chunk written.
    /// Returns the number of bytes written. The file is flushed before return.
    pub async fn fetch_to_file<F>(
        &self,
        uri: &str,
        file: &mut tokio::fs::File,
        mut on_bytes: F,
    ) -> Result<u64, FetchError>
    where
        F: FnMut(usize),
    {
        let url = self.resolve(uri)?;
        let resp = self.inner.get(url.clone()).send().await?;
        check_status(&url, &resp)?;

        let mut written = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            on_bytes(chunk.len());
        }
        file.flush().await?;
        Ok(written)
    }
}

fn parse_url(s: &str) -> Result<Url, FetchError> {
    Url::parse(s).map_err(|source| FetchError::Url {
        uri: s.to_string(),
        source,
    })
}

fn check_status(url: &Url, resp: &reqwest::Response) -> Result<(), FetchError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status,
            url: url.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DownloadConfig, HlsgetConfig};
    use std::path::Path;

    fn config_with_playlist(url: &str) -> DownloadConfig {
        let mut cfg =
            DownloadConfig::from_defaults(&HlsgetConfig::default(), "out.bin", Path::new("."));
        cfg.playlist_url = Some(url.to_string());
        cfg
    }

    #[test]
    fn base_url_derived_from_playlist_url() {
        let client = HttpClient::new(&config_with_playlist("http://host/vod/ep1/list.m3u8")).unwrap();
        let resolved = client.resolve("seg0.ts").unwrap();
        assert_eq!(resolved.as_str(), "http://host/vod/ep1/seg0.ts");
    }

    #[test]
    fn explicit_base_url_wins() {
        let mut cfg = config_with_playlist("http://host/vod/ep1/list.m3u8");
        cfg.base_url = Some("http://cdn.host/media/".to_string());
        let client = HttpClient::new(&cfg).unwrap();
        let resolved = client.resolve("seg0.ts").unwrap();
        assert_eq!(resolved.as_str(), "http://cdn.host/media/seg0.ts");
    }

    #[test]
    fn absolute_uri_passes_through() {
        let client = HttpClient::new(&config_with_playlist("http://host/a/list.m3u8")).unwrap();
        let resolved = client.resolve("https://other/seg.ts").unwrap();
        assert_eq!(resolved.as_str(), "https://other/seg.ts");
    }

    #[test]
    fn relative_uri_without_base_is_an_error() {
        let cfg = DownloadConfig::from_defaults(&HlsgetConfig::default(), "o", Path::new("."));
        let client = HttpClient::new(&cfg).unwrap();
        assert!(matches!(
            client.resolve("seg0.ts"),
            Err(FetchError::Url { .. })
        ));
    }
}
