//! Media playlist retrieval and decoding.
//!
//! Produces the ordered segment URI list plus an optional encryption key
//! descriptor. Master playlists are out of scope and rejected.

use std::path::PathBuf;
use thiserror::Error;

use crate::crypto::{self, CryptoError, BLOCK_SIZE};
use crate::http::{FetchError, HttpClient};

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("no playlist URL or file configured")]
    NoSource,
    #[error("failed to fetch playlist: {0}")]
    Fetch(#[source] FetchError),
    #[error("failed to read playlist file: {0}")]
    Io(#[from] std::io::Error),
    #[error("playlist did not parse: {0}")]
    Parse(String),
    #[error("master playlists are not supported; pass a media playlist")]
    MasterNotSupported,
    #[error("encryption key has no URI")]
    KeyMissingUri,
    #[error("unsupported encryption method {0}; only AES-128 is supported")]
    UnsupportedKeyMethod(String),
    #[error("bad IV attribute: {0}")]
    BadIv(#[source] CryptoError),
}

/// Where the m3u8 document comes from.
#[derive(Debug, Clone)]
pub enum PlaylistSource {
    Url(String),
    File(PathBuf),
}

/// Key descriptor from the playlist's first AES-128 `EXT-X-KEY` tag.
#[derive(Debug, Clone)]
pub struct KeyDescriptor {
    pub key_uri: String,
    pub iv: Option<[u8; BLOCK_SIZE]>,
}

/// Decoded media playlist: ordered segment URIs and optional key descriptor.
#[derive(Debug, Clone)]
pub struct Playlist {
    pub segment_uris: Vec<String>,
    pub key: Option<KeyDescriptor>,
}

impl PlaylistSource {
    /// Fetches or reads the playlist document and decodes it.
    pub async fn load(&self, client: &HttpClient) -> Result<Playlist, PlaylistError> {
        let bytes = match self {
            PlaylistSource::Url(url) => client
                .fetch(url)
                .await
                .map_err(PlaylistError::Fetch)?
                .to_vec(),
            PlaylistSource::File(path) => tokio::fs::read(path).await?,
        };
        parse(&bytes)
    }
}

/// Decodes m3u8 bytes into a `Playlist`.
pub fn parse(bytes: &[u8]) -> Result<Playlist, PlaylistError> {
    let playlist = m3u8_rs::parse_playlist_res(bytes)
        .map_err(|e| PlaylistError::Parse(format!("{:?}", e)))?;
    let media = match playlist {
        m3u8_rs::Playlist::MediaPlaylist(media) => media,
        m3u8_rs::Playlist::MasterPlaylist(_) => return Err(PlaylistError::MasterNotSupported),
    };

    let mut segment_uris = Vec::with_capacity(media.segments.len());
    let mut key = None;
    for segment in &media.segments {
        if key.is_none() {
            if let Some(seg_key) = &segment.key {
                key = Some(decode_key(seg_key)?);
            }
        }
        segment_uris.push(segment.uri.clone());
    }

    Ok(Playlist { segment_uris, key })
}

fn decode_key(key: &m3u8_rs::Key) -> Result<KeyDescriptor, PlaylistError> {
    match key.method.as_str() {
        "AES-128" => {}
        // METHOD=NONE turns encryption off for the following segments;
        // with a single key per run that means no decryption at all.
        other => return Err(PlaylistError::UnsupportedKeyMethod(other.to_string())),
    }
    let key_uri = key
        .uri
        .clone()
        .filter(|u| !u.is_empty())
        .ok_or(PlaylistError::KeyMissingUri)?;
    let iv = match &key.iv {
        Some(iv) => Some(crypto::parse_iv(iv).map_err(PlaylistError::BadIv)?),
        None => None,
    };
    Ok(KeyDescriptor { key_uri, iv })
}
