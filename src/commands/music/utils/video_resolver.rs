//! Turns free-text names, URLs and playlist ids into video records.
//!
//! The search side is a trait so tests can substitute a fake; production
//! shells out to `yt-dlp`. Every successful resolution registers the video id
//! with the song catalog.

use serenity::async_trait;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::music_manager::MusicError;
use super::song_catalog::SongCatalog;

/// Builds the canonical watch URL for a video id.
pub fn canonical_url(video_id: &str) -> String {
    format!("https://youtube.com/watch?v={video_id}")
}

/// One resolved video. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRecord {
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub duration: Duration,
}

/// A resolved playlist. Entries that failed to resolve are dropped, order
/// preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistRecord {
    pub title: String,
    pub videos: Vec<VideoRecord>,
}

/// Raw playlist listing from the search collaborator: title plus entry ids.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistPage {
    pub title: String,
    pub entry_ids: Vec<String>,
}

/// The video-search collaborator boundary.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    /// First hit for a free-text query or direct URL; `None` for no match.
    async fn search_first(&self, query: &str) -> Result<Option<VideoRecord>, MusicError>;

    /// Playlist listing by id; `None` when the playlist does not exist.
    async fn fetch_playlist(&self, list_id: &str) -> Result<Option<PlaylistPage>, MusicError>;
}

pub struct VideoResolver {
    search: Arc<dyn VideoSearch>,
    catalog: Arc<SongCatalog>,
}

impl VideoResolver {
    pub fn new(search: Arc<dyn VideoSearch>, catalog: Arc<SongCatalog>) -> Self {
        Self { search, catalog }
    }

    /// Resolves a name or URL to a single video. An ordinary no-match is
    /// `Ok(None)`, never an error.
    pub async fn resolve(&self, query: &str) -> Result<Option<VideoRecord>, MusicError> {
        let Some(video) = self.search.search_first(query).await? else {
            return Ok(None);
        };
        self.catalog.add(&video.video_id).await;
        Ok(Some(video))
    }

    /// Resolves a video by id via its canonical URL.
    pub async fn resolve_by_id(&self, video_id: &str) -> Result<Option<VideoRecord>, MusicError> {
        self.resolve(&canonical_url(video_id)).await
    }

    /// Expands a playlist and resolves every entry individually, skipping
    /// entries that fail while preserving relative order.
    pub async fn resolve_playlist(
        &self,
        list_id: &str,
    ) -> Result<Option<PlaylistRecord>, MusicError> {
        let Some(page) = self.search.fetch_playlist(list_id).await? else {
            return Ok(None);
        };
        info!(list_id, title = %page.title, entries = page.entry_ids.len(), "expanding playlist");

        let mut videos = Vec::with_capacity(page.entry_ids.len());
        for entry_id in &page.entry_ids {
            match self.resolve_by_id(entry_id).await {
                Ok(Some(video)) => videos.push(video),
                Ok(None) => debug!(%entry_id, "dropping unresolvable playlist entry"),
                Err(error) => debug!(%entry_id, %error, "dropping playlist entry after lookup failure"),
            }
        }

        Ok(Some(PlaylistRecord {
            title: page.title,
            videos,
        }))
    }
}

/// Production search backend: `yt-dlp` as a subprocess, JSON output.
pub struct YtDlSearch;

impl YtDlSearch {
    /// True when the query is a direct video reference on a known host,
    /// with or without a scheme.
    pub fn is_video_url(query: &str) -> bool {
        match Url::parse(query) {
            Ok(url) => url.host_str().is_some_and(|host| {
                matches!(
                    host,
                    "www.youtube.com" | "youtube.com" | "m.youtube.com" | "youtu.be"
                )
            }),
            Err(_) => {
                let rest = query
                    .strip_prefix("www.")
                    .or_else(|| query.strip_prefix("m."))
                    .unwrap_or(query);
                rest.starts_with("youtube.com/") || rest.starts_with("youtu.be/")
            }
        }
    }

    fn run_yt_dlp(args: &[&str]) -> Result<Option<serde_json::Value>, MusicError> {
        let output = Command::new("yt-dlp")
            .args(args)
            .output()
            .map_err(|e| MusicError::SearchError(format!("failed to run yt-dlp: {e}")))?;

        // A non-zero exit is "no such video/playlist", not a fault.
        if !output.status.success() {
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(text.trim())
            .map(Some)
            .map_err(|e| MusicError::SearchError(format!("unreadable yt-dlp output: {e}")))
    }

    fn video_from_json(value: &serde_json::Value) -> Option<VideoRecord> {
        let video_id = value["id"].as_str()?.to_string();
        let title = value["title"].as_str().unwrap_or("Unknown title").to_string();
        let duration = Duration::from_secs_f64(value["duration"].as_f64().unwrap_or(0.0));
        let url = value["webpage_url"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| canonical_url(&video_id));
        Some(VideoRecord {
            video_id,
            url,
            title,
            duration,
        })
    }
}

#[async_trait]
impl VideoSearch for YtDlSearch {
    async fn search_first(&self, query: &str) -> Result<Option<VideoRecord>, MusicError> {
        let target = if Self::is_video_url(query) {
            query.to_string()
        } else {
            format!("ytsearch:{query}")
        };
        debug!(%target, "running yt-dlp lookup");

        match Self::run_yt_dlp(&["-j", "--no-playlist", &target])? {
            Some(value) => Ok(Self::video_from_json(&value)),
            None => Ok(None),
        }
    }

    async fn fetch_playlist(&self, list_id: &str) -> Result<Option<PlaylistPage>, MusicError> {
        let playlist_url = format!("https://youtube.com/playlist?list={list_id}");
        let Some(value) = Self::run_yt_dlp(&["-J", "--flat-playlist", &playlist_url])? else {
            return Ok(None);
        };

        let title = value["title"]
            .as_str()
            .unwrap_or("Unknown playlist")
            .to_string();
        let entry_ids = value["entries"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(PlaylistPage { title, entry_ids }))
    }
}
