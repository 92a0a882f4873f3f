//! Fake implementations of the playback and search collaborators.

use serenity::all::{ChannelId, GuildId};
use serenity::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use quaver::commands::music::utils::music_manager::{
    MusicError, PlaybackSink, StreamEndHook,
};
use quaver::commands::music::utils::video_resolver::{PlaylistPage, VideoRecord, VideoSearch};

/// In-memory playback sink. Records every started stream and keeps the
/// end-of-stream hooks so tests can fire stream completions by hand.
#[derive(Default)]
pub struct FakeSink {
    connected: Mutex<HashMap<GuildId, ChannelId>>,
    started: Mutex<Vec<(GuildId, String)>>,
    hooks: Mutex<Vec<StreamEndHook>>,
    releases: AtomicUsize,
    fail_next_play: AtomicBool,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Video ids in start order.
    pub fn started(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|(_, video_id)| video_id.clone())
            .collect()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.connected.lock().unwrap().contains_key(&guild_id)
    }

    pub fn fail_next_play(&self) {
        self.fail_next_play.store(true, Ordering::SeqCst);
    }

    /// The end hook of the most recently started stream.
    pub fn last_hook(&self) -> StreamEndHook {
        self.hooks
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no stream was started")
    }
}

#[async_trait]
impl PlaybackSink for FakeSink {
    async fn connected_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.connected.lock().unwrap().get(&guild_id).copied()
    }

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError> {
        self.connected.lock().unwrap().insert(guild_id, channel_id);
        Ok(())
    }

    async fn play(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        video: &VideoRecord,
        on_end: StreamEndHook,
    ) -> Result<(), MusicError> {
        if self.fail_next_play.swap(false, Ordering::SeqCst) {
            return Err(MusicError::AudioSourceError("fake failure".to_string()));
        }
        self.connected.lock().unwrap().insert(guild_id, channel_id);
        self.started
            .lock()
            .unwrap()
            .push((guild_id, video.video_id.clone()));
        self.hooks.lock().unwrap().push(on_end);
        Ok(())
    }

    async fn release(&self, guild_id: GuildId) {
        self.connected.lock().unwrap().remove(&guild_id);
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    async fn pause(&self, guild_id: GuildId) -> Result<(), MusicError> {
        if self.is_connected(guild_id) {
            Ok(())
        } else {
            Err(MusicError::NotConnected)
        }
    }

    async fn resume(&self, guild_id: GuildId) -> Result<(), MusicError> {
        if self.is_connected(guild_id) {
            Ok(())
        } else {
            Err(MusicError::NotConnected)
        }
    }
}

/// Search backend over a fixed set of videos. A query matches a video when it
/// contains the video id, so canonical URLs resolve too.
pub struct FakeSearch {
    pub videos: Vec<VideoRecord>,
    pub playlists: HashMap<String, PlaylistPage>,
}

#[async_trait]
impl VideoSearch for FakeSearch {
    async fn search_first(&self, query: &str) -> Result<Option<VideoRecord>, MusicError> {
        Ok(self
            .videos
            .iter()
            .find(|video| query.contains(&video.video_id))
            .cloned())
    }

    async fn fetch_playlist(&self, list_id: &str) -> Result<Option<PlaylistPage>, MusicError> {
        Ok(self.playlists.get(list_id).cloned())
    }
}
