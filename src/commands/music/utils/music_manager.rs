//! The voice-playback boundary: error taxonomy, the [`PlaybackSink`] trait the
//! queue drives, and its songbird-backed production implementation.

use dashmap::DashMap;
use futures::future::BoxFuture;
use serenity::all::{ChannelId, GuildId};
use serenity::async_trait;
use songbird::input::YoutubeDl;
use songbird::{Event, Songbird, TrackEvent};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::event_handlers::StreamEndNotifier;
use super::video_resolver::VideoRecord;

/// Errors that can occur during music operations. Display strings double as
/// the user-facing failure sentences.
#[derive(Error, Debug)]
pub enum MusicError {
    #[error("Could not join the voice channel: {0}")]
    JoinError(String),

    #[error("Not connected to a voice channel.")]
    NotConnected,

    #[error("Couldn't find a voice channel to play in.")]
    NoVoiceChannel,

    #[error("Audio playback error: {0}")]
    AudioSourceError(String),

    #[error("Song lookup failed: {0}")]
    SearchError(String),
}

/// How a started stream came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Finished,
    Errored,
}

/// Callback a [`PlaybackSink`] fires when a started stream ends. May fire
/// harmlessly after the queue has already moved on or left.
pub type StreamEndHook = Arc<dyn Fn(StreamOutcome) -> BoxFuture<'static, ()> + Send + Sync>;

/// What the per-guild queue needs from the voice layer. Production wraps
/// songbird; tests substitute a fake.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// The voice channel this guild's connection currently sits in, if any.
    async fn connected_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError>;

    /// Starts streaming `video` in `channel_id`, joining if necessary.
    /// Replaces any stream already playing for the guild.
    async fn play(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        video: &VideoRecord,
        on_end: StreamEndHook,
    ) -> Result<(), MusicError>;

    /// Drops the guild's voice connection. Idempotent, best-effort.
    async fn release(&self, guild_id: GuildId);

    async fn pause(&self, guild_id: GuildId) -> Result<(), MusicError>;

    async fn resume(&self, guild_id: GuildId) -> Result<(), MusicError>;
}

/// Songbird-backed sink. At most one active track per guild.
pub struct SongbirdSink {
    songbird: Arc<Songbird>,
    http: reqwest::Client,
    tracks: DashMap<GuildId, songbird::tracks::TrackHandle>,
}

impl SongbirdSink {
    pub fn new(songbird: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self {
            songbird,
            http,
            tracks: DashMap::new(),
        }
    }
}

#[async_trait]
impl PlaybackSink for SongbirdSink {
    async fn connected_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.songbird.get(guild_id)?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId::new(channel.0.get()))
    }

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), MusicError> {
        self.songbird
            .join(guild_id, channel_id)
            .await
            .map(|_| ())
            .map_err(|e| MusicError::JoinError(e.to_string()))
    }

    async fn play(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        video: &VideoRecord,
        on_end: StreamEndHook,
    ) -> Result<(), MusicError> {
        let call = match self.songbird.get(guild_id) {
            Some(call) => call,
            None => self
                .songbird
                .join(guild_id, channel_id)
                .await
                .map_err(|e| MusicError::JoinError(e.to_string()))?,
        };

        // One track per guild: the previous one is stopped before the new one
        // starts. Its end event still fires, but the queue treats it as stale.
        if let Some((_, old)) = self.tracks.remove(&guild_id) {
            let _ = old.stop();
        }

        let input = YoutubeDl::new(self.http.clone(), video.url.clone());
        let mut handler = call.lock().await;
        let handle = handler.play_input(input.into());
        info!(guild = %guild_id, title = %video.title, "started stream");

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                StreamEndNotifier::new(StreamOutcome::Finished, Arc::clone(&on_end)),
            )
            .map_err(|e| MusicError::AudioSourceError(e.to_string()))?;
        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                StreamEndNotifier::new(StreamOutcome::Errored, on_end),
            )
            .map_err(|e| MusicError::AudioSourceError(e.to_string()))?;

        drop(handler);
        self.tracks.insert(guild_id, handle);
        Ok(())
    }

    async fn release(&self, guild_id: GuildId) {
        self.tracks.remove(&guild_id);
        if self.songbird.get(guild_id).is_some() {
            if let Err(e) = self.songbird.remove(guild_id).await {
                warn!(guild = %guild_id, error = %e, "could not leave voice channel");
            }
        } else {
            debug!(guild = %guild_id, "release with no active connection");
        }
    }

    async fn pause(&self, guild_id: GuildId) -> Result<(), MusicError> {
        match self.tracks.get(&guild_id) {
            Some(handle) => handle
                .pause()
                .map_err(|e| MusicError::AudioSourceError(e.to_string())),
            None => Err(MusicError::NotConnected),
        }
    }

    async fn resume(&self, guild_id: GuildId) -> Result<(), MusicError> {
        match self.tracks.get(&guild_id) {
            Some(handle) => handle
                .play()
                .map_err(|e| MusicError::AudioSourceError(e.to_string())),
            None => Err(MusicError::NotConnected),
        }
    }
}
