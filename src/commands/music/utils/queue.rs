//! The per-guild playback queue state machine.
//!
//! A `Queue` is a cheap handle: shared state behind one tokio mutex plus the
//! playback sink, resolver and catalog. The mutex is held across the
//! suspension points of `advance`, so two enqueues racing on an idle queue
//! cannot both start playback. Each started stream carries a generation
//! number; end-of-stream callbacks for anything but the current generation
//! are ignored as stale (covers skip-replaced tracks and post-leave events).

use regex::Regex;
use serenity::all::{ChannelId, GuildId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::utils::random::{pick_uniform, shuffle};

use super::format_track_duration;
use super::music_manager::{MusicError, PlaybackSink, StreamEndHook, StreamOutcome};
use super::song_catalog::SongCatalog;
use super::video_resolver::{VideoRecord, VideoResolver};

/// Captures a playlist id out of a pasted URL, e.g. `...&list=PLabc123`.
static PLAYLIST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"list=([^&]*)").unwrap());

/// Where the requester sat when the command arrived, captured synchronously
/// from the gateway cache so the queue never touches it.
#[derive(Debug, Clone, Default)]
pub struct RequesterContext {
    /// The voice channel the requester is connected to, if any.
    pub voice_channel: Option<ChannelId>,
    /// Every voice channel in the guild, the fallback candidate pool.
    pub guild_voice_channels: Vec<ChannelId>,
}

#[derive(Default)]
struct QueueState {
    now_playing: Option<VideoRecord>,
    pending: VecDeque<VideoRecord>,
    loop_queue: bool,
    /// Bumped on every playback start and on leave; stale stream-end
    /// callbacks compare against it and bail.
    generation: u64,
}

enum Enqueued {
    Single(VideoRecord),
    Playlist { title: String, count: usize },
}

#[derive(Clone)]
pub struct Queue {
    guild_id: GuildId,
    inner: Arc<Mutex<QueueState>>,
    sink: Arc<dyn PlaybackSink>,
    resolver: Arc<VideoResolver>,
    catalog: Arc<SongCatalog>,
}

impl Queue {
    pub fn new(
        guild_id: GuildId,
        sink: Arc<dyn PlaybackSink>,
        resolver: Arc<VideoResolver>,
        catalog: Arc<SongCatalog>,
    ) -> Self {
        Self {
            guild_id,
            inner: Arc::new(Mutex::new(QueueState::default())),
            sink,
            resolver,
            catalog,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Resolves `query` (single video or playlist reference) and splices the
    /// result into the queue, starting playback when idle.
    ///
    /// With `at_front`, a playlist lands as one contiguous block ahead of the
    /// existing entries, playlist order intact. A playlist reference that
    /// yields no playable videos falls back to a plain single-video query.
    pub async fn enqueue(
        &self,
        requester: Option<&RequesterContext>,
        query: &str,
        at_front: bool,
    ) -> Result<String, MusicError> {
        let playlist = match PLAYLIST_RE.captures(query).and_then(|caps| caps.get(1)) {
            Some(list_id) if !list_id.as_str().is_empty() => {
                self.resolver.resolve_playlist(list_id.as_str()).await?
            }
            _ => None,
        };
        let playlist = playlist.filter(|list| !list.videos.is_empty());

        // Resolution is done before the state lock; splicing is synchronous.
        let enqueued = match playlist {
            Some(list) => {
                let mut state = self.inner.lock().await;
                let count = list.videos.len();
                if at_front {
                    for (offset, video) in list.videos.into_iter().enumerate() {
                        state.pending.insert(offset, video);
                    }
                } else {
                    state.pending.extend(list.videos);
                }
                Enqueued::Playlist {
                    title: list.title,
                    count,
                }
            }
            None => {
                let Some(video) = self.resolver.resolve(query).await? else {
                    return Ok(format!("Could not find {query}"));
                };
                let mut state = self.inner.lock().await;
                if at_front {
                    state.pending.push_front(video.clone());
                } else {
                    state.pending.push_back(video.clone());
                }
                Enqueued::Single(video)
            }
        };

        let mut state = self.inner.lock().await;
        let mut started_now = false;
        if state.now_playing.is_none() {
            self.advance_locked(&mut state, requester).await?;
            if state.now_playing.is_none() {
                return Ok(format!("Could not find {query}"));
            }
            started_now = true;
        }

        match enqueued {
            Enqueued::Single(_) if started_now => {
                let url = state
                    .now_playing
                    .as_ref()
                    .map(|video| video.url.clone())
                    .unwrap_or_default();
                Ok(format!("Now playing {url}"))
            }
            Enqueued::Single(video) => Ok(format!("Added {} to the queue", video.url)),
            Enqueued::Playlist { title, count } => Ok(format!(
                "Added {count} song{} from `{title}` to the queue",
                if count == 1 { "" } else { "s" }
            )),
        }
    }

    /// Picks a catalog song the queue does not already know and enqueues it.
    pub async fn enqueue_random(
        &self,
        requester: Option<&RequesterContext>,
        at_front: bool,
    ) -> Result<String, MusicError> {
        let known = self.song_id_list().await;
        match self.catalog.pick_random_excluding(&known).await {
            Some(name) => self.enqueue(requester, &name, at_front).await,
            None => Ok("Couldn't find any songs :(".to_string()),
        }
    }

    /// Forces the transition to the next song regardless of current state.
    pub async fn skip(&self, requester: Option<&RequesterContext>) -> Result<String, MusicError> {
        self.advance(requester).await?;
        Ok("Skipping...".to_string())
    }

    /// Moves the front of `pending` into `now_playing` and starts streaming
    /// it; with nothing pending, releases the voice connection instead.
    pub async fn advance(&self, requester: Option<&RequesterContext>) -> Result<(), MusicError> {
        let mut state = self.inner.lock().await;
        self.advance_locked(&mut state, requester).await
    }

    async fn advance_locked(
        &self,
        state: &mut QueueState,
        requester: Option<&RequesterContext>,
    ) -> Result<(), MusicError> {
        if state.loop_queue {
            if let Some(current) = state.now_playing.clone() {
                state.pending.push_back(current);
            }
        }

        state.now_playing = state.pending.pop_front();
        state.generation += 1;
        let generation = state.generation;

        let Some(video) = state.now_playing.clone() else {
            self.sink.release(self.guild_id).await;
            return Ok(());
        };

        let Some(channel) = self.choose_channel(requester).await else {
            self.clear_after_failure(state).await;
            return Err(MusicError::NoVoiceChannel);
        };

        if let Err(error) = self
            .sink
            .play(
                self.guild_id,
                channel,
                &video,
                self.stream_end_hook(generation),
            )
            .await
        {
            self.clear_after_failure(state).await;
            return Err(error);
        }

        info!(guild = %self.guild_id, title = %video.title, "advanced to next song");
        Ok(())
    }

    /// A connection or stream failure empties the queue and drops the voice
    /// connection before the error travels back to whoever triggered it.
    async fn clear_after_failure(&self, state: &mut QueueState) {
        state.now_playing = None;
        state.pending.clear();
        state.generation += 1;
        self.sink.release(self.guild_id).await;
    }

    /// Prefer the channel we already stream in, then the requester's channel,
    /// then any voice channel in the guild at random.
    async fn choose_channel(&self, requester: Option<&RequesterContext>) -> Option<ChannelId> {
        if let Some(channel) = self.sink.connected_channel(self.guild_id).await {
            return Some(channel);
        }
        let requester = requester?;
        requester
            .voice_channel
            .or_else(|| pick_uniform(&requester.guild_voice_channels).copied())
    }

    fn stream_end_hook(&self, generation: u64) -> StreamEndHook {
        let queue = self.clone();
        Arc::new(move |outcome| {
            let queue = queue.clone();
            Box::pin(async move { queue.on_stream_end(generation, outcome).await })
        })
    }

    /// Self-triggered follow-up when a started stream ends. Failures here are
    /// logged, not rethrown; only user-triggered operations propagate errors.
    async fn on_stream_end(&self, generation: u64, outcome: StreamOutcome) {
        let mut state = self.inner.lock().await;
        if state.generation != generation {
            debug!(guild = %self.guild_id, generation, "ignoring stale stream-end event");
            return;
        }

        match outcome {
            StreamOutcome::Finished => {
                if let Err(error) = self.advance_locked(&mut state, None).await {
                    warn!(guild = %self.guild_id, %error, "could not advance after song finished");
                }
            }
            StreamOutcome::Errored => {
                warn!(guild = %self.guild_id, "stream errored, leaving voice channel");
                self.clear_after_failure(&mut state).await;
            }
        }
    }

    /// Removes the pending entry at a 1-based position. The removed song is
    /// also deleted from the song catalog ("no longer wanted anywhere").
    pub async fn remove(&self, position: usize) -> String {
        let removed = {
            let mut state = self.inner.lock().await;
            position
                .checked_sub(1)
                .and_then(|index| state.pending.remove(index))
        };
        match removed {
            Some(video) => {
                self.catalog.remove(&video.video_id).await;
                format!("Removed `{}`", video.title)
            }
            None => format!("Could not remove {position}"),
        }
    }

    /// Randomly permutes `pending`; `now_playing` is untouched.
    pub async fn shuffle(&self) -> String {
        let mut state = self.inner.lock().await;
        let pending: Vec<VideoRecord> = state.pending.drain(..).collect();
        state.pending = shuffle(pending).into();
        "Shuffled!".to_string()
    }

    pub async fn toggle_loop(&self) -> String {
        let mut state = self.inner.lock().await;
        state.loop_queue = !state.loop_queue;
        if state.loop_queue {
            "Looping!".to_string()
        } else {
            "No longer looping.".to_string()
        }
    }

    /// A replayable command string reconstructing the queue via `!load`.
    pub async fn save(&self) -> String {
        format!("!load {}", self.song_id_list().await.join(","))
    }

    /// Resolves a comma-separated id list and appends the successes, then
    /// starts playback when idle. Individual failures are skipped silently;
    /// only the final count is reported.
    pub async fn load(
        &self,
        requester: Option<&RequesterContext>,
        ids: &str,
    ) -> Result<String, MusicError> {
        let mut count = 0usize;
        for id in ids.split(',').map(str::trim).filter(|id| !id.is_empty()) {
            match self.resolver.resolve_by_id(id).await {
                Ok(Some(video)) => {
                    self.inner.lock().await.pending.push_back(video);
                    count += 1;
                }
                Ok(None) => debug!(%id, "skipping unresolvable song id"),
                Err(error) => debug!(%id, %error, "skipping song id after lookup failure"),
            }
        }

        let mut state = self.inner.lock().await;
        if state.now_playing.is_none() {
            self.advance_locked(&mut state, requester).await?;
        }

        Ok(format!(
            "Loaded {count} song{}",
            if count == 1 { "" } else { "s" }
        ))
    }

    /// Clears everything and drops the voice connection. Idempotent.
    pub async fn leave(&self) -> String {
        let mut state = self.inner.lock().await;
        state.now_playing = None;
        state.pending.clear();
        state.generation += 1;
        self.sink.release(self.guild_id).await;
        "ok :(".to_string()
    }

    pub async fn currently_playing(&self) -> String {
        let state = self.inner.lock().await;
        Self::currently_playing_line(&state)
    }

    fn currently_playing_line(state: &QueueState) -> String {
        match &state.now_playing {
            None => "Not playing anything.".to_string(),
            Some(video) => format!(
                "Currently playing `{}` [{}]",
                video.title,
                format_track_duration(video.duration)
            ),
        }
    }

    /// Lists the current song plus up to ten pending entries, with a summary
    /// line for the rest and a trailing loop marker.
    pub async fn describe_queue(&self) -> String {
        let state = self.inner.lock().await;
        let mut entries: Vec<String> = state
            .pending
            .iter()
            .enumerate()
            .map(|(index, video)| {
                format!(
                    "**{})** `{}` [{}]",
                    index + 1,
                    video.title,
                    format_track_duration(video.duration)
                )
            })
            .collect();
        let queue_size = entries.len();
        if queue_size > 10 {
            entries.truncate(10);
            entries.push(format!("... plus {} more", queue_size - 10));
        }

        let mut lines = vec![
            Self::currently_playing_line(&state),
            String::new(),
            "Up next:".to_string(),
        ];
        lines.extend(entries);
        if state.loop_queue {
            lines.push(":repeat:".to_string());
        }
        lines.join("\n")
    }

    /// Every id the queue currently knows: `now_playing` first, then
    /// `pending` in order.
    pub async fn song_id_list(&self) -> Vec<String> {
        let state = self.inner.lock().await;
        state
            .now_playing
            .iter()
            .chain(state.pending.iter())
            .map(|video| video.video_id.clone())
            .collect()
    }

    pub async fn now_playing(&self) -> Option<VideoRecord> {
        self.inner.lock().await.now_playing.clone()
    }

    pub async fn pending(&self) -> Vec<VideoRecord> {
        self.inner.lock().await.pending.iter().cloned().collect()
    }
}

/// Lazily creates and hands out the one `Queue` per guild. Queues are never
/// evicted; guild count is bounded by bot installs.
pub struct QueueRegistry {
    queues: Mutex<HashMap<GuildId, Queue>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(
        &self,
        guild_id: GuildId,
        create: impl FnOnce() -> Queue,
    ) -> Queue {
        self.queues
            .lock()
            .await
            .entry(guild_id)
            .or_insert_with(create)
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.queues.lock().await.len()
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new()
    }
}
