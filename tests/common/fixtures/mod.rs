//! Builders for queues wired to fake collaborators.

use serenity::all::{ChannelId, GuildId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use quaver::commands::music::utils::music_manager::PlaybackSink;
use quaver::commands::music::utils::queue::{Queue, RequesterContext};
use quaver::commands::music::utils::song_catalog::SongCatalog;
use quaver::commands::music::utils::video_resolver::{
    PlaylistPage, VideoRecord, VideoResolver, canonical_url,
};
use quaver::utils::datastore::DataStore;

use super::mocks::{FakeSearch, FakeSink};

pub const GUILD: GuildId = GuildId::new(7);
pub const VOICE_CHANNEL: ChannelId = ChannelId::new(42);

pub fn video(video_id: &str, seconds: u64) -> VideoRecord {
    VideoRecord {
        video_id: video_id.to_string(),
        url: canonical_url(video_id),
        title: format!("song {video_id}"),
        duration: Duration::from_secs(seconds),
    }
}

pub fn requester() -> RequesterContext {
    RequesterContext {
        voice_channel: Some(VOICE_CHANNEL),
        guild_voice_channels: vec![VOICE_CHANNEL],
    }
}

fn temp_store() -> DataStore {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let name = format!(
        "quaver-itest-{}-{}.json",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    DataStore::new(std::env::temp_dir().join(name))
}

/// A queue plus handles to its fake sink and real catalog.
pub struct Harness {
    pub queue: Queue,
    pub sink: Arc<FakeSink>,
    pub catalog: Arc<SongCatalog>,
}

pub fn harness(videos: Vec<VideoRecord>, playlists: HashMap<String, PlaylistPage>) -> Harness {
    let sink = Arc::new(FakeSink::new());
    let catalog = Arc::new(SongCatalog::new(temp_store()));
    let resolver = Arc::new(VideoResolver::new(
        Arc::new(FakeSearch { videos, playlists }),
        Arc::clone(&catalog),
    ));
    let playback: Arc<dyn PlaybackSink> = sink.clone();
    let queue = Queue::new(GUILD, playback, resolver, Arc::clone(&catalog));
    Harness {
        queue,
        sink,
        catalog,
    }
}
