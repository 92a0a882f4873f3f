//! The bot's owned state, built once at startup and shared by `Arc`.

use serenity::all::GuildId;
use std::sync::Arc;

use crate::commands::music::utils::music_manager::PlaybackSink;
use crate::commands::music::utils::queue::{Queue, QueueRegistry};
use crate::commands::music::utils::song_catalog::SongCatalog;
use crate::commands::music::utils::video_resolver::{VideoResolver, VideoSearch};
use crate::events::MessageEvent;
use crate::questions::QuestionRegistry;
use crate::utils::datastore::DataStore;

pub struct BotState {
    pub queues: QueueRegistry,
    pub catalog: Arc<SongCatalog>,
    pub resolver: Arc<VideoResolver>,
    pub questions: QuestionRegistry<MessageEvent>,
    pub sink: Arc<dyn PlaybackSink>,
}

impl BotState {
    pub fn new(sink: Arc<dyn PlaybackSink>, search: Arc<dyn VideoSearch>, store: DataStore) -> Self {
        let catalog = Arc::new(SongCatalog::new(store));
        let resolver = Arc::new(VideoResolver::new(search, Arc::clone(&catalog)));
        Self {
            queues: QueueRegistry::new(),
            catalog,
            resolver,
            questions: QuestionRegistry::new(),
            sink,
        }
    }

    /// The guild's queue, created on first use.
    pub async fn queue(&self, guild_id: GuildId) -> Queue {
        self.queues
            .get_or_create(guild_id, || {
                Queue::new(
                    guild_id,
                    Arc::clone(&self.sink),
                    Arc::clone(&self.resolver),
                    Arc::clone(&self.catalog),
                )
            })
            .await
    }
}
