//! Process-wide catalog of every song id the bot has ever resolved.
//!
//! Backs the `!random` commands. Mutations persist through the datastore on a
//! best-effort basis; a failed save never reaches the caller.

use std::collections::HashSet;
use tokio::sync::Mutex;

use crate::utils::datastore::{DataDocument, DataStore};
use crate::utils::random::pick_uniform;

use super::video_resolver::canonical_url;

pub struct SongCatalog {
    songs: Mutex<Vec<String>>,
    store: DataStore,
}

impl SongCatalog {
    /// Loads the catalog from the store; an unreadable store means empty.
    pub fn new(store: DataStore) -> Self {
        let document = store.load();
        Self {
            songs: Mutex::new(document.all_songs),
            store,
        }
    }

    /// Adds a song id. No-op when already present.
    pub async fn add(&self, video_id: &str) {
        let mut songs = self.songs.lock().await;
        if songs.iter().any(|known| known == video_id) {
            return;
        }
        songs.push(video_id.to_string());
        self.persist(&songs);
    }

    /// Removes a song id. No-op when absent.
    pub async fn remove(&self, video_id: &str) {
        let mut songs = self.songs.lock().await;
        let before = songs.len();
        songs.retain(|known| known != video_id);
        if songs.len() != before {
            self.persist(&songs);
        }
    }

    /// Uniform pick over catalog entries outside `exclude`, mapped to the
    /// canonical watch URL. `None` when nothing is left to pick.
    pub async fn pick_random_excluding(&self, exclude: &[String]) -> Option<String> {
        let songs = self.songs.lock().await;
        let excluded: HashSet<&str> = exclude.iter().map(String::as_str).collect();
        let candidates: Vec<&String> = songs
            .iter()
            .filter(|video_id| !excluded.contains(video_id.as_str()))
            .collect();
        pick_uniform(&candidates).map(|video_id| canonical_url(video_id))
    }

    pub async fn snapshot(&self) -> Vec<String> {
        self.songs.lock().await.clone()
    }

    fn persist(&self, songs: &[String]) {
        let _ = self.store.persist(DataDocument {
            all_songs: songs.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn temp_catalog() -> SongCatalog {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let name = format!(
            "quaver-catalog-test-{}-{}.json",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        SongCatalog::new(DataStore::new(std::env::temp_dir().join(name)))
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let catalog = temp_catalog();
        catalog.add("alpha").await;
        catalog.add("alpha").await;
        assert_eq!(catalog.snapshot().await, vec!["alpha".to_string()]);
    }

    #[tokio::test]
    async fn remove_absent_is_a_no_op() {
        let catalog = temp_catalog();
        catalog.add("alpha").await;
        catalog.remove("missing").await;
        catalog.remove("alpha").await;
        assert!(catalog.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn random_pick_maps_to_the_canonical_url() {
        let catalog = temp_catalog();
        catalog.add("alpha").await;
        assert_eq!(
            catalog.pick_random_excluding(&[]).await,
            Some("https://youtube.com/watch?v=alpha".to_string())
        );
    }

    #[tokio::test]
    async fn random_pick_respects_exclusions() {
        let catalog = temp_catalog();
        catalog.add("alpha").await;
        catalog.add("bravo").await;
        let picked = catalog
            .pick_random_excluding(&["alpha".to_string()])
            .await
            .unwrap();
        assert_eq!(picked, canonical_url("bravo"));
    }

    #[tokio::test]
    async fn random_pick_over_an_exhausted_catalog_is_none() {
        let catalog = temp_catalog();
        assert_eq!(catalog.pick_random_excluding(&[]).await, None);

        catalog.add("alpha").await;
        assert_eq!(
            catalog.pick_random_excluding(&["alpha".to_string()]).await,
            None
        );
    }
}
