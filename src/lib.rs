use std::sync::LazyLock;

pub mod commands;
pub mod dispatcher;
pub mod events;
pub mod questions;
pub mod state;
pub mod utils;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Shared HTTP client, handed to songbird's lazy `YoutubeDl` inputs.
pub static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(reqwest::Client::new);
