//! This module aggregates the bot's command handler sets.

pub mod music;
