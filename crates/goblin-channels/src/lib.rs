//! # Goblin Channels
//! Chat platform adapters implementing `ThreadPlatform`.

pub mod discord;

pub use discord::DiscordThreads;
