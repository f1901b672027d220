#![forbid(unsafe_code)]

//! Lesson video catalog: a same-origin relay to the upstream content API, a
//! lazily expanded catalog tree with sidebar-style navigation, and transport
//! controls for the embedded video player.

pub mod catalog;
pub mod config;
pub mod logging;
pub mod models;
pub mod navigation;
pub mod playback;
pub mod player;
pub mod relay;
pub mod samples;
pub mod security;
pub mod tree;
