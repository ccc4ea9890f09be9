//! mirrorberg core library.
//!
//! This crate provides the foundational components for mirroring GitHub
//! repositories to Codeberg: configuration, the error taxonomy, the domain
//! model, the exclusion list loader, both platform API clients, the
//! git2-based mirror pusher, and the shared bounded-retry utility.

pub mod codeberg;
pub mod config;
pub mod errors;
pub mod exclusions;
pub mod github;
pub mod models;
pub mod pusher;
pub mod retry;

// Re-exports for convenience.
pub use codeberg::CodebergClient;
pub use config::AppConfig;
pub use errors::CoreError;
pub use exclusions::ExclusionSet;
pub use github::GitHubClient;
pub use pusher::MirrorPusher;
