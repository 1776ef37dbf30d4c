/// Room access & membership subsystem for capacity-bounded collaboration
/// rooms: creation, discovery, password-gated entry and role-based
/// moderation. The rendering surface, live transport and identity issuance
/// are external collaborators; this crate owns the membership state
/// machine and exposes it over REST plus a broadcast membership feed.

pub mod access;
pub mod config;
pub mod credential;
pub mod db;
pub mod error;
pub mod events;
pub mod handlers;
pub mod moderation;
pub mod server;
