//! Relay between UI surfaces and a self-hosted youtube-dl backend.
//!
//! The [`application::broker`] receives untyped messages, routes them to the
//! [`api::BackendClient`], and replies exactly once. The
//! [`application::poll_loop`] tracks an accepted download until it finishes
//! or fails.

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod utils;
