//! Traveller Extractor - fills a five-traveller form from uploaded documents.
//!
//! The server side extracts text or an image from an upload and asks a chat
//! completion model for structured travellers. The form side keeps the
//! traveller slots, talks to the server and merges what comes back.

pub mod client;
pub mod config;
pub mod content;
pub mod controller;
pub mod error;
pub mod extractor;
pub mod form;
pub mod mapping;
pub mod openai;
pub mod progress;
pub mod schema;
pub mod server;
pub mod upload;
