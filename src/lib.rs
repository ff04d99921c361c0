//! Card face swap service
//!
//! Upload a photo, pick a Magic: The Gathering card print from Scryfall, and
//! get back a composite with your face on the card art. Generation runs on a
//! hosted Gradio model and can take over a minute, so submissions return a
//! job id at once and callers poll for the outcome.

pub mod app_state;
pub mod client;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
