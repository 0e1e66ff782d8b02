// ABOUTME: Public library API for Penzu journal export
// ABOUTME: Re-exports the exporter, transcoder and supporting modules

pub mod api;
pub mod cli;
pub mod config;
pub mod enex;
pub mod error;
pub mod export;
pub mod model;
pub mod oauth;
pub mod session;
pub mod storage;
pub mod util;

pub use error::{Error, Result};
pub use model::{Entry, EntryPage, ImageRef, JournalInfo, RemoteEntry, RemoteId};
