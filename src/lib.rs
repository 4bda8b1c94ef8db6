//! # streamgrab
//!
//! This crate looks up videos through public, interchangeable API mirrors
//! (Piped-style `/api/v1/streams/{id}` endpoints) and picks the streams worth
//! offering: the best muxed video in a preferred container and the best
//! audio-only track, which can be converted to MP3 with `ffmpeg`.
//!
//! Mirrors are untrusted and rate-limited. The crate remembers the last one
//! that worked, probes all of them concurrently when it has to choose again,
//! and retries a failed request exactly once on a different mirror.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use streamgrab::{config::Config, progress::ConsoleProgress, session::{LookupOutcome, Session}};
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = Session::from_config(&Config::default()).unwrap();
//!
//!     // Accepts anything a user might paste
//!     let lookup = match session.lookup("https://youtu.be/dQw4w9WgXcQ").await.unwrap() {
//!         LookupOutcome::Ready(lookup) => lookup,
//!         _ => return,
//!     };
//!
//!     if let Ok(url) = lookup.video_link() {
//!         println!("Video: {}", url);
//!     }
//!
//!     let mp3 = session.convert_audio(&lookup, &ConsoleProgress).await.unwrap();
//!     println!("{} ({} bytes)", mp3.file_name, mp3.bytes.len());
//! }
//! ```
//!
//! The lower layers are usable on their own: [`video_id::extract_video_id`],
//! [`select::pick_best_muxed`], [`select::pick_best_audio`],
//! [`health::HealthCache`] and [`failover::Failover`].

#![forbid(unsafe_code)]
#[macro_use]
extern crate log;

pub mod client;
pub mod config;
pub mod failover;
pub mod health;
pub mod progress;
pub mod select;
pub mod session;
pub mod streams;
pub mod transcode;
pub mod video_id;
