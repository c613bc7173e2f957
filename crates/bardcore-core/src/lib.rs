//! Bardcore Core - background music engine
//!
//! This crate provides playback of layered composite tracks, track lists
//! and looping tracks with crossfaded transitions, driven by a single
//! ticker thread and configured from a YAML catalog.

pub mod buffer;
pub mod catalog;
pub mod command;
pub mod composite;
pub mod config;
pub mod decoder;
pub mod director;
pub mod error;
pub mod fade;
pub mod output;
pub mod playable;
pub mod ticker;
pub mod tracklist;
pub mod voice;

pub use buffer::AudioBuffer;
pub use catalog::{ Catalog, CatalogFile, ConfigError, ConfigIssue, LoadReport, PlayableDef };
pub use command::{ help_text, Command, CommandError };
pub use composite::CompositeTrack;
pub use config::EngineConfig;
pub use decoder::{ DecoderError, EngineFormat };
pub use director::{ DirectorEvent, DirectorState, Listing, PlaybackDirector, Reply, Request, Status };
pub use error::PlaybackError;
pub use fade::FadeCurve;
pub use output::{ AudioOutput, ClockSink, OutputError, SampleBuffer, Sink };
pub use playable::{ Playable, PlayableKind, Track };
pub use ticker::{ DirectorHandle, Ticker, TickerError };
pub use tracklist::{ TrackList, TraversalPolicy };
pub use voice::{ Voice, VoiceError, VoiceStatus };
