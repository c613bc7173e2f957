//! Catalog of playables
//!
//! The catalog is built once from the YAML configuration file. Loading is a
//! validated step: structural problems are collected and reported together,
//! sounds are decoded eagerly, and a playable whose sound fails to decode is
//! left out and remembered as failed rather than partially loaded.
//!
//! ```yaml
//! sounds:
//!   calm: ~/music/calm.ogg
//! comp tracks:
//!   ambient:
//!     tracks:
//!       quiet: calm
//!       battle: sounds/battle.ogg
//! tracklists:
//!   roleplay:
//!     shuffle: true
//!     tracks:
//!       npc1: sounds/npc1.ogg
//!       npc2: sounds/npc2.ogg
//! tracks:
//!   rain: sounds/rain.ogg
//! master volume: 80
//! playback:
//!   transition_ms: 2000
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{ Path, PathBuf };
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::buffer::AudioBuffer;
use crate::composite::CompositeTrack;
use crate::config::EngineConfig;
use crate::decoder;
use crate::error::PlaybackError;
use crate::playable::{ Playable, PlayableKind, Track };
use crate::tracklist::{ TrackList, TraversalPolicy };


/// Log file used when the config does not name one.
pub const DEFAULT_LOGFILE: &str = "bardcore.log";


/// One structural problem found while validating a config file.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum ConfigIssue {
    DuplicatePlayable { name: String },
    EmptyPlayable { name: String },
    MissingSound { playable: String, track: String, reference: String },
}


impl fmt::Display for ConfigIssue {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        match self {
            ConfigIssue::DuplicatePlayable { name } => {
                write!( f, "multiple playables named '{}'", name )
            }
            ConfigIssue::EmptyPlayable { name } => {
                write!( f, "'{}' has no tracks", name )
            }
            ConfigIssue::MissingSound { playable, track, reference } => {
                write!( f, "'{}/{}': '{}' is neither a sound alias nor an existing file", playable, track, reference )
            }
        }
    }
}


/// Errors that prevent a catalog from loading at all.
#[derive( Debug, Error )]
pub enum ConfigError {
    #[error( "Failed to read {path:?}: {source}" )]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error( "Invalid config: {0}" )]
    Parse( #[from] serde_yaml::Error ),

    #[error( "{} problem(s) in config: {}", .0.len(), join_issues( .0 ) )]
    Invalid( Vec<ConfigIssue> ),
}


fn join_issues( issues: &[ConfigIssue] ) -> String {
    issues.iter().map( |i| i.to_string() ).collect::<Vec<_>>().join( "; " )
}


/// A composite track section.
#[derive( Debug, Default, Deserialize )]
#[serde( default )]
pub struct CompositeSection {
    pub tracks: IndexMap<String, String>,
}


/// A track list section.
#[derive( Debug, Default, Deserialize )]
#[serde( default )]
pub struct TrackListSection {
    pub tracks: IndexMap<String, String>,
    pub shuffle: bool,
}


/// Raw contents of a config file.
#[derive( Debug, Default, Deserialize )]
#[serde( default )]
pub struct CatalogFile {
    /// Alias → path
    pub sounds: IndexMap<String, String>,

    #[serde( rename = "comp tracks" )]
    pub comp_tracks: IndexMap<String, CompositeSection>,

    pub tracklists: IndexMap<String, TrackListSection>,

    /// Bare looping tracks, name → path or alias
    pub tracks: IndexMap<String, String>,

    #[serde( rename = "master volume" )]
    pub master_volume: Option<f64>,

    pub logfile: Option<PathBuf>,

    pub playback: EngineConfig,
}


/// Non-fatal findings of a catalog load.
#[derive( Debug, Default )]
pub struct LoadReport {
    pub warnings: Vec<String>,
    /// Playables left out, with the reason
    pub failures: Vec<( String, String )>,
}


/// Validated recipe for one playable.
#[derive( Debug )]
struct Plan {
    name: String,
    kind: PlayableKind,
    policy: TraversalPolicy,
    /// ( track name, resolved path )
    tracks: Vec<( String, PathBuf )>,
}


impl CatalogFile {
    /// Reads and parses a config file.
    pub fn read( path: &Path ) -> Result<Self, ConfigError> {
        tracing::debug!( "Loading config from {:?}", path );
        let text = fs::read_to_string( path )
            .map_err( |source| ConfigError::Read { path: path.to_path_buf(), source } )?;
        Self::parse( &text )
    }


    pub fn parse( text: &str ) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok( Self::default() );
        }
        Ok( serde_yaml::from_str( text )? )
    }


    /// Log file location, relative paths resolved against `base_dir`.
    pub fn logfile_path( &self, base_dir: &Path ) -> PathBuf {
        let raw = self.logfile.clone().unwrap_or_else( || PathBuf::from( DEFAULT_LOGFILE ) );
        expand_path( &raw.to_string_lossy(), base_dir )
    }


    /// Master volume in 0-100, with a warning when the configured value is
    /// out of range and was replaced by 100.
    pub fn master_volume( &self ) -> ( u8, Option<String> ) {
        match self.master_volume {
            None => ( 100, None ),
            Some( v ) if ( 0.0..=100.0 ).contains( &v ) => ( v.round() as u8, None ),
            Some( v ) => ( 100, Some( format!(
                "Volume must be between 0 and 100! Ignoring value of '{}' and using 100 instead.",
                v
            ))),
        }
    }


    /// Checks the whole file and returns every problem found.
    fn validate( &self, base_dir: &Path ) -> Result<Vec<Plan>, Vec<ConfigIssue>> {
        let mut issues = Vec::new();
        let mut plans: Vec<Plan> = Vec::new();

        let sections = self.comp_tracks.iter()
            .map( |( name, s )| ( name, PlayableKind::Composite, TraversalPolicy::Sequential, s.tracks.clone() ) )
            .chain( self.tracklists.iter().map( |( name, s )| {
                let policy = if s.shuffle { TraversalPolicy::Shuffle } else { TraversalPolicy::Sequential };
                ( name, PlayableKind::TrackList, policy, s.tracks.clone() )
            }))
            .chain( self.tracks.iter().map( |( name, reference )| {
                let mut single = IndexMap::new();
                single.insert( name.clone(), reference.clone() );
                ( name, PlayableKind::Track, TraversalPolicy::Sequential, single )
            }));

        for ( name, kind, policy, tracks ) in sections {
            if plans.iter().any( |p| &p.name == name ) {
                issues.push( ConfigIssue::DuplicatePlayable { name: name.clone() } );
                continue;
            }
            if tracks.is_empty() {
                issues.push( ConfigIssue::EmptyPlayable { name: name.clone() } );
                continue;
            }

            let mut resolved = Vec::with_capacity( tracks.len() );
            for ( track, reference ) in tracks {
                let path = self.resolve_reference( &reference, base_dir );
                if !path.is_file() {
                    issues.push( ConfigIssue::MissingSound {
                        playable: name.clone(),
                        track: track.clone(),
                        reference: reference.clone(),
                    });
                }
                resolved.push(( track, path ));
            }

            plans.push( Plan { name: name.clone(), kind, policy, tracks: resolved } );
        }

        if issues.is_empty() { Ok( plans ) } else { Err( issues ) }
    }


    fn resolve_reference( &self, reference: &str, base_dir: &Path ) -> PathBuf {
        let raw = self.sounds.get( reference ).map( String::as_str ).unwrap_or( reference );
        expand_path( raw, base_dir )
    }
}


/// Expands a leading `~` and anchors relative paths at `base_dir`.
fn expand_path( raw: &str, base_dir: &Path ) -> PathBuf {
    let path = match raw.strip_prefix( "~/" ) {
        Some( rest ) => dirs::home_dir()
            .map( |home| home.join( rest ) )
            .unwrap_or_else( || PathBuf::from( raw ) ),
        None => PathBuf::from( raw ),
    };

    if path.is_absolute() { path } else { base_dir.join( path ) }
}


/// Definition of a playable, ready to be instantiated.
#[derive( Debug, Clone )]
pub enum PlayableDef {
    Composite { layers: Vec<( String, Arc<AudioBuffer> )> },
    TrackList { entries: Vec<( String, Arc<AudioBuffer> )>, policy: TraversalPolicy },
    Track { buffer: Arc<AudioBuffer> },
}


impl PlayableDef {
    pub fn kind( &self ) -> PlayableKind {
        match self {
            PlayableDef::Composite { .. } => PlayableKind::Composite,
            PlayableDef::TrackList { .. } => PlayableKind::TrackList,
            PlayableDef::Track { .. } => PlayableKind::Track,
        }
    }


    /// Builds a fresh, stopped playable with its own voices.
    pub fn instantiate( &self, name: &str, engine: &EngineConfig ) -> Result<Playable, PlaybackError> {
        Ok( match self {
            PlayableDef::Composite { layers } => {
                Playable::Composite( CompositeTrack::new( name, layers.clone(), engine.layer_swap() )? )
            }
            PlayableDef::TrackList { entries, policy } => {
                Playable::List( TrackList::new( name, entries.clone(), *policy )? )
            }
            PlayableDef::Track { buffer } => {
                Playable::Track( Track::new( name, Arc::clone( buffer ) ) )
            }
        })
    }
}


/// Read-only mapping of playable names to definitions.
#[derive( Debug )]
pub struct Catalog {
    entries: IndexMap<String, PlayableDef>,
    failed: IndexMap<String, String>,
    master_volume: u8,
    engine: EngineConfig,
}


impl Catalog {
    /// Creates an empty catalog at full volume.
    pub fn new( engine: EngineConfig ) -> Self {
        Self {
            entries: IndexMap::new(),
            failed: IndexMap::new(),
            master_volume: 100,
            engine,
        }
    }


    pub fn with_master_volume( mut self, volume: u8 ) -> Self {
        self.master_volume = volume.min( 100 );
        self
    }


    /// Adds or replaces a definition.
    pub fn insert( &mut self, name: impl Into<String>, def: PlayableDef ) {
        let name = name.into();
        self.failed.shift_remove( &name );
        self.entries.insert( name, def );
    }


    /// Records a playable that could not be loaded.
    pub fn mark_failed( &mut self, name: impl Into<String>, reason: impl Into<String> ) {
        let name = name.into();
        self.entries.shift_remove( &name );
        self.failed.insert( name, reason.into() );
    }


    /// Reads a config file and loads every sound it references.
    pub fn from_file( path: &Path ) -> Result<( Self, LoadReport ), ConfigError> {
        let file = CatalogFile::read( path )?;
        let base_dir = path.parent().unwrap_or( Path::new( "." ) );
        Self::load( file, base_dir )
    }


    /// Validates a parsed config and decodes its sounds.
    ///
    /// Identical paths are decoded once and shared between playables.
    pub fn load( file: CatalogFile, base_dir: &Path ) -> Result<( Self, LoadReport ), ConfigError> {
        let plans = file.validate( base_dir ).map_err( ConfigError::Invalid )?;
        tracing::debug!( "Loaded {} sound aliases from config", file.sounds.len() );

        let mut report = LoadReport::default();
        let ( master_volume, warning ) = file.master_volume();
        if let Some( warning ) = warning {
            tracing::warn!( "{}", warning );
            report.warnings.push( warning );
        }

        let format = file.playback.format();
        let mut catalog = Catalog::new( file.playback.clone() ).with_master_volume( master_volume );
        let mut cache: HashMap<PathBuf, Result<Arc<AudioBuffer>, String>> = HashMap::new();

        for plan in plans {
            let mut buffers = Vec::with_capacity( plan.tracks.len() );
            let mut failure = None;

            for ( track, path ) in &plan.tracks {
                let loaded = cache.entry( path.clone() ).or_insert_with( || {
                    decoder::load_buffer( track, path, format )
                        .map( Arc::new )
                        .map_err( |e| format!( "{:?}: {}", path, e ) )
                });
                match loaded {
                    Ok( buffer ) => buffers.push(( track.clone(), Arc::clone( buffer ) )),
                    Err( reason ) => {
                        failure = Some( reason.clone() );
                        break;
                    }
                }
            }

            if let Some( reason ) = failure {
                tracing::warn!( "Skipping '{}': {}", plan.name, reason );
                report.failures.push(( plan.name.clone(), reason.clone() ));
                catalog.mark_failed( plan.name, reason );
                continue;
            }

            let def = match plan.kind {
                PlayableKind::Composite => {
                    let lengths: Vec<_> = buffers.iter().map( |( _, b )| b.frames() ).collect();
                    if lengths.windows( 2 ).any( |w| w[ 0 ] != w[ 1 ] ) {
                        let warning = format!(
                            "Subtracks of '{}' differ in length; all of them loop at the shortest",
                            plan.name
                        );
                        tracing::warn!( "{}", warning );
                        report.warnings.push( warning );
                    }
                    PlayableDef::Composite { layers: buffers }
                }
                PlayableKind::TrackList => PlayableDef::TrackList { entries: buffers, policy: plan.policy },
                PlayableKind::Track => match buffers.into_iter().next() {
                    Some(( _, buffer )) => PlayableDef::Track { buffer },
                    None => continue,
                },
            };

            tracing::debug!( "Registering playable from config: {}", plan.name );
            catalog.insert( plan.name, def );
        }

        tracing::info!(
            "Finished loading config: {} playables, {} failed",
            catalog.entries.len(),
            catalog.failed.len()
        );
        Ok(( catalog, report ))
    }


    /// Looks up a playable definition by name.
    pub fn resolve( &self, name: &str ) -> Result<&PlayableDef, PlaybackError> {
        if let Some( def ) = self.entries.get( name ) {
            return Ok( def );
        }
        match self.failed.get( name ) {
            Some( reason ) => Err( PlaybackError::BufferLoadFailure {
                playable: name.to_string(),
                reason: reason.clone(),
            }),
            None => Err( PlaybackError::UnknownPlayable( name.to_string() ) ),
        }
    }


    /// Every playable, in config order.
    pub fn all( &self ) -> Vec<( &str, PlayableKind )> {
        self.entries.iter().map( |( name, def )| ( name.as_str(), def.kind() ) ).collect()
    }


    /// Playables that failed to load, with the reason.
    pub fn failures( &self ) -> impl Iterator<Item = ( &str, &str )> {
        self.failed.iter().map( |( name, reason )| ( name.as_str(), reason.as_str() ) )
    }


    pub fn master_volume( &self ) -> u8 {
        self.master_volume
    }


    pub fn engine( &self ) -> &EngineConfig {
        &self.engine
    }


    pub fn len( &self ) -> usize {
        self.entries.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.entries.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::time::Duration;


    const SAMPLE: &str = r#"
sounds:
  calm: calm.wav
comp tracks:
  ambient:
    tracks:
      quiet: calm
      battle: battle.wav
tracklists:
  roleplay:
    shuffle: true
    tracks:
      npc1: npc1.wav
      npc2: npc2.wav
tracks:
  rain: rain.wav
master volume: 80
playback:
  transition_ms: 1000
"#;


    fn touch_all( dir: &Path, names: &[&str] ) {
        for name in names {
            fs::write( dir.join( name ), b"" ).unwrap();
        }
    }


    #[test]
    fn test_parse_sections_in_order() {
        let file = CatalogFile::parse( SAMPLE ).unwrap();
        assert_eq!( file.comp_tracks[ "ambient" ].tracks.keys().collect::<Vec<_>>(), vec![ "quiet", "battle" ] );
        assert!( file.tracklists[ "roleplay" ].shuffle );
        assert_eq!( file.tracks[ "rain" ], "rain.wav" );
        assert_eq!( file.master_volume(), ( 80, None ) );
        assert_eq!( file.playback.transition(), Duration::from_secs( 1 ) );
    }


    #[test]
    fn test_empty_file_is_empty_catalog() {
        let file = CatalogFile::parse( "" ).unwrap();
        let ( catalog, report ) = Catalog::load( file, Path::new( "." ) ).unwrap();
        assert!( catalog.is_empty() );
        assert!( report.warnings.is_empty() );
        assert_eq!( catalog.master_volume(), 100 );
    }


    #[test]
    fn test_validation_resolves_aliases() {
        let dir = tempfile::tempdir().unwrap();
        touch_all( dir.path(), &[ "calm.wav", "battle.wav", "npc1.wav", "npc2.wav", "rain.wav" ] );

        let file = CatalogFile::parse( SAMPLE ).unwrap();
        let plans = file.validate( dir.path() ).unwrap();
        assert_eq!( plans.len(), 3 );
        assert_eq!( plans[ 0 ].tracks[ 0 ], ( "quiet".to_string(), dir.path().join( "calm.wav" ) ) );
        assert_eq!( plans[ 1 ].policy, TraversalPolicy::Shuffle );
        assert_eq!( plans[ 2 ].kind, PlayableKind::Track );
    }


    #[test]
    fn test_validation_collects_every_issue() {
        let dir = tempfile::tempdir().unwrap();
        touch_all( dir.path(), &[ "a.wav" ] );

        let text = r#"
comp tracks:
  ambient:
    tracks:
      quiet: a.wav
      battle: nowhere
  hollow: {}
tracklists:
  ambient:
    tracks:
      x: a.wav
"#;
        let file = CatalogFile::parse( text ).unwrap();
        let issues = file.validate( dir.path() ).unwrap_err();
        assert_eq!( issues, vec![
            ConfigIssue::MissingSound {
                playable: "ambient".into(),
                track: "battle".into(),
                reference: "nowhere".into(),
            },
            ConfigIssue::EmptyPlayable { name: "hollow".into() },
            ConfigIssue::DuplicatePlayable { name: "ambient".into() },
        ]);

        let err = Catalog::load( file, dir.path() ).unwrap_err();
        assert!( err.to_string().starts_with( "3 problem(s) in config" ) );
    }


    #[test]
    fn test_master_volume_out_of_range() {
        let file = CatalogFile::parse( "master volume: 150" ).unwrap();
        let ( volume, warning ) = file.master_volume();
        assert_eq!( volume, 100 );
        assert!( warning.is_some() );
    }


    #[test]
    fn test_logfile_relative_to_config() {
        let file = CatalogFile::parse( "logfile: logs/session.log" ).unwrap();
        assert_eq!( file.logfile_path( Path::new( "/campaign" ) ), PathBuf::from( "/campaign/logs/session.log" ) );

        let file = CatalogFile::default();
        assert_eq!( file.logfile_path( Path::new( "/campaign" ) ), PathBuf::from( "/campaign/bardcore.log" ) );
    }


    #[test]
    fn test_resolve_errors() {
        let mut catalog = Catalog::new( EngineConfig::default() );
        let buffer = Arc::new( AudioBuffer::silence( "rain", Duration::from_secs( 1 ), 1_000, 1 ) );
        catalog.insert( "rain", PlayableDef::Track { buffer } );
        catalog.mark_failed( "storm", "corrupt file" );

        assert_eq!( catalog.resolve( "rain" ).unwrap().kind(), PlayableKind::Track );
        assert_eq!(
            catalog.resolve( "storm" ).unwrap_err(),
            PlaybackError::BufferLoadFailure { playable: "storm".into(), reason: "corrupt file".into() }
        );
        assert_eq!( catalog.resolve( "wind" ).unwrap_err(), PlaybackError::UnknownPlayable( "wind".into() ) );
        assert_eq!( catalog.all(), vec![ ( "rain", PlayableKind::Track ) ] );
        assert_eq!( catalog.failures().collect::<Vec<_>>(), vec![ ( "storm", "corrupt file" ) ] );
    }


    #[test]
    fn test_undecodable_sound_marks_playable_failed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write( dir.path().join( "junk.wav" ), b"not really audio" ).unwrap();

        let file = CatalogFile::parse( "tracks:\n  junk: junk.wav\n" ).unwrap();
        let ( catalog, report ) = Catalog::load( file, dir.path() ).unwrap();
        assert!( catalog.is_empty() );
        assert_eq!( report.failures.len(), 1 );
        assert!( matches!( catalog.resolve( "junk" ), Err( PlaybackError::BufferLoadFailure { .. } ) ) );
    }
}
