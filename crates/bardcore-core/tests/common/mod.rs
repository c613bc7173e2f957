//! Shared fixtures for integration tests.

#![allow( dead_code )]

use std::f32::consts::PI;
use std::fs;
use std::path::{ Path, PathBuf };
use std::sync::Arc;
use std::time::Duration;

use bardcore_core::{ AudioBuffer, Catalog, EngineConfig, PlayableDef, TraversalPolicy };


/// Writes a 16-bit sine WAV and returns its path.
pub fn write_wav( dir: &Path, name: &str, secs: f32, sample_rate: u32, channels: u16 ) -> PathBuf {
    let path = dir.join( name );
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create( &path, spec ).unwrap();
    let frames = ( secs * sample_rate as f32 ) as u32;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let sample = ( ( 2.0 * PI * 220.0 * t ).sin() * i16::MAX as f32 * 0.5 ) as i16;
        for _ in 0..channels {
            writer.write_sample( sample ).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}


/// Writes `text` as config.yaml in `dir` and returns its path.
pub fn write_config( dir: &Path, text: &str ) -> PathBuf {
    let path = dir.join( "config.yaml" );
    fs::write( &path, text ).unwrap();
    path
}


pub fn silence( name: &str, millis: u64, sample_rate: u32 ) -> Arc<AudioBuffer> {
    Arc::new( AudioBuffer::silence( name, Duration::from_millis( millis ), sample_rate, 1 ) )
}


/// In-memory catalog at 1 kHz mono with short fades.
pub fn small_catalog() -> Catalog {
    let engine = EngineConfig {
        transition_ms: 1_000,
        layer_swap_ms: 10,
        stop_fade_ms: 50,
        tick_frames: 10,
        sample_rate: 1_000,
        channels: 1,
        ..EngineConfig::default()
    };
    let mut catalog = Catalog::new( engine );
    catalog.insert( "ambient", PlayableDef::Composite {
        layers: vec![
            ( "quiet".into(), silence( "quiet", 60_000, 1_000 ) ),
            ( "battle".into(), silence( "battle", 60_000, 1_000 ) ),
        ],
    });
    catalog.insert( "roleplay", PlayableDef::TrackList {
        entries: vec![
            ( "npc1".into(), silence( "npc1", 100, 1_000 ) ),
            ( "npc2".into(), silence( "npc2", 100, 1_000 ) ),
        ],
        policy: TraversalPolicy::Sequential,
    });
    catalog.insert( "rain", PlayableDef::Track { buffer: silence( "rain", 5_000, 1_000 ) } );
    catalog
}
