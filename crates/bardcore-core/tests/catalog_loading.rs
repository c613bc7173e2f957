mod common;

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;

use bardcore_core::{
    Catalog, ConfigError, ConfigIssue, DirectorState, PlayableDef, PlayableKind, PlaybackDirector,
    PlaybackError, TraversalPolicy,
};

use common::{ write_config, write_wav };


const CONFIG: &str = r#"
sounds:
  calm: sounds/calm.wav
  fight: sounds/fight.wav

comp tracks:
  ambient:
    tracks:
      quiet: calm
      battle: fight

tracklists:
  roleplay:
    shuffle: true
    tracks:
      npc1: sounds/npc1.wav
      npc2: sounds/npc2.wav

tracks:
  rain: calm

master volume: 70

playback:
  sample_rate: 8000
  channels: 1
  transition_ms: 500
"#;


fn fixture() -> ( tempfile::TempDir, Catalog ) {
    let dir = tempfile::tempdir().unwrap();
    let sounds = dir.path().join( "sounds" );
    std::fs::create_dir( &sounds ).unwrap();
    write_wav( &sounds, "calm.wav", 2.0, 8_000, 1 );
    write_wav( &sounds, "fight.wav", 2.0, 8_000, 1 );
    // Different rate and layout: converted to the engine format on load
    write_wav( &sounds, "npc1.wav", 1.0, 16_000, 2 );
    write_wav( &sounds, "npc2.wav", 1.0, 8_000, 2 );

    let path = write_config( dir.path(), CONFIG );
    let ( catalog, report ) = Catalog::from_file( &path ).unwrap();
    assert!( report.failures.is_empty() );
    assert!( report.warnings.is_empty() );
    ( dir, catalog )
}


#[test]
fn test_catalog_from_yaml() {
    let ( _dir, catalog ) = fixture();

    assert_eq!( catalog.all(), vec![
        ( "ambient", PlayableKind::Composite ),
        ( "roleplay", PlayableKind::TrackList ),
        ( "rain", PlayableKind::Track ),
    ]);
    assert_eq!( catalog.master_volume(), 70 );
    assert_eq!( catalog.engine().transition(), Duration::from_millis( 500 ) );

    match catalog.resolve( "roleplay" ).unwrap() {
        PlayableDef::TrackList { entries, policy } => {
            assert_eq!( *policy, TraversalPolicy::Shuffle );
            let npc1 = &entries[ 0 ].1;
            assert_eq!( npc1.sample_rate(), 8_000 );
            assert_eq!( npc1.channels(), 1 );
            assert_relative_eq!( npc1.duration().as_secs_f64(), 1.0, epsilon = 0.02 );
        }
        other => panic!( "unexpected definition {:?}", other ),
    }
}


#[test]
fn test_shared_sound_decoded_once() {
    let ( _dir, catalog ) = fixture();

    let quiet = match catalog.resolve( "ambient" ).unwrap() {
        PlayableDef::Composite { layers } => Arc::clone( &layers[ 0 ].1 ),
        other => panic!( "unexpected definition {:?}", other ),
    };
    let rain = match catalog.resolve( "rain" ).unwrap() {
        PlayableDef::Track { buffer } => Arc::clone( buffer ),
        other => panic!( "unexpected definition {:?}", other ),
    };
    assert!( Arc::ptr_eq( &quiet, &rain ) );
}


#[test]
fn test_missing_sound_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config( dir.path(), "tracks:\n  rain: nowhere.wav\n" );

    match Catalog::from_file( &path ) {
        Err( ConfigError::Invalid( issues ) ) => assert!( matches!(
            issues.as_slice(),
            [ ConfigIssue::MissingSound { .. } ]
        )),
        other => panic!( "expected validation failure, got {:?}", other.map( |_| () ) ),
    }
}


#[test]
fn test_layered_session() {
    let ( _dir, catalog ) = fixture();
    let mut director = PlaybackDirector::new( Arc::new( catalog ) );
    assert_eq!( director.volume(), 70 );

    director.play( "ambient" ).unwrap();
    director.tick( Duration::from_millis( 1_500 ) );
    director.switch_subtrack( "battle" ).unwrap();

    let ambient = director.playing().unwrap().as_composite().unwrap();
    assert_eq!( ambient.active_subtrack(), "battle" );
    assert_eq!( ambient.voice( "battle" ).unwrap().position(), Duration::from_millis( 1_500 ) );
    assert_eq!( ambient.voice( "quiet" ).unwrap().position(), Duration::from_millis( 1_500 ) );

    // Past the two second loop point both layers wrap together
    director.tick( Duration::from_millis( 1_000 ) );
    let ambient = director.playing().unwrap().as_composite().unwrap();
    assert_eq!( ambient.position(), Duration::from_millis( 500 ) );
    assert_eq!(
        ambient.voice( "battle" ).unwrap().position(),
        ambient.voice( "quiet" ).unwrap().position()
    );

    director.play_from( "roleplay", Some( "npc2" ) ).unwrap();
    assert_eq!( director.state(), DirectorState::Transitioning );
    director.tick( Duration::from_millis( 500 ) );
    assert_eq!( director.state(), DirectorState::Playing );
    assert_eq!( director.current_track().unwrap(), "npc2" );

    assert_eq!(
        director.play_from( "roleplay", Some( "npc9" ) ).unwrap_err(),
        PlaybackError::UnknownSubtrack { playable: "roleplay".into(), subtrack: "npc9".into() }
    );
}


#[test]
fn test_rendered_block_is_scaled_by_master_volume() {
    let ( _dir, catalog ) = fixture();
    let mut director = PlaybackDirector::new( Arc::new( catalog ) );
    director.play( "rain" ).unwrap();

    let mut loud = vec![ 0.0_f32; 400 ];
    director.set_volume( 100 ).unwrap();
    director.render( &mut loud );

    let mut quiet = vec![ 0.0_f32; 400 ];
    director.set_volume( 25 ).unwrap();
    director.render( &mut quiet );

    let peak = loud.iter().fold( 0.0_f32, |m, s| m.max( s.abs() ) );
    assert!( peak > 0.1 );
    for ( l, q ) in loud.iter().zip( &quiet ) {
        assert_relative_eq!( *q, *l * 0.25, epsilon = 1e-6 );
    }
}
