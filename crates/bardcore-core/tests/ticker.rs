mod common;

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{ Duration, Instant };

use bardcore_core::{
    ClockSink, DirectorEvent, DirectorState, PlaybackDirector, PlaybackError, SampleBuffer, Sink,
    Ticker, TickerError,
};

use common::small_catalog;


fn spawn() -> ( Ticker, Receiver<DirectorEvent> ) {
    let catalog = small_catalog();
    let sink = Arc::new( ClockSink::new( catalog.engine().format() ) );
    Ticker::spawn( PlaybackDirector::new( Arc::new( catalog ) ), sink ).unwrap()
}


/// Waits for the first event matching `wanted`.
fn wait_for( events: &Receiver<DirectorEvent>, wanted: impl Fn( &DirectorEvent ) -> bool ) -> DirectorEvent {
    let deadline = Instant::now() + Duration::from_secs( 5 );
    loop {
        let left = deadline.saturating_duration_since( Instant::now() );
        let event = events.recv_timeout( left ).expect( "event did not arrive in time" );
        if wanted( &event ) {
            return event;
        }
    }
}


#[test]
fn test_requests_round_trip() {
    let ( ticker, _events ) = spawn();
    let handle = ticker.handle();

    handle.play_from( "ambient", Some( "battle" ) ).unwrap();
    let status = handle.status().unwrap();
    assert_eq!( status.state, DirectorState::Playing );
    assert_eq!( status.playable.as_deref(), Some( "ambient" ) );
    assert_eq!( status.track.as_deref(), Some( "battle" ) );

    let listing = handle.list().unwrap();
    assert_eq!( listing.playables.len(), 3 );
    assert_eq!( listing.subtracks, Some( vec![ "quiet".to_string(), "battle".to_string() ] ) );

    handle.switch_subtrack( "quiet" ).unwrap();
    assert_eq!( handle.status().unwrap().track.as_deref(), Some( "quiet" ) );

    handle.stop().unwrap();
    assert_eq!( handle.status().unwrap().state, DirectorState::Idle );
}


#[test]
fn test_errors_come_back_typed() {
    let ( ticker, _events ) = spawn();
    let handle = ticker.handle();

    assert!( matches!(
        handle.set_volume( 150 ),
        Err( TickerError::Playback( PlaybackError::OutOfRange( 150 ) ) )
    ));
    assert!( matches!(
        handle.play( "dragon" ),
        Err( TickerError::Playback( PlaybackError::UnknownPlayable( _ ) ) )
    ));
    assert!( matches!(
        handle.switch_subtrack( "battle" ),
        Err( TickerError::Playback( PlaybackError::NotACompositeTrack ) )
    ));

    handle.set_volume( 0 ).unwrap();
    assert_eq!( handle.status().unwrap().volume, 0 );
}


#[test]
fn test_transition_completes_in_real_time() {
    let ( ticker, events ) = spawn();
    let handle = ticker.handle();

    handle.play( "ambient" ).unwrap();
    handle.play( "rain" ).unwrap();
    assert_eq!( handle.status().unwrap().state, DirectorState::Transitioning );

    let event = wait_for( &events, |e| matches!( e, DirectorEvent::TransitionComplete { .. } ) );
    assert_eq!( event, DirectorEvent::TransitionComplete { playable: "rain".into() } );
    assert_eq!( handle.status().unwrap().state, DirectorState::Playing );
}


#[test]
fn test_track_list_advances_on_its_own() {
    let ( ticker, events ) = spawn();
    ticker.handle().play( "roleplay" ).unwrap();

    let event = wait_for( &events, |e| matches!( e, DirectorEvent::EntryAdvanced { .. } ) );
    assert_eq!( event, DirectorEvent::EntryAdvanced { playable: "roleplay".into(), entry: "npc2".into() } );
}


#[test]
fn test_fade_out_ends_idle() {
    let ( ticker, events ) = spawn();
    let handle = ticker.handle();

    handle.play( "rain" ).unwrap();
    handle.stop_with_fade().unwrap();
    wait_for( &events, |e| matches!( e, DirectorEvent::Stopped { .. } ) );
    assert_eq!( handle.status().unwrap().state, DirectorState::Idle );
}


#[test]
fn test_handles_from_many_threads() {
    let ( ticker, _events ) = spawn();

    let workers: Vec<_> = [ "ambient", "roleplay", "rain" ]
        .into_iter()
        .map( |name| {
            let handle = ticker.handle();
            thread::spawn( move || handle.play( name ) )
        })
        .collect();
    for worker in workers {
        worker.join().unwrap().unwrap();
    }

    let director = ticker.shutdown().unwrap();
    assert_ne!( director.state(), DirectorState::Idle );
    assert!( director.now_playing().is_some() );
}


#[test]
fn test_feeds_sample_buffer() {
    let catalog = small_catalog();
    let buffer = Arc::new( SampleBuffer::new( 100, 1, 1 ) );
    let ( ticker, _events ) = Ticker::spawn(
        PlaybackDirector::new( Arc::new( catalog ) ),
        Arc::clone( &buffer ) as Arc<dyn Sink>,
    ).unwrap();

    let deadline = Instant::now() + Duration::from_secs( 5 );
    while buffer.free() > 0 && Instant::now() < deadline {
        thread::sleep( Duration::from_millis( 5 ) );
    }
    assert_eq!( buffer.len(), 100 );

    // Nothing drains the buffer, so the director stays where it was
    let director = ticker.shutdown().unwrap();
    assert_eq!( director.state(), DirectorState::Idle );
}


#[test]
fn test_handle_after_shutdown() {
    let ( ticker, _events ) = spawn();
    let handle = ticker.handle();
    ticker.shutdown().unwrap();
    assert!( matches!( handle.play( "rain" ), Err( TickerError::Stopped ) ) );
}
