//! Console loop
//!
//! Reads one command per line, hands it to the ticker through the
//! director handle and prints the result. Playback keeps running on the
//! ticker thread while the console waits for input.

use std::io::{ self, BufRead, Write };
use std::sync::mpsc::Receiver;

use anyhow::Result;

use bardcore_core::{
    help_text, Command, DirectorEvent, DirectorHandle, Listing, Reply, Status, TickerError,
};


/// Whether the console should keep reading after a command.
#[derive( Debug, PartialEq, Eq )]
pub enum Flow {
    Continue,
    Quit,
}


/// Runs the read-eval-print loop until `/quit` or end of input.
pub fn run( handle: &DirectorHandle, events: &Receiver<DirectorEvent> ) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut stdout = io::stdout();

    println!( "Welcome to -- B A R D C O R E! --" );

    loop {
        for event in events.try_iter() {
            if let Some( line ) = describe_event( &event ) {
                println!( "{}", line );
            }
        }

        write!( stdout, "{}", prompt( &handle.status()? ) )?;
        stdout.flush()?;

        let Some( line ) = lines.next() else {
            tracing::info!( "End of input" );
            handle.stop()?;
            break;
        };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match Command::parse( &line ) {
            Ok( command ) => {
                if execute( handle, &command )? == Flow::Quit {
                    break;
                }
            }
            Err( e ) => println!( "{}", e ),
        }
        println!();
    }

    Ok(())
}


/// Runs one parsed command and prints its outcome. Playback errors are
/// printed and do not end the loop; a dead ticker does.
pub fn execute( handle: &DirectorHandle, command: &Command ) -> Result<Flow, TickerError> {
    match command {
        Command::Help => {
            println!( "{}", help_text() );
            return Ok( Flow::Continue );
        }
        Command::Quit => {
            handle.stop()?;
            return Ok( Flow::Quit );
        }
        _ => {}
    }

    let Some( request ) = command.request() else {
        return Ok( Flow::Continue );
    };

    match handle.submit( request ) {
        Ok( reply ) => {
            if let Some( text ) = describe_reply( command, &reply ) {
                println!( "{}", text );
            }
            Ok( Flow::Continue )
        }
        Err( TickerError::Playback( e ) ) => {
            tracing::error!( "{}", e );
            println!( "Error: {}", e );
            Ok( Flow::Continue )
        }
        Err( e ) => Err( e ),
    }
}


/// Prompt showing what is playing, e.g. `bardcore (ambient/battle) > `.
pub fn prompt( status: &Status ) -> String {
    match ( &status.playable, &status.track ) {
        ( Some( playable ), Some( track ) ) => format!( "bardcore ({}/{}) > ", playable, track ),
        _ => "bardcore > ".to_string(),
    }
}


fn describe_reply( command: &Command, reply: &Reply ) -> Option<String> {
    match ( command, reply ) {
        ( Command::Track { name: None }, Reply::Listing( listing ) ) => Some( describe_subtracks( listing ) ),
        ( _, Reply::Listing( listing ) ) => Some( describe_listing( listing ) ),
        ( Command::Volume { level: Some( level ) }, _ ) => Some( format!( "Volume is now set at {}%", level ) ),
        ( _, Reply::Status( status ) ) => Some( format!( "Volume is currently set at {}%", status.volume ) ),
        _ => None,
    }
}


/// Playables in config order, then the subtracks of the active one.
pub fn describe_listing( listing: &Listing ) -> String {
    let mut lines = vec![ "Available playables:".to_string() ];
    lines.extend( listing.playables.iter().map( |( name, kind )| format!( "  * {} ({})", name, kind ) ) );
    if listing.subtracks.is_some() {
        lines.push( String::new() );
        lines.push( describe_subtracks( listing ) );
    }
    lines.join( "\n" )
}


fn describe_subtracks( listing: &Listing ) -> String {
    let Some( ref subtracks ) = listing.subtracks else {
        return "Nothing with subtracks is playing.".to_string();
    };

    let mut lines = vec![ "The following tracks are available to switch to:".to_string() ];
    for track in subtracks {
        let suffix = if listing.current.as_deref() == Some( track.as_str() ) { " (CURRENTLY PLAYING)" } else { "" };
        lines.push( format!( "  * {}{}", track, suffix ) );
    }
    lines.join( "\n" )
}


/// One-line description of an event, for the ones worth interrupting the
/// operator for.
pub fn describe_event( event: &DirectorEvent ) -> Option<String> {
    match event {
        DirectorEvent::EntryAdvanced { playable, entry } => Some( format!( "{} moved on to {}", playable, entry ) ),
        DirectorEvent::VoiceFault { playable, track, reason } => {
            Some( format!( "{}: dropped {} ({})", playable, track, reason ) )
        }
        DirectorEvent::Stopped { playable } => Some( format!( "{} stopped", playable ) ),
        DirectorEvent::TransitionComplete { .. } => None,
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use bardcore_core::{ DirectorState, PlayableKind };


    fn status( playable: Option<&str>, track: Option<&str> ) -> Status {
        Status {
            state: DirectorState::Playing,
            playable: playable.map( String::from ),
            track: track.map( String::from ),
            volume: 80,
            position: None,
        }
    }


    #[test]
    fn test_prompt() {
        assert_eq!( prompt( &status( Some( "ambient" ), Some( "battle" ) ) ), "bardcore (ambient/battle) > " );
        assert_eq!( prompt( &status( None, None ) ), "bardcore > " );
    }


    #[test]
    fn test_listing_marks_current() {
        let listing = Listing {
            playables: vec![ ( "ambient".into(), PlayableKind::Composite ) ],
            subtracks: Some( vec![ "quiet".into(), "battle".into() ] ),
            current: Some( "battle".into() ),
        };
        let text = describe_listing( &listing );
        assert!( text.contains( "  * ambient (composite track)" ) );
        assert!( text.contains( "  * battle (CURRENTLY PLAYING)" ) );
        assert!( text.contains( "  * quiet\n" ) );
    }


    #[test]
    fn test_volume_replies() {
        let reply = Reply::Status( status( None, None ) );
        assert_eq!(
            describe_reply( &Command::Volume { level: None }, &reply ).as_deref(),
            Some( "Volume is currently set at 80%" )
        );
        assert_eq!(
            describe_reply( &Command::Volume { level: Some( 30 ) }, &Reply::Done ).as_deref(),
            Some( "Volume is now set at 30%" )
        );
    }


    #[test]
    fn test_transition_complete_is_quiet() {
        let event = DirectorEvent::TransitionComplete { playable: "rain".into() };
        assert!( describe_event( &event ).is_none() );
    }
}
