//! Slash command parsing.
//!
//! Operator input such as `/play ambient - battle` is parsed into a
//! [`Command`]. Commands that touch playback map onto a director
//! [`Request`]; the rest (help, quit) are handled by the front end.

use thiserror::Error;

use crate::director::Request;


/// Errors that can occur during command parsing.
#[derive( Debug, Error, PartialEq, Eq )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// Parsed slash command.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum Command {
    /// Play a playable, optionally from a named subtrack or entry.
    Play { name: String, track: Option<String> },
    /// Switch subtrack, or list subtracks when no name is given.
    Track { name: Option<String> },
    /// Fade out and stop.
    Stop,
    List,
    /// Set the master volume, or report it when no level is given.
    Volume { level: Option<i64> },
    Help,
    Quit,
}


impl Command {
    /// Parses a command line. The leading `/` is optional.
    ///
    /// @param input - The command string to parse
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let input = input.strip_prefix( '/' ).unwrap_or( input );
        let mut parts = input.splitn( 2, char::is_whitespace );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( str::trim ).filter( |s| !s.is_empty() );

        match cmd.as_str() {
            "play" | "p" => {
                let args = args
                    .ok_or_else( || CommandError::MissingArgument( "playable name".into() ) )?;
                let ( name, track ) = match args.split_once( '-' ) {
                    Some(( name, track )) => ( name.trim(), Some( track.trim() ).filter( |t| !t.is_empty() ) ),
                    None => ( args, None ),
                };
                if name.is_empty() {
                    return Err( CommandError::MissingArgument( "playable name".into() ) );
                }
                Ok( Command::Play {
                    name: name.to_string(),
                    track: track.map( String::from ),
                })
            }
            "track" | "t" => Ok( Command::Track { name: args.map( String::from ) } ),
            "stop" | "s" => Ok( Command::Stop ),
            "list" | "l" => Ok( Command::List ),
            "vol" | "v" | "volume" => {
                let level = args
                    .map( |s| s.parse::<i64>().map_err( |_| CommandError::InvalidArgument(
                        format!( "Volume must be a whole number between 0 and 100, got '{}'", s )
                    )))
                    .transpose()?;
                Ok( Command::Volume { level } )
            }
            "help" | "h" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }


    /// The director request this command stands for, if any.
    ///
    /// Queries without an argument (`/track`, `/vol`) map to a listing or a
    /// status request whose reply the front end prints.
    pub fn request( &self ) -> Option<Request> {
        match self {
            Command::Play { name, track } => Some( Request::Play {
                name: name.clone(),
                track: track.clone(),
            }),
            Command::Track { name: Some( name ) } => Some( Request::SwitchSubtrack { name: name.clone() } ),
            Command::Track { name: None } | Command::List => Some( Request::List ),
            Command::Stop => Some( Request::FadeOut ),
            Command::Volume { level: Some( volume ) } => Some( Request::SetVolume { volume: *volume } ),
            Command::Volume { level: None } => Some( Request::Status ),
            Command::Help | Command::Quit => None,
        }
    }


    /// Returns a brief description of the command for help text.
    pub fn description( &self ) -> &'static str {
        match self {
            Command::Play { .. } => "Play a composite track, track list or track",
            Command::Track { .. } => "Switch subtrack of the playing composite track",
            Command::Stop => "Fade out and stop",
            Command::List => "List playables and subtracks",
            Command::Volume { .. } => "Set volume (0-100)",
            Command::Help => "Show help",
            Command::Quit => "Quit bardcore",
        }
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Bardcore plays background music for tabletop sessions.

Commands:
  /play, /p <name> [- <track>]   Play a playable, optionally from a subtrack
  /track, /t [track]             Switch subtrack, or list subtracks
  /list, /l                      List playables and subtracks
  /stop, /s                      Fade out and stop
  /vol, /v [0-100]               Set or show the master volume
  /help, /h                      Show this help
  /quit, /q                      Stop immediately and exit"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_play() {
        let cmd = Command::parse( "/play ambient" ).unwrap();
        assert_eq!( cmd, Command::Play { name: "ambient".into(), track: None } );
    }


    #[test]
    fn test_parse_play_with_track() {
        let cmd = Command::parse( "/p ambient - battle" ).unwrap();
        assert_eq!( cmd, Command::Play { name: "ambient".into(), track: Some( "battle".into() ) } );

        let cmd = Command::parse( "p roleplay-npc2" ).unwrap();
        assert_eq!( cmd, Command::Play { name: "roleplay".into(), track: Some( "npc2".into() ) } );
    }


    #[test]
    fn test_parse_play_missing_name() {
        assert!( matches!( Command::parse( "/play" ), Err( CommandError::MissingArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "/play - battle" ), Err( CommandError::MissingArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_track() {
        assert_eq!( Command::parse( "/t battle" ).unwrap(), Command::Track { name: Some( "battle".into() ) } );
        assert_eq!( Command::parse( "/track" ).unwrap(), Command::Track { name: None } );
    }


    #[test]
    fn test_parse_volume() {
        assert_eq!( Command::parse( "/vol 40" ).unwrap(), Command::Volume { level: Some( 40 ) } );
        assert_eq!( Command::parse( "/v" ).unwrap(), Command::Volume { level: None } );
        // Range is checked by the director
        assert_eq!( Command::parse( "/v 150" ).unwrap(), Command::Volume { level: Some( 150 ) } );
        assert!( matches!( Command::parse( "/vol loud" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_aliases() {
        assert_eq!( Command::parse( "/s" ).unwrap(), Command::Stop );
        assert_eq!( Command::parse( "/l" ).unwrap(), Command::List );
        assert_eq!( Command::parse( "/h" ).unwrap(), Command::Help );
        assert_eq!( Command::parse( "/q" ).unwrap(), Command::Quit );
        assert_eq!( Command::parse( "  QUIT  " ).unwrap(), Command::Quit );
    }


    #[test]
    fn test_parse_unknown() {
        assert!( matches!( Command::parse( "/dance" ), Err( CommandError::Unknown( _ ) ) ) );
        assert!( matches!( Command::parse( "" ), Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_requests() {
        assert_eq!( Command::Stop.request(), Some( Request::FadeOut ) );
        assert_eq!( Command::Track { name: None }.request(), Some( Request::List ) );
        assert_eq!( Command::Volume { level: None }.request(), Some( Request::Status ) );
        assert_eq!(
            Command::Volume { level: Some( 20 ) }.request(),
            Some( Request::SetVolume { volume: 20 } )
        );
        assert_eq!( Command::Quit.request(), None );
    }
}
