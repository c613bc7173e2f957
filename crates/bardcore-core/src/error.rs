//! Errors returned by playback control operations.

use thiserror::Error;


/// Failure of a single control operation.
///
/// Every variant is recoverable: the rejected operation leaves playback
/// exactly as it was.
#[derive( Debug, Clone, PartialEq, Eq, Error )]
pub enum PlaybackError {
    #[error( "No playable named '{0}'" )]
    UnknownPlayable( String ),

    #[error( "'{playable}' has no track named '{subtrack}'" )]
    UnknownSubtrack { playable: String, subtrack: String },

    #[error( "The current playable is not a composite track" )]
    NotACompositeTrack,

    #[error( "Volume {0} is outside 0-100" )]
    OutOfRange( i64 ),

    #[error( "'{playable}' could not be loaded: {reason}" )]
    BufferLoadFailure { playable: String, reason: String },

    #[error( "Nothing is currently playing" )]
    NothingPlaying,

    #[error( "'{0}' has no tracks" )]
    Empty( String ),
}
