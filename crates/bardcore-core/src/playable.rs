//! The units the director can play
//!
//! Composite tracks, track lists and bare tracks share one capability set
//! (start, stop, tick, render) through the [`Playable`] sum type.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::{ frames_for, AudioBuffer };
use crate::composite::CompositeTrack;
use crate::error::PlaybackError;
use crate::tracklist::TrackList;
use crate::voice::{ Voice, VoiceError };


/// Kind of a playable, as reported by catalog listings.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum PlayableKind {
    Composite,
    TrackList,
    Track,
}


impl fmt::Display for PlayableKind {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        let label = match self {
            PlayableKind::Composite => "composite track",
            PlayableKind::TrackList => "track list",
            PlayableKind::Track => "track",
        };
        f.write_str( label )
    }
}


/// What happened inside a playable during one tick.
#[derive( Debug, Default )]
pub struct TickReport {
    /// Track list entry that started during the tick.
    pub advanced_to: Option<String>,
    /// Voices that failed and were removed.
    pub faults: Vec<( String, VoiceError )>,
}


/// A single looping sound.
#[derive( Debug )]
pub struct Track {
    name: String,
    voice: Voice,
}


impl Track {
    pub fn new( name: impl Into<String>, buffer: Arc<AudioBuffer> ) -> Self {
        Self {
            name: name.into(),
            voice: Voice::new( buffer, true ),
        }
    }


    pub fn name( &self ) -> &str {
        &self.name
    }


    pub fn voice( &self ) -> &Voice {
        &self.voice
    }
}


/// Anything the director can hold as now playing.
#[derive( Debug )]
pub enum Playable {
    Composite( CompositeTrack ),
    List( TrackList ),
    Track( Track ),
}


impl Playable {
    pub fn name( &self ) -> &str {
        match self {
            Playable::Composite( c ) => c.name(),
            Playable::List( l ) => l.name(),
            Playable::Track( t ) => t.name(),
        }
    }


    pub fn kind( &self ) -> PlayableKind {
        match self {
            Playable::Composite( _ ) => PlayableKind::Composite,
            Playable::List( _ ) => PlayableKind::TrackList,
            Playable::Track( _ ) => PlayableKind::Track,
        }
    }


    /// Starts playback, optionally at a named subtrack or entry.
    pub fn start( &mut self, track: Option<&str> ) -> Result<(), PlaybackError> {
        match self {
            Playable::Composite( c ) => c.start( track, Duration::ZERO ),
            Playable::List( l ) => l.start( track ),
            Playable::Track( t ) => {
                if let Some( name ) = track.filter( |name| *name != t.name ) {
                    return Err( PlaybackError::UnknownSubtrack {
                        playable: t.name.clone(),
                        subtrack: name.to_string(),
                    });
                }
                t.voice.start( Duration::ZERO );
                Ok(())
            }
        }
    }


    pub fn stop( &mut self ) {
        match self {
            Playable::Composite( c ) => c.stop(),
            Playable::List( l ) => l.stop(),
            Playable::Track( t ) => t.voice.stop(),
        }
    }


    pub fn tick( &mut self, dt: Duration, sample_rate: u32 ) -> TickReport {
        self.tick_frames( frames_for( dt, sample_rate ), dt )
    }


    pub(crate) fn tick_frames( &mut self, frames: u64, dt: Duration ) -> TickReport {
        match self {
            Playable::Composite( c ) => TickReport {
                advanced_to: None,
                faults: c.tick_frames( frames, dt ),
            },
            Playable::List( l ) => {
                let outcome = l.tick_frames( frames, dt );
                TickReport {
                    advanced_to: outcome.advanced_to,
                    faults: outcome.fault.into_iter().collect(),
                }
            }
            Playable::Track( t ) => {
                let mut report = TickReport::default();
                if let Err( e ) = t.voice.tick_frames( frames, dt ) {
                    tracing::error!( "Track '{}' stopped: {}", t.name, e );
                    report.faults.push(( t.name.clone(), e ));
                }
                report
            }
        }
    }


    /// Mixes into an interleaved block with `scale` on top of voice gains.
    pub fn render( &self, out: &mut [f32], channels: usize, scale: f32 ) {
        match self {
            Playable::Composite( c ) => c.render( out, channels, scale ),
            Playable::List( l ) => l.render( out, channels, scale ),
            Playable::Track( t ) => t.voice.render( out, channels, scale ),
        }
    }


    /// Name of the audible subtrack or entry.
    pub fn current_track( &self ) -> &str {
        match self {
            Playable::Composite( c ) => c.active_subtrack(),
            Playable::List( l ) => l.current_entry(),
            Playable::Track( t ) => t.name(),
        }
    }


    /// Subtrack or entry names in declaration order.
    pub fn tracks( &self ) -> Vec<&str> {
        match self {
            Playable::Composite( c ) => c.list_subtracks(),
            Playable::List( l ) => l.list_entries(),
            Playable::Track( t ) => vec![ t.name() ],
        }
    }


    pub fn position( &self ) -> Duration {
        match self {
            Playable::Composite( c ) => c.position(),
            Playable::List( l ) => l.position(),
            Playable::Track( t ) => t.voice.position(),
        }
    }


    /// False once every voice has failed; such a playable makes no sound
    /// and will never make any.
    pub fn is_alive( &self ) -> bool {
        match self {
            Playable::Composite( c ) => !c.is_empty(),
            Playable::List( l ) => l.voice().is_some(),
            Playable::Track( t ) => t.voice.is_playing(),
        }
    }


    pub fn as_composite( &self ) -> Option<&CompositeTrack> {
        match self {
            Playable::Composite( c ) => Some( c ),
            _ => None,
        }
    }


    pub fn as_composite_mut( &mut self ) -> Option<&mut CompositeTrack> {
        match self {
            Playable::Composite( c ) => Some( c ),
            _ => None,
        }
    }


    pub fn as_list( &self ) -> Option<&TrackList> {
        match self {
            Playable::List( l ) => Some( l ),
            _ => None,
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn buffer( secs: u64 ) -> Arc<AudioBuffer> {
        Arc::new( AudioBuffer::silence( "b", Duration::from_secs( secs ), 1_000, 1 ) )
    }


    #[test]
    fn test_bare_track_loops() {
        let mut playable = Playable::Track( Track::new( "rain", buffer( 10 ) ) );
        playable.start( None ).unwrap();
        let report = playable.tick( Duration::from_secs( 12 ), 1_000 );
        assert!( report.faults.is_empty() );
        assert_eq!( playable.position(), Duration::from_secs( 2 ) );
        assert!( playable.is_alive() );
        assert_eq!( playable.current_track(), "rain" );
        assert_eq!( playable.kind(), PlayableKind::Track );
    }


    #[test]
    fn test_bare_track_rejects_other_name() {
        let mut playable = Playable::Track( Track::new( "rain", buffer( 10 ) ) );
        assert!( playable.start( Some( "rain" ) ).is_ok() );
        assert!( matches!(
            playable.start( Some( "wind" ) ),
            Err( PlaybackError::UnknownSubtrack { .. } )
        ));
    }


    #[test]
    fn test_stop_silences() {
        let mut playable = Playable::Track( Track::new( "rain", buffer( 10 ) ) );
        playable.start( None ).unwrap();
        playable.stop();
        assert!( !playable.is_alive() );
    }


    #[test]
    fn test_kind_display() {
        assert_eq!( PlayableKind::Composite.to_string(), "composite track" );
        assert_eq!( PlayableKind::TrackList.to_string(), "track list" );
    }
}
