//! Composite tracks
//!
//! A composite track plays every subtrack at once from one shared cursor.
//! Only the active subtrack is audible; the rest play muted so that a
//! switch never loses sync.

use std::sync::Arc;
use std::time::Duration;

use crate::buffer::{ duration_for, frames_for, AudioBuffer };
use crate::error::PlaybackError;
use crate::voice::{ Voice, VoiceError };


/// Phase-locked set of named voices.
#[derive( Debug )]
pub struct CompositeTrack {
    name: String,
    /// Subtracks in declaration order
    layers: Vec<( String, Voice )>,
    active: usize,
    /// Shared cursor in frames
    position: u64,
    /// Loop length in frames
    loop_frames: u64,
    sample_rate: u32,
    swap_time: Duration,
}


impl CompositeTrack {
    /// Builds a stopped composite track.
    ///
    /// The loop length is the shortest non-empty subtrack, so no voice reads
    /// past its own end. Longer subtracks are cut at the loop point.
    ///
    /// @param name - Name of the composite track
    /// @param layers - Subtrack names and buffers, in declaration order
    /// @param swap_time - Length of the fade when switching subtracks
    pub fn new(
        name: impl Into<String>,
        layers: Vec<( String, Arc<AudioBuffer> )>,
        swap_time: Duration,
    ) -> Result<Self, PlaybackError> {
        let name = name.into();
        let first = layers.first().ok_or_else( || PlaybackError::Empty( name.clone() ) )?;
        let sample_rate = first.1.sample_rate();
        let loop_frames = layers.iter()
            .map( |( _, buffer )| buffer.frames() )
            .filter( |frames| *frames > 0 )
            .min()
            .unwrap_or( 0 );

        let layers = layers.into_iter()
            .map( |( sub, buffer )| ( sub, Voice::new( buffer, true ) ) )
            .collect();

        Ok( Self {
            name,
            layers,
            active: 0,
            position: 0,
            loop_frames,
            sample_rate,
            swap_time,
        })
    }


    pub fn name( &self ) -> &str {
        &self.name
    }


    /// Starts every voice at `at`, with only `subtrack` (or the first
    /// subtrack) audible.
    pub fn start( &mut self, subtrack: Option<&str>, at: Duration ) -> Result<(), PlaybackError> {
        let active = match subtrack {
            Some( sub ) => self.index_of( sub )?,
            None => 0,
        };
        self.active = active;
        self.position = frames_for( at, self.sample_rate ) % self.loop_frames.max( 1 );

        for ( index, ( _, voice ) ) in self.layers.iter_mut().enumerate() {
            voice.set_gain( if index == active { 1.0 } else { 0.0 } );
            voice.start( Duration::ZERO );
            voice.seek_frames( self.position );
        }

        tracing::debug!( "Composite '{}' started on '{}'", self.name, self.active_subtrack() );
        Ok(())
    }


    pub fn stop( &mut self ) {
        for ( _, voice ) in self.layers.iter_mut() {
            voice.stop();
        }
    }


    /// Makes another subtrack audible without moving the shared cursor.
    pub fn switch_subtrack( &mut self, name: &str ) -> Result<(), PlaybackError> {
        let next = self.index_of( name )?;
        if next == self.active {
            tracing::debug!( "Subtrack '{}' is already active", name );
            return Ok(());
        }

        let swap = self.swap_time;
        self.layers[ self.active ].1.ramp_gain( 0.0, swap );
        self.layers[ next ].1.ramp_gain( 1.0, swap );
        self.active = next;

        tracing::info!( "Composite '{}' switched to '{}'", self.name, name );
        Ok(())
    }


    /// Subtrack names in declaration order.
    pub fn list_subtracks( &self ) -> Vec<&str> {
        self.layers.iter().map( |( name, _ )| name.as_str() ).collect()
    }


    /// Name of the audible subtrack, empty once every subtrack has failed.
    pub fn active_subtrack( &self ) -> &str {
        self.layers.get( self.active ).map( |( name, _ )| name.as_str() ).unwrap_or( "" )
    }


    pub fn voice( &self, subtrack: &str ) -> Option<&Voice> {
        self.layers.iter().find( |( name, _ )| name == subtrack ).map( |( _, voice )| voice )
    }


    pub fn voices( &self ) -> impl Iterator<Item = ( &str, &Voice )> {
        self.layers.iter().map( |( name, voice )| ( name.as_str(), voice ) )
    }


    /// Shared cursor position.
    pub fn position( &self ) -> Duration {
        duration_for( self.position, self.sample_rate )
    }


    pub fn loop_duration( &self ) -> Duration {
        duration_for( self.loop_frames, self.sample_rate )
    }


    /// True when every subtrack has the same length.
    pub fn durations_match( &self ) -> bool {
        self.layers.iter().all( |( _, voice )| voice.buffer().frames() == self.loop_frames )
    }


    pub fn is_empty( &self ) -> bool {
        self.layers.is_empty()
    }


    /// Advances the shared cursor by `dt`. See [`CompositeTrack::tick_frames`].
    pub fn tick( &mut self, dt: Duration ) -> Vec<( String, VoiceError )> {
        self.tick_frames( frames_for( dt, self.sample_rate ), dt )
    }


    /// Advances every voice by the same frame count and wraps them together
    /// at the loop length.
    ///
    /// Voices that fault are stopped and removed; the rest keep playing. If
    /// the active voice is removed the first remaining one takes over.
    ///
    /// @returns The removed subtracks and why they failed
    pub(crate) fn tick_frames( &mut self, frames: u64, dt: Duration ) -> Vec<( String, VoiceError )> {
        if self.loop_frames > 0 {
            self.position = ( self.position + frames ) % self.loop_frames;
        }

        let mut faults = Vec::new();
        let mut index = 0;
        while index < self.layers.len() {
            let ( _, voice ) = &mut self.layers[ index ];
            match voice.tick_frames( frames, dt ) {
                Ok( _ ) => {
                    voice.seek_frames( self.position );
                    index += 1;
                }
                Err( e ) => {
                    let ( name, mut voice ) = self.layers.remove( index );
                    voice.stop();
                    tracing::error!( "Composite '{}' dropped subtrack '{}': {}", self.name, name, e );
                    faults.push(( name, e ));
                    if index < self.active {
                        self.active -= 1;
                    } else if index == self.active && !self.layers.is_empty() {
                        self.active = 0;
                        self.layers[ 0 ].1.set_gain( 1.0 );
                    }
                }
            }
        }

        if self.active >= self.layers.len() {
            self.active = 0;
        }
        faults
    }


    /// Mixes the audible voices into an interleaved block.
    pub fn render( &self, out: &mut [f32], channels: usize, scale: f32 ) {
        for ( _, voice ) in &self.layers {
            voice.render_looped( out, channels, scale, self.loop_frames );
        }
    }


    fn index_of( &self, subtrack: &str ) -> Result<usize, PlaybackError> {
        self.layers.iter()
            .position( |( name, _ )| name == subtrack )
            .ok_or_else( || PlaybackError::UnknownSubtrack {
                playable: self.name.clone(),
                subtrack: subtrack.to_string(),
            })
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use approx::assert_relative_eq;


    const RATE: u32 = 1_000;


    fn layer( name: &str, secs: u64 ) -> ( String, Arc<AudioBuffer> ) {
        let buffer = AudioBuffer::silence( name, Duration::from_secs( secs ), RATE, 1 );
        ( name.to_string(), Arc::new( buffer ) )
    }


    fn ambient() -> CompositeTrack {
        CompositeTrack::new(
            "ambient",
            vec![ layer( "quiet", 60 ), layer( "battle", 60 ), layer( "tavern", 60 ) ],
            Duration::from_millis( 40 ),
        ).unwrap()
    }


    fn assert_phase_locked( track: &CompositeTrack ) {
        let position = track.position();
        for ( name, voice ) in track.voices() {
            assert_eq!( voice.position(), position, "subtrack '{}' drifted", name );
        }
    }


    #[test]
    fn test_empty_rejected() {
        let result = CompositeTrack::new( "nothing", Vec::new(), Duration::ZERO );
        assert_eq!( result.unwrap_err(), PlaybackError::Empty( "nothing".into() ) );
    }


    #[test]
    fn test_start_defaults_to_first() {
        let mut track = ambient();
        track.start( None, Duration::ZERO ).unwrap();
        assert_eq!( track.active_subtrack(), "quiet" );
        assert_eq!( track.voice( "quiet" ).unwrap().gain(), 1.0 );
        assert_eq!( track.voice( "battle" ).unwrap().gain(), 0.0 );
        assert!( track.voices().all( |( _, v )| v.is_playing() ) );
    }


    #[test]
    fn test_list_subtracks_in_order() {
        assert_eq!( ambient().list_subtracks(), vec![ "quiet", "battle", "tavern" ] );
    }


    #[test]
    fn test_switch_keeps_position() {
        let mut track = ambient();
        track.start( None, Duration::ZERO ).unwrap();
        track.tick( Duration::from_secs( 30 ) );
        track.switch_subtrack( "battle" ).unwrap();

        assert_eq!( track.active_subtrack(), "battle" );
        assert_eq!( track.position(), Duration::from_secs( 30 ) );
        assert_phase_locked( &track );
    }


    #[test]
    fn test_switch_crossfades_layers() {
        let mut track = ambient();
        track.start( None, Duration::ZERO ).unwrap();
        track.switch_subtrack( "battle" ).unwrap();

        track.tick( Duration::from_millis( 20 ) );
        assert_relative_eq!( track.voice( "quiet" ).unwrap().gain(), 0.5 );
        assert_relative_eq!( track.voice( "battle" ).unwrap().gain(), 0.5 );

        track.tick( Duration::from_millis( 20 ) );
        assert_relative_eq!( track.voice( "quiet" ).unwrap().gain(), 0.0 );
        assert_relative_eq!( track.voice( "battle" ).unwrap().gain(), 1.0 );
    }


    #[test]
    fn test_switch_unknown() {
        let mut track = ambient();
        track.start( None, Duration::ZERO ).unwrap();
        let err = track.switch_subtrack( "dragon" ).unwrap_err();
        assert!( matches!( err, PlaybackError::UnknownSubtrack { .. } ) );
        assert_eq!( track.active_subtrack(), "quiet" );
    }


    #[test]
    fn test_phase_lock_under_switching() {
        let mut track = ambient();
        track.start( Some( "tavern" ), Duration::ZERO ).unwrap();

        let names = [ "battle", "quiet", "tavern", "battle" ];
        for ( step, name ) in names.iter().enumerate() {
            track.tick( Duration::from_millis( 7_321 * ( step as u64 + 1 ) ) );
            assert_phase_locked( &track );
            track.switch_subtrack( name ).unwrap();
            track.tick( Duration::from_millis( 13 ) );
            assert_phase_locked( &track );
        }
    }


    #[test]
    fn test_loop_wraps_to_residual() {
        let mut track = ambient();
        track.start( None, Duration::from_secs( 50 ) ).unwrap();
        let faults = track.tick( Duration::from_secs( 25 ) );
        assert!( faults.is_empty() );
        assert_eq!( track.position(), Duration::from_secs( 15 ) );
        assert_phase_locked( &track );
    }


    #[test]
    fn test_loop_uses_shortest_subtrack() {
        let mut track = CompositeTrack::new(
            "uneven",
            vec![ layer( "long", 10 ), layer( "short", 8 ) ],
            Duration::ZERO,
        ).unwrap();
        assert!( !track.durations_match() );
        assert_eq!( track.loop_duration(), Duration::from_secs( 8 ) );

        track.start( None, Duration::ZERO ).unwrap();
        track.tick( Duration::from_secs( 9 ) );
        assert_eq!( track.position(), Duration::from_secs( 1 ) );
        assert_phase_locked( &track );
    }


    #[test]
    fn test_render_wraps_at_loop_point() {
        let long = AudioBuffer::new( "long", ( 1..=10 ).map( |v| v as f32 ).collect(), RATE, 1 );
        let short = AudioBuffer::new( "short", vec![ 0.5; 8 ], RATE, 1 );
        let mut track = CompositeTrack::new(
            "uneven",
            vec![ ( "long".into(), Arc::new( long ) ), ( "short".into(), Arc::new( short ) ) ],
            Duration::ZERO,
        ).unwrap();
        track.start( Some( "long" ), Duration::from_millis( 6 ) ).unwrap();

        let mut out = [ 0.0_f32; 4 ];
        track.render( &mut out, 1, 1.0 );
        assert_eq!( out, [ 7.0, 8.0, 1.0, 2.0 ] );

        track.tick( Duration::from_millis( 4 ) );
        assert_eq!( track.position(), Duration::from_millis( 2 ) );
        assert_phase_locked( &track );

        let mut out = [ 0.0_f32; 2 ];
        track.render( &mut out, 1, 1.0 );
        assert_eq!( out, [ 3.0, 4.0 ] );
    }


    #[test]
    fn test_all_subtracks_failed() {
        let empty = ( "hollow".to_string(), Arc::new( AudioBuffer::new( "hollow", Vec::new(), RATE, 1 ) ) );
        let mut track = CompositeTrack::new( "broken", vec![ empty ], Duration::ZERO ).unwrap();
        track.start( None, Duration::ZERO ).unwrap();

        assert_eq!( track.tick( Duration::from_millis( 10 ) ).len(), 1 );
        assert!( track.is_empty() );
        assert_eq!( track.active_subtrack(), "" );
    }


    #[test]
    fn test_faulty_voice_removed() {
        let empty = ( "broken".to_string(), Arc::new( AudioBuffer::new( "broken", Vec::new(), RATE, 1 ) ) );
        let mut track = CompositeTrack::new(
            "mixed",
            vec![ empty, layer( "fine", 10 ) ],
            Duration::ZERO,
        ).unwrap();
        track.start( None, Duration::ZERO ).unwrap();

        let faults = track.tick( Duration::from_millis( 10 ) );
        assert_eq!( faults.len(), 1 );
        assert_eq!( faults[ 0 ].0, "broken" );
        assert_eq!( track.list_subtracks(), vec![ "fine" ] );
        assert_eq!( track.active_subtrack(), "fine" );
        assert_eq!( track.voice( "fine" ).unwrap().gain(), 1.0 );
    }
}
