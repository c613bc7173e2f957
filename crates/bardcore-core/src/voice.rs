//! Single playable instance of a buffer
//!
//! A Voice owns a play cursor and a gain. The cursor is kept in frames of
//! the buffer; [`Voice::tick`] converts elapsed time to frames.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::buffer::{ duration_for, frames_for, AudioBuffer };
use crate::fade::GainRamp;


/// Errors raised while advancing a voice.
#[derive( Debug, Error )]
pub enum VoiceError {
    #[error( "Buffer '{0}' has no frames" )]
    EmptyBuffer( String ),
}


/// Result of advancing a voice.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum VoiceStatus {
    /// Still producing audio.
    Playing,
    /// Reached the end of a non-looping buffer during this tick.
    Ended,
    /// Not started, or stopped.
    Idle,
}


/// A play cursor over a shared AudioBuffer.
#[derive( Debug )]
pub struct Voice {
    buffer: Arc<AudioBuffer>,
    position: u64,
    playing: bool,
    looping: bool,
    gain: f32,
    ramp: Option<GainRamp>,
}


impl Voice {
    /// Creates a stopped voice at position 0 with full gain.
    pub fn new( buffer: Arc<AudioBuffer>, looping: bool ) -> Self {
        Self {
            buffer,
            position: 0,
            playing: false,
            looping,
            gain: 1.0,
            ramp: None,
        }
    }


    /// Starts playback at the given offset.
    pub fn start( &mut self, at: Duration ) {
        self.seek( at );
        self.playing = true;
    }


    pub fn stop( &mut self ) {
        self.playing = false;
        self.ramp = None;
    }


    /// Moves the cursor, clamping into [0, duration).
    pub fn seek( &mut self, position: Duration ) {
        let frames = frames_for( position, self.buffer.sample_rate() );
        self.seek_frames( frames );
    }


    pub(crate) fn seek_frames( &mut self, frames: u64 ) {
        self.position = frames.min( self.buffer.frames().saturating_sub( 1 ) );
    }


    /// Sets the gain immediately, cancelling any ramp. Clamped to [0, 1].
    pub fn set_gain( &mut self, gain: f32 ) {
        self.gain = gain.clamp( 0.0, 1.0 );
        self.ramp = None;
    }


    /// Moves the gain linearly to `target` over `over` of ticked time.
    pub fn ramp_gain( &mut self, target: f32, over: Duration ) {
        let target = target.clamp( 0.0, 1.0 );
        if over.is_zero() {
            self.set_gain( target );
        } else {
            self.ramp = Some( GainRamp::new( self.gain, target, over ) );
        }
    }


    pub fn gain( &self ) -> f32 {
        self.gain
    }


    /// Gain the voice is heading to, equal to `gain()` when not ramping.
    pub fn target_gain( &self ) -> f32 {
        self.ramp.map( |r| r.target() ).unwrap_or( self.gain )
    }


    pub fn is_playing( &self ) -> bool {
        self.playing
    }


    pub fn is_looping( &self ) -> bool {
        self.looping
    }


    pub fn buffer( &self ) -> &Arc<AudioBuffer> {
        &self.buffer
    }


    pub fn position( &self ) -> Duration {
        duration_for( self.position, self.buffer.sample_rate() )
    }


    pub fn position_frames( &self ) -> u64 {
        self.position
    }


    pub fn duration( &self ) -> Duration {
        self.buffer.duration()
    }


    /// Advances the cursor by `dt`.
    pub fn tick( &mut self, dt: Duration ) -> Result<VoiceStatus, VoiceError> {
        let frames = frames_for( dt, self.buffer.sample_rate() );
        self.tick_frames( frames, dt )
    }


    /// Advances the cursor by a frame count. `dt` drives the gain ramp.
    pub(crate) fn tick_frames( &mut self, frames: u64, dt: Duration ) -> Result<VoiceStatus, VoiceError> {
        if !self.playing {
            return Ok( VoiceStatus::Idle );
        }

        let total = self.buffer.frames();
        if total == 0 {
            self.playing = false;
            return Err( VoiceError::EmptyBuffer( self.buffer.id().to_string() ) );
        }

        if let Some( ref mut ramp ) = self.ramp {
            self.gain = ramp.advance( dt );
            if ramp.is_finished() {
                self.ramp = None;
            }
        }

        let next = self.position + frames;
        if next < total {
            self.position = next;
            return Ok( VoiceStatus::Playing );
        }

        if self.looping {
            self.position = next % total;
            Ok( VoiceStatus::Playing )
        } else {
            self.position = total;
            self.playing = false;
            Ok( VoiceStatus::Ended )
        }
    }


    /// Adds the next `frames` frames into an interleaved block.
    ///
    /// Samples are scaled by the voice gain times `scale`. The cursor is not
    /// moved; call [`Voice::tick_frames`] with the same count afterwards.
    ///
    /// @param out - Interleaved output block
    /// @param channels - Channel count of `out`
    /// @param scale - Gain applied on top of the voice gain
    pub fn render( &self, out: &mut [f32], channels: usize, scale: f32 ) {
        self.render_looped( out, channels, scale, self.buffer.frames() );
    }


    /// Like [`Voice::render`], but a looping voice wraps back to frame 0
    /// at `loop_frames` instead of at its own end. Composite tracks use
    /// this so every subtrack wraps on the same frame.
    pub fn render_looped( &self, out: &mut [f32], channels: usize, scale: f32, loop_frames: u64 ) {
        let gain = self.gain * scale;
        let end = loop_frames.min( self.buffer.frames() );
        if !self.playing || gain <= 0.0 || end == 0 || channels == 0 {
            return;
        }

        let mut index = self.position;
        for frame_out in out.chunks_exact_mut( channels ) {
            if index >= end {
                if !self.looping {
                    break;
                }
                index = 0;
            }
            if let Some( frame_in ) = self.buffer.frame( index ) {
                for ( dst, src ) in frame_out.iter_mut().zip( frame_in ) {
                    *dst += src * gain;
                }
            }
            index += 1;
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use approx::assert_relative_eq;


    fn buffer( secs: u64 ) -> Arc<AudioBuffer> {
        Arc::new( AudioBuffer::silence( "test", Duration::from_secs( secs ), 1_000, 1 ) )
    }


    #[test]
    fn test_start_at_offset() {
        let mut voice = Voice::new( buffer( 10 ), true );
        voice.start( Duration::from_secs( 4 ) );
        assert!( voice.is_playing() );
        assert_eq!( voice.position(), Duration::from_secs( 4 ) );
    }


    #[test]
    fn test_seek_clamps() {
        let mut voice = Voice::new( buffer( 10 ), true );
        voice.seek( Duration::from_secs( 99 ) );
        assert_eq!( voice.position_frames(), 9_999 );
    }


    #[test]
    fn test_looping_wraps_residual() {
        let mut voice = Voice::new( buffer( 10 ), true );
        voice.start( Duration::ZERO );
        assert_eq!( voice.tick( Duration::from_secs( 13 ) ).unwrap(), VoiceStatus::Playing );
        assert_eq!( voice.position(), Duration::from_secs( 3 ) );
    }


    #[test]
    fn test_non_looping_ends() {
        let mut voice = Voice::new( buffer( 2 ), false );
        voice.start( Duration::ZERO );
        assert_eq!( voice.tick( Duration::from_secs( 1 ) ).unwrap(), VoiceStatus::Playing );
        assert_eq!( voice.tick( Duration::from_secs( 1 ) ).unwrap(), VoiceStatus::Ended );
        assert!( !voice.is_playing() );
        assert_eq!( voice.tick( Duration::from_secs( 1 ) ).unwrap(), VoiceStatus::Idle );
    }


    #[test]
    fn test_empty_buffer_faults() {
        let empty = Arc::new( AudioBuffer::new( "empty", Vec::new(), 1_000, 1 ) );
        let mut voice = Voice::new( empty, true );
        voice.start( Duration::ZERO );
        assert!( matches!( voice.tick( Duration::from_millis( 10 ) ), Err( VoiceError::EmptyBuffer( _ ) ) ) );
        assert!( !voice.is_playing() );
    }


    #[test]
    fn test_gain_ramp() {
        let mut voice = Voice::new( buffer( 10 ), true );
        voice.start( Duration::ZERO );
        voice.ramp_gain( 0.0, Duration::from_millis( 100 ) );
        assert_eq!( voice.target_gain(), 0.0 );
        voice.tick( Duration::from_millis( 50 ) ).unwrap();
        assert_relative_eq!( voice.gain(), 0.5 );
        voice.tick( Duration::from_millis( 50 ) ).unwrap();
        assert_relative_eq!( voice.gain(), 0.0 );
        assert_eq!( voice.target_gain(), 0.0 );
    }


    #[test]
    fn test_render_scales_and_wraps() {
        let data = Arc::new( AudioBuffer::new( "ramp", vec![ 1.0, 2.0, 3.0 ], 1_000, 1 ) );
        let mut voice = Voice::new( data, true );
        voice.start( Duration::ZERO );
        voice.seek_frames( 2 );
        voice.set_gain( 0.5 );

        let mut out = [ 0.0_f32; 4 ];
        voice.render( &mut out, 1, 0.5 );
        assert_eq!( out, [ 0.75, 0.25, 0.5, 0.75 ] );
    }


    #[test]
    fn test_render_looped_wraps_early() {
        let data = Arc::new( AudioBuffer::new( "long", vec![ 1.0, 2.0, 3.0, 4.0, 5.0 ], 1_000, 1 ) );
        let mut voice = Voice::new( data, true );
        voice.start( Duration::ZERO );
        voice.seek_frames( 1 );

        let mut out = [ 0.0_f32; 4 ];
        voice.render_looped( &mut out, 1, 1.0, 3 );
        assert_eq!( out, [ 2.0, 3.0, 1.0, 2.0 ] );
    }


    #[test]
    fn test_render_silence_past_end() {
        let data = Arc::new( AudioBuffer::new( "short", vec![ 1.0, 1.0 ], 1_000, 1 ) );
        let mut voice = Voice::new( data, false );
        voice.start( Duration::ZERO );

        let mut out = [ 0.0_f32; 4 ];
        voice.render( &mut out, 1, 1.0 );
        assert_eq!( out, [ 1.0, 1.0, 0.0, 0.0 ] );
    }
}
