//! Decoded in-memory audio
//!
//! An AudioBuffer is the immutable PCM form of one sound asset. Buffers are
//! converted to the engine's sample rate and channel count when they are
//! loaded, so a frame index means the same thing for every buffer.

use std::path::{ Path, PathBuf };
use std::sync::Arc;
use std::time::Duration;


/// Immutable interleaved f32 samples for one sound asset.
#[derive( Debug )]
pub struct AudioBuffer {
    id: String,
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
    source: Option<PathBuf>,
}


impl AudioBuffer {
    /// Creates a buffer from interleaved samples.
    ///
    /// Trailing samples that do not fill a whole frame are dropped.
    ///
    /// @param id - Identifier used in logs and reports
    /// @param samples - Interleaved samples
    /// @param sample_rate - Frames per second
    /// @param channels - Samples per frame
    pub fn new( id: impl Into<String>, mut samples: Vec<f32>, sample_rate: u32, channels: u16 ) -> Self {
        let channels = channels.max( 1 );
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate( whole );

        Self {
            id: id.into(),
            samples: samples.into(),
            sample_rate,
            channels,
            source: None,
        }
    }


    /// Records the file this buffer was decoded from.
    pub fn with_source( mut self, path: &Path ) -> Self {
        self.source = Some( path.to_path_buf() );
        self
    }


    /// Creates a silent buffer of the given length. Mostly useful in tests.
    pub fn silence( id: impl Into<String>, duration: Duration, sample_rate: u32, channels: u16 ) -> Self {
        let frames = frames_for( duration, sample_rate ) as usize;
        Self::new( id, vec![ 0.0; frames * channels.max( 1 ) as usize ], sample_rate, channels )
    }


    pub fn id( &self ) -> &str {
        &self.id
    }


    pub fn source( &self ) -> Option<&Path> {
        self.source.as_deref()
    }


    pub fn samples( &self ) -> &[f32] {
        &self.samples
    }


    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    pub fn channels( &self ) -> u16 {
        self.channels
    }


    /// Number of frames (samples per channel).
    pub fn frames( &self ) -> u64 {
        ( self.samples.len() / self.channels as usize ) as u64
    }


    /// Playback length of the buffer.
    pub fn duration( &self ) -> Duration {
        duration_for( self.frames(), self.sample_rate )
    }


    /// Returns the samples of one frame, or None past the end.
    pub fn frame( &self, index: u64 ) -> Option<&[f32]> {
        let ch = self.channels as usize;
        let start = usize::try_from( index ).ok()?.checked_mul( ch )?;
        self.samples.get( start..start + ch )
    }
}


/// Converts a duration to a frame count, rounding to the nearest frame.
pub fn frames_for( duration: Duration, sample_rate: u32 ) -> u64 {
    let nanos = duration.as_nanos() * sample_rate as u128;
    ( ( nanos + 500_000_000 ) / 1_000_000_000 ) as u64
}


/// Converts a frame count to a duration.
pub fn duration_for( frames: u64, sample_rate: u32 ) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = frames as u128 * 1_000_000_000 / sample_rate as u128;
    Duration::from_nanos( nanos as u64 )
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_partial_frame_dropped() {
        let buffer = AudioBuffer::new( "a", vec![ 0.1, 0.2, 0.3 ], 48_000, 2 );
        assert_eq!( buffer.frames(), 1 );
        assert_eq!( buffer.frame( 0 ), Some( &[ 0.1, 0.2 ][ .. ] ) );
        assert_eq!( buffer.frame( 1 ), None );
    }


    #[test]
    fn test_duration_from_frames() {
        let buffer = AudioBuffer::silence( "a", Duration::from_secs( 3 ), 44_100, 2 );
        assert_eq!( buffer.frames(), 132_300 );
        assert_eq!( buffer.duration(), Duration::from_secs( 3 ) );
    }


    #[test]
    fn test_frame_conversion_rounds() {
        // 512 frames at 48 kHz is not a whole number of nanoseconds
        let dt = duration_for( 512, 48_000 );
        assert_eq!( frames_for( dt, 48_000 ), 512 );
        assert_eq!( frames_for( Duration::from_secs( 30 ), 48_000 ), 1_440_000 );
    }
}
