//! Audio output via cpal
//!
//! The ticker mixes blocks in the engine format and pushes them into a
//! [`Sink`]. On a real device the sink is a [`SampleBuffer`] drained by the
//! cpal callback; without one, a [`ClockSink`] discards samples at the
//! engine's real-time rate so playback state still advances.

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicU64, Ordering };
use std::sync::{ Arc, Mutex };
use std::time::Instant;

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;

use crate::decoder::EngineFormat;


/// Milliseconds of mixed audio queued ahead of the device.
pub const BUFFER_MS: usize = 200;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to play stream: {0}" )]
    PlayStream( String ),
}


/// Destination for mixed, interleaved engine-format samples.
pub trait Sink: Send + Sync {
    /// Queues as many samples as fit.
    ///
    /// @returns The number of samples accepted
    fn push( &self, samples: &[f32] ) -> usize;

    /// Number of samples that can be pushed right now.
    fn free( &self ) -> usize;

    /// Most samples the sink can ever hold at once.
    fn capacity( &self ) -> usize;
}


/// Number of samples in `BUFFER_MS` of audio.
pub fn buffer_capacity( format: EngineFormat ) -> usize {
    ( format.sample_rate as usize * format.channels as usize * BUFFER_MS / 1_000 ).max( 1 )
}


/// Bounded queue between the ticker (producer) and the audio callback
/// (consumer). Converts from the engine channel count to the device's on
/// the way out.
pub struct SampleBuffer {
    buffer: Mutex<VecDeque<f32>>,
    capacity: usize,
    source_channels: u16,
    output_channels: u16,
}


impl SampleBuffer {
    /// - `capacity`: Maximum number of samples to queue
    /// - `source_channels`: Channel count of pushed samples
    /// - `output_channels`: Channel count expected by `pop`
    pub fn new( capacity: usize, source_channels: u16, output_channels: u16 ) -> Self {
        Self {
            buffer: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            source_channels: source_channels.max( 1 ),
            output_channels: output_channels.max( 1 ),
        }
    }


    /// Pops whole frames into `output`, converting channels, and fills the
    /// rest with silence.
    ///
    /// @returns The number of output samples written from the queue
    pub fn pop( &self, output: &mut [f32] ) -> usize {
        let mut buf = self.buffer.lock().unwrap();
        let src_ch = self.source_channels as usize;
        let out_ch = self.output_channels as usize;

        let frames = ( output.len() / out_ch ).min( buf.len() / src_ch );
        let mut frame = Vec::with_capacity( src_ch );

        for out_frame in output.chunks_exact_mut( out_ch ).take( frames ) {
            frame.clear();
            frame.extend( buf.drain( ..src_ch ) );

            if src_ch == 2 && out_ch == 1 {
                out_frame[ 0 ] = ( frame[ 0 ] + frame[ 1 ] ) * 0.5;
                continue;
            }
            for ( ch, sample ) in out_frame.iter_mut().enumerate() {
                // Extra device channels repeat the last engine channel
                *sample = frame[ ch.min( src_ch - 1 ) ];
            }
        }

        let written = frames * out_ch;
        output[ written.. ].fill( 0.0 );
        written
    }


    pub fn len( &self ) -> usize {
        self.buffer.lock().unwrap().len()
    }


    pub fn is_empty( &self ) -> bool {
        self.buffer.lock().unwrap().is_empty()
    }


    pub fn clear( &self ) {
        self.buffer.lock().unwrap().clear();
    }
}


impl Sink for SampleBuffer {
    fn push( &self, samples: &[f32] ) -> usize {
        let mut buf = self.buffer.lock().unwrap();
        let to_push = samples.len().min( self.capacity.saturating_sub( buf.len() ) );
        buf.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    fn free( &self ) -> usize {
        self.capacity.saturating_sub( self.buffer.lock().unwrap().len() )
    }


    fn capacity( &self ) -> usize {
        self.capacity
    }
}


/// Sink for running without an output device. Accepts samples no faster
/// than the engine would play them and throws them away.
pub struct ClockSink {
    started: Instant,
    samples_per_sec: f64,
    capacity: usize,
    pushed: AtomicU64,
}


impl ClockSink {
    pub fn new( format: EngineFormat ) -> Self {
        Self {
            started: Instant::now(),
            samples_per_sec: format.sample_rate as f64 * format.channels as f64,
            capacity: buffer_capacity( format ),
            pushed: AtomicU64::new( 0 ),
        }
    }


    fn queued( &self ) -> usize {
        let consumed = ( self.started.elapsed().as_secs_f64() * self.samples_per_sec ) as u64;
        self.pushed.load( Ordering::Relaxed ).saturating_sub( consumed ) as usize
    }
}


impl Sink for ClockSink {
    fn push( &self, samples: &[f32] ) -> usize {
        let to_push = samples.len().min( self.free() );
        self.pushed.fetch_add( to_push as u64, Ordering::Relaxed );
        to_push
    }


    fn free( &self ) -> usize {
        self.capacity.saturating_sub( self.queued() )
    }


    fn capacity( &self ) -> usize {
        self.capacity
    }
}


/// Audio output handler.
/// Note: This struct is NOT Send/Sync due to cpal::Stream.
/// Keep it on the thread where it was created.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}


impl AudioOutput {
    /// Opens the default output device for the engine format.
    ///
    /// Returns both the AudioOutput and the shared SampleBuffer the ticker
    /// should push mixed blocks into.
    pub fn new( format: EngineFormat ) -> Result<( Self, Arc<SampleBuffer> ), OutputError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::info!( "Using output device: {:?}", device.name() );

        let supported_configs: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .collect();

        let rate_fits = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= format.sample_rate && c.max_sample_rate().0 >= format.sample_rate
        };

        // Prefer the exact engine format, then the engine rate with any
        // channel count (the buffer remixes channels)
        let config = match supported_configs.iter()
            .find( |c| c.channels() == format.channels && rate_fits( *c ) )
            .or_else( || supported_configs.iter().find( |c| rate_fits( *c ) ) )
        {
            Some( supported ) => supported.clone()
                .with_sample_rate( cpal::SampleRate( format.sample_rate ) )
                .config(),
            None => {
                let default_config = device
                    .default_output_config()
                    .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?;
                tracing::warn!(
                    "Device does not support {} Hz, using {} Hz - set playback.sample_rate to match",
                    format.sample_rate,
                    default_config.sample_rate().0
                );
                default_config.config()
            }
        };

        if config.channels != format.channels {
            tracing::info!(
                "Channel conversion: engine has {} channels, device using {}",
                format.channels,
                config.channels
            );
        }
        tracing::info!(
            "Audio output config: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        let sample_buffer = Arc::new( SampleBuffer::new(
            buffer_capacity( format ),
            format.channels,
            config.channels,
        ));
        let callback_buffer = Arc::clone( &sample_buffer );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback_buffer.pop( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok((
            Self {
                stream,
                sample_rate: config.sample_rate.0,
                channels: config.channels,
            },
            sample_buffer,
        ))
    }


    /// Starts audio output.
    pub fn play( &self ) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )
    }


    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    pub fn channels( &self ) -> u16 {
        self.channels
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_push_respects_capacity() {
        let buffer = SampleBuffer::new( 4, 1, 1 );
        assert_eq!( buffer.push( &[ 0.1, 0.2, 0.3 ] ), 3 );
        assert_eq!( buffer.free(), 1 );
        assert_eq!( buffer.push( &[ 0.4, 0.5 ] ), 1 );
        assert_eq!( buffer.len(), 4 );
    }


    #[test]
    fn test_pop_pads_with_silence() {
        let buffer = SampleBuffer::new( 8, 2, 2 );
        buffer.push( &[ 0.1, 0.2 ] );
        let mut out = [ 9.0_f32; 4 ];
        assert_eq!( buffer.pop( &mut out ), 2 );
        assert_eq!( out, [ 0.1, 0.2, 0.0, 0.0 ] );
        assert!( buffer.is_empty() );
    }


    #[test]
    fn test_mono_to_stereo() {
        let buffer = SampleBuffer::new( 8, 1, 2 );
        buffer.push( &[ 0.5, -0.5 ] );
        let mut out = [ 0.0_f32; 4 ];
        buffer.pop( &mut out );
        assert_eq!( out, [ 0.5, 0.5, -0.5, -0.5 ] );
    }


    #[test]
    fn test_stereo_to_mono() {
        let buffer = SampleBuffer::new( 8, 2, 1 );
        buffer.push( &[ 0.2, 0.4, 1.0, 0.0 ] );
        let mut out = [ 0.0_f32; 2 ];
        buffer.pop( &mut out );
        assert!( ( out[ 0 ] - 0.3 ).abs() < 1e-6 );
        assert!( ( out[ 1 ] - 0.5 ).abs() < 1e-6 );
    }


    #[test]
    fn test_clock_sink_bounded() {
        let sink = ClockSink::new( EngineFormat { sample_rate: 1_000, channels: 1 } );
        assert_eq!( sink.free(), 200 );
        assert!( sink.push( &[ 0.0; 500 ] ) <= 200 );
        assert!( sink.free() < 200 );
    }
}
