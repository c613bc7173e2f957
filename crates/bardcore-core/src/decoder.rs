//! Audio decoding via Symphonia
//!
//! Sound files are decoded fully into memory at catalog load time, then
//! resampled and channel-fitted to the engine format.

use std::fs::File;
use std::path::Path;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{ FormatOptions, FormatReader };
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::buffer::AudioBuffer;


/// Errors that can occur during decoding.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format" )]
    UnsupportedFormat,

    #[error( "No audio tracks found" )]
    NoAudioTrack,

    #[error( "Decoder creation failed: {0}" )]
    DecoderCreation( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),

    #[error( "Resample error: {0}" )]
    Resample( String ),

    #[error( "File contains no audio frames" )]
    Empty,
}


/// Target format every loaded buffer is converted to.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct EngineFormat {
    pub sample_rate: u32,
    pub channels: u16,
}


/// Streaming decoder wrapper around Symphonia.
pub struct Decoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    sample_buf: Option<SampleBuffer<f32>>,
}


impl Decoder {
    /// Opens an audio file for decoding.
    pub fn open( path: &Path ) -> Result<Self, DecoderError> {
        let file = File::open( path )?;
        let mss = MediaSourceStream::new( Box::new( file ), MediaSourceStreamOptions::default() );

        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let probed = symphonia::default::get_probe()
            .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
            .map_err( |_| DecoderError::UnsupportedFormat )?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let track_id = track.id;
        let codec_params = &track.codec_params;
        let sample_rate = codec_params.sample_rate.unwrap_or( 44100 );
        let channels = codec_params.channels.map( |c| c.count() ).unwrap_or( 2 );

        let decoder = symphonia::default::get_codecs()
            .make( codec_params, &DecoderOptions::default() )
            .map_err( |e| DecoderError::DecoderCreation( e.to_string() ) )?;

        tracing::debug!( "Opened {:?}: {} Hz, {} channels", path, sample_rate, channels );

        Ok( Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            sample_buf: None,
        })
    }


    /// Returns the sample rate of the audio.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    /// Returns the number of channels.
    pub fn channels( &self ) -> usize {
        self.channels
    }


    /// Decodes the next packet and returns interleaved f32 samples.
    ///
    /// Returns None when EOF is reached.
    pub fn decode_next( &mut self ) -> Result<Option<Vec<f32>>, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok( packet ) => packet,
                Err( SymphoniaError::IoError( ref e ) )
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok( None );
                }
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode( &packet ) {
                Ok( decoded ) => decoded,
                // Recoverable, skip the packet
                Err( SymphoniaError::DecodeError( _ ) ) => continue,
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            let spec = *decoded.spec();
            let num_frames = decoded.frames();

            if self.sample_buf.as_ref().is_some_and( |buf| buf.capacity() < num_frames ) {
                self.sample_buf = None;
            }
            let sample_buf = self.sample_buf
                .get_or_insert_with( || SampleBuffer::new( num_frames as u64, spec ) );
            sample_buf.copy_interleaved_ref( decoded );

            return Ok( Some( sample_buf.samples().to_vec() ) );
        }
    }


    /// Decodes the remainder of the stream into one interleaved vector.
    pub fn decode_all( &mut self ) -> Result<Vec<f32>, DecoderError> {
        let mut samples = Vec::new();
        while let Some( chunk ) = self.decode_next()? {
            samples.extend_from_slice( &chunk );
        }
        Ok( samples )
    }
}


/// Decodes a sound file into an AudioBuffer in the engine format.
///
/// @param id - Identifier given to the buffer
/// @param path - Sound file to decode
/// @param format - Target sample rate and channel count
///
/// @returns The converted buffer, or the reason it could not be loaded
pub fn load_buffer( id: &str, path: &Path, format: EngineFormat ) -> Result<AudioBuffer, DecoderError> {
    let mut decoder = Decoder::open( path )?;
    let source_rate = decoder.sample_rate();
    let source_channels = decoder.channels();
    let samples = decoder.decode_all()?;

    if samples.len() < source_channels {
        return Err( DecoderError::Empty );
    }

    let mut planar = deinterleave( &samples, source_channels );
    if source_rate != format.sample_rate {
        tracing::debug!(
            "Resampling '{}': {} Hz → {} Hz",
            id,
            source_rate,
            format.sample_rate
        );
        planar = resample( planar, source_rate, format.sample_rate )?;
    }

    let fitted = fit_channels( planar, format.channels as usize );
    let buffer = AudioBuffer::new( id, interleave( &fitted ), format.sample_rate, format.channels )
        .with_source( path );

    tracing::debug!( "Loaded '{}' ({:?}, {} frames)", id, buffer.duration(), buffer.frames() );
    Ok( buffer )
}


/// Splits interleaved samples into one vector per channel.
fn deinterleave( samples: &[f32], channels: usize ) -> Vec<Vec<f32>> {
    let mut planar: Vec<Vec<f32>> = ( 0..channels )
        .map( |_| Vec::with_capacity( samples.len() / channels ) )
        .collect();
    for frame in samples.chunks_exact( channels ) {
        for ( ch, sample ) in frame.iter().enumerate() {
            planar[ ch ].push( *sample );
        }
    }
    planar
}


/// Converts planar samples back to interleaved format.
/// [[L0, L1, ...], [R0, R1, ...]] → [L0, R0, L1, R1, ...]
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    if channels.is_empty() || channels[ 0 ].is_empty() {
        return Vec::new();
    }
    let frames = channels[ 0 ].len();
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


/// Resamples a whole planar signal, trimming the resampler delay so the
/// output lines up with the input.
fn resample( planar: Vec<Vec<f32>>, from: u32, to: u32 ) -> Result<Vec<Vec<f32>>, DecoderError> {
    let channels = planar.len();
    let in_frames = planar[ 0 ].len();
    let ratio = to as f64 / from as f64;

    let mut resampler = FastFixedOut::<f32>::new(
        ratio,
        1.1,
        PolynomialDegree::Cubic,
        1024,
        channels,
    ).map_err( |e| DecoderError::Resample( e.to_string() ) )?;

    let delay = resampler.output_delay();
    let expected = ( in_frames as f64 * ratio ).round() as usize;
    let mut out: Vec<Vec<f32>> = vec![ Vec::with_capacity( expected + delay ); channels ];

    let append = |out: &mut Vec<Vec<f32>>, chunk: Vec<Vec<f32>>| {
        for ( dst, src ) in out.iter_mut().zip( chunk ) {
            dst.extend( src );
        }
    };

    let mut pos = 0;
    while in_frames - pos >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let chunk: Vec<&[f32]> = planar.iter().map( |ch| &ch[ pos..pos + needed ] ).collect();
        let resampled = resampler.process( &chunk, None )
            .map_err( |e| DecoderError::Resample( e.to_string() ) )?;
        append( &mut out, resampled );
        pos += needed;
    }

    if pos < in_frames {
        let chunk: Vec<&[f32]> = planar.iter().map( |ch| &ch[ pos.. ] ).collect();
        let resampled = resampler.process_partial( Some( &chunk ), None )
            .map_err( |e| DecoderError::Resample( e.to_string() ) )?;
        append( &mut out, resampled );
    }

    // Flush the delay line
    while out[ 0 ].len() < expected + delay {
        let resampled = resampler.process_partial::<Vec<f32>>( None, None )
            .map_err( |e| DecoderError::Resample( e.to_string() ) )?;
        if resampled[ 0 ].is_empty() {
            break;
        }
        append( &mut out, resampled );
    }

    for ch in out.iter_mut() {
        ch.drain( ..delay.min( ch.len() ) );
        ch.truncate( expected );
    }
    Ok( out )
}


/// Converts a planar signal to the requested channel count.
///
/// Mono is duplicated, stereo to mono is mixed down, and any other case
/// copies matching channels and repeats the last one.
fn fit_channels( planar: Vec<Vec<f32>>, target: usize ) -> Vec<Vec<f32>> {
    let source = planar.len();
    if source == target {
        return planar;
    }

    if source == 2 && target == 1 {
        let mixed = planar[ 0 ].iter()
            .zip( &planar[ 1 ] )
            .map( |( l, r )| ( l + r ) * 0.5 )
            .collect();
        return vec![ mixed ];
    }

    ( 0..target )
        .map( |ch| planar[ ch.min( source - 1 ) ].clone() )
        .collect()
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_interleave_round_trip() {
        let samples = vec![ 1.0, -1.0, 2.0, -2.0, 3.0, -3.0 ];
        let planar = deinterleave( &samples, 2 );
        assert_eq!( planar, vec![ vec![ 1.0, 2.0, 3.0 ], vec![ -1.0, -2.0, -3.0 ] ] );
        assert_eq!( interleave( &planar ), samples );
    }


    #[test]
    fn test_fit_mono_to_stereo() {
        let fitted = fit_channels( vec![ vec![ 0.5, 0.25 ] ], 2 );
        assert_eq!( fitted, vec![ vec![ 0.5, 0.25 ], vec![ 0.5, 0.25 ] ] );
    }


    #[test]
    fn test_fit_stereo_to_mono() {
        let fitted = fit_channels( vec![ vec![ 1.0 ], vec![ 0.0 ] ], 1 );
        assert_eq!( fitted, vec![ vec![ 0.5 ] ] );
    }


    #[test]
    fn test_resample_length() {
        let planar = vec![ vec![ 0.0_f32; 44_100 ]; 2 ];
        let out = resample( planar, 44_100, 48_000 ).unwrap();
        assert_eq!( out.len(), 2 );
        assert_eq!( out[ 0 ].len(), 48_000 );
    }


    #[test]
    fn test_open_missing_file() {
        let result = Decoder::open( Path::new( "/definitely/not/here.wav" ) );
        assert!( matches!( result, Err( DecoderError::FileOpen( _ ) ) ) );
    }
}
