//! Engine tuning options
//!
//! Read from the `playback` section of the catalog file. Every field has a
//! default, so the section may be omitted entirely.

use std::time::Duration;

use serde::Deserialize;

use crate::decoder::EngineFormat;
use crate::fade::FadeCurve;


/// Playback engine settings.
#[derive( Debug, Clone, PartialEq, Deserialize )]
#[serde( default )]
pub struct EngineConfig {
    /// Crossfade length between two playables
    pub transition_ms: u64,

    /// Crossfade length when switching subtracks of a composite track
    pub layer_swap_ms: u64,

    /// Fade-out length for a fading stop
    pub stop_fade_ms: u64,

    /// Gain curve used by playable crossfades
    pub curve: FadeCurve,

    /// Frames mixed per ticker step
    pub tick_frames: usize,

    /// Engine sample rate; every sound is resampled to it on load
    pub sample_rate: u32,

    /// Engine channel count; every sound is remixed to it on load
    pub channels: u16,
}


impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transition_ms: 2_000,
            layer_swap_ms: 40,
            stop_fade_ms: 2_500,
            curve: FadeCurve::EqualPower,
            tick_frames: 512,
            sample_rate: 48_000,
            channels: 2,
        }
    }
}


impl EngineConfig {
    pub fn transition( &self ) -> Duration {
        Duration::from_millis( self.transition_ms )
    }


    pub fn layer_swap( &self ) -> Duration {
        Duration::from_millis( self.layer_swap_ms )
    }


    pub fn stop_fade( &self ) -> Duration {
        Duration::from_millis( self.stop_fade_ms )
    }


    pub fn format( &self ) -> EngineFormat {
        EngineFormat {
            sample_rate: self.sample_rate.max( 1 ),
            channels: self.channels.max( 1 ),
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: EngineConfig = serde_yaml::from_str( "transition_ms: 1500\ncurve: linear" ).unwrap();
        assert_eq!( config.transition(), Duration::from_millis( 1_500 ) );
        assert_eq!( config.curve, FadeCurve::Linear );
        assert_eq!( config.layer_swap(), Duration::from_millis( 40 ) );
        assert_eq!( config.sample_rate, 48_000 );
    }


    #[test]
    fn test_format_never_zero() {
        let config = EngineConfig { sample_rate: 0, channels: 0, ..EngineConfig::default() };
        assert_eq!( config.format(), EngineFormat { sample_rate: 1, channels: 1 } );
    }
}
