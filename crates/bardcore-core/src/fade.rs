//! Gain curves for crossfades
//!
//! A transition of progress `p` in [0, 1] gives the incoming source a gain
//! of `f(p)` and the outgoing source `1 - f(p)`, so the two never sum above
//! unity.

use std::f32::consts::{ FRAC_PI_2, PI };
use std::time::Duration;

use serde::Deserialize;


/// Shape of a crossfade.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize )]
#[serde( rename_all = "kebab-case" )]
pub enum FadeCurve {
    /// f(p) = p
    Linear,

    /// f(p) = sin(p × π/2). A sine fade-in against the complementary
    /// fade-out `1 − f(p)`; the incoming source rises quickly, but the
    /// summed power still dips to about 0.59 at the midpoint.
    #[default]
    EqualPower,

    /// f(p) = 0.5 × (1 − cos(π × p))
    SCurve,
}


impl FadeCurve {
    /// Incoming gain at the given progress. Progress is clamped to [0, 1].
    pub fn fade_in( &self, progress: f32 ) -> f32 {
        let p = progress.clamp( 0.0, 1.0 );
        let gain = match self {
            FadeCurve::Linear => p,
            FadeCurve::EqualPower => ( p * FRAC_PI_2 ).sin(),
            FadeCurve::SCurve => 0.5 * ( 1.0 - ( PI * p ).cos() ),
        };
        gain.clamp( 0.0, 1.0 )
    }


    /// Outgoing gain at the given progress.
    pub fn fade_out( &self, progress: f32 ) -> f32 {
        1.0 - self.fade_in( progress )
    }
}


/// Progress of `elapsed` through `total`, in [0, 1]. A zero-length fade is
/// always complete.
pub fn progress( elapsed: Duration, total: Duration ) -> f32 {
    if total.is_zero() {
        return 1.0;
    }
    ( elapsed.as_secs_f64() / total.as_secs_f64() ).clamp( 0.0, 1.0 ) as f32
}


/// Linear gain movement toward a target over a fixed time.
#[derive( Debug, Clone, Copy, PartialEq )]
pub struct GainRamp {
    from: f32,
    to: f32,
    elapsed: Duration,
    duration: Duration,
}


impl GainRamp {
    pub fn new( from: f32, to: f32, duration: Duration ) -> Self {
        Self { from, to, elapsed: Duration::ZERO, duration }
    }


    pub fn target( &self ) -> f32 {
        self.to
    }


    /// Advances the ramp and returns the gain at the new point.
    pub fn advance( &mut self, dt: Duration ) -> f32 {
        self.elapsed = ( self.elapsed + dt ).min( self.duration );
        self.current()
    }


    pub fn current( &self ) -> f32 {
        let p = progress( self.elapsed, self.duration );
        self.from + ( self.to - self.from ) * p
    }


    pub fn is_finished( &self ) -> bool {
        self.elapsed >= self.duration
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use approx::assert_relative_eq;


    const CURVES: [FadeCurve; 3] = [ FadeCurve::Linear, FadeCurve::EqualPower, FadeCurve::SCurve ];


    #[test]
    fn test_endpoints() {
        for curve in CURVES {
            assert_relative_eq!( curve.fade_in( 0.0 ), 0.0 );
            assert_relative_eq!( curve.fade_out( 0.0 ), 1.0 );
            assert_relative_eq!( curve.fade_in( 1.0 ), 1.0 );
            assert_relative_eq!( curve.fade_out( 1.0 ), 0.0, epsilon = 1e-6 );
        }
    }


    #[test]
    fn test_sum_never_exceeds_unity() {
        for curve in CURVES {
            for step in 0..=100 {
                let p = step as f32 / 100.0;
                let sum = curve.fade_in( p ) + curve.fade_out( p );
                assert!( sum <= 1.0 + 1e-6, "{:?} at {} sums to {}", curve, p, sum );
            }
        }
    }


    #[test]
    fn test_monotonic() {
        for curve in CURVES {
            let mut last = 0.0;
            for step in 0..=100 {
                let gain = curve.fade_in( step as f32 / 100.0 );
                assert!( gain >= last );
                last = gain;
            }
        }
    }


    #[test]
    fn test_progress_clamps() {
        assert_eq!( progress( Duration::from_secs( 3 ), Duration::from_secs( 2 ) ), 1.0 );
        assert_eq!( progress( Duration::ZERO, Duration::ZERO ), 1.0 );
        assert_relative_eq!( progress( Duration::from_millis( 500 ), Duration::from_secs( 2 ) ), 0.25 );
    }


    #[test]
    fn test_ramp() {
        let mut ramp = GainRamp::new( 1.0, 0.0, Duration::from_millis( 40 ) );
        assert_relative_eq!( ramp.advance( Duration::from_millis( 10 ) ), 0.75 );
        assert!( !ramp.is_finished() );
        assert_relative_eq!( ramp.advance( Duration::from_millis( 100 ) ), 0.0 );
        assert!( ramp.is_finished() );
    }


    #[test]
    fn test_curve_from_config() {
        let curve: FadeCurve = serde_yaml::from_str( "equal-power" ).unwrap();
        assert_eq!( curve, FadeCurve::EqualPower );
        let curve: FadeCurve = serde_yaml::from_str( "s-curve" ).unwrap();
        assert_eq!( curve, FadeCurve::SCurve );
    }
}
