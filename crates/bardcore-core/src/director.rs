//! Playback director
//!
//! The director owns whatever is playing and is the only thing that changes
//! it. It is driven from one place (the ticker thread), which applies
//! control requests between ticks, so a request is never interleaved with
//! the advancement of audio state.
//!
//! States:
//! - Idle: nothing playing
//! - Playing: one playable, full gain
//! - Transitioning: an outgoing playable fading out while an incoming one
//!   (if any) fades in; with no incoming playable the fade ends in Idle

use std::sync::Arc;
use std::time::Duration;

use crate::buffer::{ duration_for, frames_for };
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::PlaybackError;
use crate::fade::{ progress, FadeCurve };
use crate::playable::{ Playable, PlayableKind, TickReport };


/// Coarse director state.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum DirectorState {
    Idle,
    Playing,
    Transitioning,
}


/// Things that happened during a tick, for logging and the front end.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum DirectorEvent {
    /// A crossfade finished and `playable` is now playing alone.
    TransitionComplete { playable: String },
    /// A track list moved on to another entry by itself.
    EntryAdvanced { playable: String, entry: String },
    /// Playback ended: a fade-out completed or every voice failed.
    Stopped { playable: String },
    /// A voice failed and was removed.
    VoiceFault { playable: String, track: String, reason: String },
}


/// Control requests accepted by [`PlaybackDirector::apply`].
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum Request {
    Play { name: String, track: Option<String> },
    SwitchSubtrack { name: String },
    Stop,
    FadeOut,
    SetVolume { volume: i64 },
    List,
    Status,
}


/// Successful result of a request.
#[derive( Debug, Clone, PartialEq )]
pub enum Reply {
    Done,
    Listing( Listing ),
    Status( Status ),
}


/// Read-only view of what can be played.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct Listing {
    pub playables: Vec<( String, PlayableKind )>,
    /// Subtracks of the active composite track, if one is active
    pub subtracks: Option<Vec<String>>,
    /// Audible subtrack or entry, if anything is playing
    pub current: Option<String>,
}


/// Snapshot of playback for display.
#[derive( Debug, Clone, PartialEq )]
pub struct Status {
    pub state: DirectorState,
    pub playable: Option<String>,
    pub track: Option<String>,
    pub volume: u8,
    pub position: Option<Duration>,
}


/// A crossfade in progress.
#[derive( Debug )]
struct Transition {
    outgoing: Playable,
    /// Outgoing gain when this fade began
    outgoing_from: f32,
    incoming: Option<Playable>,
    elapsed: Duration,
    duration: Duration,
    curve: FadeCurve,
}


impl Transition {
    fn progress( &self ) -> f32 {
        progress( self.elapsed, self.duration )
    }


    fn outgoing_gain( &self ) -> f32 {
        self.outgoing_from * self.curve.fade_out( self.progress() )
    }


    fn incoming_gain( &self ) -> f32 {
        self.curve.fade_in( self.progress() )
    }
}


#[derive( Debug )]
enum Slot {
    Idle,
    Playing( Playable ),
    Transitioning( Transition ),
}


/// Top-level playback state machine.
#[derive( Debug )]
pub struct PlaybackDirector {
    catalog: Arc<Catalog>,
    engine: EngineConfig,
    slot: Slot,
    volume: u8,
}


impl PlaybackDirector {
    /// Creates an idle director using the catalog's engine settings and
    /// master volume.
    pub fn new( catalog: Arc<Catalog> ) -> Self {
        let engine = catalog.engine().clone();
        let volume = catalog.master_volume();
        Self {
            catalog,
            engine,
            slot: Slot::Idle,
            volume,
        }
    }


    pub fn catalog( &self ) -> &Catalog {
        &self.catalog
    }


    pub fn engine( &self ) -> &EngineConfig {
        &self.engine
    }


    /// Applies one control request.
    pub fn apply( &mut self, request: Request ) -> Result<Reply, PlaybackError> {
        match request {
            Request::Play { name, track } => self.play_from( &name, track.as_deref() ).map( |_| Reply::Done ),
            Request::SwitchSubtrack { name } => self.switch_subtrack( &name ).map( |_| Reply::Done ),
            Request::Stop => {
                self.stop();
                Ok( Reply::Done )
            }
            Request::FadeOut => {
                self.stop_with_fade();
                Ok( Reply::Done )
            }
            Request::SetVolume { volume } => self.set_volume( volume ).map( |_| Reply::Done ),
            Request::List => Ok( Reply::Listing( self.list() ) ),
            Request::Status => Ok( Reply::Status( self.status() ) ),
        }
    }


    /// Plays a playable from the catalog, crossfading from whatever is
    /// playing. Requesting the playable that is already playing does nothing.
    pub fn play( &mut self, name: &str ) -> Result<(), PlaybackError> {
        self.play_from( name, None )
    }


    /// Plays a playable starting at a named subtrack or entry.
    ///
    /// When `name` is already playing, a composite switches subtrack and a
    /// track list ignores the request, since lists only move forward.
    pub fn play_from( &mut self, name: &str, track: Option<&str> ) -> Result<(), PlaybackError> {
        if self.now_playing() == Some( name ) {
            return self.retarget_current( track );
        }

        let def = self.catalog.resolve( name )?;
        let mut incoming = def.instantiate( name, &self.engine )?;
        incoming.start( track )?;

        tracing::info!( "Playing '{}' ({})", name, incoming.current_track() );

        self.slot = match std::mem::replace( &mut self.slot, Slot::Idle ) {
            Slot::Idle => Slot::Playing( incoming ),
            Slot::Playing( outgoing ) => self.begin_transition( outgoing, 1.0, Some( incoming ) ),
            Slot::Transitioning( mut fade ) => {
                let from = fade.outgoing_gain();
                if let Some( mut discarded ) = fade.incoming.take() {
                    tracing::debug!( "Discarding incoming '{}'", discarded.name() );
                    discarded.stop();
                }
                self.begin_transition( fade.outgoing, from, Some( incoming ) )
            }
        };
        Ok(())
    }


    fn retarget_current( &mut self, track: Option<&str> ) -> Result<(), PlaybackError> {
        let Some( track ) = track else {
            tracing::debug!( "Already playing. Skipping." );
            return Ok(());
        };

        let current = match self.slot {
            Slot::Playing( ref mut p ) => p,
            Slot::Transitioning( Transition { incoming: Some( ref mut p ), .. } ) => p,
            _ => return Ok(()),
        };

        match current {
            Playable::Composite( c ) => c.switch_subtrack( track ),
            Playable::List( l ) => {
                if !l.list_entries().contains( &track ) {
                    return Err( PlaybackError::UnknownSubtrack {
                        playable: l.name().to_string(),
                        subtrack: track.to_string(),
                    });
                }
                if l.current_entry() != track {
                    tracing::warn!( "Switching tracks of a track list is not supported." );
                }
                Ok(())
            }
            Playable::Track( t ) if t.name() == track => Ok(()),
            Playable::Track( t ) => Err( PlaybackError::UnknownSubtrack {
                playable: t.name().to_string(),
                subtrack: track.to_string(),
            }),
        }
    }


    fn begin_transition( &self, outgoing: Playable, from: f32, incoming: Option<Playable> ) -> Slot {
        let duration = match incoming {
            Some( _ ) => self.engine.transition(),
            None => self.engine.stop_fade(),
        };
        Slot::Transitioning( Transition {
            outgoing,
            outgoing_from: from,
            incoming,
            elapsed: Duration::ZERO,
            duration,
            curve: self.engine.curve,
        })
    }


    /// Switches the audible subtrack of the playing composite track.
    pub fn switch_subtrack( &mut self, name: &str ) -> Result<(), PlaybackError> {
        match self.slot {
            Slot::Playing( Playable::Composite( ref mut c ) ) => c.switch_subtrack( name ),
            _ => Err( PlaybackError::NotACompositeTrack ),
        }
    }


    /// Stops everything at once.
    pub fn stop( &mut self ) {
        match std::mem::replace( &mut self.slot, Slot::Idle ) {
            Slot::Idle => tracing::debug!( "Nothing to stop. Skipping." ),
            Slot::Playing( mut p ) => {
                p.stop();
                tracing::info!( "Stopped '{}'", p.name() );
            }
            Slot::Transitioning( mut fade ) => {
                fade.outgoing.stop();
                if let Some( mut p ) = fade.incoming {
                    p.stop();
                }
                tracing::info!( "Stopped during transition" );
            }
        }
    }


    /// Fades out whatever is playing over the configured stop fade, then
    /// goes idle.
    pub fn stop_with_fade( &mut self ) {
        if self.engine.stop_fade().is_zero() {
            self.stop();
            return;
        }

        self.slot = match std::mem::replace( &mut self.slot, Slot::Idle ) {
            Slot::Idle => Slot::Idle,
            Slot::Playing( p ) => {
                tracing::info!( "Fading out '{}'", p.name() );
                self.begin_transition( p, 1.0, None )
            }
            Slot::Transitioning( mut fade ) => match fade.incoming.take() {
                Some( incoming ) => {
                    let from = fade.incoming_gain();
                    fade.outgoing.stop();
                    tracing::info!( "Fading out '{}'", incoming.name() );
                    self.begin_transition( incoming, from, None )
                }
                None => Slot::Transitioning( fade ),
            },
        };
    }


    /// Sets the master volume, 0-100.
    pub fn set_volume( &mut self, volume: i64 ) -> Result<(), PlaybackError> {
        if !( 0..=100 ).contains( &volume ) {
            return Err( PlaybackError::OutOfRange( volume ) );
        }
        self.volume = volume as u8;
        tracing::info!( "Volume set to {}%", volume );
        Ok(())
    }


    pub fn volume( &self ) -> u8 {
        self.volume
    }


    /// Master gain applied on top of every voice, in [0, 1].
    pub fn master_gain( &self ) -> f32 {
        self.volume as f32 / 100.0
    }


    /// Catalog contents and, for an active composite track, its subtracks.
    pub fn list( &self ) -> Listing {
        let playing = self.playing();
        Listing {
            playables: self.catalog.all()
                .into_iter()
                .map( |( name, kind )| ( name.to_string(), kind ) )
                .collect(),
            subtracks: playing
                .and_then( |p| p.as_composite() )
                .map( |c| c.list_subtracks().into_iter().map( String::from ).collect() ),
            current: playing.map( |p| p.current_track().to_string() ),
        }
    }


    pub fn state( &self ) -> DirectorState {
        match self.slot {
            Slot::Idle => DirectorState::Idle,
            Slot::Playing( _ ) => DirectorState::Playing,
            Slot::Transitioning( _ ) => DirectorState::Transitioning,
        }
    }


    /// The playable the operator last asked for: the playing one, or the
    /// incoming one during a crossfade.
    pub fn playing( &self ) -> Option<&Playable> {
        match self.slot {
            Slot::Idle => None,
            Slot::Playing( ref p ) => Some( p ),
            Slot::Transitioning( ref fade ) => fade.incoming.as_ref(),
        }
    }


    /// Playable fading out, during a transition.
    pub fn outgoing( &self ) -> Option<&Playable> {
        match self.slot {
            Slot::Transitioning( ref fade ) => Some( &fade.outgoing ),
            _ => None,
        }
    }


    pub fn now_playing( &self ) -> Option<&str> {
        self.playing().map( |p| p.name() )
    }


    pub fn current_track( &self ) -> Result<&str, PlaybackError> {
        self.playing()
            .map( |p| p.current_track() )
            .ok_or( PlaybackError::NothingPlaying )
    }


    /// Position of the now-playing unit.
    pub fn position( &self ) -> Option<Duration> {
        self.playing().map( |p| p.position() )
    }


    /// (outgoing, incoming) gains of the crossfade in progress.
    pub fn transition_gains( &self ) -> Option<( f32, f32 )> {
        match self.slot {
            Slot::Transitioning( ref fade ) => {
                let incoming = if fade.incoming.is_some() { fade.incoming_gain() } else { 0.0 };
                Some(( fade.outgoing_gain(), incoming ))
            }
            _ => None,
        }
    }


    pub fn status( &self ) -> Status {
        let playing = self.playing();
        Status {
            state: self.state(),
            playable: playing.map( |p| p.name().to_string() ),
            track: playing.map( |p| p.current_track().to_string() ),
            volume: self.volume,
            position: self.position(),
        }
    }


    /// Advances everything by `dt` of playback time.
    pub fn tick( &mut self, dt: Duration ) -> Vec<DirectorEvent> {
        let frames = frames_for( dt, self.engine.format().sample_rate );
        self.tick_frames( frames, dt )
    }


    /// Mixes one block into `out` and advances by the frames it covered.
    ///
    /// @param out - Interleaved block in the engine channel count
    ///
    /// @returns Events raised while advancing
    pub fn process( &mut self, out: &mut [f32] ) -> Vec<DirectorEvent> {
        let format = self.engine.format();
        self.render( out );
        let frames = ( out.len() / format.channels as usize ) as u64;
        self.tick_frames( frames, duration_for( frames, format.sample_rate ) )
    }


    /// Mixes the current state into `out`, overwriting it.
    pub fn render( &self, out: &mut [f32] ) {
        out.fill( 0.0 );
        let channels = self.engine.format().channels as usize;
        let master = self.master_gain();

        match self.slot {
            Slot::Idle => {}
            Slot::Playing( ref p ) => p.render( out, channels, master ),
            Slot::Transitioning( ref fade ) => {
                fade.outgoing.render( out, channels, fade.outgoing_gain() * master );
                if let Some( ref incoming ) = fade.incoming {
                    incoming.render( out, channels, fade.incoming_gain() * master );
                }
            }
        }
    }


    fn tick_frames( &mut self, frames: u64, dt: Duration ) -> Vec<DirectorEvent> {
        let mut events = Vec::new();

        self.slot = match std::mem::replace( &mut self.slot, Slot::Idle ) {
            Slot::Idle => Slot::Idle,
            Slot::Playing( mut p ) => {
                let report = p.tick_frames( frames, dt );
                collect( &p, report, &mut events );
                if p.is_alive() {
                    Slot::Playing( p )
                } else {
                    tracing::error!( "Every voice of '{}' failed", p.name() );
                    events.push( DirectorEvent::Stopped { playable: p.name().to_string() } );
                    Slot::Idle
                }
            }
            Slot::Transitioning( mut fade ) => {
                let report = fade.outgoing.tick_frames( frames, dt );
                collect( &fade.outgoing, report, &mut events );
                if let Some( ref mut incoming ) = fade.incoming {
                    let report = incoming.tick_frames( frames, dt );
                    collect( incoming, report, &mut events );
                }

                // A dead incoming playable is dropped; the outgoing one
                // finishes its fade and the director ends up idle
                if fade.incoming.as_ref().is_some_and( |p| !p.is_alive() ) {
                    if let Some( dead ) = fade.incoming.take() {
                        tracing::error!( "Every voice of '{}' failed", dead.name() );
                        events.push( DirectorEvent::Stopped { playable: dead.name().to_string() } );
                    }
                }
                fade.elapsed += dt;

                if fade.elapsed < fade.duration {
                    Slot::Transitioning( fade )
                } else {
                    fade.outgoing.stop();
                    tracing::debug!( "Discarded '{}'", fade.outgoing.name() );
                    match fade.incoming {
                        Some( incoming ) => {
                            tracing::info!( "Transition to '{}' complete", incoming.name() );
                            events.push( DirectorEvent::TransitionComplete {
                                playable: incoming.name().to_string(),
                            });
                            Slot::Playing( incoming )
                        }
                        None => {
                            tracing::info!( "Stopped '{}'", fade.outgoing.name() );
                            events.push( DirectorEvent::Stopped {
                                playable: fade.outgoing.name().to_string(),
                            });
                            Slot::Idle
                        }
                    }
                }
            }
        };

        events
    }
}


/// Turns a playable's tick report into director events.
fn collect( playable: &Playable, report: TickReport, events: &mut Vec<DirectorEvent> ) {
    let name = playable.name();
    if let Some( entry ) = report.advanced_to {
        events.push( DirectorEvent::EntryAdvanced { playable: name.to_string(), entry } );
    }
    for ( track, error ) in report.faults {
        events.push( DirectorEvent::VoiceFault {
            playable: name.to_string(),
            track,
            reason: error.to_string(),
        });
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::buffer::AudioBuffer;
    use crate::catalog::PlayableDef;
    use crate::tracklist::TraversalPolicy;
    use approx::assert_relative_eq;


    const RATE: u32 = 1_000;


    fn buffer( name: &str, secs: u64 ) -> Arc<AudioBuffer> {
        Arc::new( AudioBuffer::silence( name, Duration::from_secs( secs ), RATE, 1 ) )
    }


    fn engine() -> EngineConfig {
        EngineConfig {
            transition_ms: 2_000,
            layer_swap_ms: 40,
            stop_fade_ms: 1_000,
            sample_rate: RATE,
            channels: 1,
            ..EngineConfig::default()
        }
    }


    fn director() -> PlaybackDirector {
        let mut catalog = Catalog::new( engine() );
        catalog.insert( "ambient", PlayableDef::Composite {
            layers: vec![
                ( "quiet".into(), buffer( "quiet", 120 ) ),
                ( "battle".into(), buffer( "battle", 120 ) ),
            ],
        });
        catalog.insert( "roleplay", PlayableDef::TrackList {
            entries: vec![
                ( "npc1".into(), buffer( "npc1", 60 ) ),
                ( "npc2".into(), buffer( "npc2", 60 ) ),
            ],
            policy: TraversalPolicy::Sequential,
        });
        catalog.insert( "rain", PlayableDef::Track { buffer: buffer( "rain", 30 ) } );
        catalog.mark_failed( "storm", "bad file" );
        PlaybackDirector::new( Arc::new( catalog ) )
    }


    #[test]
    fn test_play_from_idle() {
        let mut director = director();
        assert_eq!( director.state(), DirectorState::Idle );
        director.play( "ambient" ).unwrap();
        assert_eq!( director.state(), DirectorState::Playing );
        assert_eq!( director.now_playing(), Some( "ambient" ) );
        assert_eq!( director.current_track().unwrap(), "quiet" );
    }


    #[test]
    fn test_play_unknown_keeps_state() {
        let mut director = director();
        director.play( "ambient" ).unwrap();
        assert_eq!( director.play( "dragon" ).unwrap_err(), PlaybackError::UnknownPlayable( "dragon".into() ) );
        assert!( matches!( director.play( "storm" ), Err( PlaybackError::BufferLoadFailure { .. } ) ) );
        assert_eq!( director.state(), DirectorState::Playing );
        assert_eq!( director.now_playing(), Some( "ambient" ) );
    }


    #[test]
    fn test_play_same_is_noop() {
        let mut director = director();
        director.play( "ambient" ).unwrap();
        director.tick( Duration::from_secs( 5 ) );
        director.play( "ambient" ).unwrap();
        assert_eq!( director.state(), DirectorState::Playing );
        assert_eq!( director.playing().unwrap().position(), Duration::from_secs( 5 ) );
    }


    #[test]
    fn test_play_from_same_composite_switches() {
        let mut director = director();
        director.play( "ambient" ).unwrap();
        director.play_from( "ambient", Some( "battle" ) ).unwrap();
        assert_eq!( director.current_track().unwrap(), "battle" );
        assert_eq!( director.state(), DirectorState::Playing );
    }


    #[test]
    fn test_play_from_same_list_is_ignored() {
        let mut director = director();
        director.play( "roleplay" ).unwrap();
        director.play_from( "roleplay", Some( "npc2" ) ).unwrap();
        assert_eq!( director.current_track().unwrap(), "npc1" );
        assert!( director.play_from( "roleplay", Some( "npc9" ) ).is_err() );
    }


    #[test]
    fn test_play_from_unknown_track() {
        let mut director = director();
        let err = director.play_from( "ambient", Some( "dragon" ) ).unwrap_err();
        assert!( matches!( err, PlaybackError::UnknownSubtrack { .. } ) );
        assert_eq!( director.state(), DirectorState::Idle );
    }


    #[test]
    fn test_transition_gains_and_completion() {
        let mut director = director();
        director.play( "ambient" ).unwrap();
        director.play( "rain" ).unwrap();

        assert_eq!( director.state(), DirectorState::Transitioning );
        let ( out, inc ) = director.transition_gains().unwrap();
        assert_relative_eq!( out, 1.0 );
        assert_relative_eq!( inc, 0.0 );

        director.tick( Duration::from_secs( 1 ) );
        let ( out, inc ) = director.transition_gains().unwrap();
        assert!( out + inc <= 1.0 + 1e-6 );
        assert!( inc > 0.0 && out > 0.0 );

        let events = director.tick( Duration::from_secs( 1 ) );
        assert_eq!( events, vec![ DirectorEvent::TransitionComplete { playable: "rain".into() } ] );
        assert_eq!( director.state(), DirectorState::Playing );
        assert_eq!( director.now_playing(), Some( "rain" ) );
        assert!( director.outgoing().is_none() );
    }


    #[test]
    fn test_ambient_to_roleplay() {
        let mut director = director();
        director.play( "ambient" ).unwrap();
        director.tick( Duration::from_secs( 30 ) );
        director.switch_subtrack( "battle" ).unwrap();

        let ambient = director.playing().unwrap().as_composite().unwrap();
        assert_eq!( ambient.active_subtrack(), "battle" );
        for ( _, voice ) in ambient.voices() {
            assert_eq!( voice.position(), Duration::from_secs( 30 ) );
        }

        director.play( "roleplay" ).unwrap();
        assert_eq!( director.state(), DirectorState::Transitioning );
        assert_eq!( director.outgoing().unwrap().position(), Duration::from_secs( 30 ) );
        assert_eq!( director.current_track().unwrap(), "npc1" );
        assert_eq!( director.position(), Some( Duration::ZERO ) );

        director.tick( Duration::from_secs( 2 ) );
        assert_eq!( director.state(), DirectorState::Playing );
        assert_eq!( director.now_playing(), Some( "roleplay" ) );
        assert!( director.outgoing().is_none() );
    }


    #[test]
    fn test_new_play_replaces_incoming() {
        let mut director = director();
        director.play( "ambient" ).unwrap();
        director.play( "rain" ).unwrap();
        director.tick( Duration::from_secs( 1 ) );
        let ( out_before, _ ) = director.transition_gains().unwrap();

        director.play( "roleplay" ).unwrap();
        assert_eq!( director.state(), DirectorState::Transitioning );
        assert_eq!( director.outgoing().unwrap().name(), "ambient" );
        assert_eq!( director.now_playing(), Some( "roleplay" ) );

        let ( out, inc ) = director.transition_gains().unwrap();
        assert_relative_eq!( out, out_before );
        assert_relative_eq!( inc, 0.0 );
    }


    #[test]
    fn test_switch_subtrack_requires_composite() {
        let mut director = director();
        assert_eq!( director.switch_subtrack( "battle" ).unwrap_err(), PlaybackError::NotACompositeTrack );

        director.play( "roleplay" ).unwrap();
        assert_eq!( director.switch_subtrack( "battle" ).unwrap_err(), PlaybackError::NotACompositeTrack );

        director.play( "ambient" ).unwrap();
        assert_eq!( director.switch_subtrack( "battle" ).unwrap_err(), PlaybackError::NotACompositeTrack );

        director.tick( Duration::from_secs( 2 ) );
        director.switch_subtrack( "battle" ).unwrap();
        assert_eq!( director.current_track().unwrap(), "battle" );
        assert!( matches!(
            director.switch_subtrack( "dragon" ),
            Err( PlaybackError::UnknownSubtrack { .. } )
        ));
    }


    #[test]
    fn test_stop_from_any_state() {
        let mut director = director();
        director.stop();
        assert_eq!( director.state(), DirectorState::Idle );

        director.play( "ambient" ).unwrap();
        director.stop();
        assert_eq!( director.state(), DirectorState::Idle );

        director.play( "ambient" ).unwrap();
        director.play( "rain" ).unwrap();
        director.stop();
        assert_eq!( director.state(), DirectorState::Idle );
        assert_eq!( director.current_track().unwrap_err(), PlaybackError::NothingPlaying );
    }


    #[test]
    fn test_stop_with_fade() {
        let mut director = director();
        director.play( "rain" ).unwrap();
        director.stop_with_fade();
        assert_eq!( director.state(), DirectorState::Transitioning );
        assert_eq!( director.now_playing(), None );

        director.tick( Duration::from_millis( 500 ) );
        let ( out, inc ) = director.transition_gains().unwrap();
        assert!( out < 1.0 );
        assert_eq!( inc, 0.0 );

        let events = director.tick( Duration::from_millis( 500 ) );
        assert_eq!( events, vec![ DirectorEvent::Stopped { playable: "rain".into() } ] );
        assert_eq!( director.state(), DirectorState::Idle );
    }


    #[test]
    fn test_volume_bounds() {
        let mut director = director();
        assert_eq!( director.set_volume( 150 ).unwrap_err(), PlaybackError::OutOfRange( 150 ) );
        assert_eq!( director.set_volume( -1 ).unwrap_err(), PlaybackError::OutOfRange( -1 ) );
        assert_eq!( director.volume(), 100 );

        director.set_volume( 0 ).unwrap();
        director.set_volume( 0 ).unwrap();
        assert_eq!( director.volume(), 0 );
        director.set_volume( 100 ).unwrap();
        director.set_volume( 100 ).unwrap();
        assert_eq!( director.volume(), 100 );
    }


    #[test]
    fn test_volume_scales_output() {
        let mut catalog = Catalog::new( engine() );
        let tone = Arc::new( AudioBuffer::new( "tone", vec![ 0.8; 100 ], RATE, 1 ) );
        catalog.insert( "tone", PlayableDef::Track { buffer: tone } );
        let mut director = PlaybackDirector::new( Arc::new( catalog ) );
        director.play( "tone" ).unwrap();

        let mut out = [ 0.0_f32; 4 ];
        director.render( &mut out );
        assert_relative_eq!( out[ 0 ], 0.8 );

        director.set_volume( 50 ).unwrap();
        director.render( &mut out );
        assert_relative_eq!( out[ 0 ], 0.4 );
    }


    #[test]
    fn test_list() {
        let mut director = director();
        let listing = director.list();
        assert_eq!( listing.playables.len(), 3 );
        assert_eq!( listing.playables[ 0 ], ( "ambient".to_string(), PlayableKind::Composite ) );
        assert!( listing.subtracks.is_none() );

        director.play( "ambient" ).unwrap();
        let listing = director.list();
        assert_eq!( listing.subtracks, Some( vec![ "quiet".to_string(), "battle".to_string() ] ) );
        assert_eq!( listing.current.as_deref(), Some( "quiet" ) );
    }


    #[test]
    fn test_apply_requests() {
        let mut director = director();
        let reply = director.apply( Request::Play { name: "ambient".into(), track: Some( "battle".into() ) } ).unwrap();
        assert_eq!( reply, Reply::Done );

        match director.apply( Request::Status ).unwrap() {
            Reply::Status( status ) => {
                assert_eq!( status.state, DirectorState::Playing );
                assert_eq!( status.playable.as_deref(), Some( "ambient" ) );
                assert_eq!( status.track.as_deref(), Some( "battle" ) );
                assert_eq!( status.volume, 100 );
            }
            other => panic!( "unexpected reply {:?}", other ),
        }

        assert!( director.apply( Request::SetVolume { volume: 101 } ).is_err() );
        director.apply( Request::Stop ).unwrap();
        assert_eq!( director.state(), DirectorState::Idle );
    }


    #[test]
    fn test_track_list_advances_without_director() {
        let mut director = director();
        director.play( "roleplay" ).unwrap();
        let events = director.tick( Duration::from_secs( 61 ) );
        assert_eq!( events, vec![ DirectorEvent::EntryAdvanced {
            playable: "roleplay".into(),
            entry: "npc2".into(),
        }]);
        assert_eq!( director.current_track().unwrap(), "npc2" );
        assert_eq!( director.playing().unwrap().position(), Duration::ZERO );
    }


    #[test]
    fn test_all_voices_failed_goes_idle() {
        let mut catalog = Catalog::new( engine() );
        let empty = Arc::new( AudioBuffer::new( "empty", Vec::new(), RATE, 1 ) );
        catalog.insert( "broken", PlayableDef::Track { buffer: empty } );
        let mut director = PlaybackDirector::new( Arc::new( catalog ) );

        director.play( "broken" ).unwrap();
        let events = director.tick( Duration::from_millis( 10 ) );
        assert!( matches!( events[ 0 ], DirectorEvent::VoiceFault { .. } ) );
        assert_eq!( events[ 1 ], DirectorEvent::Stopped { playable: "broken".into() } );
        assert_eq!( director.state(), DirectorState::Idle );
    }


    #[test]
    fn test_failed_incoming_dropped_mid_transition() {
        let mut catalog = Catalog::new( engine() );
        let empty = Arc::new( AudioBuffer::new( "empty", Vec::new(), RATE, 1 ) );
        catalog.insert( "rain", PlayableDef::Track { buffer: buffer( "rain", 30 ) } );
        catalog.insert( "broken", PlayableDef::Composite {
            layers: vec![ ( "hollow".into(), empty ) ],
        });
        let mut director = PlaybackDirector::new( Arc::new( catalog ) );

        director.play( "rain" ).unwrap();
        director.play( "broken" ).unwrap();
        let events = director.tick( Duration::from_millis( 10 ) );
        assert!( matches!( events[ 0 ], DirectorEvent::VoiceFault { .. } ) );
        assert_eq!( events[ 1 ], DirectorEvent::Stopped { playable: "broken".into() } );

        assert_eq!( director.state(), DirectorState::Transitioning );
        assert_eq!( director.now_playing(), None );
        let status = director.status();
        assert_eq!( status.playable, None );
        assert!( director.list().subtracks.is_none() );
        assert_eq!( director.current_track().unwrap_err(), PlaybackError::NothingPlaying );

        let events = director.tick( Duration::from_millis( 1_990 ) );
        assert_eq!( events, vec![ DirectorEvent::Stopped { playable: "rain".into() } ] );
        assert_eq!( director.state(), DirectorState::Idle );
    }


    #[test]
    fn test_process_advances_by_block() {
        let mut director = director();
        director.play( "rain" ).unwrap();
        let mut block = [ 0.0_f32; 250 ];
        director.process( &mut block );
        director.process( &mut block );
        assert_eq!( director.playing().unwrap().position(), Duration::from_millis( 500 ) );
    }
}
