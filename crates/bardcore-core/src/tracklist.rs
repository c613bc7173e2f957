//! Track lists
//!
//! A track list plays one entry at a time and moves on by itself when an
//! entry finishes. Only the playing entry holds a live voice.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{ Rng, SeedableRng };

use crate::buffer::{ frames_for, AudioBuffer };
use crate::error::PlaybackError;
use crate::voice::{ Voice, VoiceError, VoiceStatus };


/// How a track list picks its next entry.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum TraversalPolicy {
    /// In declaration order, wrapping back to the first entry.
    #[default]
    Sequential,
    /// Uniformly among the other entries, never repeating immediately.
    Shuffle,
}


/// What happened to a track list during one tick.
#[derive( Debug, Default )]
pub struct ListTick {
    /// Entry that started because the previous one finished or failed.
    pub advanced_to: Option<String>,
    /// Entry whose voice failed, with the reason.
    pub fault: Option<( String, VoiceError )>,
}


/// Ordered playlist of single-voice entries.
#[derive( Debug )]
pub struct TrackList {
    name: String,
    entries: Vec<( String, Arc<AudioBuffer> )>,
    policy: TraversalPolicy,
    current: usize,
    voice: Option<Voice>,
    rng: StdRng,
}


impl TrackList {
    /// Creates a stopped track list.
    pub fn new(
        name: impl Into<String>,
        entries: Vec<( String, Arc<AudioBuffer> )>,
        policy: TraversalPolicy,
    ) -> Result<Self, PlaybackError> {
        let name = name.into();
        if entries.is_empty() {
            return Err( PlaybackError::Empty( name ) );
        }

        Ok( Self {
            name,
            entries,
            policy,
            current: 0,
            voice: None,
            rng: StdRng::from_os_rng(),
        })
    }


    /// Replaces the random source with a seeded one.
    pub fn with_seed( mut self, seed: u64 ) -> Self {
        self.rng = StdRng::seed_from_u64( seed );
        self
    }


    pub fn name( &self ) -> &str {
        &self.name
    }


    pub fn policy( &self ) -> TraversalPolicy {
        self.policy
    }


    /// Starts playing `entry`, or the policy's first pick when None.
    pub fn start( &mut self, entry: Option<&str> ) -> Result<(), PlaybackError> {
        let index = match entry {
            Some( name ) => self.index_of( name )?,
            None => match self.policy {
                TraversalPolicy::Sequential => 0,
                TraversalPolicy::Shuffle => self.rng.random_range( 0..self.entries.len() ),
            },
        };
        self.play_index( index );
        Ok(())
    }


    pub fn stop( &mut self ) {
        if let Some( mut voice ) = self.voice.take() {
            voice.stop();
        }
    }


    /// Moves to the next entry and starts it from the beginning.
    ///
    /// @returns The name of the entry now playing
    pub fn advance( &mut self ) -> &str {
        let len = self.entries.len();
        let next = match self.policy {
            TraversalPolicy::Sequential => ( self.current + 1 ) % len,
            TraversalPolicy::Shuffle if len > 1 => {
                let pick = self.rng.random_range( 0..len - 1 );
                if pick >= self.current { pick + 1 } else { pick }
            }
            TraversalPolicy::Shuffle => 0,
        };
        self.play_index( next );
        self.current_entry()
    }


    /// Entry names in declaration order.
    pub fn list_entries( &self ) -> Vec<&str> {
        self.entries.iter().map( |( name, _ )| name.as_str() ).collect()
    }


    pub fn current_index( &self ) -> usize {
        self.current
    }


    pub fn current_entry( &self ) -> &str {
        &self.entries[ self.current ].0
    }


    /// Voice of the playing entry, if any.
    pub fn voice( &self ) -> Option<&Voice> {
        self.voice.as_ref()
    }


    pub fn position( &self ) -> Duration {
        self.voice.as_ref().map( |v| v.position() ).unwrap_or( Duration::ZERO )
    }


    pub fn len( &self ) -> usize {
        self.entries.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.entries.is_empty()
    }


    pub fn tick( &mut self, dt: Duration ) -> ListTick {
        let frames = self.voice.as_ref()
            .map( |v| frames_for( dt, v.buffer().sample_rate() ) )
            .unwrap_or( 0 );
        self.tick_frames( frames, dt )
    }


    /// Advances the playing entry. When it finishes (or fails) the list
    /// moves on by itself; the overshoot past the end is not carried over.
    pub(crate) fn tick_frames( &mut self, frames: u64, dt: Duration ) -> ListTick {
        let mut outcome = ListTick::default();
        let Some( voice ) = self.voice.as_mut() else {
            return outcome;
        };

        match voice.tick_frames( frames, dt ) {
            Ok( VoiceStatus::Ended ) => {
                tracing::debug!( "'{}' finished '{}'", self.name, self.current_entry() );
                outcome.advanced_to = Some( self.advance().to_string() );
            }
            Ok( _ ) => {}
            Err( e ) => {
                let entry = self.current_entry().to_string();
                tracing::error!( "'{}' skipped '{}': {}", self.name, entry, e );
                outcome.fault = Some(( entry, e ));
                outcome.advanced_to = Some( self.advance().to_string() );
            }
        }

        if let Some( ref entry ) = outcome.advanced_to {
            tracing::info!( "'{}' now playing '{}'", self.name, entry );
        }
        outcome
    }


    pub fn render( &self, out: &mut [f32], channels: usize, scale: f32 ) {
        if let Some( ref voice ) = self.voice {
            voice.render( out, channels, scale );
        }
    }


    fn play_index( &mut self, index: usize ) {
        self.stop();
        self.current = index;
        let mut voice = Voice::new( Arc::clone( &self.entries[ index ].1 ), false );
        voice.start( Duration::ZERO );
        self.voice = Some( voice );
    }


    fn index_of( &self, entry: &str ) -> Result<usize, PlaybackError> {
        self.entries.iter()
            .position( |( name, _ )| name == entry )
            .ok_or_else( || PlaybackError::UnknownSubtrack {
                playable: self.name.clone(),
                subtrack: entry.to_string(),
            })
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn entry( name: &str, secs: u64 ) -> ( String, Arc<AudioBuffer> ) {
        let buffer = AudioBuffer::silence( name, Duration::from_secs( secs ), 1_000, 1 );
        ( name.to_string(), Arc::new( buffer ) )
    }


    fn roleplay( policy: TraversalPolicy ) -> TrackList {
        TrackList::new(
            "roleplay",
            vec![ entry( "npc1", 10 ), entry( "npc2", 20 ), entry( "npc3", 5 ) ],
            policy,
        ).unwrap().with_seed( 7 )
    }


    #[test]
    fn test_empty_rejected() {
        let result = TrackList::new( "none", Vec::new(), TraversalPolicy::Sequential );
        assert!( matches!( result, Err( PlaybackError::Empty( _ ) ) ) );
    }


    #[test]
    fn test_sequential_wraps() {
        let mut list = roleplay( TraversalPolicy::Sequential );
        list.start( None ).unwrap();
        assert_eq!( list.current_entry(), "npc1" );
        assert_eq!( list.advance(), "npc2" );
        assert_eq!( list.advance(), "npc3" );
        assert_eq!( list.advance(), "npc1" );
    }


    #[test]
    fn test_advance_restarts_at_zero() {
        let mut list = roleplay( TraversalPolicy::Sequential );
        list.start( None ).unwrap();
        list.tick( Duration::from_secs( 4 ) );
        assert_eq!( list.position(), Duration::from_secs( 4 ) );

        list.advance();
        assert_eq!( list.current_entry(), "npc2" );
        assert_eq!( list.position(), Duration::ZERO );
    }


    #[test]
    fn test_end_of_entry_advances() {
        let mut list = roleplay( TraversalPolicy::Sequential );
        list.start( None ).unwrap();

        let outcome = list.tick( Duration::from_secs( 9 ) );
        assert!( outcome.advanced_to.is_none() );

        let outcome = list.tick( Duration::from_secs( 3 ) );
        assert_eq!( outcome.advanced_to.as_deref(), Some( "npc2" ) );
        assert_eq!( list.current_entry(), "npc2" );
        assert_eq!( list.position(), Duration::ZERO );
        assert!( list.voice().unwrap().is_playing() );
    }


    #[test]
    fn test_start_named_entry() {
        let mut list = roleplay( TraversalPolicy::Sequential );
        list.start( Some( "npc3" ) ).unwrap();
        assert_eq!( list.current_index(), 2 );
        assert_eq!( list.advance(), "npc1" );
    }


    #[test]
    fn test_start_unknown_entry() {
        let mut list = roleplay( TraversalPolicy::Sequential );
        let err = list.start( Some( "bard" ) ).unwrap_err();
        assert!( matches!( err, PlaybackError::UnknownSubtrack { .. } ) );
        assert!( list.voice().is_none() );
    }


    #[test]
    fn test_shuffle_never_repeats() {
        let mut list = roleplay( TraversalPolicy::Shuffle );
        list.start( None ).unwrap();
        let mut previous = list.current_index();
        for _ in 0..200 {
            list.advance();
            assert_ne!( list.current_index(), previous );
            assert!( list.current_index() < list.len() );
            previous = list.current_index();
        }
    }


    #[test]
    fn test_shuffle_single_entry() {
        let mut list = TrackList::new( "solo", vec![ entry( "only", 1 ) ], TraversalPolicy::Shuffle ).unwrap();
        list.start( None ).unwrap();
        assert_eq!( list.advance(), "only" );
    }


    #[test]
    fn test_faulty_entry_skipped() {
        let broken = ( "broken".to_string(), Arc::new( AudioBuffer::new( "broken", Vec::new(), 1_000, 1 ) ) );
        let mut list = TrackList::new(
            "mixed",
            vec![ broken, entry( "fine", 3 ) ],
            TraversalPolicy::Sequential,
        ).unwrap();
        list.start( None ).unwrap();

        let outcome = list.tick( Duration::from_millis( 10 ) );
        assert_eq!( outcome.fault.map( |( name, _ )| name ).as_deref(), Some( "broken" ) );
        assert_eq!( list.current_entry(), "fine" );
    }


    #[test]
    fn test_list_entries_in_order() {
        let list = roleplay( TraversalPolicy::Shuffle );
        assert_eq!( list.list_entries(), vec![ "npc1", "npc2", "npc3" ] );
    }
}
