//! Ticker thread
//!
//! A dedicated thread owns the [`PlaybackDirector`]. Each pass it applies
//! queued control requests, mixes one block, advances the director by that
//! block and pushes it to the sink. Callers talk to it through a cloneable
//! [`DirectorHandle`] and get typed replies back.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::mpsc::{ self, Receiver, Sender, TryRecvError };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::director::{ DirectorEvent, Listing, PlaybackDirector, Reply, Request, Status };
use crate::error::PlaybackError;
use crate::output::Sink;


/// How long the ticker sleeps when the sink is full.
const IDLE_SLEEP: Duration = Duration::from_millis( 2 );


/// Errors from talking to the ticker.
#[derive( Debug, Error )]
pub enum TickerError {
    #[error( transparent )]
    Playback( #[from] PlaybackError ),

    #[error( "Failed to spawn ticker thread: {0}" )]
    Spawn( std::io::Error ),

    #[error( "Ticker is not running" )]
    Stopped,

    #[error( "Ticker thread panicked" )]
    Panicked,

    #[error( "Unexpected reply to {0}" )]
    UnexpectedReply( &'static str ),
}


struct Envelope {
    request: Request,
    reply: Sender<Result<Reply, PlaybackError>>,
}


/// Cloneable, thread-safe way to submit requests to the ticker.
#[derive( Clone )]
pub struct DirectorHandle {
    requests: Sender<Envelope>,
}


impl DirectorHandle {
    /// Submits a request and blocks until the ticker has applied it.
    pub fn submit( &self, request: Request ) -> Result<Reply, TickerError> {
        let ( reply, response ) = mpsc::channel();
        self.requests
            .send( Envelope { request, reply } )
            .map_err( |_| TickerError::Stopped )?;
        let result = response.recv().map_err( |_| TickerError::Stopped )?;
        Ok( result? )
    }


    pub fn play( &self, name: &str ) -> Result<(), TickerError> {
        self.play_from( name, None )
    }


    pub fn play_from( &self, name: &str, track: Option<&str> ) -> Result<(), TickerError> {
        self.submit( Request::Play {
            name: name.to_string(),
            track: track.map( String::from ),
        }).map( |_| () )
    }


    pub fn switch_subtrack( &self, name: &str ) -> Result<(), TickerError> {
        self.submit( Request::SwitchSubtrack { name: name.to_string() } ).map( |_| () )
    }


    pub fn stop( &self ) -> Result<(), TickerError> {
        self.submit( Request::Stop ).map( |_| () )
    }


    pub fn stop_with_fade( &self ) -> Result<(), TickerError> {
        self.submit( Request::FadeOut ).map( |_| () )
    }


    pub fn set_volume( &self, volume: i64 ) -> Result<(), TickerError> {
        self.submit( Request::SetVolume { volume } ).map( |_| () )
    }


    pub fn list( &self ) -> Result<Listing, TickerError> {
        match self.submit( Request::List )? {
            Reply::Listing( listing ) => Ok( listing ),
            _ => Err( TickerError::UnexpectedReply( "list" ) ),
        }
    }


    pub fn status( &self ) -> Result<Status, TickerError> {
        match self.submit( Request::Status )? {
            Reply::Status( status ) => Ok( status ),
            _ => Err( TickerError::UnexpectedReply( "status" ) ),
        }
    }
}


/// Owner of the ticker thread. Dropping it stops the thread.
pub struct Ticker {
    stop_flag: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<PlaybackDirector>>,
    handle: DirectorHandle,
}


impl Ticker {
    /// Moves the director onto a new ticker thread feeding `sink`.
    ///
    /// @returns The ticker and the receiving end of its event stream
    pub fn spawn(
        director: PlaybackDirector,
        sink: Arc<dyn Sink>,
    ) -> Result<( Self, Receiver<DirectorEvent> ), TickerError> {
        let ( requests, inbox ) = mpsc::channel();
        let ( events, event_stream ) = mpsc::channel();
        let stop_flag = Arc::new( AtomicBool::new( false ) );
        let stop_flag_clone = Arc::clone( &stop_flag );

        let thread = thread::Builder::new()
            .name( "bardcore-ticker".into() )
            .spawn( move || Self::tick_loop( director, sink, inbox, events, stop_flag_clone ) )
            .map_err( TickerError::Spawn )?;

        Ok((
            Self {
                stop_flag,
                thread: Some( thread ),
                handle: DirectorHandle { requests },
            },
            event_stream,
        ))
    }


    pub fn handle( &self ) -> DirectorHandle {
        self.handle.clone()
    }


    /// Stops the thread and hands the director back.
    pub fn shutdown( mut self ) -> Result<PlaybackDirector, TickerError> {
        self.stop_flag.store( true, Ordering::Relaxed );
        match self.thread.take() {
            Some( thread ) => thread.join().map_err( |_| TickerError::Panicked ),
            None => Err( TickerError::Stopped ),
        }
    }


    fn tick_loop(
        mut director: PlaybackDirector,
        sink: Arc<dyn Sink>,
        inbox: Receiver<Envelope>,
        events: Sender<DirectorEvent>,
        stop_flag: Arc<AtomicBool>,
    ) -> PlaybackDirector {
        let channels = director.engine().format().channels as usize;
        let frames = director.engine().tick_frames
            .min( sink.capacity() / channels )
            .max( 1 );
        let mut block = vec![ 0.0_f32; frames * channels ];
        let mut handles_open = true;

        tracing::debug!( "Ticker: {} frames per block", frames );

        while !stop_flag.load( Ordering::Relaxed ) {
            while handles_open {
                match inbox.try_recv() {
                    Ok( envelope ) => {
                        tracing::debug!( "Ticker: applying {:?}", envelope.request );
                        let result = director.apply( envelope.request );
                        if let Err( ref e ) = result {
                            tracing::warn!( "Request failed: {}", e );
                        }
                        // The caller may have given up waiting
                        let _ = envelope.reply.send( result );
                    }
                    Err( TryRecvError::Empty ) => break,
                    Err( TryRecvError::Disconnected ) => {
                        tracing::debug!( "Ticker: every handle dropped" );
                        handles_open = false;
                    }
                }
            }

            if sink.free() < block.len() {
                thread::sleep( IDLE_SLEEP );
                continue;
            }

            for event in director.process( &mut block ) {
                tracing::debug!( "Ticker: {:?}", event );
                let _ = events.send( event );
            }
            sink.push( &block );
        }

        tracing::debug!( "Ticker: exiting" );
        director
    }
}


impl Drop for Ticker {
    fn drop( &mut self ) {
        self.stop_flag.store( true, Ordering::Relaxed );
        if let Some( thread ) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
