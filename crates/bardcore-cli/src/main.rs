//! Bardcore CLI - background music console

mod cli;
mod console;
mod logging;

use std::path::Path;
use std::sync::Arc;

use anyhow::{ Context, Result };
use clap::Parser;

use bardcore_core::{ AudioOutput, Catalog, CatalogFile, ClockSink, PlaybackDirector, Sink, Ticker };

use cli::Args;


fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config_path()
        .context( "No config file given and no user config directory found" )?;
    let file = CatalogFile::read( &config_path )?;
    let base_dir = config_path.parent().unwrap_or( Path::new( "." ) ).to_path_buf();

    logging::init( &file.logfile_path( &base_dir ), args.verbose )?;
    tracing::info!( "Starting bardcore with {}", config_path.display() );

    let ( catalog, report ) = Catalog::load( file, &base_dir )?;
    for ( name, reason ) in &report.failures {
        println!( "Could not load '{}': {}", name, reason );
    }
    if catalog.is_empty() {
        tracing::warn!( "Nothing to play in {}", config_path.display() );
    }

    let format = catalog.engine().format();
    let director = PlaybackDirector::new( Arc::new( catalog ) );

    // The stream stops when `_output` is dropped, so it lives until exit
    let ( _output, sink ): ( Option<AudioOutput>, Arc<dyn Sink> ) = match AudioOutput::new( format ) {
        Ok(( output, buffer )) => {
            output.play()?;
            ( Some( output ), buffer )
        }
        Err( e ) => {
            tracing::warn!( "No audio output ({}); running silently", e );
            ( None, Arc::new( ClockSink::new( format ) ) )
        }
    };

    let ( ticker, events ) = Ticker::spawn( director, sink )?;
    let result = console::run( &ticker.handle(), &events );

    ticker.shutdown()?;
    tracing::info!( "Exiting" );
    result
}
