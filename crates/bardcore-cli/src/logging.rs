//! Logging setup
//!
//! Everything at DEBUG and above goes to the log file; the terminal only
//! shows warnings unless `--verbose` or `RUST_LOG` says otherwise.

use std::fs::{ self, OpenOptions };
use std::path::Path;
use std::sync::Mutex;

use anyhow::{ Context, Result };
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{ fmt, EnvFilter, Layer };


/// Installs the global subscriber with a file layer and a terminal layer.
///
/// @param logfile - Log file, appended to and created if missing
/// @param verbose - Show DEBUG in the terminal
pub fn init( logfile: &Path, verbose: bool ) -> Result<()> {
    if let Some( parent ) = logfile.parent().filter( |p| !p.as_os_str().is_empty() ) {
        fs::create_dir_all( parent )
            .with_context( || format!( "Failed to create log directory {}", parent.display() ) )?;
    }
    let file = OpenOptions::new()
        .create( true )
        .append( true )
        .open( logfile )
        .with_context( || format!( "Failed to open log file {}", logfile.display() ) )?;

    let terminal_filter = EnvFilter::try_from_default_env().unwrap_or_else( |_| {
        EnvFilter::new( if verbose { "debug" } else { "warn" } )
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer( Mutex::new( file ) )
                .with_ansi( false )
                .with_filter( LevelFilter::DEBUG ),
        )
        .with(
            fmt::layer()
                .with_writer( std::io::stderr )
                .without_time()
                .with_target( false )
                .with_filter( terminal_filter ),
        )
        .try_init()
        .context( "Failed to install logger" )?;

    Ok(())
}
