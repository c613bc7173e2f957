//! Command-line argument parsing for Bardcore.

use std::path::PathBuf;

use clap::Parser;


/// Bardcore - background music for tabletop sessions.
#[derive( Parser, Debug )]
#[command( name = "bardcore" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Catalog file describing the sounds and playables.
    /// Defaults to bardcore/config.yaml in the user config directory.
    pub config: Option<PathBuf>,

    /// Show debug logging in the terminal as well as the log file.
    #[arg( short, long )]
    pub verbose: bool,
}


impl Args {
    /// Config path given on the command line, or the per-user default.
    pub fn config_path( &self ) -> Option<PathBuf> {
        self.config.clone().or_else( || {
            dirs::config_dir().map( |dir| dir.join( "bardcore" ).join( "config.yaml" ) )
        })
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_explicit_config() {
        let args = Args::parse_from( [ "bardcore", "session.yaml", "--verbose" ] );
        assert_eq!( args.config_path(), Some( PathBuf::from( "session.yaml" ) ) );
        assert!( args.verbose );
    }


    #[test]
    fn test_default_config_location() {
        let args = Args::parse_from( [ "bardcore" ] );
        if let Some( path ) = args.config_path() {
            assert!( path.ends_with( "bardcore/config.yaml" ) );
        }
    }
}
