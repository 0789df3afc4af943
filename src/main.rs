use std::{error::Error, io, ops::ControlFlow, process, time::SystemTime};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio::io::{AsyncBufReadExt, BufReader};

use discspin::{
    config::Config,
    device,
    dispatcher::Action,
    model::{PlaybackView, Status},
    session::Session,
    signal,
    store::FileStore,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("discspin.toml"), env = "DISCSPIN_CONFIG")]
    config_file: String,

    /// Session file
    ///
    /// Holds the pending authorization and the access token between runs.
    /// It is written readable by the owner only; do not share it.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("session.toml"))]
    session_file: String,

    /// Spotify client id, used when there is no configuration file
    #[arg(long, env = "DISCSPIN_CLIENT_ID")]
    client_id: Option<String>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Subcommand)]
enum Command {
    /// Print the URL to connect discspin to Spotify
    Login,

    /// Complete connecting with the URL Spotify redirected to
    Callback {
        /// Redirect URL or its query string
        url: String,
    },

    /// Search albums
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// Control playback from standard input
    ///
    /// Commands: play, pause, next, prev, eject, insert <ALBUM ID>, quit
    Run {
        /// Album to insert on start
        #[arg(long, value_name = "ID")]
        album: Option<String>,

        /// Name of the Spotify Connect device to play on
        ///
        /// [default: the active device]
        #[arg(long, value_name = "NAME")]
        device: Option<String>,
    },

    /// Forget the access token
    Logout,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("discspin", level);
    }

    logger.init();
}

/// Loads the configuration file, or falls back to a client id given on the
/// command line.
fn load_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    match Config::from_file(&args.config_file) {
        Ok(config) => Ok(config),
        Err(e) => match args.client_id.as_deref() {
            Some(client_id) => {
                debug!("{}: {e}", args.config_file);
                Ok(Config::with_client_id(client_id)?)
            }
            None => {
                if e.downcast::<io::Error>()
                    .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
                {
                    info!(
                        "copy discspin.toml.example to {} and set your Spotify client id",
                        args.config_file
                    );
                }
                Err(e.into())
            }
        },
    }
}

fn format_position(view: &PlaybackView) -> String {
    let secs = view.position.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Renders the model the way a CD player's display would.
fn display(view: &PlaybackView) -> String {
    let Some(album) = view.album.as_ref() else {
        return String::from("NO DISC");
    };

    let status = match view.status() {
        Status::Empty | Status::Stopped => "STOP",
        Status::Playing => "PLAY",
        Status::Paused => "PAUSE",
    };
    let track = view
        .track()
        .map(|track| track.name.as_str())
        .unwrap_or_default();

    format!(
        "{status:<5} TRK {:02} {}  {track}  [{} - {}]",
        view.index + 1,
        format_position(view),
        album.name,
        album.artist,
    )
}

/// Handles one line of standard input.
async fn handle_line(session: &Session, line: &str) -> ControlFlow<()> {
    let line = line.trim();
    let (verb, argument) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(verb, argument)| (verb, argument.trim()));

    let result = match verb {
        "" => Ok(()),
        "quit" | "exit" => return ControlFlow::Break(()),
        "insert" if !argument.is_empty() => session.insert_album(argument).await.map(drop),
        verb => match verb.parse::<Action>() {
            Ok(action) => session.dispatch(action).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        error!("{verb}: {e}");
    }

    ControlFlow::Continue(())
}

async fn play(
    session: Session,
    album: Option<String>,
    device_name: Option<String>,
) -> Result<(), Box<dyn Error>> {
    if !session.has_credential() {
        return Err("not connected to Spotify; run `discspin login` first".into());
    }

    let mut signals = signal::Handler::new()?;

    // Without an in-process player, readiness comes from the device list.
    let remote = session.remote();
    let events = session.events();
    let interval = session.config().poll_interval;
    let device_name = device_name.or_else(|| session.config().device_name.clone());
    let discovery = tokio::spawn(async move {
        if let Err(e) = device::discover(remote.as_ref(), device_name.as_deref(), events, interval).await {
            warn!("device discovery stopped: {e}");
        }
    });

    if let Some(album) = album {
        session.insert_album(&album).await?;
    }

    let mut status = session.subscribe();
    let mut shown = display(&status.borrow_and_update());
    println!("{shown}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            // Prioritize shutdown signals.
            biased;

            signal = signals.recv() => {
                info!("received {signal}, shutting down gracefully");
                break;
            }

            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                // The busy flag toggles around every command; only print
                // what the display actually shows.
                let current = display(&status.borrow_and_update());
                if current != shown {
                    println!("{current}");
                    shown = current;
                }
            }

            line = lines.next_line() => match line? {
                Some(line) => {
                    if handle_line(&session, &line).await.is_break() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    discovery.abort();
    session.teardown();
    Ok(())
}

/// Main application entry.
///
/// # Errors
///
/// Returns an error when the configuration cannot be loaded or the command
/// fails.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;
    let store = FileStore::new(&args.session_file);
    let session = Session::new(config, store, None)?;

    match args.command {
        Command::Login => {
            let request = session.begin_authorization()?;
            println!("Open this URL in your browser to connect discspin to Spotify:\n");
            println!("{}\n", request.url);
            println!("Then run `discspin callback <URL>` with the URL you were redirected to.");
        }

        Command::Callback { url } => {
            let outcome = session.complete_authorization(&url).await?;
            let ttl = outcome
                .expires_at
                .duration_since(SystemTime::now())
                .unwrap_or_default();
            println!("Connected for {} minutes.", ttl.as_secs() / 60);
            debug!("callback handled; continue at {}", outcome.clean_url);
        }

        Command::Search { query } => {
            let albums = session.search_albums(&query.join(" ")).await?;
            if albums.is_empty() {
                println!("No albums found. Try another search.");
            }
            for album in albums {
                println!("{}  {} - {}", album.id, album.artist, album.name);
            }
        }

        Command::Run { album, device } => play(session, album, device).await?,

        Command::Logout => {
            session.sign_out()?;
            info!("disconnected from Spotify");
        }
    }

    Ok(())
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and runs the selected command.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
