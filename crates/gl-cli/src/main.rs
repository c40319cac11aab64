//! guidelink CLI
//!
//! - `profile`: edit the guider's profile file (no guider needed)
//! - `guider`: drive a running guider over its event server
//! - `equipment`: show configured devices and record choices in a profile
//! - `config`: inspect and create the guidelink configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gl_core::config::{self, Config};
use gl_core::ProfileStore;
use gl_session::{Axis, DecGuideMode, GuiderSession, SettleParams};
use guidelink::commands;

#[derive(Parser)]
#[command(name = "guidelink")]
#[command(author, version, about = "Control a PHD2 guider and edit its equipment profiles")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Edit the guider's profile file
    Profile {
        /// Profile file (overrides config)
        #[arg(long, global = true, env = "GUIDELINK_PROFILE_FILE")]
        profile_file: Option<PathBuf>,

        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Control a running guider
    Guider {
        /// Guider host (overrides config)
        #[arg(long, global = true)]
        host: Option<String>,

        /// Guider instance number (overrides config)
        #[arg(long, global = true)]
        instance: Option<u16>,

        #[command(subcommand)]
        action: GuiderAction,
    },

    /// Show configured cameras and mounts, or record choices in a profile
    Equipment {
        /// Profile file (overrides config)
        #[arg(long, global = true, env = "GUIDELINK_PROFILE_FILE")]
        profile_file: Option<PathBuf>,

        #[command(subcommand)]
        action: EquipmentAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List profiles in the profile file
    List,
    /// Print one setting
    Get { path: String },
    /// Set one setting
    Set {
        path: String,
        value: String,
        /// Scope field written with the setting
        #[arg(long, default_value_t = 1)]
        scope: i32,
    },
    /// Delete one setting
    Delete { path: String },
    /// Show settings whose path starts with a prefix
    Section { prefix: String },
    /// Show every setting of one profile
    Show { number: u32 },
    /// Create a profile
    Create {
        number: u32,
        /// Profile name
        #[arg(short, long)]
        name: Option<String>,
        /// JSON object of path to value to use instead of the defaults
        #[arg(short, long)]
        template: Option<PathBuf>,
    },
    /// Copy a profile to another number
    Duplicate {
        source: u32,
        destination: u32,
        /// Name for the copy
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Rename a profile
    Rename { number: u32, name: String },
    /// Remove a profile and all its settings
    Remove { number: u32 },
    /// Show the current profile, or select one
    Current { number: Option<u32> },
    /// Export all settings as typed JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct SettleArgs {
    /// Settle distance in pixels
    #[arg(long, default_value_t = 1.5)]
    pixels: f64,
    /// Seconds the star must stay within the distance
    #[arg(long, default_value_t = 10)]
    time: u32,
    /// Seconds before settling gives up
    #[arg(long, default_value_t = 60)]
    timeout: u32,
}

impl From<SettleArgs> for SettleParams {
    fn from(args: SettleArgs) -> Self {
        SettleParams {
            pixels: args.pixels,
            time: args.time,
            timeout: args.timeout,
        }
    }
}

#[derive(Subcommand)]
enum GuiderAction {
    /// Show guider state
    Status,
    /// Start guiding
    Guide {
        /// Force a new calibration
        #[arg(long)]
        recalibrate: bool,
        #[command(flatten)]
        settle: SettleArgs,
    },
    /// Dither the lock position
    Dither {
        /// Maximum shift in pixels
        amount: f64,
        /// Dither in right ascension only
        #[arg(long)]
        ra_only: bool,
        #[command(flatten)]
        settle: SettleArgs,
    },
    /// Pause guiding
    Pause,
    /// Resume guiding
    Unpause,
    /// Start looping exposures
    Loop,
    /// Stop looping and guiding
    Stop,
    /// Show pixel scale and focal length
    PixelScale,
    /// Show the exposure, or set it in milliseconds
    Exposure { milliseconds: Option<u32> },
    /// Guide algorithm parameters
    Param {
        #[command(subcommand)]
        action: ParamAction,
    },
    /// List the guider's profiles, or switch to one
    Profiles { id: Option<u32> },
    /// Set the declination guide mode (off, auto, north, south)
    DecMode { mode: DecGuideMode },
    /// Set the lock position
    Lock {
        x: f64,
        y: f64,
        /// Use the exact position instead of the nearest star
        #[arg(long)]
        exact: bool,
    },
}

#[derive(Subcommand)]
enum ParamAction {
    /// Read a parameter
    Get { axis: Axis, name: String },
    /// Write a parameter and verify it
    Set { axis: Axis, name: String, value: f64 },
    /// List parameter names for an axis
    List { axis: Axis },
}

#[derive(Subcommand)]
enum EquipmentAction {
    /// List cameras and mounts
    List,
    /// Record the selected camera and mount in a profile
    Apply {
        profile: u32,
        /// Camera to select by name
        #[arg(long)]
        camera: Option<String>,
        /// Mount to select by name
        #[arg(long)]
        mount: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get specific config value
    Get { key: String },
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Profile {
            profile_file,
            action,
        } => {
            let path = match profile_file {
                Some(path) => path,
                None => load_config(cli.config.as_ref())?.profile.path,
            };
            let store = ProfileStore::new(path);
            run_profile(&store, action)?;
        }

        Commands::Equipment {
            profile_file,
            action,
        } => {
            let config = load_config(cli.config.as_ref())?;
            match action {
                EquipmentAction::List => commands::equipment_list(&config.equipment)?,
                EquipmentAction::Apply {
                    profile,
                    camera,
                    mount,
                } => {
                    let store = ProfileStore::new(profile_file.unwrap_or(config.profile.path));
                    commands::equipment_apply(
                        &config.equipment,
                        &store,
                        profile,
                        camera.as_deref(),
                        mount.as_deref(),
                    )?;
                }
            }
        }

        Commands::Guider {
            host,
            instance,
            action,
        } => {
            let mut config = load_config(cli.config.as_ref())?.guider;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(instance) = instance {
                config.instance = instance;
            }

            let session = GuiderSession::new(config);
            let result = run_guider(&session, action).await;
            session.shutdown().await;
            result?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(cli.config.as_ref())?,
            ConfigAction::Get { key } => commands::config_get(cli.config.as_ref(), &key)?,
            ConfigAction::Init { force } => commands::config_init(cli.config.as_ref(), force)?,
            ConfigAction::Path => {
                let path = cli.config.unwrap_or_else(config::default_config_path);
                println!("{}", path.display());
            }
        },
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let path = path.cloned().unwrap_or_else(config::default_config_path);
    config::load_or_default(&path).with_context(|| format!("Failed to load config from {:?}", path))
}

fn run_profile(store: &ProfileStore, action: ProfileAction) -> Result<()> {
    tracing::debug!("Using profile file {:?}", store.path());

    match action {
        ProfileAction::List => commands::profile_list(store),
        ProfileAction::Get { path } => commands::profile_get(store, &path),
        ProfileAction::Set { path, value, scope } => {
            commands::profile_set(store, &path, &value, scope)
        }
        ProfileAction::Delete { path } => commands::profile_delete(store, &path),
        ProfileAction::Section { prefix } => commands::profile_section(store, &prefix),
        ProfileAction::Show { number } => commands::profile_show(store, number),
        ProfileAction::Create {
            number,
            name,
            template,
        } => commands::profile_create(store, number, name.as_deref(), template.as_deref()),
        ProfileAction::Duplicate {
            source,
            destination,
            name,
        } => commands::profile_duplicate(store, source, destination, name.as_deref()),
        ProfileAction::Rename { number, name } => commands::profile_rename(store, number, &name),
        ProfileAction::Remove { number } => commands::profile_remove(store, number),
        ProfileAction::Current { number } => commands::profile_current(store, number),
        ProfileAction::Export { output } => commands::profile_export(store, output.as_deref()),
    }
}

async fn run_guider(session: &GuiderSession, action: GuiderAction) -> Result<()> {
    match action {
        GuiderAction::Status => commands::guider_status(session).await,
        GuiderAction::Guide {
            recalibrate,
            settle,
        } => commands::guider_guide(session, settle.into(), recalibrate).await,
        GuiderAction::Dither {
            amount,
            ra_only,
            settle,
        } => commands::guider_dither(session, amount, ra_only, settle.into()).await,
        GuiderAction::Pause => commands::guider_pause(session, true).await,
        GuiderAction::Unpause => commands::guider_pause(session, false).await,
        GuiderAction::Loop => commands::guider_loop(session).await,
        GuiderAction::Stop => commands::guider_stop(session).await,
        GuiderAction::PixelScale => commands::guider_optics(session).await,
        GuiderAction::Exposure { milliseconds } => {
            commands::guider_exposure(session, milliseconds).await
        }
        GuiderAction::Param { action } => match action {
            ParamAction::Get { axis, name } => {
                commands::guider_param_get(session, axis, &name).await
            }
            ParamAction::Set { axis, name, value } => {
                commands::guider_param_set(session, axis, &name, value).await
            }
            ParamAction::List { axis } => commands::guider_param_list(session, axis).await,
        },
        GuiderAction::Profiles { id } => commands::guider_profiles(session, id).await,
        GuiderAction::DecMode { mode } => commands::guider_dec_mode(session, mode).await,
        GuiderAction::Lock { x, y, exact } => commands::guider_lock(session, x, y, exact).await,
    }
}
