use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;
mod config;
mod output;
mod storage;

use output::Output;

#[derive(Parser)]
#[command(name = "rbctl")]
#[command(version)]
#[command(about = "Operator CLI for relaybridge")]
#[command(long_about = "Inspect and edit a relaybridge data directory: bridging flags, the local/remote event map, and scripted replays of echo and ordering reports.")]
struct Cli {
    /// Output in JSON format (for scripts)
    #[arg(short, long, global = true)]
    json: bool,

    /// Data directory (default: platform data dir/relaybridge)
    #[arg(long, global = true, env = "RBCTL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or initialize the configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Edit which guilds and channels are bridged
    #[command(subcommand)]
    Bridge(BridgeCommands),

    /// Look up the remote ids of a local event, or the other way round
    Lookup {
        /// Identity store scope (the bridged account)
        scope: String,
        /// Local event id
        #[arg(long, conflicts_with = "remote", required_unless_present = "remote")]
        local: Option<String>,
        /// Remote message id
        #[arg(long)]
        remote: Option<String>,
    },

    /// Replay a scripted trace against a simulated network
    Replay {
        /// Path to the trace JSON file
        trace: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write the default configuration to the data directory
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum BridgeCommands {
    /// Bridge (or stop bridging) every channel of a guild
    Guild {
        account: String,
        guild_id: String,
        #[arg(long)]
        remove: bool,
    },

    /// Bridge (or stop bridging) a single channel
    Channel {
        account: String,
        channel_id: String,
        #[arg(long)]
        remove: bool,
    },

    /// Bridge every guild channel the account can see
    All { account: String, state: Toggle },

    /// List the bridging flags of an account
    List { account: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let output = Output::new(cli.json);

    let result = run(cli, &output).await;

    if let Err(e) = result {
        output.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: &Output) -> anyhow::Result<()> {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?
            .join("relaybridge"),
    };
    std::fs::create_dir_all(&data_dir)?;

    let config = config::Config::load(&data_dir)?;
    init_tracing(&config.log_filter);

    match cli.command {
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => commands::config::show(&config, output),
            ConfigCommands::Init { force } => commands::config::init(&data_dir, force, output),
        },
        Commands::Bridge(cmd) => {
            let storage = storage::Storage::open(&data_dir)?;
            match cmd {
                BridgeCommands::Guild {
                    account,
                    guild_id,
                    remove,
                } => commands::bridge::guild(&account, &guild_id, !remove, &storage, output),
                BridgeCommands::Channel {
                    account,
                    channel_id,
                    remove,
                } => commands::bridge::channel(&account, &channel_id, !remove, &storage, output),
                BridgeCommands::All { account, state } => commands::bridge::all(
                    &account,
                    matches!(state, Toggle::On),
                    &storage,
                    output,
                ),
                BridgeCommands::List { account } => {
                    commands::bridge::list(&account, &storage, output)
                }
            }
        }
        Commands::Lookup {
            scope,
            local,
            remote,
        } => {
            let storage = storage::Storage::open(&data_dir)?;
            commands::lookup::run(&scope, local.as_deref(), remote.as_deref(), &storage, output)
                .await
        }
        Commands::Replay { trace } => commands::replay::run(&trace, &config, output).await,
    }
}

fn init_tracing(default_filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    // Logs go to stderr so JSON output on stdout stays machine-readable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
