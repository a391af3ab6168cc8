//! Fileshare CLI - Manage users, shares and the share mirror
//!
//! Usage:
//!   fileshare repair                         Rebuild the share mirror
//!   fileshare users                          List users
//!   fileshare share <owner> <path>           Publish a share
//!   fileshare resolve <link>                 Look up an external link

use std::error::Error;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use fileshare_core::{GlobalConfig, ShareError, ShareItem, UserConfig};
use fileshare_daemon::{OsFs, ShareStore};

#[derive(Parser)]
#[command(name = "fileshare")]
#[command(about = "Multi-user file sharing: users, shares and the share mirror", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config files to try, in order (default: ./config.json, user config dir, /etc)
    #[arg(short, long, global = true, env = "FILESHARE_CONFIG", value_delimiter = ',')]
    config: Vec<PathBuf>,

    /// Use this storage root for this run only (config file keeps its own)
    #[arg(long, global = true)]
    files_path: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the share mirror from the declared shares
    Repair,

    /// List users
    Users {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Register a user
    AddUser {
        username: String,

        /// Grant admin rights
        #[arg(long)]
        admin: bool,

        /// Client IP that authenticates as this user (repeatable)
        #[arg(long = "ip")]
        ips: Vec<String>,
    },

    /// Remove a user and their shares
    DeleteUser { username: String },

    /// Publish (or update) a share
    Share {
        /// Owner of the shared folder
        owner: String,

        /// Folder path inside the owner's home
        path: String,

        /// Users allowed to see the share (comma separated)
        #[arg(long = "allow", value_delimiter = ',')]
        allow_users: Vec<String>,

        /// Share with every registered user
        #[arg(long)]
        local: bool,

        /// Enable the anonymous external link
        #[arg(long)]
        external: bool,
    },

    /// Withdraw a share
    Unshare { owner: String, path: String },

    /// Look up an external link (`/{user}/{name}_{hash}/...`) or bare hash
    Resolve { link: String },

    /// Print a sample config file
    SampleConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Commands::SampleConfig = cli.command {
        println!("{}", GlobalConfig::sample());
        return Ok(());
    }

    let candidates = if cli.config.is_empty() {
        GlobalConfig::default_paths()
    } else {
        cli.config.clone()
    };
    let (config, path) = GlobalConfig::load_first(&candidates)?;

    init_logging(&config.log, cli.verbose)?;
    info!("Loaded config from {:?}", path);
    if let Some(root) = &cli.files_path {
        info!("Using storage root {:?} for this run", root);
    }

    let store = ShareStore::open_at(config, Some(path), OsFs::new(), cli.files_path.clone());
    let result = run(&store, cli.command);

    if store.persist_failures() > 0 {
        return Err(format!("changes could not be written to {:?}", store.config_path()).into());
    }
    result
}

fn run(store: &ShareStore, command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Repair => {
            let report = store.repair();
            println!(
                "linked {}, revoked {}, drifted {}, failed {}, pruned {}",
                report.linked, report.revoked, report.drift, report.failed, report.pruned
            );
            if report.has_drift() {
                warn!("Some mirror entries could not be created; see log above");
            }
        }

        Commands::Users { json } => {
            let mut users = store.users();
            if json {
                for user in &mut users {
                    user.password.clear();
                }
                println!("{}", serde_json::to_string_pretty(&users)?);
            } else {
                for user in &users {
                    println!(
                        "{:<20} {:<6} shares={:<3} ips={}",
                        user.username,
                        if user.admin { "admin" } else { "" },
                        user.shares.len(),
                        user.ip_auth.join(",")
                    );
                }
            }
        }

        Commands::AddUser {
            username,
            admin,
            ips,
        } => {
            let mut user = UserConfig::new(username);
            user.admin = admin;
            user.ip_auth = ips;
            store.add_user(user)?;
        }

        Commands::DeleteUser { username } => {
            if !store.delete_user(&username) {
                return Err(ShareError::NotFound(format!("user {}", username)).into());
            }
        }

        Commands::Share {
            owner,
            path,
            allow_users,
            local,
            external,
        } => {
            let mut share = ShareItem::new(path);
            share.allow_users = allow_users;
            share.allow_local = local;
            share.allow_external = external;

            let share = match store.add_share(&owner, share.clone()) {
                Err(ShareError::AlreadyExists(_)) => store.update_share(&owner, share)?,
                other => other?,
            };

            let name = share.symlink_name()?;
            println!("{}", name);
            if share.allow_external {
                println!("{}", store.external_link(&owner, &share)?);
            }
        }

        Commands::Unshare { owner, path } => {
            if !store.delete_share(&owner, &path)? {
                return Err(ShareError::NotFound(format!("share '{}' of {}", path, owner)).into());
            }
        }

        Commands::Resolve { link } => {
            let (share, owner) = if link.contains('/') {
                store.resolve_external_url(&link)?
            } else {
                store.resolve_external(&link)?
            };
            println!("owner:    {}", owner.username);
            println!("path:     {}", share.path);
            println!("source:   {:?}", store.layout().share_source(&owner.username, &share));
            println!("external: {}", share.allow_external);
            if let Some(preview) = store.share_preview_path(&link) {
                println!("preview:  {:?}", preview);
            }
        }

        Commands::SampleConfig => println!("{}", GlobalConfig::sample()),
    }

    Ok(())
}

/// Route logs to the target named by the config `log` field
fn init_logging(target: &str, verbose: bool) -> Result<(), Box<dyn Error>> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(filter);

    match target {
        "stdout" => registry.with(fmt::layer().with_target(false)).init(),
        "stderr" => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
        "" => registry.with(fmt::layer().with_writer(std::io::sink)).init(),
        path => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .init()
        }
    }
    Ok(())
}
