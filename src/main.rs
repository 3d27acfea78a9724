use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally::cli::commands;

#[derive(Parser)]
#[command(name = "tally")]
#[command(
    version,
    about = "Record income and expenses by chatting with an extraction agent"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Tally in the current directory
    Init {
        #[arg(long, short, help = "Re-run initialization on an existing project")]
        force: bool,
    },

    /// Chat with the agent until you quit
    Chat {
        #[arg(long, short, env = "TALLY_USER", help = "User id (default from config)")]
        user: Option<String>,
    },

    /// Send one message to the active conversation
    Say {
        #[arg(help = "Message text")]
        message: String,
        #[arg(long, short, env = "TALLY_USER", help = "User id (default from config)")]
        user: Option<String>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Record a confirmed draft in the ledger
    Finalize {
        #[arg(help = "Draft id")]
        draft_id: String,
        #[arg(long, short, env = "TALLY_USER", help = "User id (default from config)")]
        user: Option<String>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Manage cash pools
    Pool {
        #[command(subcommand)]
        action: PoolAction,
    },

    /// Manage categories
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },

    /// Show the active conversation and recent transactions
    Status {
        #[arg(long, short, env = "TALLY_USER", help = "User id (default from config)")]
        user: Option<String>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PoolAction {
    /// Add a cash pool
    Add {
        #[arg(help = "Pool name, e.g. \"Main Wallet\"")]
        name: String,
        #[arg(long, short, default_value = "USD", help = "Currency code")]
        currency: String,
        #[arg(long, short, default_value_t = 0.0, help = "Opening balance")]
        balance: f64,
        #[arg(long, short, env = "TALLY_USER")]
        user: Option<String>,
    },
    /// List cash pools
    List {
        #[arg(long, short, env = "TALLY_USER")]
        user: Option<String>,
        #[arg(short = 'f', long, default_value = "text")]
        format: String,
    },
    /// Make a pool available to the agent again
    Activate {
        id: String,
        #[arg(long, short, env = "TALLY_USER")]
        user: Option<String>,
    },
    /// Hide a pool from the agent
    Deactivate {
        id: String,
        #[arg(long, short, env = "TALLY_USER")]
        user: Option<String>,
    },
}

#[derive(Subcommand)]
enum CategoryAction {
    /// Add a category
    Add {
        #[arg(help = "Category key, e.g. groceries")]
        key: String,
        #[arg(long = "type", short = 't', help = "income or expense")]
        category_type: String,
        #[arg(long, short)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long, short, env = "TALLY_USER")]
        user: Option<String>,
    },
    /// List categories
    List {
        #[arg(long, short, env = "TALLY_USER")]
        user: Option<String>,
        #[arg(short = 'f', long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mTally encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let rt = Runtime::new()?;

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::Chat { user } => {
            rt.block_on(commands::chat::run(user))?;
        }
        Commands::Say {
            message,
            user,
            format,
        } => {
            rt.block_on(commands::say::run(&message, user, &format))?;
        }
        Commands::Finalize {
            draft_id,
            user,
            format,
        } => {
            rt.block_on(commands::finalize::run(&draft_id, user, &format))?;
        }
        Commands::Pool { action } => match action {
            PoolAction::Add {
                name,
                currency,
                balance,
                user,
            } => {
                commands::pool::add(&name, &currency, balance, user)?;
            }
            PoolAction::List { user, format } => {
                rt.block_on(commands::pool::list(user, &format))?;
            }
            PoolAction::Activate { id, user } => {
                commands::pool::set_active(&id, true, user)?;
            }
            PoolAction::Deactivate { id, user } => {
                commands::pool::set_active(&id, false, user)?;
            }
        },
        Commands::Category { action } => match action {
            CategoryAction::Add {
                key,
                category_type,
                icon,
                color,
                user,
            } => {
                commands::category::add(&key, &category_type, icon, color, user)?;
            }
            CategoryAction::List { user, format } => {
                rt.block_on(commands::category::list(user, &format))?;
            }
        },
        Commands::Status { user, format } => {
            rt.block_on(commands::status::run(user, &format))?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                commands::config::show(&format)?;
            }
            ConfigAction::Path => {
                commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                if global {
                    commands::config::init_global(force)?;
                } else {
                    commands::config::init_project()?;
                }
            }
        },
    }

    Ok(())
}
