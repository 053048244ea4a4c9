//! Tether CLI
//!
//! Command-line client for a Tether server. State (installation id,
//! session, user snapshot and pending changes) lives in a local store file
//! between invocations.
//!
//! # Commands
//!
//! - `installation` - Print the installation id
//! - `status` - Show the session and pending change count
//! - `guest`, `signup`, `login`, `convert` - Open or upgrade a session
//! - `get`, `set`, `unset` - Read and edit the current user
//! - `sync` - Send pending changes
//! - `logout`, `force-logout` - End the session
//! - `run` - Call a custom function
//! - `query` - Run a structural query (needs a master key)

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tether command-line client.
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server URL
    #[arg(global = true, short, long, env = "TETHER_SERVER")]
    server: Option<String>,

    /// Path to the local store file
    #[arg(global = true, long, default_value = "tether-store.json")]
    store: PathBuf,

    /// Allow a non-https server URL
    #[arg(global = true, long)]
    insecure: bool,

    /// Master key for privileged calls
    #[arg(global = true, long, env = "TETHER_MASTER_KEY", hide_env_values = true)]
    master_key: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the installation id
    Installation,

    /// Show the session and pending change count
    Status,

    /// Log in as a new guest user
    Guest,

    /// Create an account and log in
    Signup {
        /// Account email
        email: String,
        /// Account password
        password: String,
    },

    /// Log in to an existing account
    Login {
        /// Account email
        email: String,
        /// Account password
        password: String,
    },

    /// Attach credentials to the current guest user
    Convert {
        /// Account email
        email: String,
        /// Account password
        password: String,
    },

    /// Print one field, or the whole user
    Get {
        /// Field name
        field: Option<String>,
    },

    /// Assign a field locally. The value is parsed as JSON, or taken as text
    Set {
        /// Field name
        field: String,
        /// Value
        value: String,
    },

    /// Remove a field locally
    Unset {
        /// Field name
        field: String,
    },

    /// Send pending changes
    Sync,

    /// Sync, end the session on the server and log out
    Logout,

    /// Log out locally without contacting the server
    ForceLogout,

    /// Call a custom function
    Run {
        /// Function name (ASCII letters and digits)
        name: String,
        /// Parameters as a JSON object
        params: Option<String>,
    },

    /// Run a structural query
    Query {
        /// Collection name
        collection: String,

        /// Equality filter as FIELD=JSON, repeatable
        #[arg(long = "eq", value_name = "FIELD=JSON")]
        filters: Vec<String>,

        /// Sort by field, prefix with '-' for descending
        #[arg(long)]
        sort: Option<String>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<u64>,

        /// Results to skip
        #[arg(long)]
        skip: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let server = cli
        .server
        .ok_or("Server URL required (--server or TETHER_SERVER)")?;
    let options = commands::ConnectOptions {
        server,
        store: cli.store,
        insecure: cli.insecure,
        master_key: cli.master_key,
    };
    let mut client = commands::connect(&options).await?;

    match cli.command {
        Commands::Installation => commands::session::installation(&client)?,
        Commands::Status => commands::session::status(&mut client)?,
        Commands::Guest => commands::session::guest(&mut client).await?,
        Commands::Signup { email, password } => {
            commands::session::sign_up(&mut client, &email, &password).await?
        }
        Commands::Login { email, password } => {
            commands::session::log_in(&mut client, &email, &password).await?
        }
        Commands::Convert { email, password } => {
            commands::session::convert(&mut client, &email, &password).await?
        }
        Commands::Get { field } => commands::user::get(&mut client, field.as_deref())?,
        Commands::Set { field, value } => commands::user::set(&mut client, &field, &value).await?,
        Commands::Unset { field } => commands::user::unset(&mut client, &field).await?,
        Commands::Sync => commands::user::sync(&mut client).await?,
        Commands::Logout => commands::session::log_out(&mut client).await?,
        Commands::ForceLogout => commands::session::force_log_out(&mut client).await?,
        Commands::Run { name, params } => {
            commands::remote::run(&client, &name, params.as_deref()).await?
        }
        Commands::Query {
            collection,
            filters,
            sort,
            limit,
            skip,
        } => {
            let request = commands::remote::QueryArgs {
                collection,
                filters,
                sort,
                limit,
                skip,
            };
            commands::remote::query(&client, &request).await?
        }
    }

    Ok(())
}
