//! Scriptbook — a registry of named automation scripts.
//!
//! Register script templates once, then run them by name with arguments,
//! from the command line or through the MCP server.

mod config;
mod executor;
mod import;
mod mcp;
mod registry;
mod tools;

use clap::{Parser, Subcommand};
use executor::{ExecutionResult, ScriptExecutor};
use registry::{ArgMap, ArgValue, JsonFileBackend, NewScript, RegistryStore, ScriptUpdate};
use serde_json::Value;
use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scriptbook")]
#[command(about = "Registry and runner for named automation scripts")]
#[command(version)]
struct Cli {
    /// Registry file (default: from scriptbook.toml, else ./scripts-registry.json)
    #[arg(short, long, global = true)]
    registry: Option<PathBuf>,

    /// Configuration file (default: search upward for scriptbook.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Execution timeout, e.g. "500ms", "30s", "2m"
    #[arg(short, long, global = true, value_parser = config::parse_timeout)]
    timeout: Option<Duration>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the registry as MCP tools over stdio
    Serve,

    /// List registered scripts
    List {
        /// Only scripts in this category
        #[arg(long)]
        category: Option<String>,

        /// Only scripts whose name or description contains this keyword
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show a script definition
    Info {
        /// Script name
        name: String,
    },

    /// Add scripts from JSON definition files, directories or glob patterns
    Add {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Update a script from a JSON file holding the fields to change
    Update {
        /// Script name
        name: String,

        /// JSON file with the fields to change
        file: PathBuf,
    },

    /// Remove a script
    Remove {
        /// Script name
        name: String,
    },

    /// Run a registered script
    Run {
        /// Script name
        name: String,

        /// Argument as key=value (repeatable); values parse as JSON scalars when possible
        #[arg(short, long = "arg", value_parser = parse_arg)]
        args: Vec<(String, ArgValue)>,
    },

    /// Run script text that is not in the registry
    Exec {
        /// Script text
        script: String,

        /// Argument as key=value (repeatable)
        #[arg(short, long = "arg", value_parser = parse_arg)]
        args: Vec<(String, ArgValue)>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(matches!(cli.command, Commands::Serve));

    let cwd = match std::env::current_dir() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: cannot read current directory: {e}");
            process::exit(1);
        }
    };

    let loaded = match config::resolve(cli.config.as_deref(), &cwd) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let registry_path = cli.registry.unwrap_or_else(|| loaded.registry_path());
    let executor = ScriptExecutor::new(
        loaded.config.executor.interpreter(),
        cli.timeout
            .unwrap_or_else(|| loaded.config.executor.timeout()),
    );

    let store = match RegistryStore::open(JsonFileBackend::new(&registry_path)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    match run(cli.command, store, executor).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// Logs go to stderr; stdout is reserved for command output and MCP traffic.
fn init_logging(serving: bool) {
    let default = if serving {
        "scriptbook=info"
    } else {
        "scriptbook=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Run one command. `Ok(false)` means a script ran and failed.
async fn run(
    command: Commands,
    mut store: RegistryStore<JsonFileBackend>,
    executor: ScriptExecutor,
) -> Result<bool, Box<dyn Error>> {
    match command {
        Commands::Serve => {
            mcp::serve(tools::Dispatcher::new(store, executor)).await?;
        }

        Commands::List { category, search } => {
            let scripts = store.list(category.as_deref(), search.as_deref());

            if scripts.is_empty() {
                println!("No scripts registered.");
            } else {
                for script in scripts {
                    println!(
                        "{} ({})",
                        script.name,
                        script.category.as_deref().unwrap_or("uncategorized")
                    );
                    println!("  {}", script.description);
                    println!("  usage: {}", script.usage);
                    println!("  args: {}", script.args.len());
                    println!();
                }
            }
        }

        Commands::Info { name } => {
            let script = store
                .get(&name)
                .ok_or_else(|| registry::RegistryError::NotFound(name.clone()))?;
            println!("{}", serde_json::to_string_pretty(script)?);
        }

        Commands::Add { paths } => {
            for path in import::collect_files(&paths)? {
                let request: NewScript = import::read_json(&path)?;
                let script = store.add(request)?;
                println!("Added '{}' from {}", script.name, path.display());
            }
        }

        Commands::Update { name, file } => {
            let update: ScriptUpdate = import::read_json(&file)?;
            let script = store.update(&name, update)?;
            println!("Updated '{}'", script.name);
        }

        Commands::Remove { name } => {
            store.remove(&name)?;
            println!("Removed '{name}'");
        }

        Commands::Run { name, args } => {
            let script = store
                .get(&name)
                .ok_or_else(|| registry::RegistryError::NotFound(name.clone()))?;
            let result = executor.run(script, args.into_iter().collect()).await?;
            return print_result(&result);
        }

        Commands::Exec { script, args } => {
            let args: ArgMap = args.into_iter().collect();
            let result = executor.execute(&script, &args).await;
            return print_result(&result);
        }
    }

    Ok(true)
}

fn print_result(result: &ExecutionResult) -> Result<bool, Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(result.success)
}

/// Parse `key=value`. JSON scalars (`42`, `true`, `"quoted"`, `null`) keep
/// their type; anything else is a plain string.
fn parse_arg(raw: &str) -> Result<(String, ArgValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Missing argument name in '{raw}'"));
    }

    let value = match serde_json::from_str::<Value>(value) {
        Ok(json) => ArgValue::from_json(key, &json).unwrap_or_else(|_| value.into()),
        Err(_) => value.into(),
    };
    Ok((key.to_string(), value))
}
