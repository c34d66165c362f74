//! semtree CLI: build and query the context tree of a markup file.
//!
//! Usage:
//!   semtree tree <file> [--config path]
//!   semtree query <file> --target <json> [--all] [--config path]
//!   semtree types <file> [--config path]

use clap::{Parser, Subcommand};
use semtree::config::default_config_path;
use semtree::tree::context_type_tree;
use semtree::{Engine, EngineConfig, Target};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "semtree",
    version,
    about = "Live semantic context tree engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Engine configuration file (.yaml, .yml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the full context tree as JSON
    Tree {
        /// Markup file to parse
        file: PathBuf,
    },
    /// Print the contexts matching a target
    Query {
        /// Markup file to parse
        file: PathBuf,
        /// Target as inline JSON, or a path to a JSON file
        #[arg(long)]
        target: String,
        /// Print every match instead of the first
        #[arg(long)]
        all: bool,
    },
    /// Print the tree of distinct context types
    Types {
        /// Markup file to parse
        file: PathBuf,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig, String> {
    let path = match path {
        Some(path) => path,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => path,
            None => return Ok(EngineConfig::default()),
        },
    };
    EngineConfig::from_file(&path).map_err(|e| format!("Failed to load config: {}", e))
}

fn open_engine(file: &Path, config: &EngineConfig) -> Result<Engine, String> {
    let markup = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    let mut engine = Engine::from_markup(&markup, config).map_err(|e| e.to_string())?;
    for failed in engine.failed_adapters() {
        eprintln!("Warning: parser '{}' disabled: {}", failed.namespace, failed.reason);
    }
    engine.start().map_err(|e| e.to_string())?;
    Ok(engine)
}

fn parse_target(source: &str) -> Result<Target, String> {
    let text = if source.trim_start().starts_with('{') {
        source.to_string()
    } else {
        std::fs::read_to_string(source).map_err(|e| format!("Failed to read target {}: {}", source, e))?
    };
    Target::from_json(&text).map_err(|e| format!("Invalid target: {}", e))
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_tree(engine: &Engine) -> i32 {
    print_json(&engine.get_context_tree())
}

fn cmd_query(engine: &Engine, target: &str, all: bool) -> i32 {
    let target = match parse_target(target) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if all {
        return print_json(&engine.query_all(&target));
    }
    match engine.query(&target) {
        Some(context) => print_json(&context),
        None => {
            eprintln!("No matching context.");
            1
        }
    }
}

fn cmd_types(engine: &Engine) -> i32 {
    let tree = engine.get_context_tree();
    print_json(&context_type_tree(&tree.children))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match load_config(cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let file = match &cli.command {
        Commands::Tree { file } | Commands::Query { file, .. } | Commands::Types { file } => file,
    };
    let engine = match open_engine(file, &config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match &cli.command {
        Commands::Tree { .. } => cmd_tree(&engine),
        Commands::Query { target, all, .. } => cmd_query(&engine, target, *all),
        Commands::Types { .. } => cmd_types(&engine),
    };
    std::process::exit(code);
}
