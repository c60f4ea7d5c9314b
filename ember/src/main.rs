//! Ember interpreter CLI

use clap::{Parser, Subcommand};
use ember::config::{CONFIG_FILE, EngineConfig};
use ember::error::{ScriptError, report_error};
use ember::interp::{FileLoader, Interpreter, NativeCall, Param, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
const LOG_ENV: &str = "EMBER_LOG";

#[derive(Parser)]
#[command(name = "ember", version, about = "Ember - a small scripting language")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an Ember script
    Run {
        /// Script to run
        file: PathBuf,
        /// Configuration file (defaults to ember.toml next to the script)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Start the interactive shell
    Repl {
        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Tokenize and dump statements (debug)
    Tokens {
        /// Source file to tokenize
        file: PathBuf,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { file, config } => run_file(&file, config.as_deref()),
        Command::Repl { config } => run_repl(config.as_deref()),
        Command::Tokens { file } => tokenize_file(&file),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// `--config`, else `ember.toml` in `dir` if present, else defaults
fn load_config(explicit: Option<&Path>, dir: &Path) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    if let Some(path) = explicit {
        return Ok(EngineConfig::load(path)?);
    }
    let candidate = dir.join(CONFIG_FILE);
    if candidate.is_file() {
        tracing::debug!(path = %candidate.display(), "using config file");
        return Ok(EngineConfig::load(&candidate)?);
    }
    Ok(EngineConfig::default())
}

fn exit_native(call: &mut NativeCall<'_>) -> ember::Result<Value> {
    let code = call.arg(0).as_index()?;
    call.out.flush().ok();
    std::process::exit(i32::try_from(code).unwrap_or(1));
}

fn interpreter(config: EngineConfig, script_dir: Option<&Path>) -> Result<Interpreter, ScriptError> {
    let mut loader = FileLoader::from_config(&config);
    if let Some(dir) = script_dir {
        loader.prepend_path(dir);
    }
    let mut interp = Interpreter::with_loader(config, Box::new(loader));
    interp.register_native_with("exit", vec![Param::optional("code", Value::int(0))], exit_native)?;
    Ok(interp)
}

fn run_file(path: &Path, config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();
    let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let config = load_config(config, dir)?;
    let mut interp = interpreter(config, Some(dir))?;

    let result = interp
        .run_source(&filename, &source)
        .and_then(|_| interp.finish());
    if let Err(err) = result {
        std::io::stdout().flush().ok();
        report_error(&filename, &source, &err);
        std::process::exit(1);
    }
    Ok(())
}

fn run_repl(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config, Path::new("."))?;
    let interp = interpreter(config, None)?;
    let mut repl = ember::repl::Repl::with_interpreter(interp)?;
    repl.run()?;
    Ok(())
}

fn tokenize_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();

    let statements = ember::lexer::tokenize(&filename, &source)?;
    print!("{}", ember::lexer::dump_statements(&statements));
    Ok(())
}
