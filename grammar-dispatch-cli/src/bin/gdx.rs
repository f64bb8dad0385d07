use clap::{Parser, Subcommand};
use grammar_dispatch::{
    Error, TokenizationEngine, builtin,
    config::{EngineConfig, LanguageConfig, LoaderSource},
};
use grammar_dispatch_cli::output::{OutputFormat, render};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, default_value = "gdx.json", global = true)]
    config: PathBuf,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Tokenize a source file
    Tokenize(TokenizeArgs),

    /// List built-in grammars and configured loaders
    Languages,

    /// Check whether a grammar can be resolved for a language
    Check {
        /// Language id
        language: String,
    },
}

#[derive(Parser)]
struct TokenizeArgs {
    /// Source file, `-` for stdin
    file: PathBuf,

    /// Language id
    #[arg(short, long)]
    language: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

fn load_config(path: &Path) -> Result<EngineConfig, Error> {
    if path.exists() {
        let config = EngineConfig::from_file(path)?;
        info!("Config loaded from {}.", path.display());
        Ok(config)
    } else {
        // Default config: built-in grammars only
        Ok(EngineConfig {
            languages: vec![LanguageConfig {
                name: builtin::matcher(),
                source: LoaderSource::Builtin,
            }],
            ..Default::default()
        })
    }
}

fn read_source(file: &Path) -> Result<String, Error> {
    if file == Path::new("-") {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .map_err(|e| Error::internal(format!("Failed to read stdin: {}", e)))?;
        Ok(source)
    } else {
        std::fs::read_to_string(file)
            .map_err(|e| Error::internal(format!("Failed to read source file: {}", e)))
    }
}

async fn tokenize(args: &TokenizeArgs, engine: &TokenizationEngine) -> Result<(), Error> {
    let source = read_source(&args.file)?;
    debug!("Tokenizing {:?} as {}", args.file, args.language);

    let tokens = engine.tokenize(&source, &args.language).await?;
    let output = render(&tokens, args.format)
        .map_err(|e| Error::internal(format!("JSON serialization error: {}", e)))?;

    println!("{}", output.trim_end_matches('\n'));
    Ok(())
}

fn list_languages(engine: &TokenizationEngine) {
    println!("Built-in grammars:");
    for language in builtin::languages() {
        println!("  {}", language);
    }

    println!("Loaders (first match wins):");
    if engine.loaders().is_empty() {
        println!("  (none)");
    }
    for entry in engine.loaders() {
        println!("  {}\t{}", entry.matcher(), entry.loader().name());
    }
}

async fn check(language: &str, engine: &TokenizationEngine) -> Result<(), Error> {
    match engine.resolve_grammar(language).await? {
        Some(grammar) => {
            println!(
                "{}: available ({} rules: {})",
                language,
                grammar.rules().len(),
                grammar.rule_names().join(", ")
            );
            Ok(())
        }
        None => {
            eprintln!("{}: no grammar available", language);
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> Result<(), Error> {
    let config = load_config(&cli.config)?;
    debug!("config: {:?}", config);

    let engine = TokenizationEngine::from_config(&config)?;

    match &cli.command {
        Commands::Tokenize(args) => tokenize(args, &engine).await,
        Commands::Languages => {
            list_languages(&engine);
            Ok(())
        }
        Commands::Check { language } => check(language, &engine).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
