//! zh-deid command-line interface

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::collections::HashSet;
use std::io::Read;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;
use zh_deid_core::{
    AnonymizeRequest, Config, DeidService, DetectedEntity, EhrGenerator, LogRotation,
    LoggingConfig, ProfileStore, MEDICAL_RECORDS_PROFILE,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(long, global = true, default_value = "info", help = "Log level (error, warn, info, debug, trace)")]
    pub log_level: String,

    #[arg(long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replace detected entities with placeholder tokens
    Anonymize {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long, help = "Print the full response as JSON instead of the anonymized text")]
        json: bool,
    },
    /// Print the detected entities as JSON without rewriting the text
    Analyze {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Serve JSON-lines requests on stdin/stdout
    Serve,
    /// Manage anonymizer profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Generate synthetic patient records
    Generate {
        #[arg(short = 'n', long, default_value_t = 1, help = "Number of records")]
        count: usize,

        #[arg(long, help = "Seed for reproducible output")]
        seed: Option<u64>,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ProfileAction {
    /// Create the profile database and seed the medical records profile
    Init,
    /// Show one profile as JSON
    Show {
        #[arg(default_value = MEDICAL_RECORDS_PROFILE)]
        name: String,
    },
    /// List stored profiles
    List,
}

#[derive(ClapArgs, Debug, Default, PartialEq)]
pub struct InputArgs {
    #[arg(help = "Text to process; read from --file or stdin when omitted")]
    pub text: Option<String>,

    #[arg(long, conflicts_with = "text", help = "Read the text from a file")]
    pub file: Option<PathBuf>,

    #[arg(long, value_delimiter = ',', help = "Entity types to detect (comma-separated)")]
    pub entities: Vec<String>,

    #[arg(long, help = "Language code, defaults to the configured analyzer language")]
    pub language: Option<String>,
}

impl InputArgs {
    pub fn read_text(&self) -> Result<String> {
        if let Some(ref text) = self.text {
            return Ok(text.clone());
        }
        if let Some(ref path) = self.file {
            return Ok(std::fs::read_to_string(path)?);
        }

        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    }

    pub fn entity_filter(&self) -> Option<Vec<String>> {
        let entities: Vec<String> = self
            .entities
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        if entities.is_empty() {
            None
        } else {
            Some(entities)
        }
    }

    pub fn to_request(&self) -> Result<AnonymizeRequest> {
        Ok(AnonymizeRequest {
            text: self.read_text()?,
            entities: self.entity_filter(),
            language: self.language.clone(),
        })
    }
}

/// Load and validate the configuration. Runs before logging is set up, so
/// where the configuration came from is returned for logging afterwards.
fn load_config(args: &Args) -> Result<(Config, String)> {
    let (config, origin) = match args.config.as_ref() {
        Some(config_path) => (
            Config::from_file(config_path)?,
            format!("Loaded configuration from: {}", config_path.display()),
        ),
        None => match Config::get_default_config_path() {
            Ok(default_path) if default_path.exists() => (
                Config::from_file(&default_path)?,
                format!("Loaded configuration from default location: {}", default_path.display()),
            ),
            Ok(default_path) => {
                let mut config = Config::default();
                config.resolve_paths()?;
                config.to_file(&default_path)?;
                (config, format!("Created default configuration at: {}", default_path.display()))
            }
            Err(_) => {
                let mut config = Config::default();
                config.resolve_paths()?;
                (
                    config,
                    "Using default configuration (could not determine config directory)".to_string(),
                )
            }
        },
    };

    config.validate()?;
    Ok((config, origin))
}

fn rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

/// Non-blocking writer for the rolling log file, if one is configured.
/// Buffered lines are flushed when the guard is dropped.
fn open_log_file(config: &LoggingConfig) -> Result<Option<(NonBlocking, WorkerGuard)>> {
    let Some(ref directory) = config.directory else {
        return Ok(None);
    };

    std::fs::create_dir_all(directory)?;
    let appender = RollingFileAppender::new(rotation(config.rotation), directory, &config.file_name);
    Ok(Some(tracing_appender::non_blocking(appender)))
}

fn init_logging(log_level: tracing::Level, config: Option<&LoggingConfig>) -> Result<Option<WorkerGuard>> {
    let filter = LevelFilter::from_level(log_level);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let (file_layer, guard) = match config.map(open_log_file).transpose()?.flatten() {
        Some((writer, guard)) => {
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn open_profile_store(config: &Config) -> Result<ProfileStore> {
    let path = config
        .profile
        .database_path
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("No profile database configured"))?;
    info!("Using profile database: {}", path.display());
    ProfileStore::new(path)
}

fn run_profile(action: &ProfileAction, config: &Config) -> Result<()> {
    let mut store = open_profile_store(config)?;

    match action {
        ProfileAction::Init => {
            let id = store.seed_medical_records_profile()?;
            println!("Profile '{}' ready (id {})", MEDICAL_RECORDS_PROFILE, id);
        }
        ProfileAction::Show { name } => match store.get_profile(name)? {
            Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
            None => return Err(anyhow::anyhow!("Profile '{}' not found", name)),
        },
        ProfileAction::List => {
            for summary in store.list_profiles()? {
                println!(
                    "{}\t{}{}\t{} recognizers\t{}",
                    summary.id,
                    summary.name,
                    if summary.is_default { " (default)" } else { "" },
                    summary.recognizer_count,
                    summary.description.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse::<tracing::Level>()
        .unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', defaulting to 'info'", args.log_level);
            tracing::Level::INFO
        });

    if let Command::Generate { count, seed } = args.command {
        init_logging(log_level, None)?;
        let records: Vec<String> = EhrGenerator::new(seed)
            .generate_batch(count)
            .into_iter()
            .map(|record| record.text)
            .collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let (config, origin) = load_config(&args)?;
    let _log_guard = init_logging(log_level, Some(&config.logging))?;
    info!("{}", origin);
    if let Some(ref directory) = config.logging.directory {
        info!("Writing logs to: {}", directory.display());
    }
    info!("Configuration validated successfully");

    match args.command {
        Command::Anonymize { ref input, json } => {
            let service = DeidService::from_config(&config)?;
            let response = service.handle(&input.to_request()?)?;
            service.flush().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.anonymized_text);
            }
        }
        Command::Analyze { ref input } => {
            let service = DeidService::from_config(&config)?;
            let request = input.to_request()?;
            if request.text.trim().is_empty() {
                warn!("Input text is empty");
            }

            let filter: Option<HashSet<String>> =
                request.entities.map(|entities| entities.into_iter().collect());
            let language = request
                .language
                .as_deref()
                .unwrap_or(service.engine().language());

            let entities: Vec<DetectedEntity> = service
                .engine()
                .analyze(&request.text, language, filter.as_ref())
                .iter()
                .map(|d| DetectedEntity::from_detection(d, &request.text))
                .collect();
            println!("{}", serde_json::to_string_pretty(&entities)?);
        }
        Command::Serve => {
            info!("Starting zh-deid service");
            let service = DeidService::from_config(&config)?;
            service.run_stdio().await?;
        }
        Command::Profile { ref action } => run_profile(action, &config)?,
        Command::Generate { .. } => {}
    }

    Ok(())
}
