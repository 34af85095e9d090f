// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use transflow::app_config::{Config, LogLevel, TranslationProvider};
use transflow::app_controller::Controller;
use transflow::errors::AppError;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    OpenAI,
    Anthropic,
    LMStudio,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch a web page as Markdown with a frontmatter header
    Download {
        /// Page to fetch
        url: String,

        /// Output file or directory (default: named after the URL)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Translate a Markdown file, keeping its structure intact
    Translate {
        /// Markdown file to translate
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (default: <input>.<lang>.md)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target language code (e.g., 'zh', 'fr', 'pt-BR')
        #[arg(long)]
        lang: Option<String>,

        /// Translation provider to use
        #[arg(short, long, value_enum)]
        provider: Option<CliTranslationProvider>,

        /// Model name to use for translation
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Package a Markdown file and its remote images into a folder
    Bundle {
        /// Markdown file to bundle
        #[arg(short, long)]
        input: PathBuf,

        /// Output root directory
        #[arg(short, long)]
        output: PathBuf,

        /// Folder naming pattern, e.g. "{year}/{date}-{slug}"
        #[arg(long)]
        folder: Option<String>,

        /// Language of the document, recorded in meta.yaml
        #[arg(long)]
        lang: Option<String>,
    },

    /// Download, translate and bundle in one go
    Run {
        /// Page to process
        url: String,

        /// Output root directory
        #[arg(short, long)]
        output: PathBuf,

        /// Target language code
        #[arg(long)]
        lang: Option<String>,
    },

    /// Show or validate the configuration
    Config {
        /// Print the effective configuration with API keys masked
        #[arg(long, conflicts_with = "validate")]
        show: bool,

        /// Check the configuration and report missing credentials
        #[arg(long)]
        validate: bool,

        /// With --validate, also send a test request to the language model
        #[arg(long, requires = "validate")]
        test_connection: bool,
    },

    /// Generate shell completions for transflow
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// TransFlow - structure-preserving Markdown translation
#[derive(Parser, Debug)]
#[command(name = "transflow")]
#[command(version)]
#[command(about = "Download, translate and bundle Markdown articles")]
#[command(long_about = "TransFlow fetches web pages as Markdown, translates the prose while leaving code, \
links and layout untouched, and bundles the result with its images into a self-contained folder.

EXAMPLES:
    transflow download https://example.com/post -o raw.md
    transflow translate -i raw.md -o trans.md --lang zh
    transflow bundle -i trans.md -o ./output --folder \"{year}/{date}-{slug}\"
    transflow run https://example.com/post -o ./output --lang ja
    transflow config --validate
    transflow completions bash > transflow.bash

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file doesn't exist,
    a default one is created. TRANSFLOW_* environment variables override it,
    e.g. TRANSFLOW_OPENAI_API_KEY, TRANSFLOW_FIRECRAWL_API_KEY.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "conf.json")]
    config: PathBuf,

    /// Set logging level
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Shortcut for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,
}

// @struct: Timestamped, level-coloured stderr logger
struct CliLogger {
    level: LevelFilter,
}

impl CliLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CliLogger { level: LevelFilter::Trace }))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CliLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S%.3f");
            let _ = writeln!(
                std::io::stderr(),
                "{}{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = CliLogger::init(LevelFilter::Info) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let cli = CommandLineOptions::parse();
    let cli_level: Option<LogLevel> = if cli.verbose {
        Some(LogLevel::Debug)
    } else {
        cli.log_level.clone().map(Into::into)
    };
    if let Some(level) = cli_level {
        log::set_max_level(level.to_level_filter());
    }

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "transflow", &mut std::io::stdout());
        return ExitCode::SUCCESS;
    }

    let mut config = match Config::load_or_create(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(2);
        }
    };
    if let Err(e) = config.apply_env_overrides(|name| std::env::var(name).ok()) {
        error!("{}", e);
        return ExitCode::from(2);
    }
    if cli_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }

    match run_command(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run_command(command: Commands, mut config: Config) -> Result<(), AppError> {
    if let Commands::Config {
        show,
        validate,
        test_connection,
    } = command
    {
        return config_command(config, show || !validate, validate, test_connection).await;
    }

    if let Commands::Translate { provider, model, .. } = &command {
        if let Some(provider) = provider {
            config.translation.provider = provider.clone().into();
        }
        if let Some(model) = model {
            config.translation.set_model(model.clone());
        }
    }

    config.validate()?;
    let controller = Controller::with_config(config);
    install_interrupt_handler(&controller);

    match command {
        Commands::Download { url, output } => {
            let path = controller.download(&url, output).await?;
            info!("Success: {}", path.display());
        }
        Commands::Translate { input, output, lang, .. } => {
            let path = controller.translate_file(&input, output, lang.as_deref()).await?;
            info!("Success: {}", path.display());
        }
        Commands::Bundle {
            input,
            output,
            folder,
            lang,
        } => {
            let (path, manifest) = controller
                .bundle_file(&input, &output, folder.as_deref(), lang.as_deref())
                .await?;
            info!("Success: {} ({}/{} assets)", path.display(), manifest.fetched_count, manifest.asset_count);
        }
        Commands::Run { url, output, lang } => {
            let (path, manifest) = controller.run(&url, &output, lang.as_deref()).await?;
            info!("Success: {} ({}/{} assets)", path.display(), manifest.fetched_count, manifest.asset_count);
        }
        Commands::Config { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}

async fn config_command(config: Config, show: bool, validate: bool, test_connection: bool) -> Result<(), AppError> {
    if show {
        println!("{}", config.to_masked_json()?);
    }

    if validate {
        config.validate()?;
        let missing = config.missing_credentials();
        for problem in &missing {
            warn!("{}", problem);
        }

        if test_connection {
            Controller::with_config(config.clone()).test_connection().await?;
            info!("Connection to {} succeeded", config.translation.provider.display_name());
        }

        if let Some(first) = missing.into_iter().next() {
            return Err(AppError::Config(first));
        }
        info!("Configuration is valid");
    }

    Ok(())
}

// @installs: Ctrl-C listener raising the controller's cancel flag
fn install_interrupt_handler(controller: &Controller) {
    let cancel = controller.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            cancel.cancel();
        }
    });
}
