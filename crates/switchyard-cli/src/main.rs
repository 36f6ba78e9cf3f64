use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "Switchyard — Blue-Green deployment orchestration",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, global = true, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Output format for command results.
#[derive(Clone, Copy, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview the traffic switch phases a config would run
    Plan {
        /// Path to switchyard.toml
        #[arg(short, long, default_value = "switchyard.toml")]
        config: String,
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
    /// Classify an error message against the error taxonomy
    Classify {
        /// Error text as reported by the release tool or cluster
        message: String,
        /// Operation that failed (install, upgrade, rollback, ...)
        #[arg(short, long, default_value = "upgrade")]
        operation: String,
        /// Optional switchyard.toml with extra [[error_patterns]]
        #[arg(short, long)]
        config: Option<String>,
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
    /// Classify an error message and list recovery actions, best first
    Suggest {
        message: String,
        #[arg(short, long, default_value = "upgrade")]
        operation: String,
        /// Optional switchyard.toml with [[error_patterns]] and [[recovery]]
        #[arg(short, long)]
        config: Option<String>,
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
    /// Validate or scaffold switchyard.toml
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Parse and validate a config file
    Check {
        #[arg(short, long, default_value = "switchyard.toml")]
        config: String,
    },
    /// Write a scaffold switchyard.toml
    Init {
        /// Project name
        #[arg(short, long)]
        name: String,
        /// Directory to write into
        #[arg(short, long, default_value = ".")]
        path: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("switchyard=info".parse()?);
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    match cli.command {
        Commands::Plan { config, format } => commands::plan::plan(&config, format),
        Commands::Classify {
            message,
            operation,
            config,
            format,
        } => commands::classify::classify(&message, &operation, config.as_deref(), format),
        Commands::Suggest {
            message,
            operation,
            config,
            format,
        } => commands::classify::suggest(&message, &operation, config.as_deref(), format),
        Commands::Config { action } => match action {
            ConfigAction::Check { config } => commands::config::check(&config),
            ConfigAction::Init { name, path, force } => {
                commands::config::init(&name, &path, force)
            }
        },
    }
}
