mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracer_common::types::OutputMode;

#[derive(Parser)]
#[command(name = "tracer-cli")]
#[command(about = "Tracer CLI - Manage language profiles and inspect generated tasks", long_about = None)]
struct Cli {
    /// Path to languages.json
    #[arg(long, global = true, default_value = "config/languages.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured languages
    List,

    /// Add a language profile
    AddLang {
        /// Language identifier as sent by clients (e.g., c, c++, rust)
        #[arg(short, long)]
        name: String,

        /// Sandbox image
        #[arg(short, long)]
        image: String,

        /// Source filename inside the sandbox (e.g., usercode.rs)
        #[arg(short, long)]
        filename: String,

        /// Compiler executable; omit for interpreted languages
        #[arg(short, long)]
        compiler: Option<String>,

        /// Formatter command, %SOURCE% and %BINARY% are substituted
        #[arg(long, num_args = 1.., required = true)]
        formatter: Vec<String>,

        /// Build directory
        #[arg(long, default_value = "/tmp/user_code")]
        build_dir: String,

        /// Memory limit in MB
        #[arg(short, long, default_value = "1000")]
        memory: u32,

        /// CPU limit (cores)
        #[arg(long, default_value = "1.0")]
        cpu: f32,

        /// Sandbox timeout in milliseconds
        #[arg(short, long, default_value = "20000")]
        timeout_ms: u64,
    },

    /// Remove a language profile
    RemoveLang {
        /// Language name
        #[arg(short, long)]
        name: String,

        /// Skip confirmation
        #[arg(short, long, default_value = "false")]
        yes: bool,
    },

    /// Print the task that would be submitted for a source file
    Render {
        /// Language name
        #[arg(short, long)]
        language: String,

        /// Source file
        #[arg(short, long)]
        file: PathBuf,

        /// formatted or trace
        #[arg(short, long, default_value = "formatted")]
        mode: OutputMode,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            commands::list_languages(&cli.config)?;
        }
        Commands::AddLang {
            name,
            image,
            filename,
            compiler,
            formatter,
            build_dir,
            memory,
            cpu,
            timeout_ms,
        } => {
            let profile = commands::new_profile(commands::NewLanguage {
                name,
                image,
                filename,
                compiler,
                formatter,
                build_dir,
                memory_limit_mb: memory,
                cpu_limit: cpu,
                timeout_ms,
            });
            commands::add_language(&cli.config, profile)?;
        }
        Commands::RemoveLang { name, yes } => {
            commands::remove_language(&cli.config, &name, yes)?;
        }
        Commands::Render { language, file, mode } => {
            commands::render_task(&cli.config, &language, &file, mode)?;
        }
    }

    Ok(())
}
