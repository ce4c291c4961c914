mod commands;

use clap::{CommandFactory, Parser};
use clap_complete::{Shell, generate};
use commands::pipeline::{BuildContext, Task};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sitekit")]
#[command(version, about = "Builds, serves and publishes a static site", long_about = None)]
struct Cli {
    /// Build configuration, relative to the project root
    #[arg(short, long, global = true, default_value = "config-dev.json")]
    config: PathBuf,

    /// Log debug output, including external tool output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser)]
enum Command {
    /// Process the site, serve it with live reload and rebuild on change
    Dev,

    /// Import content and render a development build once
    Process,

    /// Produce an optimized production build
    Build,

    /// Production build, then publish it to the configured git branch
    Deploy,

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let task = match cli.command.unwrap_or(Command::Dev) {
        Command::Dev => Task::Dev,
        Command::Process => Task::Process,
        Command::Build => Task::Build,
        Command::Deploy => Task::Deploy,
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "sitekit", &mut io::stdout());
            return Ok(());
        }
    };

    let root = std::env::current_dir()?;
    let ctx = BuildContext::load(root, cli.config)?;
    commands::pipeline::run(task, &ctx).await
}
