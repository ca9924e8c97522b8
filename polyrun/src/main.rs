mod commands;
mod formatting;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use polyrun_core::{Combine, ExecutionMode};
use tracing::level_filters::LevelFilter;
use tracing::Level;

use commands::{Context, RunOptions};

#[derive(Parser)]
#[command(name = "polyrun")]
#[command(about = "Run scripts across npm-style workspaces in dependency order")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Workspace filter: name glob, ./dir glob, #keyword, @public, @private,
    /// @published, @unpublished, @dependencies or @dependents
    #[arg(short = 'w', long = "workspace")]
    filters: Vec<String>,

    /// Select only workspaces matching every filter
    #[arg(long, action)]
    all_filters: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(short, long, action)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    List {
        #[arg(long, action)]
        json: bool,
    },
    Graph {
        #[arg(long, action, conflicts_with = "dot")]
        json: bool,
        #[arg(long, action)]
        dot: bool,
    },
    Why {
        workspace: String,
    },
    Validate {
        #[arg(long, action)]
        json: bool,
    },
    Run {
        script: String,
        #[command(flatten)]
        options: RunArgs,
    },
    Exec {
        #[command(flatten)]
        options: RunArgs,
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    Ranges {
        #[arg(long, action)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    #[arg(short = 'j', long)]
    jobs: Option<usize>,
    /// Skip workspaces not yet started once one fails
    #[arg(long, action)]
    bail: bool,
    /// Reject dependency cycles in sequential mode
    #[arg(long, action)]
    strict: bool,
}

impl From<RunArgs> for RunOptions {
    fn from(args: RunArgs) -> Self {
        Self {
            mode: args.mode.map(Into::into),
            jobs: args.jobs,
            bail: args.bail,
            strict: args.strict,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum ModeArg {
    Ordered,
    Independent,
    Sequential,
}

impl From<ModeArg> for ExecutionMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Ordered => ExecutionMode::Ordered,
            ModeArg::Independent => ExecutionMode::Independent,
            ModeArg::Sequential => ExecutionMode::Sequential,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context {
        root: cli.root,
        filters: cli.filters,
        combine: if cli.all_filters {
            Combine::All
        } else {
            Combine::Any
        },
        level: LevelFilter::from_level(log_level),
    };

    match cli.command {
        Commands::List { json } => commands::cmd_list(&ctx, json)?,
        Commands::Graph { json, dot } => commands::cmd_graph(&ctx, json, dot)?,
        Commands::Why { workspace } => commands::cmd_why(&ctx, workspace)?,
        Commands::Validate { json } => commands::cmd_validate(&ctx, json)?,
        Commands::Run { script, options } => commands::cmd_run(&ctx, script, options.into())?,
        Commands::Exec { options, command } => {
            commands::cmd_exec(&ctx, command, options.into())?
        }
        Commands::Ranges { json } => commands::cmd_ranges(&ctx, json)?,
    }

    Ok(())
}
