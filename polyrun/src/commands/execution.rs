//! Script and command execution across workspaces.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use indicatif::ProgressBar;
use owo_colors::OwoColorize;
use polyrun_core::{summarize, Orchestrator, Severity, TaskFailure, Workspace};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::formatting::{
    create_progress_bar, format_duration, print_key_value, print_section_header,
    print_separator_with_spacing, print_summary_box, print_warning, SectionStyle,
};

use super::{print_summary, runtime, Context, RunOptions};

/// What to start in each workspace.
enum Invocation {
    /// An npm script, skipped where the manifest does not define it.
    Script(String),
    /// An arbitrary program and its arguments.
    Command(Vec<String>),
}

impl Invocation {
    fn describe(&self) -> String {
        match self {
            Invocation::Script(script) => format!("script '{}'", script),
            Invocation::Command(argv) => format!("'{}'", argv.join(" ")),
        }
    }

    fn command_for(&self, workspace: &Workspace) -> Option<(String, Vec<String>)> {
        match self {
            Invocation::Script(script) => {
                let defined = workspace
                    .manifest
                    .get("scripts")
                    .and_then(|scripts| scripts.get(script))
                    .is_some();
                defined.then(|| ("npm".to_string(), vec!["run".to_string(), script.clone()]))
            }
            Invocation::Command(argv) => argv
                .split_first()
                .map(|(program, args)| (program.clone(), args.to_vec())),
        }
    }

    fn skip_reason(&self) -> String {
        match self {
            Invocation::Script(script) => format!("no '{}' script", script),
            Invocation::Command(_) => "empty command".to_string(),
        }
    }
}

/// Flags shared by every callback of a run.
struct RunState {
    interrupted: AtomicBool,
    halted: AtomicBool,
    bail: bool,
    progress: ProgressBar,
}

pub fn cmd_run(ctx: &Context, script: String, options: RunOptions) -> Result<()> {
    execute(ctx, Invocation::Script(script), options)
}

pub fn cmd_exec(ctx: &Context, command: Vec<String>, options: RunOptions) -> Result<()> {
    execute(ctx, Invocation::Command(command), options)
}

fn execute(ctx: &Context, invocation: Invocation, options: RunOptions) -> Result<()> {
    if options.jobs == Some(0) {
        anyhow::bail!("--jobs must be at least 1");
    }

    let start = Instant::now();
    let (config, graph) = ctx.load()?;
    let rt = runtime()?;
    let selection = rt.block_on(ctx.select(&graph, &config))?;

    let mode = options.mode.unwrap_or(config.run.mode);
    let orchestrator = Orchestrator::new(mode)
        .with_concurrency(config.concurrency(options.jobs))
        .with_strict(options.strict || config.run.strict);

    print_section_header(
        &format!("Running {}", invocation.describe()),
        SectionStyle::Primary,
    );
    print_key_value("Mode", mode.as_str());
    print_key_value("Concurrency", &orchestrator.concurrency().to_string());
    print_key_value("Workspaces", &selection.len().to_string());
    println!();

    let state = Arc::new(RunState {
        interrupted: AtomicBool::new(false),
        halted: AtomicBool::new(false),
        bail: options.bail,
        progress: create_progress_bar(selection.len() as u64),
    });

    {
        let state = Arc::clone(&state);
        ctrlc::set_handler(move || {
            state.interrupted.store(true, Ordering::SeqCst);
        })
        .map_err(|e| anyhow::anyhow!("Failed to set signal handler: {}", e))?;
    }

    let invocation = Arc::new(invocation);
    let work = {
        let state = Arc::clone(&state);
        move |workspace: Arc<Workspace>| {
            let state = Arc::clone(&state);
            let invocation = Arc::clone(&invocation);
            async move {
                let result = run_workspace(&workspace, &invocation, &state).await;
                if result.is_err() && state.bail {
                    state.halted.store(true, Ordering::SeqCst);
                }
                state.progress.inc(1);
                result
            }
        }
    };

    let outcomes = rt.block_on(orchestrator.run(&graph, &selection, work))?;
    state.progress.finish_and_clear();

    // A panicking callback never got to record its own outcome.
    for outcome in &outcomes {
        if let Err(TaskFailure::Panicked(message)) = &outcome.result {
            outcome
                .workspace
                .status()
                .set(Severity::Failure, Some(&format!("panicked: {}", message)));
        }
    }

    let summary = summarize(
        outcomes
            .iter()
            .map(|o| (o.workspace.name.as_str(), o.workspace.status())),
    );

    print_separator_with_spacing();
    print_summary(&summary, ctx.level);
    println!();

    let duration = format_duration(start.elapsed().as_secs_f64());
    print_summary_box(
        "Summary",
        &[
            ("Duration", &duration),
            ("Succeeded", &summary.count(Severity::Success).to_string()),
            ("Failed", &summary.count(Severity::Failure).to_string()),
            ("Skipped", &summary.count(Severity::Skipped).to_string()),
        ],
    );
    println!();

    if state.interrupted.load(Ordering::SeqCst) {
        print_warning("Interrupted");
        std::process::exit(130);
    }
    if summary.is_failure() {
        std::process::exit(summary.exit_code());
    }

    Ok(())
}

async fn run_workspace(
    workspace: &Workspace,
    invocation: &Invocation,
    state: &RunState,
) -> Result<()> {
    let status = workspace.status();

    if state.interrupted.load(Ordering::SeqCst) {
        status.set(Severity::Skipped, Some("interrupted"));
        return Ok(());
    }
    if state.halted.load(Ordering::SeqCst) {
        status.set(Severity::Skipped, Some("skipped after an earlier failure"));
        return Ok(());
    }
    let Some((program, args)) = invocation.command_for(workspace) else {
        status.set(Severity::Skipped, Some(&invocation.skip_reason()));
        return Ok(());
    };

    status.set(Severity::Pending, Some("running"));
    state.progress.set_message(workspace.name.clone());
    debug!(workspace = %workspace.name, program = %program, "Spawning");
    let started = Instant::now();

    let mut child = Command::new(&program)
        .args(&args)
        .current_dir(&workspace.directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            let message = format!("failed to start {}: {}", program, e);
            status.set(Severity::Failure, Some(&message));
            anyhow::anyhow!("{}: {}", workspace.name, message)
        })?;

    let prefix = format!("[{}]", workspace.name);
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (exit, _, _) = tokio::join!(
        child.wait(),
        forward(stdout, &prefix, &state.progress, false),
        forward(stderr, &prefix, &state.progress, true),
    );
    let exit = exit.map_err(|e| {
        status.set(Severity::Failure, Some(&e.to_string()));
        anyhow::anyhow!("{}: failed to wait for {}: {}", workspace.name, program, e)
    })?;

    if exit.success() {
        let elapsed = format_duration(started.elapsed().as_secs_f64());
        status.set(Severity::Success, Some(&elapsed));
        return Ok(());
    }

    let detail = match exit.code() {
        Some(code) => format!("exited with code {}", code),
        None => "terminated by a signal".to_string(),
    };
    status.set(Severity::Failure, Some(&detail));
    anyhow::bail!("{}: {}", workspace.name, detail)
}

/// Prints each line of a child's output under the workspace prefix.
async fn forward<R>(reader: Option<R>, prefix: &str, progress: &ProgressBar, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    // Invalid UTF-8 must not stop the drain, or the child dies on SIGPIPE.
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Stopped forwarding output for {}: {}", prefix, e);
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        progress.suspend(|| {
            if is_stderr {
                eprintln!("  {} {}", prefix.bright_black().bold(), line.bright_red());
            } else {
                println!("  {} {}", prefix.bright_black().bold(), line);
            }
        });
    }
}
