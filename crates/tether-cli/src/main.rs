use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tether_core::app::{Callback, CommandContext, ContextBuilder, Settings};
use tether_core::domain::{ErrorKind, JsonParameterSet, PendingResult, TetherError};
use tether_core::impls::{LoopbackNative, Reply};
use tether_core::structural_result;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Issue commands through the correlation layer against the loopback native library.", long_about = None)]
struct Cli {
    /// JSON settings file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of commands to issue concurrently.
    #[arg(long, default_value_t = 100)]
    operations: u32,

    /// Make every Kth command fail at the immediate status check (0 = never).
    #[arg(long, value_name = "K", default_value_t = 0)]
    reject_every: u32,

    /// Make every Kth accepted command fail in its callback (0 = never).
    #[arg(long, value_name = "K", default_value_t = 0)]
    fail_every: u32,
}

structural_result! {
    struct RunSummary {
        operations: u32,
        succeeded: u32,
        rejected: u32,
        failed: u32,
        mismatched: u32,
        unexpected: u32,
        outstanding: usize,
    }
}

impl RunSummary {
    fn is_clean(&self) -> bool {
        self.mismatched == 0 && self.unexpected == 0 && self.outstanding == 0
    }
}

enum Observed {
    Succeeded,
    Rejected,
    Failed,
    Mismatched,
    Unexpected(TetherError),
}

fn every(k: u32, i: u32) -> bool {
    k != 0 && i % k == 0
}

/// Issue command `i`; the scripted outcome depends on the CLI flags.
fn issue_one(
    ctx: &CommandContext,
    native: &LoopbackNative,
    cli: &Cli,
    i: u32,
) -> (String, PendingResult<String>) {
    let request = JsonParameterSet::new()
        .with("source_id", format!("cmd_{i}"))
        .with("sequence", i)
        .with("retry", false)
        .with("note", (i % 2 == 0).then_some("even"))
        .to_json();

    let result = if every(cli.reject_every, i) {
        ctx.issue("echo", |h, cb: Callback<String>| {
            native.submit(h, cb, Reply::Reject(ErrorKind::NotReady.code()))
        })
    } else if every(cli.fail_every, i) {
        ctx.issue("echo", |h, cb| {
            native.submit(
                h,
                cb,
                Reply::Complete {
                    status: ErrorKind::PostMessageFailure.code(),
                    payload: String::new(),
                },
            )
        })
    } else {
        ctx.issue("echo", |h, cb| native.echo(h, cb, &request))
    };
    (request, result)
}

async fn run(cli: Cli, settings: Settings) -> Result<RunSummary> {
    let ctx = ContextBuilder::new()
        .settings(settings.clone())
        .build()
        .context("build command context")?;
    let native = Arc::new(LoopbackNative::from_settings(&settings).context("start loopback native")?);
    let cli = Arc::new(cli);

    tracing::info!(
        session = %ctx.session_id(),
        name = ctx.session_name(),
        operations = cli.operations,
        "issuing commands"
    );

    let mut tasks = Vec::with_capacity(cli.operations as usize);
    for i in 1..=cli.operations {
        let ctx = ctx.clone();
        let native = Arc::clone(&native);
        let cli = Arc::clone(&cli);
        tasks.push(tokio::spawn(async move {
            let (request, result) = issue_one(&ctx, &native, &cli, i);
            match result.await {
                Ok(payload) if payload == request => Observed::Succeeded,
                Ok(_) => Observed::Mismatched,
                Err(TetherError::NativeCall { .. }) => Observed::Rejected,
                Err(TetherError::AsyncOperation { .. }) => Observed::Failed,
                Err(other) => Observed::Unexpected(other),
            }
        }));
    }

    let mut summary = RunSummary {
        operations: cli.operations,
        succeeded: 0,
        rejected: 0,
        failed: 0,
        mismatched: 0,
        unexpected: 0,
        outstanding: 0,
    };
    for task in tasks {
        match task.await.context("command task panicked")? {
            Observed::Succeeded => summary.succeeded += 1,
            Observed::Rejected => summary.rejected += 1,
            Observed::Failed => summary.failed += 1,
            Observed::Mismatched => summary.mismatched += 1,
            Observed::Unexpected(err) => {
                tracing::error!(error = %err, "unexpected command error");
                summary.unexpected += 1;
            }
        }
    }

    let outstanding = ctx.outstanding();
    for entry in &outstanding {
        println!("outstanding: {entry}");
    }
    summary.outstanding = outstanding.len();
    Ok(summary)
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    match path {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("load settings: {}", path.display())),
        None => Ok(Settings::default()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_ref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli, settings).await {
        Ok(summary) => {
            println!("{summary}");
            if summary.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}
