//! pickerflow - Confirm file picker selections against a storage API.
//!
//! Usage:
//!   pickerflow confirm --config FILE --selections FILE   Confirm selections
//!   pickerflow save --config FILE --request FILE         Save files into a folder
//!   pickerflow poll --config FILE TASK_ID                Wait for a task to finish
//!   pickerflow --help                                    Show help
//!
//! Host messages are written to stdout, one JSON object per line. Logs go to
//! stderr and are controlled with `RUST_LOG`.

use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use pickerflow_core::{collect_selections, Credentials, HostMessage, PickerConfig, Selection};
use pickerflow_dispatch::{
    AutoPrompter, ConfirmOutcome, Dispatcher, FixedIntervalPoller, HttpApi, PickerApi, Prompter,
    SaveOutcome, SaveRequest, TaskPoller,
};

#[derive(Parser)]
#[command(
    name = "pickerflow",
    version,
    about = "Confirm file picker selections against a storage API",
    long_about = "pickerflow turns confirmed picker selections into links or copies.\n\n\
                  Host messages are printed to stdout as JSON lines; press Ctrl-C \
                  to cancel a running confirmation."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Confirm selections and report the result
    Confirm {
        #[command(flatten)]
        common: CommonArgs,

        /// JSON array of selections ("-" for stdin)
        #[arg(short, long)]
        selections: PathBuf,

        /// JSON object of the folder being browsed, used when nothing was selected
        #[arg(long)]
        current_folder: Option<PathBuf>,

        /// Answer yes to every prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Save files into a folder of the account
    Save {
        #[command(flatten)]
        common: CommonArgs,

        /// JSON save request ("-" for stdin)
        #[arg(short, long)]
        request: PathBuf,

        /// Answer yes to every prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Wait for a copy task to finish and print its final status
    Poll {
        #[command(flatten)]
        common: CommonArgs,

        /// Task identifier returned by a copy
        task_id: String,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Picker configuration file (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Account the selections belong to
    #[arg(short, long)]
    account: String,

    /// Authorization scheme
    #[arg(long, default_value = "Bearer")]
    scheme: String,

    /// Authorization key
    #[arg(short, long)]
    key: String,
}

impl CommonArgs {
    fn load(&self) -> Result<(Arc<PickerConfig>, Credentials)> {
        let config = PickerConfig::load(&self.config)
            .wrap_err_with(|| format!("Failed to load config {}", self.config.display()))?;
        let credentials = Credentials::new(&self.account, &self.scheme, &self.key);
        Ok((Arc::new(config), credentials))
    }
}

/// Asks questions on stderr and reads the answer from stdin.
struct StdinPrompter;

impl StdinPrompter {
    fn ask(question: &str) -> bool {
        eprint!("{question} [y/N] ");
        let _ = io::stderr().flush();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

impl Prompter for StdinPrompter {
    fn confirm_folder_copy(&self, folder: &Selection) -> bool {
        Self::ask(&format!(
            "Copy the whole folder \"{}\" and everything inside it?",
            folder.name
        ))
    }

    fn confirm_overwrite(&self, name: &str) -> bool {
        Self::ask(&format!("\"{name}\" already exists. Overwrite it?"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Confirm {
            common,
            selections,
            current_folder,
            yes,
        } => {
            run_confirm(&common, &selections, current_folder.as_deref(), yes).await?;
        }
        Command::Save {
            common,
            request,
            yes,
        } => {
            run_save(&common, &request, yes).await?;
        }
        Command::Poll { common, task_id } => {
            run_poll(&common, &task_id).await?;
        }
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pickerflow=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Confirm selections, cancelling on Ctrl-C.
async fn run_confirm(common: &CommonArgs, selections: &Path, current_folder: Option<&Path>, yes: bool) -> Result<()> {
    let (config, credentials) = common.load()?;
    let chosen: Vec<Selection> = read_json(selections).context("Invalid selections")?;
    let current_folder: Option<Selection> = current_folder
        .map(read_json)
        .transpose()
        .context("Invalid current folder")?;
    let (selections, origin) = collect_selections(chosen, current_folder, &config.types);

    let (dispatcher, rx) = new_dispatcher(config, yes);
    let printer = spawn_printer(rx);

    let outcome = {
        let confirm = dispatcher.confirm_from(&credentials, selections, origin);
        tokio::pin!(confirm);
        tokio::select! {
            outcome = &mut confirm => outcome,
            _ = tokio::signal::ctrl_c() => {
                dispatcher.cancel().await;
                confirm.await
            }
        }
    };

    drop(dispatcher);
    printer.await.context("Printer task failed")??;

    match outcome {
        ConfirmOutcome::Busy => eprintln!("Another confirmation is still running"),
        ConfirmOutcome::Rejected(e) => eprintln!("Refused: {e}"),
        ConfirmOutcome::Declined => eprintln!("Folder copy declined"),
        ConfirmOutcome::Reported(action) => eprintln!("Reported {action}"),
        ConfirmOutcome::Suppressed => eprintln!("Cancelled"),
    }

    Ok(())
}

/// Save files into a folder.
async fn run_save(common: &CommonArgs, request: &Path, yes: bool) -> Result<()> {
    let (config, credentials) = common.load()?;
    let request: SaveRequest = read_json(request).context("Invalid save request")?;

    let (dispatcher, rx) = new_dispatcher(config, yes);
    let printer = spawn_printer(rx);

    let outcome = dispatcher.save(&credentials, request).await;

    drop(dispatcher);
    printer.await.context("Printer task failed")??;

    match outcome {
        SaveOutcome::Rejected(e) => eprintln!("Refused: {e}"),
        SaveOutcome::Finished { saved, failed } => {
            eprintln!("Saved {saved} file(s), {failed} failed");
        }
    }

    Ok(())
}

/// Poll a task until it leaves the pending state.
async fn run_poll(common: &CommonArgs, task_id: &str) -> Result<()> {
    let (config, credentials) = common.load()?;
    let interval = Duration::from_millis(config.poll_interval_ms);
    let api: Arc<dyn PickerApi> = Arc::new(HttpApi::new(config));
    let poller = FixedIntervalPoller::with_interval(api, interval);

    eprintln!("Waiting for task {task_id}...");
    let status = poller
        .poll(task_id, &credentials)
        .await
        .wrap_err_with(|| format!("Failed to poll task {task_id}"))?;

    println!("{}", serde_json::to_string_pretty(status.payload())?);
    Ok(())
}

fn new_dispatcher(config: Arc<PickerConfig>, yes: bool) -> (Dispatcher, mpsc::Receiver<HostMessage>) {
    let api: Arc<dyn PickerApi> = Arc::new(HttpApi::new(Arc::clone(&config)));
    let prompter: Arc<dyn Prompter> = if yes {
        Arc::new(AutoPrompter::yes())
    } else {
        Arc::new(StdinPrompter)
    };
    Dispatcher::new(config, api, prompter)
}

/// Print host messages as JSON lines until every sender is gone.
fn spawn_printer(mut rx: mpsc::Receiver<HostMessage>) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let line = serde_json::to_string(&message)?;
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{line}")?;
            stdout.flush()?;
        }
        Ok::<_, color_eyre::eyre::Report>(())
    })
}

/// Read a JSON document from `path`, or stdin when `path` is "-".
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = if path == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        text
    } else {
        std::fs::read_to_string(path).wrap_err_with(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_str(&text).wrap_err_with(|| format!("Failed to parse {}", path.display()))
}
