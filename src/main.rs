//! Outpost CLI entrypoint.
//!
//! This is the main entrypoint for the outpost command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use outpost::action::{Action, ActionRunner, ChannelConnector};
use outpost::cli::{Cli, Commands, OutputFormatter, StateCommands};
use outpost::config::{ConfigParser, ConfigValidator, DeployConfig, find_config_file};
use outpost::error::Result;
use outpost::state::{LocalStateStore, STATE_DIR, StateStore};
use outpost::transport::{EmbeddedTransport, ProviderDefaults};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point. Returns whether the command succeeded.
async fn run(cli: Cli) -> Result<bool> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Plan => cmd_plan(cli.config.as_ref(), &formatter).await,
        Commands::Apply { yes, continue_on_error } => {
            cmd_apply(cli.config.as_ref(), yes, continue_on_error, &formatter).await
        }
        Commands::State { command } => cmd_state(cli.config.as_ref(), command, &formatter).await,
    }
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool, formatter: &OutputFormatter) -> Result<bool> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let (_, config) = load_config(&config_file)?;
    let result = ConfigValidator::new().check(&config);

    println!("{}", formatter.format_validation(&result, show_warnings));
    Ok(result.is_valid())
}

/// Show which actions would run.
async fn cmd_plan(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<bool> {
    let workspace = Workspace::open(config_path)?;
    let cancel = cancel_on_ctrl_c();
    let runner = workspace.runner(cancel);

    let plan = runner.plan(&workspace.actions).await?;
    println!("{}", formatter.format_plan(&plan));
    Ok(true)
}

/// Run every action whose inputs changed.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let workspace = Workspace::open(config_path)?;
    let cancel = cancel_on_ctrl_c();
    let runner = workspace.runner(cancel).with_continue_on_error(continue_on_error);

    let plan = runner.plan(&workspace.actions).await?;
    if plan.pending().next().is_none() {
        println!("{}", formatter.message("success", "No changes to apply."));
        return Ok(true);
    }

    println!("{}", formatter.format_plan(&plan));

    if !auto_approve {
        eprint!("Do you want to apply this plan? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Apply cancelled.");
            return Ok(true);
        }
    }

    let report = runner.apply(&plan, &workspace.actions).await?;
    println!("{}", formatter.format_report(&report));
    Ok(report.success())
}

/// State management commands.
async fn cmd_state(config_path: Option<&PathBuf>, command: StateCommands, formatter: &OutputFormatter) -> Result<bool> {
    let workspace = Workspace::open(config_path)?;

    match command {
        StateCommands::Show => {
            let state = workspace.store.load_or_default().await?;
            println!("{}", formatter.format_state(&state));
            Ok(true)
        }
        StateCommands::Forget { name } => {
            let runner = workspace.runner(CancellationToken::new());
            if runner.forget(&name).await? {
                println!(
                    "{}",
                    formatter.message("success", &format!("Forgot '{name}'; the next apply will run it again."))
                );
                Ok(true)
            } else {
                println!("{}", formatter.message("warning", &format!("No recorded state for '{name}'.")));
                Ok(false)
            }
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Everything a command needs from the configuration file.
struct Workspace {
    config: DeployConfig,
    defaults: ProviderDefaults,
    store: LocalStateStore,
    actions: Vec<Action>,
    connector: ChannelConnector,
}

impl Workspace {
    /// Loads and validates the configuration and opens the state store.
    fn open(config_path: Option<&PathBuf>) -> Result<Self> {
        let config_file = resolve_config_path(config_path)?;
        let (base_dir, config) = load_config(&config_file)?;

        let result = ConfigValidator::new().validate(&config)?;
        for warning in &result.warnings {
            warn!("{warning}");
        }

        let defaults = ProviderDefaults::new(EmbeddedTransport::from_wire(&config.transport)?);
        let store = config.state.path.as_ref().map_or_else(
            || LocalStateStore::with_base_dir(base_dir.join(STATE_DIR)),
            |path| LocalStateStore::with_state_path(base_dir.join(path)),
        );
        debug!("Using state file: {}", store.state_path().display());

        let actions = Action::all_from_config(&config)?;

        Ok(Self {
            config,
            defaults,
            store,
            actions,
            connector: ChannelConnector,
        })
    }

    fn runner(&self, cancel: CancellationToken) -> ActionRunner<'_> {
        ActionRunner::new(&self.defaults, &self.store, &self.connector, cancel).with_retry(self.config.retry.policy())
    }
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads `.env` next to the configuration file, then the file itself.
fn load_config(config_file: &Path) -> Result<(PathBuf, DeployConfig)> {
    debug!("Loading configuration from: {}", config_file.display());
    let base_dir = config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let parser = ConfigParser::new().with_base_path(&base_dir);
    parser.load_dotenv()?;
    let config = parser.load_with_env(config_file)?;
    Ok((base_dir, config))
}

/// Returns a token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping after the current step");
            token.cancel();
        }
    });
    cancel
}
