//! Cloudhold CLI entrypoint.
//!
//! This is the main entrypoint for the cloudhold command-line tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use cloudhold::access;
use cloudhold::cli::{
    AccessRule, Cli, Commands, EntityView, OutputFormatter, PollingArgs, ResourceArgs, Toggle,
};
use cloudhold::cloud::{CloudContext, HttpProbe, RestClient, VerifiedDeployment, ZipDeployer};
use cloudhold::config::{CloudholdConfig, ConfigParser, ConfigValidator, find_config_file};
use cloudhold::convergence::{CancelHandle, ConvergenceVerifier, VerifierConfig};
use cloudhold::error::{ConfigError, Result};
use cloudhold::resource::{Parent, ResourceModule};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Kind of the firewall rules owned by a database server.
const FIREWALL_RULES: &str = "firewallRules";

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let formatter = OutputFormatter::new(cli.output);
    match runtime.block_on(run(cli, &formatter)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", formatter.error(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli, formatter: &OutputFormatter) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, formatter),
        Commands::List {
            namespace,
            kind,
            parent,
        } => cmd_list(config_path, &namespace, &kind, parent.as_deref(), formatter).await,
        Commands::Show(target) => cmd_show(config_path, &target, formatter).await,
        Commands::Apply {
            target,
            set,
            create_only,
        } => cmd_apply(config_path, &target, set, create_only, formatter).await,
        Commands::Delete(target) => cmd_delete(config_path, &target, formatter).await,
        Commands::Restart(target) => cmd_restart(config_path, &target, formatter).await,
        Commands::Verify { url, polling } => cmd_verify(config_path, &url, &polling, formatter).await,
        Commands::Deploy {
            artifact,
            target,
            health,
            polling,
        } => cmd_deploy(config_path, &artifact, &target, health, &polling, formatter).await,
        Commands::Access {
            server,
            rule,
            state,
            ip,
        } => cmd_access(config_path, &server, rule, state, ip.as_deref(), formatter).await,
    }
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&Path>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;

    let result = ConfigValidator::new().check(&config, |name| std::env::var_os(name).is_some());
    println!("{}", formatter.format_validation(&result, show_warnings));

    match result.errors.first() {
        Some(first) => {
            Err(ConfigError::validation(first.message.clone(), first.field.clone()).into())
        }
        None => Ok(()),
    }
}

/// List a collection.
async fn cmd_list(
    config_path: Option<&Path>,
    namespace: &str,
    kind: &str,
    parent: Option<&str>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let context = load_context(config_path)?;
    let module = module_for(&context, namespace, kind, parent)?;

    let entities = module.list().await?;
    let mut views = Vec::with_capacity(entities.len());
    for entity in &entities {
        views.push(EntityView::capture(entity).await);
    }

    println!("{}", formatter.format_entities(kind, &views));
    Ok(())
}

/// Show one resource.
async fn cmd_show(
    config_path: Option<&Path>,
    target: &ResourceArgs,
    formatter: &OutputFormatter,
) -> Result<()> {
    let context = load_context(config_path)?;
    let module = module_for(&context, &target.namespace, &target.kind, target.parent.as_deref())?;

    let entity = module.get_existing(&target.name, &target.resource_group).await?;
    println!("{}", formatter.format_entity(&EntityView::capture(&entity).await));
    Ok(())
}

/// Create or update a resource.
async fn cmd_apply(
    config_path: Option<&Path>,
    target: &ResourceArgs,
    assignments: Vec<(String, serde_json::Value)>,
    create_only: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let context = load_context(config_path)?;
    let module = module_for(&context, &target.namespace, &target.kind, target.parent.as_deref())?;

    let mut draft = if create_only {
        module.create(&target.name, &target.resource_group).await
    } else {
        module.update_or_create(&target.name, &target.resource_group).await
    };
    for (key, value) in assignments {
        draft.set(key, value)?;
    }

    info!("Committing draft {} for {}", draft.id(), target.name);
    let entity = draft.commit().await?;

    println!("{}", formatter.format_entity(&EntityView::capture(&entity).await));
    Ok(())
}

/// Delete a resource.
async fn cmd_delete(
    config_path: Option<&Path>,
    target: &ResourceArgs,
    formatter: &OutputFormatter,
) -> Result<()> {
    let context = load_context(config_path)?;
    let module = module_for(&context, &target.namespace, &target.kind, target.parent.as_deref())?;

    module.delete(&target.name, &target.resource_group).await?;
    println!("{}", formatter.success(&format!("Deleted {} '{}'", target.kind, target.name)));
    Ok(())
}

/// Restart a resource.
async fn cmd_restart(
    config_path: Option<&Path>,
    target: &ResourceArgs,
    formatter: &OutputFormatter,
) -> Result<()> {
    let context = load_context(config_path)?;
    let module = module_for(&context, &target.namespace, &target.kind, target.parent.as_deref())?;

    info!("Restarting {} '{}'", target.kind, target.name);
    let entity = module.restart(&target.name, &target.resource_group).await?;

    println!("{}", formatter.format_entity(&EntityView::capture(&entity).await));
    Ok(())
}

/// Poll a status URL.
async fn cmd_verify(
    config_path: Option<&Path>,
    url: &str,
    polling: &PollingArgs,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config_optional(config_path);
    let verifier = ConvergenceVerifier::new(verifier_config(config.as_ref(), polling));
    let probe = Arc::new(http_probe(url, config.as_ref(), polling)?);

    let cancel = cancel_on_ctrl_c();
    let convergence = verifier.verify_with_cancel(probe, &cancel).await?;

    println!("{}", formatter.format_convergence(&convergence));
    Ok(())
}

/// Deploy an artifact, then verify.
async fn cmd_deploy(
    config_path: Option<&Path>,
    artifact: &Path,
    target: &str,
    health: Option<String>,
    polling: &PollingArgs,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config_optional(config_path);
    let token = config.as_ref().and_then(|c| ConfigParser::token(c).ok());

    let mut deployer = ZipDeployer::new(target)?;
    if let Some(token) = &token {
        deployer = deployer.with_token(token);
    }

    let verifier = ConvergenceVerifier::new(verifier_config(config.as_ref(), polling));
    let mut handler = VerifiedDeployment::new(Arc::new(deployer), verifier);
    if let Some(health) = health {
        handler = handler.with_probe(Arc::new(http_probe(&health, config.as_ref(), polling)?));
    }

    let cancel = cancel_on_ctrl_c();
    let report = handler.run_with_cancel(artifact, &cancel).await?;

    println!("{}", formatter.format_deployment(&report));
    Ok(())
}

/// Toggle firewall access.
async fn cmd_access(
    config_path: Option<&Path>,
    server: &str,
    rule: AccessRule,
    state: Toggle,
    ip: Option<&str>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let context = load_context(config_path)?;
    let module = module_for(&context, "", FIREWALL_RULES, Some(server))?;
    let allowed = state == Toggle::On;

    match rule {
        AccessRule::Service => access::toggle_service_access(&module, allowed).await?,
        AccessRule::Local => access::toggle_local_machine_access(&module, allowed, ip).await?,
    }

    let verb = if allowed { "enabled" } else { "disabled" };
    println!("{}", formatter.success(&format!("{rule:?} access {verb} for {server}")));
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&Path>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path.to_path_buf()),
        None => find_config_file(std::env::current_dir()?),
    }
}

/// Loads `.env`, the configuration file, and environment overrides.
fn load_config(config_path: Option<&Path>) -> Result<CloudholdConfig> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Using configuration: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")));
    parser.load_dotenv()?;
    parser.load_with_env(&config_file)
}

/// Like [`load_config`], but a missing or broken file only logs a warning.
fn load_config_optional(config_path: Option<&Path>) -> Option<CloudholdConfig> {
    match load_config(config_path) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Using default verifier settings: {e}");
            None
        }
    }
}

/// Loads and validates configuration into a control-plane context.
fn load_context(config_path: Option<&Path>) -> Result<CloudContext> {
    let config = load_config(config_path)?;
    let result = ConfigValidator::new().validate(&config)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }
    CloudContext::from_config(&config)
}

/// Builds a module over a REST client for `kind`.
fn module_for(
    context: &CloudContext,
    namespace: &str,
    kind: &str,
    parent: Option<&str>,
) -> Result<ResourceModule<RestClient>> {
    let parent = match parent {
        Some(id) => Parent::from_id(id)?,
        None => Parent::root(context.subscription_id(), namespace),
    };
    let client = RestClient::new(context.clone(), parent.clone(), kind)?;
    Ok(ResourceModule::new(kind, parent, Arc::new(client)))
}

/// Configured verifier timing with command-line overrides applied.
fn verifier_config(config: Option<&CloudholdConfig>, polling: &PollingArgs) -> VerifierConfig {
    let mut verifier = config.map_or_else(VerifierConfig::default, |c| VerifierConfig::from(&c.verifier));

    if let Some(secs) = polling.initial_delay {
        verifier.initial_delay = Duration::from_secs(secs);
    }
    if let Some(secs) = polling.interval {
        verifier.interval = Duration::from_secs(secs);
    }
    if let Some(attempts) = polling.max_attempts {
        verifier.max_attempts = attempts;
    }
    verifier
}

/// Builds an HTTP probe, authenticated when a token is configured.
fn http_probe(
    url: &str,
    config: Option<&CloudholdConfig>,
    polling: &PollingArgs,
) -> Result<HttpProbe> {
    let mut probe = HttpProbe::new(url)?;
    if let Some(state) = &polling.expect_state {
        probe = probe.expect_state(state);
    }
    if let Some(token) = config.and_then(|c| ConfigParser::token(c).ok()) {
        probe = probe.with_token(token);
    }
    Ok(probe)
}

/// Returns a handle that is cancelled when the user presses Ctrl-C.
fn cancel_on_ctrl_c() -> CancelHandle {
    let cancel = CancelHandle::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping verification");
            handle.cancel();
        }
    });
    cancel
}
