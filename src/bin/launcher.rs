//! CV Manager Launcher - Main entry point
//!
//! Checks for updates of the launcher and the main application, installs
//! staged releases and starts the app with the configured data location.

use clap::Parser;
use cvm_updater::engine::{
    cli::{Cli, Commands, ConfigAction, OutputFormat},
    config::{ConfigError, ConfigStore, LauncherConfig},
    launch::{data_path_from_env, launch_main_app},
    layout::InstallLayout,
    updater::{
        installer::InstallReport, ComponentId, DownloadProgress, ReleaseClient, UpdateManager,
        UpdateScheduler, UpdateStatus, Updater,
    },
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run_cli(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn run_cli(cli: Cli) -> CliResult {
    let layout = cli.layout()?;
    let json = cli.format == OutputFormat::Json;

    layout.init()?;
    match layout.cleanup_partial_downloads() {
        Ok(0) => {}
        Ok(n) => info!(count = n, "Removed interrupted downloads"),
        Err(e) => warn!(error = %e, "Could not clean up interrupted downloads"),
    }

    let config = Arc::new(open_config(&layout)?);
    let manager = Arc::new(UpdateManager::new(&layout, config.clone()));

    match cli.command {
        Commands::Check { component } => {
            let statuses = match component {
                Some(id) => {
                    let id = ComponentId::from(id);
                    let status = manager.get(id)?.check().await;
                    config.record_update_check()?;
                    BTreeMap::from([(id, status)])
                }
                None => manager.check_all().await,
            };
            print_statuses(&statuses, json)?;
        }
        Commands::Download { component, url, sha256 } => {
            let updater = manager.get(component.into())?;
            let progress = match url {
                Some(url) => {
                    updater
                        .download(&url, sha256.as_deref().unwrap_or_default())
                        .await?
                }
                None => {
                    let status = updater.try_check().await?;
                    if !status.update_available {
                        print_up_to_date(&status, json)?;
                        return Ok(());
                    }
                    updater.stage_release(&status).await?
                }
            };
            print_progress(updater, &progress, json)?;
        }
        Commands::Apply { component, version } => {
            let updater = manager.get(component.into())?;
            let report = updater.apply(version.as_deref()).await?;
            print_install(updater, &report, json)?;
        }
        Commands::Update { component } => {
            let updater = manager.get(component.into())?;
            match updater.update_now().await? {
                Some(report) => print_install(updater, &report, json)?,
                None => {
                    let status = updater.last_status().ok_or("no update status recorded")?;
                    print_up_to_date(&status, json)?;
                }
            }
        }
        Commands::Version { component } => {
            let updater = manager.get(component.into())?;
            let version = updater.installed_version();
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "component": updater.id(), "version": version })
                );
            } else {
                println!("{} {}", updater.id(), version);
            }
        }
        Commands::Release { commits } => {
            cmd_release(&ReleaseClient::new(&config.settings()), commits, json).await?;
        }
        Commands::Status => {
            let status = ReleaseClient::new(&config.settings()).status().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else if status.connected {
                println!("🟢 Connected to {} ({})", status.repository, status.branch);
                println!("   Releases: {}", status.releases_url);
            } else {
                println!("🔴 GitHub is not reachable");
                println!("   Releases: {}", status.releases_url);
            }
        }
        Commands::Launch => {
            cmd_launch(&layout, &manager, json).await?;
        }
        Commands::Watch { interval } => {
            cmd_watch(manager, interval).await?;
        }
        Commands::Config { action } => {
            cmd_config(action, &layout, &config, json)?;
        }
    }

    Ok(())
}

// A broken config file must not keep the launcher from starting the app.
fn open_config(layout: &InstallLayout) -> Result<ConfigStore, ConfigError> {
    let path = layout.config_path();
    match ConfigStore::open(&path) {
        Ok(store) => Ok(store),
        Err(ConfigError::ParseError(e)) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable config, using defaults");
            Ok(ConfigStore::new(path, LauncherConfig::default()))
        }
        Err(e) => Err(e),
    }
}

async fn cmd_launch(layout: &InstallLayout, manager: &UpdateManager, json: bool) -> CliResult {
    // Staged releases are installed while nothing is running from them
    for id in ComponentId::ALL {
        let updater = manager.get(id)?;
        if !updater.has_staged_update() {
            continue;
        }
        match updater.apply(None).await {
            Ok(report) => {
                info!(component = %id, path = %report.target.display(), "Installed staged update")
            }
            Err(e) => warn!(component = %id, error = %e, "Staged update not installed"),
        }
    }

    // An inherited CV_MANAGER_DATA_PATH stands in for an unset location
    let data_location = manager
        .config()
        .snapshot()
        .data_location
        .or_else(data_path_from_env);
    if data_location.is_none() {
        warn!("No data location configured, the application will use its own default");
    }

    let child = launch_main_app(&layout.app_path(), data_location.as_deref())?;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "launched": layout.app_path(),
                "pid": child.id(),
                "data_location": data_location,
            })
        );
    } else {
        println!("🚀 CV Manager started (pid {})", child.id());
    }
    Ok(())
}

async fn cmd_release(client: &ReleaseClient, commits: usize, json: bool) -> CliResult {
    let release = client.latest_release().await?;
    let recent = if commits > 0 {
        client.recent_commits(commits).await?
    } else {
        Vec::new()
    };

    if json {
        println!(
            "{}",
            serde_json::json!({ "release": release, "commits": recent })
        );
        return Ok(());
    }

    println!("📦 {} ({})", release.name, release.version);
    if !release.release_date.is_empty() {
        println!("   Published: {}", release.release_date);
    }
    for change in &release.changes {
        println!("   • {}", change);
    }
    for asset in &release.assets {
        println!("   ⬇️  {} ({} bytes)", asset.name, asset.size);
    }
    println!("   {}", release.changelog_url);

    if !recent.is_empty() {
        println!("\n   Recent commits:");
        for commit in &recent {
            println!("   {} {} ({})", commit.short_sha(), commit.summary, commit.author);
        }
    }
    Ok(())
}

async fn cmd_watch(manager: Arc<UpdateManager>, interval: Option<u64>) -> CliResult {
    let mut scheduler = UpdateScheduler::new(manager);
    if let Some(secs) = interval {
        scheduler = scheduler.with_interval(Duration::from_secs(secs.max(1)));
    }

    let shutdown = CancellationToken::new();
    let handle = scheduler.spawn(shutdown.clone());

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");
    shutdown.cancel();
    handle.await?;
    Ok(())
}

fn cmd_config(
    action: ConfigAction,
    layout: &InstallLayout,
    config: &ConfigStore,
    json: bool,
) -> CliResult {
    match action {
        ConfigAction::Show => {
            let snapshot = config.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("⚙️  Launcher configuration ({})", config.path().display());
                match &snapshot.data_location {
                    Some(path) => println!("   Data location:  {}", path.display()),
                    None => println!("   Data location:  (not set)"),
                }
                println!("   Auto update:    {}", snapshot.auto_update);
                println!("   Launcher:       {}", snapshot.launcher_version);
                println!(
                    "   App:            {}",
                    snapshot.app_version.as_deref().unwrap_or("(unknown)")
                );
                match snapshot.last_update_check {
                    Some(at) => println!("   Last check:     {}", at.to_rfc3339()),
                    None => println!("   Last check:     never"),
                }
                let onboarding = if snapshot.onboarding_completed {
                    "done"
                } else {
                    "pending"
                };
                println!("   Onboarding:     {}", onboarding);
            }
        }
        ConfigAction::SetDataLocation { path } => {
            let path = match path {
                Some(path) => config.set_data_location(&path)?,
                None => config.use_default_data_location(layout.base_dir())?,
            };
            config.mark_onboarding_completed()?;
            if json {
                println!("{}", serde_json::json!({ "data_location": path }));
            } else {
                println!("✅ Data location set to {}", path.display());
            }
        }
        ConfigAction::AutoUpdate { enabled } => {
            config.update(|c| c.auto_update = enabled)?;
            if json {
                println!("{}", serde_json::json!({ "auto_update": enabled }));
            } else {
                println!("✅ Auto update {}", if enabled { "enabled" } else { "disabled" });
            }
        }
        ConfigAction::Reset => {
            config.reset()?;
            if json {
                println!("{}", serde_json::json!({ "reset": true }));
            } else {
                println!("✅ Configuration reset to defaults");
            }
        }
    }
    Ok(())
}

fn print_statuses(statuses: &BTreeMap<ComponentId, UpdateStatus>, json: bool) -> CliResult {
    if json {
        println!("{}", serde_json::to_string_pretty(statuses)?);
        return Ok(());
    }

    println!("🔍 Update check");
    for (id, status) in statuses {
        if let Some(error) = &status.error {
            println!("   ❌ {}: check failed ({})", id, error);
        } else if status.update_available {
            let required = if status.is_required { " [required]" } else { "" };
            println!(
                "   ⬆️  {}: {} -> {}{}",
                id, status.current_version, status.latest_version, required
            );
            for note in &status.changes {
                println!("      • {}", note);
            }
        } else {
            println!("   ✓ {}: {} (up to date)", id, status.current_version);
        }
    }
    Ok(())
}

fn print_up_to_date(status: &UpdateStatus, json: bool) -> CliResult {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
    } else {
        println!("✓ {} is up to date ({})", status.component, status.current_version);
    }
    Ok(())
}

fn print_progress(updater: &Updater, progress: &DownloadProgress, json: bool) -> CliResult {
    if json {
        println!("{}", serde_json::to_string_pretty(progress)?);
    } else {
        println!(
            "📦 {} update staged ({} bytes) at {}",
            updater.id(),
            progress.bytes_downloaded,
            updater.component().staged_path.display()
        );
        println!("   Run `apply {}` to install it", updater.id());
    }
    Ok(())
}

fn print_install(updater: &Updater, report: &InstallReport, json: bool) -> CliResult {
    let version = updater.installed_version();
    if json {
        println!(
            "{}",
            serde_json::json!({
                "component": updater.id(),
                "version": version,
                "target": report.target,
                "backup": report.backup,
                "bytes_written": report.bytes_written,
            })
        );
    } else {
        println!("✅ Installed {} {}", updater.id(), version);
        println!("   📁 {}", report.target.display());
        if let Some(backup) = &report.backup {
            println!("   Previous version kept at {}", backup.display());
        }
    }
    Ok(())
}
