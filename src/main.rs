use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use panic_guard::app::{acquire_lock, AppContext};
use panic_guard::capture::location::coordinates_label;
use panic_guard::capture::Feature;
use panic_guard::config::AppConfig;
use panic_guard::error::DynError;
use panic_guard::models::{DeviceStatus, DeviceType, NewDevice};
use panic_guard::monitor::spawn_platform_watcher;
use panic_guard::notify::LogSink;
use panic_guard::probe::SystemNetworkInfo;
use panic_guard::realtime::RealtimeNotifier;
use panic_guard::registry::DeviceRegistry;
use panic_guard::serve::run_server;
use panic_guard::store::RecordingStore;
use panic_guard::subscription::{days_remaining, is_active, SubscriptionStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "Personal safety panic button with automatic connection-loss recording")]
struct Args {
    /// Path to config file (TOML format); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch connectivity and create a panic recording when it is lost
    Monitor {
        /// Also serve the HTTP API
        #[arg(long)]
        serve: bool,
    },
    /// Serve the HTTP API
    Serve {
        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Activate panic mode: record video with audio and track location
    Panic {
        /// Seconds to record before stopping; runs until Ctrl-C when omitted
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Record individual features
    Capture {
        #[arg(short, long, value_enum, required = true)]
        feature: Vec<Feature>,

        /// Seconds to record before stopping; runs until Ctrl-C when omitted
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Manage registered devices
    Devices {
        #[command(subcommand)]
        action: DevicesAction,
    },
    /// Manage evidence recordings
    Recordings {
        #[command(subcommand)]
        action: RecordingsAction,
    },
    /// Show or change the subscription plan
    Subscription {
        #[command(subcommand)]
        action: SubscriptionAction,
    },
}

#[derive(Subcommand, Debug)]
enum DevicesAction {
    List,
    Add {
        name: String,
        #[arg(short = 't', long = "type", value_enum, default_value = "phone")]
        device_type: DeviceType,
        /// Email of the third party this device belongs to
        #[arg(long)]
        third_party_email: Option<String>,
    },
    Remove {
        id: String,
    },
    Status {
        id: String,
        #[arg(value_enum)]
        status: DeviceStatus,
    },
}

#[derive(Subcommand, Debug)]
enum RecordingsAction {
    List,
    Delete { id: String },
    /// Print a time-limited download link
    Url { id: String },
}

#[derive(Subcommand, Debug)]
enum SubscriptionAction {
    Show,
    Upgrade,
}

#[tokio::main]
async fn main() -> Result<(), DynError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match args.command {
        Command::Monitor { serve } => monitor(config, serve).await,
        Command::Serve { port } => serve(config, port).await,
        Command::Panic { duration } => panic_mode(config, duration).await,
        Command::Capture { feature, duration } => capture(config, feature, duration).await,
        Command::Devices { action } => devices(config, action).await,
        Command::Recordings { action } => recordings(config, action).await,
        Command::Subscription { action } => subscription(config, action).await,
    }
}

async fn monitor(config: AppConfig, serve: bool) -> Result<(), DynError> {
    let _lock = acquire_lock(&config, "monitor")?;
    let ctx = AppContext::open(config).await?;
    ctx.subscriptions.ensure_trial().await?;

    let sink = Arc::new(LogSink);
    let notifier = Arc::new(RealtimeNotifier::new(sink.clone()));
    let notifier_task = notifier.spawn(&ctx.hub);

    let monitor = ctx.monitor(sink);
    let (tx, rx) = mpsc::channel(16);
    monitor.listen(rx);
    let watcher = spawn_platform_watcher(
        Arc::new(SystemNetworkInfo::new()),
        Duration::from_secs(1),
        tx,
    );
    monitor.start();

    let api_port = ctx.config.api_port;
    let state = ctx.api_state(Some(monitor.clone()));
    if serve {
        tokio::select! {
            result = run_server(state, api_port) => result?,
            _ = tokio::signal::ctrl_c() => log::info!("Interrupted"),
        }
    } else {
        tokio::signal::ctrl_c().await?;
        log::info!("Interrupted");
    }

    monitor.shutdown();
    watcher.abort();
    notifier_task.abort();
    Ok(())
}

async fn serve(config: AppConfig, port: Option<u16>) -> Result<(), DynError> {
    let ctx = AppContext::open(config).await?;
    ctx.subscriptions.ensure_trial().await?;

    let notifier = Arc::new(RealtimeNotifier::new(Arc::new(LogSink)));
    let _notifier_task = notifier.spawn(&ctx.hub);

    let port = port.unwrap_or(ctx.config.api_port);
    run_server(ctx.api_state(None), port).await
}

/// Wait for the given number of seconds, or for Ctrl-C when none is given
async fn wait_for_stop(duration: Option<u64>) -> Result<(), DynError> {
    match duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                result = tokio::signal::ctrl_c() => result?,
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }
    Ok(())
}

async fn panic_mode(config: AppConfig, duration: Option<u64>) -> Result<(), DynError> {
    let _lock = acquire_lock(&config, "capture")?;
    let ctx = AppContext::open(config).await?;
    let mut orchestrator = ctx.orchestrator(Arc::new(LogSink));

    orchestrator.toggle_panic().await?;
    println!("Panic mode active. Press Ctrl-C to stop.");
    wait_for_stop(duration).await?;

    let artifacts = orchestrator.shutdown().await;
    let downloads = ctx.config.downloads_dir();
    for artifact in &artifacts {
        let path = orchestrator.save_artifact_to(artifact, &downloads).await?;
        println!("Saved {}", path.display());
    }
    Ok(())
}

async fn capture(
    config: AppConfig,
    features: Vec<Feature>,
    duration: Option<u64>,
) -> Result<(), DynError> {
    let _lock = acquire_lock(&config, "capture")?;
    let ctx = AppContext::open(config).await?;
    let mut orchestrator = ctx.orchestrator(Arc::new(LogSink));

    for feature in features {
        if !orchestrator.active_features().get(feature) {
            orchestrator.toggle_feature(feature).await?;
        }
    }
    println!("Recording. Press Ctrl-C to stop.");
    wait_for_stop(duration).await?;

    if let Some(fix) = orchestrator.location() {
        println!(
            "Last position: {}",
            fix.address.unwrap_or_else(|| coordinates_label(
                fix.position.latitude,
                fix.position.longitude
            ))
        );
    }

    let artifacts = orchestrator.shutdown().await;
    let downloads = ctx.config.downloads_dir();
    for artifact in &artifacts {
        let path = orchestrator.save_artifact_to(artifact, &downloads).await?;
        println!("Saved {}", path.display());
    }
    Ok(())
}

async fn devices(config: AppConfig, action: DevicesAction) -> Result<(), DynError> {
    let ctx = AppContext::open(config).await?;
    match action {
        DevicesAction::List => {
            for device in ctx.registry.list().await? {
                println!(
                    "{}  {:<8} {:<7} {}{}",
                    device.id,
                    device.device_type.as_str(),
                    device.status.as_str(),
                    device.name,
                    device
                        .third_party_email
                        .map(|email| format!(" (third party: {})", email))
                        .unwrap_or_default()
                );
            }
        }
        DevicesAction::Add {
            name,
            device_type,
            third_party_email,
        } => {
            let device = ctx
                .registry
                .create(NewDevice {
                    name,
                    device_type,
                    is_third_party: third_party_email.is_some(),
                    third_party_email,
                    records_password: None,
                    recording_time_limit: None,
                })
                .await?;
            println!("Added device {}", device.id);
        }
        DevicesAction::Remove { id } => {
            ctx.registry.delete(&id).await?;
            println!("Removed device {}", id);
        }
        DevicesAction::Status { id, status } => {
            ctx.registry.set_status(&id, status).await?;
            println!("Device {} is now {}", id, status.as_str());
        }
    }
    Ok(())
}

async fn recordings(config: AppConfig, action: RecordingsAction) -> Result<(), DynError> {
    let ctx = AppContext::open(config).await?;
    match action {
        RecordingsAction::List => {
            for recording in ctx.store.list().await? {
                println!(
                    "{}  {:<8} {}  device={}  {}",
                    recording.id,
                    recording.recording_type.as_str(),
                    recording.created_at.format("%Y-%m-%d %H:%M:%S"),
                    recording.device_id,
                    recording.file_path.as_deref().unwrap_or("(no file)")
                );
            }
        }
        RecordingsAction::Delete { id } => {
            ctx.store.delete(&id).await?;
            println!("Deleted recording {}", id);
        }
        RecordingsAction::Url { id } => {
            let recording = ctx.store.get(&id).await?;
            let file_path = recording
                .file_path
                .ok_or_else(|| format!("Recording {} has no file", id))?;
            println!("{}", ctx.store.download_url(&file_path).await?);
        }
    }
    Ok(())
}

async fn subscription(config: AppConfig, action: SubscriptionAction) -> Result<(), DynError> {
    let ctx = AppContext::open(config).await?;
    let subscription = match action {
        SubscriptionAction::Show => ctx.subscriptions.get().await?,
        SubscriptionAction::Upgrade => Some(ctx.subscriptions.upgrade().await?),
    };
    let now = chrono::Utc::now();
    match &subscription {
        Some(sub) => {
            println!("Plan:    {}", sub.plan_type.as_str());
            println!("Status:  {}", sub.status.as_str());
            if let Some(expires_at) = sub.expires_at {
                println!("Expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!(
                "Active:  {} ({} days remaining)",
                is_active(Some(sub), now),
                days_remaining(Some(sub), now)
            );
        }
        None => println!("No subscription"),
    }
    Ok(())
}
