//! beacon-demo - scripted walkthrough of the beacon analytics SDK
//!
//! Builds an SDK from the config file and flags, runs a short session
//! against it and prints every delivered event plus the final statistics.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use beacon_core::plugins::{jsonl, Plugin, PluginKind};
use beacon_core::{
    props, Analytics, AnalyticsEvent, Config, ConsentPreferences, ConsentStatus, EventType,
    FileStorage, Next, Properties, PublishStats, SdkOptions,
};
use clap::Parser;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "beacon-demo")]
#[command(about = "Scripted walkthrough of the beacon analytics SDK")]
#[command(version)]
struct Args {
    /// Config file (default: ~/.config/beacon/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Application name reported with every event
    #[arg(long)]
    app_name: Option<String>,

    /// Events per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Periodic flush interval in milliseconds
    #[arg(long)]
    flush_interval_ms: Option<u64>,

    /// Also append delivered events to this JSON-lines file
    #[arg(long)]
    events_out: Option<PathBuf>,

    /// Directory for persisted identity (default: from config)
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Verbose SDK logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    beacon_core::logging::init_stderr(if args.debug { "debug" } else { "warn" });

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    let options = sdk_options(&args, &config);
    let storage = FileStorage::new(
        args.storage_dir
            .clone()
            .unwrap_or_else(|| config.storage_dir()),
    );

    let analytics = Analytics::builder(options)
        .storage(storage.clone())
        .build()
        .context("failed to initialize analytics")?;

    println!(
        "beacon-demo: app {:?}, storage {}",
        analytics.options().app_name,
        storage.dir().display()
    );
    println!("anonymous id: {}", analytics.current_user().anonymous_id);
    println!();

    analytics.add_plugin(printer());
    if let Some(path) = &args.events_out {
        analytics.add_plugin(jsonl::destination(path));
        println!("writing events to {}", path.display());
    }

    tracing::info!(plugins = ?analytics.plugin_names(), "Demo session starting");
    run_session(&analytics).await;

    analytics.shutdown();
    print_stats(&analytics.stats());
    Ok(())
}

fn sdk_options(args: &Args, config: &Config) -> SdkOptions {
    let mut options = config
        .sdk
        .clone()
        .unwrap_or_else(|| SdkOptions::new("Beacon Demo"));

    if let Some(name) = &args.app_name {
        options.app_name = name.clone();
    }
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }
    if let Some(interval) = args.flush_interval_ms {
        options.flush_interval_ms = interval;
    }
    options.debug |= args.debug;
    options
}

/// Destination that prints each event to stdout.
fn printer() -> Plugin {
    Plugin::new("demo.printer")
        .with_kind(PluginKind::Destination)
        .on_events(&EventType::ALL, |event| {
            let properties = serde_json::to_string(&event.properties)?;
            println!(
                "  -> {:<8} {:<20} user={:<12} {}",
                event.event_type.as_str(),
                event.label(),
                event.user_id.as_deref().unwrap_or("-"),
                properties
            );
            Ok(())
        })
}

async fn run_session(analytics: &Analytics) {
    let sequence = AtomicU64::new(0);
    analytics.use_middleware(move |mut event: AnalyticsEvent, next: Next| {
        let n = sequence.fetch_add(1, Ordering::Relaxed) + 1;
        event.properties.insert("sequence".into(), json!(n));
        next.run(event);
    });

    analytics.set_global_properties(props(json!({"environment": "demo"})));

    println!("identify + tracks");
    analytics.identify("demo-user", props(json!({"plan": "pro", "seats": 5})));
    analytics.track("Project Created", props(json!({"template": "blank"})));
    analytics.page(Some("/dashboard"), Properties::new());
    analytics.group("acme", props(json!({"industry": "robotics"})));
    analytics.flush();

    println!("errors + performance");
    let error = std::io::Error::new(std::io::ErrorKind::TimedOut, "export timed out");
    analytics.track_error(&error, props(json!({"screen": "reports"})));
    analytics.track_performance("dashboard_render_ms", 184.0, Properties::new());
    analytics.flush();

    println!("tracking disabled (event ignored)");
    analytics.disable_tracking();
    analytics.track("Ignored While Disabled", Properties::new());
    analytics.enable_tracking();

    println!("granular consent update");
    let preferences: ConsentPreferences = [
        ("analytics".to_string(), ConsentStatus::Granted),
        ("marketing".to_string(), ConsentStatus::Denied),
    ]
    .into_iter()
    .collect();
    analytics.update_consent(preferences);
    println!("  consent given: {}", analytics.has_consent());

    analytics.track("Report Exported", props(json!({"format": "csv"})));
    analytics.alias("demo-user-2", None);

    let wait = analytics.options().flush_interval() + Duration::from_millis(100);
    println!("waiting {:?} for the periodic flush", wait);
    tokio::time::sleep(wait).await;
}

fn print_stats(stats: &PublishStats) {
    println!();
    println!("publish statistics");
    println!("  queued:            {}", stats.events_queued);
    println!("  dropped (consent): {}", stats.events_dropped_no_consent);
    println!("  flushes:           {}", stats.flushes);
    println!("  flushed:           {}", stats.events_flushed);
    println!("  dispatched:        {}", stats.events_dispatched);
    println!("  middleware panics: {}", stats.middleware_failures);
    println!("  plugin failures:   {}", stats.plugin_failures);
    println!("  load failures:     {}", stats.load_failures);
}
