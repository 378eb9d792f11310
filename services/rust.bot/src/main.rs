mod executor;

use clap::Parser;
use log::{error, info, warn};
use std::io::Write;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "warden", about = "Warden scheduler service")]
struct CmdArgs {
    /// Path to the config file, overrides WARDEN_CONFIG_FILE
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = CmdArgs::parse();

    if let Some(config_file) = args.config {
        std::env::set_var("WARDEN_CONFIG_FILE", config_file);
    }

    // Setup logging
    let debug_mode = std::env::var("DEBUG").unwrap_or_default() == "true";
    let debug_opts = std::env::var("DEBUG_OPTS").unwrap_or_default();

    let mut env_builder = env_logger::builder();

    let default_filter =
        "warden_bot=info,scheduler=info,persist=info,config=info,bot_modules_moderation=info"
            .to_string();

    env_builder
        .format(move |buf, record| {
            writeln!(
                buf,
                "({}) {} - {}",
                record.target(),
                record.level(),
                record.args()
            )
        })
        .parse_filters(&default_filter)
        .filter(None, log::LevelFilter::Info);

    // Set custom log levels
    for opt in debug_opts.split(',') {
        let opt = opt.trim();

        if opt.is_empty() {
            continue;
        }

        let (target, level) = if opt.contains('=') {
            let mut split = opt.split('=');
            let target = split.next().unwrap();
            let level = split.next().unwrap();
            (target, level)
        } else {
            (opt, "debug")
        };

        let level = match level {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => {
                error!("Invalid log level: {}", level);
                continue;
            }
        };

        env_builder.filter(Some(target), level);
    }

    if debug_mode {
        env_builder.filter(None, log::LevelFilter::Debug);
    }

    env_builder.init();

    info!("Starting {}", config::CONFIG.meta.bot_name);

    let store = match persist::JsonGuildStore::new(&config::CONFIG.data.guilds_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(
                "Could not open guild store at {}: {}",
                config::CONFIG.data.guilds_dir, e
            );
            std::process::exit(1);
        }
    };

    // All modules must register their task kinds before any guild is
    // resumed, or resumed tasks cannot resolve their handlers
    let registry = Arc::new(scheduler::TaskRegistry::new());
    bot_modules_moderation::register_task_kinds(&registry, Arc::new(executor::LogExecutor));

    let sched = scheduler::Scheduler::new(
        registry,
        store.clone(),
        std::time::Duration::from_secs(config::CONFIG.scheduler.tick_interval_secs),
    );

    match store.list_guilds() {
        Ok(guilds) => {
            info!("Resuming scheduled tasks for {} guild(s)", guilds.len());

            for guild_id in guilds {
                match sched.resume_guild(guild_id).await {
                    Ok(tasks) => {
                        if tasks.is_empty() {
                            continue;
                        }

                        let earliest = tasks.iter().map(|t| t.date()).min();
                        info!(
                            "Resumed {} task(s) for guild {} (earliest due {:?})",
                            tasks.len(),
                            guild_id,
                            earliest
                        );
                    }
                    Err(e) => warn!("Could not resume guild {}: {}", guild_id, e),
                }
            }
        }
        Err(e) => warn!("Could not list guilds: {}", e),
    }

    let runner = {
        let sched = sched.clone();
        tokio::spawn(async move { sched.run().await })
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(e) => error!("Could not listen for shutdown signal: {}", e),
    }

    sched.shutdown().await;

    if let Err(e) = runner.await {
        error!("Scheduler loop join error: {}", e);
    }
}
