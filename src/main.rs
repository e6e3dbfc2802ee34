use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use dormat::model::now_ms;
use dormat::scheduler;
use dormat::service::RoomStatusService;
use dormat::tenant::{DormId, TenantManager};

#[derive(Parser)]
#[command(name = "dormat", about = "Dormitory room-occupancy engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler daemon (daily boundary pass + weekly full sweep).
    Serve,
    /// One full drift-correcting sweep, now.
    Sweep {
        /// Limit to one dormitory.
        #[arg(long)]
        dorm: Option<String>,
        /// Print occupancy stats afterwards.
        #[arg(long)]
        stats: bool,
    },
    /// One daily boundary pass, now.
    Daily {
        #[arg(long)]
        dorm: Option<String>,
        #[arg(long)]
        stats: bool,
    },
    /// Occupancy stats for one dormitory, as JSON.
    Stats {
        #[arg(long)]
        dorm: String,
    },
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let metrics_port: Option<u16> = std::env::var("DORMAT_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    dormat::observability::init(metrics_port);

    let data_dir = std::env::var("DORMAT_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let compact_threshold: u64 = env_parse("DORMAT_COMPACT_THRESHOLD", 1000);
    let daily_hour: u32 = env_parse("DORMAT_DAILY_HOUR", 3).min(23);
    let show_stats = std::env::var("DORMAT_SHOW_STATS").is_ok();

    std::fs::create_dir_all(&data_dir)?;
    let tenants = Arc::new(TenantManager::new(
        PathBuf::from(&data_dir),
        compact_threshold,
    ));
    let service = RoomStatusService::new(tenants);

    match cli.command {
        Command::Serve => {
            info!("dormat scheduler running");
            info!("  data_dir: {data_dir}");
            info!("  daily sync: {daily_hour:02}:00 UTC");
            info!(
                "  metrics: {}",
                metrics_port.map_or("disabled".to_string(), |p| format!(
                    "http://0.0.0.0:{p}/metrics"
                ))
            );

            tokio::spawn(scheduler::run_daily_sync(
                service.clone(),
                daily_hour,
                show_stats,
            ));
            tokio::spawn(scheduler::run_weekly_sweep(service, show_stats));

            // Park until SIGTERM/ctrl-c; the loops are fire-and-forget.
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut sigterm =
                    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                        .expect("failed to register SIGTERM handler");
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                ctrl_c.await.ok();
            }
            info!("dormat stopped");
        }
        Command::Sweep { dorm, stats } => {
            let changed = match dorm {
                Some(name) => {
                    let dorm = DormId::new(&name)?;
                    let ids = service.update_all_rooms_for_tenant(&dorm).await;
                    println!("{dorm}: {} room(s) corrected", ids.len());
                    vec![(dorm, ids)]
                }
                None => {
                    let map = service.update_all_rooms().await;
                    let mut pairs: Vec<_> = map.into_iter().collect();
                    pairs.sort_by(|a, b| a.0.cmp(&b.0));
                    for (dorm, ids) in &pairs {
                        println!("{dorm}: {} room(s) corrected", ids.len());
                    }
                    pairs
                }
            };
            if stats {
                for (dorm, _) in &changed {
                    let s = service.occupancy_stats(dorm).await;
                    println!("{dorm}: {}", serde_json::to_string(&s)?);
                }
            }
        }
        Command::Daily { dorm, stats } => {
            let scope = dorm.as_deref().map(DormId::new).transpose()?;
            let report = service.daily_status_changes(scope.as_ref(), now_ms()).await;
            println!("{}", serde_json::to_string(&report)?);
            if stats {
                for dorm in scope.map(|d| vec![d]).unwrap_or_else(|| service.dorms()) {
                    let s = service.occupancy_stats(&dorm).await;
                    println!("{dorm}: {}", serde_json::to_string(&s)?);
                }
            }
        }
        Command::Stats { dorm } => {
            let dorm = DormId::new(&dorm)?;
            let s = service.occupancy_stats(&dorm).await;
            println!("{}", serde_json::to_string_pretty(&s)?);
        }
    }

    Ok(())
}
