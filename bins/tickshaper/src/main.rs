use std::io::BufRead;
use std::process::ExitCode;
use tickshaper_config::Config;
use tickshaper_engine::Engine;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tickshaper.conf".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("failed to load '{config_path}': {error}");
            return ExitCode::from(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!(%config_path, "tickshaper starting");

    let mut engine = match Engine::init(config) {
        Ok(engine) => engine,
        Err(error) => {
            error!(%error, "initialization failed");
            return ExitCode::from(1);
        }
    };
    engine.start();

    console(&engine);

    engine.stop();
    info!("shutdown complete");
    ExitCode::SUCCESS
}

/// Operator console on stdin. EOF behaves like `quit`.
fn console(engine: &Engine) {
    println!("commands: speed <multiplier>, throttle <rate>, reset, metrics, quit");

    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("quit") | Some("q") => break,
            Some("speed") => match parts.next().and_then(|v| v.parse::<f64>().ok()) {
                Some(speed) => {
                    if let Err(error) = engine.set_replay_speed(speed) {
                        println!("{error}");
                    }
                }
                None => println!("invalid speed value"),
            },
            Some("throttle") => match parts.next().and_then(|v| v.parse::<u32>().ok()) {
                Some(rate) => {
                    if let Err(error) = engine.set_throttle_rate(rate) {
                        println!("{error}");
                    }
                }
                None => println!("invalid throttle rate"),
            },
            Some("reset") => {
                engine.reset_counters();
                println!("counters reset");
            }
            Some("metrics") => print_metrics(engine),
            Some(other) => println!("unknown command: {other}"),
            None => {}
        }
    }
}

fn print_metrics(engine: &Engine) {
    let snap = engine.metrics().snapshot();
    let (position, estimate) = engine.feed_progress();

    println!("=== tickshaper metrics ===");
    println!("messages processed : {}", snap.messages_processed);
    println!("messages throttled : {}", snap.messages_throttled);
    println!("throughput         : {} msg/s", snap.current_throughput);
    println!("queue depth        : {}", snap.queue_depth);
    println!("avg latency        : {:.2} us", snap.avg_latency_us());
    println!("cpu usage          : {:.1} %", snap.cpu_usage_percent);
    println!(
        "memory usage       : {} MB",
        snap.memory_usage_bytes / 1024 / 1024
    );
    println!("uptime             : {} s", snap.uptime_seconds);
    let (add, exec, trade, cancel) = engine.processor().counters().snapshot();
    println!("accepted           : {add} add / {exec} exec / {trade} trade / {cancel} cancel");
    println!("active orders      : {}", engine.book().len());
    println!("symbols interned   : {}", engine.symbols().len());
    println!("feed position      : {position} / ~{estimate}");
    println!("shm segment        : {}", engine.ring_segment());
    if snap.microburst_active {
        println!("*** microburst active ***");
    }
    for event in engine.recent_bursts().iter().rev().take(3) {
        println!(
            "burst: {} ms, peak {} msg/s, severity {}",
            event.end_time_ms - event.start_time_ms,
            event.peak_rate_msg_per_s,
            event.severity.as_str()
        );
    }
    println!("==========================");
}
