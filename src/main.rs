//! CLI for sensorstream
//!
//! Subcommands:
//! - `run`: broker, consumer and ingest server until Ctrl-C, optionally fed by demo sensors
//! - `simulate`: publish a fixed number of demo readings, process them, print the counters

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info, warn};

use sensorstream::broker::Broker;
use sensorstream::config::{Settings, load_config, load_config_from};
use sensorstream::consumer::{ConsumerCounters, StreamingConsumer};
use sensorstream::persistence::{PersistenceSink, SledSink};
use sensorstream::rules::RuleEngine;
use sensorstream::simulator::SensorSimulator;
use sensorstream::transport::websocket;
use sensorstream::utils::error::{ConsumerError, PipelineError};
use sensorstream::utils::logging;

#[derive(Parser)]
#[command(name = "sensorstream", about = "In-memory IoT streaming pipeline")]
struct Cli {
    /// Base configuration file (extension optional); defaults to config/default
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline until interrupted
    Run {
        /// Number of demo sensors publishing in-process (0 disables the simulator)
        #[arg(long, default_value_t = 0)]
        demo_sensors: usize,

        /// Delay between demo publishing rounds, in milliseconds
        #[arg(long, default_value_t = 1000)]
        demo_interval_ms: u64,
    },
    /// Publish COUNT demo readings as fast as possible and process them
    Simulate {
        #[arg(long, default_value_t = 100)]
        count: usize,

        #[arg(long, default_value_t = 5)]
        sensors: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Use a throwaway store instead of the configured path
        #[arg(long)]
        ephemeral: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    let result = match cli.command {
        Command::Run {
            demo_sensors,
            demo_interval_ms,
        } => run(settings, demo_sensors, Duration::from_millis(demo_interval_ms)).await,
        Command::Simulate {
            count,
            sensors,
            seed,
            ephemeral,
        } => simulate(settings, count, sensors, seed, ephemeral).await,
    };

    if let Err(e) = result {
        error!("Pipeline failed: {e}");
        std::process::exit(1);
    }
}

struct Pipeline {
    broker: Arc<Broker>,
    consumer: Arc<StreamingConsumer>,
    worker: JoinHandle<Result<ConsumerCounters, ConsumerError>>,
}

fn start_pipeline(settings: &Settings, sink: Arc<dyn PersistenceSink>) -> Result<Pipeline, PipelineError> {
    let rules = RuleEngine::from_settings(settings.rules.as_deref())?;
    let broker = Arc::new(Broker::with_settings(&settings.broker));
    broker.create_topic(&settings.consumer.topic);

    let consumer = Arc::new(StreamingConsumer::new(
        Arc::clone(&broker),
        sink,
        rules,
        &settings.consumer,
    ));
    let worker = Arc::clone(&consumer).spawn()?;

    Ok(Pipeline {
        broker,
        consumer,
        worker,
    })
}

async fn finish(pipeline: Pipeline) -> Result<ConsumerCounters, PipelineError> {
    pipeline.consumer.stop();
    let joined = tokio::task::spawn_blocking(move || pipeline.worker.join())
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))?;
    match joined {
        Ok(result) => Ok(result?),
        Err(_) => Err(PipelineError::Worker("consumer thread panicked".to_string())),
    }
}

async fn run(settings: Settings, demo_sensors: usize, demo_interval: Duration) -> Result<(), PipelineError> {
    let sink: Arc<dyn PersistenceSink> = Arc::new(SledSink::open(&settings.persistence.path)?);

    let listener = if settings.server.enabled {
        let addr = format!("{}:{}", settings.server.host, settings.server.port);
        Some(websocket::bind(&addr).await?)
    } else {
        None
    };

    let pipeline = start_pipeline(&settings, sink)?;

    if let Some(listener) = listener {
        tokio::spawn(websocket::serve(listener, Arc::clone(&pipeline.broker)));
    }

    let stop_simulator = Arc::new(AtomicBool::new(false));
    let simulator = (demo_sensors > 0).then(|| {
        let broker = Arc::clone(&pipeline.broker);
        let stop = Arc::clone(&stop_simulator);
        let topic = settings.consumer.topic.clone();
        thread::Builder::new().name("simulator".to_string()).spawn(move || {
            let seed = chrono::Utc::now().timestamp_millis() as u64;
            SensorSimulator::with_fleet(demo_sensors, seed).run(&broker, &topic, demo_interval, &stop)
        })
    });
    let simulator = simulator.transpose()?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received. Stopping pipeline."),
        Err(e) => error!("Failed to listen for shutdown signal: {e}"),
    }

    stop_simulator.store(true, Ordering::SeqCst);
    if let Some(handle) = simulator {
        if handle.join().is_err() {
            warn!("Simulator thread panicked");
        }
    }

    finish(pipeline).await?;
    Ok(())
}

async fn simulate(
    settings: Settings,
    count: usize,
    sensors: usize,
    seed: u64,
    ephemeral: bool,
) -> Result<(), PipelineError> {
    let sink: Arc<dyn PersistenceSink> = if ephemeral {
        Arc::new(SledSink::temporary()?)
    } else {
        Arc::new(SledSink::open(&settings.persistence.path)?)
    };
    let pipeline = start_pipeline(&settings, sink)?;

    let broker = Arc::clone(&pipeline.broker);
    let topic = settings.consumer.topic.clone();
    let report = tokio::task::spawn_blocking(move || {
        SensorSimulator::with_fleet(sensors, seed).publish_batch(&broker, &topic, count)
    })
    .await
    .map_err(|e| PipelineError::Worker(e.to_string()))?;

    let deadline = Instant::now() + Duration::from_secs(30);
    while pipeline.consumer.counters().processed < report.accepted as u64 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let stats = pipeline.broker.get_stats();
    let counters = finish(pipeline).await?;

    let summary = json!({
        "published": report,
        "consumer": counters,
        "broker": stats,
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(text) => println!("{text}"),
        Err(e) => error!("Failed to render summary: {e}"),
    }
    Ok(())
}
