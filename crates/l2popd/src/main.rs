//! l2popd entry point.
//!
//! Replays a JSON-lines stream of lifecycle events through the population
//! service and logs every notification it would deliver to the agents.

use anyhow::Context;
use clap::Parser;
use l2popd::{
    ChannelNotifier, DiffEngine, Dispatcher, L2PopConfig, L2PopDriver, L2PopService,
    LifecycleEvent, LogTransport, MemoryTopology,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

/// L2 population daemon
#[derive(Parser, Debug)]
#[command(name = "l2popd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = l2popd::config_file::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Event stream to replay, one JSON event per line ("-" for stdin)
    #[arg(short = 'e', long, default_value = "-")]
    events: String,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match L2PopConfig::load_or_default(&args.config).and_then(|c| {
        c.validate()?;
        Ok(c)
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("l2popd: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    if let Err(e) = init_logging(&level, config.logging.json) {
        eprintln!("l2popd: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!(
        config = %args.config.display(),
        topic = %config.fanout_topic(),
        "l2popd: Starting"
    );

    match run(args, config).await {
        Ok(()) => {
            info!("l2popd: Exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "l2popd: Exiting with error");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log filter {:?}", level))?,
    };

    let layer = fmt::layer().with_target(true).with_line_number(true);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(layer.json()).try_init()?;
    } else {
        registry.with(layer.compact()).try_init()?;
    }
    Ok(())
}

async fn run(args: Args, config: L2PopConfig) -> anyhow::Result<()> {
    let (notifier, rx) = ChannelNotifier::new();
    let dispatcher = Dispatcher::new(LogTransport, config.dispatcher.topic_prefix.clone());
    let dispatch_task = tokio::spawn(dispatcher.run(rx));

    let store = Arc::new(MemoryTopology::with_agent_types(
        config.l2pop.supported_agent_types.iter().cloned(),
    ));
    let driver = L2PopDriver::new(
        DiffEngine::new(config.agent_boot_time()),
        Arc::new(notifier),
    );
    let service = L2PopService::new(store, Arc::new(driver));

    let replayed = if args.events == "-" {
        replay(&service, BufReader::new(tokio::io::stdin())).await?
    } else {
        let file = tokio::fs::File::open(&args.events)
            .await
            .with_context(|| format!("failed to open event stream {}", args.events))?;
        replay(&service, BufReader::new(file)).await?
    };

    // Dropping the service closes the notification channel.
    drop(service);
    let counts = dispatch_task.await.context("dispatcher task failed")?;

    info!(
        events = replayed,
        unicast = counts.unicast,
        fanout = counts.fanout,
        failed = counts.failed,
        "l2popd: Replay complete"
    );
    Ok(())
}

async fn replay<R>(service: &L2PopService<MemoryTopology>, reader: R) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0;
    let mut line_no = 0;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read event stream")?,
            _ = signal::ctrl_c() => {
                info!("l2popd: Received SIGINT, stopping replay");
                break;
            }
        };
        let Some(line) = line else { break };
        line_no += 1;

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event = match LifecycleEvent::from_json(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "l2popd: Skipping malformed event");
                continue;
            }
        };

        match service.handle(event).await {
            Ok(_) => handled += 1,
            Err(e) => warn!(line = line_no, error = %e, "l2popd: Event rejected"),
        }
    }

    Ok(handled)
}
