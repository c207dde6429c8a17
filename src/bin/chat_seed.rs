//! chat-seed: publish a batch of numbered test messages
//!
//! Sends `message-1` .. `message-N` with no key, flushes and exits. Useful to
//! give a `--from beginning` participant some history to replay.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use chatbus::bus::{ChatBus, KafkaBus, KafkaBusConfig, Publisher};
use chatbus::utils::bootstrap::init_tracing;
use chatbus::ChatConfig;

#[derive(Parser, Debug)]
#[command(name = "chat-seed", about = "Publish numbered test messages")]
struct Args {
    /// Number of messages to send.
    #[arg(long, default_value_t = 5)]
    count: usize,

    /// Destination topic.
    #[arg(long, default_value = "test-topic")]
    topic: String,

    /// Path to a YAML configuration file.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match seed(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Seeding failed");
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn seed(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = ChatConfig::load(args.config.as_deref())?;
    let bus = KafkaBus::new(KafkaBusConfig::from_config(&config))?;
    let publisher = bus.publisher().await?;

    for n in 1..=args.count {
        let value = format!("message-{}", n);
        if let Err(e) = publisher.send(&args.topic, None, &value).await {
            error!(topic = %args.topic, error = %e, "Failed to publish");
        } else {
            println!("Sent: {}", value);
        }
    }

    publisher.close().await?;
    info!(topic = %args.topic, count = args.count, "Seed complete");
    Ok(())
}
