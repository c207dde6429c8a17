//! chat-client: Kafka chat participant
//!
//! Waits for the chat topic, prints every message on it and publishes each
//! line typed on stdin, tagged with the participant identity.
//!
//! ## Configuration
//! - CLIENT_ID: participant identity (random UUID when unset)
//! - CHATBUS_CONFIG / --config: YAML configuration file
//! - CHATBUS__*: per-field overrides (e.g. CHATBUS__BOOTSTRAP_SERVERS)
//! - CHATBUS_LOG: tracing filter (default: warn)

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use chatbus::bus::{KafkaBus, KafkaBusConfig, OffsetPolicy};
use chatbus::console::{Console, StdConsole};
use chatbus::identity::{Identity, Role};
use chatbus::sink::ConsoleSink;
use chatbus::utils::bootstrap::init_tracing;
use chatbus::{ChatConfig, Session};

#[derive(Parser, Debug)]
#[command(name = "chat-client", about = "Join the Kafka chat")]
struct Args {
    /// Start position for a new consumer group: `beginning` replays history,
    /// anything else starts at new messages.
    #[arg(long)]
    from: Option<String>,

    /// Path to a YAML configuration file.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    let console: Arc<dyn Console> = Arc::new(StdConsole);

    let config = match ChatConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            console.line(&format!("❌ {}", e));
            return ExitCode::FAILURE;
        }
    };

    let bus = match KafkaBus::new(KafkaBusConfig::from_config(&config)) {
        Ok(bus) => bus,
        Err(e) => {
            error!(error = %e, "Failed to create Kafka clients");
            console.line(&format!("❌ {}", e));
            return ExitCode::FAILURE;
        }
    };

    let offset = OffsetPolicy::from_flag(args.from.as_deref());
    let identity = Identity::resolve(Role::Participant);
    let session = Session::new(config, Role::Participant, offset, identity, console.clone());

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let sink_console = console.clone();
    match session
        .run(&bus, &mut input, move || Ok(ConsoleSink::new(sink_console)))
        .await
    {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) if e.is_declined() => {
            info!(reason = %e, "Chat client stopped at operator request");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Chat session ended with an error");
            console.line(&format!("❌ {}", e));
            ExitCode::FAILURE
        }
    }
}
