//! broker-handler: auditing chat participant
//!
//! Creates the chat topic on confirmation, records every message on it to
//! `<audit_dir>/audit-<epoch-millis>.log` together with a host load sample,
//! and broadcasts lines typed on stdin as `[broker] ...`.
//!
//! ## Configuration
//! - CHATBUS_CONFIG / --config: YAML configuration file
//! - CHATBUS__*: per-field overrides (e.g. CHATBUS__AUDIT_DIR)
//! - CHATBUS_LOG: tracing filter (default: warn)

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use chatbus::bus::{KafkaBus, KafkaBusConfig, OffsetPolicy};
use chatbus::console::{Console, StdConsole};
use chatbus::identity::{Identity, Role};
use chatbus::sink::{AuditSink, FileAuditWriter, ProcLoadSampler};
use chatbus::utils::bootstrap::init_tracing;
use chatbus::{ChatConfig, Session};

#[derive(Parser, Debug)]
#[command(name = "broker-handler", about = "Audit and broadcast on the Kafka chat")]
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
        Err(e) => return startup_failed(console.as_ref(), &e),
    };

    let bus = match KafkaBus::new(KafkaBusConfig::from_config(&config)) {
        Ok(bus) => bus,
        Err(e) => return startup_failed(console.as_ref(), &e),
    };

    let audit_dir = config.audit_dir.clone();
    let offset = OffsetPolicy::from_flag(args.from.as_deref());
    let session = Session::new(
        config,
        Role::Auditor,
        offset,
        Identity::resolve(Role::Auditor),
        console.clone(),
    );

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let sink_console = console.clone();
    let result = session
        .run(&bus, &mut input, move || {
            let writer = FileAuditWriter::create(&audit_dir)?;
            Ok(AuditSink::new(
                writer,
                ProcLoadSampler::default(),
                sink_console,
            ))
        })
        .await;

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) if e.is_declined() => {
            info!(reason = %e, "Broker stopped at operator request");
            ExitCode::FAILURE
        }
        Err(e) => startup_failed(console.as_ref(), &e),
    }
}

fn startup_failed(console: &dyn Console, e: &dyn std::error::Error) -> ExitCode {
    error!(error = %e, "Broker failed to start");
    console.line(&format!("❌ Broker failed to start: {}", e));
    ExitCode::FAILURE
}
