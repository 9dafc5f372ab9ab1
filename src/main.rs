//! ttlkit chat gate
//!
//! Reads `<participant> <message>` lines from stdin and prints one JSON
//! verdict per line. Messages starting with `/` are commands and go through
//! the cooldown gate; everything else goes through antiflood and antispam.

use std::io::BufRead;

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use ttlkit::config::Config;
use ttlkit::guards::{ActionGate, FloodGuard, SpamGuard};
use ttlkit::scheduler::Schedulers;
use ttlkit::utils::format_duration;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// One line of output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Event {
    Allowed {
        participant: String,
    },
    Blocked {
        participant: String,
        reason: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_in: Option<String>,
    },
    Ready {
        participant: String,
    },
}

/// All guards, keyed by participant name.
struct ChatGate {
    flood: FloodGuard<String>,
    spam: SpamGuard<String>,
    commands: ActionGate<String>,
    events: UnboundedSender<Event>,
}

impl ChatGate {
    fn new(config: &Config, schedulers: &Schedulers, events: UnboundedSender<Event>) -> anyhow::Result<Self> {
        Ok(Self {
            flood: FloodGuard::new(&config.guards)?,
            spam: SpamGuard::new(&config.guards)?,
            commands: ActionGate::new(schedulers, &config.guards)?,
            events,
        })
    }

    /// Judge one input line. Returns `None` for lines without a message.
    fn handle_line(&self, line: &str) -> Option<Event> {
        let Some((participant, text)) = line.trim().split_once(char::is_whitespace) else {
            warn!("Ignoring line without a message: {:?}", line);
            return None;
        };
        let participant = participant.to_string();
        let text = text.trim();

        if text.starts_with('/') {
            let events = self.events.clone();
            let remaining = self.commands.check(participant.clone(), move |who: &String| {
                let _ = events.send(Event::Ready {
                    participant: who.clone(),
                });
            });
            return Some(match remaining {
                Some(left) => Event::Blocked {
                    participant,
                    reason: "cooldown",
                    retry_in: Some(format_duration(left)),
                },
                None => Event::Allowed { participant },
            });
        }

        if self.flood.check(participant.clone()) {
            return Some(Event::Blocked {
                participant,
                reason: "flood",
                retry_in: None,
            });
        }

        if self.spam.check(participant.clone(), text) {
            return Some(Event::Blocked {
                participant,
                reason: "spam",
                retry_in: None,
            });
        }

        Some(Event::Allowed { participant })
    }
}

fn emit(event: &Event) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ttlkit=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting ttlkit chat gate...");

    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.guards);

    let schedulers = Schedulers::current()?;
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let gate = ChatGate::new(&config, &schedulers, events_tx)?;

    // Stdin is read on a plain thread so shutdown never waits on it.
    let (lines_tx, mut lines_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if lines_tx.send(line).is_err() {
                break;
            }
        }
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines_rx.recv() => match line {
                Some(line) => {
                    if let Some(event) = gate.handle_line(&line?) {
                        emit(&event)?;
                    }
                }
                None => {
                    debug!("Stdin closed");
                    break;
                }
            },
            Some(event) = events_rx.recv() => emit(&event)?,
            _ = &mut shutdown => {
                info!("Ctrl-C received");
                break;
            }
        }
    }

    info!("Chat gate stopped");
    Ok(())
}
