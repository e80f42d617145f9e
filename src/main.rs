use chrono::Local;
use clap::Parser;
use log::{error, info, warn};
use popin_call::config::BASE_URL_ENV;
use popin_call::{AcceptanceEvent, ChannelListener, ClientConfig, PopinClient};
use popin_ureq_http_client::UreqHttpClient;
use std::collections::BTreeMap;
use std::sync::Arc;

// Demo of the call acceptance flow against a Popin API server.
//
// Usage:
//   cargo run -- --seller-id 12 --name Ana --contact ana@popin.to
//   cargo run -- --seller-id 12 --name Ana --contact +491512345678 --campaign utm_source=ads
//   cargo run -- --call-queue-id 42            # only wait on an existing queue entry

#[derive(Debug, Parser)]
#[command(name = "popin-call", about = "Register, join the call queue and wait for an agent")]
struct Args {
    /// Seller to connect to.
    #[arg(long, short = 's', default_value_t = 0)]
    seller_id: i64,

    #[arg(long, short = 'n', default_value = "")]
    name: String,

    /// Email address or mobile number.
    #[arg(long, short = 'c', default_value = "")]
    contact: String,

    /// Campaign attributes as key=value, repeatable.
    #[arg(long, value_parser = parse_key_value)]
    campaign: Vec<(String, String)>,

    /// API root. Falls back to POPIN_BASE_URL, then the dev server.
    #[arg(long)]
    base_url: Option<String>,

    /// Skip registration and connection; wait on this queue entry.
    #[arg(long)]
    call_queue_id: Option<i64>,

    #[arg(long)]
    sandbox: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(async {
        let mut config = ClientConfig::from_env().with_sandbox_mode(args.sandbox);
        if let Some(base_url) = &args.base_url {
            config = config.with_base_url(base_url.clone());
        }
        info!("Using API at {} (override with --base-url or {BASE_URL_ENV})", config.base_url);

        let client = PopinClient::new(config, Arc::new(UreqHttpClient::new()));

        let call_queue_id = match args.call_queue_id {
            Some(id) => id,
            None => {
                let campaign: BTreeMap<String, String> = args.campaign.iter().cloned().collect();
                if let Err(e) = client
                    .register_user(args.seller_id, &args.name, &args.contact, &campaign)
                    .await
                {
                    error!("Registration failed: {e}");
                    return;
                }
                match client.start_connection(args.seller_id).await {
                    Ok(id) => id,
                    Err(e) => {
                        error!("Could not join the call queue: {e}");
                        return;
                    }
                }
            }
        };

        let (listener, mut events) = ChannelListener::new();
        let handler = client.wait_for_acceptance(&listener);
        handler.start(call_queue_id);

        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, leaving the queue");
                    handler.stop();
                    break;
                }
            };
            let Some(event) = event else { break };

            match event {
                AcceptanceEvent::QueuePositionChanged(position) => {
                    info!("Position in queue: {position}");
                }
                AcceptanceEvent::CallAccepted(call_id) => {
                    info!("Call {call_id} accepted by an agent");
                    match client.get_call_details(call_id).await {
                        Ok(details) => info!("Room {:?} on {:?}", details.room, details.websocket),
                        Err(e) => error!("Failed to fetch call details: {e}"),
                    }
                    // No media stack here, so hang up right away.
                    if let Err(e) = client.end_call(call_id).await {
                        warn!("Could not end call {call_id}: {e}");
                    }
                }
                AcceptanceEvent::CallMissed => warn!("No agent picked up the call"),
            }
            if event.is_terminal() {
                break;
            }
        }
    });
}
