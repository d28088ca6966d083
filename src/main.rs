use callwait::config::{CallConfig, DEFAULT_APP_ID, DEFAULT_SERVER_URL, DEFAULT_USER_ID};
use callwait::machine::MachineState;
use callwait::{
    CallSessionMachine, HttpTokenProvider, LoggingTonePlayer, RingtoneController, SignalingClient,
};
use callwait_core::types::PeerId;
use callwait_tokio_transport::TokioWebSocketTransportFactory;
use callwait_ureq_http_client::UreqHttpClient;
use chrono::Local;
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

// Waits for calls as the given user and prints state changes.
//
// Usage:
//   cargo run                                  # default server, user "doctor"
//   cargo run -- --user dr-smith               # different identity
//   cargo run -- --server http://127.0.0.1:3000 --no-reconnect
//
// While running, type `a` to accept, `r` to reject or `h` to hang up.

#[derive(Parser, Debug)]
#[command(about = "Wait for incoming calls on the rendezvous server")]
struct Args {
    /// Rendezvous server base URL
    #[arg(long, default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// Identity to register with
    #[arg(short, long, default_value = DEFAULT_USER_ID)]
    user: String,

    /// Video application id handed to the call view
    #[arg(long, default_value = DEFAULT_APP_ID)]
    app_id: String,

    #[arg(long, default_value_t = 10)]
    token_timeout_secs: u64,

    /// Exit instead of reconnecting when the connection drops
    #[arg(long)]
    no_reconnect: bool,
}

impl Args {
    fn into_config(self) -> CallConfig {
        let mut config = CallConfig {
            server_url: self.server,
            user_id: PeerId::new(self.user),
            app_id: self.app_id,
            token_timeout: Duration::from_secs(self.token_timeout_secs),
            ..Default::default()
        };
        config.reconnect.enabled = !self.no_reconnect;
        config
    }
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

    rt.block_on(run(args.into_config()));
}

async fn run(config: CallConfig) {
    let transport_factory = Arc::new(TokioWebSocketTransportFactory::new());
    let http_client = Arc::new(UreqHttpClient::new());
    let tokens = Arc::new(HttpTokenProvider::new(
        config.server_url.clone(),
        http_client,
    ));

    let (client, inbound) = SignalingClient::new(config.clone(), transport_factory);
    let (machine, calls) = CallSessionMachine::new(
        &config,
        RingtoneController::new(Arc::new(LoggingTonePlayer::default())),
        client.clone(),
        tokens,
    );
    let machine_task = machine.spawn();
    let forward_task = calls.forward_inbound(inbound);

    let signaling_task = tokio::spawn({
        let client = client.clone();
        async move { client.run().await }
    });

    let mut states = calls.watch_state();
    let app_id = config.app_id.clone();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            match &state {
                MachineState::Idle => println!("Waiting for calls..."),
                MachineState::Ringing(offer) => {
                    println!("Incoming call from {}", offer.display_name());
                    if let Some(symptoms) = &offer.symptoms {
                        println!("  symptoms: {symptoms}");
                    }
                    println!("  [a]ccept / [r]eject");
                }
                MachineState::Connecting(offer) => {
                    println!("Connecting to {}...", offer.display_name())
                }
                MachineState::InCall(session) => {
                    match serde_json::to_string_pretty(&session.connection_data(&app_id)) {
                        Ok(json) => println!("In call, connection data:\n{json}"),
                        Err(e) => warn!("Failed to render connection data: {e}"),
                    }
                    println!("  [h]ang up");
                }
            }
        }
    });

    info!("Waiting for calls as {}", config.user_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        // stdin closed; keep serving until interrupted.
                        let _ = tokio::signal::ctrl_c().await;
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {e}");
                        break;
                    }
                };
                let result = match line.trim() {
                    "a" => calls.accept().await,
                    "r" => calls.reject().await,
                    "h" => calls.hang_up().await,
                    "" => Ok(()),
                    other => {
                        println!("Unknown command {other:?}");
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    error!("{e}");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    client.disconnect().await;
    if let Err(e) = signaling_task.await {
        warn!("Signaling task ended abnormally: {e}");
    }
    forward_task.abort();
    drop(calls);
    let _ = machine_task.await;
}
