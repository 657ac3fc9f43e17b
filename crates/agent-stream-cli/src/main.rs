//! Send one message to the agent pipeline and follow its progress.

mod render;

use std::process::ExitCode;
use std::time::Duration;

use agent_stream::config::{DEFAULT_ENDPOINT, DEFAULT_USER_ID};
use agent_stream::observability::init_observability;
use agent_stream::prelude::*;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "agent-stream", about = "Stream an agent pipeline run and print what it did")]
struct Cli {
    /// Question sent to the pipeline.
    message: String,

    /// Stream endpoint URL.
    #[arg(long, env = "AGENT_STREAM_URL", default_value = DEFAULT_ENDPOINT)]
    url: String,

    /// User id sent with the request.
    #[arg(long, env = "AGENT_STREAM_USER_ID", default_value = DEFAULT_USER_ID)]
    user_id: String,

    /// Give up after this many seconds.
    #[arg(long, env = "AGENT_STREAM_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Print the final result as JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(self.url.clone()).user_id(self.user_id.clone());
        match self.timeout_secs {
            Some(secs) => config.request_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_observability();
    let cli = Cli::parse();

    let client = match StreamClient::new(cli.client_config()) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("agent-stream: {err}");
            return ExitCode::from(2);
        }
    };

    let mut session = client.start(cli.message.clone()).await;
    let abort = session.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling session");
            abort.abort();
        }
    });

    let mut printed = 0;
    while let Some(update) = session.next_update().await {
        let (SessionUpdate::Progress { snapshot, .. } | SessionUpdate::Finished { snapshot, .. }) =
            update
        else {
            continue;
        };
        for line in &snapshot.narrative[printed..] {
            println!("[{:>3}%] {line}", snapshot.progress.percentage);
        }
        printed = snapshot.narrative.len();
    }

    let snapshot = match session.finish().await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            eprintln!("agent-stream: {err}");
            return ExitCode::FAILURE;
        }
    };
    let Some(result) = snapshot.final_result else {
        eprintln!("agent-stream: session finished without a result");
        return ExitCode::FAILURE;
    };

    if cli.json {
        match serde_json::to_string_pretty(result.as_value()) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                eprintln!("agent-stream: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!();
        print!("{}", render::summary(&result));
    }

    if result.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
