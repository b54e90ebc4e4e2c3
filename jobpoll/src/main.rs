use clap::{Args, Parser, Subcommand};
use futures::future::join_all;
use jobpoll::{utils, ApiClient, AsyncJobPoller, JobId, PollInterval, PollerConfig};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "Track asynchronous jobs of the management API", long_about = None)]
struct Cli {
    /// Management API endpoint, e.g. http://mgmt:8080/client/api
    #[arg(long, global = true)]
    api_url: Option<Url>,

    /// Session key sent with every request
    #[arg(long, global = true)]
    session_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wait for existing jobs to finish
    Watch {
        /// Job ids to poll
        #[arg(required = true)]
        job_ids: Vec<String>,

        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Submit an asynchronous command and wait for its job
    Submit {
        /// API command name, e.g. deployVirtualMachine
        command: String,

        /// Command parameter as key=value
        #[arg(short, long = "param", value_parser = utils::parse_param)]
        params: Vec<(String, String)>,

        #[command(flatten)]
        wait: WaitArgs,
    },
}

#[derive(Args, Debug)]
struct WaitArgs {
    /// Poll interval in milliseconds
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Write successful results to this JSON file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,jobpoll=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = PollerConfig::from_env()?;
    if let Some(url) = cli.api_url {
        config.api_url = Some(url);
    }
    if let Some(key) = cli.session_key {
        config.session_key = Some(key);
    }

    let client = ApiClient::from_config(&config)?;

    let (job_ids, wait) = match cli.command {
        Command::Watch { job_ids, wait } => {
            (job_ids.into_iter().map(JobId::from).collect::<Vec<_>>(), wait)
        }
        Command::Submit {
            command,
            params,
            wait,
        } => {
            let job_id = client.submit_command(&command, params).await?;
            info!(%job_id, %command, "command accepted");
            (vec![job_id], wait)
        }
    };

    let interval = wait.interval_ms.map(PollInterval::from_millis).transpose()?;
    let poller = AsyncJobPoller::from_config(client, &config);

    let outcomes = join_all(job_ids.iter().map(|id| poller.wait(id.clone(), interval))).await;

    let mut results = Map::new();
    let mut failed = 0;
    for (job_id, outcome) in job_ids.iter().zip(outcomes) {
        match outcome {
            Ok(result) => {
                println!("✅ {job_id}: {result}");
                results.insert(job_id.to_string(), result);
            }
            Err(e) => {
                eprintln!("❌ {job_id}: {}", e.error_text());
                failed += 1;
            }
        }
    }

    if let Some(path) = wait.output {
        utils::save_json(&Value::Object(results), path)?;
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
