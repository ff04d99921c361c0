use card_faceswap::client::{ClientError, FaceSwapApiClient, DEFAULT_POLL_INTERVAL};
use card_faceswap::models::job::JobStatus;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "faceswap",
    about = "Put your face on a Magic: The Gathering card",
    after_help = "Examples:\n  \
    faceswap search \"lightning bolt\"\n  \
    faceswap swap --image me.jpg --card-url https://cards.scryfall.io/normal/front/a.jpg\n  \
    faceswap status 3f1c2a4e-9b0d-4c8e-a1f2-5d6e7f809a1b"
)]
struct Cli {
    /// Base URL of the face swap server
    #[arg(long, env = "FACESWAP_SERVER", default_value = "http://localhost:3000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search card prints by name
    Search { query: String },

    /// List every print of a card (any set, any language)
    Prints { prints_search_uri: String },

    /// Submit a photo and wait for the composite
    Swap {
        /// Photo containing the face to use
        #[arg(long)]
        image: PathBuf,

        /// Normal-resolution image URL of the chosen card print
        #[arg(long)]
        card_url: String,

        /// Seconds between status checks
        #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
        poll_secs: u64,

        /// Print the job id and exit without waiting
        #[arg(long)]
        no_wait: bool,
    },

    /// Show the current status of a job
    Status { job_id: Uuid },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = FaceSwapApiClient::new(&cli.server);

    match cli.command {
        Commands::Search { query } => {
            for card in client.search_cards(&query).await? {
                println!(
                    "{} | {} [{}] | {}",
                    card.name,
                    card.set_name,
                    card.lang,
                    card.normal_image_url().unwrap_or("-")
                );
            }
        }
        Commands::Prints { prints_search_uri } => {
            for print in client.card_prints(&prints_search_uri).await? {
                println!(
                    "{} | {} #{} [{}] | {}",
                    print.name,
                    print.set_name,
                    print.collector_number,
                    print.lang,
                    print.normal_image_url().unwrap_or("-")
                );
            }
        }
        Commands::Swap {
            image,
            card_url,
            poll_secs,
            no_wait,
        } => {
            let bytes = tokio::fs::read(&image).await?;
            let file_name = image
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("source")
                .to_string();

            let submitted = client.submit(bytes, &file_name, &card_url).await?;
            eprintln!("Submitted job {}", submitted.job_id);
            if no_wait {
                println!("{}", submitted.job_id);
                return Ok(());
            }

            // Ctrl-C stops polling; the job itself keeps running server-side.
            let cancel = CancellationToken::new();
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    let _ = tokio::signal::ctrl_c().await;
                    cancel.cancel();
                }
            });

            match client
                .wait_for_result(submitted.job_id, Duration::from_secs(poll_secs), &cancel)
                .await
            {
                Ok(job) if job.status == JobStatus::Completed => {
                    println!("{}", job.result_url.unwrap_or_default());
                }
                Ok(job) => {
                    return Err(job.error_message.unwrap_or_else(|| "job failed".to_string()).into());
                }
                Err(ClientError::Cancelled(id)) => {
                    eprintln!("Stopped waiting. Check later with: faceswap status {id}");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Status { job_id } => {
            let job = client.status(job_id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
    }

    Ok(())
}
