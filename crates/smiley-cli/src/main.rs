use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use smiley_core::DetectionEvent;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

// `#[zbus::proxy]` generates `SmileyCamProxy` for the daemon interface.
#[zbus::proxy(
    interface = "org.smileycam.SmileyCam1",
    default_service = "org.smileycam.SmileyCam1",
    default_path = "/org/smileycam/SmileyCam1"
)]
trait SmileyCam {
    async fn status(&self) -> zbus::Result<String>;
    async fn toggle_camera(&self) -> zbus::Result<String>;
    async fn push_detection(&self, smiling_probabilities: Vec<f64>) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "smiley", about = "Smiley Cam CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show capture state, probability readout and last notice
    Status {
        /// Print the raw JSON snapshot
        #[arg(long)]
        json: bool,
    },
    /// Switch between front and back camera
    ToggleCamera,
    /// Push one detection result (smiling probability per face; none = no face)
    Detect { probabilities: Vec<f64> },
    /// Stream detection results from stdin, one JSON event per line
    Feed {
        /// Pause between events, in milliseconds
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let builder = if cli.system {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let conn = builder
        .method_timeout(Duration::from_secs(3))
        .build()
        .await
        .context("failed to connect to D-Bus")?;
    let proxy = SmileyCamProxy::new(&conn)
        .await
        .context("smileyd not reachable")?;

    match cli.command {
        Commands::Status { json } => {
            let raw = proxy.status().await?;
            if json {
                println!("{raw}");
            } else {
                print_status(&raw)?;
            }
        }
        Commands::ToggleCamera => {
            let camera = proxy.toggle_camera().await?;
            println!("camera: {camera}");
        }
        Commands::Detect { probabilities } => {
            let event = DetectionEvent::from_probabilities(probabilities)?;
            let delivery = proxy.push_detection(to_wire(&event)).await?;
            println!("{delivery}");
        }
        Commands::Feed { interval_ms } => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut line_no = 0usize;
            while let Some(line) = lines.next_line().await? {
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                let event = match DetectionEvent::parse_line(&line) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(line = line_no, error = %e, "skipping bad event");
                        continue;
                    }
                };
                let delivery = proxy.push_detection(to_wire(&event)).await?;
                tracing::debug!(line = line_no, %delivery, "event pushed");
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            }
        }
    }

    Ok(())
}

fn to_wire(event: &DetectionEvent) -> Vec<f64> {
    event
        .faces
        .iter()
        .map(|f| f.smiling_probability)
        .collect()
}

fn print_status(raw: &str) -> Result<()> {
    let status: serde_json::Value = serde_json::from_str(raw).context("bad status payload")?;
    let field = |key: &str| status[key].as_str().unwrap_or("?").to_string();

    if let Some(message) = status["message"].as_str() {
        println!("{message}");
        return Ok(());
    }
    println!("smile:   {}", field("readout"));
    println!("state:   {}", field("state"));
    println!("camera:  {} (toggle: {})", field("camera"), field("toggle_icon"));
    println!("saved:   {}", status["saved_photos"].as_u64().unwrap_or(0));
    if let Some(notice) = status["last_notice"].as_str() {
        println!("notice:  {notice}");
    }
    Ok(())
}
