use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use health_analysis::{
    format_elapsed, modality_description, urgency_label, AnalysisPipeline, AudioClip, AudioSource,
    CaptureSession, Config, DiagnosticResult, ImageFile, ModalityFilter, Persisted, RecordCard,
    RecordFilter, ResultPresenter, StaticAuth,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "health-analysis", version, about = "Preliminary image and voice health analysis")]
struct Cli {
    /// Config file, extension optional
    #[arg(long, default_value = "config/health-analysis")]
    config: String,

    /// Act as this signed-in user; omit to run as a guest
    #[arg(long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a medical image
    Image { path: PathBuf },
    /// Record symptoms and analyze them
    Voice {
        /// Recording length; defaults to the file length with --file, else 5
        #[arg(long)]
        seconds: Option<u64>,
        /// Replay a WAV file instead of the synthetic microphone
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List past analyses, newest first
    History {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "all", value_parser = ["all", "image", "voice"])]
        modality: String,
        #[arg(long)]
        min_confidence: Option<f64>,
        /// Print record cards as JSON
        #[arg(long)]
        json: bool,
    },
    /// Dashboard counts over the full history
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config).with_context(|| format!("loading {}", cli.config))?;

    let auth = match &cli.user {
        Some(user) => StaticAuth::signed_in(user.as_str()),
        None => StaticAuth::signed_out(),
    };
    let pipeline = AnalysisPipeline::from_config(&cfg, Arc::new(auth))?;

    info!("Health Analysis v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Image { path } => {
            let session = pipeline.open_session();
            session
                .begin_image_capture(ImageFile::from_path(&path))
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            run_analysis(&pipeline, &session).await?;
        }
        Command::Voice { seconds, file } => {
            let (source, default_seconds) = match file {
                Some(path) => {
                    let clip = AudioClip::open(&path)?;
                    (AudioSource::File(path), clip.duration_seconds.ceil().max(1.0) as u64)
                }
                None => (AudioSource::Synthetic, 5),
            };
            let seconds = seconds.unwrap_or(default_seconds);

            let session = pipeline.open_session();
            session
                .begin_audio_capture(pipeline.microphone(source)?)
                .await?;
            info!("Recording for {}s, Ctrl-C to cancel", seconds);

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                _ = tokio::signal::ctrl_c() => {
                    session.cancel().await?;
                    warn!("Recording cancelled");
                    return Ok(());
                }
            }

            let elapsed = session.end_audio_capture().await?;
            info!("Recorded {}", format_elapsed(elapsed));
            run_analysis(&pipeline, &session).await?;
        }
        Command::History {
            search,
            modality,
            min_confidence,
            json,
        } => {
            let mut filter = RecordFilter::new().modality(match modality.as_str() {
                "image" => ModalityFilter::Image,
                "voice" => ModalityFilter::Voice,
                _ => ModalityFilter::All,
            });
            if let Some(search) = search {
                filter = filter.text(search);
            }
            if let Some(threshold) = min_confidence {
                filter = filter.min_confidence(threshold);
            }

            let Some(records) = pipeline.history(&filter).await? else {
                warn!("Sign in with --user to see your history");
                return Ok(());
            };
            let cards: Vec<RecordCard> = records.iter().map(RecordCard::from).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&cards)?);
            } else if cards.is_empty() {
                println!("No records found");
            } else {
                for card in cards {
                    println!(
                        "{}  {:<6} {:>5.1}%  {}",
                        card.date,
                        card.modality.label(),
                        card.confidence,
                        card.diagnosis
                    );
                }
            }
        }
        Command::Summary => match pipeline.summary().await? {
            Some(counts) => println!("{}", serde_json::to_string_pretty(&counts)?),
            None => warn!("Sign in with --user to see your summary"),
        },
    }

    Ok(())
}

async fn run_analysis(pipeline: &AnalysisPipeline, session: &CaptureSession) -> Result<()> {
    let mut presenter = ResultPresenter::for_session(session);
    info!("Analyzing with {} backend", pipeline.engine().backend_name());

    let (_, persisted) = pipeline.complete(session).await?;
    let result = presenter
        .wait_for_result()
        .await
        .context("session ended without a result")?;
    print_result(&result);

    match persisted {
        Persisted::Saved => info!("Saved record {}", result.id()),
        Persisted::Skipped if session.is_guest() => {
            info!("Guest session, result not saved")
        }
        Persisted::Skipped => warn!("Result not saved"),
    }
    Ok(())
}

fn print_result(result: &DiagnosticResult) {
    println!("Analysis of {}", modality_description(result.modality()));
    println!("  Diagnosis:  {}", result.diagnosis());
    println!("  Confidence: {}", result.confidence());
    println!("  Urgency:    {}", urgency_label(result.urgency()));
    if let Some(transcription) = result.transcription() {
        println!("  Heard:      {}", transcription);
    }
    if let Some(symptoms) = result.symptoms() {
        let symptoms: Vec<&str> = symptoms.iter().map(String::as_str).collect();
        println!("  Symptoms:   {}", symptoms.join(", "));
    }
    if !result.details().is_empty() {
        println!("  {}", result.details());
    }
    for recommendation in result.recommendations() {
        println!("  - {}", recommendation);
    }
}
