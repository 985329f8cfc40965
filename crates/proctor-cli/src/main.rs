use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proctor_core::SessionState;
use proctor_engine::{Config, InMemorySessionStore, Proctor, ScannerConfig, SessionStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "proctor", about = "Exam proctoring frame analysis CLI")]
struct Cli {
    /// TOML config file (default: PROCTOR_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the reference face for a session (creates the session if needed)
    Enroll {
        /// Session state file (JSON)
        #[arg(short, long)]
        state: PathBuf,
        /// Reference capture
        image: PathBuf,
    },
    /// Run frames through the violation pipeline
    Analyze {
        #[arg(short, long)]
        state: PathBuf,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Mark the session completed
    Complete {
        #[arg(short, long)]
        state: PathBuf,
    },
    /// Report which model files are present
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env(),
    };

    match cli.command {
        Commands::Enroll { state, image } => {
            let (proctor, store, id) = open_session(&config, &state)?;
            let bytes = read_image(&image)?;
            let enrollment = proctor.enroll(&id, &bytes).await?;
            save_session(store.as_ref(), &id, &state).await?;
            println!("{}", serde_json::to_string_pretty(&enrollment)?);
        }
        Commands::Analyze { state, images } => {
            let (proctor, store, id) = open_session(&config, &state)?;
            let outcome = analyze(&proctor, &id, &images).await;
            // Persist whatever was counted before a failure.
            save_session(store.as_ref(), &id, &state).await?;
            outcome?;
        }
        Commands::Complete { state } => {
            let (proctor, store, id) = open_session(&config, &state)?;
            let completed = proctor.complete_session(&id).await?;
            save_session(store.as_ref(), &id, &state).await?;
            println!("{}", serde_json::to_string_pretty(&completed)?);
        }
        Commands::Models => {
            println!("Model directory: {}", config.model_dir.display());
            let models = [
                ("face detector", config.face_detector_path()),
                ("face mesh", config.face_mesh_path()),
                ("object detector", config.object_detector_path()),
            ];
            for (name, path) in &models {
                let status = if path.exists() { "ok" } else { "missing" };
                println!("  {name:<16} {status:<8} {}", path.display());
            }
            match &config.scanner {
                ScannerConfig::Local => println!("Object scanner: local"),
                ScannerConfig::Remote { url, timeout_secs } => {
                    println!("Object scanner: remote {url} (timeout {timeout_secs}s)")
                }
            }
        }
    }

    Ok(())
}

async fn analyze(proctor: &Proctor, id: &str, images: &[PathBuf]) -> Result<()> {
    for path in images {
        let bytes = read_image(path)?;
        let report = proctor.process_frame(id, &bytes).await?;
        println!("{}", serde_json::to_string(&report)?);
        if report.end_exam {
            eprintln!("session {id} is {}; remaining frames ignored", report.status);
            break;
        }
    }
    Ok(())
}

/// Load the session from `state_path`, or start a new one with a fresh id.
fn open_session(
    config: &Config,
    state_path: &Path,
) -> Result<(Proctor, Arc<InMemorySessionStore>, String)> {
    let state = if state_path.exists() {
        let text = std::fs::read_to_string(state_path)
            .with_context(|| format!("reading {}", state_path.display()))?;
        serde_json::from_str::<SessionState>(&text)
            .with_context(|| format!("parsing {}", state_path.display()))?
    } else {
        let state = SessionState::new(uuid::Uuid::new_v4().to_string());
        tracing::info!(session_id = %state.session_id, "new session");
        state
    };

    let id = state.session_id.clone();
    let store = Arc::new(InMemorySessionStore::with_session(state));
    let proctor = Proctor::from_config(config, store.clone());
    Ok((proctor, store, id))
}

async fn save_session(store: &InMemorySessionStore, id: &str, state_path: &Path) -> Result<()> {
    let state = store
        .get(id)
        .await?
        .with_context(|| format!("session {id} vanished from the store"))?;
    std::fs::write(state_path, serde_json::to_string_pretty(&state)?)
        .with_context(|| format!("writing {}", state_path.display()))?;
    Ok(())
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}
