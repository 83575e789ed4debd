use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facevault_core::{preprocess, Comparison, ModelContext};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facevault", about = "Face presence detection and embedding CLI")]
struct Cli {
    /// Directory containing the ONNX models
    #[arg(long, env = "FACEVAULT_MODEL_DIR", default_value = "./models", global = true)]
    model_dir: PathBuf,

    /// SCRFD model file name inside the model directory
    #[arg(long, default_value = "scrfd.onnx", global = true)]
    detector_model: String,

    /// ArcFace model file name inside the model directory
    #[arg(long, default_value = "arcface.onnx", global = true)]
    recognizer_model: String,

    /// ONNX Runtime intra-op threads per model
    #[arg(long, default_value_t = 2, global = true)]
    threads: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether an image contains a face
    Detect {
        /// Image file to inspect
        image: PathBuf,
    },
    /// Print the face embedding of an image as JSON
    Embed {
        /// Image file to embed
        image: PathBuf,
    },
    /// Compare the faces in two images
    Compare {
        /// First image
        a: PathBuf,
        /// Second image
        b: PathBuf,
    },
}

impl Cli {
    fn load_models(&self) -> Result<ModelContext> {
        let detector = self.model_dir.join(&self.detector_model);
        let recognizer = self.model_dir.join(&self.recognizer_model);
        ModelContext::load(
            &detector.to_string_lossy(),
            &recognizer.to_string_lossy(),
            self.threads,
        )
        .with_context(|| format!("failed to load models from {}", self.model_dir.display()))
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let models = cli.load_models()?;

    match &cli.command {
        Commands::Detect { image } => {
            let decoded = preprocess::decode(&read(image)?)?;
            let present = models.contains_face(&decoded)?;
            tracing::debug!(image = %image.display(), present, "detection finished");
            if present {
                println!("face detected");
            } else {
                println!("no face detected");
            }
        }
        Commands::Embed { image } => {
            let embedding = models.prepare(&read(image)?)?;
            println!("{}", serde_json::to_string(&embedding)?);
        }
        Commands::Compare { a, b } => {
            let first = models.prepare(&read(a)?)?;
            let second = models.prepare(&read(b)?)?;
            let comparison = Comparison::between(&first, &second)?;
            println!("{}", serde_json::to_string_pretty(&comparison)?);
        }
    }

    Ok(())
}
