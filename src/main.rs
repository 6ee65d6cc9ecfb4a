use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

mod aggregate;
mod align;
mod config;
mod corrector;
mod events;
mod logfile;
mod merge;
mod motion;
mod ocr;
mod pipeline;
#[cfg(test)]
mod testing;
mod video;
mod worker;

use config::{load_config, AlignerKind, AttackDedup, PipelineConfig, Roi};

const RAW_LOG: &str = "combat_log_raw.txt";
const CORRECTED_LOG: &str = "corrected_data.txt";
const CLEANED_LOG: &str = "combat_log_cleaned.txt";

#[derive(Parser)]
#[command(name = "combat-log-ocr")]
#[command(about = "Reconstruct a combat log from a screen recording")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON pipeline config; command-line flags take precedence
    #[arg(long, global = true, env = "COMBAT_OCR_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct OcrArgs {
    /// Combat log rectangle in the frame: x,y,width,height
    #[arg(long, value_parser = parse_roi)]
    roi: Option<Roi>,
    /// Frames OCR'd concurrently (defaults to the number of CPUs)
    #[arg(long, env = "COMBAT_OCR_WORKERS")]
    workers: Option<usize>,
    /// Tesseract language
    #[arg(long)]
    language: Option<String>,
    /// Tesseract data directory
    #[arg(long, env = "COMBAT_OCR_TESSDATA")]
    tessdata: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// OCR the combat log region of a video into a raw log
    Extract {
        video: PathBuf,
        #[arg(short, long, default_value = RAW_LOG)]
        output: PathBuf,
        #[command(flatten)]
        ocr: OcrArgs,
    },
    /// Repair OCR noise and keep recognizable combat lines
    Correct {
        #[arg(short, long, default_value = RAW_LOG)]
        input: PathBuf,
        #[arg(short, long, default_value = CORRECTED_LOG)]
        output: PathBuf,
        #[arg(long, value_enum)]
        aligner: Option<AlignerKind>,
    },
    /// Merge frames into one event log without stutter duplicates
    Clean {
        #[arg(short, long, default_value = CORRECTED_LOG)]
        input: PathBuf,
        #[arg(short, long, default_value = CLEANED_LOG)]
        output: PathBuf,
        #[arg(long, value_enum)]
        attack_dedup: Option<AttackDedup>,
    },
    /// Total damage over all hit events of a cleaned log
    SumHits {
        #[arg(short, long, default_value = CLEANED_LOG)]
        input: PathBuf,
    },
    /// Every stage in sequence, writing all intermediate logs
    Run {
        video: PathBuf,
        #[arg(short, long, default_value = "./output")]
        output_dir: PathBuf,
        #[command(flatten)]
        ocr: OcrArgs,
    },
}

fn parse_roi(s: &str) -> Result<Roi, String> {
    s.parse().map_err(|e: anyhow::Error| format!("{e:#}"))
}

impl OcrArgs {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(roi) = self.roi {
            config.roi = Some(roi);
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(language) = self.language {
            config.ocr.language = language;
        }
        if let Some(tessdata) = self.tessdata {
            config.ocr.tessdata = Some(tessdata);
        }
    }
}

fn base_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            info!("Loading config from {}", path.display());
            load_config(path)
        }
        None => Ok(PipelineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = base_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract { video, output, ocr } => {
            ocr.apply(&mut config);
            info!("Extracting combat log from {}", video.display());
            pipeline::extract_file(&video, &output, &config).await?;
        }
        Commands::Correct {
            input,
            output,
            aligner,
        } => {
            if let Some(aligner) = aligner {
                config.correction.aligner = aligner;
            }
            pipeline::correct_file(&input, &output, &config)?;
        }
        Commands::Clean {
            input,
            output,
            attack_dedup,
        } => {
            if let Some(policy) = attack_dedup {
                config.merge.attack_dedup = policy;
            }
            pipeline::clean_file(&input, &output, &config)?;
        }
        Commands::SumHits { input } => {
            let total = pipeline::sum_hits_file(&input)?;
            println!("{total}");
        }
        Commands::Run {
            video,
            output_dir,
            ocr,
        } => {
            ocr.apply(&mut config);
            std::fs::create_dir_all(&output_dir)?;
            let raw = output_dir.join(RAW_LOG);
            let corrected = output_dir.join(CORRECTED_LOG);
            let cleaned = output_dir.join(CLEANED_LOG);

            info!("Step 1: extracting combat log from {}", video.display());
            pipeline::extract_file(&video, &raw, &config).await?;

            info!("Step 2: correcting OCR output");
            pipeline::correct_file(&raw, &corrected, &config)?;

            info!("Step 3: merging frames");
            pipeline::clean_file(&corrected, &cleaned, &config)?;

            let total = pipeline::sum_hits_file(&cleaned)?;
            info!("Complete! Results saved to {}", output_dir.display());
            println!("{total}");
        }
    }

    Ok(())
}
