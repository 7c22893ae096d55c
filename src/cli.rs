use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, WorkflowKind};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe and translate a single video file or URL into an SRT file
    Process {
        /// Input video file or http(s) URL
        #[arg(short, long)]
        input: String,

        #[command(flatten)]
        overrides: RunOverrides,
    },

    /// Process all video files in a directory
    Batch {
        /// Input directory containing video files
        #[arg(short, long)]
        input_dir: PathBuf,

        #[command(flatten)]
        overrides: RunOverrides,
    },

    /// Extract audio from a video file or URL
    Extract {
        /// Input video file or http(s) URL
        #[arg(short, long)]
        input: String,

        /// Output audio file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Transcribe a video file or URL into source-language subtitles
    Transcribe {
        /// Input video file or http(s) URL
        #[arg(short, long)]
        input: String,

        /// Output SRT file
        #[arg(short, long)]
        output: PathBuf,

        /// Source language hint
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Write the default configuration file
    InitConfig {
        /// Destination path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

/// Flags that override configuration values for one run
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct RunOverrides {
    /// Target language code for translation
    #[arg(short, long)]
    pub target_lang: Option<String>,

    /// Output directory for subtitle files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Workflow: transcribe, direct, summarized or full
    #[arg(short, long)]
    pub workflow: Option<WorkflowKind>,

    /// Segments per translation request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Translation requests allowed in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl RunOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(lang) = &self.target_lang {
            config.translate.target_language = lang.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = Some(dir.clone());
        }
        if let Some(workflow) = self.workflow {
            config.output.workflow = workflow;
        }
        if let Some(batch_size) = self.batch_size {
            config.translate.batch_size = batch_size;
        }
        if let Some(concurrency) = self.concurrency {
            config.translate.max_concurrency = concurrency;
        }
    }
}
