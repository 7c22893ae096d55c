//! jimaku - translated subtitles for video files
//!
//! A staged pipeline that extracts audio with ffmpeg (or yt-dlp for URLs),
//! transcribes it with whisper.cpp, translates the segments in concurrent
//! batches through an Ollama model and writes an SRT file.

pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod media;
pub mod pipeline;
pub mod stages;
pub mod subtitle;
pub mod transcribe;
pub mod translate;
pub mod workflow;
