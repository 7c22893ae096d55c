use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{JimakuError, Result};

/// Sample rate whisper models expect
pub const SAMPLE_RATE: u32 = 16000;

/// External tool invocation: binary, arguments and a label for error messages
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Keep only the first audio stream of the first input
    pub fn first_audio_stream(self) -> Self {
        self.arg("-map").arg("0:a:0")
    }

    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    pub fn quiet(self) -> Self {
        self.arg("-loglevel").arg("error")
    }

    /// Run the command to completion; a non-zero exit is a `Media` error carrying stderr.
    pub async fn execute(&self) -> Result<()> {
        debug!("Executing media command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| {
                JimakuError::Media(format!("Failed to execute {}: {}", self.binary_path, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JimakuError::Media(format!(
                "{} failed: {}",
                self.description,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Builds ffmpeg and yt-dlp invocations producing whisper-ready WAV audio
pub struct MediaCommandBuilder {
    ffmpeg_path: String,
    downloader_path: String,
}

impl MediaCommandBuilder {
    pub fn new<S1: Into<String>, S2: Into<String>>(ffmpeg_path: S1, downloader_path: S2) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            downloader_path: downloader_path.into(),
        }
    }

    /// Mono 16 kHz PCM WAV from a local media file
    pub fn extract_audio<P1: AsRef<Path>, P2: AsRef<Path>>(
        &self,
        video_path: P1,
        audio_path: P2,
    ) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "Audio extraction")
            .quiet()
            .input(video_path)
            .first_audio_stream()
            .no_video()
            .audio_codec("pcm_s16le")
            .audio_sample_rate(SAMPLE_RATE)
            .audio_channels(1)
            .overwrite()
            .output(audio_path)
    }

    /// Best available audio of a remote video, post-processed to the same WAV format.
    /// `output_template` has no extension; yt-dlp appends `.wav`.
    pub fn download_audio<P: AsRef<Path>>(&self, url: &str, output_template: P) -> MediaCommand {
        MediaCommand::new(&self.downloader_path, "Audio download")
            .args(["--no-playlist", "--format", "bestaudio/best"])
            .args(["--extract-audio", "--audio-format", "wav"])
            .arg("--postprocessor-args")
            .arg(format!(
                "ffmpeg:-acodec pcm_s16le -ar {} -ac 1",
                SAMPLE_RATE
            ))
            .arg("--output")
            .arg(format!("{}.%(ext)s", output_template.as_ref().display()))
            .arg(url)
    }

    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "Version check").arg("-version")
    }
}
