//! Video trim and join through the external media tool.
//!
//! The server shells out to ffmpeg/ffprobe and never parses media
//! itself. Inputs and outputs are plain file names resolved under the
//! upload directory; both operations are synchronous from the client's
//! point of view.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::anyhow;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::config::MediaConfig;
use crate::error::{ServerError, ServerResult};
use reel::file_name::validate_file_name;

/// The longest range a single trim may retain, in seconds.
const MAX_TRIM_DURATION: f64 = 3600.0;

#[derive(Debug)]
pub struct MediaProcessor {
    config: MediaConfig,
    workdir: PathBuf,
}

impl MediaProcessor {
    pub fn new(config: MediaConfig, workdir: PathBuf) -> Self {
        Self { config, workdir }
    }

    /// Copies `[start_time, start_time + duration)` of a video into a
    /// new file without re-encoding.
    pub async fn trim(
        &self,
        file_name: &str,
        start_time: f64,
        duration: f64,
        output_file: &str,
    ) -> ServerResult<()> {
        validate_trim_range(start_time, duration)?;
        let input = self.resolve(file_name)?;
        let output = self.resolve(output_file)?;

        let video_duration = self.probe_duration(&input).await?;
        if start_time + duration > video_duration {
            return Err(ServerError::InvalidTrimRange);
        }

        let result = Command::new(&self.config.ffmpeg)
            .arg("-i")
            .arg(&input)
            .arg("-ss")
            .arg(format_timestamp(start_time))
            .arg("-t")
            .arg(format_timestamp(duration))
            .arg("-c")
            .arg("copy")
            .arg(&output)
            .output()
            .await
            .map_err(|e| ServerError::TrimError(anyhow!("failed to run media tool: {}", e)))?;

        if !result.status.success() {
            return Err(ServerError::TrimError(tool_failure(&result)));
        }

        Ok(())
    }

    /// Concatenates videos back to back without re-encoding.
    pub async fn join(&self, parts: &[String], output_file: &str) -> ServerResult<()> {
        if parts.len() < 2 {
            return Err(ServerError::JoinError(anyhow!(
                "at least two input parts are required"
            )));
        }

        let output = self
            .resolve(output_file)
            .map_err(|_| ServerError::JoinError(anyhow!("invalid output file name")))?;

        // the concat demuxer takes its inputs from a list file
        let mut list = NamedTempFile::new()
            .map_err(|e| ServerError::JoinError(anyhow!("failed to create concat list: {}", e)))?;
        for part in parts {
            let path = self
                .resolve(part)
                .map_err(|_| ServerError::JoinError(anyhow!("invalid part name: {}", part)))?;
            writeln!(list, "file '{}'", path.display())
                .map_err(|e| ServerError::JoinError(anyhow!("failed to write concat list: {}", e)))?;
        }
        list.flush()
            .map_err(|e| ServerError::JoinError(anyhow!("failed to write concat list: {}", e)))?;

        let result = Command::new(&self.config.ffmpeg)
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(list.path())
            .arg("-c")
            .arg("copy")
            .arg(&output)
            .output()
            .await
            .map_err(|e| ServerError::JoinError(anyhow!("failed to run media tool: {}", e)))?;

        if !result.status.success() {
            return Err(ServerError::JoinError(tool_failure(&result)));
        }

        Ok(())
    }

    /// Returns the duration of a video in seconds.
    async fn probe_duration(&self, input: &Path) -> ServerResult<f64> {
        let result = Command::new(&self.config.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(input)
            .output()
            .await
            .map_err(|e| ServerError::VideoInfoError(anyhow!("failed to run probe: {}", e)))?;

        if !result.status.success() {
            return Err(ServerError::VideoInfoError(tool_failure(&result)));
        }

        String::from_utf8_lossy(&result.stdout)
            .trim()
            .parse()
            .map_err(|e| ServerError::VideoInfoError(anyhow!("unparsable duration: {}", e)))
    }

    fn resolve(&self, file_name: &str) -> ServerResult<PathBuf> {
        validate_file_name(file_name)?;
        Ok(self.workdir.join(file_name))
    }
}

fn validate_trim_range(start_time: f64, duration: f64) -> ServerResult<()> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(ServerError::InvalidDuration);
    }

    if duration > MAX_TRIM_DURATION {
        return Err(ServerError::DurationTooLong);
    }

    if !start_time.is_finite() || start_time < 0.0 {
        return Err(ServerError::InvalidTrimRange);
    }

    Ok(())
}

/// Formats seconds as the `HH:MM:SS` the media tool expects.
fn format_timestamp(seconds: f64) -> String {
    let total = seconds.round() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

fn tool_failure(output: &Output) -> anyhow::Error {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow!(
        "media tool exited with {}: {}",
        output.status,
        stderr.trim().lines().last().unwrap_or("")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00:00");
        assert_eq!(format_timestamp(7.4), "00:00:07");
        assert_eq!(format_timestamp(61.0), "00:01:01");
        assert_eq!(format_timestamp(3661.0), "01:01:01");
        assert_eq!(format_timestamp(86399.0), "23:59:59");
    }

    #[test]
    fn test_validate_trim_range() {
        validate_trim_range(0.0, 10.0).unwrap();
        validate_trim_range(5.0, 3600.0).unwrap();

        assert!(matches!(
            validate_trim_range(0.0, 0.0),
            Err(ServerError::InvalidDuration)
        ));
        assert!(matches!(
            validate_trim_range(0.0, -3.0),
            Err(ServerError::InvalidDuration)
        ));
        assert!(matches!(
            validate_trim_range(0.0, f64::NAN),
            Err(ServerError::InvalidDuration)
        ));
        assert!(matches!(
            validate_trim_range(0.0, 3600.1),
            Err(ServerError::DurationTooLong)
        ));
        assert!(matches!(
            validate_trim_range(-1.0, 10.0),
            Err(ServerError::InvalidTrimRange)
        ));
    }
}
