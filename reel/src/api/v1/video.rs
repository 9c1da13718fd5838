use serde::{Deserialize, Serialize};

/// Request to trim a video.
///
/// Times are in seconds. The source must already exist in the upload
/// directory, and the trimmed copy is written next to it.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrimRequest {
    /// Name of the source video.
    #[serde(rename = "fileName")]
    pub file_name: String,

    /// Offset of the first retained second.
    pub start_time: f64,

    /// Length of the retained range, in seconds.
    pub duration: f64,

    /// Name of the trimmed output.
    #[serde(rename = "outputFile")]
    pub output_file: String,
}

/// Request to join videos back to back.
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Names of the input videos, in playback order. At least two.
    pub parts: Vec<String>,

    /// Name of the joined output.
    #[serde(rename = "outputFile")]
    pub output_file: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_casing() {
        let request: TrimRequest = serde_json::from_str(
            r#"{"fileName": "in.mp4", "start_time": 3.0, "duration": 10.5, "outputFile": "out.mp4"}"#,
        )
        .unwrap();
        assert_eq!(request.file_name, "in.mp4");
        assert_eq!(request.start_time, 3.0);
        assert_eq!(request.duration, 10.5);
        assert_eq!(request.output_file, "out.mp4");

        let request: JoinRequest = serde_json::from_str(
            r#"{"parts": ["a.mp4", "b.mp4"], "outputFile": "ab.mp4"}"#,
        )
        .unwrap();
        assert_eq!(request.parts.len(), 2);
    }
}
