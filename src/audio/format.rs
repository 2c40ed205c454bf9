//! Declared upload formats.

use std::fmt;

/// Container format a client says it uploaded.
///
/// Inferred from the multipart content type. Anything unrecognised is
/// treated as WebM, which is what browser recorders produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    M4a,
    Webm,
}

impl AudioFormat {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();

        if content_type.contains("wav") {
            AudioFormat::Wav
        } else if content_type.contains("mp3") || content_type.contains("mpeg") {
            AudioFormat::Mp3
        } else if content_type.contains("m4a") || content_type.contains("mp4") {
            AudioFormat::M4a
        } else {
            AudioFormat::Webm
        }
    }

    /// Demuxer name passed to `ffmpeg -f`.
    pub fn ffmpeg_demuxer(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            // ffmpeg's mp4 family demuxer covers m4a
            AudioFormat::M4a => "mov",
            AudioFormat::Webm => "webm",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Webm => "webm",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(AudioFormat::from_content_type(Some("audio/wav")), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_content_type(Some("audio/x-wav")), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_content_type(Some("audio/mp3")), AudioFormat::Mp3);
        assert_eq!(AudioFormat::from_content_type(Some("audio/mpeg")), AudioFormat::Mp3);
        assert_eq!(AudioFormat::from_content_type(Some("audio/x-m4a")), AudioFormat::M4a);
        assert_eq!(AudioFormat::from_content_type(Some("audio/mp4")), AudioFormat::M4a);
        assert_eq!(AudioFormat::from_content_type(Some("audio/webm;codecs=opus")), AudioFormat::Webm);
        assert_eq!(AudioFormat::from_content_type(Some("application/octet-stream")), AudioFormat::Webm);
        assert_eq!(AudioFormat::from_content_type(None), AudioFormat::Webm);
    }

    #[test]
    fn test_demuxer_names() {
        assert_eq!(AudioFormat::M4a.ffmpeg_demuxer(), "mov");
        assert_eq!(AudioFormat::M4a.to_string(), "m4a");
    }
}
