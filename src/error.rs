use thiserror::Error;

/// Errors surfaced by the synthesis, playback and export layers.
///
/// Every kind is recoverable at the call site by retrying the user action;
/// the UI collaborator maps each kind to its own message. `Connectivity` is
/// deliberately separate from `Unknown` because the remedy differs (check
/// the network vs. a generic failure notice).
#[derive(Error, Debug)]
pub enum TtsError {
    #[error("unknown TTS backend: '{0}'")]
    UnknownBackend(String),

    #[error("cannot set property '{property}' on backend '{backend}'")]
    Property {
        backend: &'static str,
        property: String,
    },

    #[error("speech has not been synthesized yet")]
    NotGenerated,

    #[error("could not reach the speech service: {0}")]
    Connectivity(String),

    #[error("failed to initialize speech engine: {0}")]
    EngineInit(String),

    #[error("audio codec unavailable (is ffmpeg installed?): {0}")]
    CodecUnavailable(String),

    #[error("{0}")]
    Unknown(String),
}

impl From<std::io::Error> for TtsError {
    fn from(err: std::io::Error) -> Self {
        TtsError::Unknown(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TtsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_distinct_from_unknown() {
        let conn = TtsError::Connectivity("dns failure".to_string());
        let unknown = TtsError::Unknown("dns failure".to_string());
        assert!(matches!(conn, TtsError::Connectivity(_)));
        assert!(!matches!(unknown, TtsError::Connectivity(_)));
    }

    #[test]
    fn test_io_error_folds_to_unknown() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TtsError = io.into();
        assert!(matches!(err, TtsError::Unknown(_)));
    }
}
