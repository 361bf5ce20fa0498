//! Native error classification.

use super::pipeline::{ErrorDetails, ErrorType, PipelineError};

/// What the engine should do about a pipeline error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorClass {
    /// Feed the stall detector.
    Stall,
    /// The pipeline recovers on its own.
    Recoverable,
    /// The stream is unreachable; another source should be tried automatically.
    AutoSwitch,
    /// Fatal, but the user decides what happens next.
    Manual,
}

/// Only manifest/level load failures with no response or a 404 are auto-switchable.
/// Everything else that is fatal, including other HTTP codes and media errors, is manual.
pub fn classify(error: &PipelineError) -> NativeErrorClass {
    if !error.fatal {
        return match error.details {
            ErrorDetails::BufferStalled => NativeErrorClass::Stall,
            _ => NativeErrorClass::Recoverable,
        };
    }

    let playlist_load = matches!(
        error.details,
        ErrorDetails::ManifestLoadError
            | ErrorDetails::ManifestLoadTimeout
            | ErrorDetails::LevelLoadError
            | ErrorDetails::LevelLoadTimeout
    );
    let unreachable = matches!(error.response_code, None | Some(0) | Some(404));

    if error.error_type == ErrorType::Network && playlist_load && unreachable {
        NativeErrorClass::AutoSwitch
    } else {
        NativeErrorClass::Manual
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_manifest_is_auto_switch() {
        assert_eq!(
            classify(&PipelineError::manifest_load(Some(404), "not found")),
            NativeErrorClass::AutoSwitch
        );
        assert_eq!(
            classify(&PipelineError::manifest_load(None, "connection refused")),
            NativeErrorClass::AutoSwitch
        );
        assert_eq!(
            classify(&PipelineError::level_load(Some(0), "cors")),
            NativeErrorClass::AutoSwitch
        );
        assert_eq!(
            classify(&PipelineError::new(
                ErrorType::Network,
                ErrorDetails::ManifestLoadTimeout,
                true,
                "timeout"
            )),
            NativeErrorClass::AutoSwitch
        );
    }

    #[test]
    fn test_other_fatal_errors_are_manual() {
        assert_eq!(
            classify(&PipelineError::manifest_load(Some(403), "forbidden")),
            NativeErrorClass::Manual
        );
        assert_eq!(
            classify(&PipelineError::manifest_load(Some(500), "server")),
            NativeErrorClass::Manual
        );
        assert_eq!(
            classify(&PipelineError::media("decode failure")),
            NativeErrorClass::Manual
        );
        assert_eq!(
            classify(
                &PipelineError::new(ErrorType::Network, ErrorDetails::FragLoadError, true, "frag")
                    .with_response(404)
            ),
            NativeErrorClass::Manual
        );
        assert_eq!(
            classify(&PipelineError::new(
                ErrorType::Network,
                ErrorDetails::ManifestParsingError,
                true,
                "bad playlist"
            )),
            NativeErrorClass::Manual
        );
    }

    #[test]
    fn test_non_fatal() {
        assert_eq!(classify(&PipelineError::buffer_stalled()), NativeErrorClass::Stall);
        assert_eq!(
            classify(&PipelineError::new(
                ErrorType::Network,
                ErrorDetails::FragLoadTimeout,
                false,
                "slow"
            )),
            NativeErrorClass::Recoverable
        );
    }
}
