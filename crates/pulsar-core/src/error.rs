// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the frame pipeline can surface.
///
/// Only [`Error::SurfaceStale`] is handled locally (by a swapchain rebuild);
/// everything else terminates the run loop.
#[derive(Debug, Error)]
pub enum Error {
    /// Instance/device/feature negotiation failed.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// Buffer, image, view, descriptor or sync object creation failed.
    #[error("failed to create {what}: {detail}")]
    ResourceCreation { what: &'static str, detail: String },

    /// No memory type satisfies the requested usage.
    #[error("out of device memory for {what}: {detail}")]
    OutOfMemory { what: &'static str, detail: String },

    #[error("failed to create {what} pipeline: {detail}")]
    PipelineCreation { what: &'static str, detail: String },

    /// The swapchain no longer matches the surface: out-of-date on
    /// acquire/present/creation, or a zero extent by the time of creation.
    /// A lost surface is not stale; it surfaces as [`Error::Presentation`].
    #[error("presentation surface is stale ({0})")]
    SurfaceStale(String),

    #[error("queue submission failed during {stage}: {detail}")]
    Submission { stage: &'static str, detail: String },

    #[error("presentation failed: {0}")]
    Presentation(String),

    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// A shader or mesh blob is malformed.
    #[error("invalid asset {name}: {detail}")]
    InvalidAsset { name: String, detail: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn resource(what: &'static str, detail: impl std::fmt::Debug) -> Self {
        Error::ResourceCreation {
            what,
            detail: format!("{detail:?}"),
        }
    }

    pub fn submission(stage: &'static str, detail: impl std::fmt::Debug) -> Self {
        Error::Submission {
            stage,
            detail: format!("{detail:?}"),
        }
    }

    pub fn pipeline(what: &'static str, detail: impl std::fmt::Debug) -> Self {
        Error::PipelineCreation {
            what,
            detail: format!("{detail:?}"),
        }
    }

    /// Whether a swapchain rebuild can clear this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::SurfaceStale(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stale_surface_is_recoverable() {
        assert!(Error::SurfaceStale("ERROR_OUT_OF_DATE_KHR".into()).is_recoverable());
        assert!(!Error::Presentation("ERROR_DEVICE_LOST".into()).is_recoverable());
        assert!(!Error::submission("compute", "ERROR_DEVICE_LOST").is_recoverable());
        assert!(!Error::FileNotFound {
            path: "shaders/particles.comp.spv".into()
        }
        .is_recoverable());
    }

    #[test]
    fn messages_carry_context() {
        let e = Error::resource("depth image", "ERROR_OUT_OF_DEVICE_MEMORY");
        assert_eq!(
            e.to_string(),
            "failed to create depth image: \"ERROR_OUT_OF_DEVICE_MEMORY\""
        );

        let e = Error::FileNotFound {
            path: "missing.spv".into(),
        };
        assert_eq!(e.to_string(), "file not found: missing.spv");
    }
}
