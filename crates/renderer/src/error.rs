//! Renderer setup and frame errors.

use thiserror::Error;

use lumen_rhi::RhiError;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// `device.extra_features` names a feature the renderer does not know
    #[error("Unknown device feature '{0}'")]
    UnknownFeature(String),

    /// The scene has nothing the renderer can upload
    #[error("Invalid scene: {0}")]
    InvalidScene(String),
}

pub type RendererResult<T> = std::result::Result<T, RendererError>;
