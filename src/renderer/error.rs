/// Errors produced while loading a scene or building the pipeline.
///
/// All of these are fatal at startup. The shader hot-reload path catches
/// [`Error::Link`] and [`Error::Load`] and keeps the previous programs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The scene document, a referenced resource, or a shader source could
    /// not be read or did not have the expected shape.
    #[error("failed to load: {0}")]
    Load(String),
    /// An image's channel count or pixel type has no GL upload equivalent;
    /// no conversion is attempted.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Shader compilation or program linking failed; carries the driver's
    /// info log.
    #[error("shader build failed: {0}")]
    Link(String),
    /// The G-buffer framebuffer did not pass the completeness check.
    #[error("framebuffer incomplete")]
    FramebufferIncomplete,
}
