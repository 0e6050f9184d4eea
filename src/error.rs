use std::path::PathBuf;

/// Errors that indicate a broken contract rather than a skippable feature.
///
/// Placement failures, degenerate geometry and exhausted retry budgets are
/// deliberately *not* represented here; those drop the affected annotation
/// and rendering continues.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid stylesheet: {0}")]
    Stylesheet(#[from] serde_yaml::Error),

    #[error("invalid GeoJSON source: {0}")]
    Source(#[from] serde_json::Error),

    #[error("unsupported geometry kind `{0}` in annotation pass")]
    UnsupportedGeometry(String),

    #[error("no usable font for family `{0}`")]
    FontUnavailable(String),

    #[error("degenerate canvas extent: {0}")]
    CanvasExtent(String),

    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
