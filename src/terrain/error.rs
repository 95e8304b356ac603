use std::fmt;

use super::tile::Tile;

/// A convenient result type wrapping [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct SourceError {
    pub level: u32,
    pub tile: Tile,
    pub reason: String,
}

#[derive(Debug)]
pub struct OutOfBoundsError {
    pub level: u32,
    pub tile: Tile,
}

#[derive(Debug)]
pub struct ConfigurationError {
    pub field: &'static str,
    pub reason: String,
}

#[derive(Debug)]
pub struct LoadingError {
    pub entry: String,
    pub path: String,
}

impl SourceError {
    pub fn new(level: u32, tile: Tile, reason: impl Into<String>) -> Self {
        Self {
            level,
            tile,
            reason: reason.into(),
        }
    }
}

impl ConfigurationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Source failed to produce tile ({}, {}) at level {}: {}",
            self.tile.x, self.tile.y, self.level, self.reason
        )
    }
}

impl fmt::Display for OutOfBoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tile ({}, {}) at level {} lies outside the source data!",
            self.tile.x, self.tile.y, self.level
        )
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid terrain configuration '{}': {}", self.field, self.reason)
    }
}

impl fmt::Display for LoadingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to load {}! Attempted path: {}",
            self.entry, self.path
        )
    }
}

impl std::error::Error for SourceError {}

impl std::error::Error for OutOfBoundsError {}

impl std::error::Error for ConfigurationError {}

impl std::error::Error for LoadingError {}

#[derive(Debug)]
pub enum Error {
    SourceUnavailable(SourceError),
    TileOutOfBounds(OutOfBoundsError),
    ConfigurationError(ConfigurationError),
    LoadingError(LoadingError),
}

impl Error {
    pub fn source_unavailable(level: u32, tile: Tile, reason: impl Into<String>) -> Self {
        Error::SourceUnavailable(SourceError::new(level, tile, reason))
    }

    pub fn out_of_bounds(level: u32, tile: Tile) -> Self {
        Error::TileOutOfBounds(OutOfBoundsError { level, tile })
    }

    pub fn configuration(field: &'static str, reason: impl Into<String>) -> Self {
        Error::ConfigurationError(ConfigurationError::new(field, reason))
    }

    /// Whether asking the source again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SourceUnavailable(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SourceUnavailable(err) => err.fmt(f),
            Error::TileOutOfBounds(err) => err.fmt(f),
            Error::ConfigurationError(err) => err.fmt(f),
            Error::LoadingError(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::SourceUnavailable(err) => Some(err),
            Error::TileOutOfBounds(err) => Some(err),
            Error::ConfigurationError(err) => Some(err),
            Error::LoadingError(err) => Some(err),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(value: image::ImageError) -> Self {
        Error::LoadingError(LoadingError {
            entry: "image".to_string(),
            path: value.to_string(),
        })
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::LoadingError(LoadingError {
            entry: "IO Loading Error".to_string(),
            path: value.to_string(),
        })
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::LoadingError(LoadingError {
            entry: "JSON FILE".to_string(),
            path: value.to_string(),
        })
    }
}
