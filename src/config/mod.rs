//! Device configuration.
//!
//! Static geometry and timing come from a TOML file; the detection
//! settings are one owned structure mutated only through validated
//! setters, and round-trip through the flat persisted layout.

mod file;
mod geometry;
mod persisted;
mod settings;

pub use file::{FileConfig, MetricsConfig, TimingConfig};
pub use geometry::GridGeometry;
pub use persisted::PersistedLoad;
pub use settings::{DetectionSettings, FlashMode, Thresholds, MAX_STORED_IMAGES};

/// Configuration errors. None of them abort the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {field}: {value} (allowed {min}-{max})")]
    InvalidConfiguration {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("mask cell ({column}, {row}) out of range")]
    MaskCellOutOfRange { column: u16, row: u16 },
    #[error("mask has {expected} cells, got {got}")]
    MaskSize { expected: usize, got: usize },
    #[error("invalid mask entry in settings")]
    InvalidMaskEntry,
    #[error("invalid grid geometry: {0}")]
    InvalidGeometry(String),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}
