use image::ColorType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("input image must be square: got {width}x{height}")]
    NotSquare { width: u32, height: u32 },

    #[error("input image must be single-channel 8-bit grayscale: got {0:?}")]
    NotGrayscale(ColorType),

    #[error("input image has no pixels")]
    EmptyImage,

    #[error("pixel buffer holds {actual} values, expected {expected} for a {side}x{side} image")]
    PixelCount { side: u32, expected: usize, actual: usize },

    #[error("encoded hash does not hold {expected} bits: {reason}")]
    MalformedHash { expected: usize, reason: String },

    #[error("block divisor {divisor} must be within 1..={side} for a {side}x{side} image")]
    BlockDivisor { divisor: u32, side: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("hash length mismatch: {left} bits vs {right} bits")]
    LengthMismatch { left: usize, right: usize },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The image (or encoded hash) handed in violates the input contract.
    Input,
    /// Block divisor, side length or another tunable is out of range.
    Configuration,
    /// Two hashes from different configurations were compared.
    LengthMismatch,
    /// Reading, decoding or parsing something from outside failed.
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotSquare { .. }
            | Error::NotGrayscale(_)
            | Error::EmptyImage
            | Error::PixelCount { .. }
            | Error::MalformedHash { .. } => ErrorKind::Input,
            Error::BlockDivisor { .. } | Error::Config(_) => ErrorKind::Configuration,
            Error::LengthMismatch { .. } => ErrorKind::LengthMismatch,
            Error::Image(_) | Error::Io(_) | Error::Yaml(_) | Error::Json(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
