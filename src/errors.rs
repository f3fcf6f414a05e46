use std::{fmt, io, num::TryFromIntError};
use font_kit::error::{FontLoadingError, GlyphLoadingError};
use png::DecodingError;

#[derive(Debug)]
pub struct Error {
    pub message: String,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<regex::Error> for Error {
    fn from(value: regex::Error) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error {
            message: value
        }
    }
}

impl From<TryFromIntError> for Error {
    fn from(value: TryFromIntError) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<DecodingError> for Error {
    fn from(value: DecodingError) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<FontLoadingError> for Error {
    fn from(value: FontLoadingError) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<GlyphLoadingError> for Error {
    fn from(value: GlyphLoadingError) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
