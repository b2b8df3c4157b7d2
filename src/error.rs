//! Crate-level error type.
//!
//! Each layer has its own error enum; this one wraps them so facade callers
//! deal with a single type.

use crate::config::ConfigError;
use crate::invoke::InvokeError;
use crate::provision::ProvisionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("undefined input")]
    UndefinedInput,
    #[error("undefined output")]
    UndefinedOutput,
    /// The decoder was asked for an image but produced none.
    #[error("no image produced")]
    NoImage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Decode(#[from] image::ImageError),
}

impl Error {
    /// stderr of the tool, when a run failed.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Error::Invoke(e) => e.stderr(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
