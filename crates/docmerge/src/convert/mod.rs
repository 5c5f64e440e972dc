//! Word-to-PDF conversion through an external renderer.

pub mod soffice;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConvertError;

pub use soffice::SofficeConverter;

/// Whether a converter can run on this machine, and why not if it cannot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    pub reason: String,
}

impl Availability {
    pub fn available(reason: impl Into<String>) -> Self {
        Self {
            available: true,
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: reason.into(),
        }
    }
}

/// Capability injected into the orchestrator. A session holds whatever
/// external resource the converter needs and releases it when dropped.
pub trait DocumentConverter: Send + Sync {
    fn availability(&self) -> Availability;

    fn open_session(
        &self,
        timeout: Duration,
    ) -> Result<Box<dyn ConversionSession + '_>, ConvertError>;
}

pub trait ConversionSession {
    /// Converts `source` into a PDF inside `out_dir` and returns its path.
    /// A conversion running past the session timeout is killed and reported
    /// as [`ConvertError::Timeout`].
    fn convert(&mut self, source: &Path, out_dir: &Path) -> Result<PathBuf, ConvertError>;
}

/// Converter for machines with no renderer at all.
pub struct NoConverter {
    reason: String,
}

impl NoConverter {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl DocumentConverter for NoConverter {
    fn availability(&self) -> Availability {
        Availability::unavailable(self.reason.clone())
    }

    fn open_session(
        &self,
        _timeout: Duration,
    ) -> Result<Box<dyn ConversionSession + '_>, ConvertError> {
        Err(ConvertError::Unavailable {
            reason: self.reason.clone(),
        })
    }
}
