//! Error type for foreign calls

use thiserror::Error;
use windows::core::HRESULT;

use crate::status::{E_OUTOFMEMORY, E_POINTER};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComError {
    #[error("COM call failed: {0:?}")]
    Failed(HRESULT),

    #[error("Out of memory allocating {0} bytes")]
    OutOfMemory(usize),

    #[error("Interface pointer is null")]
    NullPointer,
}

impl ComError {
    /// The HRESULT to hand back across the ABI for this error.
    pub fn code(&self) -> HRESULT {
        match self {
            ComError::Failed(hr) => *hr,
            ComError::OutOfMemory(_) => E_OUTOFMEMORY,
            ComError::NullPointer => E_POINTER,
        }
    }
}

impl From<ComError> for HRESULT {
    fn from(error: ComError) -> Self {
        error.code()
    }
}

pub type Result<T> = std::result::Result<T, ComError>;

/// Turn a status into a `Result`, carrying failures verbatim.
pub fn check(hr: HRESULT) -> Result<()> {
    if hr.is_ok() {
        Ok(())
    } else {
        Err(ComError::Failed(hr))
    }
}
