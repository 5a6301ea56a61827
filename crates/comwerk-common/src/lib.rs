//! Common utilities and types shared across Comwerk crates
//!
//! - [`ComError`] and the crate-wide [`Result`] alias
//! - HRESULT status codes the bridge distinguishes explicitly
//! - [`BridgeConfig`] and logging setup

pub mod config;
pub mod error;
pub mod logging;

pub use config::{BridgeConfig, ConfigError};
pub use error::{check, ComError, Result};

/// HRESULT status codes used by the bridge.
pub mod status {
    pub use windows::core::HRESULT;
    pub use windows::Win32::Foundation::{
        CLASS_E_NOAGGREGATION, DISP_E_EXCEPTION, DISP_E_MEMBERNOTFOUND, DISP_E_PARAMNOTFOUND,
        DISP_E_TYPEMISMATCH, DISP_E_UNKNOWNNAME, E_FAIL, E_INVALIDARG, E_NOINTERFACE, E_NOTIMPL,
        E_OUTOFMEMORY, E_POINTER, E_UNEXPECTED, S_OK,
    };
}
