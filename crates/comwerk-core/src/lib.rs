//! Comwerk: bridging Rust objects and COM interfaces
//!
//! This crate provides:
//! - [`ComScope`]: release-once ownership of a foreign interface pointer
//! - [`Lifetime`]: hand-built, reference-counted COM objects wrapping Rust values
//! - [`Dispatch`] / [`DispatchExt`]: late binding over `IDispatch`
//! - [`expose_dispatch`] and [`expose_class_factory`] to publish Rust objects
//!
//! ## Example
//! ```no_run
//! use comwerk_core::{DispatchExt, ComScope, IDispatch};
//!
//! fn caption(dispatch: &ComScope<IDispatch>) -> comwerk_common::Result<Option<i32>> {
//!     Ok(dispatch.property("Caption")?.as_i4())
//! }
//! ```

pub mod abi;
pub mod dispatch;
pub mod factory;
pub mod lifetime;
pub mod rooting;
pub mod scope;
pub mod variant;
pub mod wide;

#[cfg(test)]
mod testing;

pub use abi::{
    DispId, IClassFactory, IDispatch, ITypeInfo, IUnknown, Interface, DISPID_PROPERTYPUT,
    DISPID_UNKNOWN, DISPID_VALUE,
};
pub use dispatch::{expose_dispatch, Dispatch, DispatchExt, InvokeFlags};
pub use factory::{can_unload_now, expose_class_factory, server_locks};
pub use lifetime::Lifetime;
pub use rooting::{roots, RootHandle, RootTable};
pub use scope::ComScope;
pub use variant::{DispParams, ExcepInfo, Variant};
