//! Scoped interface pointer
//!
//! [`ComScope`] owns exactly one reference on a COM interface and releases it
//! when it goes out of scope, on every exit path. It is neither `Clone` nor
//! `Send`: moving it moves the release obligation.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;

use comwerk_common::{check, ComError, Result};

use crate::abi::{self, IUnknown, Interface};

pub struct ComScope<T: Interface = IUnknown> {
    ptr: *mut T,
    _marker: PhantomData<T>,
}

impl<T: Interface> ComScope<T> {
    /// Take ownership of a reference the caller already holds. No AddRef is done.
    ///
    /// # Safety
    /// `ptr` must be null or a live `T` interface pointer whose reference is
    /// being handed over.
    pub unsafe fn new(ptr: *mut T) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    /// An empty scope, typically filled through [`as_out`](Self::as_out).
    pub fn null() -> Self {
        Self {
            ptr: ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    /// The underlying pointer, for passing to ABI calls. Ownership stays here.
    pub fn value(&self) -> *mut T {
        self.ptr
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Address of the internal slot, for out-parameters that return a new reference.
    ///
    /// A pointer already held is released first.
    pub fn as_out(&mut self) -> *mut *mut T {
        debug_assert!(
            self.ptr.is_null(),
            "out-parameter scope already holds a pointer"
        );
        self.release();
        &mut self.ptr
    }

    /// Hand the reference to the caller; this scope no longer releases it.
    pub fn into_raw(mut self) -> *mut T {
        std::mem::replace(&mut self.ptr, ptr::null_mut())
    }

    /// Release the reference now. Later calls, including the one from `Drop`, do nothing.
    pub fn release(&mut self) {
        // Cleared before calling out so a reentrant release cannot see the old value.
        let unknown = std::mem::replace(&mut self.ptr, ptr::null_mut());
        if !unknown.is_null() {
            unsafe {
                abi::release(unknown.cast::<c_void>());
            }
        }
    }

    /// QueryInterface for `U`. The returned scope owns the new reference.
    pub fn query<U: Interface>(&self) -> Result<ComScope<U>> {
        if self.is_null() {
            return Err(ComError::NullPointer);
        }
        let mut target = ComScope::<U>::null();
        let hr = unsafe {
            abi::query_interface(
                self.ptr.cast::<c_void>(),
                &U::IID,
                target.as_out().cast::<*mut c_void>(),
            )
        };
        check(hr)?;
        Ok(target)
    }

    /// Every interface starts with the IUnknown slots, so this needs no QueryInterface.
    pub fn into_unknown(self) -> ComScope<IUnknown> {
        unsafe { ComScope::new(self.into_raw().cast::<IUnknown>()) }
    }
}

impl<T: Interface> Drop for ComScope<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Interface> Default for ComScope<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Interface> fmt::Debug for ComScope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComScope").field(&self.ptr).finish()
    }
}
