//! Lifetime blocks for COM callable wrappers
//!
//! A COM object is a vtable pointer followed by instance data. [`Lifetime`]
//! builds one by hand: the instance data is a [`RootHandle`] that keeps the
//! wrapped Rust object alive and an atomic reference count. The block is
//! allocated natively, handed out as an `IUnknown*`, and torn down by the
//! `Release` call that takes the count to zero.
//!
//! The vtable must be long-lived (usually a `static` or a promoted `const`);
//! every block allocated for the same wrapper type shares it.

use std::alloc::{alloc, dealloc, Layout};
use std::any::Any;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{fence, AtomicI32, Ordering};
use std::sync::Arc;

use comwerk_common::status::{E_NOINTERFACE, E_POINTER, S_OK};
use comwerk_common::{ComError, Result};
use tracing::trace;
use windows::core::{GUID, HRESULT};

use crate::abi::{IUnknown, Interface};
use crate::rooting::{roots, RootHandle};

/// Native layout: `[vtable, root handle, ref count]`.
#[repr(C)]
pub struct Lifetime<V: 'static, T> {
    // Only read through the interface pointer.
    #[allow(dead_code)]
    vtable: *const V,
    handle: RootHandle,
    ref_count: AtomicI32,
    _object: PhantomData<fn() -> T>,
}

impl<V: 'static, T: Any + Send + Sync> Lifetime<V, T> {
    const LAYOUT: Layout = Layout::new::<Self>();

    /// IUnknown::AddRef. Safe to call from any thread.
    ///
    /// # Safety
    /// `this` must be null or a live block allocated by this `Lifetime<V, T>`.
    pub unsafe extern "system" fn add_ref(this: *mut c_void) -> u32 {
        if this.is_null() {
            return 0;
        }
        let lifetime = &*(this as *const Self);
        let count = lifetime.ref_count.fetch_add(1, Ordering::Relaxed) + 1;
        count as u32
    }

    /// IUnknown::Release. The call that takes the count to zero unroots the
    /// object and frees the block; concurrent releases never both do.
    ///
    /// # Safety
    /// `this` must be null or a live block allocated by this `Lifetime<V, T>`,
    /// and the caller must own one of its references.
    pub unsafe extern "system" fn release(this: *mut c_void) -> u32 {
        if this.is_null() {
            return 0;
        }
        let lifetime = this as *mut Self;
        let previous = (*lifetime).ref_count.fetch_sub(1, Ordering::Release);
        debug_assert!(
            previous > 0,
            "release on a lifetime block with no references"
        );

        if previous == 1 {
            fence(Ordering::Acquire);
            Self::destroy(lifetime);
        }

        (previous - 1).max(0) as u32
    }

    unsafe fn destroy(lifetime: *mut Self) {
        let handle = (*lifetime).handle;
        trace!(
            "Lifetime block {:p} reached zero, unrooting {:?}",
            lifetime,
            handle
        );
        ptr::drop_in_place(lifetime);
        dealloc(lifetime.cast::<u8>(), Self::LAYOUT);
        roots().free(handle);
    }

    /// Expose `object` with `vtable`. The block starts with one reference,
    /// which the caller owns.
    pub fn allocate(object: T, vtable: &'static V) -> Result<*mut IUnknown> {
        Self::allocate_shared(Arc::new(object), vtable)
    }

    /// Like [`allocate`](Self::allocate), but the caller may keep its own `Arc`.
    pub fn allocate_shared(object: Arc<T>, vtable: &'static V) -> Result<*mut IUnknown> {
        let lifetime = unsafe { alloc(Self::LAYOUT) } as *mut Self;
        if lifetime.is_null() {
            return Err(ComError::OutOfMemory(Self::LAYOUT.size()));
        }

        let handle = roots().root(object);
        unsafe {
            lifetime.write(Lifetime {
                vtable,
                handle,
                ref_count: AtomicI32::new(1),
                _object: PhantomData,
            });
        }
        trace!("Allocated lifetime block {:p} for {:?}", lifetime, handle);

        Ok(lifetime.cast::<IUnknown>())
    }

    /// The object wrapped by the block at `this`.
    ///
    /// # Safety
    /// `this` must be a live block allocated by this `Lifetime<V, T>`. Any other
    /// pointer is outside the contract: the ABI carries no type information to
    /// check against.
    pub unsafe fn get_object(this: *mut c_void) -> Option<Arc<T>> {
        if this.is_null() {
            return None;
        }
        let lifetime = &*(this as *const Self);
        roots().target::<T>(lifetime.handle)
    }

    /// IUnknown::QueryInterface answering `IUnknown` and `I`.
    ///
    /// # Safety
    /// Same contract as [`add_ref`](Self::add_ref); `riid` and `ppv` come from the caller.
    pub unsafe extern "system" fn query_interface<I: Interface>(
        this: *mut c_void,
        riid: *const GUID,
        ppv: *mut *mut c_void,
    ) -> HRESULT {
        if ppv.is_null() {
            return E_POINTER;
        }
        *ppv = ptr::null_mut();
        if riid.is_null() {
            return E_POINTER;
        }

        let riid = &*riid;
        if *riid == IUnknown::IID || *riid == I::IID {
            Self::add_ref(this);
            *ppv = this;
            S_OK
        } else {
            E_NOINTERFACE
        }
    }
}
