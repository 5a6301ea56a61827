//! `IClassFactory` on top of lifetime blocks

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};

use comwerk_common::status::{CLASS_E_NOAGGREGATION, E_POINTER, E_UNEXPECTED, S_OK};
use comwerk_common::{check, ComError, Result};
use tracing::{debug, warn};
use windows::core::{GUID, HRESULT};

use crate::abi::{self, IClassFactory, IClassFactoryVtbl, IUnknown, IUnknownVtbl, Interface};
use crate::lifetime::Lifetime;
use crate::rooting::roots;
use crate::scope::ComScope;

/// Outstanding `LockServer(TRUE)` calls across all factories.
static SERVER_LOCKS: AtomicI32 = AtomicI32::new(0);

pub fn server_locks() -> i32 {
    SERVER_LOCKS.load(Ordering::SeqCst)
}

/// Whether a hosting module may unload: no server locks and no live exposed objects.
pub fn can_unload_now() -> bool {
    server_locks() == 0 && roots().is_empty()
}

/// Decrement `locks` unless it is already zero.
fn unlock(locks: &AtomicI32) -> bool {
    locks
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| (count > 0).then(|| count - 1))
        .is_ok()
}

struct ClassFactory<F> {
    create: F,
}

impl<F> ClassFactory<F>
where
    F: Fn() -> Result<ComScope<IUnknown>> + Send + Sync + 'static,
{
    const VTABLE: IClassFactoryVtbl = IClassFactoryVtbl {
        base: IUnknownVtbl {
            query_interface: Lifetime::<IClassFactoryVtbl, Self>::query_interface::<IClassFactory>,
            add_ref: Lifetime::<IClassFactoryVtbl, Self>::add_ref,
            release: Lifetime::<IClassFactoryVtbl, Self>::release,
        },
        create_instance: Self::create_instance,
        lock_server: Self::lock_server,
    };

    unsafe extern "system" fn create_instance(
        this: *mut c_void,
        outer: *mut c_void,
        riid: *const GUID,
        ppv: *mut *mut c_void,
    ) -> HRESULT {
        if ppv.is_null() {
            return E_POINTER;
        }
        *ppv = ptr::null_mut();
        if !outer.is_null() {
            return CLASS_E_NOAGGREGATION;
        }
        if riid.is_null() {
            return E_POINTER;
        }
        let Some(factory) = Lifetime::<IClassFactoryVtbl, Self>::get_object(this) else {
            return E_UNEXPECTED;
        };

        match (factory.create)() {
            Ok(instance) if instance.is_null() => E_POINTER,
            // The creation reference is dropped with `instance`; the caller
            // keeps the one QueryInterface added.
            Ok(instance) => abi::query_interface(instance.value().cast(), &*riid, ppv),
            Err(error) => {
                debug!("Class factory failed to create an instance: {}", error);
                error.code()
            }
        }
    }

    unsafe extern "system" fn lock_server(_this: *mut c_void, lock: i32) -> HRESULT {
        if lock != 0 {
            SERVER_LOCKS.fetch_add(1, Ordering::SeqCst);
        } else if !unlock(&SERVER_LOCKS) {
            warn!("LockServer(FALSE) without a matching lock");
            debug_assert!(false, "server lock count would go negative");
        }
        S_OK
    }
}

/// Publish a class factory whose instances come from `create`.
pub fn expose_class_factory<F>(create: F) -> Result<ComScope<IClassFactory>>
where
    F: Fn() -> Result<ComScope<IUnknown>> + Send + Sync + 'static,
{
    let raw = Lifetime::<IClassFactoryVtbl, ClassFactory<F>>::allocate(
        ClassFactory { create },
        &ClassFactory::<F>::VTABLE,
    )?;
    Ok(unsafe { ComScope::new(raw.cast::<IClassFactory>()) })
}

impl ComScope<IClassFactory> {
    fn vtbl(&self) -> &IClassFactoryVtbl {
        debug_assert!(!self.is_null());
        unsafe { &*(*self.value()).vtbl }
    }

    /// IClassFactory::CreateInstance for interface `T`, without aggregation.
    pub fn create_instance<T: Interface>(&self) -> Result<ComScope<T>> {
        if self.is_null() {
            return Err(ComError::NullPointer);
        }
        let mut instance = ComScope::<T>::null();
        let hr = unsafe {
            (self.vtbl().create_instance)(
                self.value().cast(),
                ptr::null_mut(),
                &T::IID,
                instance.as_out().cast::<*mut c_void>(),
            )
        };
        check(hr)?;
        Ok(instance)
    }

    /// IClassFactory::LockServer
    pub fn lock_server(&self, lock: bool) -> Result<()> {
        if self.is_null() {
            return Err(ComError::NullPointer);
        }
        check(unsafe { (self.vtbl().lock_server)(self.value().cast(), i32::from(lock)) })
    }
}
