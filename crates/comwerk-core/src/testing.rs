//! Test doubles exposed through real vtables

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::abi::{IUnknown, IUnknownVtbl};
use crate::lifetime::Lifetime;
use crate::scope::ComScope;

/// Observed calls on a counting object.
pub struct Counters {
    pub releases: AtomicUsize,
    pub drops: AtomicUsize,
}

impl Counters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            releases: AtomicUsize::new(0),
            drops: AtomicUsize::new(0),
        })
    }
}

struct Counted(Arc<Counters>);

impl Drop for Counted {
    fn drop(&mut self) {
        self.0.drops.fetch_add(1, Ordering::SeqCst);
    }
}

type CountedLifetime = Lifetime<IUnknownVtbl, Counted>;

unsafe extern "system" fn counting_release(this: *mut c_void) -> u32 {
    if let Some(object) = CountedLifetime::get_object(this) {
        object.0.releases.fetch_add(1, Ordering::SeqCst);
    }
    CountedLifetime::release(this)
}

static COUNTING_VTABLE: IUnknownVtbl = IUnknownVtbl {
    query_interface: CountedLifetime::query_interface::<IUnknown>,
    add_ref: CountedLifetime::add_ref,
    release: counting_release,
};

/// An `IUnknown` that records every Release and its own destruction.
pub fn counting_unknown(counters: &Arc<Counters>) -> ComScope<IUnknown> {
    let raw = CountedLifetime::allocate(Counted(counters.clone()), &COUNTING_VTABLE).unwrap();
    unsafe { ComScope::new(raw) }
}
