//! COM ABI descriptions
//!
//! Every interface pointer points at a struct whose first word is the vtable
//! pointer. Slots 0..2 of every vtable are QueryInterface/AddRef/Release, and
//! `this` is always the first argument.

use std::ffi::c_void;

use windows::core::{GUID, HRESULT};

pub use comwerk_common::config::LOCALE_USER_DEFAULT;

/// Identifier used by late-bound calls in place of a member name.
pub type DispId = i32;

/// Sentinel returned for names the object does not know.
pub const DISPID_UNKNOWN: DispId = -1;

/// Default member.
pub const DISPID_VALUE: DispId = 0;

/// Named-argument id that must tag the value of every property put.
pub const DISPID_PROPERTYPUT: DispId = -3;

/// An interface struct with a known IID.
///
/// # Safety
/// `Self` must be `#[repr(C)]` with the vtable pointer as its only field, and
/// the vtable must start with [`IUnknownVtbl`].
pub unsafe trait Interface: Sized {
    const IID: GUID;
}

// ============================================================================
// IUnknown
// ============================================================================

#[repr(C)]
pub struct IUnknownVtbl {
    pub query_interface:
        unsafe extern "system" fn(*mut c_void, *const GUID, *mut *mut c_void) -> HRESULT,
    pub add_ref: unsafe extern "system" fn(*mut c_void) -> u32,
    pub release: unsafe extern "system" fn(*mut c_void) -> u32,
}

#[repr(C)]
pub struct IUnknown {
    pub vtbl: *const IUnknownVtbl,
}

/// {00000000-0000-0000-C000-000000000046}
unsafe impl Interface for IUnknown {
    const IID: GUID = GUID::from_u128(0x00000000_0000_0000_c000_000000000046);
}

// ============================================================================
// IDispatch
// ============================================================================

#[repr(C)]
pub struct IDispatchVtbl {
    pub base: IUnknownVtbl,
    pub get_type_info_count: unsafe extern "system" fn(*mut c_void, *mut u32) -> HRESULT,
    pub get_type_info:
        unsafe extern "system" fn(*mut c_void, u32, u32, *mut *mut c_void) -> HRESULT,
    pub get_ids_of_names: unsafe extern "system" fn(
        *mut c_void,
        *const GUID,
        *const *const u16,
        u32,
        u32,
        *mut DispId,
    ) -> HRESULT,
    pub invoke: unsafe extern "system" fn(
        *mut c_void,
        DispId,
        *const GUID,
        u32,
        u16,
        *mut c_void,
        *mut c_void,
        *mut c_void,
        *mut u32,
    ) -> HRESULT,
}

#[repr(C)]
pub struct IDispatch {
    pub vtbl: *const IDispatchVtbl,
}

/// {00020400-0000-0000-C000-000000000046}
unsafe impl Interface for IDispatch {
    const IID: GUID = GUID::from_u128(0x00020400_0000_0000_c000_000000000046);
}

// ============================================================================
// IClassFactory
// ============================================================================

#[repr(C)]
pub struct IClassFactoryVtbl {
    pub base: IUnknownVtbl,
    pub create_instance: unsafe extern "system" fn(
        *mut c_void,
        *mut c_void,
        *const GUID,
        *mut *mut c_void,
    ) -> HRESULT,
    pub lock_server: unsafe extern "system" fn(*mut c_void, i32) -> HRESULT,
}

#[repr(C)]
pub struct IClassFactory {
    pub vtbl: *const IClassFactoryVtbl,
}

/// {00000001-0000-0000-C000-000000000046}
unsafe impl Interface for IClassFactory {
    const IID: GUID = GUID::from_u128(0x00000001_0000_0000_c000_000000000046);
}

// ============================================================================
// ITypeInfo (only the IUnknown prefix is described)
// ============================================================================

#[repr(C)]
pub struct ITypeInfo {
    pub vtbl: *const IUnknownVtbl,
}

/// {00020401-0000-0000-C000-000000000046}
unsafe impl Interface for ITypeInfo {
    const IID: GUID = GUID::from_u128(0x00020401_0000_0000_c000_000000000046);
}

// ============================================================================
// Slot 0..2 call-through
// ============================================================================

unsafe fn unknown_vtbl<'a>(this: *mut c_void) -> &'a IUnknownVtbl {
    &**(this as *const *const IUnknownVtbl)
}

/// IUnknown::AddRef
///
/// # Safety
/// `this` must be a live, non-null interface pointer.
pub unsafe fn add_ref(this: *mut c_void) -> u32 {
    (unknown_vtbl(this).add_ref)(this)
}

/// IUnknown::Release. `this` is invalid once this returns, whatever the count.
///
/// # Safety
/// `this` must be a live, non-null interface pointer the caller owns a reference on.
pub unsafe fn release(this: *mut c_void) -> u32 {
    (unknown_vtbl(this).release)(this)
}

/// IUnknown::QueryInterface
///
/// # Safety
/// `this` must be a live, non-null interface pointer and `out` writable.
pub unsafe fn query_interface(this: *mut c_void, iid: &GUID, out: *mut *mut c_void) -> HRESULT {
    (unknown_vtbl(this).query_interface)(this, iid, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_interface_is_one_pointer() {
        assert_eq!(size_of::<IUnknown>(), size_of::<*const c_void>());
        assert_eq!(size_of::<IDispatch>(), size_of::<*const c_void>());
    }

    #[test]
    fn test_vtable_slot_counts() {
        let slot = size_of::<*const c_void>();
        assert_eq!(size_of::<IUnknownVtbl>(), 3 * slot);
        assert_eq!(size_of::<IDispatchVtbl>(), 7 * slot);
        assert_eq!(size_of::<IClassFactoryVtbl>(), 5 * slot);
    }

    #[test]
    fn test_well_known_iids() {
        assert_eq!(IDispatch::IID.data1, 0x0002_0400);
        assert_eq!(IDispatch::IID.data4, [0xc0, 0, 0, 0, 0, 0, 0, 0x46]);
        assert_ne!(IUnknown::IID, IClassFactory::IID);
    }
}
