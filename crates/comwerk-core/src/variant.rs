//! VARIANT, DISPPARAMS and EXCEPINFO in their ABI layouts
//!
//! Scalars and interface payloads are managed here. Any other payload a
//! callee writes (BSTR, SAFEARRAY, records, by-reference values) is handed to
//! OLE Automation: `VariantClear` on drop and `VariantCopy` on clone.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::slice;

use tracing::debug;

use crate::abi::{self, DispId, IDispatch, IUnknown};
use crate::scope::ComScope;

pub const VT_EMPTY: u16 = 0;
pub const VT_NULL: u16 = 1;
pub const VT_I4: u16 = 3;
pub const VT_R8: u16 = 5;
pub const VT_BSTR: u16 = 8;
pub const VT_DISPATCH: u16 = 9;
pub const VT_ERROR: u16 = 10;
pub const VT_BOOL: u16 = 11;
pub const VT_UNKNOWN: u16 = 13;
pub const VT_I8: u16 = 20;

pub const VARIANT_TRUE: i16 = -1;
pub const VARIANT_FALSE: i16 = 0;

#[repr(C)]
#[derive(Clone, Copy)]
union VariantData {
    i4: i32,
    i8: i64,
    r8: f64,
    boolean: i16,
    scode: i32,
    unknown: *mut c_void,
    bstr: *mut u16,
    // Sizes the union like the BRECORD arm: two pointers.
    record: [*mut c_void; 2],
}

/// A VARIANT. The payload is owned: interface references are released and
/// automation allocations freed on drop.
#[repr(C)]
pub struct Variant {
    vt: u16,
    reserved1: u16,
    reserved2: u16,
    reserved3: u16,
    data: VariantData,
}

impl Variant {
    const fn with(vt: u16, data: VariantData) -> Self {
        Self {
            vt,
            reserved1: 0,
            reserved2: 0,
            reserved3: 0,
            data,
        }
    }

    pub const fn empty() -> Self {
        Self::with(VT_EMPTY, VariantData { record: [ptr::null_mut(); 2] })
    }

    pub const fn null() -> Self {
        Self::with(VT_NULL, VariantData { record: [ptr::null_mut(); 2] })
    }

    pub fn from_i4(value: i32) -> Self {
        let mut variant = Self::empty();
        variant.vt = VT_I4;
        variant.data.i4 = value;
        variant
    }

    pub fn from_i8(value: i64) -> Self {
        let mut variant = Self::empty();
        variant.vt = VT_I8;
        variant.data.i8 = value;
        variant
    }

    pub fn from_f64(value: f64) -> Self {
        let mut variant = Self::empty();
        variant.vt = VT_R8;
        variant.data.r8 = value;
        variant
    }

    pub fn from_bool(value: bool) -> Self {
        let mut variant = Self::empty();
        variant.vt = VT_BOOL;
        variant.data.boolean = if value { VARIANT_TRUE } else { VARIANT_FALSE };
        variant
    }

    pub fn from_error(code: i32) -> Self {
        let mut variant = Self::empty();
        variant.vt = VT_ERROR;
        variant.data.scode = code;
        variant
    }

    /// Takes over the scope's reference.
    pub fn from_unknown(scope: ComScope<IUnknown>) -> Self {
        let mut variant = Self::empty();
        variant.vt = VT_UNKNOWN;
        variant.data.unknown = scope.into_raw().cast::<c_void>();
        variant
    }

    /// Takes over the scope's reference.
    pub fn from_dispatch(scope: ComScope<IDispatch>) -> Self {
        let mut variant = Self::empty();
        variant.vt = VT_DISPATCH;
        variant.data.unknown = scope.into_raw().cast::<c_void>();
        variant
    }

    /// Adopt a payload written by foreign code.
    ///
    /// # Safety
    /// `payload` must be valid for `vt` and owned by the caller; the variant
    /// frees it on drop.
    pub unsafe fn from_raw_parts(vt: u16, payload: *mut c_void) -> Self {
        let mut variant = Self::empty();
        variant.vt = vt;
        variant.data.unknown = payload;
        variant
    }

    pub fn vt(&self) -> u16 {
        self.vt
    }

    pub fn is_empty(&self) -> bool {
        self.vt == VT_EMPTY
    }

    pub fn as_i4(&self) -> Option<i32> {
        (self.vt == VT_I4).then(|| unsafe { self.data.i4 })
    }

    pub fn as_i8(&self) -> Option<i64> {
        (self.vt == VT_I8).then(|| unsafe { self.data.i8 })
    }

    pub fn as_f64(&self) -> Option<f64> {
        (self.vt == VT_R8).then(|| unsafe { self.data.r8 })
    }

    pub fn as_bool(&self) -> Option<bool> {
        (self.vt == VT_BOOL).then(|| unsafe { self.data.boolean } != VARIANT_FALSE)
    }

    pub fn as_error(&self) -> Option<i32> {
        (self.vt == VT_ERROR).then(|| unsafe { self.data.scode })
    }

    /// Copy of a BSTR payload, honouring its length prefix.
    pub fn as_string(&self) -> Option<String> {
        if self.vt != VT_BSTR {
            return None;
        }
        let bstr = unsafe { self.data.bstr };
        if bstr.is_null() {
            return Some(String::new());
        }
        Some(unsafe { read_bstr(bstr) })
    }

    /// Payloads this type manages without OLE Automation.
    fn is_managed(&self) -> bool {
        matches!(
            self.vt,
            VT_EMPTY
                | VT_NULL
                | VT_I4
                | VT_I8
                | VT_R8
                | VT_BOOL
                | VT_ERROR
                | VT_UNKNOWN
                | VT_DISPATCH
        )
    }

    fn interface_ptr(&self) -> Option<*mut c_void> {
        match self.vt {
            VT_UNKNOWN | VT_DISPATCH => {
                let unknown = unsafe { self.data.unknown };
                (!unknown.is_null()).then_some(unknown)
            }
            _ => None,
        }
    }

    /// Move the interface payload out as a scope; the variant becomes empty.
    pub fn take_dispatch(&mut self) -> Option<ComScope<IDispatch>> {
        if self.vt != VT_DISPATCH {
            return None;
        }
        let raw = self.take_interface()?;
        Some(unsafe { ComScope::new(raw.cast::<IDispatch>()) })
    }

    /// Move the interface payload out as a scope; the variant becomes empty.
    pub fn take_unknown(&mut self) -> Option<ComScope<IUnknown>> {
        let raw = self.take_interface()?;
        Some(unsafe { ComScope::new(raw.cast::<IUnknown>()) })
    }

    // Ownership of the reference moves to the caller; nothing is released.
    fn take_interface(&mut self) -> Option<*mut c_void> {
        let raw = self.interface_ptr()?;
        self.vt = VT_EMPTY;
        self.data = VariantData { record: [ptr::null_mut(); 2] };
        Some(raw)
    }

    /// Release any owned payload and reset to `VT_EMPTY`.
    pub fn clear(&mut self) {
        if let Some(unknown) = self.interface_ptr() {
            unsafe {
                abi::release(unknown);
            }
        } else if !self.is_managed() {
            automation::clear(self);
        }
        self.vt = VT_EMPTY;
        self.data = VariantData { record: [ptr::null_mut(); 2] };
    }
}

impl Drop for Variant {
    fn drop(&mut self) {
        self.clear();
    }
}

impl Clone for Variant {
    fn clone(&self) -> Self {
        if !self.is_managed() {
            return automation::copy(self);
        }
        if let Some(unknown) = self.interface_ptr() {
            unsafe {
                abi::add_ref(unknown);
            }
        }
        Self::with(self.vt, self.data)
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Variant");
        out.field("vt", &self.vt);
        match self.vt {
            VT_I4 => out.field("value", &unsafe { self.data.i4 }),
            VT_I8 => out.field("value", &unsafe { self.data.i8 }),
            VT_R8 => out.field("value", &unsafe { self.data.r8 }),
            VT_BOOL => out.field("value", &(unsafe { self.data.boolean } != VARIANT_FALSE)),
            VT_ERROR => out.field("value", &unsafe { self.data.scode }),
            VT_UNKNOWN | VT_DISPATCH => out.field("value", &unsafe { self.data.unknown }),
            _ => &mut out,
        };
        out.finish()
    }
}

/// DISPPARAMS borrowing its argument arrays.
///
/// Positional arguments are stored last-to-first, as the ABI requires; named
/// arguments occupy the first `named.len()` slots of `args`.
#[repr(C)]
pub struct DispParams<'a> {
    rgvarg: *mut Variant,
    rgdispid_named_args: *mut DispId,
    c_args: u32,
    c_named_args: u32,
    _borrow: PhantomData<&'a mut [Variant]>,
}

impl<'a> DispParams<'a> {
    pub fn new(args: &'a mut [Variant], named: &'a mut [DispId]) -> Self {
        debug_assert!(named.len() <= args.len(), "more named ids than arguments");
        Self {
            rgvarg: if args.is_empty() {
                ptr::null_mut()
            } else {
                args.as_mut_ptr()
            },
            rgdispid_named_args: if named.is_empty() {
                ptr::null_mut()
            } else {
                named.as_mut_ptr()
            },
            c_args: args.len() as u32,
            c_named_args: named.len() as u32,
            _borrow: PhantomData,
        }
    }

    /// No arguments.
    pub fn none() -> Self {
        Self {
            rgvarg: ptr::null_mut(),
            rgdispid_named_args: ptr::null_mut(),
            c_args: 0,
            c_named_args: 0,
            _borrow: PhantomData,
        }
    }

    /// Borrow a DISPPARAMS received across the ABI.
    ///
    /// # Safety
    /// `raw` must be null or point to a valid DISPPARAMS whose arrays hold at
    /// least `cArgs`/`cNamedArgs` elements and outlive `'a`.
    pub unsafe fn from_raw<'r>(raw: *const DispParams<'a>) -> Option<&'r DispParams<'a>> {
        raw.as_ref()
    }

    pub fn as_raw(&self) -> *mut c_void {
        self as *const Self as *mut c_void
    }

    pub fn args(&self) -> &[Variant] {
        if self.rgvarg.is_null() || self.c_args == 0 {
            return &[];
        }
        unsafe { slice::from_raw_parts(self.rgvarg, self.c_args as usize) }
    }

    pub fn named_args(&self) -> &[DispId] {
        if self.rgdispid_named_args.is_null() || self.c_named_args == 0 {
            return &[];
        }
        unsafe { slice::from_raw_parts(self.rgdispid_named_args, self.c_named_args as usize) }
    }
}

/// EXCEPINFO. The BSTR fields a callee fills in are freed on drop.
#[repr(C)]
pub struct ExcepInfo {
    pub code: u16,
    pub reserved: u16,
    pub source: *mut u16,
    pub description: *mut u16,
    pub help_file: *mut u16,
    pub help_context: u32,
    pub reserved_ptr: *mut c_void,
    pub deferred_fill_in: Option<unsafe extern "system" fn(*mut ExcepInfo) -> i32>,
    pub scode: i32,
}

impl Default for ExcepInfo {
    fn default() -> Self {
        Self {
            code: 0,
            reserved: 0,
            source: ptr::null_mut(),
            description: ptr::null_mut(),
            help_file: ptr::null_mut(),
            help_context: 0,
            reserved_ptr: ptr::null_mut(),
            deferred_fill_in: None,
            scode: 0,
        }
    }
}

impl ExcepInfo {
    /// `bstrDescription`, if the callee supplied one.
    pub fn description(&self) -> Option<String> {
        (!self.description.is_null()).then(|| unsafe { read_bstr(self.description) })
    }
}

impl Drop for ExcepInfo {
    fn drop(&mut self) {
        for field in [&mut self.source, &mut self.description, &mut self.help_file] {
            let bstr = std::mem::replace(field, ptr::null_mut());
            if !bstr.is_null() {
                automation::free_string(bstr);
            }
        }
    }
}

/// # Safety
/// `bstr` must be a non-null BSTR: a length prefix in bytes precedes the characters.
unsafe fn read_bstr(bstr: *const u16) -> String {
    let bytes = *bstr.cast::<u32>().sub(1);
    String::from_utf16_lossy(slice::from_raw_parts(bstr, bytes as usize / 2))
}

#[cfg(windows)]
mod automation {
    use windows::core::BSTR;
    use windows::Win32::System::Variant::{VariantClear, VariantCopy};

    use super::{debug, Variant};

    pub(super) fn clear(variant: &mut Variant) {
        if let Err(error) = unsafe { VariantClear((variant as *mut Variant).cast()) } {
            debug!("VariantClear of type {} failed: {:?}", variant.vt, error);
        }
    }

    pub(super) fn copy(variant: &Variant) -> Variant {
        let mut copy = Variant::empty();
        let source = (variant as *const Variant).cast();
        if let Err(error) = unsafe { VariantCopy((&mut copy as *mut Variant).cast(), source) } {
            debug!("VariantCopy of type {} failed: {:?}", variant.vt, error);
        }
        copy
    }

    pub(super) fn free_string(bstr: *mut u16) {
        drop(unsafe { BSTR::from_raw(bstr) });
    }
}

// Without OLE Automation there is no allocator to return foreign payloads to.
#[cfg(not(windows))]
mod automation {
    use super::{debug, Variant};

    pub(super) fn clear(variant: &mut Variant) {
        debug!("Dropping unmanaged payload of type {}", variant.vt);
    }

    pub(super) fn copy(variant: &Variant) -> Variant {
        debug!("Unmanaged payload of type {} copied as empty", variant.vt);
        Variant::empty()
    }

    pub(super) fn free_string(_bstr: *mut u16) {}
}
