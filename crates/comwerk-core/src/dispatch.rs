//! Late binding over `IDispatch`
//!
//! [`Dispatch`] is the narrow contract: resolve names to ids, then invoke by
//! id. [`DispatchExt`] layers property get/put and method calls on top of it.
//! Both directions are covered: `ComScope<IDispatch>` calls a native object
//! through its vtable, and [`expose_dispatch`] publishes a Rust `Dispatch`
//! implementation as a native `IDispatch`.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr;
use std::slice;

use comwerk_common::status::{
    DISP_E_EXCEPTION, DISP_E_UNKNOWNNAME, E_INVALIDARG, E_NOTIMPL, E_POINTER, E_UNEXPECTED, S_OK,
};
use comwerk_common::{check, BridgeConfig, ComError, Result};
use tracing::{debug, warn};
use windows::core::{GUID, HRESULT};

use crate::abi::{
    DispId, IDispatch, IDispatchVtbl, ITypeInfo, IUnknownVtbl, DISPID_PROPERTYPUT, DISPID_UNKNOWN,
};
use crate::lifetime::Lifetime;
use crate::scope::ComScope;
use crate::variant::{DispParams, ExcepInfo, Variant};
use crate::wide::{read_wide, WideNames};

/// Names are always resolved with the neutral locale.
const NAME_LOCALE: u32 = 0;

/// `IID_NULL`, required as the reserved `riid` argument.
const IID_NULL: GUID = GUID::zeroed();

/// `wFlags` of `IDispatch::Invoke`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeFlags(pub u16);

impl InvokeFlags {
    pub const METHOD: Self = Self(0x1);
    pub const PROPERTY_GET: Self = Self(0x2);
    pub const PROPERTY_PUT: Self = Self(0x4);
    pub const PROPERTY_PUT_REF: Self = Self(0x8);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A late-bound object.
pub trait Dispatch {
    /// Resolve `names` into `ids` (same order). Entries for unknown names are
    /// left as [`DISPID_UNKNOWN`] and the call returns `DISP_E_UNKNOWNNAME`.
    fn get_ids_of_names(&self, names: &[&str], locale: u32, ids: &mut [DispId]) -> HRESULT;

    fn invoke(
        &self,
        id: DispId,
        locale: u32,
        flags: InvokeFlags,
        params: &DispParams<'_>,
        result: Option<&mut Variant>,
    ) -> HRESULT;

    /// LCID used for invocations: the installed configuration's, else the thread's.
    fn locale(&self) -> u32 {
        BridgeConfig::installed().map_or_else(thread_locale, |config| config.locale)
    }
}

#[cfg(windows)]
fn thread_locale() -> u32 {
    unsafe { windows::Win32::Globalization::GetThreadLocale() }
}

#[cfg(not(windows))]
fn thread_locale() -> u32 {
    crate::abi::LOCALE_USER_DEFAULT
}

/// Treat "name not found" as a per-entry outcome, surface anything else.
fn resolution_status(hr: HRESULT) -> Result<()> {
    if hr.is_err() && hr != DISP_E_UNKNOWNNAME {
        debug!("GetIDsOfNames failed: {:?}", hr);
        return check(hr);
    }
    Ok(())
}

pub trait DispatchExt: Dispatch {
    /// Dispatch ids for `names`, in order. Missing names map to [`DISPID_UNKNOWN`].
    fn ids_of_names(&self, names: &[&str]) -> Result<Vec<DispId>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = vec![DISPID_UNKNOWN; names.len()];
        resolution_status(self.get_ids_of_names(names, NAME_LOCALE, &mut ids))?;
        Ok(ids)
    }

    /// Dispatch id for `name`, or [`DISPID_UNKNOWN`] if the object lacks it.
    fn id_of_name(&self, name: &str) -> Result<DispId> {
        let mut id = [DISPID_UNKNOWN];
        resolution_status(self.get_ids_of_names(&[name], NAME_LOCALE, &mut id))?;
        Ok(id[0])
    }

    /// Read a property by name. An unknown name yields an empty variant
    /// without invoking anything.
    fn property(&self, name: &str) -> Result<Variant> {
        let id = self.id_of_name(name)?;
        if id == DISPID_UNKNOWN {
            return Ok(Variant::empty());
        }

        let mut value = Variant::empty();
        let hr = self.invoke(
            id,
            self.locale(),
            InvokeFlags::PROPERTY_GET,
            &DispParams::none(),
            Some(&mut value),
        );

        // The id was just resolved, so the get is expected to succeed.
        if hr.is_err() {
            warn!(
                "Property get of resolved member {} ({}) failed: {:?}",
                name,
                id,
                hr
            );
        }
        debug_assert!(hr.is_ok(), "property get of resolved member failed");

        Ok(value)
    }

    /// Best-effort read by id. Failures leave the value empty.
    fn property_by_id(&self, id: DispId) -> Variant {
        let mut value = Variant::empty();
        let hr = self.invoke(
            id,
            self.locale(),
            InvokeFlags::PROPERTY_GET,
            &DispParams::none(),
            Some(&mut value),
        );
        if hr.is_err() {
            debug!("Property get of {} failed: {:?}", id, hr);
        }
        value
    }

    /// Write a property by id and return the raw status.
    fn set_property(&self, id: DispId, value: Variant) -> HRESULT {
        let mut args = [value];
        // The value of a put must be named DISPID_PROPERTYPUT or the callee
        // answers DISP_E_PARAMNOTFOUND.
        let mut named = [DISPID_PROPERTYPUT];
        let params = DispParams::new(&mut args, &mut named);

        self.invoke(id, self.locale(), InvokeFlags::PROPERTY_PUT, &params, None)
    }

    /// Call a method with positional `args` (first argument first).
    fn call_method(&self, id: DispId, mut args: Vec<Variant>) -> Result<Variant> {
        args.reverse();
        let mut named: [DispId; 0] = [];
        let params = DispParams::new(&mut args, &mut named);

        let mut value = Variant::empty();
        let hr = self.invoke(id, self.locale(), InvokeFlags::METHOD, &params, Some(&mut value));
        check(hr)?;
        Ok(value)
    }
}

impl<D: Dispatch + ?Sized> DispatchExt for D {}

// ============================================================================
// Native IDispatch through its vtable
// ============================================================================

impl ComScope<IDispatch> {
    fn vtbl(&self) -> &IDispatchVtbl {
        debug_assert!(!self.is_null());
        unsafe { &*(*self.value()).vtbl }
    }

    /// IDispatch::GetTypeInfoCount
    pub fn type_info_count(&self) -> Result<u32> {
        if self.is_null() {
            return Err(ComError::NullPointer);
        }
        let mut count = 0;
        check(unsafe { (self.vtbl().get_type_info_count)(self.value().cast(), &mut count) })?;
        Ok(count)
    }

    /// IDispatch::GetTypeInfo
    pub fn type_info(&self, index: u32) -> Result<ComScope<ITypeInfo>> {
        if self.is_null() {
            return Err(ComError::NullPointer);
        }
        let mut info = ComScope::<ITypeInfo>::null();
        let hr = unsafe {
            (self.vtbl().get_type_info)(
                self.value().cast(),
                index,
                self.locale(),
                info.as_out().cast::<*mut c_void>(),
            )
        };
        check(hr)?;
        Ok(info)
    }
}

impl ComScope<IDispatch> {
    fn ids_of_sendable_names(&self, names: &[&str], locale: u32, ids: &mut [DispId]) -> HRESULT {
        let (sendable, slots): (Vec<&str>, Vec<usize>) = names
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.contains('\0'))
            .map(|(slot, name)| (*name, slot))
            .unzip();
        debug!(
            "Not resolving {} name(s) with embedded NUL",
            names.len() - sendable.len()
        );

        ids[..names.len()].fill(DISPID_UNKNOWN);
        if sendable.is_empty() {
            return DISP_E_UNKNOWNNAME;
        }

        let mut resolved = vec![DISPID_UNKNOWN; sendable.len()];
        let hr = self.get_ids_of_names(&sendable, locale, &mut resolved);
        for (slot, id) in slots.into_iter().zip(resolved) {
            ids[slot] = id;
        }

        if hr.is_ok() {
            DISP_E_UNKNOWNNAME
        } else {
            hr
        }
    }
}

impl Dispatch for ComScope<IDispatch> {
    fn get_ids_of_names(&self, names: &[&str], locale: u32, ids: &mut [DispId]) -> HRESULT {
        if self.is_null() {
            return E_POINTER;
        }
        if ids.len() < names.len() {
            return E_INVALIDARG;
        }

        // UTF-16 names end at the first NUL, so a name containing one would
        // resolve as its prefix. Such names stay unknown and are never sent.
        if names.iter().any(|name| name.contains('\0')) {
            return self.ids_of_sendable_names(names, locale, ids);
        }

        let wide = WideNames::new(names);
        unsafe {
            (self.vtbl().get_ids_of_names)(
                self.value().cast(),
                &IID_NULL,
                wide.as_ptr(),
                wide.len() as u32,
                locale,
                ids.as_mut_ptr(),
            )
        }
    }

    fn invoke(
        &self,
        id: DispId,
        locale: u32,
        flags: InvokeFlags,
        params: &DispParams<'_>,
        result: Option<&mut Variant>,
    ) -> HRESULT {
        if self.is_null() {
            return E_POINTER;
        }

        let mut excep_info = ExcepInfo::default();
        let mut arg_err = 0u32;
        let result = result.map_or(ptr::null_mut(), |value| value as *mut Variant);

        let hr = unsafe {
            (self.vtbl().invoke)(
                self.value().cast(),
                id,
                &IID_NULL,
                locale,
                flags.0,
                params.as_raw(),
                result.cast::<c_void>(),
                (&mut excep_info as *mut ExcepInfo).cast::<c_void>(),
                &mut arg_err,
            )
        };
        if hr == DISP_E_EXCEPTION {
            if let Some(fill_in) = excep_info.deferred_fill_in {
                unsafe { fill_in(&mut excep_info) };
            }
            debug!(
                "Invoke of {} raised exception, scode 0x{:08X}: {}",
                id,
                excep_info.scode as u32,
                excep_info.description().unwrap_or_default()
            );
        }
        hr
    }
}

// ============================================================================
// Rust objects as native IDispatch
// ============================================================================

struct DispatchBridge<D>(PhantomData<D>);

impl<D: Dispatch + Send + Sync + 'static> DispatchBridge<D> {
    const VTABLE: IDispatchVtbl = IDispatchVtbl {
        base: IUnknownVtbl {
            query_interface: Lifetime::<IDispatchVtbl, D>::query_interface::<IDispatch>,
            add_ref: Lifetime::<IDispatchVtbl, D>::add_ref,
            release: Lifetime::<IDispatchVtbl, D>::release,
        },
        get_type_info_count: Self::get_type_info_count,
        get_type_info: Self::get_type_info,
        get_ids_of_names: Self::get_ids_of_names,
        invoke: Self::invoke,
    };

    unsafe extern "system" fn get_type_info_count(_this: *mut c_void, count: *mut u32) -> HRESULT {
        if count.is_null() {
            return E_POINTER;
        }
        *count = 0;
        S_OK
    }

    unsafe extern "system" fn get_type_info(
        _this: *mut c_void,
        _index: u32,
        _locale: u32,
        info: *mut *mut c_void,
    ) -> HRESULT {
        if !info.is_null() {
            *info = ptr::null_mut();
        }
        E_NOTIMPL
    }

    unsafe extern "system" fn get_ids_of_names(
        this: *mut c_void,
        _riid: *const GUID,
        names: *const *const u16,
        count: u32,
        locale: u32,
        ids: *mut DispId,
    ) -> HRESULT {
        if count == 0 {
            return S_OK;
        }
        if names.is_null() || ids.is_null() {
            return E_POINTER;
        }
        let Some(object) = Lifetime::<IDispatchVtbl, D>::get_object(this) else {
            return E_UNEXPECTED;
        };

        let owned: Vec<String> = slice::from_raw_parts(names, count as usize)
            .iter()
            .map(|&name| read_wide(name))
            .collect();
        let names: Vec<&str> = owned.iter().map(String::as_str).collect();
        let ids = slice::from_raw_parts_mut(ids, count as usize);
        ids.fill(DISPID_UNKNOWN);

        object.get_ids_of_names(&names, locale, ids)
    }

    #[allow(clippy::too_many_arguments)]
    unsafe extern "system" fn invoke(
        this: *mut c_void,
        id: DispId,
        _riid: *const GUID,
        locale: u32,
        flags: u16,
        params: *mut c_void,
        result: *mut c_void,
        _excep_info: *mut c_void,
        _arg_err: *mut u32,
    ) -> HRESULT {
        let Some(object) = Lifetime::<IDispatchVtbl, D>::get_object(this) else {
            return E_UNEXPECTED;
        };

        let none = DispParams::none();
        let params = DispParams::from_raw(params as *const DispParams<'_>).unwrap_or(&none);
        let result = (result as *mut Variant).as_mut();

        object.invoke(id, locale, InvokeFlags(flags), params, result)
    }
}

/// Publish `object` as a native `IDispatch`. The scope owns the initial reference.
pub fn expose_dispatch<D>(object: D) -> Result<ComScope<IDispatch>>
where
    D: Dispatch + Send + Sync + 'static,
{
    let raw = Lifetime::<IDispatchVtbl, D>::allocate(object, &DispatchBridge::<D>::VTABLE)?;
    Ok(unsafe { ComScope::new(raw.cast::<IDispatch>()) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use comwerk_common::status::{
        DISP_E_MEMBERNOTFOUND, DISP_E_PARAMNOTFOUND, DISP_E_TYPEMISMATCH, E_FAIL,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const CAPTION: DispId = 1;
    const WIDTH: DispId = 2;
    const VERSION: DispId = 3;
    const SUBTRACT: DispId = 10;
    const BROKEN: DispId = 20;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Names(Vec<String>),
        Invoke {
            id: DispId,
            locale: u32,
            flags: InvokeFlags,
            args: Vec<Option<i32>>,
            named: Vec<DispId>,
        },
    }

    /// Records every call. `Version` is read-only, `Broken` always fails.
    #[derive(Clone)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
        values: Arc<Mutex<HashMap<DispId, i32>>>,
    }

    impl Recorder {
        fn new() -> Self {
            let values = HashMap::from([(CAPTION, 100), (WIDTH, 640), (VERSION, 6)]);
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                values: Arc::new(Mutex::new(values)),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn invocations(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|call| matches!(call, Call::Invoke { .. }))
                .collect()
        }

        fn lookup(name: &str) -> Option<DispId> {
            match name.to_ascii_lowercase().as_str() {
                "caption" => Some(CAPTION),
                "width" => Some(WIDTH),
                "version" => Some(VERSION),
                "subtract" => Some(SUBTRACT),
                "broken" => Some(BROKEN),
                _ => None,
            }
        }
    }

    impl Dispatch for Recorder {
        fn get_ids_of_names(&self, names: &[&str], _locale: u32, ids: &mut [DispId]) -> HRESULT {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Names(names.iter().map(|name| name.to_string()).collect()));

            let mut hr = S_OK;
            for (name, id) in names.iter().zip(ids.iter_mut()) {
                match Self::lookup(name) {
                    Some(found) => *id = found,
                    None => hr = DISP_E_UNKNOWNNAME,
                }
            }
            hr
        }

        fn invoke(
            &self,
            id: DispId,
            locale: u32,
            flags: InvokeFlags,
            params: &DispParams<'_>,
            result: Option<&mut Variant>,
        ) -> HRESULT {
            self.calls.lock().unwrap().push(Call::Invoke {
                id,
                locale,
                flags,
                args: params.args().iter().map(Variant::as_i4).collect(),
                named: params.named_args().to_vec(),
            });

            if id == BROKEN {
                return E_FAIL;
            }
            let mut values = self.values.lock().unwrap();

            if flags.contains(InvokeFlags::PROPERTY_PUT) {
                if params.named_args() != [DISPID_PROPERTYPUT] {
                    return DISP_E_PARAMNOTFOUND;
                }
                if id == VERSION || !values.contains_key(&id) {
                    return DISP_E_MEMBERNOTFOUND;
                }
                match params.args()[0].as_i4() {
                    Some(value) => {
                        values.insert(id, value);
                        S_OK
                    }
                    None => DISP_E_TYPEMISMATCH,
                }
            } else if flags.contains(InvokeFlags::PROPERTY_GET) {
                let Some(&value) = values.get(&id) else {
                    return DISP_E_MEMBERNOTFOUND;
                };
                if let Some(result) = result {
                    *result = Variant::from_i4(value);
                }
                S_OK
            } else if id == SUBTRACT {
                // Arguments arrive last-to-first
                let args = params.args();
                let (Some(b), Some(a)) = (args[0].as_i4(), args[1].as_i4()) else {
                    return E_INVALIDARG;
                };
                if let Some(result) = result {
                    *result = Variant::from_i4(a - b);
                }
                S_OK
            } else {
                DISP_E_MEMBERNOTFOUND
            }
        }
    }

    /// Resolves nothing and fails every resolution with `E_FAIL`.
    struct Unreachable;

    impl Dispatch for Unreachable {
        fn get_ids_of_names(&self, _names: &[&str], _locale: u32, _ids: &mut [DispId]) -> HRESULT {
            E_FAIL
        }

        fn invoke(
            &self,
            _id: DispId,
            _locale: u32,
            _flags: InvokeFlags,
            _params: &DispParams<'_>,
            _result: Option<&mut Variant>,
        ) -> HRESULT {
            E_FAIL
        }
    }

    #[test]
    fn test_ids_of_names_in_order() {
        let recorder = Recorder::new();
        let ids = recorder.ids_of_names(&["Width", "Caption"]).unwrap();
        assert_eq!(ids, vec![WIDTH, CAPTION]);
    }

    #[test]
    fn test_ids_of_names_with_missing_entries() {
        let recorder = Recorder::new();
        let ids = recorder.ids_of_names(&["Caption", "Nope", "Width"]).unwrap();
        assert_eq!(ids, vec![CAPTION, DISPID_UNKNOWN, WIDTH]);
        assert_eq!(recorder.calls().len(), 1);
    }

    #[test]
    fn test_ids_of_names_empty_makes_no_call() {
        let recorder = Recorder::new();
        assert!(recorder.ids_of_names(&[]).unwrap().is_empty());
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_resolution_failure_is_surfaced() {
        assert_eq!(Unreachable.ids_of_names(&["x"]), Err(ComError::Failed(E_FAIL)));
        assert_eq!(Unreachable.id_of_name("x"), Err(ComError::Failed(E_FAIL)));
        assert_eq!(Unreachable.property("x").unwrap_err(), ComError::Failed(E_FAIL));
    }

    #[test]
    fn test_id_of_name() {
        let recorder = Recorder::new();
        assert_eq!(recorder.id_of_name("caption"), Ok(CAPTION));
        assert_eq!(recorder.id_of_name("Missing"), Ok(DISPID_UNKNOWN));
    }

    #[test]
    fn test_property_by_name() {
        let recorder = Recorder::new();
        let value = recorder.property("Width").unwrap();
        assert_eq!(value.as_i4(), Some(640));

        let invocations = recorder.invocations();
        assert_eq!(invocations.len(), 1);
        assert!(matches!(
            &invocations[0],
            Call::Invoke { id: WIDTH, flags: InvokeFlags::PROPERTY_GET, args, named, .. }
                if args.is_empty() && named.is_empty()
        ));
    }

    #[test]
    fn test_property_unknown_name_skips_invoke() {
        let recorder = Recorder::new();
        let value = recorder.property("Height").unwrap();
        assert!(value.is_empty());
        assert_eq!(recorder.calls(), vec![Call::Names(vec!["Height".to_string()])]);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "property get of resolved member failed")]
    fn test_property_of_resolved_member_asserts_success() {
        let recorder = Recorder::new();
        let _ = recorder.property("Broken");
    }

    #[test]
    fn test_property_by_id_tolerates_failure() {
        let recorder = Recorder::new();
        assert_eq!(recorder.property_by_id(CAPTION).as_i4(), Some(100));
        assert!(recorder.property_by_id(BROKEN).is_empty());
        assert!(recorder.property_by_id(99).is_empty());
    }

    #[test]
    fn test_set_property_tags_value() {
        let recorder = Recorder::new();
        assert_eq!(recorder.set_property(WIDTH, Variant::from_i4(800)), S_OK);
        assert_eq!(recorder.property_by_id(WIDTH).as_i4(), Some(800));

        for call in recorder.invocations() {
            if let Call::Invoke { flags, named, args, .. } = call {
                if flags == InvokeFlags::PROPERTY_PUT {
                    assert_eq!(named, vec![DISPID_PROPERTYPUT]);
                    assert_eq!(args, vec![Some(800)]);
                }
            }
        }
    }

    #[test]
    fn test_set_property_returns_raw_status() {
        let recorder = Recorder::new();
        assert_eq!(recorder.set_property(VERSION, Variant::from_i4(7)), DISP_E_MEMBERNOTFOUND);
        assert_eq!(
            recorder.set_property(CAPTION, Variant::from_bool(true)),
            DISP_E_TYPEMISMATCH
        );
        assert_eq!(recorder.set_property(BROKEN, Variant::from_i4(1)), E_FAIL);

        // Every put carried the tag, even the failing ones
        let puts: Vec<_> = recorder
            .invocations()
            .into_iter()
            .filter_map(|call| match call {
                Call::Invoke { flags: InvokeFlags::PROPERTY_PUT, named, .. } => Some(named),
                _ => None,
            })
            .collect();
        assert_eq!(puts.len(), 3);
        assert!(puts.iter().all(|named| named == &vec![DISPID_PROPERTYPUT]));
    }

    #[test]
    fn test_call_method_argument_order() {
        let recorder = Recorder::new();
        let value = recorder
            .call_method(SUBTRACT, vec![Variant::from_i4(10), Variant::from_i4(3)])
            .unwrap();
        assert_eq!(value.as_i4(), Some(7));
    }

    #[test]
    fn test_call_method_failure() {
        let recorder = Recorder::new();
        assert_eq!(
            recorder.call_method(BROKEN, Vec::new()).unwrap_err(),
            ComError::Failed(E_FAIL)
        );
    }

    #[test]
    fn test_invoke_locale_falls_back_to_thread() {
        let recorder = Recorder::new();
        recorder.property_by_id(CAPTION);
        let Call::Invoke { locale, .. } = &recorder.invocations()[0] else {
            panic!("expected an invocation");
        };
        // Nothing in this crate installs a configuration
        assert!(BridgeConfig::installed().is_none());
        assert_eq!(*locale, thread_locale());
        #[cfg(not(windows))]
        assert_eq!(*locale, crate::abi::LOCALE_USER_DEFAULT);
    }

    // ------------------------------------------------------------------------
    // Through a native vtable
    // ------------------------------------------------------------------------

    #[test]
    fn test_exposed_round_trip() {
        let recorder = Recorder::new();
        let dispatch = expose_dispatch(recorder.clone()).unwrap();

        assert_eq!(
            dispatch.ids_of_names(&["Caption", "Nope"]).unwrap(),
            vec![CAPTION, DISPID_UNKNOWN]
        );
        assert_eq!(dispatch.property("Width").unwrap().as_i4(), Some(640));
        assert_eq!(dispatch.set_property(CAPTION, Variant::from_i4(5)), S_OK);
        assert_eq!(dispatch.property_by_id(CAPTION).as_i4(), Some(5));
        assert_eq!(
            dispatch
                .call_method(SUBTRACT, vec![Variant::from_i4(2), Variant::from_i4(9)])
                .unwrap()
                .as_i4(),
            Some(-7)
        );

        assert!(recorder.calls().contains(&Call::Names(vec![
            "Caption".to_string(),
            "Nope".to_string()
        ])));
    }

    #[test]
    fn test_exposed_empty_and_unknown_names() {
        let recorder = Recorder::new();
        let dispatch = expose_dispatch(recorder.clone()).unwrap();

        assert!(dispatch.ids_of_names(&[]).unwrap().is_empty());
        assert!(recorder.calls().is_empty());

        assert!(dispatch.property("Height").unwrap().is_empty());
        assert!(recorder.invocations().is_empty());
    }

    #[test]
    fn test_exposed_name_with_nul_stays_unknown() {
        let recorder = Recorder::new();
        let dispatch = expose_dispatch(recorder.clone()).unwrap();

        assert_eq!(dispatch.id_of_name("Width\0Secret"), Ok(DISPID_UNKNOWN));
        assert!(dispatch.property("Width\0Secret").unwrap().is_empty());
        // Never reached the object, so no prefix was resolved
        assert!(recorder.calls().is_empty());

        let ids = dispatch.ids_of_names(&["Caption", "Width\0Secret", "Width"]).unwrap();
        assert_eq!(ids, vec![CAPTION, DISPID_UNKNOWN, WIDTH]);
        assert_eq!(
            recorder.calls(),
            vec![Call::Names(vec!["Caption".to_string(), "Width".to_string()])]
        );
    }

    #[test]
    fn test_exposed_put_is_tagged() {
        let recorder = Recorder::new();
        let dispatch = expose_dispatch(recorder.clone()).unwrap();
        assert_eq!(dispatch.set_property(VERSION, Variant::from_i4(1)), DISP_E_MEMBERNOTFOUND);
        assert!(matches!(
            &recorder.invocations()[0],
            Call::Invoke { named, .. } if named == &vec![DISPID_PROPERTYPUT]
        ));
    }

    #[cfg(windows)]
    #[test]
    fn test_exposed_string_result_is_owned() {
        use crate::variant::VT_BSTR;
        use windows::core::BSTR;

        struct Titled;

        impl Dispatch for Titled {
            fn get_ids_of_names(
                &self,
                names: &[&str],
                _locale: u32,
                ids: &mut [DispId],
            ) -> HRESULT {
                if names[0] == "Title" {
                    ids[0] = 5;
                    S_OK
                } else {
                    DISP_E_UNKNOWNNAME
                }
            }

            fn invoke(
                &self,
                _id: DispId,
                _locale: u32,
                _flags: InvokeFlags,
                _params: &DispParams<'_>,
                result: Option<&mut Variant>,
            ) -> HRESULT {
                if let Some(result) = result {
                    let title = BSTR::from("Main window").into_raw();
                    *result = unsafe { Variant::from_raw_parts(VT_BSTR, title as *mut c_void) };
                }
                S_OK
            }
        }

        let dispatch = expose_dispatch(Titled).unwrap();
        let mut title = dispatch.property("Title").unwrap();
        assert_eq!(title.vt(), VT_BSTR);

        let copy = title.clone();
        title.clear();
        assert!(title.is_empty());
        assert_eq!(copy.as_string().as_deref(), Some("Main window"));
    }

    #[test]
    fn test_exposed_query_and_release() {
        let recorder = Recorder::new();
        let dispatch = expose_dispatch(recorder.clone()).unwrap();
        let calls = Arc::downgrade(&recorder.calls);
        drop(recorder);

        let again = dispatch.query::<IDispatch>().unwrap();
        assert_eq!(again.value(), dispatch.value());
        drop(dispatch);
        assert!(calls.upgrade().is_some());
        drop(again);
        // The exposed object was unrooted with the last reference
        assert!(calls.upgrade().is_none());
    }

    #[test]
    fn test_exposed_type_info() {
        let dispatch = expose_dispatch(Recorder::new()).unwrap();
        assert_eq!(dispatch.type_info_count(), Ok(0));
        assert_eq!(dispatch.type_info(0).unwrap_err(), ComError::Failed(E_NOTIMPL));
    }

    #[test]
    fn test_null_scope_dispatch() {
        let dispatch = ComScope::<IDispatch>::null();
        let mut ids = [DISPID_UNKNOWN];
        assert_eq!(dispatch.get_ids_of_names(&["x"], 0, &mut ids), E_POINTER);
        assert_eq!(dispatch.id_of_name("x"), Err(ComError::Failed(E_POINTER)));
        assert!(dispatch.property_by_id(1).is_empty());
        assert_eq!(dispatch.type_info_count(), Err(ComError::NullPointer));
    }
}
