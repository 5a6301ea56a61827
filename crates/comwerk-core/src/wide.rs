//! NUL-terminated UTF-16 name arrays for `GetIDsOfNames`

/// Owns the UTF-16 buffers and the pointer array passed as `rgszNames`.
pub struct WideNames {
    // Pointers in `ptrs` point into these; heap buffers do not move.
    _buffers: Vec<Vec<u16>>,
    ptrs: Vec<*const u16>,
}

impl WideNames {
    pub fn new(names: &[&str]) -> Self {
        let buffers: Vec<Vec<u16>> = names
            .iter()
            .map(|name| name.encode_utf16().chain(std::iter::once(0)).collect())
            .collect();
        let ptrs = buffers.iter().map(|buffer| buffer.as_ptr()).collect();
        Self {
            _buffers: buffers,
            ptrs,
        }
    }

    pub fn as_ptr(&self) -> *const *const u16 {
        self.ptrs.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }
}

/// Read a NUL-terminated UTF-16 string. Invalid sequences become U+FFFD.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated UTF-16 buffer.
pub unsafe fn read_wide(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
}
