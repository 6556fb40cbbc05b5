//! The VM slot ABI. A [`Slot`] is an untyped 64-bit cell; which member is
//! live is decided by the IL type kind of the value it holds. Every mapping
//! from kind to member, staging buffer and memory layout lives in
//! [`KIND_TABLE`].

use core::ffi::c_void;

use strum::EnumCount;
use thiserror::Error;

use crate::middle::il::TypeKind;

/// Opaque handle to a runtime-owned string
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtString(pub *mut c_void);

impl RtString {
    pub const NULL: Self = Self(core::ptr::null_mut());

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union Slot {
    pub i64: i64,
    pub f64: f64,
    pub ptr: *mut c_void,
    pub str: RtString,
}

// Every member is plain data no wider than `i64`, so any member can be read
// back after any other was written; slots are always created zeroed so no
// byte is ever uninitialised.
impl Slot {
    pub const fn zeroed() -> Self {
        Self { i64: 0 }
    }

    pub fn from_i64(value: i64) -> Self {
        let mut slot = Self::zeroed();
        slot.i64 = value;
        slot
    }

    pub fn from_f64(value: f64) -> Self {
        let mut slot = Self::zeroed();
        slot.f64 = value;
        slot
    }

    pub fn from_ptr(value: *mut c_void) -> Self {
        let mut slot = Self::zeroed();
        slot.ptr = value;
        slot
    }

    pub fn from_rt_str(value: RtString) -> Self {
        let mut slot = Self::zeroed();
        slot.str = value;
        slot
    }

    pub fn i64(&self) -> i64 {
        unsafe { self.i64 }
    }

    pub fn f64(&self) -> f64 {
        unsafe { self.f64 }
    }

    pub fn ptr(&self) -> *mut c_void {
        unsafe { self.ptr }
    }

    pub fn rt_str(&self) -> RtString {
        unsafe { self.str }
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl core::fmt::Debug for Slot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Slot({:#018x})", self.i64())
    }
}

/// Staging area for runtime call results, one field per slot member.
#[derive(Debug, Clone, Copy)]
pub struct ResultBuffers {
    pub i64: i64,
    pub f64: f64,
    pub ptr: *mut c_void,
    pub str: RtString,
}

impl Default for ResultBuffers {
    fn default() -> Self {
        Self {
            i64: 0,
            f64: 0.0,
            ptr: core::ptr::null_mut(),
            str: RtString::NULL,
        }
    }
}

/// The slot member a kind lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotField {
    I64,
    F64,
    Ptr,
    Str,
}

/// Mutable view of one slot member or result buffer field
#[derive(Debug)]
pub enum SlotRef<'a> {
    I64(&'a mut i64),
    F64(&'a mut f64),
    Ptr(&'a mut *mut c_void),
    Str(&'a mut RtString),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    /// No memory representation; loads produce zero, stores do nothing
    None,
    Bool,
    I16,
    I32,
    I64,
    F64,
    Ptr,
    Str,
}

#[derive(Debug, Clone, Copy)]
pub struct KindAbi {
    pub kind: TypeKind,
    pub field: Option<SlotField>,
    /// Bytes occupied in memory
    pub size: usize,
    codec: Codec,
}

const PTR_SIZE: usize = core::mem::size_of::<*mut c_void>();

const fn row(kind: TypeKind, field: Option<SlotField>, size: usize, codec: Codec) -> KindAbi {
    KindAbi {
        kind,
        field,
        size,
        codec,
    }
}

/// One row per [`TypeKind`], in declaration order.
pub const KIND_TABLE: [KindAbi; TypeKind::COUNT] = [
    row(TypeKind::Void, None, 0, Codec::None),
    row(TypeKind::I1, Some(SlotField::I64), 1, Codec::Bool),
    row(TypeKind::I16, Some(SlotField::I64), 2, Codec::I16),
    row(TypeKind::I32, Some(SlotField::I64), 4, Codec::I32),
    row(TypeKind::I64, Some(SlotField::I64), 8, Codec::I64),
    row(TypeKind::F64, Some(SlotField::F64), 8, Codec::F64),
    row(TypeKind::Ptr, Some(SlotField::Ptr), PTR_SIZE, Codec::Ptr),
    row(TypeKind::Str, Some(SlotField::Str), PTR_SIZE, Codec::Str),
    row(TypeKind::Error, None, 0, Codec::None),
    row(TypeKind::ResumeTok, None, 0, Codec::None),
];

const _: () = {
    let mut i = 0;
    while i < KIND_TABLE.len() {
        assert!(
            KIND_TABLE[i].kind as usize == i,
            "KIND_TABLE rows must follow TypeKind declaration order"
        );
        i += 1;
    }
};

pub fn abi(kind: TypeKind) -> &'static KindAbi {
    &KIND_TABLE[kind as usize]
}

pub fn field_of(kind: TypeKind) -> Option<SlotField> {
    abi(kind).field
}

pub fn memory_size(kind: TypeKind) -> usize {
    abi(kind).size
}

/// The live member of `slot` for `kind`, or `None` for kinds without a
/// runtime representation.
pub fn slot_pointer(slot: &mut Slot, kind: TypeKind) -> Option<SlotRef<'_>> {
    // Taking a reference to any member is sound: see the note on `Slot`.
    let view = match field_of(kind)? {
        SlotField::I64 => SlotRef::I64(unsafe { &mut slot.i64 }),
        SlotField::F64 => SlotRef::F64(unsafe { &mut slot.f64 }),
        SlotField::Ptr => SlotRef::Ptr(unsafe { &mut slot.ptr }),
        SlotField::Str => SlotRef::Str(unsafe { &mut slot.str }),
    };
    Some(view)
}

pub fn result_buffer(buffers: &mut ResultBuffers, kind: TypeKind) -> Option<SlotRef<'_>> {
    let view = match field_of(kind)? {
        SlotField::I64 => SlotRef::I64(&mut buffers.i64),
        SlotField::F64 => SlotRef::F64(&mut buffers.f64),
        SlotField::Ptr => SlotRef::Ptr(&mut buffers.ptr),
        SlotField::Str => SlotRef::Str(&mut buffers.str),
    };
    Some(view)
}

/// Installs the staged result for `kind` into `slot`. Void-like kinds leave
/// the slot untouched.
pub fn assign_from_buffer(slot: &mut Slot, kind: TypeKind, buffers: &ResultBuffers) {
    match field_of(kind) {
        Some(SlotField::I64) => slot.i64 = buffers.i64,
        Some(SlotField::F64) => slot.f64 = buffers.f64,
        Some(SlotField::Ptr) => slot.ptr = buffers.ptr,
        Some(SlotField::Str) => slot.str = buffers.str,
        None => {}
    }
}

/// Copies the member live for `kind` from `from` into `to`.
pub fn copy_member(to: &mut Slot, from: &Slot, kind: TypeKind) {
    match field_of(kind) {
        Some(SlotField::I64) => to.i64 = from.i64(),
        Some(SlotField::F64) => to.f64 = from.f64(),
        Some(SlotField::Ptr) => to.ptr = from.ptr(),
        Some(SlotField::Str) => to.str = from.rt_str(),
        None => {}
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SlotAbiError {
    #[error("{kind} needs {needed} byte(s) of memory, only {available} available")]
    BufferTooSmall {
        kind: TypeKind,
        needed: usize,
        available: usize,
    },
}

fn check_len(kind: TypeKind, available: usize) -> Result<(), SlotAbiError> {
    let needed = memory_size(kind);
    if available < needed {
        return Err(SlotAbiError::BufferTooSmall {
            kind,
            needed,
            available,
        });
    }
    Ok(())
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut array = [0; N];
    array.copy_from_slice(&bytes[..N]);
    array
}

fn decode(kind: TypeKind, bytes: &[u8]) -> Slot {
    match abi(kind).codec {
        Codec::None => Slot::zeroed(),
        Codec::Bool => Slot::from_i64((bytes[0] & 1) as i64),
        Codec::I16 => Slot::from_i64(i16::from_ne_bytes(array(bytes)) as i64),
        Codec::I32 => Slot::from_i64(i32::from_ne_bytes(array(bytes)) as i64),
        Codec::I64 => Slot::from_i64(i64::from_ne_bytes(array(bytes))),
        Codec::F64 => Slot::from_f64(f64::from_ne_bytes(array(bytes))),
        Codec::Ptr => Slot::from_ptr(usize::from_ne_bytes(array(bytes)) as *mut c_void),
        Codec::Str => Slot::from_rt_str(RtString(
            usize::from_ne_bytes(array(bytes)) as *mut c_void,
        )),
    }
}

fn encode(kind: TypeKind, bytes: &mut [u8], slot: &Slot) {
    match abi(kind).codec {
        Codec::None => {}
        Codec::Bool => bytes[0] = (slot.i64() != 0) as u8,
        Codec::I16 => bytes[..2].copy_from_slice(&(slot.i64() as i16).to_ne_bytes()),
        Codec::I32 => bytes[..4].copy_from_slice(&(slot.i64() as i32).to_ne_bytes()),
        Codec::I64 => bytes[..8].copy_from_slice(&slot.i64().to_ne_bytes()),
        Codec::F64 => bytes[..8].copy_from_slice(&slot.f64().to_ne_bytes()),
        Codec::Ptr => bytes[..PTR_SIZE].copy_from_slice(&(slot.ptr() as usize).to_ne_bytes()),
        Codec::Str => {
            bytes[..PTR_SIZE].copy_from_slice(&(slot.rt_str().0 as usize).to_ne_bytes())
        }
    }
}

/// Reads a value of `kind` from memory: `i1` masks the low bit, `i16` and
/// `i32` sign-extend, wider kinds are copied verbatim.
pub fn load_from_bytes(kind: TypeKind, bytes: &[u8]) -> Result<Slot, SlotAbiError> {
    check_len(kind, bytes.len())?;
    Ok(decode(kind, bytes))
}

/// Writes the `kind` member of `slot` to memory: `i1` stores `slot != 0`,
/// `i16` and `i32` truncate.
pub fn store_to_bytes(kind: TypeKind, bytes: &mut [u8], slot: &Slot) -> Result<(), SlotAbiError> {
    check_len(kind, bytes.len())?;
    encode(kind, bytes, slot);
    Ok(())
}

/// # Safety
/// `ptr` must be valid for reads of `memory_size(kind)` bytes.
pub unsafe fn load_from_ptr(kind: TypeKind, ptr: *const u8) -> Slot {
    let bytes = unsafe { core::slice::from_raw_parts(ptr, memory_size(kind)) };
    decode(kind, bytes)
}

/// # Safety
/// `ptr` must be valid for writes of `memory_size(kind)` bytes.
pub unsafe fn store_to_ptr(kind: TypeKind, ptr: *mut u8, slot: &Slot) {
    let bytes = unsafe { core::slice::from_raw_parts_mut(ptr, memory_size(kind)) };
    encode(kind, bytes, slot);
}
