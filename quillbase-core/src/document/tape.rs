// document/tape.rs
// Append-only scalar arena
//
// A tape holds the scalar elements of one document: a vector of elements
// plus a byte heap for string payloads. Elements are immutable once
// written and never relocate, so an `ElementRef` handed out at append time
// stays valid for the life of the tape.
//
// Each document carries two tapes: one filled while parsing source JSON
// and one filled by later writes. A leaf references its tape directly, so
// tries produced by `merge` may mix elements of several documents.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{LogicalType, PhysicalType};
use crate::value::ScalarValue;

/// Which of a document's two tapes an element lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeOrigin {
    /// Filled once while parsing the source JSON
    Immutable,
    /// Filled by writes after load
    Mutable,
}

/// Scalar payload at canonical widest width.
#[derive(Debug, Clone, Copy)]
pub enum Payload {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Int128(i128),
    Float(f64),
    /// Range into the tape's string heap
    Str { offset: u32, len: u32 },
}

/// One scalar on the tape. The logical type is preserved as written; the
/// physical width is derived from it.
#[derive(Debug, Clone, Copy)]
pub struct TapeElement {
    logical: LogicalType,
    payload: Payload,
}

impl TapeElement {
    pub fn logical_type(&self) -> LogicalType {
        self.logical
    }

    pub fn physical_type(&self) -> PhysicalType {
        let bool_value = matches!(self.payload, Payload::Bool(true));
        // scalars always have a physical width
        self.logical.physical(bool_value).unwrap_or(PhysicalType::Null)
    }

    pub fn payload(&self) -> Payload {
        self.payload
    }

    pub fn is_null(&self) -> bool {
        matches!(self.payload, Payload::Null)
    }
}

/// Append-only arena of scalar elements and string bytes.
pub struct Tape {
    elements: Vec<TapeElement>,
    strings: Vec<u8>,
}

impl Tape {
    pub fn new() -> Self {
        Tape {
            elements: Vec::new(),
            strings: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn push(&mut self, logical: LogicalType, payload: Payload) -> u32 {
        let index = self.elements.len() as u32;
        self.elements.push(TapeElement { logical, payload });
        index
    }

    pub fn push_string(&mut self, s: &str) -> u32 {
        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(s.as_bytes());
        self.push(
            LogicalType::StringLiteral,
            Payload::Str {
                offset,
                len: s.len() as u32,
            },
        )
    }

    pub fn element(&self, index: u32) -> &TapeElement {
        &self.elements[index as usize]
    }

    pub fn str_of(&self, element: &TapeElement) -> &str {
        match element.payload {
            Payload::Str { offset, len } => {
                let start = offset as usize;
                let end = start + len as usize;
                // the heap only ever receives whole &str slices
                std::str::from_utf8(&self.strings[start..end]).unwrap_or("")
            }
            _ => "",
        }
    }
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

pub type TapeHandle = Arc<RwLock<Tape>>;

pub fn new_tape_handle() -> TapeHandle {
    Arc::new(RwLock::new(Tape::new()))
}

/// Stable reference to one element: the owning tape plus its slot.
///
/// Cloning is cheap (an `Arc` bump); the referenced element never moves.
#[derive(Clone)]
pub struct ElementRef {
    tape: TapeHandle,
    origin: TapeOrigin,
    index: u32,
}

impl ElementRef {
    pub fn new(tape: TapeHandle, origin: TapeOrigin, index: u32) -> Self {
        ElementRef { tape, origin, index }
    }

    pub fn origin(&self) -> TapeOrigin {
        self.origin
    }

    pub fn logical_type(&self) -> LogicalType {
        self.tape.read().element(self.index).logical_type()
    }

    pub fn physical_type(&self) -> PhysicalType {
        self.tape.read().element(self.index).physical_type()
    }

    pub fn is_null(&self) -> bool {
        self.tape.read().element(self.index).is_null()
    }

    /// Detached copy of the scalar.
    pub fn as_scalar(&self) -> ScalarValue {
        let tape = self.tape.read();
        let element = tape.element(self.index);
        match element.payload() {
            Payload::Null => ScalarValue::Null,
            Payload::Bool(b) => ScalarValue::Bool(b),
            Payload::Int(v) => ScalarValue::Int(v),
            Payload::UInt(v) => ScalarValue::UInt(v),
            Payload::Int128(v) => ScalarValue::Int128(v),
            Payload::Float(v) => ScalarValue::Float(v),
            Payload::Str { .. } => ScalarValue::String(tape.str_of(element).to_string()),
        }
    }

    pub fn string_value(&self) -> String {
        let tape = self.tape.read();
        tape.str_of(tape.element(self.index)).to_string()
    }

    pub fn is_as<T: ElementAs>(&self) -> bool {
        let tape = self.tape.read();
        T::fits(tape.element(self.index))
    }

    pub fn get_as<T: ElementAs>(&self) -> Option<T> {
        let tape = self.tape.read();
        let element = *tape.element(self.index);
        if !T::fits(&element) {
            return None;
        }
        T::extract(&element, &tape)
    }

    /// Element equality as used by structural document comparison: same
    /// logical type, same value. An `Int8` and an `Int64` holding the same
    /// number are *not* equal here.
    pub fn equals(&self, other: &ElementRef) -> bool {
        if self.logical_type() != other.logical_type() {
            return false;
        }
        self.as_scalar() == other.as_scalar()
    }
}

impl std::fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementRef")
            .field("origin", &self.origin)
            .field("index", &self.index)
            .field("value", &self.as_scalar())
            .finish()
    }
}

/// Typed access to tape elements.
///
/// The widening rules: an integer type accepts stored values of the same
/// signedness whose logical width is the same or narrower; `f64` accepts
/// both float widths; `i128` accepts every integer.
pub trait ElementAs: Sized {
    fn fits(element: &TapeElement) -> bool;
    fn extract(element: &TapeElement, tape: &Tape) -> Option<Self>;
}

fn int_payload(element: &TapeElement) -> Option<i128> {
    match element.payload() {
        Payload::Int(v) => Some(i128::from(v)),
        Payload::UInt(v) => Some(i128::from(v)),
        Payload::Int128(v) => Some(v),
        _ => None,
    }
}

macro_rules! element_as_signed {
    ($ty:ty, $($accepted:pat_param)|+) => {
        impl ElementAs for $ty {
            fn fits(element: &TapeElement) -> bool {
                matches!(element.logical_type(), $($accepted)|+)
            }
            fn extract(element: &TapeElement, _tape: &Tape) -> Option<Self> {
                int_payload(element).and_then(|v| <$ty>::try_from(v).ok())
            }
        }
    };
}

element_as_signed!(i8, LogicalType::TinyInt);
element_as_signed!(i16, LogicalType::TinyInt | LogicalType::SmallInt);
element_as_signed!(i32, LogicalType::TinyInt | LogicalType::SmallInt | LogicalType::Integer);
element_as_signed!(
    i64,
    LogicalType::TinyInt | LogicalType::SmallInt | LogicalType::Integer | LogicalType::BigInt
);

macro_rules! element_as_unsigned {
    ($ty:ty, $($accepted:pat_param)|+) => {
        impl ElementAs for $ty {
            fn fits(element: &TapeElement) -> bool {
                matches!(element.logical_type(), $($accepted)|+)
            }
            fn extract(element: &TapeElement, _tape: &Tape) -> Option<Self> {
                int_payload(element).and_then(|v| <$ty>::try_from(v).ok())
            }
        }
    };
}

element_as_unsigned!(u8, LogicalType::UTinyInt);
element_as_unsigned!(u16, LogicalType::UTinyInt | LogicalType::USmallInt);
element_as_unsigned!(u32, LogicalType::UTinyInt | LogicalType::USmallInt | LogicalType::UInteger);
element_as_unsigned!(
    u64,
    LogicalType::UTinyInt | LogicalType::USmallInt | LogicalType::UInteger | LogicalType::UBigInt
);

impl ElementAs for i128 {
    fn fits(element: &TapeElement) -> bool {
        element.logical_type().is_signed() || element.logical_type().is_unsigned()
    }
    fn extract(element: &TapeElement, _tape: &Tape) -> Option<Self> {
        int_payload(element)
    }
}

impl ElementAs for bool {
    fn fits(element: &TapeElement) -> bool {
        element.logical_type() == LogicalType::Boolean
    }
    fn extract(element: &TapeElement, _tape: &Tape) -> Option<Self> {
        match element.payload() {
            Payload::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl ElementAs for f32 {
    fn fits(element: &TapeElement) -> bool {
        element.logical_type() == LogicalType::Float
    }
    fn extract(element: &TapeElement, _tape: &Tape) -> Option<Self> {
        match element.payload() {
            Payload::Float(v) => Some(v as f32),
            _ => None,
        }
    }
}

impl ElementAs for f64 {
    fn fits(element: &TapeElement) -> bool {
        element.logical_type().is_float()
    }
    fn extract(element: &TapeElement, _tape: &Tape) -> Option<Self> {
        match element.payload() {
            Payload::Float(v) => Some(v),
            _ => None,
        }
    }
}

impl ElementAs for String {
    fn fits(element: &TapeElement) -> bool {
        element.logical_type() == LogicalType::StringLiteral
    }
    fn extract(element: &TapeElement, tape: &Tape) -> Option<Self> {
        Some(tape.str_of(element).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(logical: LogicalType, payload: Payload) -> ElementRef {
        let handle = new_tape_handle();
        let index = handle.write().push(logical, payload);
        ElementRef::new(handle, TapeOrigin::Mutable, index)
    }

    #[test]
    fn test_tape_append_and_read() {
        let mut tape = Tape::new();
        let a = tape.push(LogicalType::Integer, Payload::Int(7));
        let b = tape.push_string("hello");
        assert_eq!(tape.len(), 2);
        assert!(matches!(tape.element(a).payload(), Payload::Int(7)));
        assert_eq!(tape.str_of(tape.element(b)), "hello");
    }

    #[test]
    fn test_string_heap_ranges() {
        let mut tape = Tape::new();
        let a = tape.push_string("abc");
        let b = tape.push_string("defg");
        assert_eq!(tape.str_of(tape.element(a)), "abc");
        assert_eq!(tape.str_of(tape.element(b)), "defg");
    }

    #[test]
    fn test_signed_widening() {
        let e = leaf(LogicalType::TinyInt, Payload::Int(5));
        assert!(e.is_as::<i8>());
        assert!(e.is_as::<i32>());
        assert!(e.is_as::<i64>());
        assert!(!e.is_as::<u8>());
        assert_eq!(e.get_as::<i64>(), Some(5));

        let wide = leaf(LogicalType::BigInt, Payload::Int(5));
        assert!(!wide.is_as::<i8>());
        assert!(wide.is_as::<i64>());
    }

    #[test]
    fn test_unsigned_widening() {
        let e = leaf(LogicalType::USmallInt, Payload::UInt(9));
        assert!(e.is_as::<u16>());
        assert!(e.is_as::<u64>());
        assert!(!e.is_as::<u8>());
        assert!(!e.is_as::<i64>());
    }

    #[test]
    fn test_float_widths() {
        let narrow = leaf(LogicalType::Float, Payload::Float(1.5));
        assert!(narrow.is_as::<f32>());
        assert!(narrow.is_as::<f64>());
        let wide = leaf(LogicalType::Double, Payload::Float(1.5));
        assert!(!wide.is_as::<f32>());
        assert!(wide.is_as::<f64>());
    }

    #[test]
    fn test_element_equality_respects_logical_type() {
        let a = leaf(LogicalType::TinyInt, Payload::Int(1));
        let b = leaf(LogicalType::BigInt, Payload::Int(1));
        let c = leaf(LogicalType::TinyInt, Payload::Int(1));
        assert!(!a.equals(&b));
        assert!(a.equals(&c));
    }

    #[test]
    fn test_physical_type_of_bool() {
        let t = leaf(LogicalType::Boolean, Payload::Bool(true));
        let f = leaf(LogicalType::Boolean, Payload::Bool(false));
        assert_eq!(t.physical_type(), PhysicalType::BoolTrue);
        assert_eq!(f.physical_type(), PhysicalType::BoolFalse);
    }
}
