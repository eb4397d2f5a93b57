// document/builder.rs
// Tape builder
//
// Appends scalars to a tape and hands back element references. The writer
// target is a type parameter so that identical construction code fills
// either the immutable (load-time) or mutable (write-time) tape.

use crate::types::LogicalType;
use crate::value::ScalarValue;

use super::tape::{ElementRef, Payload, TapeHandle, TapeOrigin};

/// Destination tape of a builder.
pub trait TapeWriter {
    fn handle(&self) -> &TapeHandle;
    fn origin(&self) -> TapeOrigin;
}

/// Writer for the load-time tape.
pub struct ImmutableWriter(pub TapeHandle);

impl TapeWriter for ImmutableWriter {
    fn handle(&self) -> &TapeHandle {
        &self.0
    }
    fn origin(&self) -> TapeOrigin {
        TapeOrigin::Immutable
    }
}

/// Writer for the post-load tape.
pub struct MutableWriter(pub TapeHandle);

impl TapeWriter for MutableWriter {
    fn handle(&self) -> &TapeHandle {
        &self.0
    }
    fn origin(&self) -> TapeOrigin {
        TapeOrigin::Mutable
    }
}

/// Single-writer builder over one tape.
pub struct TapeBuilder<W: TapeWriter> {
    writer: W,
}

impl<W: TapeWriter> TapeBuilder<W> {
    pub fn new(writer: W) -> Self {
        TapeBuilder { writer }
    }

    fn push(&self, logical: LogicalType, payload: Payload) -> ElementRef {
        let index = self.writer.handle().write().push(logical, payload);
        ElementRef::new(self.writer.handle().clone(), self.writer.origin(), index)
    }

    pub fn build_null(&self) -> ElementRef {
        self.push(LogicalType::Na, Payload::Null)
    }

    pub fn build_bool(&self, value: bool) -> ElementRef {
        self.push(LogicalType::Boolean, Payload::Bool(value))
    }

    /// Signed integers keep the narrowest logical type that holds the value.
    pub fn build_int(&self, value: i64) -> ElementRef {
        self.push(LogicalType::narrowest_signed(value), Payload::Int(value))
    }

    pub fn build_int_typed(&self, logical: LogicalType, value: i64) -> ElementRef {
        self.push(logical, Payload::Int(value))
    }

    pub fn build_uint(&self, value: u64) -> ElementRef {
        self.push(LogicalType::narrowest_unsigned(value), Payload::UInt(value))
    }

    pub fn build_uint_typed(&self, logical: LogicalType, value: u64) -> ElementRef {
        self.push(logical, Payload::UInt(value))
    }

    pub fn build_int128(&self, value: i128) -> ElementRef {
        self.push(LogicalType::HugeInt, Payload::Int128(value))
    }

    pub fn build_float(&self, value: f32) -> ElementRef {
        self.push(LogicalType::Float, Payload::Float(f64::from(value)))
    }

    pub fn build_double(&self, value: f64) -> ElementRef {
        self.push(LogicalType::Double, Payload::Float(value))
    }

    pub fn build_string(&self, value: &str) -> ElementRef {
        let index = self.writer.handle().write().push_string(value);
        ElementRef::new(self.writer.handle().clone(), self.writer.origin(), index)
    }

    pub fn build_scalar(&self, value: &ScalarValue) -> ElementRef {
        match value {
            ScalarValue::Null => self.build_null(),
            ScalarValue::Bool(b) => self.build_bool(*b),
            ScalarValue::Int(v) => self.build_int(*v),
            ScalarValue::UInt(v) => self.build_uint(*v),
            ScalarValue::Int128(v) => self.build_int128(*v),
            ScalarValue::Float(v) => self.build_double(*v),
            ScalarValue::String(s) => self.build_string(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tape::new_tape_handle;

    #[test]
    fn test_builder_fills_target_tape() {
        let handle = new_tape_handle();
        let builder = TapeBuilder::new(MutableWriter(handle.clone()));
        let a = builder.build_int(42);
        let b = builder.build_string("x");
        assert_eq!(handle.read().len(), 2);
        assert_eq!(a.get_as::<i64>(), Some(42));
        assert_eq!(b.string_value(), "x");
        assert_eq!(a.origin(), TapeOrigin::Mutable);
    }

    #[test]
    fn test_builder_origin_marks() {
        let handle = new_tape_handle();
        let builder = TapeBuilder::new(ImmutableWriter(handle.clone()));
        let e = builder.build_bool(true);
        assert_eq!(e.origin(), TapeOrigin::Immutable);
    }

    #[test]
    fn test_narrowest_logical_type() {
        let handle = new_tape_handle();
        let builder = TapeBuilder::new(MutableWriter(handle));
        assert_eq!(builder.build_int(3).logical_type(), LogicalType::TinyInt);
        assert_eq!(builder.build_int(40_000).logical_type(), LogicalType::Integer);
        assert_eq!(builder.build_uint(7).logical_type(), LogicalType::UTinyInt);
    }
}
