// types.rs
// Logical and physical value types
//
// Every tape element carries its *logical* type (what the user wrote) while
// the payload is stored at the canonical widest *physical* width. The
// physical type is derived, never stored.

use serde::{Deserialize, Serialize};

/// User-visible value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    UTinyInt,
    USmallInt,
    UInteger,
    UBigInt,
    HugeInt,
    Float,
    Double,
    StringLiteral,
    Na,
    Array,
    Map,
    Invalid,
}

/// Storage-level representation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalType {
    Null,
    BoolFalse,
    BoolTrue,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
}

impl LogicalType {
    /// The physical width a scalar of this logical type is stored at.
    /// Containers and `Invalid` have no physical representation.
    pub fn physical(&self, bool_value: bool) -> Option<PhysicalType> {
        match self {
            LogicalType::Boolean => Some(if bool_value {
                PhysicalType::BoolTrue
            } else {
                PhysicalType::BoolFalse
            }),
            LogicalType::TinyInt => Some(PhysicalType::Int8),
            LogicalType::SmallInt => Some(PhysicalType::Int16),
            LogicalType::Integer => Some(PhysicalType::Int32),
            LogicalType::BigInt => Some(PhysicalType::Int64),
            LogicalType::UTinyInt => Some(PhysicalType::UInt8),
            LogicalType::USmallInt => Some(PhysicalType::UInt16),
            LogicalType::UInteger => Some(PhysicalType::UInt32),
            LogicalType::UBigInt => Some(PhysicalType::UInt64),
            LogicalType::HugeInt => Some(PhysicalType::Int128),
            LogicalType::Float => Some(PhysicalType::Float32),
            LogicalType::Double => Some(PhysicalType::Float64),
            LogicalType::StringLiteral => Some(PhysicalType::String),
            LogicalType::Na => Some(PhysicalType::Null),
            LogicalType::Array | LogicalType::Map | LogicalType::Invalid => None,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            LogicalType::TinyInt
                | LogicalType::SmallInt
                | LogicalType::Integer
                | LogicalType::BigInt
                | LogicalType::HugeInt
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            LogicalType::UTinyInt
                | LogicalType::USmallInt
                | LogicalType::UInteger
                | LogicalType::UBigInt
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, LogicalType::Float | LogicalType::Double)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_signed() || self.is_unsigned() || self.is_float()
    }

    /// Narrowest signed logical type that holds `v`.
    pub fn narrowest_signed(v: i64) -> LogicalType {
        if i8::try_from(v).is_ok() {
            LogicalType::TinyInt
        } else if i16::try_from(v).is_ok() {
            LogicalType::SmallInt
        } else if i32::try_from(v).is_ok() {
            LogicalType::Integer
        } else {
            LogicalType::BigInt
        }
    }

    /// Narrowest unsigned logical type that holds `v`.
    pub fn narrowest_unsigned(v: u64) -> LogicalType {
        if u8::try_from(v).is_ok() {
            LogicalType::UTinyInt
        } else if u16::try_from(v).is_ok() {
            LogicalType::USmallInt
        } else if u32::try_from(v).is_ok() {
            LogicalType::UInteger
        } else {
            LogicalType::UBigInt
        }
    }
}
