use std::fmt;

use thiserror::Error;

use crate::geo::Bounds;

/// Address fields that carry a declared bit width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Channel,
    Lun,
    Plane,
    Block,
    Page,
    Sector,
    Line,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Channel => "ch",
            Field::Lun => "lun",
            Field::Plane => "pl",
            Field::Block => "blk",
            Field::Page => "pg",
            Field::Sector => "sec",
            Field::Line => "line",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddrError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("field {field}({value}) does not fit in {width} bits")]
    FieldOverflow { field: Field, value: u64, width: u32 },

    #[error("range error: {0}")]
    Range(String),

    #[error("address exceeds geometry: {0}")]
    OutOfBounds(Bounds),

    #[error("malformed address {0:?}, expected 0x followed by at most 16 hex digits")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, AddrError>;
