//! Physical page address (PPA) packing
//!
//! A PPA is a single 64-bit value read under one of two views. The generic
//! view names one sector on one die, the line view names a logical line in a
//! flat cached space. Nothing in the value records which view produced it,
//! so callers pick the view from context.
//!
//! Generic layout, least significant bit first:
//!
//! | field | bits  | width |
//! |-------|-------|-------|
//! | blk   | 0-15  | 16    |
//! | pg    | 16-31 | 16    |
//! | sec   | 32-39 | 8     |
//! | pl    | 40-47 | 8     |
//! | lun   | 48-55 | 8     |
//! | ch    | 56-62 | 7     |
//! | rsvd  | 63    | 1     |
//!
//! Line layout: `line` in bits 0-62, `is_cached` in bit 63.

use std::fmt;
use std::str::FromStr;

use crate::error::{AddrError, Field, Result};

const LINE_CACHED_BIT: u32 = 63;

impl Field {
    /// Bit offset and width of the field inside the packed address
    pub(crate) const fn layout(self) -> (u32, u32) {
        match self {
            Field::Block => (0, 16),
            Field::Page => (16, 16),
            Field::Sector => (32, 8),
            Field::Plane => (40, 8),
            Field::Lun => (48, 8),
            Field::Channel => (56, 7),
            Field::Line => (0, 63),
        }
    }

    pub const fn width(self) -> u32 {
        self.layout().1
    }

    /// Largest value the field can hold
    pub const fn max(self) -> u64 {
        mask(self.width())
    }
}

const fn mask(width: u32) -> u64 {
    (1u64 << width) - 1
}

fn fit(field: Field, value: u64) -> Result<u64> {
    if value > field.max() {
        return Err(AddrError::FieldOverflow {
            field,
            value,
            width: field.width(),
        });
    }
    Ok(value)
}

fn extract(raw: u64, field: Field) -> u64 {
    let (ofs, width) = field.layout();
    (raw >> ofs) & mask(width)
}

/// Generic (geometric) view of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GenericAddr {
    pub ch: u32,
    pub lun: u32,
    pub pl: u32,
    pub blk: u32,
    pub pg: u32,
    pub sec: u32,
}

impl GenericAddr {
    pub const fn new(ch: u32, lun: u32, pl: u32, blk: u32, pg: u32, sec: u32) -> Self {
        GenericAddr {
            ch,
            lun,
            pl,
            blk,
            pg,
            sec,
        }
    }

    pub(crate) fn fields(&self) -> [(Field, u32); 6] {
        [
            (Field::Channel, self.ch),
            (Field::Lun, self.lun),
            (Field::Plane, self.pl),
            (Field::Block, self.blk),
            (Field::Page, self.pg),
            (Field::Sector, self.sec),
        ]
    }

    /// Packs the fields, rejecting any that exceed their bit width.
    pub fn encode(&self) -> Result<PhysicalAddress> {
        for (field, value) in self.fields() {
            fit(field, u64::from(value))?;
        }
        Ok(self.pack())
    }

    /// Packs without width checks. Out of range bits are masked off, callers
    /// must have validated the fields already.
    pub(crate) fn pack(&self) -> PhysicalAddress {
        let raw = self.fields().iter().fold(0u64, |raw, &(field, value)| {
            let (ofs, width) = field.layout();
            raw | ((u64::from(value) & mask(width)) << ofs)
        });
        PhysicalAddress(raw)
    }
}

impl fmt::Display for GenericAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ ch({:02}), lun({:02}), pl({}), blk({:04}), pg({:03}), sec({}) }}",
            self.ch, self.lun, self.pl, self.blk, self.pg, self.sec
        )
    }
}

/// Line (cached) view of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LineAddr {
    pub line: u64,
    pub is_cached: bool,
}

impl LineAddr {
    pub fn encode(&self) -> Result<PhysicalAddress> {
        let line = fit(Field::Line, self.line)?;
        Ok(PhysicalAddress(line | (u64::from(self.is_cached) << LINE_CACHED_BIT)))
    }
}

impl fmt::Display for LineAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ line({}), is_cached({}) }}", self.line, u8::from(self.is_cached))
    }
}

/// A packed 64-bit physical address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    pub const fn from_raw(raw: u64) -> Self {
        PhysicalAddress(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Reads the address under the generic view. Never fails, any 64-bit
    /// value decodes to some set of masked fields.
    pub fn decode_generic(self) -> GenericAddr {
        // every field is at most 16 bits wide
        let get = |field| extract(self.0, field) as u32;
        GenericAddr {
            ch: get(Field::Channel),
            lun: get(Field::Lun),
            pl: get(Field::Plane),
            blk: get(Field::Block),
            pg: get(Field::Page),
            sec: get(Field::Sector),
        }
    }

    pub fn decode_line(self) -> LineAddr {
        LineAddr {
            line: extract(self.0, Field::Line),
            is_cached: (self.0 >> LINE_CACHED_BIT) & 1 == 1,
        }
    }

    /// `0x` followed by exactly 16 lowercase hex digits. Log scrapers match
    /// this literally.
    pub fn as_hex(self) -> String {
        format!("{:#018x}", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalAddress({:#018x})", self.0)
    }
}

impl FromStr for PhysicalAddress {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| AddrError::Parse(s.to_string()))?;

        if digits.is_empty()
            || digits.len() > 16
            || !digits.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(AddrError::Parse(s.to_string()));
        }

        u64::from_str_radix(digits, 16)
            .map(PhysicalAddress)
            .map_err(|_| AddrError::Parse(s.to_string()))
    }
}

impl From<PhysicalAddress> for u64 {
    fn from(addr: PhysicalAddress) -> u64 {
        addr.0
    }
}

pub fn encode_generic(
    ch: u32,
    lun: u32,
    pl: u32,
    blk: u32,
    pg: u32,
    sec: u32,
) -> Result<PhysicalAddress> {
    GenericAddr::new(ch, lun, pl, blk, pg, sec).encode()
}

pub fn decode_generic(addr: PhysicalAddress) -> GenericAddr {
    addr.decode_generic()
}

pub fn encode_line(line: u64, is_cached: bool) -> Result<PhysicalAddress> {
    LineAddr { line, is_cached }.encode()
}

pub fn decode_line(addr: PhysicalAddress) -> LineAddr {
    addr.decode_line()
}

pub fn as_hex(addr: PhysicalAddress) -> String {
    addr.as_hex()
}
