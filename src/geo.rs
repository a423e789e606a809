//! Device geometry
//!
//! Counts and cell sizes of one Open-Channel device, or of a declared subset
//! of one. A `Geometry` only exists in validated form: every count and size
//! is non-zero, every count is addressable by the generic PPA view and every
//! derived size fits in 64 bits.

use std::fmt;

use bitflags::bitflags;
use byte_unit::Byte;
use log::*;
use serde::{Deserialize, Serialize};

use crate::addr::GenericAddr;
use crate::config::{Count, Nbytes};
use crate::error::{AddrError, Field, Result};

/// Raw, unvalidated geometry as supplied by a device query or a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct GeometryDesc {
    pub nchannels: Count,
    /// LUNs per channel
    pub nluns: Count,
    pub nplanes: Count,
    pub nblocks: Count,
    pub npages: Count,
    /// Sectors per page
    pub nsectors: Count,

    pub sector_nbytes: Nbytes,
    pub page_nbytes: Nbytes,
    /// Out-of-band bytes, zero when the device exposes none
    #[serde(default)]
    pub meta_nbytes: Nbytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    desc: GeometryDesc,

    total_luns: Count,
    vpage_nbytes: Nbytes,
    vblk_nbytes: Nbytes,
    tbytes: Nbytes,
}

bitflags! {
    /// Fields of a generic address that exceed a geometry
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Bounds: u32 {
        const CHANNEL = 1 << 0;
        const LUN = 1 << 1;
        const PLANE = 1 << 2;
        const BLOCK = 1 << 3;
        const PAGE = 1 << 4;
        const SECTOR = 1 << 5;
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no bounds");
        }
        let names: Vec<String> = self.iter_names().map(|(name, _)| name.to_lowercase()).collect();
        write!(f, "{} bound", names.join("|"))
    }
}

fn product(name: &str, factors: &[u64]) -> Result<Nbytes> {
    factors
        .iter()
        .try_fold(1u64, |acc, &f| acc.checked_mul(f))
        .ok_or_else(|| AddrError::InvalidGeometry(format!("{} overflows 64 bits", name)))
}

pub(crate) fn human(nbytes: Nbytes) -> String {
    Byte::from_bytes(u128::from(nbytes))
        .get_appropriate_unit(true)
        .to_string()
}

impl Geometry {
    pub fn new(desc: GeometryDesc) -> Result<Self> {
        let counts = [
            ("nchannels", desc.nchannels, Field::Channel),
            ("nluns", desc.nluns, Field::Lun),
            ("nplanes", desc.nplanes, Field::Plane),
            ("nblocks", desc.nblocks, Field::Block),
            ("npages", desc.npages, Field::Page),
            ("nsectors", desc.nsectors, Field::Sector),
        ];

        for (name, count, field) in counts {
            if count == 0 {
                return Err(AddrError::InvalidGeometry(format!("{} is zero", name)));
            }
            // a count of n needs indices up to n - 1
            if count as u64 - 1 > field.max() {
                return Err(AddrError::InvalidGeometry(format!(
                    "{}({}) is not addressable with {} bits",
                    name,
                    count,
                    field.width()
                )));
            }
        }

        let sizes = [
            ("sector_nbytes", desc.sector_nbytes),
            ("page_nbytes", desc.page_nbytes),
        ];
        for (name, nbytes) in sizes {
            if nbytes == 0 {
                return Err(AddrError::InvalidGeometry(format!("{} is zero", name)));
            }
        }

        let total_luns = desc
            .nchannels
            .checked_mul(desc.nluns)
            .ok_or_else(|| AddrError::InvalidGeometry("total_luns overflows".to_string()))?;

        let vpage_nbytes = product(
            "vpage_nbytes",
            &[desc.nplanes as u64, desc.nsectors as u64, desc.sector_nbytes],
        )?;
        let vblk_nbytes = product("vblk_nbytes", &[vpage_nbytes, desc.npages as u64])?;
        let tbytes = product("tbytes", &[vblk_nbytes, desc.nblocks as u64, total_luns as u64])?;

        if desc.page_nbytes != desc.nsectors as u64 * desc.sector_nbytes {
            warn!(
                "page_nbytes({}) differs from nsectors({}) * sector_nbytes({})",
                desc.page_nbytes, desc.nsectors, desc.sector_nbytes
            );
        }

        let geo = Geometry {
            desc,
            total_luns,
            vpage_nbytes,
            vblk_nbytes,
            tbytes,
        };
        trace!("Geometry: {} luns, {} total", total_luns, human(tbytes));

        Ok(geo)
    }

    pub fn desc(&self) -> &GeometryDesc {
        &self.desc
    }

    pub fn nchannels(&self) -> Count {
        self.desc.nchannels
    }

    pub fn nluns(&self) -> Count {
        self.desc.nluns
    }

    pub fn nplanes(&self) -> Count {
        self.desc.nplanes
    }

    pub fn nblocks(&self) -> Count {
        self.desc.nblocks
    }

    pub fn npages(&self) -> Count {
        self.desc.npages
    }

    pub fn nsectors(&self) -> Count {
        self.desc.nsectors
    }

    pub fn sector_nbytes(&self) -> Nbytes {
        self.desc.sector_nbytes
    }

    pub fn page_nbytes(&self) -> Nbytes {
        self.desc.page_nbytes
    }

    pub fn meta_nbytes(&self) -> Nbytes {
        self.desc.meta_nbytes
    }

    /// Channels times LUNs per channel
    pub fn total_luns(&self) -> Count {
        self.total_luns
    }

    /// Bytes in one page spanning all planes
    pub fn vpage_nbytes(&self) -> Nbytes {
        self.vpage_nbytes
    }

    /// Bytes in one block spanning all planes
    pub fn vblk_nbytes(&self) -> Nbytes {
        self.vblk_nbytes
    }

    /// Bytes in the whole geometry
    pub fn tbytes(&self) -> Nbytes {
        self.tbytes
    }

    /// Returns the fields of `addr` that lie outside this geometry.
    pub fn check(&self, addr: &GenericAddr) -> Bounds {
        let limits = [
            (addr.ch, self.desc.nchannels, Bounds::CHANNEL),
            (addr.lun, self.desc.nluns, Bounds::LUN),
            (addr.pl, self.desc.nplanes, Bounds::PLANE),
            (addr.blk, self.desc.nblocks, Bounds::BLOCK),
            (addr.pg, self.desc.npages, Bounds::PAGE),
            (addr.sec, self.desc.nsectors, Bounds::SECTOR),
        ];

        limits
            .iter()
            .filter(|(value, count, _)| *value as Count >= *count)
            .fold(Bounds::empty(), |mask, (_, _, bound)| mask | *bound)
    }
}

impl TryFrom<GeometryDesc> for Geometry {
    type Error = AddrError;

    fn try_from(desc: GeometryDesc) -> Result<Self> {
        Geometry::new(desc)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.desc;
        writeln!(f, "geo {{")?;
        writeln!(f, " nchannels({}), nluns({}), nplanes({}),", d.nchannels, d.nluns, d.nplanes)?;
        writeln!(f, " nblocks({}), npages({}), nsectors({}),", d.nblocks, d.npages, d.nsectors)?;
        writeln!(
            f,
            " page_nbytes({}), sector_nbytes({}), meta_nbytes({}),",
            d.page_nbytes, d.sector_nbytes, d.meta_nbytes
        )?;
        writeln!(f, " tbytes({}b:{}),", self.tbytes, human(self.tbytes))?;
        writeln!(f, " vpg_nbytes({}b:{}),", self.vpage_nbytes, human(self.vpage_nbytes))?;
        writeln!(f, " vblk_nbytes({}b:{})", self.vblk_nbytes, human(self.vblk_nbytes))?;
        write!(f, "}}")
    }
}

#[allow(clippy::too_many_arguments)]
pub fn make_geometry(
    nchannels: Count,
    nluns: Count,
    nplanes: Count,
    nblocks: Count,
    npages: Count,
    nsectors: Count,
    sector_nbytes: Nbytes,
    page_nbytes: Nbytes,
) -> Result<Geometry> {
    Geometry::new(GeometryDesc {
        nchannels,
        nluns,
        nplanes,
        nblocks,
        npages,
        nsectors,
        sector_nbytes,
        page_nbytes,
        meta_nbytes: 0,
    })
}
