//! Parallel unit enumeration
//!
//! Builds the address sets used for units of parallel work: one address per
//! die for a fixed block/page, or every sector of one virtual page. Index
//! `idx` maps to `ch = idx % nchannels` and `lun = (idx / nchannels) % nluns`,
//! so channels vary fastest. Wear distribution tooling relies on that order.

use std::collections::VecDeque;

use log::*;

use crate::addr::{GenericAddr, PhysicalAddress};
use crate::config::Count;
use crate::error::{AddrError, Result};
use crate::geo::Geometry;

/// Lazy sequence of one address per parallel unit
#[derive(Debug, Clone)]
pub struct ParallelUnits<'a> {
    geo: &'a Geometry,
    base: GenericAddr,
    idx: Count,
    len: Count,
}

impl ParallelUnits<'_> {
    fn addr(&self, idx: Count) -> PhysicalAddress {
        let nchannels = self.geo.nchannels();
        let nluns = self.geo.nluns();

        // geometry counts are bounded by the field widths
        GenericAddr {
            ch: (idx % nchannels) as u32,
            lun: ((idx / nchannels) % nluns) as u32,
            ..self.base
        }
        .pack()
    }
}

impl Iterator for ParallelUnits<'_> {
    type Item = PhysicalAddress;

    fn next(&mut self) -> Option<PhysicalAddress> {
        if self.idx >= self.len {
            return None;
        }
        let addr = self.addr(self.idx);
        self.idx += 1;
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.len - self.idx;
        (left, Some(left))
    }
}

impl ExactSizeIterator for ParallelUnits<'_> {}

fn check_in_bounds(geo: &Geometry, addr: GenericAddr) -> Result<GenericAddr> {
    let bounds = geo.check(&addr);
    if !bounds.is_empty() {
        return Err(AddrError::OutOfBounds(bounds));
    }
    Ok(addr)
}

/// Addresses `(ch, lun, plane, block, page, sector)` for every channel and LUN
/// of `geo`, at most `limit` of them.
pub fn enumerate_parallel_units(
    geo: &Geometry,
    block: u32,
    page: u32,
    plane: u32,
    sector: u32,
    limit: Option<Count>,
) -> Result<ParallelUnits<'_>> {
    let base = check_in_bounds(geo, GenericAddr::new(0, 0, plane, block, page, sector))?;

    let total = geo.total_luns();
    let len = limit.map_or(total, |limit| limit.min(total));
    trace!("Enumerating {} of {} parallel units in blk({})", len, total, block);

    Ok(ParallelUnits {
        geo,
        base,
        idx: 0,
        len,
    })
}

impl Geometry {
    /// Every parallel unit at page 0, plane 0, sector 0 of `block`.
    pub fn parallel_units(&self, block: u32) -> Result<ParallelUnits<'_>> {
        enumerate_parallel_units(self, block, 0, 0, 0, None)
    }
}

/// Sector addresses of one virtual page, sector varying fastest, then plane.
pub fn enumerate_vpage(
    geo: &Geometry,
    ch: u32,
    lun: u32,
    block: u32,
    page: u32,
) -> Result<impl Iterator<Item = PhysicalAddress> + Clone + '_> {
    let base = check_in_bounds(geo, GenericAddr::new(ch, lun, 0, block, page, 0))?;
    let nsectors = geo.nsectors();
    let nplanes = geo.nplanes();

    Ok((0..nplanes * nsectors).map(move |idx| {
        GenericAddr {
            pl: ((idx / nsectors) % nplanes) as u32,
            sec: (idx % nsectors) as u32,
            ..base
        }
        .pack()
    }))
}

/// Left-rotates `units` by `k` positions, wrapping `k` at the length.
pub fn rotate<T>(units: &mut [T], k: usize) {
    if units.is_empty() {
        return;
    }
    let k = k % units.len();
    units.rotate_left(k);
}

/// Growing prefixes of `units`, of length 1 through `units.len()`. With
/// `rotate` set the pool shifts left by one after each prefix is taken, so
/// successive trials start on a different unit.
pub fn spans<T: Clone>(units: &[T], rotate: bool) -> Vec<Vec<T>> {
    let mut pool: VecDeque<T> = units.iter().cloned().collect();

    (1..=units.len())
        .map(|span| {
            let taken: Vec<T> = pool.iter().take(span).cloned().collect();
            if rotate {
                pool.rotate_left(1);
            }
            taken
        })
        .collect()
}
