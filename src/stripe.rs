//! Striping of logical byte ranges
//!
//! A `(count, offset)` request is cut into sectors, sectors are grouped into
//! work units of `work_unit_sectors` (WS_MIN), and work units are dealt
//! round-robin over `nchunks` parallel targets. Within a chunk, successive
//! rounds stack contiguously in bands of one work unit:
//!
//! ```text
//! work_unit          = sector / ws
//! round, chunk       = work_unit / nchunks, work_unit % nchunks
//! chunk_local_sector = sector % ws + round * ws
//! ```
//!
//! The request is also split into command sized groups, each a multiple of
//! the work unit and no larger than the per-command address limit.
//!
//! Misalignment never fails a plan, it is reported through the plan's flags.

use std::ops::Range;

use log::*;
use num_integer::Integer;

use crate::config::{Count, Nbytes};
use crate::error::{AddrError, Result};

/// Where one logical sector lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StripeEntry {
    pub sector: u64,
    pub work_unit: u64,
    pub round: u64,
    pub chunk: Count,
    pub chunk_sector: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripePlan {
    sector_nbytes: Nbytes,
    work_unit_sectors: u64,
    nchunks: u64,
    cmd_nsectors_max: u64,

    sector_begin: u64,
    /// One past the last sector, equal to `sector_begin` when the count is
    /// less than a sector
    sector_stop: u64,

    unaligned_count: bool,
    unaligned_offset: bool,
    partial_sector: bool,
}

pub fn plan_stripe(
    count_bytes: Nbytes,
    offset_bytes: Nbytes,
    sector_nbytes: Nbytes,
    work_unit_sectors: Count,
    max_addrs_per_command: Count,
    nchunks: Count,
) -> Result<StripePlan> {
    if sector_nbytes == 0 {
        return Err(AddrError::InvalidGeometry("sector_nbytes is zero".to_string()));
    }
    if work_unit_sectors == 0 {
        return Err(AddrError::InvalidGeometry("work_unit_sectors is zero".to_string()));
    }
    if nchunks == 0 {
        return Err(AddrError::InvalidGeometry("nchunks is zero".to_string()));
    }
    if count_bytes == 0 {
        return Err(AddrError::Range("count_bytes must be positive".to_string()));
    }

    let ws = work_unit_sectors as u64;
    let cmd_nsectors_max = (max_addrs_per_command as u64 / ws) * ws;
    if cmd_nsectors_max == 0 {
        return Err(AddrError::InvalidGeometry(format!(
            "max_addrs_per_command({}) cannot hold one work unit of {} sectors",
            max_addrs_per_command, work_unit_sectors
        )));
    }

    let wu_nbytes = sector_nbytes.checked_mul(ws).ok_or_else(|| {
        AddrError::InvalidGeometry("work unit size overflows 64 bits".to_string())
    })?;

    let (nsectors, count_rem) = count_bytes.div_rem(&sector_nbytes);

    let sector_begin = offset_bytes / sector_nbytes;
    let sector_stop = sector_begin.checked_add(nsectors).ok_or_else(|| {
        AddrError::Range(format!(
            "offset_bytes({}) + count_bytes({}) overflows",
            offset_bytes, count_bytes
        ))
    })?;

    let plan = StripePlan {
        sector_nbytes,
        work_unit_sectors: ws,
        nchunks: nchunks as u64,
        cmd_nsectors_max,
        sector_begin,
        sector_stop,
        unaligned_count: !Integer::is_multiple_of(&count_bytes, &wu_nbytes),
        unaligned_offset: !Integer::is_multiple_of(&offset_bytes, &wu_nbytes),
        partial_sector: count_rem != 0,
    };

    debug!(
        "stripe: nbytes({}), nsectr({}), sectr_bgn({}), cmd_nsectr_max({})",
        count_bytes, nsectors, sector_begin, cmd_nsectors_max
    );
    if plan.partial_sector {
        warn!("count_bytes({}) leaves {} bytes of a partial sector", count_bytes, count_rem);
    }
    if plan.unaligned_count {
        debug!("unaligned count, {} sectors with ws_min {}", nsectors, ws);
    }
    if plan.unaligned_offset {
        debug!("unaligned offset({})", offset_bytes);
    }

    Ok(plan)
}

impl StripePlan {
    pub fn sector_nbytes(&self) -> Nbytes {
        self.sector_nbytes
    }

    pub fn work_unit_sectors(&self) -> Count {
        self.work_unit_sectors as Count
    }

    pub fn nchunks(&self) -> Count {
        self.nchunks as Count
    }

    /// Largest number of sectors one command carries
    pub fn cmd_nsectors_max(&self) -> u64 {
        self.cmd_nsectors_max
    }

    pub fn sector_begin(&self) -> u64 {
        self.sector_begin
    }

    /// Last sector of the request, inclusive. `None` when the request
    /// holds no whole sector.
    pub fn sector_end(&self) -> Option<u64> {
        if self.nsectors() == 0 {
            return None;
        }
        Some(self.sector_stop - 1)
    }

    pub fn nsectors(&self) -> u64 {
        self.sector_stop - self.sector_begin
    }

    pub fn unaligned_count(&self) -> bool {
        self.unaligned_count
    }

    /// Checked in bytes against `sector_nbytes * work_unit_sectors`, so an
    /// offset inside a sector is unaligned even if its sector index is not.
    pub fn unaligned_offset(&self) -> bool {
        self.unaligned_offset
    }

    /// The byte count did not divide into whole sectors; the tail was not
    /// planned.
    pub fn partial_sector(&self) -> bool {
        self.partial_sector
    }

    pub fn is_aligned(&self) -> bool {
        !(self.unaligned_count || self.unaligned_offset || self.partial_sector)
    }

    pub fn entry(&self, sector: u64) -> StripeEntry {
        let (work_unit, in_unit) = sector.div_rem(&self.work_unit_sectors);
        let (round, chunk) = work_unit.div_rem(&self.nchunks);

        StripeEntry {
            sector,
            work_unit,
            round,
            chunk: chunk as Count,
            chunk_sector: in_unit + round * self.work_unit_sectors,
        }
    }

    /// One entry per sector of the request. Each call starts over.
    pub fn sectors(&self) -> StripeSectors {
        StripeSectors {
            plan: *self,
            range: self.sector_begin..self.sector_stop,
        }
    }

    pub fn commands(&self) -> Commands {
        Commands {
            plan: *self,
            next_sector: self.sector_begin,
            index: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StripeSectors {
    plan: StripePlan,
    range: Range<u64>,
}

impl Iterator for StripeSectors {
    type Item = StripeEntry;

    fn next(&mut self) -> Option<StripeEntry> {
        self.range.next().map(|sector| self.plan.entry(sector))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.range.size_hint()
    }
}

/// A group of sectors submitted as a single vector command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub index: usize,
    pub sector_begin: u64,
    pub nsectors: u64,
    plan: StripePlan,
}

impl Command {
    pub fn sectors(&self) -> StripeSectors {
        StripeSectors {
            plan: self.plan,
            range: self.sector_begin..self.sector_begin + self.nsectors,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Commands {
    plan: StripePlan,
    next_sector: u64,
    index: usize,
}

impl Iterator for Commands {
    type Item = Command;

    fn next(&mut self) -> Option<Command> {
        if self.next_sector >= self.plan.sector_stop {
            return None;
        }

        let nsectors = (self.plan.sector_stop - self.next_sector).min(self.plan.cmd_nsectors_max);
        let cmd = Command {
            index: self.index,
            sector_begin: self.next_sector,
            nsectors,
            plan: self.plan,
        };

        self.next_sector += nsectors;
        self.index += 1;

        Some(cmd)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SECTOR: Nbytes = 4096;
    const WS_MIN: Count = 12;

    #[test]
    fn aligned_request_is_deterministic() {
        let plan = || plan_stripe(SECTOR * 96, SECTOR * 12 * 42, SECTOR, WS_MIN, 32, 3).unwrap();

        let first: Vec<StripeEntry> = plan().sectors().collect();
        let second: Vec<StripeEntry> = plan().sectors().collect();
        assert_eq!(first, second);

        let p = plan();
        assert_eq!(p.sectors().collect::<Vec<_>>(), first, "sectors() must restart");
        assert!(!p.unaligned_offset());
        assert!(!p.unaligned_count());
        assert!(p.is_aligned());
        assert_eq!(p.sector_begin(), 504);
        assert_eq!(p.sector_end(), Some(599));
        assert_eq!(first.len(), 96);
    }

    #[test]
    fn round_robin_at_work_unit_granularity() {
        let plan = plan_stripe(SECTOR * 96, SECTOR * 12 * 42, SECTOR, WS_MIN, 32, 3).unwrap();
        let entries: Vec<StripeEntry> = plan.sectors().collect();

        assert_eq!(
            entries[0],
            StripeEntry {
                sector: 504,
                work_unit: 42,
                round: 14,
                chunk: 0,
                chunk_sector: 168,
            }
        );
        assert_eq!(
            entries[12],
            StripeEntry {
                sector: 516,
                work_unit: 43,
                round: 14,
                chunk: 1,
                chunk_sector: 168,
            }
        );
        assert_eq!(
            entries[95],
            StripeEntry {
                sector: 599,
                work_unit: 49,
                round: 16,
                chunk: 1,
                chunk_sector: 203,
            }
        );

        // the whole work unit stays on one chunk
        for e in &entries[0..12] {
            assert_eq!(e.chunk, 0);
            assert_eq!(e.work_unit, 42);
        }
    }

    #[test]
    fn chunks_fill_contiguously() {
        let plan = plan_stripe(SECTOR * 72, 0, SECTOR, WS_MIN, 64, 3).unwrap();

        for chunk in 0..3 {
            let local: Vec<u64> = plan
                .sectors()
                .filter(|e| e.chunk == chunk)
                .map(|e| e.chunk_sector)
                .collect();
            assert_eq!(local, (0..24).collect::<Vec<u64>>());
        }
    }

    #[test]
    fn commands_split_by_work_units() {
        let plan = plan_stripe(SECTOR * 96, SECTOR * 12 * 42, SECTOR, WS_MIN, 32, 3).unwrap();
        assert_eq!(plan.cmd_nsectors_max(), 24);

        let cmds: Vec<Command> = plan.commands().collect();
        assert_eq!(cmds.len(), 4);
        assert!(cmds.iter().all(|c| c.nsectors == 24));
        assert_eq!(cmds[1].sector_begin, 528);

        let joined: Vec<StripeEntry> = cmds.iter().flat_map(|c| c.sectors()).collect();
        assert_eq!(joined, plan.sectors().collect::<Vec<_>>());
    }

    #[test]
    fn last_command_may_be_short() {
        let plan = plan_stripe(SECTOR * 30, 0, SECTOR, WS_MIN, 32, 3).unwrap();
        let sizes: Vec<u64> = plan.commands().map(|c| c.nsectors).collect();
        assert_eq!(sizes, vec![24, 6]);
        assert_eq!(plan.commands().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn misaligned_count_is_flagged() {
        let plan = plan_stripe(SECTOR * 5, 0, SECTOR, WS_MIN, 32, 3).unwrap();
        assert!(plan.unaligned_count());
        assert!(!plan.unaligned_offset());
        assert!(!plan.partial_sector());
        assert_eq!(plan.sectors().count(), 5);
    }

    #[test]
    fn misaligned_offset_is_flagged() {
        let plan = plan_stripe(SECTOR * 12, SECTOR * 5, SECTOR, WS_MIN, 32, 3).unwrap();
        assert!(plan.unaligned_offset());
        assert!(!plan.unaligned_count());
        assert_eq!(plan.sector_begin(), 5);
        assert_eq!(plan.sector_end(), Some(16));

        // sector aligned but not at the start of a sector
        let plan = plan_stripe(SECTOR * 12, SECTOR * 12 + 1, SECTOR, WS_MIN, 32, 3).unwrap();
        assert!(plan.unaligned_offset());
        assert_eq!(plan.sector_begin(), 12);
    }

    #[test]
    fn partial_sector_is_flagged() {
        let plan = plan_stripe(SECTOR * 2 + 100, 0, SECTOR, WS_MIN, 32, 3).unwrap();
        assert!(plan.partial_sector());
        assert!(plan.unaligned_count());
        assert!(!plan.is_aligned());
        assert_eq!(plan.nsectors(), 2);
        assert_eq!(plan.sectors().count(), 2);
    }

    #[test]
    fn less_than_a_sector_is_flagged() {
        let plan = plan_stripe(100, 0, SECTOR, WS_MIN, 32, 3).unwrap();
        assert!(plan.partial_sector());
        assert!(plan.unaligned_count());
        assert!(!plan.unaligned_offset());
        assert_eq!(plan.nsectors(), 0);
        assert_eq!(plan.sector_begin(), 0);
        assert_eq!(plan.sector_end(), None);
        assert_eq!(plan.sectors().count(), 0);
        assert_eq!(plan.commands().count(), 0);

        let plan = plan_stripe(100, SECTOR * 7, SECTOR, WS_MIN, 32, 3).unwrap();
        assert_eq!(plan.sector_begin(), 7);
        assert_eq!(plan.sector_end(), None);
        assert_eq!(plan.sectors().count(), 0);
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert!(matches!(plan_stripe(0, 0, SECTOR, WS_MIN, 32, 3), Err(AddrError::Range(_))));
        assert!(matches!(
            plan_stripe(SECTOR, 0, 0, WS_MIN, 32, 3),
            Err(AddrError::InvalidGeometry(_))
        ));
        assert!(matches!(
            plan_stripe(SECTOR, 0, SECTOR, 0, 32, 3),
            Err(AddrError::InvalidGeometry(_))
        ));
        assert!(matches!(
            plan_stripe(SECTOR, 0, SECTOR, WS_MIN, 32, 0),
            Err(AddrError::InvalidGeometry(_))
        ));
        assert!(matches!(
            plan_stripe(SECTOR, 0, SECTOR, WS_MIN, 8, 3),
            Err(AddrError::InvalidGeometry(_))
        ));
        assert!(matches!(
            plan_stripe(SECTOR * 2, u64::MAX - 1, 1, 1, 32, 3),
            Err(AddrError::Range(_))
        ));
    }
}
