//! Geometry and striping parameters
//!
//! Everything the address tools need is passed in through [`Config`], loaded
//! from a TOML file or built from the defaults below.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::error::AddrError;
use crate::geo::{Geometry, GeometryDesc};
use crate::stripe::{plan_stripe, StripePlan};

pub type Count = usize;
pub type Nbytes = u64;

// Default synthetic geometry, a 16x8 device with 4 planes
pub const CHANNELS: Count = 16;
pub const LUNS: Count = 8;
pub const PLANES: Count = 4;
pub const BLOCKS: Count = 1020;
pub const PAGES_PER_BLOCK: Count = 512;
pub const SECTORS_PER_PAGE: Count = 4;

pub const SECTOR_SIZE: Nbytes = 4096;
pub const PAGE_SIZE: Nbytes = SECTORS_PER_PAGE as Nbytes * SECTOR_SIZE;
pub const META_SIZE: Nbytes = 16;

/// Minimum write granularity in sectors (WS_MIN)
pub const WORK_UNIT_SECTORS: Count = 12;

/// Addresses a single vector command may carry
pub const NADDRS_MAX: Count = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Addr(#[from] AddrError),
}

/// Vector command kinds, each with its own address limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Opcode {
    Erase,
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct NaddrsMax {
    #[serde(default = "default_naddrs_max")]
    pub erase: Count,
    #[serde(default = "default_naddrs_max")]
    pub read: Count,
    #[serde(default = "default_naddrs_max")]
    pub write: Count,
}

fn default_naddrs_max() -> Count {
    NADDRS_MAX
}

impl Default for NaddrsMax {
    fn default() -> Self {
        NaddrsMax {
            erase: NADDRS_MAX,
            read: NADDRS_MAX,
            write: NADDRS_MAX,
        }
    }
}

impl NaddrsMax {
    pub fn get(&self, op: Opcode) -> Count {
        match op {
            Opcode::Erase => self.erase,
            Opcode::Read => self.read,
            Opcode::Write => self.write,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StripeConfig {
    #[serde(default = "default_sector_nbytes")]
    pub sector_nbytes: Nbytes,

    #[serde(default = "default_work_unit_sectors")]
    pub work_unit_sectors: Count,

    #[serde(default)]
    pub naddrs_max: NaddrsMax,

    /// Parallel targets, the geometry's LUN count when unset
    #[serde(default)]
    pub nchunks: Option<Count>,
}

fn default_sector_nbytes() -> Nbytes {
    SECTOR_SIZE
}

fn default_work_unit_sectors() -> Count {
    WORK_UNIT_SECTORS
}

impl Default for StripeConfig {
    fn default() -> Self {
        StripeConfig {
            sector_nbytes: SECTOR_SIZE,
            work_unit_sectors: WORK_UNIT_SECTORS,
            naddrs_max: NaddrsMax::default(),
            nchunks: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_geometry")]
    pub geometry: GeometryDesc,

    #[serde(default)]
    pub stripe: StripeConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_geometry() -> GeometryDesc {
    GeometryDesc {
        nchannels: CHANNELS,
        nluns: LUNS,
        nplanes: PLANES,
        nblocks: BLOCKS,
        npages: PAGES_PER_BLOCK,
        nsectors: SECTORS_PER_PAGE,
        sector_nbytes: SECTOR_SIZE,
        page_nbytes: PAGE_SIZE,
        meta_nbytes: META_SIZE,
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            geometry: default_geometry(),
            stripe: StripeConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Config::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.geometry()?;

        if self.stripe.sector_nbytes == 0 || self.stripe.work_unit_sectors == 0 {
            return Err(ConfigError::Invalid(
                "stripe sector_nbytes and work_unit_sectors must be positive".to_string(),
            ));
        }

        for op in [Opcode::Erase, Opcode::Read, Opcode::Write] {
            let naddrs = self.stripe.naddrs_max.get(op);
            if naddrs < self.stripe.work_unit_sectors {
                return Err(ConfigError::Invalid(format!(
                    "naddrs_max.{:?}({}) cannot hold one work unit of {} sectors",
                    op, naddrs, self.stripe.work_unit_sectors
                )));
            }
        }

        if self.stripe.nchunks == Some(0) {
            return Err(ConfigError::Invalid("stripe nchunks is zero".to_string()));
        }

        Ok(())
    }

    pub fn geometry(&self) -> Result<Geometry, AddrError> {
        Geometry::new(self.geometry)
    }

    /// Chunk count for striping, falling back to one chunk per LUN.
    pub fn nchunks(&self) -> Result<Count, AddrError> {
        match self.stripe.nchunks {
            Some(nchunks) => Ok(nchunks),
            None => Ok(self.geometry()?.total_luns()),
        }
    }

    pub fn plan_stripe(
        &self,
        op: Opcode,
        count_bytes: Nbytes,
        offset_bytes: Nbytes,
    ) -> Result<StripePlan, AddrError> {
        plan_stripe(
            count_bytes,
            offset_bytes,
            self.stripe.sector_nbytes,
            self.stripe.work_unit_sectors,
            self.stripe.naddrs_max.get(op),
            self.nchunks()?,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.geometry, default_geometry());
        assert_eq!(config.stripe, StripeConfig::default());
        assert_eq!(config.nchunks().unwrap(), CHANNELS * LUNS);
    }

    #[test]
    fn parse_full_config() {
        let config_str = r#"
log_level = "debug"

[geometry]
nchannels = 8
nluns = 4
nplanes = 2
nblocks = 1024
npages = 256
nsectors = 4
sector_nbytes = 4096
page_nbytes = 16384
meta_nbytes = 16

[stripe]
sector_nbytes = 4096
work_unit_sectors = 12
nchunks = 3

[stripe.naddrs_max]
erase = 1
read = 32
write = 32
"#;
        let result = Config::parse(config_str);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let config = Config::parse(&config_str.replace("erase = 1", "erase = 64")).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.geometry().unwrap().total_luns(), 32);
        assert_eq!(config.stripe.naddrs_max.get(Opcode::Read), 32);
        assert_eq!(config.stripe.naddrs_max.get(Opcode::Erase), 64);
        assert_eq!(config.nchunks().unwrap(), 3);

        let plan = config.plan_stripe(Opcode::Write, 96 * 4096, 42 * 12 * 4096).unwrap();
        assert_eq!(plan.cmd_nsectors_max(), 24);
        assert_eq!(plan.nchunks(), 3);
    }

    #[test]
    fn invalid_geometry_rejected() {
        let config_str = r#"
[geometry]
nchannels = 0
nluns = 4
nplanes = 2
nblocks = 1024
npages = 256
nsectors = 4
sector_nbytes = 4096
page_nbytes = 16384
"#;
        assert!(matches!(
            Config::parse(config_str),
            Err(ConfigError::Addr(AddrError::InvalidGeometry(_)))
        ));
    }

    #[test]
    fn zero_chunks_rejected() {
        assert!(matches!(Config::parse("[stripe]\nnchunks = 0\n"), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[stripe]\nwork_unit_sectors = 8\nnchunks = 2").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.stripe.work_unit_sectors, 8);
        assert_eq!(config.nchunks().unwrap(), 2);
        assert!(matches!(Config::load("/nonexistent/ocssd.toml"), Err(ConfigError::Io(_))));
    }
}
