//! Address-space mapping for Open-Channel SSDs
//!
//! Turns a device geometry into packed physical page addresses (PPAs),
//! enumerates addresses across parallel units, and stripes logical byte
//! ranges over parallel targets. Everything here is pure computation over
//! immutable inputs; issuing the resulting commands is up to the caller.

pub mod addr;
pub mod config;
pub mod error;
pub mod geo;
pub mod punit;
pub mod stripe;

pub use addr::{
    as_hex, decode_generic, decode_line, encode_generic, encode_line, GenericAddr, LineAddr,
    PhysicalAddress,
};
pub use config::{Config, ConfigError, Opcode, StripeConfig};
pub use error::{AddrError, Field, Result};
pub use geo::{make_geometry, Bounds, Geometry, GeometryDesc};
pub use punit::{enumerate_parallel_units, enumerate_vpage, rotate, spans, ParallelUnits};
pub use stripe::{plan_stripe, Command, StripeEntry, StripePlan};
