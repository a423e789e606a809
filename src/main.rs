use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use log::*;
use rand::prelude::*;
use simplelog::{ConfigBuilder, WriteLogger};
use time::macros::format_description;

use ocssd_addr::{
    encode_line, enumerate_parallel_units, enumerate_vpage, rotate, spans, AddrError, Config,
    GenericAddr, Opcode, PhysicalAddress, StripePlan,
};

/// Lowest block picked when none is given, the first blocks tend to be worn
const RANDOM_BLK_MIN: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "ocssd-addr")]
#[command(about = "Open-Channel SSD address construction and striping", long_about = None)]
struct Args {
    /// Configuration file (TOML), built-in geometry when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the geometry
    Geo,

    /// Encode an address in generic format
    FmtG {
        ch: u32,
        lun: u32,
        pl: u32,
        blk: u32,
        pg: u32,
        sec: u32,
    },

    /// Encode an address in line format
    FmtL {
        line: u64,

        #[arg(long)]
        cached: bool,
    },

    /// Decode hex addresses
    Decode {
        /// Read the addresses as lines instead of generic addresses
        #[arg(long)]
        line: bool,

        #[arg(required = true)]
        addrs: Vec<PhysicalAddress>,
    },

    /// One address per channel/LUN for a fixed block
    Units {
        /// Block to span, picked at random when omitted
        #[arg(long)]
        blk: Option<u32>,

        #[arg(long, default_value_t = 0)]
        page: u32,

        /// How many addresses to produce
        #[arg(long)]
        naddrs: Option<usize>,

        /// Rotate the addresses left by this many positions
        #[arg(long, default_value_t = 0)]
        rotate: usize,
    },

    /// Every sector address of one virtual page
    Vpage {
        ch: u32,
        lun: u32,
        blk: u32,

        #[arg(long, default_value_t = 0)]
        page: u32,
    },

    /// Stripe a byte range over parallel chunks
    Stripe {
        count: u64,
        offset: u64,

        #[arg(long, value_enum, default_value_t = Opcode::Write)]
        op: Opcode,

        /// Parallel targets, overrides the configuration
        #[arg(long)]
        nchunks: Option<usize>,
    },

    /// Growing address spans for scaling experiments
    Spans {
        /// Shift the address pool by one between spans
        #[arg(long)]
        rotate: bool,

        #[arg(required = true)]
        addrs: Vec<PhysicalAddress>,
    },
}

fn level(verbose: u8, config_level: &str) -> LevelFilter {
    match verbose {
        0 => LevelFilter::from_str(config_level).unwrap_or(LevelFilter::Info),
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn print_plan(plan: &StripePlan, count: u64) {
    println!("cmd_nsectr_max: {}", plan.cmd_nsectors_max());
    println!("nbytes: {}, nsectr: {}", count, plan.nsectors());
    match plan.sector_end() {
        Some(end) => println!("sectr_bgn: {}, sectr_end: {}", plan.sector_begin(), end),
        None => println!("sectr_bgn: {}, sectr_end: none", plan.sector_begin()),
    }

    if plan.partial_sector() {
        println!("partial sector");
    }
    if plan.unaligned_count() {
        println!("unaligned workload");
    }
    if plan.unaligned_offset() {
        println!("unaligned offset");
    }

    for cmd in plan.commands() {
        println!("cmd_nsectr: {:02}", cmd.nsectors);
        for e in cmd.sectors() {
            println!(
                "sectr: {}, wunit: {}, rnd: {}, chunk_sectr: {}, chunk: {}",
                e.sector, e.work_unit, e.round, e.chunk_sector, e.chunk
            );
        }
    }
}

fn run(cmd: Cmd, config: &Config) -> Result<(), AddrError> {
    match cmd {
        Cmd::Geo => {
            println!("{}", config.geometry()?);
        }
        Cmd::FmtG { ch, lun, pl, blk, pg, sec } => {
            let g = GenericAddr::new(ch, lun, pl, blk, pg, sec);
            let bounds = config.geometry()?.check(&g);
            if !bounds.is_empty() {
                warn!("{} exceeds geometry: {}", g, bounds);
            }
            println!("ppa: {} {}", g.encode()?, g);
        }
        Cmd::FmtL { line, cached } => {
            let addr = encode_line(line, cached)?;
            println!("ppa: {} {}", addr, addr.decode_line());
        }
        Cmd::Decode { line, addrs } => {
            for addr in addrs {
                if line {
                    println!("ppa: {} {}", addr, addr.decode_line());
                } else {
                    println!("ppa: {} {}", addr, addr.decode_generic());
                }
            }
        }
        Cmd::Units { blk, page, naddrs, rotate: k } => {
            let geo = config.geometry()?;
            let blk = match blk {
                Some(blk) => blk,
                None => {
                    let mut rng = SmallRng::from_entropy();
                    let lo = if geo.nblocks() > RANDOM_BLK_MIN {
                        RANDOM_BLK_MIN
                    } else {
                        0
                    };
                    // nblocks is bounded by the 16-bit block field
                    let blk = rng.gen_range(lo..geo.nblocks()) as u32;
                    info!("Picked blk({})", blk);
                    blk
                }
            };

            let mut addrs: Vec<PhysicalAddress> =
                enumerate_parallel_units(&geo, blk, page, 0, 0, naddrs)?.collect();
            rotate(&mut addrs, k);
            for addr in addrs {
                println!("{}", addr);
            }
        }
        Cmd::Vpage { ch, lun, blk, page } => {
            let geo = config.geometry()?;
            let addrs: Vec<String> = enumerate_vpage(&geo, ch, lun, blk, page)?
                .map(|a| a.as_hex())
                .collect();
            println!("ppas{{ {} }}", addrs.join(" "));
        }
        Cmd::Stripe { count, offset, op, nchunks } => {
            let mut config = config.clone();
            if nchunks.is_some() {
                config.stripe.nchunks = nchunks;
            }
            let plan = config.plan_stripe(op, count, offset)?;
            print_plan(&plan, count);
        }
        Cmd::Spans { rotate, addrs } => {
            for (idx, span) in spans(&addrs, rotate).iter().enumerate() {
                let hex: Vec<String> = span.iter().map(|a| a.as_hex()).collect();
                println!("span({}): {}", idx + 1, hex.join(" "));
            }
        }
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    };
    let config_level = config.as_ref().map(|c| c.log_level.as_str()).unwrap_or("info");

    let log_cfg = ConfigBuilder::new()
        .set_time_format_custom(format_description!("[hour]:[minute]:[second].[subsecond]"))
        .build();

    // stdout carries the addresses, logs go to stderr
    let log_level = level(args.verbose, config_level);
    if let Err(e) = WriteLogger::init(log_level, log_cfg, std::io::stderr()) {
        eprintln!("Failed to initialise logging: {}", e);
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };
    debug!("Using geometry {:?}", config.geometry);

    if let Err(e) = run(args.cmd, &config) {
        error!("{}", e);
        process::exit(1);
    }
}
