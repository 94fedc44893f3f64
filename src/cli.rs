//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ptharvest_core::DiscountLevel;

/// Aggregate torrent listings from private tracker sites.
///
/// Searches every configured site at once, merges duplicates by info hash
/// and ranks the result by seeders and discount.
#[derive(Parser, Debug)]
#[command(name = "ptharvest")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path
    #[arg(short = 'c', long, default_value = "ptharvest.toml", global = true)]
    pub config: PathBuf,

    /// Overall deadline for the command in seconds (1-3600)
    #[arg(
        short = 't',
        long,
        default_value_t = 120,
        value_parser = clap::value_parser!(u64).range(1..=3600),
        global = true
    )]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search sites and print deduplicated, ranked results
    Search {
        /// Search keyword
        keyword: String,
        /// Restrict to these site ids (repeatable)
        #[arg(short, long = "site")]
        sites: Vec<String>,
        /// Zero-based result page
        #[arg(long, default_value_t = 0)]
        page: u32,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show account statistics
    UserInfo {
        /// Restrict to these site ids (repeatable)
        #[arg(short, long = "site")]
        sites: Vec<String>,
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Show one torrent's details as JSON
    Detail {
        /// Site id
        #[arg(short, long)]
        site: String,
        /// Site-local torrent id
        id: String,
    },
    /// Save a .torrent file
    Download {
        /// Site id
        #[arg(short, long)]
        site: String,
        /// Site-local torrent id
        id: String,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Check whether a download finishes before its discount expires
    Feasibility {
        /// Torrent size in bytes
        #[arg(long)]
        size: i64,
        /// Transfer speed in bytes per second
        #[arg(long)]
        speed: f64,
        /// Discount level (none, free, 2xfree, percent_50, ...)
        #[arg(long, default_value = "none")]
        level: DiscountLevel,
        /// Seconds until the discount ends; omit for a permanent discount
        #[arg(long)]
        ends_in: Option<i64>,
    },
}
