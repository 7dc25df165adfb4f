use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{DEFAULT_CAPACITY, DEFAULT_SWEEP_INTERVAL_SECS, OverlayConfig};

#[derive(Parser, Debug)]
#[command(name = "zipfolder")]
#[command(version)]
#[command(about = "Walk a directory tree with ZIP archives shown as folders", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipfolder --basedir /data                 list everything below /data\n  \
  zipfolder --basedir /data docs/a.zip      list the contents of one archive\n  \
  zipfolder --basedir /data --cat xml       also print every .xml file\n\n\
Set RUST_LOG=debug to trace archive loads and evictions.")]
pub struct Cli {
    /// Directory the overlay is rooted at
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub basedir: PathBuf,

    /// Path below the base directory to start from (default: root)
    #[arg(value_name = "PATH", default_value = "")]
    pub path: String,

    /// Maximum number of archives kept open
    #[arg(long, value_name = "N", default_value_t = DEFAULT_CAPACITY)]
    pub capacity: usize,

    /// Seconds between idle sweeps of unused archives
    #[arg(long = "sweep-secs", value_name = "S", default_value_t = DEFAULT_SWEEP_INTERVAL_SECS)]
    pub sweep_secs: u64,

    /// Allow only one open reader per archive at a time
    #[arg(long)]
    pub exclusive: bool,

    /// Copy files with this extension to stdout while walking (e.g. xml)
    #[arg(long, value_name = "EXT")]
    pub cat: Option<String>,
}

impl Cli {
    pub fn overlay_config(&self) -> OverlayConfig {
        OverlayConfig::default()
            .with_capacity(self.capacity)
            .with_sweep_interval(Duration::from_secs(self.sweep_secs))
            .exclusive_reads(self.exclusive)
    }

    /// Whether `name` should be copied to stdout.
    pub fn wants_contents(&self, name: &str) -> bool {
        let Some(ext) = self.cat.as_deref() else {
            return false;
        };
        let ext = ext.trim_start_matches('.');
        name.rsplit_once('.')
            .is_some_and(|(_, e)| e.eq_ignore_ascii_case(ext))
    }
}
