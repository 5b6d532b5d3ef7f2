#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use vsfs_check::Fsck;

/// The tool operates on a single fixed path in the current directory.
const IMAGE_PATH: &str = "vsfs.img";

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut fsck = Fsck::open(IMAGE_PATH)
        .with_context(|| format!("cannot check {IMAGE_PATH}"))?;
    let report = fsck.run().context("consistency check aborted")?;

    for line in report.lines() {
        println!("{line}");
    }
    Ok(())
}
