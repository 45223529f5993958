//! region_check - validate a parking region file
//!
//! Loads a region file exactly as the daemon would, prints each space's
//! bounding box and mask coverage, and optionally checks that every box fits
//! inside a given frame size.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use parking_kernel::{load_region_file, BoundingBox};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Region file (YAML, JSON or TOML).
    path: PathBuf,
    /// Frame size as WIDTHxHEIGHT, e.g. 1280x720.
    #[arg(long, value_parser = parse_frame_size)]
    frame_size: Option<(u32, u32)>,
    /// Print the region table as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct RegionRow {
    id: u32,
    label: u32,
    vertices: usize,
    bounding_box: BoundingBox,
    mask_pixels: usize,
    fits_frame: Option<bool>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let regions = load_region_file(&args.path)?;
    let rows: Vec<RegionRow> = regions
        .iter()
        .map(|region| {
            let bbox = *region.bounding_box();
            RegionRow {
                id: region.id(),
                label: region.label(),
                vertices: region.polygon().len(),
                bounding_box: bbox,
                mask_pixels: region.mask().covered(),
                fits_frame: args.frame_size.map(|(w, h)| bbox.fits_within(w, h)),
            }
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{}: {} regions", args.path.display(), rows.len());
        for row in &rows {
            let fit = match row.fits_frame {
                Some(true) => "",
                Some(false) => "  OUT OF FRAME",
                None => "",
            };
            println!(
                "  space {:>3} (id {:>3}) {:>2} vertices  box {}  mask {} px{}",
                row.label, row.id, row.vertices, row.bounding_box, row.mask_pixels, fit
            );
        }
    }

    let outside: Vec<u32> = rows
        .iter()
        .filter(|row| row.fits_frame == Some(false))
        .map(|row| row.id)
        .collect();
    if !outside.is_empty() {
        return Err(anyhow!(
            "{} region(s) do not fit the frame: ids {:?}",
            outside.len(),
            outside
        ));
    }
    Ok(())
}

fn parse_frame_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width: u32 = w.trim().parse().map_err(|_| format!("bad width '{}'", w))?;
    let height: u32 = h.trim().parse().map_err(|_| format!("bad height '{}'", h))?;
    if width == 0 || height == 0 {
        return Err("frame size must be non-zero".to_string());
    }
    Ok((width, height))
}
