//! Named continuous palettes for generated colour ramps.
//!
//! Names follow the usual matplotlib spelling (`viridis`, `RdYlGn`,
//! `Blues`); case and underscores are ignored and a `_r` suffix reverses
//! the palette.

use colorgrad::Gradient;

use crate::color::Rgb;

/// Number of samples taken from a palette when generating a ramp.
pub const PALETTE_SAMPLES: usize = 11;

/// One sampled palette colour at a position in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteSample {
    pub position: f64,
    pub color: Rgb,
    pub alpha: f64,
}

fn lookup(name: &str) -> Option<Gradient> {
    let key: String = name
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect();
    let gradient = match key.as_str() {
        "viridis" => colorgrad::viridis(),
        "magma" => colorgrad::magma(),
        "inferno" => colorgrad::inferno(),
        "plasma" => colorgrad::plasma(),
        "cividis" => colorgrad::cividis(),
        "turbo" => colorgrad::turbo(),
        "rainbow" => colorgrad::rainbow(),
        "sinebow" => colorgrad::sinebow(),
        "cubehelix" => colorgrad::cubehelix_default(),
        "warm" => colorgrad::warm(),
        "cool" => colorgrad::cool(),
        "spectral" => colorgrad::spectral(),
        "rdylgn" => colorgrad::rd_yl_gn(),
        "rdylbu" => colorgrad::rd_yl_bu(),
        "rdbu" => colorgrad::rd_bu(),
        "rdgy" => colorgrad::rd_gy(),
        "brbg" => colorgrad::br_bg(),
        "piyg" => colorgrad::pi_yg(),
        "puor" => colorgrad::pu_or(),
        "prgn" => colorgrad::pr_gn(),
        "blues" => colorgrad::blues(),
        "greens" => colorgrad::greens(),
        "greys" => colorgrad::greys(),
        "oranges" => colorgrad::oranges(),
        "purples" => colorgrad::purples(),
        "reds" => colorgrad::reds(),
        "bugn" => colorgrad::bu_gn(),
        "bupu" => colorgrad::bu_pu(),
        "gnbu" => colorgrad::gn_bu(),
        "orrd" => colorgrad::or_rd(),
        "pubugn" => colorgrad::pu_bu_gn(),
        "pubu" => colorgrad::pu_bu(),
        "purd" => colorgrad::pu_rd(),
        "rdpu" => colorgrad::rd_pu(),
        "ylgnbu" => colorgrad::yl_gn_bu(),
        "ylgn" => colorgrad::yl_gn(),
        "ylorbr" => colorgrad::yl_or_br(),
        "ylorrd" => colorgrad::yl_or_rd(),
        _ => return None,
    };
    Some(gradient)
}

/// Sample a named palette at [`PALETTE_SAMPLES`] evenly spaced positions.
///
/// Returns `None` for an unknown name.
pub fn sample(name: &str) -> Option<Vec<PaletteSample>> {
    let (base, reversed) = match name.strip_suffix("_r") {
        Some(base) => (base, true),
        None => (name, false),
    };
    let gradient = lookup(base)?;
    let last = (PALETTE_SAMPLES - 1) as f64;
    let samples = (0..PALETTE_SAMPLES)
        .map(|i| {
            let position = i as f64 / last;
            let at = if reversed { 1.0 - position } else { position };
            let c = gradient.at(at);
            PaletteSample {
                position,
                color: Rgb::new(c.r, c.g, c.b),
                alpha: c.a,
            }
        })
        .collect();
    Some(samples)
}

pub fn is_known(name: &str) -> bool {
    lookup(name.strip_suffix("_r").unwrap_or(name)).is_some()
}
