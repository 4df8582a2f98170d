//! PNG encoding for rendered images and legends.
//!
//! Two colour types are produced:
//! - **Indexed (colour type 3)** when the image holds at most 256 distinct
//!   RGBA values, which value-map styles and legends nearly always do.
//! - **Truecolour with alpha (colour type 6)** otherwise.
//!
//! [`encode_auto`] picks between them.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use raster_common::{RgbaRaster, StyleError, StyleResult};
use rayon::prelude::*;

const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Maximum colors for indexed PNG (PNG8)
const MAX_PALETTE_SIZE: usize = 256;

/// Below this many pixels palette extraction stays on one thread
const PARALLEL_THRESHOLD: usize = 4096;

type Rgba = [u8; 4];

/// Encode one time slice of a rendered raster.
pub fn encode_raster(image: &RgbaRaster, time: usize) -> StyleResult<Vec<u8>> {
    let shape = image.shape();
    if time >= shape.times {
        return Err(StyleError::Encoding(format!(
            "time slice {} out of range for {}",
            time, shape
        )));
    }
    encode_auto(&image.to_rgba_bytes(time), shape.width, shape.height)
}

/// Encode interleaved RGBA bytes, indexed when the colours fit a palette.
pub fn encode_auto(pixels: &[u8], width: usize, height: usize) -> StyleResult<Vec<u8>> {
    check_len(pixels.len(), width, height, 4)?;
    let extracted = if pixels.len() / 4 >= PARALLEL_THRESHOLD {
        extract_palette_parallel(pixels)
    } else {
        extract_palette(pixels)
    };
    match extracted {
        Some((palette, indices)) => encode_indexed(width, height, &palette, &indices),
        None => encode_rgba(pixels, width, height),
    }
}

fn check_len(actual: usize, width: usize, height: usize, bytes_per_pixel: usize) -> StyleResult<()> {
    let expected = width * height * bytes_per_pixel;
    if actual != expected {
        return Err(StyleError::Encoding(format!(
            "expected {} bytes for {}x{} image, got {}",
            expected, width, height, actual
        )));
    }
    Ok(())
}

fn extract_palette(pixels: &[u8]) -> Option<(Vec<Rgba>, Vec<u8>)> {
    let mut lookup: HashMap<Rgba, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices = Vec::with_capacity(pixels.len() / 4);

    for px in pixels.chunks_exact(4) {
        let color = [px[0], px[1], px[2], px[3]];
        let index = match lookup.get(&color) {
            Some(&i) => i,
            None => {
                if palette.len() == MAX_PALETTE_SIZE {
                    return None;
                }
                let i = palette.len() as u8;
                palette.push(color);
                lookup.insert(color, i);
                i
            }
        };
        indices.push(index);
    }
    Some((palette, indices))
}

/// Distinct colours are gathered per chunk in parallel, merged, then every
/// pixel is mapped to its palette slot in a second parallel pass.
fn extract_palette_parallel(pixels: &[u8]) -> Option<(Vec<Rgba>, Vec<u8>)> {
    let chunk_pixels = (pixels.len() / 4 / rayon::current_num_threads()).max(256);

    let per_chunk: Vec<HashSet<Rgba>> = pixels
        .par_chunks(chunk_pixels * 4)
        .map(|chunk| {
            let mut seen = HashSet::with_capacity(MAX_PALETTE_SIZE);
            for px in chunk.chunks_exact(4) {
                seen.insert([px[0], px[1], px[2], px[3]]);
                if seen.len() > MAX_PALETTE_SIZE {
                    break;
                }
            }
            seen
        })
        .collect();

    let mut lookup: HashMap<Rgba, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    for color in per_chunk.into_iter().flatten() {
        if lookup.contains_key(&color) {
            continue;
        }
        if palette.len() == MAX_PALETTE_SIZE {
            return None;
        }
        lookup.insert(color, palette.len() as u8);
        palette.push(color);
    }

    let indices = pixels
        .par_chunks_exact(4)
        .map(|px| lookup.get(&[px[0], px[1], px[2], px[3]]).copied().unwrap_or(0))
        .collect();
    Some((palette, indices))
}

/// Indexed PNG from a palette and one index byte per pixel. A `tRNS` chunk
/// is written when any palette entry is not opaque.
pub fn encode_indexed(
    width: usize,
    height: usize,
    palette: &[Rgba],
    indices: &[u8],
) -> StyleResult<Vec<u8>> {
    check_len(indices.len(), width, height, 1)?;
    if palette.is_empty() || palette.len() > MAX_PALETTE_SIZE {
        return Err(StyleError::Encoding(format!(
            "palette size {} outside 1..={}",
            palette.len(),
            MAX_PALETTE_SIZE
        )));
    }

    let mut png = Vec::new();
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &header(width, height, 3));

    let plte: Vec<u8> = palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
    write_chunk(&mut png, b"PLTE", &plte);

    if palette.iter().any(|c| c[3] < 255) {
        let trns: Vec<u8> = palette.iter().map(|c| c[3]).collect();
        write_chunk(&mut png, b"tRNS", &trns);
    }

    write_chunk(&mut png, b"IDAT", &deflate_scanlines(indices, width, height)?);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

/// Truecolour-with-alpha PNG from interleaved RGBA bytes.
pub fn encode_rgba(pixels: &[u8], width: usize, height: usize) -> StyleResult<Vec<u8>> {
    check_len(pixels.len(), width, height, 4)?;
    let mut png = Vec::new();
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &header(width, height, 6));
    write_chunk(&mut png, b"IDAT", &deflate_scanlines(pixels, width * 4, height)?);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

fn header(width: usize, height: usize, color_type: u8) -> [u8; 13] {
    let mut ihdr = [0u8; 13];
    ihdr[0..4].copy_from_slice(&(width as u32).to_be_bytes());
    ihdr[4..8].copy_from_slice(&(height as u32).to_be_bytes());
    ihdr[8] = 8; // bit depth
    ihdr[9] = color_type;
    // compression, filter and interlace methods stay 0
    ihdr
}

fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut crc = crc32fast::Hasher::new();
    crc.update(chunk_type);
    crc.update(data);
    png.extend_from_slice(&crc.finalize().to_be_bytes());
}

/// Prefix every scanline with filter type 0 and zlib-compress the result.
fn deflate_scanlines(data: &[u8], row_bytes: usize, height: usize) -> StyleResult<Vec<u8>> {
    let mut raw = Vec::with_capacity(height * (row_bytes + 1));
    for row in data.chunks_exact(row_bytes.max(1)).take(height) {
        raw.push(0);
        raw.extend_from_slice(row);
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
    encoder
        .write_all(&raw)
        .and_then(|_| encoder.finish())
        .map_err(|e| StyleError::Encoding(format!("IDAT compression failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_palette_simple() {
        let pixels = [
            255, 0, 0, 255, // red
            0, 255, 0, 255, // green
            0, 0, 255, 255, // blue
            255, 0, 0, 255, // red again
        ];
        let (palette, indices) = extract_palette(&pixels).unwrap();
        assert_eq!(palette.len(), 3);
        assert_eq!(indices, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_extract_palette_too_many_colours() {
        let pixels: Vec<u8> = (0..300u32)
            .flat_map(|i| [(i % 256) as u8, (i / 256) as u8, 0, 255])
            .collect();
        assert!(extract_palette(&pixels).is_none());
        assert!(extract_palette_parallel(&pixels).is_none());
    }

    #[test]
    fn test_parallel_matches_sequential_colours() {
        let mut pixels = Vec::with_capacity(128 * 128 * 4);
        for y in 0..128u32 {
            for x in 0..128u32 {
                let class = ((x / 8 + y / 8) % 40) as u8;
                pixels.extend_from_slice(&[class * 5, 100, 200 - class, 255]);
            }
        }
        let (seq_palette, _) = extract_palette(&pixels).unwrap();
        let (par_palette, par_indices) = extract_palette_parallel(&pixels).unwrap();
        assert_eq!(seq_palette.len(), par_palette.len());
        for (px, &i) in pixels.chunks_exact(4).zip(&par_indices) {
            assert_eq!(&par_palette[i as usize][..], px);
        }
    }

    #[test]
    fn test_indexed_writes_transparency() {
        let pixels = [255, 0, 0, 255, 0, 0, 0, 0];
        let png = encode_auto(&pixels, 2, 1).unwrap();
        assert_eq!(&png[0..8], &SIGNATURE);
        assert_eq!(png[8 + 4 + 4 + 9], 3); // IHDR colour type
        assert!(png.windows(4).any(|w| w == b"tRNS"));
    }

    #[test]
    fn test_rgba_fallback() {
        let pixels: Vec<u8> = (0..300u32)
            .flat_map(|i| [(i % 256) as u8, (i / 256) as u8, 7, 255])
            .collect();
        let png = encode_auto(&pixels, 300, 1).unwrap();
        assert_eq!(png[8 + 4 + 4 + 9], 6);
    }

    #[test]
    fn test_wrong_length_is_error() {
        assert!(matches!(
            encode_rgba(&[0, 0, 0], 1, 1).unwrap_err(),
            StyleError::Encoding(_)
        ));
    }

    #[test]
    fn test_decodes_with_image_crate() {
        let pixels = [10, 20, 30, 255, 40, 50, 60, 128];
        let png = encode_auto(&pixels, 1, 2).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (1, 2));
        assert_eq!(decoded.into_raw(), pixels.to_vec());
    }
}
