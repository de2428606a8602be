//! Colourizes HisDB pixel-level ground truth for inspection.
//!
//! Class membership is encoded in the blue channel as one of
//! `{0, 1, 2, 4, 8, 16}`; each class gets a colour sampled from the Spectral
//! colour map.

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

use crate::error::HisdbError;

pub const CLASS_CODES: [u8; 6] = [0, 1, 2, 4, 8, 16];
pub const LEGEND_FILE: &str = "viz_colour_legend.png";
const SWATCH: u32 = 32;

// Spectral colour map sampled at i / 6.
const SPECTRAL: [[u8; 3]; 6] = [
    [158, 1, 66],
    [233, 92, 71],
    [253, 190, 110],
    [254, 254, 190],
    [190, 229, 160],
    [83, 173, 173],
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<(u8, Rgb<u8>)>,
}

impl Palette {
    pub fn spectral() -> Self {
        Self {
            entries: CLASS_CODES
                .iter()
                .zip(SPECTRAL)
                .map(|(code, rgb)| (*code, Rgb(rgb)))
                .collect(),
        }
    }

    pub fn colour_for(&self, code: u8) -> Option<Rgb<u8>> {
        self.entries
            .iter()
            .find(|(class, _)| *class == code)
            .map(|(_, colour)| *colour)
    }

    pub fn entries(&self) -> &[(u8, Rgb<u8>)] {
        &self.entries
    }
}

/// Replaces every pixel whose blue channel is a known class code with that
/// class's colour. Other pixels are left untouched.
pub fn colorize(image: &RgbImage, palette: &Palette) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        if let Some(colour) = palette.colour_for(pixel[2]) {
            *pixel = colour;
        }
    }
    out
}

/// One square swatch per class, in ascending class-code order.
pub fn render_legend(palette: &Palette) -> RgbImage {
    let mut entries = palette.entries().to_vec();
    entries.sort_by_key(|(code, _)| *code);
    let width = SWATCH * entries.len().max(1) as u32;
    let mut legend = RgbImage::new(width, SWATCH);
    for (idx, (_, colour)) in entries.iter().enumerate() {
        let x0 = idx as u32 * SWATCH;
        for x in x0..x0 + SWATCH {
            for y in 0..SWATCH {
                legend.put_pixel(x, y, *colour);
            }
        }
    }
    legend
}

#[derive(Debug, Clone)]
pub struct VizOutput {
    pub image: PathBuf,
    pub legend: PathBuf,
}

/// Writes `out_dir/viz_<file name>` and the colour legend.
pub fn visualize(img_path: &Path, out_dir: &Path) -> Result<VizOutput, HisdbError> {
    let source = image::open(img_path)
        .map_err(|err| HisdbError::Image(format!("{}: {err}", img_path.display())))?
        .to_rgb8();
    let file_name = img_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| HisdbError::Image(format!("{} has no file name", img_path.display())))?;

    fs::create_dir_all(out_dir)
        .map_err(|err| HisdbError::Filesystem(format!("{}: {err}", out_dir.display())))?;
    let palette = Palette::spectral();

    let image_path = out_dir.join(format!("viz_{file_name}"));
    colorize(&source, &palette)
        .save(&image_path)
        .map_err(|err| HisdbError::Image(format!("{}: {err}", image_path.display())))?;

    let legend_path = out_dir.join(LEGEND_FILE);
    render_legend(&palette)
        .save(&legend_path)
        .map_err(|err| HisdbError::Image(format!("{}: {err}", legend_path.display())))?;

    tracing::info!(image = %image_path.display(), "visualization written");
    Ok(VizOutput {
        image: image_path,
        legend: legend_path,
    })
}
