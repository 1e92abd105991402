//! Page processing pipeline
//!
//! Pure transform from one decoded source bitmap to an ordered list of
//! output bitmaps at exactly the device's target dimensions:
//! crop -> contrast -> grayscale -> orientation split -> pad-resize -> dither.
//!
//! Deterministic and free of shared state; pages can be processed on any
//! worker lane in any order.

use std::num::NonZeroU32;

use fast_image_resize as fir;
use image::{DynamicImage, GrayImage, Luma, imageops};

use crate::dither::dither;
use crate::error::ConvertError;
use crate::options::{ConversionOptions, Orientation, SplitMode};

/// Overlap-split band geometry: three bands, each covering this fraction
/// of the long axis, at these offsets. Adjacent bands overlap by 10% and
/// the last band ends exactly at the axis end, so the full axis is
/// covered with no gaps.
const OVERLAP_BAND_FRACTION: f32 = 0.40;
const OVERLAP_BAND_OFFSETS: [f32; 3] = [0.0, 0.30, 0.60];

/// One output bitmap at target dimensions, plus its ordering name.
///
/// Names encode `{page:04}_{kind}` with an optional suffix: kind 0 has no
/// letter (`_spread` when a whole landscape page was rotated), kind 2
/// carries `a`/`b`, kind 3 carries `a`..`c`. Lexicographic name order is
/// the authoritative output order.
#[derive(Debug, Clone)]
pub struct ProcessedPage {
    pub name: String,
    pub image: GrayImage,
}

/// Split classification baked into output names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitKind {
    Single = 0,
    Half = 2,
    Overlap = 3,
}

/// Run the full pipeline for one decoded source page.
pub fn process(
    image: &DynamicImage,
    options: &ConversionOptions,
    page_number: u32,
) -> Result<Vec<ProcessedPage>, ConvertError> {
    let gray = image.to_luma8();
    let mut cropped = crop_margins(&gray, options.h_margin_pct, options.v_margin_pct);

    if options.contrast_level > 0 {
        apply_contrast(&mut cropped, options.contrast_level);
    }

    let target_w = options.device.target_width();
    let target_h = options.device.target_height();
    let (cw, ch) = cropped.dimensions();

    let mut outputs = Vec::new();

    match options.orientation {
        Orientation::Portrait => {
            let mut canvas = pad_resize(&cropped, target_w, target_h)?;
            dither(&mut canvas, options.dither);
            outputs.push(ProcessedPage {
                name: page_name(page_number, SplitKind::Single, None, false),
                image: canvas,
            });
        }

        Orientation::Landscape => {
            let split_eligible = cw < ch && options.split_mode != SplitMode::None;

            if split_eligible {
                let (kind, bands) = match options.split_mode {
                    SplitMode::Overlap => (SplitKind::Overlap, overlap_bands(ch)),
                    SplitMode::Half => (SplitKind::Half, half_bands(ch)),
                    SplitMode::None => unreachable!("split_eligible checked above"),
                };

                for (i, (y0, band_h)) in bands.into_iter().enumerate() {
                    let band = imageops::crop_imm(&cropped, 0, y0, cw, band_h).to_image();
                    let rotated = rotate_for_landscape(&band, options.landscape_flip_clockwise);
                    let mut canvas = pad_resize(&rotated, target_w, target_h)?;
                    dither(&mut canvas, options.dither);
                    let letter = (b'a' + i as u8) as char;
                    outputs.push(ProcessedPage {
                        name: page_name(page_number, kind, Some(letter), false),
                        image: canvas,
                    });
                }
            } else {
                let rotated = rotate_for_landscape(&cropped, options.landscape_flip_clockwise);
                let mut canvas = pad_resize(&rotated, target_w, target_h)?;
                dither(&mut canvas, options.dither);
                outputs.push(ProcessedPage {
                    name: page_name(page_number, SplitKind::Single, None, true),
                    image: canvas,
                });
            }
        }
    }

    Ok(outputs)
}

fn page_name(page: u32, kind: SplitKind, letter: Option<char>, spread: bool) -> String {
    match (letter, spread) {
        (Some(l), _) => format!("{page:04}_{}_{l}", kind as u8),
        (None, true) => format!("{page:04}_{}_spread", kind as u8),
        (None, false) => format!("{page:04}_{}", kind as u8),
    }
}

/// Trim `pct` percent from each side of each axis. The trim per side is
/// capped at `(dimension - 1) / 2`, so the result is always at least 1x1.
fn crop_margins(img: &GrayImage, h_pct: u8, v_pct: u8) -> GrayImage {
    let (w, h) = img.dimensions();
    let crop_x = crop_amount(w, h_pct);
    let crop_y = crop_amount(h, v_pct);

    if crop_x == 0 && crop_y == 0 {
        return img.clone();
    }

    imageops::crop_imm(img, crop_x, crop_y, w - 2 * crop_x, h - 2 * crop_y).to_image()
}

fn crop_amount(dimension: u32, pct: u8) -> u32 {
    let wanted = dimension * u32::from(pct) / 100;
    wanted.min((dimension.saturating_sub(1)) / 2)
}

/// Monotonic contrast boost around mid-gray, strength scaling with level.
fn apply_contrast(img: &mut GrayImage, level: u8) {
    let factor = 1.0 + f32::from(level) * 0.25;
    let lut: Vec<u8> = (0..=255u16)
        .map(|v| ((f32::from(v) - 128.0) * factor + 128.0).clamp(0.0, 255.0) as u8)
        .collect();

    for px in img.pixels_mut() {
        px.0[0] = lut[usize::from(px.0[0])];
    }
}

/// Band list for half-split: two equal-height bands, the odd row (if any)
/// going to the bottom band.
fn half_bands(height: u32) -> Vec<(u32, u32)> {
    let top = (height / 2).max(1);
    let bottom = height - top;
    if bottom == 0 {
        return vec![(0, top)];
    }
    vec![(0, top), (top, bottom)]
}

/// Band list for overlap-split: three overlapping bands covering the
/// whole axis.
fn overlap_bands(height: u32) -> Vec<(u32, u32)> {
    // Round the band height up: truncating both the heights and the
    // offsets can open a one-row gap between adjacent bands.
    let band_h = ((height as f32 * OVERLAP_BAND_FRACTION).ceil() as u32).clamp(1, height);
    let mut bands: Vec<(u32, u32)> = OVERLAP_BAND_OFFSETS
        .iter()
        .map(|&off| {
            let y0 = ((height as f32 * off) as u32).min(height - band_h);
            (y0, band_h)
        })
        .collect();
    // Truncation can leave the computed start a row short; the last band
    // is anchored to the axis end so coverage never has a tail gap.
    bands[2].0 = height - band_h;
    bands
}

fn rotate_for_landscape(img: &GrayImage, flip_clockwise: bool) -> GrayImage {
    if flip_clockwise {
        imageops::rotate90(img)
    } else {
        imageops::rotate270(img)
    }
}

/// Scale to fit the target while preserving aspect ratio, then center on
/// a white canvas of exactly target size.
fn pad_resize(img: &GrayImage, target_w: u32, target_h: u32) -> Result<GrayImage, ConvertError> {
    let (w, h) = img.dimensions();
    let scale = (target_w as f32 / w as f32).min(target_h as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, target_w);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, target_h);

    let resized = if (new_w, new_h) == (w, h) {
        img.clone()
    } else {
        resize_gray_fast(img, new_w, new_h)?
    };

    let mut canvas = GrayImage::from_pixel(target_w, target_h, Luma([255]));
    let x0 = i64::from((target_w - new_w) / 2);
    let y0 = i64::from((target_h - new_h) / 2);
    imageops::replace(&mut canvas, &resized, x0, y0);
    Ok(canvas)
}

fn resize_gray_fast(
    img: &GrayImage,
    width: u32,
    height: u32,
) -> Result<GrayImage, ConvertError> {
    let src_nz_width = NonZeroU32::new(img.width())
        .ok_or_else(|| ConvertError::pipeline("Invalid source width"))?;
    let src_nz_height = NonZeroU32::new(img.height())
        .ok_or_else(|| ConvertError::pipeline("Invalid source height"))?;
    let dst_nz_width =
        NonZeroU32::new(width).ok_or_else(|| ConvertError::pipeline("Invalid target width"))?;
    let dst_nz_height =
        NonZeroU32::new(height).ok_or_else(|| ConvertError::pipeline("Invalid target height"))?;

    let src = fir::Image::from_vec_u8(
        src_nz_width,
        src_nz_height,
        img.as_raw().clone(),
        fir::PixelType::U8,
    )
    .map_err(|e| ConvertError::pipeline(format!("Fast resize source error: {e}")))?;
    let mut dst = fir::Image::new(dst_nz_width, dst_nz_height, fir::PixelType::U8);
    let mut resizer = fir::Resizer::new(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
    resizer
        .resize(&src.view(), &mut dst.view_mut())
        .map_err(|e| ConvertError::pipeline(format!("Fast resize error: {e}")))?;

    GrayImage::from_raw(width, height, dst.into_vec())
        .ok_or_else(|| ConvertError::pipeline("Fast resize produced invalid buffer"))
}
