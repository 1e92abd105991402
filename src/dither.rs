//! Grayscale-to-bilevel dithering
//!
//! Every algorithm leaves the buffer in a state where `pixel >= 128` is
//! the correct 1-bit extraction rule for the page codec.

use image::GrayImage;

use crate::options::DitherMode;

/// 4x4 Bayer matrix, values 0..16
const BAYER_4X4: [[u8; 4]; 4] = [
    [0, 8, 2, 10],
    [12, 4, 14, 6],
    [3, 11, 1, 9],
    [15, 7, 13, 5],
];

/// Apply the selected algorithm in place.
pub fn dither(img: &mut GrayImage, mode: DitherMode) {
    match mode {
        DitherMode::Threshold => threshold(img),
        DitherMode::FloydSteinberg => floyd_steinberg(img),
        DitherMode::Atkinson => atkinson(img),
        DitherMode::Ordered => ordered_bayer(img),
    }
}

fn threshold(img: &mut GrayImage) {
    for px in img.pixels_mut() {
        px.0[0] = if px.0[0] >= 128 { 255 } else { 0 };
    }
}

fn ordered_bayer(img: &mut GrayImage) {
    let (width, height) = img.dimensions();
    for y in 0..height {
        for x in 0..width {
            let px = img.get_pixel_mut(x, y);
            // Map the 0..16 matrix cell onto a 0..255 threshold
            let cell = BAYER_4X4[(y % 4) as usize][(x % 4) as usize];
            let cut = u16::from(cell) * 16 + 8;
            px.0[0] = if u16::from(px.0[0]) >= cut { 255 } else { 0 };
        }
    }
}

fn floyd_steinberg(img: &mut GrayImage) {
    diffuse(img, &[(1, 0, 7), (-1, 1, 3), (0, 1, 5), (1, 1, 1)], 16);
}

fn atkinson(img: &mut GrayImage) {
    // Atkinson deliberately distributes only 6/8 of the error
    diffuse(
        img,
        &[(1, 0, 1), (2, 0, 1), (-1, 1, 1), (0, 1, 1), (1, 1, 1), (0, 2, 1)],
        8,
    );
}

/// Generic error diffusion over a (dx, dy, weight) kernel with the given
/// weight denominator. Works on a signed scratch copy so accumulated error
/// never wraps.
fn diffuse(img: &mut GrayImage, kernel: &[(i32, i32, i32)], denom: i32) {
    let (width, height) = img.dimensions();
    let w = width as usize;
    let mut scratch: Vec<i32> = img.as_raw().iter().map(|&v| i32::from(v)).collect();

    for y in 0..height as usize {
        for x in 0..w {
            let idx = y * w + x;
            let old = scratch[idx];
            let new = if old >= 128 { 255 } else { 0 };
            scratch[idx] = new;
            let err = old - new;

            for &(dx, dy, weight) in kernel {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || nx >= width as i32 || ny >= height as i32 {
                    continue;
                }
                let nidx = ny as usize * w + nx as usize;
                scratch[nidx] += err * weight / denom;
            }
        }
    }

    for (dst, src) in img.as_mut().iter_mut().zip(scratch) {
        *dst = src.clamp(0, 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn flat(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    #[test]
    fn all_modes_produce_bilevel_output() {
        let modes = [
            DitherMode::Threshold,
            DitherMode::FloydSteinberg,
            DitherMode::Atkinson,
            DitherMode::Ordered,
        ];

        for mode in modes {
            let mut img = GrayImage::from_fn(16, 16, |x, y| Luma([(x * 16 + y) as u8]));
            dither(&mut img, mode);
            for px in img.pixels() {
                assert!(
                    px.0[0] == 0 || px.0[0] == 255,
                    "{mode:?} left a mid-gray pixel"
                );
            }
        }
    }

    #[test]
    fn threshold_cuts_at_128() {
        let mut img = flat(2, 1, 127);
        img.put_pixel(1, 0, Luma([128]));
        threshold(&mut img);
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
        assert_eq!(img.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn extremes_survive_error_diffusion() {
        let mut white = flat(8, 8, 255);
        floyd_steinberg(&mut white);
        assert!(white.pixels().all(|p| p.0[0] == 255));

        let mut black = flat(8, 8, 0);
        atkinson(&mut black);
        assert!(black.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn floyd_steinberg_preserves_average_tone() {
        let mut img = flat(32, 32, 64);
        floyd_steinberg(&mut img);
        let lit = img.pixels().filter(|p| p.0[0] == 255).count();
        let ratio = lit as f32 / (32.0 * 32.0);
        // 64/255 of the pixels should end up white, give or take edge loss
        assert!((ratio - 64.0 / 255.0).abs() < 0.05, "ratio was {ratio}");
    }

    #[test]
    fn ordered_dither_is_deterministic() {
        let mut a = GrayImage::from_fn(9, 9, |x, y| Luma([(x * 20 + y * 7) as u8]));
        let mut b = a.clone();
        ordered_bayer(&mut a);
        ordered_bayer(&mut b);
        assert_eq!(a.as_raw(), b.as_raw());
    }
}
