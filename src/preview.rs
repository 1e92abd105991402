//! Preview sampling and thumbnail rendering
//!
//! Retained previews are a sparse sample of the converted pages used for
//! the result gallery; they are bounded regardless of how many pages the
//! source has. The transient per-tick progress preview is separate and
//! never retained here.

use image::GrayImage;
use image::codecs::jpeg::JpegEncoder;

use crate::error::ConvertError;

/// Hard cap on retained previews per conversion
pub const MAX_RETAINED_PREVIEWS: usize = 48;

/// Retained preview thumbnail long edge
const PREVIEW_HEIGHT: u32 = 200;
const PREVIEW_JPEG_QUALITY: u8 = 70;

/// Decides which source pages keep a rendered low-resolution preview.
#[derive(Debug, Clone, Copy)]
pub struct PreviewSampler {
    total_pages: usize,
    interval: usize,
}

impl PreviewSampler {
    #[must_use]
    pub fn new(total_pages: usize) -> Self {
        // Reserve two slots for the always-kept first and last page
        let budget = MAX_RETAINED_PREVIEWS.saturating_sub(2).max(1);
        let interval = total_pages.div_ceil(budget).max(1);
        Self {
            total_pages,
            interval,
        }
    }

    /// Whether the page at this 0-based source index keeps its preview.
    #[must_use]
    pub fn keep(&self, index: usize) -> bool {
        if self.total_pages == 0 || index >= self.total_pages {
            return false;
        }
        index == 0 || index == self.total_pages - 1 || index % self.interval == 0
    }

    /// Upper bound on how many previews this sampler retains.
    #[must_use]
    pub fn retained_bound(&self) -> usize {
        (self.total_pages.div_ceil(self.interval) + 2).min(self.total_pages)
    }
}

/// Downscale a processed page and encode it as a JPEG preview.
pub fn render_preview(image: &GrayImage) -> Result<Vec<u8>, ConvertError> {
    let (w, h) = image.dimensions();
    // Downscale only; pages shorter than the preview stay as they are
    let scale = (PREVIEW_HEIGHT as f32 / h.max(1) as f32).min(1.0);
    let pw = ((w as f32 * scale).round() as u32).max(1);
    let ph = ((h as f32 * scale).round() as u32).max(1);

    let thumb = image::imageops::resize(image, pw, ph, image::imageops::FilterType::Triangle);

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, PREVIEW_JPEG_QUALITY)
        .encode_image(&image::DynamicImage::ImageLuma8(thumb))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn retained(total: usize) -> Vec<usize> {
        let sampler = PreviewSampler::new(total);
        (0..total).filter(|&i| sampler.keep(i)).collect()
    }

    #[test]
    fn short_works_keep_every_page() {
        assert_eq!(retained(5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn first_and_last_always_kept() {
        for total in [1usize, 2, 10, 250, 5000] {
            let kept = retained(total);
            assert!(kept.contains(&0), "total {total}");
            assert!(kept.contains(&(total - 1)), "total {total}");
        }
    }

    #[test]
    fn retained_count_is_capped() {
        for total in [100usize, 500, 2000, 50_000] {
            let kept = retained(total);
            assert!(
                kept.len() <= MAX_RETAINED_PREVIEWS,
                "total {total} kept {}",
                kept.len()
            );
        }
    }

    #[test]
    fn interval_widens_with_page_count() {
        let short = PreviewSampler::new(40);
        let long = PreviewSampler::new(4000);
        assert!(long.interval > short.interval);
    }

    #[test]
    fn out_of_range_index_is_never_kept() {
        let sampler = PreviewSampler::new(10);
        assert!(!sampler.keep(10));
        assert!(!PreviewSampler::new(0).keep(0));
    }

    #[test]
    fn preview_is_downscaled_jpeg() {
        let page = GrayImage::from_pixel(480, 800, Luma([180]));
        let bytes = render_preview(&page).unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.height(), 200);
        assert_eq!(decoded.width(), 120);
    }
}
