//! Conversion options: device profiles and validated pipeline settings

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Maximum per-axis margin, as a percentage of the axis
pub const MAX_MARGIN_PCT: u8 = 20;

/// Target device, selecting output dimensions and bit depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceProfile {
    /// 480x800 1-bit panel (XTC container)
    #[default]
    #[value(name = "x4")]
    X4,
    /// 480x800 2-bit grayscale variant (XTCH container)
    #[value(name = "x4-gray")]
    X4Gray,
}

/// Output bit depth per pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Mono1,
    Gray2,
}

impl DeviceProfile {
    #[must_use]
    pub const fn target_width(self) -> u32 {
        480
    }

    #[must_use]
    pub const fn target_height(self) -> u32 {
        800
    }

    #[must_use]
    pub const fn bit_depth(self) -> BitDepth {
        match self {
            DeviceProfile::X4 => BitDepth::Mono1,
            DeviceProfile::X4Gray => BitDepth::Gray2,
        }
    }
}

/// Policy for dividing one source image into multiple output pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Never split; tall landscape pages are rotated whole
    #[default]
    None,
    /// Two equal-height bands
    Half,
    /// Three overlapping bands covering the long axis
    Overlap,
}

/// Grayscale-to-bilevel conversion algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "snake_case")]
pub enum DitherMode {
    /// Plain cut at 128, no error diffusion
    Threshold,
    /// Floyd-Steinberg error diffusion
    #[default]
    FloydSteinberg,
    /// Atkinson error diffusion (drops 1/4 of the error, higher contrast)
    Atkinson,
    /// 4x4 Bayer ordered dithering
    Ordered,
}

/// How the reader holds the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Immutable per-run conversion settings.
///
/// Margins are clamped to `0..=MAX_MARGIN_PCT` at construction; invalid
/// enum values never get past clap/serde, so the pipeline itself does no
/// string matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub device: DeviceProfile,
    pub split_mode: SplitMode,
    pub dither: DitherMode,
    /// Contrast boost strength, 0 = off
    pub contrast_level: u8,
    /// Percent of width trimmed from each side
    pub h_margin_pct: u8,
    /// Percent of height trimmed from each side
    pub v_margin_pct: u8,
    pub orientation: Orientation,
    /// Rotate landscape output clockwise instead of counter-clockwise
    pub landscape_flip_clockwise: bool,
    /// Emit a transient preview with each progress tick
    pub show_progress_preview: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            device: DeviceProfile::default(),
            split_mode: SplitMode::default(),
            dither: DitherMode::default(),
            contrast_level: 0,
            h_margin_pct: 0,
            v_margin_pct: 0,
            orientation: Orientation::default(),
            landscape_flip_clockwise: false,
            show_progress_preview: false,
        }
    }
}

impl ConversionOptions {
    /// Clamp margins into the accepted range. Call once at the conversion
    /// boundary; the pipeline assumes clamped values.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.h_margin_pct = self.h_margin_pct.min(MAX_MARGIN_PCT);
        self.v_margin_pct = self.v_margin_pct.min(MAX_MARGIN_PCT);
        self
    }

    /// Copy of these options with splitting disabled. Cover pages are
    /// always converted whole because the container's first page doubles
    /// as the device home-screen thumbnail.
    #[must_use]
    pub fn without_split(&self) -> Self {
        Self {
            split_mode: SplitMode::None,
            ..self.clone()
        }
    }
}
