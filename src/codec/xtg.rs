//! XTG page bitmap codec
//!
//! Packs one fixed-size grayscale bitmap into the device's per-page blob:
//! a 22-byte header followed by the packed bitmap. 1-bit pages pack 8
//! pixels per byte MSB-first (bit set iff the dithered pixel is >= 128);
//! the 2-bit variant used by XTCH containers packs 4 pixels per byte
//! (value = pixel >> 6). All multi-byte fields are little-endian.

use image::GrayImage;

use crate::error::ConvertError;
use crate::options::BitDepth;

const XTG_MAGIC: [u8; 4] = *b"XTG\0";

/// Header: magic(4) + width(2) + height(2) + color mode(1) +
/// compression(1) + data size(4) + digest(8)
pub const XTG_HEADER_LEN: usize = 22;

/// Pack a target-size grayscale bitmap into an XTG blob.
pub fn encode_page(img: &GrayImage, depth: BitDepth) -> Result<Vec<u8>, ConvertError> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 || width > u32::from(u16::MAX) || height > u32::from(u16::MAX) {
        return Err(ConvertError::pipeline(format!(
            "page dimensions {width}x{height} out of range"
        )));
    }

    let packed = match depth {
        BitDepth::Mono1 => pack_1bit(img),
        BitDepth::Gray2 => pack_2bit(img),
    };

    let mut out = Vec::with_capacity(XTG_HEADER_LEN + packed.len());
    out.extend_from_slice(&XTG_MAGIC);
    out.extend_from_slice(&(width as u16).to_le_bytes());
    out.extend_from_slice(&(height as u16).to_le_bytes());
    out.push(color_mode(depth));
    out.push(0); // compression: none
    out.extend_from_slice(&(packed.len() as u32).to_le_bytes());
    // The device reader expects the first 8 raw bytes of the packed
    // bitmap here, not a hash. Kept byte-exact for compatibility.
    let mut digest = [0u8; 8];
    let n = packed.len().min(8);
    digest[..n].copy_from_slice(&packed[..n]);
    out.extend_from_slice(&digest);
    out.extend_from_slice(&packed);
    Ok(out)
}

const fn color_mode(depth: BitDepth) -> u8 {
    match depth {
        BitDepth::Mono1 => 1,
        BitDepth::Gray2 => 2,
    }
}

fn pack_1bit(img: &GrayImage) -> Vec<u8> {
    let (width, height) = img.dimensions();
    let row_bytes = (width as usize).div_ceil(8);
    let mut packed = vec![0u8; row_bytes * height as usize];

    for (y, row) in img.rows().enumerate() {
        let base = y * row_bytes;
        for (x, px) in row.enumerate() {
            if px.0[0] >= 128 {
                packed[base + x / 8] |= 0x80 >> (x % 8);
            }
        }
    }
    packed
}

fn pack_2bit(img: &GrayImage) -> Vec<u8> {
    let (width, height) = img.dimensions();
    let row_bytes = (width as usize).div_ceil(4);
    let mut packed = vec![0u8; row_bytes * height as usize];

    for (y, row) in img.rows().enumerate() {
        let base = y * row_bytes;
        for (x, px) in row.enumerate() {
            let value = px.0[0] >> 6;
            packed[base + x / 4] |= value << (6 - 2 * (x % 4));
        }
    }
    packed
}

/// A decoded XTG page, the reader half of this codec.
#[derive(Debug, Clone)]
pub struct XtgPage {
    pub width: u16,
    pub height: u16,
    pub color_mode: u8,
    pub packed: Vec<u8>,
}

impl XtgPage {
    /// Parse an XTG blob back into its packed form.
    pub fn parse(bytes: &[u8]) -> Result<Self, ConvertError> {
        if bytes.len() < XTG_HEADER_LEN {
            return Err(ConvertError::container("XTG blob shorter than header"));
        }
        if bytes[0..4] != XTG_MAGIC {
            return Err(ConvertError::container("bad XTG magic"));
        }

        let width = u16::from_le_bytes([bytes[4], bytes[5]]);
        let height = u16::from_le_bytes([bytes[6], bytes[7]]);
        let color_mode = bytes[8];
        let data_size = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;

        if bytes.len() < XTG_HEADER_LEN + data_size {
            return Err(ConvertError::container("XTG data size exceeds blob"));
        }
        if !matches!(color_mode, 1 | 2) {
            return Err(ConvertError::container(format!(
                "unknown XTG color mode {color_mode}"
            )));
        }

        Ok(Self {
            width,
            height,
            color_mode,
            packed: bytes[XTG_HEADER_LEN..XTG_HEADER_LEN + data_size].to_vec(),
        })
    }

    /// Unpack into an 8-bit grayscale image (bilevel pages become 0/255,
    /// 2-bit pages expand each level across the 0..255 range).
    pub fn to_gray(&self) -> Result<GrayImage, ConvertError> {
        let width = u32::from(self.width);
        let height = u32::from(self.height);
        let img = match self.color_mode {
            1 => {
                let row_bytes = (width as usize).div_ceil(8);
                GrayImage::from_fn(width, height, |x, y| {
                    let byte = self.packed[y as usize * row_bytes + x as usize / 8];
                    let bit = byte & (0x80 >> (x % 8)) != 0;
                    image::Luma([if bit { 255 } else { 0 }])
                })
            }
            2 => {
                let row_bytes = (width as usize).div_ceil(4);
                GrayImage::from_fn(width, height, |x, y| {
                    let byte = self.packed[y as usize * row_bytes + x as usize / 4];
                    let value = (byte >> (6 - 2 * (x % 4))) & 0b11;
                    image::Luma([value * 85])
                })
            }
            other => {
                return Err(ConvertError::container(format!(
                    "unknown XTG color mode {other}"
                )));
            }
        };
        Ok(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn checkerboard(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            Luma([if (x + y) % 2 == 0 { 255 } else { 0 }])
        })
    }

    #[test]
    fn one_bit_round_trip_is_exact() {
        // Width deliberately not a multiple of 8
        let img = checkerboard(13, 5);
        let blob = encode_page(&img, BitDepth::Mono1).unwrap();
        let page = XtgPage::parse(&blob).unwrap();

        assert_eq!(page.width, 13);
        assert_eq!(page.height, 5);
        assert_eq!(page.to_gray().unwrap().as_raw(), img.as_raw());
    }

    #[test]
    fn header_layout() {
        // 16x4 packs to 8 bytes, enough to fill the digest field
        let img = checkerboard(16, 4);
        let blob = encode_page(&img, BitDepth::Mono1).unwrap();

        assert_eq!(&blob[0..4], b"XTG\0");
        assert_eq!(u16::from_le_bytes([blob[4], blob[5]]), 16);
        assert_eq!(u16::from_le_bytes([blob[6], blob[7]]), 4);
        assert_eq!(blob[8], 1); // color mode
        assert_eq!(blob[9], 0); // compression
        let data_size = u32::from_le_bytes([blob[10], blob[11], blob[12], blob[13]]);
        assert_eq!(data_size as usize, blob.len() - XTG_HEADER_LEN);
        // digest = first 8 packed bytes
        assert_eq!(&blob[14..22], &blob[XTG_HEADER_LEN..XTG_HEADER_LEN + 8]);
    }

    #[test]
    fn bit_packing_is_msb_first() {
        let mut img = GrayImage::from_pixel(8, 1, Luma([0]));
        img.put_pixel(0, 0, Luma([255]));
        img.put_pixel(7, 0, Luma([255]));
        let blob = encode_page(&img, BitDepth::Mono1).unwrap();
        assert_eq!(blob[XTG_HEADER_LEN], 0b1000_0001);
    }

    #[test]
    fn threshold_is_128() {
        let mut img = GrayImage::from_pixel(2, 1, Luma([127]));
        img.put_pixel(1, 0, Luma([128]));
        let blob = encode_page(&img, BitDepth::Mono1).unwrap();
        assert_eq!(blob[XTG_HEADER_LEN], 0b0100_0000);
    }

    #[test]
    fn two_bit_packing() {
        let mut img = GrayImage::from_pixel(4, 1, Luma([0]));
        img.put_pixel(1, 0, Luma([85])); // level 1
        img.put_pixel(2, 0, Luma([170])); // level 2
        img.put_pixel(3, 0, Luma([255])); // level 3
        let blob = encode_page(&img, BitDepth::Gray2).unwrap();
        assert_eq!(blob[8], 2);
        assert_eq!(blob[XTG_HEADER_LEN], 0b00_01_10_11);

        let page = XtgPage::parse(&blob).unwrap();
        let gray = page.to_gray().unwrap();
        assert_eq!(gray.as_raw(), &[0, 85, 170, 255]);
    }

    #[test]
    fn short_pages_zero_pad_digest() {
        let img = GrayImage::from_pixel(4, 1, Luma([255]));
        let blob = encode_page(&img, BitDepth::Mono1).unwrap();
        // 1 packed byte, digest padded with zeros
        assert_eq!(&blob[14..22], &[0xF0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let img = checkerboard(8, 8);
        let mut blob = encode_page(&img, BitDepth::Mono1).unwrap();
        blob[0] = b'Z';
        assert!(XtgPage::parse(&blob).is_err());
    }
}
