//! XTC container builder and reader
//!
//! Layout (all multi-byte fields little-endian):
//!
//! ```text
//! offset  0  magic           "XTC\0" (1-bit pages) / "XTCH" (2-bit pages)
//! offset  4  version         u16 = 1
//! offset  6  page count      u16
//! offset  8  read direction  u8
//! offset  9  has metadata    u8
//! offset 10  has thumbnails  u8
//! offset 11  has chapters    u8
//! offset 12  current page    u32 = 0
//! offset 16  metadata offset u64 (absolute, 0 when absent)
//! offset 24  index offset    u64 (= 48)
//! offset 32  data offset     u64 (= 48 + 16 * page count)
//! offset 40  thumb offset    u64 (= 0, reserved)
//! ```
//!
//! The index table holds one 16-byte entry per page in final order:
//! offset (u64, relative to the data offset), size (u32), width (u16),
//! height (u16). Page blobs follow contiguously in table order; the
//! optional metadata block (JSON-serialized [`BookMetadata`]) is appended
//! after the page data.

use log::debug;

use crate::error::ConvertError;
use crate::metadata::BookMetadata;
use crate::options::BitDepth;

use super::EncodedPage;

const XTC_MAGIC_MONO: [u8; 4] = *b"XTC\0";
const XTC_MAGIC_GRAY: [u8; 4] = *b"XTCH";
const XTC_VERSION: u16 = 1;

pub const XTC_HEADER_LEN: usize = 48;
pub const XTC_INDEX_ENTRY_LEN: usize = 16;

/// Page turn direction flag stored in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadDirection {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl ReadDirection {
    const fn as_byte(self) -> u8 {
        match self {
            ReadDirection::LeftToRight => 0,
            ReadDirection::RightToLeft => 1,
        }
    }
}

/// Assembles ordered page blobs (+ optional metadata) into one buffer.
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    depth: BitDepth,
    read_direction: ReadDirection,
}

impl ContainerBuilder {
    #[must_use]
    pub fn new(depth: BitDepth) -> Self {
        Self {
            depth,
            read_direction: ReadDirection::default(),
        }
    }

    #[must_use]
    pub fn with_read_direction(mut self, direction: ReadDirection) -> Self {
        self.read_direction = direction;
        self
    }

    /// Build the final container buffer. Pages are sorted lexicographically
    /// by name first; that sort is the authoritative page order.
    pub fn build(
        &self,
        mut pages: Vec<EncodedPage>,
        metadata: Option<&BookMetadata>,
    ) -> Result<Vec<u8>, ConvertError> {
        if pages.is_empty() {
            return Err(ConvertError::container("container with zero pages"));
        }
        if pages.len() > usize::from(u16::MAX) {
            return Err(ConvertError::container(format!(
                "page count {} exceeds u16 index",
                pages.len()
            )));
        }

        pages.sort_by(|a, b| a.name.cmp(&b.name));

        let page_count = pages.len();
        let index_offset = XTC_HEADER_LEN as u64;
        let data_offset = index_offset + (page_count * XTC_INDEX_ENTRY_LEN) as u64;
        let data_len: u64 = pages.iter().map(|p| p.data.len() as u64).sum();

        let metadata_bytes = match metadata {
            Some(meta) => serde_json::to_vec(meta)
                .map_err(|e| ConvertError::container(format!("metadata serialization: {e}")))?,
            None => Vec::new(),
        };
        let metadata_offset = if metadata_bytes.is_empty() {
            0
        } else {
            data_offset + data_len
        };
        let has_chapters = metadata.is_some_and(|m| !m.toc.is_empty());

        let total = data_offset as usize + data_len as usize + metadata_bytes.len();
        let mut out = Vec::with_capacity(total);

        out.extend_from_slice(match self.depth {
            BitDepth::Mono1 => &XTC_MAGIC_MONO,
            BitDepth::Gray2 => &XTC_MAGIC_GRAY,
        });
        out.extend_from_slice(&XTC_VERSION.to_le_bytes());
        out.extend_from_slice(&(page_count as u16).to_le_bytes());
        out.push(self.read_direction.as_byte());
        out.push(u8::from(!metadata_bytes.is_empty()));
        out.push(0); // has thumbnails
        out.push(u8::from(has_chapters));
        out.extend_from_slice(&0u32.to_le_bytes()); // current page
        out.extend_from_slice(&metadata_offset.to_le_bytes());
        out.extend_from_slice(&index_offset.to_le_bytes());
        out.extend_from_slice(&data_offset.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes()); // thumb offset

        let mut relative = 0u64;
        for page in &pages {
            out.extend_from_slice(&relative.to_le_bytes());
            out.extend_from_slice(&(page.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&page.width.to_le_bytes());
            out.extend_from_slice(&page.height.to_le_bytes());
            relative += page.data.len() as u64;
        }

        for page in &pages {
            out.extend_from_slice(&page.data);
        }
        out.extend_from_slice(&metadata_bytes);

        debug!(
            "built container: {page_count} pages, {} bytes, metadata={}",
            out.len(),
            !metadata_bytes.is_empty()
        );
        Ok(out)
    }
}

/// One parsed index entry plus its page blob.
#[derive(Debug, Clone)]
pub struct XtcPageEntry {
    pub offset: u64,
    pub size: u32,
    pub width: u16,
    pub height: u16,
    pub data: Vec<u8>,
}

/// A parsed container; the symmetric reader for [`ContainerBuilder`].
#[derive(Debug)]
pub struct XtcContainer {
    pub depth: BitDepth,
    pub version: u16,
    pub read_direction: ReadDirection,
    pub pages: Vec<XtcPageEntry>,
    pub metadata: Option<BookMetadata>,
}

impl XtcContainer {
    pub fn parse(bytes: &[u8]) -> Result<Self, ConvertError> {
        if bytes.len() < XTC_HEADER_LEN {
            return Err(ConvertError::container("buffer shorter than header"));
        }

        let depth = match &bytes[0..4] {
            m if *m == XTC_MAGIC_MONO => BitDepth::Mono1,
            m if *m == XTC_MAGIC_GRAY => BitDepth::Gray2,
            _ => return Err(ConvertError::container("bad container magic")),
        };

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != XTC_VERSION {
            return Err(ConvertError::container(format!(
                "unsupported container version {version}"
            )));
        }

        let page_count = usize::from(u16::from_le_bytes([bytes[6], bytes[7]]));
        let read_direction = if bytes[8] == 1 {
            ReadDirection::RightToLeft
        } else {
            ReadDirection::LeftToRight
        };
        let has_metadata = bytes[9] != 0;
        let metadata_offset = read_u64(bytes, 16);
        let index_offset = read_u64(bytes, 24);
        let data_offset = read_u64(bytes, 32);

        if index_offset != XTC_HEADER_LEN as u64 {
            return Err(ConvertError::container("unexpected index offset"));
        }
        if data_offset != index_offset + (page_count * XTC_INDEX_ENTRY_LEN) as u64 {
            return Err(ConvertError::container("index/data offset mismatch"));
        }
        if bytes.len() < data_offset as usize {
            return Err(ConvertError::container("buffer shorter than index table"));
        }

        let data_end = if has_metadata && metadata_offset > 0 {
            // Offsets come from untrusted bytes; reject before any slicing
            if metadata_offset > bytes.len() as u64 || metadata_offset < data_offset {
                return Err(ConvertError::container("metadata offset out of range"));
            }
            metadata_offset
        } else {
            bytes.len() as u64
        };

        let mut pages = Vec::with_capacity(page_count);
        for i in 0..page_count {
            let entry = index_offset as usize + i * XTC_INDEX_ENTRY_LEN;
            let offset = read_u64(bytes, entry);
            let size = u32::from_le_bytes([
                bytes[entry + 8],
                bytes[entry + 9],
                bytes[entry + 10],
                bytes[entry + 11],
            ]);
            let width = u16::from_le_bytes([bytes[entry + 12], bytes[entry + 13]]);
            let height = u16::from_le_bytes([bytes[entry + 14], bytes[entry + 15]]);

            let start = data_offset + offset;
            let end = start + u64::from(size);
            if end > data_end {
                return Err(ConvertError::container(format!(
                    "page {i} extends past data block"
                )));
            }

            pages.push(XtcPageEntry {
                offset,
                size,
                width,
                height,
                data: bytes[start as usize..end as usize].to_vec(),
            });
        }

        let metadata = if has_metadata && metadata_offset > 0 {
            let block = bytes
                .get(metadata_offset as usize..)
                .ok_or_else(|| ConvertError::container("metadata offset past buffer"))?;
            Some(
                serde_json::from_slice(block)
                    .map_err(|e| ConvertError::container(format!("metadata parse: {e}")))?,
            )
        } else {
            None
        };

        Ok(Self {
            depth,
            version,
            read_direction,
            pages,
            metadata,
        })
    }
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}
