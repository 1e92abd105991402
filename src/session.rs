//! Conversion session: one source in, one container out
//!
//! Ties the pieces together: read the source, resolve the cover, fan the
//! pages out to the worker pool, reassemble results in source order,
//! remap chapter ranges and build the container.

use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use crate::codec::{ContainerBuilder, EncodedPage};
use crate::error::ConvertError;
use crate::mapping::PageMappingContext;
use crate::metadata::{BookMetadata, parse_comic_info, remap_toc};
use crate::options::{ConversionOptions, DeviceProfile};
use crate::pool::ConversionPool;
use crate::preview::{MAX_RETAINED_PREVIEWS, PreviewSampler};
use crate::source::{CbzSource, DirSource, PageSource, SourcePage};

/// Result of converting one source.
pub struct ConversionOutcome {
    /// Source display name, extension not included
    pub name: String,
    /// Finished container bytes
    pub data: Vec<u8>,
    /// Output pages in the container
    pub page_count: u32,
    /// Sampled JPEG previews in page order
    pub previews: Vec<Vec<u8>>,
}

/// Per-source result of a batch run. Failures are isolated; one bad
/// archive never aborts the rest of the batch.
pub struct BatchItem {
    pub source: String,
    pub result: Result<ConversionOutcome, ConvertError>,
}

/// Container file extension for a device profile.
#[must_use]
pub fn container_extension(device: DeviceProfile) -> &'static str {
    match device.bit_depth() {
        crate::options::BitDepth::Mono1 => "xtc",
        crate::options::BitDepth::Gray2 => "xtch",
    }
}

/// Convert one filesystem path, picking the source type by shape:
/// directories are read as loose image folders, anything else as a
/// CBZ/ZIP archive.
pub fn convert_path(
    path: &Path,
    options: &ConversionOptions,
    progress: impl FnMut(f32, Option<&[u8]>),
) -> Result<ConversionOutcome, ConvertError> {
    if path.is_dir() {
        convert_source(&mut DirSource::open(path), options, progress)
    } else {
        convert_source(&mut CbzSource::open(path), options, progress)
    }
}

/// Convert every path, isolating failures per source.
pub fn convert_batch(
    paths: &[impl AsRef<Path>],
    options: &ConversionOptions,
    mut progress: impl FnMut(&str, f32, Option<&[u8]>),
) -> Vec<BatchItem> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let source = path.display().to_string();
            let result = convert_path(path, options, |fraction, preview| {
                progress(&source, fraction, preview);
            });
            if let Err(e) = &result {
                warn!("{source}: conversion failed: {e}");
            }
            BatchItem { source, result }
        })
        .collect()
}

/// Convert one page source into a finished container.
///
/// `progress` fires once per completed source page with the overall
/// fraction and, when enabled, a transient preview of that page.
pub fn convert_source(
    source: &mut dyn PageSource,
    options: &ConversionOptions,
    mut progress: impl FnMut(f32, Option<&[u8]>),
) -> Result<ConversionOutcome, ConvertError> {
    let options = options.clone().clamped();
    let contents = source.read()?;
    let mut pages = contents.pages;
    if pages.is_empty() {
        return Err(ConvertError::NoPages {
            path: source.name().into(),
        });
    }

    let page_count = pages.len();
    let mut metadata = contents
        .raw_metadata
        .as_deref()
        .and_then(|xml| parse_comic_info(xml, page_count as u32));

    let renumbering = arrange_cover(&mut pages, metadata.as_ref());
    if let (Some(renumbering), Some(meta)) = (&renumbering, &mut metadata) {
        translate_toc(meta, renumbering);
    }

    info!(
        "{}: {page_count} pages, metadata={}",
        source.name(),
        metadata.is_some()
    );

    let sampler = PreviewSampler::new(page_count);
    let shared_options = Arc::new(options.clone());
    let cover_options = Arc::new(options.without_split());

    let mut pool = ConversionPool::new(page_count);
    for (i, page) in pages.into_iter().enumerate() {
        let job_options = if page.is_cover {
            Arc::clone(&cover_options)
        } else {
            Arc::clone(&shared_options)
        };
        let wants_preview = sampler.keep(i) || options.show_progress_preview;
        pool.submit(i, Arc::new(page), job_options, wants_preview)?;
    }

    let mut completed = 0usize;
    let results = pool.gather(|_, output| {
        completed += 1;
        let fraction = completed as f32 / page_count as f32;
        progress(fraction, output.preview.as_deref());
    });

    // Reassembly is by source position, independent of completion order
    let mut mapping = PageMappingContext::new();
    let mut encoded: Vec<EncodedPage> = Vec::new();
    let mut previews = Vec::new();
    for (i, slot) in results.iter().enumerate() {
        let outputs = slot.as_ref().map_or(&[][..], |o| o.pages.as_slice());
        mapping.add_source_page(i as u32 + 1, outputs.len() as u32);
        encoded.extend_from_slice(outputs);

        if sampler.keep(i) && previews.len() < MAX_RETAINED_PREVIEWS {
            if let Some(preview) = slot.as_ref().and_then(|o| o.preview.clone()) {
                previews.push(preview);
            }
        }
    }

    if mapping.total_outputs() == 0 {
        return Err(ConvertError::NoPages {
            path: source.name().into(),
        });
    }

    if let Some(meta) = &mut metadata {
        meta.toc = remap_toc(&meta.toc, &mapping);
    }

    let data = ContainerBuilder::new(options.device.bit_depth())
        .build(encoded, metadata.as_ref().filter(|m| !m.is_empty()))?;

    Ok(ConversionOutcome {
        name: source.name().to_string(),
        data,
        page_count: mapping.total_outputs(),
        previews,
    })
}

/// Resolve a metadata-declared cover (by page number or path match),
/// move it to the front and renumber pages sequentially. Pages without a
/// declared cover are left alone; page 1 then follows the global split
/// mode like any other page.
///
/// Returns the old-to-new page number translation when pages moved.
fn arrange_cover(pages: &mut Vec<SourcePage>, metadata: Option<&BookMetadata>) -> Option<Vec<u32>> {
    let declared = metadata.and_then(|meta| {
        meta.cover_page
            .and_then(|number| {
                let idx = number.checked_sub(1)? as usize;
                (idx < pages.len()).then_some(idx)
            })
            .or_else(|| {
                let path = meta.cover_path.as_deref()?;
                pages.iter().position(|p| p.path == path)
            })
    });

    let cover_idx = declared?;
    pages[cover_idx].is_cover = true;
    if cover_idx == 0 {
        return None;
    }

    let cover = pages.remove(cover_idx);
    pages.insert(0, cover);

    let mut translation = vec![0u32; pages.len() + 1];
    for (i, page) in pages.iter_mut().enumerate() {
        let new_number = i as u32 + 1;
        translation[page.number as usize] = new_number;
        page.number = new_number;
    }
    Some(translation)
}

/// Rewrite TOC page numbers through the cover renumbering.
fn translate_toc(metadata: &mut BookMetadata, translation: &[u32]) {
    metadata.cover_page = Some(1);
    for entry in &mut metadata.toc {
        let start = translation
            .get(entry.start_page as usize)
            .copied()
            .filter(|&n| n > 0)
            .unwrap_or(entry.start_page);
        let end = translation
            .get(entry.end_page as usize)
            .copied()
            .filter(|&n| n > 0)
            .unwrap_or(entry.end_page);
        entry.start_page = start.min(end);
        entry.end_page = start.max(end);
    }
}
