//! Book metadata: ComicInfo.xml parsing and TOC remapping

use log::warn;
use serde::{Deserialize, Serialize};

use crate::mapping::PageMappingContext;

/// One chapter range. Before remapping, pages are 1-based source page
/// numbers; after [`remap_toc`], they are 0-based output page indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub start_page: u32,
    pub end_page: u32,
}

/// Metadata embedded into the container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    /// 1-based source page number of the cover, when declared
    pub cover_page: Option<u32>,
    /// Archive path of the cover image, when declared by path instead
    pub cover_path: Option<String>,
    pub toc: Vec<TocEntry>,
}

impl BookMetadata {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.cover_page.is_none()
            && self.cover_path.is_none()
            && self.toc.is_empty()
    }
}

/// Parse a ComicInfo.xml document. Failures are non-fatal: a malformed
/// document yields `None` and the conversion proceeds without metadata.
#[must_use]
pub fn parse_comic_info(xml: &str, page_count: u32) -> Option<BookMetadata> {
    let doc = match roxmltree::Document::parse(xml) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("ComicInfo.xml parse failed: {e}");
            return None;
        }
    };

    let root = doc.root_element();
    if !root.has_tag_name("ComicInfo") {
        warn!("ComicInfo.xml root element is <{}>", root.tag_name().name());
        return None;
    }

    let text_of = |tag: &str| {
        root.children()
            .find(|n| n.has_tag_name(tag))
            .and_then(|n| n.text())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    };

    let mut meta = BookMetadata {
        title: text_of("Title").or_else(|| text_of("Series")),
        author: text_of("Writer").or_else(|| text_of("Penciller")),
        ..BookMetadata::default()
    };

    // <Pages> entries carry 0-based image indices; Type="FrontCover"
    // marks the cover, Bookmark attributes delimit chapters.
    let mut bookmarks: Vec<(u32, String)> = Vec::new();
    if let Some(pages) = root.children().find(|n| n.has_tag_name("Pages")) {
        for page in pages.children().filter(|n| n.has_tag_name("Page")) {
            let Some(image) = page.attribute("Image").and_then(|v| v.parse::<u32>().ok())
            else {
                continue;
            };
            let number = image + 1;

            if page.attribute("Type") == Some("FrontCover") && meta.cover_page.is_none() {
                meta.cover_page = Some(number);
            }
            if let Some(bookmark) = page.attribute("Bookmark") {
                let title = bookmark.trim();
                if !title.is_empty() {
                    bookmarks.push((number, title.to_string()));
                }
            }
        }
    }

    bookmarks.sort_by_key(|&(page, _)| page);
    for (i, (start, title)) in bookmarks.iter().enumerate() {
        let end = bookmarks
            .get(i + 1)
            .map_or(page_count, |&(next, _)| next.saturating_sub(1))
            .max(*start);
        meta.toc.push(TocEntry {
            title: title.clone(),
            start_page: *start,
            end_page: end,
        });
    }

    if meta.is_empty() { None } else { Some(meta) }
}

/// Translate TOC entries from source page numbers to output page indices.
/// Entries whose whole range failed to produce output are dropped.
#[must_use]
pub fn remap_toc(toc: &[TocEntry], mapping: &PageMappingContext) -> Vec<TocEntry> {
    toc.iter()
        .filter_map(|entry| {
            let (start, end) = mapping.remap_range(entry.start_page, entry.end_page)?;
            Some(TocEntry {
                title: entry.title.clone(),
                start_page: start,
                end_page: end,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<ComicInfo>
  <Title>Test Book</Title>
  <Writer>Some Writer</Writer>
  <Pages>
    <Page Image="0" Type="FrontCover"/>
    <Page Image="1"/>
    <Page Image="2" Bookmark="Chapter 1"/>
    <Page Image="6" Bookmark="Chapter 2"/>
  </Pages>
</ComicInfo>"#;

    #[test]
    fn parses_title_author_and_cover() {
        let meta = parse_comic_info(SAMPLE, 10).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Test Book"));
        assert_eq!(meta.author.as_deref(), Some("Some Writer"));
        assert_eq!(meta.cover_page, Some(1));
    }

    #[test]
    fn bookmarks_become_chapter_ranges() {
        let meta = parse_comic_info(SAMPLE, 10).unwrap();
        assert_eq!(
            meta.toc,
            vec![
                TocEntry {
                    title: "Chapter 1".to_string(),
                    start_page: 3,
                    end_page: 6,
                },
                TocEntry {
                    title: "Chapter 2".to_string(),
                    start_page: 7,
                    end_page: 10,
                },
            ]
        );
    }

    #[test]
    fn malformed_xml_is_non_fatal() {
        assert!(parse_comic_info("<ComicInfo><Title>oops", 5).is_none());
        assert!(parse_comic_info("<NotComicInfo/>", 5).is_none());
        assert!(parse_comic_info("<ComicInfo></ComicInfo>", 5).is_none());
    }

    #[test]
    fn remap_skips_failed_ranges() {
        let mut mapping = PageMappingContext::new();
        for (page, count) in [(1, 2), (2, 0), (3, 1), (4, 3)] {
            mapping.add_source_page(page, count);
        }

        let toc = vec![
            TocEntry {
                title: "A".to_string(),
                start_page: 2,
                end_page: 3,
            },
            TocEntry {
                title: "B".to_string(),
                start_page: 4,
                end_page: 4,
            },
        ];

        let remapped = remap_toc(&toc, &mapping);
        assert_eq!(remapped.len(), 2);
        assert_eq!((remapped[0].start_page, remapped[0].end_page), (2, 2));
        assert_eq!((remapped[1].start_page, remapped[1].end_page), (3, 5));
    }
}
