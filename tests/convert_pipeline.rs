//! End-to-end conversion: CBZ archive in, parsable XTC container out.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use zip::write::FileOptions;

use xtconv::codec::{XtcContainer, XtgPage};
use xtconv::options::BitDepth;
use xtconv::{ConversionOptions, DeviceProfile, Orientation, SplitMode, convert_path};

fn png_page(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = GrayImage::from_pixel(width, height, Luma([shade]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn write_cbz(dir: &Path, entries: &[(&str, Vec<u8>)]) -> PathBuf {
    let path = dir.join("volume.cbz");
    let mut writer = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
    path
}

#[test]
fn cbz_round_trips_through_the_container() {
    let dir = tempfile::tempdir().unwrap();
    let comic_info = br#"<ComicInfo>
  <Title>Volume 1</Title>
  <Writer>Author</Writer>
  <Pages>
    <Page Image="0" Type="FrontCover"/>
    <Page Image="1" Bookmark="Chapter 1"/>
  </Pages>
</ComicInfo>"#;

    let path = write_cbz(
        dir.path(),
        &[
            ("p3.png", png_page(480, 800, 255)),
            ("p1.png", png_page(480, 800, 0)),
            ("p2.png", png_page(480, 800, 255)),
            ("ComicInfo.xml", comic_info.to_vec()),
        ],
    );

    let outcome = convert_path(&path, &ConversionOptions::default(), |_, _| {}).unwrap();
    assert_eq!(outcome.name, "volume");
    assert_eq!(outcome.page_count, 3);

    let container = XtcContainer::parse(&outcome.data).unwrap();
    assert_eq!(container.depth, BitDepth::Mono1);
    assert_eq!(container.pages.len(), 3);

    // Natural sort puts p1 (all black) first, which is also the declared
    // cover, so the first container page decodes to all-zero bits.
    let first = XtgPage::parse(&container.pages[0].data).unwrap();
    assert_eq!((first.width, first.height), (480, 800));
    assert!(first.packed.iter().all(|&b| b == 0));

    let meta = container.metadata.unwrap();
    assert_eq!(meta.title.as_deref(), Some("Volume 1"));
    assert_eq!(meta.author.as_deref(), Some("Author"));
    assert_eq!(meta.cover_page, Some(1));
    // Chapter 1 spans source pages 2..=3, one output each: indices 1..=2
    assert_eq!(meta.toc.len(), 1);
    assert_eq!((meta.toc[0].start_page, meta.toc[0].end_page), (1, 2));
}

#[test]
fn landscape_split_multiplies_output_pages() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_cbz(
        dir.path(),
        &[
            ("001.png", png_page(600, 900, 200)),
            ("002.png", png_page(600, 900, 200)),
        ],
    );

    let options = ConversionOptions {
        orientation: Orientation::Landscape,
        split_mode: SplitMode::Overlap,
        ..ConversionOptions::default()
    };
    let outcome = convert_path(&path, &options, |_, _| {}).unwrap();

    // No declared cover, so both tall pages split into three overlapping
    // bands each.
    assert_eq!(outcome.page_count, 6);
    let container = XtcContainer::parse(&outcome.data).unwrap();
    assert_eq!(container.pages.len(), 6);
    for entry in &container.pages {
        let page = XtgPage::parse(&entry.data).unwrap();
        assert_eq!((page.width, page.height), (480, 800));
    }
}

#[test]
fn declared_cover_converts_whole_in_split_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_cbz(
        dir.path(),
        &[
            ("001.png", png_page(600, 900, 200)),
            ("002.png", png_page(600, 900, 200)),
            (
                "ComicInfo.xml",
                br#"<ComicInfo><Pages><Page Image="0" Type="FrontCover"/></Pages></ComicInfo>"#
                    .to_vec(),
            ),
        ],
    );

    let options = ConversionOptions {
        orientation: Orientation::Landscape,
        split_mode: SplitMode::Overlap,
        ..ConversionOptions::default()
    };
    let outcome = convert_path(&path, &options, |_, _| {}).unwrap();

    // The declared cover converts whole; only the second page splits
    assert_eq!(outcome.page_count, 4);
}

#[test]
fn gray_device_emits_xtch() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_cbz(dir.path(), &[("001.png", png_page(480, 800, 170))]);

    let options = ConversionOptions {
        device: DeviceProfile::X4Gray,
        ..ConversionOptions::default()
    };
    let outcome = convert_path(&path, &options, |_, _| {}).unwrap();

    assert_eq!(&outcome.data[0..4], b"XTCH");
    let container = XtcContainer::parse(&outcome.data).unwrap();
    assert_eq!(container.depth, BitDepth::Gray2);
    let page = XtgPage::parse(&container.pages[0].data).unwrap();
    assert_eq!(page.color_mode, 2);
}

#[test]
fn undecodable_entries_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_cbz(
        dir.path(),
        &[
            ("001.png", png_page(480, 800, 255)),
            ("002.png", b"not a png".to_vec()),
            ("003.png", png_page(480, 800, 255)),
        ],
    );

    let outcome = convert_path(&path, &ConversionOptions::default(), |_, _| {}).unwrap();
    assert_eq!(outcome.page_count, 2);
}
