//! Page sources: collaborators that supply ordered raw page bitmaps
//!
//! A source yields pages in reading order with 1-based page numbers plus
//! the raw metadata document (ComicInfo.xml) when the source carries one.
//! Decoding the bitmaps happens later, on the worker lanes; a source only
//! deals in bytes.

use std::cmp::Ordering;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::ConvertError;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const METADATA_FILENAME: &str = "comicinfo.xml";

/// One raw source page
#[derive(Debug, Clone)]
pub struct SourcePage {
    /// 1-based original page number
    pub number: u32,
    /// Undecoded image bytes
    pub data: Vec<u8>,
    /// Archive entry name or file name, used for cover-by-path matching
    pub path: String,
    pub is_cover: bool,
}

/// Everything a source supplies for one conversion
#[derive(Debug, Default)]
pub struct SourceContents {
    pub pages: Vec<SourcePage>,
    pub raw_metadata: Option<String>,
}

/// Supplier of ordered raw pages (archive, directory, rasterized PDF, ...)
pub trait PageSource {
    /// Display name, used for the output file and error reports
    fn name(&self) -> &str;

    fn read(&mut self) -> Result<SourceContents, ConvertError>;
}

/// CBZ / ZIP comic archive source
pub struct CbzSource {
    path: PathBuf,
    name: String,
}

impl CbzSource {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = file_stem(&path);
        Self { path, name }
    }
}

impl PageSource for CbzSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<SourceContents, ConvertError> {
        let file = File::open(&self.path)?;
        let mut archive = ZipArchive::new(file)?;

        let mut image_entries: Vec<String> = Vec::new();
        let mut metadata_entry: Option<String> = None;

        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let entry_name = entry.name().to_string();
            if entry_name.starts_with("__MACOSX") {
                continue;
            }
            if is_image_name(&entry_name) {
                image_entries.push(entry_name);
            } else if entry_name.to_ascii_lowercase().ends_with(METADATA_FILENAME) {
                metadata_entry = Some(entry_name);
            }
        }

        image_entries.sort_by(|a, b| natural_cmp(a, b));

        let mut pages = Vec::with_capacity(image_entries.len());
        for (i, entry_name) in image_entries.iter().enumerate() {
            let mut data = Vec::new();
            archive.by_name(entry_name)?.read_to_end(&mut data)?;
            pages.push(SourcePage {
                number: i as u32 + 1,
                data,
                path: entry_name.clone(),
                is_cover: false,
            });
        }

        let raw_metadata = metadata_entry.and_then(|entry_name| {
            let mut xml = String::new();
            match archive.by_name(&entry_name) {
                Ok(mut entry) => match entry.read_to_string(&mut xml) {
                    Ok(_) => Some(xml),
                    Err(e) => {
                        warn!("failed to read {entry_name}: {e}");
                        None
                    }
                },
                Err(e) => {
                    warn!("failed to open {entry_name}: {e}");
                    None
                }
            }
        });

        debug!(
            "{}: {} image entries, metadata={}",
            self.name,
            pages.len(),
            raw_metadata.is_some()
        );
        Ok(SourceContents {
            pages,
            raw_metadata,
        })
    }
}

/// Directory of loose page images
pub struct DirSource {
    path: PathBuf,
    name: String,
}

impl DirSource {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = file_stem(&path);
        Self { path, name }
    }
}

impl PageSource for DirSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<SourceContents, ConvertError> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.path)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.to_str().is_some_and(is_image_name))
            .collect();

        files.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));

        let mut pages = Vec::with_capacity(files.len());
        for (i, file) in files.iter().enumerate() {
            let data = std::fs::read(file)?;
            pages.push(SourcePage {
                number: i as u32 + 1,
                data,
                path: file
                    .strip_prefix(&self.path)
                    .unwrap_or(file)
                    .to_string_lossy()
                    .into_owned(),
                is_cover: false,
            });
        }

        let metadata_path = self.path.join("ComicInfo.xml");
        let raw_metadata = std::fs::read_to_string(&metadata_path).ok();

        Ok(SourceContents {
            pages,
            raw_metadata,
        })
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| path.to_string_lossy().into_owned(), |s| {
            s.to_string_lossy().into_owned()
        })
}

fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
}

/// Compare file names the way humans read them: digit runs compare as
/// numbers, so "page2" sorts before "page10".
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ia = a.chars().peekable();
    let mut ib = b.chars().peekable();

    loop {
        match (ia.peek().copied(), ib.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) => {
                if ca.is_ascii_digit() && cb.is_ascii_digit() {
                    let run_a = take_digits(&mut ia);
                    let run_b = take_digits(&mut ib);
                    let na = run_a.trim_start_matches('0');
                    let nb = run_b.trim_start_matches('0');
                    let ord = na
                        .len()
                        .cmp(&nb.len())
                        .then_with(|| na.cmp(nb))
                        .then_with(|| run_a.len().cmp(&run_b.len()));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                } else {
                    let ord = ca
                        .to_ascii_lowercase()
                        .cmp(&cb.to_ascii_lowercase())
                        .then_with(|| ca.cmp(&cb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    ia.next();
                    ib.next();
                }
            }
        }
    }
}

fn take_digits(iter: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(&c) = iter.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        iter.next();
    }
    run
}
