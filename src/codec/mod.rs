//! Binary page and container codecs

mod xtc;
mod xtg;

pub use xtc::{ContainerBuilder, ReadDirection, XtcContainer, XtcPageEntry, XTC_HEADER_LEN, XTC_INDEX_ENTRY_LEN};
pub use xtg::{XtgPage, XTG_HEADER_LEN, encode_page};

/// One packed page blob plus the name that orders it in the container.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    pub name: String,
    pub width: u16,
    pub height: u16,
    pub data: Vec<u8>,
}
