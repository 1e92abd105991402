//! Source-page to output-page mapping
//!
//! Splitting can turn one source page into several output pages, and a
//! page that failed to decode produces none. Chapter ranges from the
//! source metadata are expressed in source page numbers, so they have to
//! be remapped onto output indices after processing.

/// Ordered (source page, output count) pairs with cumulative offsets.
///
/// Entries must be added in source order once all processing results are
/// known; the mapping is never interleaved with out-of-order completion
/// events. Output ranges are contiguous, non-overlapping and follow
/// source order.
#[derive(Debug, Default)]
pub struct PageMappingContext {
    /// (source page number, output count, cumulative offset before entry)
    entries: Vec<(u32, u32, u32)>,
    total_outputs: u32,
}

impl PageMappingContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the output count for the next source page.
    pub fn add_source_page(&mut self, page_number: u32, output_count: u32) {
        self.entries
            .push((page_number, output_count, self.total_outputs));
        self.total_outputs += output_count;
    }

    #[must_use]
    pub fn total_outputs(&self) -> u32 {
        self.total_outputs
    }

    /// Resolve a source-page range to a 0-based output index range.
    ///
    /// A boundary landing on a zero-output page resolves to the nearest
    /// subsequent page that produced output. Returns `None` when no page
    /// in the range produced any output.
    #[must_use]
    pub fn remap_range(&self, start_page: u32, end_page: u32) -> Option<(u32, u32)> {
        if self.total_outputs == 0 {
            return None;
        }

        let start = self
            .entries
            .iter()
            .find(|&&(page, count, _)| page >= start_page && count > 0)
            .map(|&(_, _, offset)| offset)?;

        // First producing page past the end bounds the range from above
        let end = self
            .entries
            .iter()
            .find(|&&(page, count, _)| page > end_page && count > 0)
            .map_or(self.total_outputs - 1, |&(_, _, offset)| {
                offset.saturating_sub(1)
            });

        if end < start {
            return None;
        }
        Some((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(counts: &[u32]) -> PageMappingContext {
        let mut ctx = PageMappingContext::new();
        for (i, &count) in counts.iter().enumerate() {
            ctx.add_source_page(i as u32 + 1, count);
        }
        ctx
    }

    #[test]
    fn cumulative_ranges() {
        // pages 1..=4 produce [2, 0, 1, 3] outputs
        let ctx = context(&[2, 0, 1, 3]);
        assert_eq!(ctx.total_outputs(), 6);
        assert_eq!(ctx.remap_range(1, 1), Some((0, 1)));
        assert_eq!(ctx.remap_range(3, 3), Some((2, 2)));
        assert_eq!(ctx.remap_range(4, 4), Some((3, 5)));
    }

    #[test]
    fn zero_output_boundary_skips_forward() {
        // Range covers the failed page 2 and the one-output page 3
        let ctx = context(&[2, 0, 1, 3]);
        assert_eq!(ctx.remap_range(2, 3), Some((2, 2)));
    }

    #[test]
    fn range_of_only_failed_pages_is_empty() {
        let ctx = context(&[1, 0, 0, 2]);
        assert_eq!(ctx.remap_range(2, 3), None);
    }

    #[test]
    fn trailing_range_clamps_to_last_output() {
        let ctx = context(&[1, 2, 0]);
        assert_eq!(ctx.remap_range(2, 3), Some((1, 2)));
        assert_eq!(ctx.remap_range(3, 3), None);
    }

    #[test]
    fn all_failed_pages_yield_nothing() {
        let ctx = context(&[0, 0]);
        assert_eq!(ctx.remap_range(1, 2), None);
    }

    #[test]
    fn full_range_spans_everything() {
        let ctx = context(&[2, 0, 1, 3]);
        assert_eq!(ctx.remap_range(1, 4), Some((0, 5)));
    }
}
