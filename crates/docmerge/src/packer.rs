//! Greedy batch packing under a byte cap and a word cap.
//!
//! Items are taken in the order given (callers sort by source path). A batch
//! is closed before an item that would push either running total over its
//! cap; an item that is over a cap on its own still gets a batch of its own.
//! Estimation and packing share [`plan`], so a capacity check made with
//! [`estimate`] always matches what [`pack`] produces.

use std::ops::Range;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caps {
    pub max_bytes: u64,
    pub max_words: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measured {
    pub bytes: u64,
    pub words: usize,
}

impl Measured {
    pub fn new(bytes: u64, words: usize) -> Self {
        Self { bytes, words }
    }

    pub fn exceeds_bytes(&self, caps: Caps) -> bool {
        self.bytes > caps.max_bytes
    }

    pub fn exceeds_words(&self, caps: Caps) -> bool {
        self.words > caps.max_words
    }
}

/// Index ranges of the batches for `items`. Never yields an empty range.
pub fn plan<I>(items: I, caps: Caps) -> Vec<Range<usize>>
where
    I: IntoIterator<Item = Measured>,
{
    let mut batches = Vec::new();
    let mut start = 0;
    let mut bytes: u64 = 0;
    let mut words: usize = 0;
    let mut count = 0;

    for (index, item) in items.into_iter().enumerate() {
        let over_bytes = bytes.saturating_add(item.bytes) > caps.max_bytes;
        let over_words = words.saturating_add(item.words) > caps.max_words;
        if index > start && (over_bytes || over_words) {
            batches.push(start..index);
            start = index;
            bytes = 0;
            words = 0;
        }
        bytes = bytes.saturating_add(item.bytes);
        words = words.saturating_add(item.words);
        count = index + 1;
    }

    if count > start {
        batches.push(start..count);
    }
    batches
}

/// Number of batches [`pack`] would produce for the same measurements.
pub fn estimate<I>(items: I, caps: Caps) -> usize
where
    I: IntoIterator<Item = Measured>,
{
    plan(items, caps).len()
}

/// Splits `items` into batches according to [`plan`].
pub fn pack<T, F>(items: Vec<T>, caps: Caps, measure: F) -> Vec<Vec<T>>
where
    F: Fn(&T) -> Measured,
{
    let ranges = plan(items.iter().map(&measure), caps);
    let mut remaining = items.into_iter();
    ranges
        .into_iter()
        .map(|range| remaining.by_ref().take(range.len()).collect())
        .collect()
}

/// File size on disk, or the byte cap when the size cannot be read so the
/// file is never under-counted.
pub fn file_size_or_cap(path: &Path, cap: u64) -> (u64, Option<std::io::Error>) {
    match std::fs::metadata(path) {
        Ok(meta) => (meta.len(), None),
        Err(e) => (cap, Some(e)),
    }
}

/// Whitespace-separated word count.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
