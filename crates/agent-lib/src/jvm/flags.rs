//! Flag extraction from concatenated argument text
//!
//! The resolver never looks at argv as a list. Every source (environment
//! options, command line, live flag dump) is folded into one text blob and
//! scanned here, so that the byte offset of each occurrence can later decide
//! which of several conflicting settings is authoritative.

use regex::Regex;
use std::sync::OnceLock;

/// A logical JVM setting that may be spelled several ways
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EquivalenceClass {
    /// `-Xmx`, `-XX:MaxHeapSize=`
    MaxHeap,
    /// `-Xms`, `-XX:InitialHeapSize=`, `-XX:MinHeapSize=`
    InitialHeap,
    MaxRamPercentage,
    InitialRamPercentage,
    MinRamPercentage,
}

/// One accepted spelling of a setting: the literal prefix that precedes the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagSpelling {
    pub class: EquivalenceClass,
    pub prefix: &'static str,
}

impl FlagSpelling {
    pub const fn new(class: EquivalenceClass, prefix: &'static str) -> Self {
        Self { class, prefix }
    }
}

/// A single recognized flag occurrence inside a blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSignal {
    /// The whole token as written, e.g. `-XX:MaxHeapSize=4g`
    pub origin_text: String,
    pub class: EquivalenceClass,
    /// Text after the spelling prefix, up to the next whitespace
    pub value: String,
    /// Byte offset of the token's first character in the blob
    pub offset: usize,
}

/// Find every occurrence of the given spellings, ordered left to right.
///
/// A spelling only matches at the start of the blob or right after
/// whitespace, so `--Xmx2g` or `foo-Xmx2g` are never picked up. Matching is
/// case-sensitive (`-XMS` is not `-Xms`).
pub fn scan_occurrences(blob: &str, spellings: &[FlagSpelling]) -> Vec<SourceSignal> {
    let mut signals = Vec::new();

    for spelling in spellings {
        for (offset, _) in blob.match_indices(spelling.prefix) {
            if !at_token_start(blob, offset) {
                continue;
            }

            let value_start = offset + spelling.prefix.len();
            let value_end = token_end(blob, value_start);

            signals.push(SourceSignal {
                origin_text: blob[offset..value_end].to_string(),
                class: spelling.class,
                value: blob[value_start..value_end].to_string(),
                offset,
            });
        }
    }

    signals.sort_by_key(|s| s.offset);
    signals
}

/// Extract all `-XX:` tokens in order, keeping duplicates and original spelling.
///
/// The grammar is deliberately loose: a `-XX:` prefix, an optional `+`/`-`,
/// a name starting with a letter and an optional `=value`. Tokens such as
/// `-XX:+UseG1GC=1` are kept verbatim.
pub fn extract_xx_flags(blob: &str) -> Vec<String> {
    xx_flag_regex()
        .captures_iter(blob)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Value of the last `<prefix><value>` token in the blob, if any
pub fn last_value<'a>(blob: &'a str, prefix: &str) -> Option<&'a str> {
    blob.match_indices(prefix)
        .filter(|(offset, _)| at_token_start(blob, *offset))
        .last()
        .map(|(offset, _)| {
            let start = offset + prefix.len();
            &blob[start..token_end(blob, start)]
        })
}

fn xx_flag_regex() -> &'static Regex {
    static XX_FLAG: OnceLock<Regex> = OnceLock::new();
    XX_FLAG.get_or_init(|| {
        Regex::new(r"(?:^|\s)(-XX:[+-]?[A-Za-z][A-Za-z0-9]*(?:=\S+)?)")
            .expect("-XX: flag pattern is valid")
    })
}

fn at_token_start(blob: &str, offset: usize) -> bool {
    blob[..offset]
        .chars()
        .next_back()
        .map_or(true, char::is_whitespace)
}

fn token_end(blob: &str, from: usize) -> usize {
    blob[from..]
        .find(char::is_whitespace)
        .map_or(blob.len(), |len| from + len)
}
