//! Heap setting precedence
//!
//! Pools every spelling of a heap setting found in a blob and picks the
//! physically rightmost one, which is how the JVM itself treats repeated
//! arguments. Percentage-of-RAM settings are then reconciled against the
//! absolute sizes.

use super::flags::{scan_occurrences, EquivalenceClass, FlagSpelling, SourceSignal};
use super::size::parse_size;

/// Sentinel stored in a heap byte field when a percentage setting governs it
pub const PERCENTAGE_SENTINEL: f64 = -1.0;

/// Where the text being resolved came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Environment options joined with the process command line
    CommandLine,
    /// Output of a live `VM.flags` dump
    LiveDump,
}

impl SourceKind {
    /// Spellings recognized for this source.
    ///
    /// A live dump reports `MinHeapSize` as the shrink floor next to the real
    /// `InitialHeapSize`, so it is only an initial-heap spelling on the
    /// command line.
    fn spellings(self) -> &'static [FlagSpelling] {
        use EquivalenceClass::*;

        const COMMAND_LINE: &[FlagSpelling] = &[
            FlagSpelling::new(MaxHeap, "-Xmx"),
            FlagSpelling::new(MaxHeap, "-XX:MaxHeapSize="),
            FlagSpelling::new(InitialHeap, "-Xms"),
            FlagSpelling::new(InitialHeap, "-XX:MinHeapSize="),
            FlagSpelling::new(InitialHeap, "-XX:InitialHeapSize="),
            FlagSpelling::new(MaxRamPercentage, "-XX:MaxRAMPercentage="),
            FlagSpelling::new(InitialRamPercentage, "-XX:InitialRAMPercentage="),
            FlagSpelling::new(MinRamPercentage, "-XX:MinRAMPercentage="),
        ];
        const LIVE_DUMP: &[FlagSpelling] = &[
            FlagSpelling::new(MaxHeap, "-Xmx"),
            FlagSpelling::new(MaxHeap, "-XX:MaxHeapSize="),
            FlagSpelling::new(InitialHeap, "-Xms"),
            FlagSpelling::new(InitialHeap, "-XX:InitialHeapSize="),
            FlagSpelling::new(MaxRamPercentage, "-XX:MaxRAMPercentage="),
            FlagSpelling::new(InitialRamPercentage, "-XX:InitialRAMPercentage="),
            FlagSpelling::new(MinRamPercentage, "-XX:MinRAMPercentage="),
        ];

        match self {
            SourceKind::CommandLine => COMMAND_LINE,
            SourceKind::LiveDump => LIVE_DUMP,
        }
    }
}

/// Heap facet being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapKind {
    Max,
    Initial,
}

/// Resolved value of one heap kind
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeapResolution {
    /// Bytes, [`PERCENTAGE_SENTINEL`] or 0 when unset
    pub bytes: f64,
    /// Rightmost percentage for this kind, 0 when unset
    pub percentage: f64,
}

impl HeapResolution {
    pub fn has_signal(&self) -> bool {
        self.bytes != 0.0 || self.percentage > 0.0
    }
}

/// All heap-related settings resolved from one blob
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeapSettings {
    pub max: HeapResolution,
    pub initial: HeapResolution,
    pub min_percentage: f64,
}

/// A size or percentage occurrence that parsed successfully
#[derive(Debug, Clone, Copy)]
struct Candidate {
    value: f64,
    offset: usize,
}

/// Resolve heap settings from a single concatenated blob
pub fn resolve_heap_settings(blob: &str, source: SourceKind) -> HeapSettings {
    let signals = scan_occurrences(blob, source.spellings());

    HeapSettings {
        max: resolve_kind(&signals, HeapKind::Max),
        initial: resolve_kind(&signals, HeapKind::Initial),
        min_percentage: rightmost(percentages(&signals, EquivalenceClass::MinRamPercentage))
            .map_or(0.0, |c| c.value),
    }
}

fn resolve_kind(signals: &[SourceSignal], kind: HeapKind) -> HeapResolution {
    let (size_class, percentage_class) = match kind {
        HeapKind::Max => (EquivalenceClass::MaxHeap, EquivalenceClass::MaxRamPercentage),
        HeapKind::Initial => (
            EquivalenceClass::InitialHeap,
            EquivalenceClass::InitialRamPercentage,
        ),
    };

    let sizes = sizes(signals, size_class);
    let percentage = rightmost(percentages(signals, percentage_class));
    let size = sizes.last().copied();

    let bytes = match (size, percentage) {
        (None, None) => 0.0,
        (None, Some(_)) => PERCENTAGE_SENTINEL,
        (Some(size), None) => size.value,
        (Some(size), Some(pct)) => {
            if trailing_percentage_overrides(kind, &sizes, pct) {
                PERCENTAGE_SENTINEL
            } else {
                size.value
            }
        }
    };

    HeapResolution {
        bytes,
        percentage: percentage.map_or(0.0, |c| c.value),
    }
}

/// A percentage written after several conflicting absolute max-heap sizes
/// supersedes all of them. Initial heap has no such override.
fn trailing_percentage_overrides(kind: HeapKind, sizes: &[Candidate], pct: Candidate) -> bool {
    kind == HeapKind::Max && sizes.len() > 1 && sizes.iter().all(|s| pct.offset > s.offset)
}

/// Valid absolute sizes for a class, in offset order. Malformed literals drop out.
fn sizes(signals: &[SourceSignal], class: EquivalenceClass) -> Vec<Candidate> {
    signals
        .iter()
        .filter(|s| s.class == class)
        .filter_map(|s| {
            parse_size(&s.value).ok().map(|value| Candidate {
                value,
                offset: s.offset,
            })
        })
        .collect()
}

fn percentages(
    signals: &[SourceSignal],
    class: EquivalenceClass,
) -> impl Iterator<Item = Candidate> + '_ {
    signals
        .iter()
        .filter(move |s| s.class == class)
        .filter_map(|s| {
            parse_percentage(&s.value).map(|value| Candidate {
                value,
                offset: s.offset,
            })
        })
}

fn rightmost(candidates: impl Iterator<Item = Candidate>) -> Option<Candidate> {
    candidates.max_by_key(|c| c.offset)
}

/// Percentages are plain decimals; a zero value carries no setting
fn parse_percentage(value: &str) -> Option<f64> {
    let mut parts = value.splitn(2, '.');
    let whole = parts.next()?;
    let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    let well_formed = digits(whole) && parts.next().map_or(true, digits);

    if !well_formed {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;

    fn resolve(blob: &str) -> HeapSettings {
        resolve_heap_settings(blob, SourceKind::CommandLine)
    }

    #[test]
    fn test_rightmost_spelling_wins_for_max_heap() {
        assert_eq!(resolve("java -Xmx1g -XX:MaxHeapSize=4g MyApp").max.bytes, 4.0 * GIB);
        assert_eq!(resolve("java -XX:MaxHeapSize=4g -Xmx1g MyApp").max.bytes, GIB);
    }

    #[test]
    fn test_rightmost_spelling_wins_for_initial_heap() {
        assert_eq!(
            resolve("java -Xms512m -XX:MinHeapSize=2g MyApp").initial.bytes,
            2.0 * GIB
        );
        assert_eq!(
            resolve("java -XX:MinHeapSize=512m -Xms2g MyApp").initial.bytes,
            2.0 * GIB
        );
        assert_eq!(
            resolve("java -XX:InitialHeapSize=256m -Xms1g -XX:InitialHeapSize=64m").initial.bytes,
            64.0 * MIB
        );
    }

    #[test]
    fn test_mixed_spellings_complex_precedence() {
        let settings =
            resolve("java -Xmx1g -XX:MaxHeapSize=2g -Xms256m -XX:MinHeapSize=512m -Xmx4g -XX:MinHeapSize=1g MyApp");
        assert_eq!(settings.max.bytes, 4.0 * GIB);
        assert_eq!(settings.initial.bytes, GIB);
    }

    #[test]
    fn test_percentage_only_sets_sentinel() {
        let settings =
            resolve("java -XX:InitialRAMPercentage=25.0 -XX:MaxRAMPercentage=75.0 -jar app.jar");
        assert_eq!(settings.max.bytes, PERCENTAGE_SENTINEL);
        assert_eq!(settings.max.percentage, 75.0);
        assert_eq!(settings.initial.bytes, PERCENTAGE_SENTINEL);
        assert_eq!(settings.initial.percentage, 25.0);
    }

    #[test]
    fn test_absolute_size_beats_single_percentage() {
        let settings =
            resolve("java -Xms1g -Xmx4g -XX:InitialRAMPercentage=25.0 -XX:MaxRAMPercentage=50");
        assert_eq!(settings.max.bytes, 4.0 * GIB);
        assert_eq!(settings.max.percentage, 50.0);
        assert_eq!(settings.initial.bytes, GIB);
        assert_eq!(settings.initial.percentage, 25.0);
    }

    #[test]
    fn test_trailing_percentage_overrides_repeated_max_sizes() {
        let settings = resolve(
            "java -Xmx1g -Xms256m -Xmx2g -Xms512m -XX:MaxRAMPercentage=50.0 -XX:MaxRAMPercentage=75.0 MyApp",
        );
        assert_eq!(settings.max.bytes, PERCENTAGE_SENTINEL);
        assert_eq!(settings.max.percentage, 75.0);
        // Initial heap has no override, absolute wins
        assert_eq!(settings.initial.bytes, 512.0 * MIB);
    }

    #[test]
    fn test_percentage_between_repeated_sizes_does_not_override() {
        let settings = resolve("java -Xmx1g -XX:MaxRAMPercentage=50.0 -Xmx2g");
        assert_eq!(settings.max.bytes, 2.0 * GIB);
        assert_eq!(settings.max.percentage, 50.0);
    }

    #[test]
    fn test_initial_heap_never_overridden_by_trailing_percentage() {
        let settings = resolve("java -Xms1g -Xms2g -XX:InitialRAMPercentage=30");
        assert_eq!(settings.initial.bytes, 2.0 * GIB);
        assert_eq!(settings.initial.percentage, 30.0);
    }

    #[test]
    fn test_malformed_rightmost_size_falls_back_to_previous() {
        let settings = resolve("java -Xmx2g -Xmx4t -XX:MaxHeapSize=lots");
        assert_eq!(settings.max.bytes, 2.0 * GIB);
    }

    #[test]
    fn test_min_ram_percentage_is_informational() {
        let settings =
            resolve("java -XX:MinRAMPercentage=10.0 -XX:InitialRAMPercentage=20.0 -XX:MaxRAMPercentage=60.0");
        assert_eq!(settings.min_percentage, 10.0);
        assert_eq!(settings.max.percentage, 60.0);
        assert_eq!(settings.initial.percentage, 20.0);
    }

    #[test]
    fn test_live_dump_ignores_min_heap_size() {
        let dump = "-XX:InitialHeapSize=268435456 -XX:MaxHeapSize=1073741824 -XX:MinHeapSize=8388608";
        let settings = resolve_heap_settings(dump, SourceKind::LiveDump);
        assert_eq!(settings.initial.bytes, 268435456.0);
        assert_eq!(settings.max.bytes, 1073741824.0);
    }

    #[test]
    fn test_no_signal() {
        let settings = resolve("java -XX:+UseG1GC MyApp");
        assert!(!settings.max.has_signal());
        assert!(!settings.initial.has_signal());
        assert_eq!(settings, HeapSettings::default());
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_percentage("66.67"), Some(66.67));
        assert_eq!(parse_percentage("75"), Some(75.0));
        assert_eq!(parse_percentage("0"), None);
        assert_eq!(parse_percentage("abc"), None);
        assert_eq!(parse_percentage("7.5.1"), None);
        assert_eq!(parse_percentage(""), None);
    }
}
