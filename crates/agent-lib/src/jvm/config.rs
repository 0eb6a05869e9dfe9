//! Canonical JVM configuration record

use super::gc::GcType;
use super::precedence::{HeapResolution, HeapSettings, PERCENTAGE_SENTINEL};
use super::vendor::JvmVendor;
use serde::{Deserialize, Serialize};

/// Resolved heap and collector configuration of one JVM.
///
/// Heap byte fields use `0` for "unset" and `-1` for "governed by the
/// matching percentage field".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JvmConfiguration {
    pub max_heap_bytes: f64,
    pub initial_heap_bytes: f64,
    pub max_heap_percentage: f64,
    pub initial_heap_percentage: f64,
    /// `MinRAMPercentage`, reported but never applied to the byte fields
    pub min_heap_percentage: f64,
    pub gc_type: GcType,
    pub vendor: JvmVendor,
    /// Every `-XX:` token in source order, duplicates included
    pub raw_extra_flags: Vec<String>,
}

/// Typed view over one heap kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeapSetting {
    Unset,
    /// Percentage of available RAM
    Percentage(f64),
    Bytes(f64),
}

impl JvmConfiguration {
    pub fn max_heap(&self) -> HeapSetting {
        heap_setting(self.max_heap_bytes, self.max_heap_percentage)
    }

    pub fn initial_heap(&self) -> HeapSetting {
        heap_setting(self.initial_heap_bytes, self.initial_heap_percentage)
    }

    /// True when either heap kind carries an absolute size or a percentage
    pub fn has_heap_signal(&self) -> bool {
        self.max_heap() != HeapSetting::Unset || self.initial_heap() != HeapSetting::Unset
    }

    pub(crate) fn apply_heap_settings(&mut self, heap: &HeapSettings) {
        let HeapResolution { bytes, percentage } = heap.max;
        self.max_heap_bytes = bytes;
        self.max_heap_percentage = percentage;

        let HeapResolution { bytes, percentage } = heap.initial;
        self.initial_heap_bytes = bytes;
        self.initial_heap_percentage = percentage;

        self.min_heap_percentage = heap.min_percentage;
    }

    /// Fill every unset field from `fallback`, never overwriting a set one.
    pub fn fill_unset_from(&mut self, fallback: &JvmConfiguration) {
        fill_f64(&mut self.max_heap_bytes, fallback.max_heap_bytes);
        fill_f64(&mut self.initial_heap_bytes, fallback.initial_heap_bytes);
        fill_f64(&mut self.max_heap_percentage, fallback.max_heap_percentage);
        fill_f64(&mut self.initial_heap_percentage, fallback.initial_heap_percentage);
        fill_f64(&mut self.min_heap_percentage, fallback.min_heap_percentage);

        if self.gc_type.is_unknown() && !fallback.gc_type.is_unknown() {
            self.gc_type = fallback.gc_type;
        } else if self.gc_type == GcType::Unknown {
            self.gc_type = fallback.gc_type;
        }

        if self.vendor == JvmVendor::Unknown {
            self.vendor = fallback.vendor;
        }
        if self.raw_extra_flags.is_empty() {
            self.raw_extra_flags = fallback.raw_extra_flags.clone();
        }
    }
}

fn heap_setting(bytes: f64, percentage: f64) -> HeapSetting {
    if bytes == PERCENTAGE_SENTINEL {
        HeapSetting::Percentage(percentage)
    } else if bytes > 0.0 {
        HeapSetting::Bytes(bytes)
    } else {
        HeapSetting::Unset
    }
}

fn fill_f64(field: &mut f64, fallback: f64) {
    if *field == 0.0 {
        *field = fallback;
    }
}
