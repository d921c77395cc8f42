//! Resolver counters.
//!
//! Counters go through the `metrics` facade; without an installed recorder
//! they are no-ops.

use metrics::{counter, describe_counter};

use crate::domain::{IdKind, LookupStatus};

/// Lookups by operation and outcome.
pub const LOOKUPS_TOTAL: &str = "cloudid_lookups_total";

/// Identifiers written back to the directory.
pub const ALLOCATIONS_TOTAL: &str = "cloudid_allocations_total";

/// Allocations that found no free identifier.
pub const ALLOCATION_EXHAUSTED_TOTAL: &str = "cloudid_allocation_exhausted_total";

/// Provisioning attempts stopped by the process-table guard.
pub const PROVISIONING_GUARD_HITS_TOTAL: &str = "cloudid_provisioning_guard_hits_total";

/// Register counter descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(LOOKUPS_TOTAL, "Identity lookups by operation and status");
    describe_counter!(ALLOCATIONS_TOTAL, "Identifiers allocated and persisted");
    describe_counter!(
        ALLOCATION_EXHAUSTED_TOTAL,
        "Allocations failed because the range was full"
    );
    describe_counter!(
        PROVISIONING_GUARD_HITS_TOTAL,
        "Local provisioning skipped because the tool was already running"
    );
}

/// Record a finished facade lookup.
pub fn record_lookup(op: &'static str, status: LookupStatus) {
    counter!(LOOKUPS_TOTAL, "op" => op, "status" => status.as_str()).increment(1);
}

/// Record a persisted identifier.
pub fn record_allocation(kind: IdKind) {
    counter!(ALLOCATIONS_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Record an exhausted range.
pub fn record_exhausted(kind: IdKind) {
    counter!(ALLOCATION_EXHAUSTED_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Record a provisioning guard hit.
pub fn record_guard_hit() {
    counter!(PROVISIONING_GUARD_HITS_TOTAL).increment(1);
}
