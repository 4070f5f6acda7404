//! Counters exported through the `metrics` facade.
//!
//! Install any `metrics` recorder to collect them; without one every call is
//! a no-op.

use metrics::{counter, describe_counter};

pub const STAGES_STARTED: &str = "flowweld_stages_started_total";
pub const STAGES_FAILED: &str = "flowweld_stages_failed_total";
pub const ELEMENTS_EMITTED: &str = "flowweld_elements_emitted_total";

/// Register descriptions for every counter with the installed recorder
pub fn describe() {
    describe_counter!(STAGES_STARTED, "Stage tasks spawned by a materializer");
    describe_counter!(STAGES_FAILED, "Stage tasks that ended with an unhandled failure");
    describe_counter!(ELEMENTS_EMITTED, "Elements delivered to a downstream subscriber");
}

pub(crate) fn stage_started() {
    counter!(STAGES_STARTED).increment(1);
}

pub(crate) fn stage_failed() {
    counter!(STAGES_FAILED).increment(1);
}

pub(crate) fn element_emitted() {
    counter!(ELEMENTS_EMITTED).increment(1);
}
