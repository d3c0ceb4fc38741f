//! Resilient page primitives.
//!
//! Each primitive carries its own bounded retry budget and absorbs transient
//! failures. `wait_for` reports success as a boolean and `capture` returns
//! the file it wrote; neither errors. Frame acquisition fails with a
//! diagnostic once its budget is spent.

pub mod capture;
pub mod diagnose;
pub mod frame;
pub mod policy;
pub mod wait;

pub use capture::{capture, CaptureTarget};
pub use diagnose::{DiagnosticReport, Diagnostics, PageSnapshot};
pub use frame::get_frame;
pub use policy::{CaptureOptions, FallbackAction, FrameOptions, RetryPolicy, WaitOptions};
pub use wait::{wait_for, wait_for_required};
