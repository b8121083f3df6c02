use serde::{Deserialize, Serialize};

/// A cached view paired with its tip-relative confirmation count.
///
/// The inner view never stores confirmations; they are attached when the view is served so
/// that a cached entry never goes stale on tip advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmed<T> {
    /// The immutable view.
    #[serde(flatten)]
    pub view: T,
    /// Confirmations relative to the tip the view was served against.
    pub confirmations: u32,
}

impl<T> Confirmed<T> {
    /// Pairs `view` with `confirmations`.
    pub const fn new(view: T, confirmations: u32) -> Self {
        Self { view, confirmations }
    }
}
