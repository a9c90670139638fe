//! Pagination parameters.

use serde::{Deserialize, Serialize};

/// Largest page a list endpoint will return.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Pagination parameters shared across list endpoints.
///
/// - `page`: ≥ 1, default 1
/// - `page_size`: 1–100, default 20 (0 means "use the default")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl PageRequest {
    /// Apply defaults for zero values and cap `page_size` at [`MAX_PAGE_SIZE`].
    pub fn clamped(self) -> Self {
        let page_size = match self.page_size {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        Self {
            page: self.page.max(1),
            page_size,
        }
    }

    /// Row offset of the first item on this page. Call on a clamped request.
    pub fn offset(self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}
