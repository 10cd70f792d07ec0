use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// 1-based pagination parameters, taken from the query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromForm)]
pub struct PaginationRequest {
    #[field(default = 1)]
    page: u32,
    #[field(name = "pageSize", default = DEFAULT_PAGE_SIZE)]
    page_size: u32,
}

impl PaginationRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Reject zero or oversized values.
    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(Error::Validation("page must be at least 1".to_string()));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Validation(format!(
                "pageSize must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }

    pub fn skip(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }

    /// Wrap a page of results. Any page past the end (other than the first) is `NotFound`.
    pub fn to_paginated<T>(self, total: u64, items: Vec<T>) -> Result<Paginated<T>> {
        if self.page > 1 && self.skip() >= total {
            return Err(Error::NotFound(format!("Page {}", self.page)));
        }
        Ok(Paginated {
            page: self.page,
            page_size: self.page_size,
            total,
            total_pages: total.div_ceil(self.limit()),
            items,
        })
    }
}

impl Default for PaginationRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// One page of results plus the information needed to fetch the others.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    use super::*;

    #[test]
    fn zero_and_oversized_values_are_invalid() {
        assert!(PaginationRequest::new(1, 10).validate().is_ok());
        assert_eq!(
            PaginationRequest::new(0, 10).validate().unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            PaginationRequest::new(1, 0).validate().unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            PaginationRequest::new(1, MAX_PAGE_SIZE + 1)
                .validate()
                .unwrap_err()
                .kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn pages_past_the_end_are_not_found() {
        let page = PaginationRequest::new(2, 5).to_paginated(12, vec![0; 5]).unwrap();
        assert_eq!(page.total_pages, 3);
        assert_eq!(PaginationRequest::new(3, 5).skip(), 10);

        let err = PaginationRequest::new(4, 5)
            .to_paginated::<u8>(12, vec![])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn first_page_of_nothing_is_empty() {
        let page = PaginationRequest::default()
            .to_paginated::<u8>(0, vec![])
            .unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
    }
}
