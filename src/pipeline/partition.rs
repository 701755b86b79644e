//! Page partition planning for PDF splits.
//!
//! Validation order matters because each check names a different failure:
//!
//! 1. the split point must be a positive integer ([`SplitRequest::parse`]);
//! 2. the document must not exceed the page ceiling, checked before any
//!    partitioning is attempted;
//! 3. the split point must be strictly below the page count, otherwise the
//!    second part would be empty.
//!
//! Ranges are zero-based and half-open internally; part names use 1-based
//! page numbers.

use crate::error::ForgeError;
use serde::Serialize;
use std::ops::Range;

/// A contiguous, zero-based, half-open page interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRange {
    pub start: usize,
    pub end_exclusive: usize,
}

impl PageRange {
    pub fn new(start: usize, end_exclusive: usize) -> Self {
        Self {
            start,
            end_exclusive,
        }
    }

    pub fn len(&self) -> usize {
        self.end_exclusive.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end_exclusive).contains(&index)
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.end_exclusive
    }

    /// First page, 1-based.
    pub fn first_page(&self) -> usize {
        self.start + 1
    }

    /// Last page, 1-based.
    pub fn last_page(&self) -> usize {
        self.end_exclusive
    }
}

/// A validated split point: the last page (1-based) of the first part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SplitRequest {
    pub split_at_page: usize,
}

impl SplitRequest {
    /// Parse a raw split point. Non-numeric, zero, or negative input fails.
    pub fn parse(raw: &str) -> Result<Self, ForgeError> {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(n) if n > 0 => Ok(Self {
                split_at_page: n as usize,
            }),
            _ => Err(ForgeError::InvalidSplitPoint {
                reason: format!("'{trimmed}' is not a positive number"),
            }),
        }
    }
}

/// Two disjoint page ranges that together cover a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SplitPlan {
    pub total_pages: usize,
    pub split_at: usize,
    pub first: PageRange,
    pub second: PageRange,
}

impl SplitPlan {
    /// Archive entry name of the first part, e.g. `Part1_Pages_1-3.pdf`.
    pub fn first_name(&self) -> String {
        format!("Part1_Pages_1-{}.pdf", self.split_at)
    }

    /// Archive entry name of the second part, e.g. `Part2_Pages_4-10.pdf`.
    pub fn second_name(&self) -> String {
        format!(
            "Part2_Pages_{}-{}.pdf",
            self.split_at + 1,
            self.total_pages
        )
    }

    pub fn ranges(&self) -> [PageRange; 2] {
        [self.first, self.second]
    }
}

/// Validate a split against a document and compute its two ranges.
pub fn plan(
    total_pages: usize,
    request: &SplitRequest,
    max_pages: usize,
) -> Result<SplitPlan, ForgeError> {
    let split_at = request.split_at_page;
    if split_at == 0 {
        return Err(ForgeError::InvalidSplitPoint {
            reason: "split point must be a positive number".into(),
        });
    }
    if total_pages > max_pages {
        return Err(ForgeError::DocumentTooLarge {
            pages: total_pages,
            max: max_pages,
        });
    }
    if split_at >= total_pages {
        return Err(ForgeError::InvalidSplitPoint {
            reason: format!(
                "split point ({split_at}) cannot be greater than or equal to total pages ({total_pages})"
            ),
        });
    }

    Ok(SplitPlan {
        total_pages,
        split_at,
        first: PageRange::new(0, split_at),
        second: PageRange::new(split_at, total_pages),
    })
}
