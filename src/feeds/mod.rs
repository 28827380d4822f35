pub mod activity;
pub mod catalog;
pub mod gql;
pub mod open_interest;

use crate::config::PageLimits;

/// Offset pagination state shared by the activity and open-interest loops.
/// Stops on a short page or once `max_rows` rows have been scanned.
#[derive(Debug)]
pub struct Pager {
    limits: PageLimits,
    scanned: usize,
    done: bool,
}

impl Pager {
    pub fn new(limits: PageLimits) -> Self {
        Self { limits, scanned: 0, done: limits.page_size == 0 || limits.max_rows == 0 }
    }

    /// `(first, skip)` for the next request, or None when the loop is finished.
    pub fn next_request(&self) -> Option<(usize, usize)> {
        if self.done || self.scanned >= self.limits.max_rows {
            return None;
        }
        let first = self.limits.page_size.min(self.limits.max_rows - self.scanned);
        Some((first, self.scanned))
    }

    pub fn record_page(&mut self, requested: usize, received: usize) {
        self.scanned += received;
        if received < requested {
            self.done = true;
        }
    }

    pub fn stop(&mut self) {
        self.done = true;
    }

    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// True when the loop ended because of the row cap rather than a short page.
    pub fn hit_cap(&self) -> bool {
        self.scanned >= self.limits.max_rows
    }
}
