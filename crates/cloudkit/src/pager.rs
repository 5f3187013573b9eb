//! Lazy pagination over marker-based list calls.

use crate::error::{Error, Result};
use std::collections::VecDeque;

/// One page of a list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Marker of the next page, `None` on the last page
    pub marker: Option<String>,
}

impl<T> Page<T> {
    /// The final page.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            marker: None,
        }
    }
}

/// Iterator that fetches pages on demand.
///
/// Pages are requested only when the buffered items run out. Iteration ends
/// after the page without a marker, or after the first error. A marker that
/// does not advance is reported as an error instead of looping forever.
/// [`Pager::restart`] starts over from the first page.
pub struct Pager<T, F> {
    fetch: F,
    buffer: VecDeque<T>,
    marker: Option<String>,
    done: bool,
    pages: usize,
}

impl<T, F> Pager<T, F>
where
    F: FnMut(Option<&str>) -> Result<Page<T>>,
{
    /// Create a pager around a list call taking the previous page's marker.
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            buffer: VecDeque::new(),
            marker: None,
            done: false,
            pages: 0,
        }
    }

    /// Forget all progress and start again from the first page.
    pub fn restart(&mut self) {
        self.buffer.clear();
        self.marker = None;
        self.done = false;
        self.pages = 0;
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Drain every remaining page.
    pub fn collect_all(self) -> Result<Vec<T>> {
        self.collect()
    }

    fn fetch_next(&mut self) -> Result<()> {
        let page = (self.fetch)(self.marker.as_deref())?;
        self.pages += 1;
        self.buffer.extend(page.items);

        match page.marker {
            Some(next) if self.marker.as_deref() == Some(next.as_str()) => {
                return Err(Error::Other(format!("pagination marker {next} did not advance")));
            }
            Some(next) => self.marker = Some(next),
            None => self.done = true,
        }
        Ok(())
    }
}

impl<T, F> Iterator for Pager<T, F>
where
    F: FnMut(Option<&str>) -> Result<Page<T>>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_next() {
                self.done = true;
                self.buffer.clear();
                return Some(Err(e));
            }
        }
    }
}

/// Serve a slice as marker-based pages of `size` items.
///
/// The marker is the offset of the next page. Used by in-memory clients.
pub fn paginate<T: Clone>(items: &[T], marker: Option<&str>, size: usize) -> Result<Page<T>> {
    let start = match marker {
        Some(m) => m
            .parse::<usize>()
            .map_err(|_| Error::Invalid {
                message: format!("bad pagination marker {m:?}"),
            })?,
        None => 0,
    };
    let size = size.max(1);
    let end = (start + size).min(items.len());
    let page = items.get(start..end).unwrap_or_default().to_vec();
    let marker = (end < items.len()).then(|| end.to_string());
    Ok(Page {
        items: page,
        marker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_pages_fetched_lazily() {
        let items: Vec<u32> = (0..5).collect();
        let calls = Cell::new(0);
        let mut pager = Pager::new(|marker| {
            calls.set(calls.get() + 1);
            paginate(&items, marker, 2)
        });

        assert_eq!(calls.get(), 0);
        assert_eq!(pager.next().unwrap().unwrap(), 0);
        assert_eq!(pager.next().unwrap().unwrap(), 1);
        assert_eq!(calls.get(), 1);
        assert_eq!(pager.next().unwrap().unwrap(), 2);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_collect_all_and_restart() {
        let items: Vec<u32> = (0..5).collect();
        let mut pager = Pager::new(|marker| paginate(&items, marker, 2));

        let all: Vec<u32> = pager.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(all, items);
        assert_eq!(pager.pages_fetched(), 3);
        assert!(pager.next().is_none());

        pager.restart();
        assert_eq!(pager.collect_all().unwrap(), items);
    }

    #[test]
    fn test_error_ends_iteration() {
        let mut pager = Pager::new(|marker: Option<&str>| match marker {
            None => Ok(Page {
                items: vec![1],
                marker: Some("1".into()),
            }),
            Some(_) => Err(Error::Throttled {
                message: "slow down".into(),
            }),
        });

        assert_eq!(pager.next().unwrap().unwrap(), 1);
        assert!(pager.next().unwrap().is_err());
        assert!(pager.next().is_none());
    }

    #[test]
    fn test_stuck_marker_is_an_error() {
        let pager = Pager::new(|_marker: Option<&str>| {
            Ok(Page {
                items: vec![1],
                marker: Some("same".into()),
            })
        });

        let err = pager.collect_all().unwrap_err();
        assert!(err.to_string().contains("did not advance"));
    }

    #[test]
    fn test_empty_listing() {
        let items: Vec<u32> = Vec::new();
        let pager = Pager::new(|marker| paginate(&items, marker, 10));
        assert!(pager.collect_all().unwrap().is_empty());
    }
}
