use std::num::NonZeroUsize;

use crate::Config;

/// One page of an ordered list of ids
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Page<T> {
    pub window: Vec<T>,
    pub total_pages: usize,
    /// Absolute index in the full list of the first element of `window`
    pub start: usize,
}

impl<T> Page<T> {
    /// Window elements along with their absolute index in the full list
    pub fn entries(&self) -> impl Iterator<Item = (usize, &T)> {
        self.window.iter().enumerate().map(|(i, t)| (self.start + i, t))
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// Slices page number `index` (0-based) out of `ids`
///
/// Out-of-range pages have an empty window. Must be recomputed whenever
/// `ids` changes.
pub fn page<T: Clone>(ids: &[T], size: NonZeroUsize, index: usize) -> Page<T> {
    let size = size.get();
    let total_pages = (ids.len() + size - 1) / size;
    let start = index.saturating_mul(size).min(ids.len());
    let end = start.saturating_add(size).min(ids.len());
    Page {
        window: ids[start..end].to_vec(),
        total_pages,
        start,
    }
}

/// Page selection, as carried by a `?page=N&posts=S` query string
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PageRequest {
    pub index: usize,
    pub size: NonZeroUsize,
}

impl PageRequest {
    /// Unparseable or missing parameters fall back to the first page and the configured size
    pub fn from_query(query: &str, config: &Config) -> PageRequest {
        let mut res = PageRequest {
            index: 0,
            size: config.posts_per_page,
        };
        for pair in query.trim_start_matches('?').split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "page" => match value.parse() {
                    Ok(index) => res.index = index,
                    Err(_) => tracing::debug!(?value, "ignoring invalid page index"),
                },
                "posts" => match value.parse() {
                    Ok(size) => res.size = size,
                    Err(_) => tracing::debug!(?value, "ignoring invalid page size"),
                },
                _ => (),
            }
        }
        res
    }

    pub fn to_query(&self) -> String {
        format!("?page={}&posts={}", self.index, self.size)
    }

    pub fn apply<T: Clone>(&self, ids: &[T]) -> Page<T> {
        page(ids, self.size, self.index)
    }

    /// Page holding the element at absolute position `position`
    pub fn containing(position: usize, size: NonZeroUsize) -> PageRequest {
        PageRequest {
            index: position / size.get(),
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn second_page_of_three_by_two() {
        let ids = vec!["p1", "p2", "p3"];
        let p = page(&ids, nz(2), 1);
        assert_eq!(p.window, vec!["p3"]);
        assert_eq!(p.total_pages, 2);
        assert_eq!(p.entries().collect::<Vec<_>>(), vec![(2, &"p3")]);
    }

    #[test]
    fn out_of_range_and_empty() {
        let ids = vec![1, 2, 3];
        let p = page(&ids, nz(2), 5);
        assert!(p.is_empty());
        assert_eq!(p.total_pages, 2);
        let p = page::<u8>(&[], nz(20), 0);
        assert!(p.is_empty());
        assert_eq!(p.total_pages, 0);
        assert!(page(&ids, nz(1), usize::MAX).is_empty());
    }

    #[test]
    fn pages_reconstruct_the_list() {
        bolero::check!()
            .with_type::<(Vec<u16>, u8)>()
            .cloned()
            .for_each(|(ids, size)| {
                let size = match NonZeroUsize::new(usize::from(size)) {
                    Some(size) => size,
                    None => return,
                };
                let first = page(&ids, size, 0);
                let expected_pages = (ids.len() as f64 / size.get() as f64).ceil() as usize;
                assert_eq!(first.total_pages, expected_pages);
                let mut rebuilt = Vec::with_capacity(ids.len());
                for i in 0..first.total_pages {
                    let p = page(&ids, size, i);
                    assert_eq!(p.start, i * size.get());
                    assert!(!p.is_empty() && p.window.len() <= size.get());
                    rebuilt.extend(p.window);
                }
                assert!(page(&ids, size, first.total_pages).is_empty());
                assert_eq!(rebuilt, ids);
            })
    }

    #[test]
    fn query_strings() {
        let config = Config::default();
        assert_eq!(
            PageRequest::from_query("?page=3&posts=10", &config),
            PageRequest { index: 3, size: nz(10) }
        );
        assert_eq!(
            PageRequest::from_query("", &config),
            PageRequest { index: 0, size: config.posts_per_page }
        );
        assert_eq!(
            PageRequest::from_query("?posts=0&page=x&foo", &config),
            PageRequest { index: 0, size: config.posts_per_page }
        );
        let r = PageRequest { index: 2, size: nz(5) };
        assert_eq!(PageRequest::from_query(&r.to_query(), &config), r);
        assert_eq!(PageRequest::containing(10, nz(5)).index, 2);
    }
}
