//! Subdomain expansion
//!
//! Walks a host from its full form to its last label, so rules anchored to a
//! parent domain are found for every subdomain beneath it.
//!
//! # Examples
//!
//! ```
//! use fdb_core::domain::expand_subdomains;
//!
//! assert_eq!(
//!     expand_subdomains("a.b.example.com"),
//!     vec!["a.b.example.com", "b.example.com", "example.com", "com"],
//! );
//! ```

/// Get the parent domain (strip leftmost label).
///
/// Returns `None` once no separator remains. The input is not validated, so
/// a trailing dot yields an empty parent.
#[inline]
pub fn get_parent_domain(host: &str) -> Option<&str> {
    host.find('.').map(|idx| &host[idx + 1..])
}

/// Iterator for suffix-walking a host from most to least specific.
#[derive(Debug, Clone)]
pub struct SubdomainIter<'a> {
    current: Option<&'a str>,
}

impl<'a> SubdomainIter<'a> {
    pub fn new(host: &'a str) -> Self {
        Self { current: Some(host) }
    }
}

impl<'a> Iterator for SubdomainIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = get_parent_domain(result);
        Some(result)
    }
}

impl std::iter::FusedIterator for SubdomainIter<'_> {}

/// Walk host suffixes from most specific to least specific.
#[inline]
pub fn walk_subdomains(host: &str) -> SubdomainIter<'_> {
    SubdomainIter::new(host)
}

/// Collect the host and all of its parent-domain suffixes, in order.
pub fn expand_subdomains(host: &str) -> Vec<&str> {
    walk_subdomains(host).collect()
}
