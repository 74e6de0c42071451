//! Pagination by following `#next_link`.

use std::collections::VecDeque;

use scraper::Html;
use tracing::debug;

use storygraph_shared::Result;

use crate::markup::{child_elements, select_first};
use crate::session::Session;

/// A model built from the outer HTML of one element of a page.
pub trait FromFragment: Sized {
    /// Wrap `fragment`, keeping `session` for follow-up requests.
    fn from_fragment(session: Session, fragment: String) -> Self;
}

/// Items and next-page link extracted from one listing page.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Listing {
    /// Outer HTML of each item.
    pub items: Vec<String>,
    /// Href of `#next_link`, if any.
    pub next: Option<String>,
}

impl Listing {
    /// Split a listing page into its items and the next-page link.
    ///
    /// A page without the container element yields nothing and ends paging.
    pub fn extract(doc: &Html, container: &str) -> Result<Self> {
        let Some(root) = select_first(doc, &format!(".{container}"))? else {
            return Ok(Self::default());
        };

        let items = child_elements(root)
            .filter(|el| el.value().name() == "div")
            .map(|el| el.html())
            .collect();

        let next = select_first(doc, "#next_link")?
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string);

        Ok(Self { items, next })
    }
}

/// Lazily fetched, paginated listing of `T`.
pub struct Pager<T> {
    session: Session,
    container: String,
    query: Option<Vec<(String, String)>>,
    next: Option<String>,
    buffer: VecDeque<T>,
    pages_fetched: usize,
}

impl<T: FromFragment> Pager<T> {
    pub(crate) fn new(
        session: Session,
        path: &str,
        container: &str,
        query: Vec<(String, String)>,
    ) -> Self {
        Self {
            session,
            container: container.to_string(),
            query: Some(query),
            next: Some(path.to_string()),
            buffer: VecDeque::new(),
            pages_fetched: 0,
        }
    }

    /// Number of listing pages requested so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Next item, fetching further pages as needed. `None` once exhausted.
    pub async fn next_item(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            let Some(path) = self.next.take() else {
                return Ok(None);
            };
            self.fetch(&path).await?;
        }
    }

    /// Drain every remaining page.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next_item().await? {
            items.push(item);
        }
        Ok(items)
    }

    async fn fetch(&mut self, path: &str) -> Result<()> {
        let query = self.query.take().unwrap_or_default();
        let page = self.session.get_query(path, &query).await?;
        self.pages_fetched += 1;

        let listing = {
            let doc = self.session.parse(&page);
            Listing::extract(&doc, &self.container)?
        };

        debug!(
            url = %page.url,
            items = listing.items.len(),
            has_next = listing.next.is_some(),
            "fetched listing page"
        );

        self.next = listing.next;
        self.buffer.extend(
            listing
                .items
                .into_iter()
                .map(|fragment| T::from_fragment(self.session.clone(), fragment)),
        );
        Ok(())
    }
}
