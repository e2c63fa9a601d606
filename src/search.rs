// Paginated search over the proxy API.
//
// `search` returns a lazy stream: a page is only requested once the listings
// of the previous page have been consumed. The stream ends on the first empty
// page, or after the page limit, whichever comes first. The first error ends
// it as well.

use std::collections::VecDeque;
use std::time::Duration;

use futures::{Stream, TryStreamExt, stream};
use serde_json::{Map, Value};
use tokio::time::sleep;

use crate::config::Settings;
use crate::error::{KslError, Result};
use crate::filters::{FilterField, FilterSet};
use crate::gateway::{ProxyApi, SEARCH_ENDPOINT};
use crate::listing::{DEFAULT_LISTING_BASE_URL, VehicleListing};

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// First page to request (the proxy counts from 1).
    pub page: u32,
    /// Last page to request. Defaults to the first page; `None` runs until
    /// an empty page.
    pub pages_limit: Option<u32>,
    /// Pause before each request after the first.
    pub sleep_time: Duration,
    pub listing_base_url: String,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            page: 1,
            pages_limit: Some(1),
            sleep_time: Duration::from_secs(1),
            listing_base_url: DEFAULT_LISTING_BASE_URL.to_string(),
        }
    }
}

impl SearchOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            sleep_time: settings.sleep_time(),
            listing_base_url: settings.listing_base_url.clone(),
            ..Self::default()
        }
    }

    /// Requests exactly one page.
    pub fn single_page(mut self, page: u32) -> Self {
        self.page = page;
        self.pages_limit = Some(page);
        self
    }

    pub fn pages_limit(mut self, limit: u32) -> Self {
        self.pages_limit = Some(limit);
        self
    }

    /// Keeps requesting pages until the proxy returns an empty one.
    pub fn until_exhausted(mut self) -> Self {
        self.pages_limit = None;
        self
    }
}

struct PageCursor<'a, A: ?Sized> {
    api: &'a A,
    filters: Vec<String>,
    page: u32,
    options: SearchOptions,
    buffered: VecDeque<VehicleListing>,
    requested: bool,
    done: bool,
}

impl<'a, A: ProxyApi + ?Sized> PageCursor<'a, A> {
    async fn next_listing(mut self) -> Result<Option<(VehicleListing, Self)>> {
        loop {
            if let Some(listing) = self.buffered.pop_front() {
                return Ok(Some((listing, self)));
            }
            if self.done {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> Result<()> {
        if self.requested && !self.options.sleep_time.is_zero() {
            sleep(self.options.sleep_time).await;
        }
        self.requested = true;

        let mut body = vec!["page".to_string(), self.page.to_string()];
        body.extend(self.filters.iter().cloned());

        tracing::debug!(page = self.page, "Fetching search page");
        let data = self.api.post(SEARCH_ENDPOINT, Some(body)).await?;
        let items = page_items(data)?;

        if items.is_empty() {
            tracing::debug!(page = self.page, "Empty page, search exhausted");
            self.done = true;
            return Ok(());
        }

        // Normalize the whole page first so a bad record fails the page.
        let listings = items
            .iter()
            .map(|item| VehicleListing::from_raw(item, &self.options.listing_base_url))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(page = self.page, num_results = listings.len(), "Page normalized");
        self.buffered.extend(listings);

        match self.options.pages_limit {
            Some(limit) if self.page >= limit => {
                tracing::debug!(page = self.page, limit, "Page limit reached");
                self.done = true;
            }
            _ => self.page += 1,
        }
        Ok(())
    }
}

fn page_items(data: Value) -> Result<Vec<Map<String, Value>>> {
    let items = match data {
        Value::Object(mut map) => map.remove("items"),
        _ => None,
    };
    let Some(Value::Array(items)) = items else {
        return Err(KslError::MalformedResponse(
            "search reply has no 'items' array".into(),
        ));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(KslError::MalformedResponse(format!(
                "search item is not an object: {}",
                other
            ))),
        })
        .collect()
}

/// Starts a search and returns the lazy stream of listings.
///
/// Fails before any request is made when there is neither a keyword nor a
/// filter. Listings come back in the order the proxy returns them.
pub fn search<'a, A>(
    api: &'a A,
    keyword: Option<&str>,
    filters: &FilterSet,
    options: SearchOptions,
) -> Result<impl Stream<Item = Result<VehicleListing>> + Send + use<'a, A>>
where
    A: ProxyApi + ?Sized,
{
    let mut filters = filters.clone();
    if let Some(keyword) = keyword.map(str::trim).filter(|k| !k.is_empty()) {
        filters.set(FilterField::Keyword, keyword)?;
    }
    if filters.is_empty() {
        return Err(KslError::EmptyQuery);
    }

    tracing::info!(
        page = options.page,
        pages_limit = ?options.pages_limit,
        filters = ?filters.to_list(),
        "Starting search"
    );

    let cursor = PageCursor {
        api,
        filters: filters.to_list(),
        page: options.page,
        options,
        buffered: VecDeque::new(),
        requested: false,
        done: false,
    };
    Ok(stream::try_unfold(cursor, PageCursor::next_listing))
}

/// Runs a search to completion and collects every listing.
pub async fn search_all<A>(
    api: &A,
    keyword: Option<&str>,
    filters: &FilterSet,
    options: SearchOptions,
) -> Result<Vec<VehicleListing>>
where
    A: ProxyApi + ?Sized,
{
    search(api, keyword, filters, options)?.try_collect().await
}
