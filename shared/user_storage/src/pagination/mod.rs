//! Scan and query paginator
//!
//! Drives a continuation-token loop to exhaustion and flattens the pages
//! into one stream of rows, in the order the store returned them. Each page
//! request depends on the token of the previous page, so pages are always
//! fetched one after another.

use std::future::Future;

use futures::{stream, Stream, TryStreamExt};
use tracing::debug;

use crate::codec::Item;
use crate::store::{ContinuationToken, Page};

/// Position of a retrieval between two page requests
enum Cursor {
    Start,
    Continue(ContinuationToken),
    Exhausted,
}

/// Streams every row reachable through `fetch`
///
/// `fetch` is called with `None` for the first page and with the previous
/// page's token afterwards. The stream ends after the first page that comes
/// back without a token. An error from `fetch` is yielded once and ends the
/// stream.
pub fn paginate<F, Fut, E>(fetch: F) -> impl Stream<Item = Result<Item, E>>
where
    F: FnMut(Option<ContinuationToken>) -> Fut,
    Fut: Future<Output = Result<Page, E>>,
{
    stream::try_unfold(
        (Cursor::Start, fetch, 0_usize),
        |(cursor, mut fetch, pages)| async move {
            let token = match cursor {
                Cursor::Start => None,
                Cursor::Continue(token) => Some(token),
                Cursor::Exhausted => return Ok(None),
            };

            let Page { items, next_token } = fetch(token).await?;
            let pages = pages + 1;
            debug!(
                page = pages,
                rows = items.len(),
                more = next_token.is_some(),
                "Fetched page"
            );

            let next = match next_token {
                Some(token) => Cursor::Continue(token),
                None => Cursor::Exhausted,
            };

            Ok(Some((
                stream::iter(items.into_iter().map(Ok)),
                (next, fetch, pages),
            )))
        },
    )
    .try_flatten()
}
