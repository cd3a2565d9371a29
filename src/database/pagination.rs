//! Pagination helper for list queries. Normalizes caller-supplied page and
//! limit, runs the page query and the total count concurrently, and reports
//! whether more rows remain.

use futures::future::try_join;
use std::future::Future;

/// Upper bound on page size regardless of what the caller asks for.
pub const MAX_PAGE_LIMIT: i64 = 100;

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub has_more: bool,
}

/// Execute a paginated query.
///
/// `page` is normalized to at least 1 and `limit` is clamped to
/// `1..=MAX_PAGE_LIMIT`; `query_fn` receives the normalized `(limit, offset)`
/// pair. The page query and count query run concurrently.
pub async fn paginated_query<T, E, QF, QFut, CF, CFut>(
    query_fn: QF,
    count_fn: CF,
    page: i64,
    limit: i64,
) -> Result<Page<T>, E>
where
    QF: FnOnce(i64, i64) -> QFut,
    QFut: Future<Output = Result<Vec<T>, E>>,
    CF: FnOnce() -> CFut,
    CFut: Future<Output = Result<i64, E>>,
{
    let page = page.max(1);
    let limit = limit.clamp(1, MAX_PAGE_LIMIT);
    let offset = (page - 1) * limit;

    let (items, total) = try_join(query_fn(limit, offset), count_fn()).await?;
    let has_more = (offset + items.len() as i64) < total;

    Ok(Page {
        items,
        page,
        limit,
        total,
        has_more,
    })
}
