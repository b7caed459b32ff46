use crate::clock::Clock;
use crate::retry::{RetryPolicy, with_retry};
use crate::source::MessageSource;
use tokio::sync::mpsc;

/// Largest page the Gmail API will return.
pub const MAX_PAGE_SIZE: u32 = 500;

/// What to enumerate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    /// Zero or negative means no limit.
    pub limit: i64,
    /// Resume from this page; empty starts at the first page.
    pub page_token: String,
}

impl SearchRequest {
    fn remaining(&self, emitted: usize) -> Option<usize> {
        usize::try_from(self.limit)
            .ok()
            .filter(|&limit| limit > 0)
            .map(|limit| limit.saturating_sub(emitted))
    }

    fn page_size(&self, emitted: usize) -> u32 {
        match self.remaining(emitted) {
            Some(left) => u32::try_from(left).unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE),
            None => MAX_PAGE_SIZE,
        }
    }
}

/// Pages through the search results and sends every message id on `ids`.
///
/// Stops at the last page, once `limit` ids have been sent, when the
/// receiver goes away, or on a list error (after retries). A list error
/// truncates the run; it is logged, not returned. `ids` is dropped on
/// return, which closes the channel. Returns the number of ids sent.
pub async fn search(
    source: &dyn MessageSource,
    clock: &dyn Clock,
    policy: &RetryPolicy,
    request: &SearchRequest,
    ids: mpsc::Sender<String>,
) -> usize {
    let mut page_token = request.page_token.clone();
    let mut emitted = 0;
    let mut pages = 0;

    loop {
        let page_size = request.page_size(emitted);
        let page = match with_retry(clock, policy, "list", || {
            source.list(&request.query, page_size, &page_token)
        })
        .await
        {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    pages,
                    emitted,
                    "Unable to list messages, stopping search"
                );
                break;
            }
        };
        pages += 1;

        tracing::debug!(
            page = pages,
            ids = page.ids.len(),
            estimate = page.result_size_estimate,
            "Listed messages"
        );

        for id in page.ids {
            if request.remaining(emitted) == Some(0) {
                break;
            }
            if ids.send(id).await.is_err() {
                tracing::warn!(emitted, "Id receiver dropped, stopping search");
                return emitted;
            }
            emitted += 1;
        }

        if request.remaining(emitted) == Some(0) || page.next_page_token.is_empty() {
            break;
        }
        page_token = page.next_page_token;
    }

    tracing::info!(emitted, pages, "Search finished");
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::error::SourceError;
    use crate::models::Label;
    use crate::source::{ListPage, RawMessage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves `total` ids in pages of `page_len`, failing on page `fail_at`.
    struct Pages {
        total: usize,
        page_len: usize,
        fail_at: Option<usize>,
        calls: Mutex<Vec<(u32, String)>>,
    }

    impl Pages {
        fn new(total: usize, page_len: usize) -> Self {
            Self {
                total,
                page_len,
                fail_at: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(u32, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageSource for Pages {
        async fn list(
            &self,
            _query: &str,
            page_size: u32,
            page_token: &str,
        ) -> Result<ListPage, SourceError> {
            let page = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((page_size, page_token.to_string()));
                calls.len() - 1
            };
            if self.fail_at == Some(page) {
                return Err(SourceError::with_status(500, "Backend Error"));
            }
            let start: usize = if page_token.is_empty() {
                0
            } else {
                page_token.parse().unwrap()
            };
            let end = (start + self.page_len).min(self.total);
            Ok(ListPage {
                ids: (start..end).map(|i| format!("id-{i}")).collect(),
                next_page_token: if end < self.total {
                    end.to_string()
                } else {
                    String::new()
                },
                result_size_estimate: self.total as u32,
            })
        }

        async fn get(&self, id: &str) -> Result<RawMessage, SourceError> {
            Err(SourceError::new(None, format!("unexpected get {id}")))
        }

        async fn list_labels(&self) -> Result<Vec<Label>, SourceError> {
            Ok(Vec::new())
        }
    }

    async fn run(source: &Pages, request: SearchRequest) -> (usize, Vec<String>) {
        let clock = FakeClock::default();
        let policy = RetryPolicy::default();
        let (tx, mut rx) = mpsc::channel(1);
        let collect = async {
            let mut seen = Vec::new();
            while let Some(id) = rx.recv().await {
                seen.push(id);
            }
            seen
        };
        let (emitted, seen) = tokio::join!(
            search(source, &clock, &policy, &request, tx),
            collect
        );
        (emitted, seen)
    }

    fn request(limit: i64) -> SearchRequest {
        SearchRequest {
            query: "after: 2018/11/01".to_string(),
            limit,
            page_token: String::new(),
        }
    }

    #[tokio::test]
    async fn limit_reached_on_page_boundary_skips_next_page() {
        let source = Pages::new(9, 3);
        let (emitted, seen) = run(&source, request(6)).await;
        assert_eq!(emitted, 6);
        assert_eq!(seen.len(), 6);
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn limit_inside_a_page_truncates_it() {
        let source = Pages::new(9, 3);
        let (emitted, seen) = run(&source, request(4)).await;
        assert_eq!(emitted, 4);
        assert_eq!(seen, vec!["id-0", "id-1", "id-2", "id-3"]);
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn non_positive_limit_reads_every_page() {
        for limit in [0, -1] {
            let source = Pages::new(7, 3);
            let (emitted, _) = run(&source, request(limit)).await;
            assert_eq!(emitted, 7);
            assert_eq!(source.calls().len(), 3);
        }
    }

    #[tokio::test]
    async fn page_size_shrinks_to_remaining_limit() {
        let source = Pages::new(1000, 500);
        let (emitted, _) = run(&source, request(600)).await;
        assert_eq!(emitted, 600);
        assert_eq!(
            source.calls(),
            vec![(500, String::new()), (100, "500".to_string())]
        );
    }

    #[tokio::test]
    async fn list_error_truncates_silently() {
        let mut source = Pages::new(9, 3);
        source.fail_at = Some(1);
        let (emitted, seen) = run(&source, request(0)).await;
        assert_eq!(emitted, 3);
        assert_eq!(seen, vec!["id-0", "id-1", "id-2"]);
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn resumes_from_caller_page_token() {
        let source = Pages::new(9, 3);
        let mut req = request(0);
        req.page_token = "6".to_string();
        let (_, seen) = run(&source, req).await;
        assert_eq!(seen, vec!["id-6", "id-7", "id-8"]);
        assert_eq!(source.calls()[0].1, "6");
    }
}
