//! Review-by-id cache with in-flight fetch sharing.
//!
//! Each id maps to either a settled snapshot or a pending shared future.
//! Concurrent callers for the same id await one remote fetch. Failed fetches
//! are not cached.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use crate::error::{ApiError, ResolveError};
use crate::normalize::normalize_review;
use crate::types::{Review, ReviewRecord};

/// Remote endpoint returning a review record by id.
#[async_trait]
pub trait ReviewApi: Send + Sync {
    async fn fetch_review(&self, review_id: &str) -> Result<Option<ReviewRecord>, ApiError>;
}

#[derive(Debug, Clone)]
enum FetchFailure {
    NotFound,
    Invalid(String),
    Api(ApiError),
}

type PendingFetch = Shared<BoxFuture<'static, Result<Arc<Review>, FetchFailure>>>;

enum Entry {
    Settled(Arc<Review>),
    Pending(PendingFetch),
}

pub struct ReviewCache<A> {
    api: Arc<A>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl<A> ReviewCache<A>
where
    A: ReviewApi + 'static,
{
    pub fn new(api: Arc<A>) -> Self {
        Self { api, entries: Mutex::new(HashMap::new()) }
    }

    /// Returns the normalized review, fetching it at most once per id.
    ///
    /// # Errors
    ///
    /// [`ResolveError::ReviewNotFound`] when the API has no such review,
    /// [`ResolveError::InvalidReview`] when it cannot be normalized, or the
    /// API failure itself.
    pub async fn get_by_id(&self, review_id: &str) -> Result<Arc<Review>, ResolveError> {
        let pending = {
            let mut entries = self.entries.lock().await;
            match entries.get(review_id) {
                Some(Entry::Settled(review)) => return Ok(review.clone()),
                Some(Entry::Pending(fetch)) => fetch.clone(),
                None => {
                    let fetch = self.start_fetch(review_id);
                    entries.insert(review_id.to_owned(), Entry::Pending(fetch.clone()));
                    fetch
                }
            }
        };

        let result = pending.clone().await;

        let mut entries = self.entries.lock().await;
        let still_ours = matches!(
            entries.get(review_id),
            Some(Entry::Pending(fetch)) if fetch.ptr_eq(&pending)
        );
        match result {
            Ok(review) => {
                if still_ours {
                    entries.insert(review_id.to_owned(), Entry::Settled(review.clone()));
                }
                Ok(review)
            }
            Err(failure) => {
                if still_ours {
                    entries.remove(review_id);
                }
                Err(match failure {
                    FetchFailure::NotFound => ResolveError::ReviewNotFound { review_id: review_id.to_owned() },
                    FetchFailure::Invalid(reason) => {
                        ResolveError::InvalidReview { review_id: review_id.to_owned(), reason }
                    }
                    FetchFailure::Api(e) => ResolveError::Api(e),
                })
            }
        }
    }

    /// Drops the cached snapshot, e.g. after a push update amends the review.
    pub async fn invalidate(&self, review_id: &str) {
        self.entries.lock().await.remove(review_id);
    }

    fn start_fetch(&self, review_id: &str) -> PendingFetch {
        let api = self.api.clone();
        let review_id = review_id.to_owned();
        async move {
            tracing::debug!(%review_id, "fetching review");
            let record = api.fetch_review(&review_id).await.map_err(FetchFailure::Api)?;
            let record = record.ok_or(FetchFailure::NotFound)?;
            normalize_review(record).map(Arc::new).map_err(|e| match e {
                ResolveError::InvalidReview { reason, .. } => FetchFailure::Invalid(reason),
                other => FetchFailure::Invalid(other.to_string()),
            })
        }
        .boxed()
        .shared()
    }
}
