use crate::error::ShortenerError;
use serde::{Deserialize, Serialize};
use snip_core::{DeleteTask, SavedUrl, Stats, Storage, StorageError};
use snip_deleter::DeleteQueue;
use snip_generator::Generator;
use std::sync::Arc;
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

/// How many short ids are tried before giving up on a single request.
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, TypedBuilder)]
pub struct ShortenerSettings {
    /// Prefix of every redirect URL handed back to users, e.g. `http://localhost:8080`.
    #[builder(setter(into))]
    pub base_url: String,
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: usize,
}

/// Result of shortening a single URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortenOutcome {
    Created { short_id: String },
    /// The URL already had a live short id; nothing was written.
    Existing { short_id: String },
}

impl ShortenOutcome {
    pub fn short_id(&self) -> &str {
        match self {
            Self::Created { short_id } | Self::Existing { short_id } => short_id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

/// One entry of a batch shorten request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchShortened {
    pub correlation_id: String,
    pub short_url: String,
}

/// A user's URL as listed back to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserUrl {
    pub short_url: String,
    pub original_url: String,
}

/// Orchestrates storage, short-id generation and the delete queue.
///
/// Short ids come from a [`Generator`] that makes no uniqueness promise; a
/// taken id is regenerated up to `max_attempts` times.
pub struct ShortenerService<S: ?Sized, G> {
    storage: Arc<S>,
    generator: Arc<G>,
    deletes: DeleteQueue,
    settings: ShortenerSettings,
}

impl<S: ?Sized, G> Clone for ShortenerService<S, G> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            generator: Arc::clone(&self.generator),
            deletes: self.deletes.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: Storage + ?Sized, G: Generator> ShortenerService<S, G> {
    pub fn new(
        storage: Arc<S>,
        generator: G,
        deletes: DeleteQueue,
        settings: ShortenerSettings,
    ) -> Self {
        Self {
            storage,
            generator: Arc::new(generator),
            deletes,
            settings,
        }
    }

    /// Validates that the URL is non-empty and has an http(s) scheme and a host.
    fn validate_url(url: &str) -> Result<(), ShortenerError> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }

        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {url}"
            )));
        };
        if scheme.is_empty() || rest.is_empty() {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {url}"
            )));
        }

        let scheme = scheme.to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL scheme must be http or https: {scheme}"
            )));
        }

        Ok(())
    }

    fn attempts(&self) -> usize {
        self.settings.max_attempts.max(1)
    }

    /// Full redirect URL for a short id.
    pub fn short_url(&self, short_id: &str) -> String {
        format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            short_id
        )
    }

    /// Shortens one URL for `owner_id`.
    ///
    /// A URL that already has a live mapping is not an error: the existing
    /// short id is returned as [`ShortenOutcome::Existing`].
    pub async fn shorten(
        &self,
        original_url: &str,
        owner_id: &str,
    ) -> Result<ShortenOutcome, ShortenerError> {
        Self::validate_url(original_url)?;

        for attempt in 1..=self.attempts() {
            let url = SavedUrl::new(self.generator.generate(), original_url, owner_id);

            match self.storage.save(&url).await {
                Ok(()) => {
                    debug!(short_id = %url.short_id, owner_id, "shortened url");
                    return Ok(ShortenOutcome::Created {
                        short_id: url.short_id,
                    });
                }
                Err(StorageError::Conflict(short_id)) => {
                    debug!(%short_id, "url is already shortened");
                    return Ok(ShortenOutcome::Existing { short_id });
                }
                Err(StorageError::ShortIdTaken(short_id)) => {
                    debug!(%short_id, attempt, "short id taken, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(attempts = self.attempts(), "could not find a free short id");
        Err(ShortenerError::IdExhausted {
            attempts: self.attempts(),
        })
    }

    /// Shortens a batch of URLs for `owner_id`, all or nothing.
    ///
    /// Unlike [`shorten`](Self::shorten), a URL that is already shortened fails
    /// the whole batch with [`ShortenerError::UrlConflict`].
    pub async fn shorten_batch(
        &self,
        items: &[BatchItem],
        owner_id: &str,
    ) -> Result<Vec<BatchShortened>, ShortenerError> {
        for item in items {
            Self::validate_url(&item.original_url)?;
        }
        if items.is_empty() {
            return Ok(Vec::new());
        }

        for attempt in 1..=self.attempts() {
            let urls: Vec<SavedUrl> = items
                .iter()
                .map(|item| {
                    SavedUrl::new(self.generator.generate(), &item.original_url, owner_id)
                })
                .collect();

            match self.storage.save_array(&urls).await {
                Ok(()) => {
                    debug!(count = urls.len(), owner_id, "shortened url batch");
                    return Ok(items
                        .iter()
                        .zip(&urls)
                        .map(|(item, url)| BatchShortened {
                            correlation_id: item.correlation_id.clone(),
                            short_url: self.short_url(&url.short_id),
                        })
                        .collect());
                }
                Err(StorageError::ShortIdTaken(short_id)) => {
                    debug!(%short_id, attempt, "short id taken in batch, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(attempts = self.attempts(), "could not find free short ids for batch");
        Err(ShortenerError::IdExhausted {
            attempts: self.attempts(),
        })
    }

    /// Queues soft-deletion of `short_ids` on behalf of `owner_id`.
    ///
    /// Returns once every task is queued; the rows are flipped by the next
    /// delete flush. Ids the owner does not own are ignored at flush time.
    pub async fn delete_urls<I>(&self, owner_id: &str, short_ids: I) -> Result<(), ShortenerError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut queued = 0usize;
        for short_id in short_ids {
            self.deletes
                .enqueue(DeleteTask::new(owner_id, short_id))
                .await?;
            queued += 1;
        }
        debug!(owner_id, queued, "queued url deletions");
        Ok(())
    }

    /// Returns the stored row, tombstoned or not.
    pub async fn get_url(&self, short_id: &str) -> Result<SavedUrl, ShortenerError> {
        Ok(self.storage.get(short_id).await?)
    }

    /// Returns the redirect target for `short_id`.
    pub async fn resolve(&self, short_id: &str) -> Result<String, ShortenerError> {
        let url = self.storage.get(short_id).await?;
        if url.is_deleted {
            return Err(ShortenerError::Gone(url.short_id));
        }
        Ok(url.original_url)
    }

    /// Lists every URL `owner_id` has shortened, including deleted ones.
    ///
    /// An owner with no URLs is reported as [`ShortenerError::NotFound`].
    pub async fn get_user_urls(&self, owner_id: &str) -> Result<Vec<UserUrl>, ShortenerError> {
        let urls = self.storage.get_by_user(owner_id).await?;
        Ok(urls
            .into_iter()
            .map(|url| UserUrl {
                short_url: self.short_url(&url.short_id),
                original_url: url.original_url,
            })
            .collect())
    }

    pub async fn stats(&self) -> Result<Stats, ShortenerError> {
        Ok(self.storage.get_stats().await?)
    }

    pub async fn ping(&self) -> Result<(), ShortenerError> {
        Ok(self.storage.ping().await?)
    }

    pub async fn close(&self) -> Result<(), ShortenerError> {
        Ok(self.storage.close().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snip_deleter::{DeleteManager, DeleteSettings};
    use snip_generator::SeqGenerator;
    use snip_storage::MemoryStorage;
    use std::time::Duration;
    use tokio::sync::oneshot;

    struct Fixture {
        storage: Arc<MemoryStorage>,
        service: ShortenerService<MemoryStorage, SeqGenerator>,
        manager: DeleteManager<MemoryStorage>,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        storage.init().await.unwrap();

        let settings = DeleteSettings::builder()
            .flush_interval(Duration::from_millis(20))
            .build();
        let (manager, deletes) = DeleteManager::new(Arc::clone(&storage), settings);

        let service = ShortenerService::new(
            Arc::clone(&storage),
            SeqGenerator::with_prefix("wh"),
            deletes,
            ShortenerSettings::builder()
                .base_url("http://localhost:8080")
                .build(),
        );

        Fixture {
            storage,
            service,
            manager,
        }
    }

    fn batch_item(correlation_id: &str, original_url: &str) -> BatchItem {
        BatchItem {
            correlation_id: correlation_id.to_string(),
            original_url: original_url.to_string(),
        }
    }

    #[tokio::test]
    async fn shorten_creates_then_reports_existing() {
        let fixture = fixture().await;

        let first = fixture
            .service
            .shorten("https://a.example", "owner-x")
            .await
            .unwrap();
        let second = fixture
            .service
            .shorten("https://a.example", "owner-y")
            .await
            .unwrap();

        assert_eq!(
            first,
            ShortenOutcome::Created {
                short_id: "wh000000".to_string()
            }
        );
        assert_eq!(
            second,
            ShortenOutcome::Existing {
                short_id: "wh000000".to_string()
            }
        );
        assert!(!second.is_created());
        assert_eq!(fixture.service.stats().await.unwrap().urls, 1);
    }

    #[tokio::test]
    async fn shorten_rejects_invalid_urls() {
        let fixture = fixture().await;

        for url in ["", "not-a-url", "ftp://a.example", "://a.example", "https://"] {
            let err = fixture.service.shorten(url, "owner-x").await.unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidUrl(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn shorten_regenerates_taken_short_id() {
        let fixture = fixture().await;
        fixture
            .storage
            .save(&SavedUrl::new("wh000000", "https://taken.example", "owner-y"))
            .await
            .unwrap();

        let outcome = fixture
            .service
            .shorten("https://a.example", "owner-x")
            .await
            .unwrap();

        assert_eq!(outcome.short_id(), "wh000001");
    }

    #[tokio::test]
    async fn shorten_gives_up_after_max_attempts() {
        let fixture = fixture().await;
        for n in 0..DEFAULT_MAX_ATTEMPTS {
            fixture
                .storage
                .save(&SavedUrl::new(
                    format!("wh{n:06}"),
                    format!("https://{n}.example"),
                    "owner-y",
                ))
                .await
                .unwrap();
        }

        let err = fixture
            .service
            .shorten("https://a.example", "owner-x")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ShortenerError::IdExhausted {
                attempts: DEFAULT_MAX_ATTEMPTS
            }
        );
    }

    #[tokio::test]
    async fn shorten_batch_returns_redirect_urls_in_order() {
        let fixture = fixture().await;

        let shortened = fixture
            .service
            .shorten_batch(
                &[
                    batch_item("1", "https://a.example"),
                    batch_item("2", "https://b.example"),
                ],
                "owner-x",
            )
            .await
            .unwrap();

        assert_eq!(
            shortened,
            vec![
                BatchShortened {
                    correlation_id: "1".to_string(),
                    short_url: "http://localhost:8080/wh000000".to_string(),
                },
                BatchShortened {
                    correlation_id: "2".to_string(),
                    short_url: "http://localhost:8080/wh000001".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn shorten_batch_with_empty_url_writes_nothing() {
        let fixture = fixture().await;

        let err = fixture
            .service
            .shorten_batch(
                &[
                    batch_item("1", "https://a.example"),
                    batch_item("2", ""),
                ],
                "owner-x",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ShortenerError::InvalidUrl(_)));
        assert_eq!(fixture.service.stats().await.unwrap(), Stats::default());
    }

    #[tokio::test]
    async fn shorten_batch_conflict_fails_whole_batch() {
        let fixture = fixture().await;
        let existing = fixture
            .service
            .shorten("https://a.example", "owner-x")
            .await
            .unwrap();

        let err = fixture
            .service
            .shorten_batch(
                &[
                    batch_item("1", "https://b.example"),
                    batch_item("2", "https://a.example"),
                ],
                "owner-x",
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ShortenerError::UrlConflict(existing.short_id().to_string())
        );
        assert_eq!(fixture.service.stats().await.unwrap().urls, 1);
    }

    #[tokio::test]
    async fn user_urls_are_listed_as_redirect_urls() {
        let fixture = fixture().await;
        fixture
            .service
            .shorten("https://a.example", "owner-x")
            .await
            .unwrap();

        let urls = fixture.service.get_user_urls("owner-x").await.unwrap();

        assert_eq!(
            urls,
            vec![UserUrl {
                short_url: "http://localhost:8080/wh000000".to_string(),
                original_url: "https://a.example".to_string(),
            }]
        );
        assert_eq!(
            serde_json::to_value(&urls).unwrap(),
            serde_json::json!([{
                "short_url": "http://localhost:8080/wh000000",
                "original_url": "https://a.example",
            }])
        );
        assert!(matches!(
            fixture.service.get_user_urls("owner-z").await,
            Err(ShortenerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn resolve_missing_is_not_found() {
        let fixture = fixture().await;

        assert!(matches!(
            fixture.service.resolve("nope").await,
            Err(ShortenerError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleted_url_is_gone_after_flush() {
        let Fixture {
            storage,
            service,
            manager,
        } = fixture().await;
        let (stop, shutdown) = oneshot::channel::<()>();
        let handle = manager.start(async move {
            let _ = shutdown.await;
        });

        let created = service
            .shorten("https://a.example", "owner-x")
            .await
            .unwrap();
        let short_id = created.short_id().to_string();
        assert_eq!(
            service.shorten("https://a.example", "owner-x").await.unwrap(),
            ShortenOutcome::Existing {
                short_id: short_id.clone()
            }
        );

        service
            .delete_urls("owner-x", [short_id.clone()])
            .await
            .unwrap();

        awaitility::at_most(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(10))
            .until_async(|| async { storage.get(&short_id).await.unwrap().is_deleted })
            .await;

        assert_eq!(
            service.resolve(&short_id).await,
            Err(ShortenerError::Gone(short_id.clone()))
        );
        assert!(service.get_url(&short_id).await.unwrap().is_deleted);

        stop.send(()).unwrap();
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn delete_after_manager_stopped_is_rejected() {
        let Fixture {
            service, manager, ..
        } = fixture().await;
        manager.start(async {}).wait().await.unwrap();

        let err = service
            .delete_urls("owner-x", ["wh000000"])
            .await
            .unwrap_err();

        assert_eq!(err, ShortenerError::Queue(snip_deleter::DeleteError::Closed));
    }

    #[tokio::test]
    async fn base_url_trailing_slash_is_ignored() {
        let fixture = fixture().await;
        let service = ShortenerService::new(
            Arc::clone(&fixture.storage),
            SeqGenerator::with_prefix("wh"),
            fixture.service.deletes.clone(),
            ShortenerSettings::builder()
                .base_url("https://sn.ip/")
                .build(),
        );

        assert_eq!(service.short_url("abcde"), "https://sn.ip/abcde");
    }
}
