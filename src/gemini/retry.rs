//! Retry orchestration with key rotation and pacing.
//!
//! Wraps a text or audio generation call in an explicit bounded loop:
//! select a credential, call, and on a retryable failure exclude the
//! credential, wait, and try again with a different one. A confirmed auth
//! failure additionally marks the credential INVALID in the external store
//! so no later request selects it.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{TtsStudioConfig, PACING_BASE_MS, PACING_MAX_MS};
use crate::error::{Result, TtsStudioError};
use crate::keys::store::KeyStore;
use crate::keys::KeyPool;

/// Bounds for one logical request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Wait between attempts
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TtsStudioConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::config::MAX_RETRIES,
            retry_delay: Duration::from_millis(crate::config::RETRY_DELAY_MS),
        }
    }
}

/// Pacing delay inserted between consecutive chunk calls (not retries).
///
/// Scales with the total text length: longer texts mean more chunks and a
/// bigger rate-limit budget to protect, so they pace more conservatively.
pub fn inter_chunk_delay(total_chars: usize) -> Duration {
    let scaled = PACING_BASE_MS + (total_chars as u64 / 1_000) * 300;
    Duration::from_millis(scaled.min(PACING_MAX_MS))
}

/// Sleep that aborts early with [`TtsStudioError::Cancelled`] when the
/// caller cancels the request.
pub async fn wait_or_cancel(cancel: &CancellationToken, delay: Duration) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(TtsStudioError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Run `op` with bounded retries and key rotation.
///
/// Each attempt gets a credential from the pool, excluding every
/// credential that already failed in this sequence, so no key is tried
/// twice. Non-retryable failures and exhausted retries surface the
/// classified error to the caller.
pub async fn run_with_retry<T, F, Fut>(
    pool: &mut KeyPool,
    store: &dyn KeyStore,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut excluded: HashSet<String> = HashSet::new();
    let mut retries_left = policy.max_retries;

    loop {
        if cancel.is_cancelled() {
            return Err(TtsStudioError::Cancelled);
        }

        let key = pool.select(&excluded).ok_or(TtsStudioError::NoApiKey)?;

        match op(key.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if err.invalidates_key() {
                    pool.mark_invalid(&key);
                    if let Err(store_err) = store.mark_key_invalid(&key).await {
                        log::warn!("failed to persist INVALID key status: {store_err}");
                    }
                }

                if !err.is_retryable() || retries_left == 0 {
                    return Err(err);
                }

                excluded.insert(key);
                retries_left -= 1;
                log::warn!(
                    "retryable failure ({}), rotating key, {} retries left",
                    err,
                    retries_left
                );
                wait_or_cancel(cancel, policy.retry_delay).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::store::MemoryKeyStore;
    use crate::keys::{KeyStatus, ManagedKey};
    use std::sync::{Arc, Mutex};

    fn shared_key(id: &str, secret: &str) -> ManagedKey {
        ManagedKey {
            id: id.to_string(),
            name: id.to_string(),
            key: secret.to_string(),
            status: KeyStatus::Valid,
            usage_count: 0,
            is_trial_key: false,
            allowed_user_ids: Vec::new(),
        }
    }

    fn dedicated_key(id: &str, secret: &str, user: &str) -> ManagedKey {
        ManagedKey {
            allowed_user_ids: vec![user.to_string()],
            ..shared_key(id, secret)
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            retry_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_never_reuses_a_failed_key() {
        let keys = vec![
            shared_key("a", "sk-a"),
            shared_key("b", "sk-b"),
            shared_key("c", "sk-c"),
        ];
        let store = MemoryKeyStore::new(keys.clone());
        let mut pool = KeyPool::new(keys, None, String::new());
        let cancel = CancellationToken::new();

        let attempts: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let attempts_in_op = attempts.clone();

        // First two distinct keys fail authentication, the third succeeds.
        let result = run_with_retry(&mut pool, &store, &fast_policy(2), &cancel, |key| {
            let attempts = attempts_in_op.clone();
            async move {
                let mut seen = attempts.lock().unwrap();
                seen.push(key.clone());
                if seen.len() < 3 {
                    Err(TtsStudioError::AuthFailure("401".into()))
                } else {
                    Ok(format!("ok with {key}"))
                }
            }
        })
        .await;

        assert!(result.is_ok());
        let seen = attempts.lock().unwrap();
        assert_eq!(seen.len(), 3);
        let distinct: std::collections::HashSet<&String> = seen.iter().collect();
        assert_eq!(distinct.len(), 3, "a failed key was selected twice: {seen:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_marks_only_the_failing_key_invalid() {
        // Dedicated key is always tried first, so the failing key is known.
        let keys = vec![
            dedicated_key("mine", "sk-first", "user-1"),
            shared_key("shared", "sk-second"),
        ];
        let store = MemoryKeyStore::new(keys.clone());
        let mut pool = KeyPool::new(keys, Some("user-1".to_string()), String::new());
        let cancel = CancellationToken::new();

        let result = run_with_retry(&mut pool, &store, &fast_policy(3), &cancel, |key| async move {
            if key == "sk-first" {
                Err(TtsStudioError::AuthFailure("API key not valid".into()))
            } else {
                Ok(key)
            }
        })
        .await;

        assert_eq!(result.unwrap(), "sk-second");
        assert_eq!(store.status_of("sk-first"), Some(KeyStatus::Invalid));
        assert_eq!(store.status_of("sk-second"), Some(KeyStatus::Valid));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_rotates_but_never_invalidates() {
        let keys = vec![
            dedicated_key("mine", "sk-first", "user-1"),
            shared_key("shared", "sk-second"),
        ];
        let store = MemoryKeyStore::new(keys.clone());
        let mut pool = KeyPool::new(keys, Some("user-1".to_string()), String::new());
        let cancel = CancellationToken::new();

        let result = run_with_retry(&mut pool, &store, &fast_policy(3), &cancel, |key| async move {
            if key == "sk-first" {
                Err(TtsStudioError::RateLimited("429 quota".into()))
            } else {
                Ok(key)
            }
        })
        .await;

        assert_eq!(result.unwrap(), "sk-second");
        assert_eq!(store.status_of("sk-first"), Some(KeyStatus::Valid));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_fails_immediately() {
        let keys = vec![shared_key("a", "sk-a"), shared_key("b", "sk-b")];
        let store = MemoryKeyStore::new(keys.clone());
        let mut pool = KeyPool::new(keys, None, String::new());
        let cancel = CancellationToken::new();

        let attempts = Arc::new(Mutex::new(0u32));
        let attempts_in_op = attempts.clone();

        let result: Result<()> =
            run_with_retry(&mut pool, &store, &fast_policy(3), &cancel, |_key| {
                let attempts = attempts_in_op.clone();
                async move {
                    *attempts.lock().unwrap() += 1;
                    Err(TtsStudioError::ContentBlocked("SAFETY".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(TtsStudioError::ContentBlocked(_))));
        assert_eq!(*attempts.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_the_last_error() {
        let keys = vec![
            shared_key("a", "sk-a"),
            shared_key("b", "sk-b"),
            shared_key("c", "sk-c"),
            shared_key("d", "sk-d"),
        ];
        let store = MemoryKeyStore::new(keys.clone());
        let mut pool = KeyPool::new(keys, None, String::new());
        let cancel = CancellationToken::new();

        let attempts = Arc::new(Mutex::new(0u32));
        let attempts_in_op = attempts.clone();

        let result: Result<()> =
            run_with_retry(&mut pool, &store, &fast_policy(2), &cancel, |_key| {
                let attempts = attempts_in_op.clone();
                async move {
                    *attempts.lock().unwrap() += 1;
                    Err(TtsStudioError::ServerBusy("503".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(TtsStudioError::ServerBusy(_))));
        // One initial attempt plus two retries.
        assert_eq!(*attempts.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_empty_pool_is_a_fatal_precondition() {
        let store = MemoryKeyStore::new(Vec::new());
        let mut pool = KeyPool::new(Vec::new(), None, String::new());
        let cancel = CancellationToken::new();

        let result: Result<()> =
            run_with_retry(&mut pool, &store, &fast_policy(3), &cancel, |_key| async {
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(TtsStudioError::NoApiKey)));
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_dispatch() {
        let keys = vec![shared_key("a", "sk-a")];
        let store = MemoryKeyStore::new(keys.clone());
        let mut pool = KeyPool::new(keys, None, String::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<()> =
            run_with_retry(&mut pool, &store, &fast_policy(3), &cancel, |_key| async {
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(TtsStudioError::Cancelled)));
    }

    #[test]
    fn test_inter_chunk_delay_scales_and_caps() {
        assert_eq!(inter_chunk_delay(500), Duration::from_millis(1_200));
        assert_eq!(inter_chunk_delay(5_000), Duration::from_millis(2_700));
        assert_eq!(inter_chunk_delay(50_000), Duration::from_millis(3_000));
        assert!(inter_chunk_delay(10) <= inter_chunk_delay(100_000));
    }
}
