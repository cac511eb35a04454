// ============================
// crates/backend-lib/src/join_code.rs
// ============================
//! Join code generation and uniqueness-checked issuance.
//!
//! A join code is a short run of decimal digits that points at a room for a
//! few seconds. Codes are reserved with an atomic set-if-not-exists, so two
//! rooms can never hold the same code at once.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use rand::Rng;

use crate::config::Settings;
use crate::error::AppError;
use crate::metrics::{JOIN_CODE_COLLISIONS, JOIN_CODE_FAILED, JOIN_CODE_ISSUED};
use crate::store::RoomStore;

/// Default number of digits in a join code
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Generate `length` uniformly random decimal digits; leading zeros allowed.
pub fn generate_join_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Source of candidate codes
pub trait CodeSource: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

/// Candidates drawn from the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeSource;

impl CodeSource for RandomCodeSource {
    fn generate(&self, length: usize) -> String {
        generate_join_code(length)
    }
}

/// Issues codes for rooms, retrying on collisions within a fixed budget
#[derive(Clone)]
pub struct JoinCodeIssuer {
    store: Arc<dyn RoomStore>,
    source: Arc<dyn CodeSource>,
    length: usize,
    max_attempts: u32,
    code_ttl: Duration,
}

impl JoinCodeIssuer {
    pub fn new(
        store: Arc<dyn RoomStore>,
        source: Arc<dyn CodeSource>,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            source,
            length: settings.join_code_length,
            max_attempts: settings.max_code_attempts,
            code_ttl: settings.code_ttl(),
        }
    }

    pub fn code_length(&self) -> usize {
        self.length
    }

    /// Reserve a fresh code for `room_id`.
    ///
    /// A taken code or a timed-out store call uses up one attempt. Any other
    /// store failure aborts the cycle immediately.
    pub async fn issue(&self, room_id: &str) -> Result<String, AppError> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.source.generate(self.length);
            match self
                .store
                .reserve_code(&candidate, room_id, self.code_ttl)
                .await
            {
                Ok(true) => {
                    counter!(JOIN_CODE_ISSUED).increment(1);
                    tracing::debug!(room_id, attempt, "Reserved join code");
                    return Ok(candidate);
                },
                Ok(false) => {
                    counter!(JOIN_CODE_COLLISIONS).increment(1);
                    tracing::debug!(room_id, attempt, "Join code collision");
                },
                Err(AppError::StoreTimeout(ms)) => {
                    tracing::warn!(room_id, attempt, timeout_ms = ms, "Join code reservation timed out");
                },
                Err(e) => {
                    counter!(JOIN_CODE_FAILED).increment(1);
                    return Err(e);
                },
            }
        }

        counter!(JOIN_CODE_FAILED).increment(1);
        tracing::warn!(room_id, attempts = self.max_attempts, "Join code search exhausted");
        Err(AppError::CodeGenerationFailed {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::tests::StalledStore;
    use crate::store::{MemoryStore, TimeoutStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Always draws the same code, counting draws
    pub(crate) struct FixedCodeSource {
        pub code: String,
        pub draws: AtomicU32,
    }

    impl FixedCodeSource {
        pub fn new(code: &str) -> Self {
            Self {
                code: code.to_string(),
                draws: AtomicU32::new(0),
            }
        }
    }

    impl CodeSource for FixedCodeSource {
        fn generate(&self, _length: usize) -> String {
            self.draws.fetch_add(1, Ordering::SeqCst);
            self.code.clone()
        }
    }

    /// Replays a script of codes, then repeats the last one
    pub(crate) struct ScriptedCodeSource(Mutex<Vec<String>>);

    impl ScriptedCodeSource {
        pub fn new(codes: &[&str]) -> Self {
            let mut codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
            codes.reverse();
            Self(Mutex::new(codes))
        }
    }

    impl CodeSource for ScriptedCodeSource {
        fn generate(&self, _length: usize) -> String {
            let mut codes = self.0.lock().unwrap();
            if codes.len() > 1 {
                codes.pop().unwrap()
            } else {
                codes.last().cloned().unwrap_or_default()
            }
        }
    }

    #[test]
    fn test_generated_codes_are_digits_of_requested_length() {
        for length in [4, 6, 9] {
            let code = generate_join_code(length);
            assert_eq!(code.len(), length);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_generated_codes_cover_leading_zeros() {
        let saw_leading_zero = (0..2000).any(|_| generate_join_code(2).starts_with('0'));
        assert!(saw_leading_zero);
    }

    #[tokio::test]
    async fn test_issue_reserves_code_for_room() {
        let store = Arc::new(MemoryStore::new());
        let issuer = JoinCodeIssuer::new(
            store.clone(),
            Arc::new(RandomCodeSource),
            &Settings::default(),
        );

        let code = issuer.issue("r1").await.unwrap();
        assert_eq!(code.len(), DEFAULT_CODE_LENGTH);
        assert_eq!(store.resolve_code(&code).await.unwrap().as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_issue_skips_reserved_codes() {
        let store = Arc::new(MemoryStore::new());
        let ttl = Duration::from_secs(10);
        store.reserve_code("111111", "other", ttl).await.unwrap();
        store.reserve_code("222222", "other", ttl).await.unwrap();

        let source = Arc::new(ScriptedCodeSource::new(&["111111", "222222", "333333"]));
        let issuer = JoinCodeIssuer::new(store.clone(), source, &Settings::default());

        assert_eq!(issuer.issue("r1").await.unwrap(), "333333");
        assert_eq!(
            store.resolve_code("111111").await.unwrap().as_deref(),
            Some("other")
        );
    }

    #[tokio::test]
    async fn test_issue_fails_after_exactly_max_attempts() {
        let store = Arc::new(MemoryStore::new());
        store
            .reserve_code("111111", "other", Duration::from_secs(10))
            .await
            .unwrap();

        let source = Arc::new(FixedCodeSource::new("111111"));
        let issuer = JoinCodeIssuer::new(store.clone(), source.clone(), &Settings::default());

        let err = issuer.issue("r1").await.unwrap_err();
        assert!(matches!(err, AppError::CodeGenerationFailed { attempts: 10 }));
        assert_eq!(source.draws.load(Ordering::SeqCst), 10);
        // The colliding mapping is untouched
        assert_eq!(
            store.resolve_code("111111").await.unwrap().as_deref(),
            Some("other")
        );
    }

    /// Refuses every reservation as if the store were unreachable
    struct UnreachableStore;

    #[async_trait]
    impl RoomStore for UnreachableStore {
        async fn add_member(&self, _: &str, _: &str, _: Duration) -> Result<(), AppError> {
            Err(AppError::StoreUnavailable("connection refused".to_string()))
        }
        async fn join_member(&self, _: &str, _: &str) -> Result<bool, AppError> {
            Err(AppError::StoreUnavailable("connection refused".to_string()))
        }
        async fn remove_member(&self, _: &str, _: &str) -> Result<bool, AppError> {
            Err(AppError::StoreUnavailable("connection refused".to_string()))
        }
        async fn room_exists(&self, _: &str) -> Result<bool, AppError> {
            Err(AppError::StoreUnavailable("connection refused".to_string()))
        }
        async fn reserve_code(&self, _: &str, _: &str, _: Duration) -> Result<bool, AppError> {
            Err(AppError::StoreUnavailable("connection refused".to_string()))
        }
        async fn resolve_code(&self, _: &str) -> Result<Option<String>, AppError> {
            Err(AppError::StoreUnavailable("connection refused".to_string()))
        }
        async fn ping(&self) -> Result<(), AppError> {
            Err(AppError::StoreUnavailable("connection refused".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_reservations_use_up_the_budget() {
        let settings = Settings::default();
        let store = Arc::new(TimeoutStore::new(
            Arc::new(StalledStore),
            settings.store_timeout(),
        ));
        let source = Arc::new(FixedCodeSource::new("123456"));
        let issuer = JoinCodeIssuer::new(store, source.clone(), &settings);

        let started = tokio::time::Instant::now();
        let err = issuer.issue("r1").await.unwrap_err();
        assert!(matches!(err, AppError::CodeGenerationFailed { attempts: 10 }));
        assert_eq!(source.draws.load(Ordering::SeqCst), 10);
        assert_eq!(started.elapsed(), settings.store_timeout() * 10);
    }

    #[tokio::test]
    async fn test_unreachable_store_aborts_after_one_draw() {
        let source = Arc::new(FixedCodeSource::new("123456"));
        let issuer = JoinCodeIssuer::new(
            Arc::new(UnreachableStore),
            source.clone(),
            &Settings::default(),
        );

        let err = issuer.issue("r1").await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
        assert_eq!(source.draws.load(Ordering::SeqCst), 1);
    }
}
