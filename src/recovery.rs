//! Recovery policy for nonce validation failures
//!
//! Two tiers:
//! - `MissedNonce`: the endpoint that served the gap is quarantined and the
//!   chain keeps running on the next selectable endpoint.
//! - `DuplicatedNonce`: the whole chain is paused until an operator resumes it,
//!   since a duplicate is visible from every endpoint.
//!
//! Both send a best-effort alert first. A failed alert never prevents the
//! quarantine or the pause.

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::clients::ErrorNotifier;
use crate::metrics::Metrics;
use crate::nonce::NonceValidation;
use crate::providers::ChainProviders;
use crate::scanner::ScanController;
use crate::types::ChainId;

/// Outcome of processing one event, handed to [`RecoveryPolicy::handle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    Success,
    Error {
        status: NonceValidation,
        submission_id: Option<String>,
        nonce: Option<u64>,
    },
}

impl ProcessResult {
    /// Build the result for a classified event
    pub fn from_validation(status: NonceValidation, submission_id: &str, nonce: u64) -> Self {
        match status {
            NonceValidation::Success => ProcessResult::Success,
            status => ProcessResult::Error {
                status,
                submission_id: Some(submission_id.to_string()),
                nonce: Some(nonce),
            },
        }
    }
}

/// Alert text sent to the settlement API
pub fn nonce_error_message(status: NonceValidation, nonce: u64, submission_id: &str) -> String {
    format!(
        "incorrect nonce error ({}): nonce: {}; submissionId: {}",
        status.as_str(),
        nonce,
        submission_id
    )
}

pub struct RecoveryPolicy {
    notifier: Arc<dyn ErrorNotifier>,
    controller: Arc<dyn ScanController>,
    metrics: Arc<Metrics>,
}

impl RecoveryPolicy {
    pub fn new(
        notifier: Arc<dyn ErrorNotifier>,
        controller: Arc<dyn ScanController>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            notifier,
            controller,
            metrics,
        }
    }

    /// Apply the recovery action for `result`.
    ///
    /// Returns `Some(status)` without any side effect when an error result
    /// lacks the submission id or nonce; `None` otherwise.
    /// `endpoint_url` is the endpoint the offending event was read from.
    pub async fn handle(
        &self,
        result: &ProcessResult,
        chain_id: ChainId,
        providers: &ChainProviders,
        endpoint_url: &str,
    ) -> Option<NonceValidation> {
        let ProcessResult::Error {
            status,
            submission_id,
            nonce,
        } = result
        else {
            return None;
        };

        let (Some(submission_id), Some(nonce)) = (submission_id.as_deref(), *nonce) else {
            debug!(chain_id, %status, "Nonce error without event detail, no recovery action");
            return Some(*status);
        };

        match status {
            NonceValidation::DuplicatedNonce => {
                error!(chain_id, nonce, submission_id, "Duplicated nonce, pausing chain");
                self.metrics.record_nonce_error(chain_id, status.as_str());
                self.notify(chain_id, nonce_error_message(*status, nonce, submission_id))
                    .await;
                if self.controller.pause(chain_id) {
                    self.metrics.record_pause(chain_id);
                }
            }
            NonceValidation::MissedNonce => {
                error!(
                    chain_id,
                    nonce,
                    submission_id,
                    url = endpoint_url,
                    "Missed nonce, quarantining provider endpoint"
                );
                self.metrics.record_nonce_error(chain_id, status.as_str());
                self.notify(chain_id, nonce_error_message(*status, nonce, submission_id))
                    .await;
                if providers.quarantine(endpoint_url) {
                    self.metrics
                        .record_quarantine(chain_id, providers.selectable_count());
                }
            }
            NonceValidation::Success => {
                warn!(chain_id, nonce, submission_id, "Error result carrying a success status");
            }
        }

        None
    }

    async fn notify(&self, chain_id: ChainId, message: String) {
        if let Err(e) = self.notifier.notify_error(&message).await {
            warn!(chain_id, error = %e, message, "Failed to send nonce error notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ClientError;
    use crate::scanner::{ChainStatus, ScanControl};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const PROVIDER: &str = "debridge.io";
    const CHAIN_ID: ChainId = 97;

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ErrorNotifier for RecordingNotifier {
        async fn notify_error(&self, message: &str) -> Result<(), ClientError> {
            self.messages.lock().unwrap().push(message.to_string());
            if self.fail {
                return Err(ClientError::Auth {
                    url: "http://settlement".to_string(),
                    message: "rejected".to_string(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingController {
        paused: Mutex<Vec<ChainId>>,
    }

    impl ScanController for RecordingController {
        fn pause(&self, chain_id: ChainId) -> bool {
            let mut paused = self.paused.lock().unwrap();
            let changed = !paused.contains(&chain_id);
            paused.push(chain_id);
            changed
        }

        fn resume(&self, _chain_id: ChainId) -> bool {
            false
        }

        fn is_paused(&self, chain_id: ChainId) -> bool {
            self.paused.lock().unwrap().contains(&chain_id)
        }
    }

    struct Fixture {
        notifier: Arc<RecordingNotifier>,
        controller: Arc<RecordingController>,
        providers: ChainProviders,
        policy: RecoveryPolicy,
    }

    fn fixture_with(notifier: RecordingNotifier) -> Fixture {
        let notifier = Arc::new(notifier);
        let controller = Arc::new(RecordingController::default());
        let policy = RecoveryPolicy::new(
            notifier.clone(),
            controller.clone(),
            Arc::new(Metrics::new()),
        );
        Fixture {
            notifier,
            controller,
            providers: ChainProviders::from_urls(CHAIN_ID, &[PROVIDER.to_string()]),
            policy,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingNotifier::default())
    }

    fn full_error(status: NonceValidation) -> ProcessResult {
        ProcessResult::Error {
            status,
            submission_id: Some("123".to_string()),
            nonce: Some(123),
        }
    }

    #[tokio::test]
    async fn test_success_is_noop() {
        let f = fixture();
        let outcome = f
            .policy
            .handle(&ProcessResult::Success, CHAIN_ID, &f.providers, PROVIDER)
            .await;

        assert_eq!(outcome, None);
        assert!(f.notifier.messages.lock().unwrap().is_empty());
        assert!(f.controller.paused.lock().unwrap().is_empty());
        assert!(f.providers.endpoints()[0].is_valid());
    }

    #[tokio::test]
    async fn test_duplicated_nonce_pauses_chain() {
        let f = fixture();
        let outcome = f
            .policy
            .handle(
                &full_error(NonceValidation::DuplicatedNonce),
                CHAIN_ID,
                &f.providers,
                PROVIDER,
            )
            .await;

        assert_eq!(outcome, None);
        assert_eq!(
            *f.notifier.messages.lock().unwrap(),
            vec!["incorrect nonce error (duplicated_nonce): nonce: 123; submissionId: 123"]
        );
        assert_eq!(*f.controller.paused.lock().unwrap(), vec![CHAIN_ID]);
        // Provider validity is untouched by duplicates
        assert!(f.providers.endpoints()[0].is_valid());
    }

    #[tokio::test]
    async fn test_missed_nonce_quarantines_provider() {
        let f = fixture();
        let outcome = f
            .policy
            .handle(
                &full_error(NonceValidation::MissedNonce),
                CHAIN_ID,
                &f.providers,
                PROVIDER,
            )
            .await;

        assert_eq!(outcome, None);
        assert_eq!(
            *f.notifier.messages.lock().unwrap(),
            vec!["incorrect nonce error (missed_nonce): nonce: 123; submissionId: 123"]
        );
        assert!(!f.providers.endpoints()[0].is_valid());
        assert!(f.providers.select_endpoint().is_none());
        assert!(f.controller.paused.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_detail_short_circuits() {
        for status in [NonceValidation::DuplicatedNonce, NonceValidation::MissedNonce] {
            let f = fixture();
            let result = ProcessResult::Error {
                status,
                submission_id: None,
                nonce: None,
            };
            let outcome = f
                .policy
                .handle(&result, CHAIN_ID, &f.providers, PROVIDER)
                .await;

            assert_eq!(outcome, Some(status));
            assert!(f.notifier.messages.lock().unwrap().is_empty());
            assert!(f.controller.paused.lock().unwrap().is_empty());
            assert!(f.providers.endpoints()[0].is_valid());
        }
    }

    #[tokio::test]
    async fn test_partial_detail_short_circuits() {
        let f = fixture();
        let result = ProcessResult::Error {
            status: NonceValidation::MissedNonce,
            submission_id: Some("123".to_string()),
            nonce: None,
        };
        let outcome = f
            .policy
            .handle(&result, CHAIN_ID, &f.providers, PROVIDER)
            .await;

        assert_eq!(outcome, Some(NonceValidation::MissedNonce));
        assert!(f.providers.endpoints()[0].is_valid());
    }

    #[tokio::test]
    async fn test_notification_failure_still_recovers() {
        let f = fixture_with(RecordingNotifier {
            fail: true,
            ..Default::default()
        });

        f.policy
            .handle(
                &full_error(NonceValidation::DuplicatedNonce),
                CHAIN_ID,
                &f.providers,
                PROVIDER,
            )
            .await;
        assert_eq!(*f.controller.paused.lock().unwrap(), vec![CHAIN_ID]);

        f.policy
            .handle(
                &full_error(NonceValidation::MissedNonce),
                CHAIN_ID,
                &f.providers,
                PROVIDER,
            )
            .await;
        assert!(!f.providers.endpoints()[0].is_valid());
        assert_eq!(f.notifier.messages.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missed_nonce_only_quarantines_serving_endpoint() {
        let f = fixture();
        let providers = ChainProviders::from_urls(
            CHAIN_ID,
            &["https://a.com".to_string(), "https://b.com".to_string()],
        );
        f.policy
            .handle(
                &full_error(NonceValidation::MissedNonce),
                CHAIN_ID,
                &providers,
                "https://a.com",
            )
            .await;

        assert_eq!(providers.select_endpoint().unwrap().url(), "https://b.com");
    }

    #[tokio::test]
    async fn test_pause_through_scan_control() {
        let status = Arc::new(ChainStatus::new(CHAIN_ID, "bsc-testnet"));
        let control = Arc::new(ScanControl::new([status.clone()]));
        let policy = RecoveryPolicy::new(
            Arc::new(RecordingNotifier::default()),
            control,
            Arc::new(Metrics::new()),
        );
        let providers = ChainProviders::from_urls(CHAIN_ID, &[PROVIDER.to_string()]);

        policy
            .handle(
                &full_error(NonceValidation::DuplicatedNonce),
                CHAIN_ID,
                &providers,
                PROVIDER,
            )
            .await;
        assert!(status.is_paused());
    }

    #[tokio::test]
    async fn test_repeated_duplicates_count_one_pause() {
        let status = Arc::new(ChainStatus::new(CHAIN_ID, "bsc-testnet"));
        let control = Arc::new(ScanControl::new([status.clone()]));
        let notifier = Arc::new(RecordingNotifier::default());
        let metrics = Arc::new(Metrics::new());
        let policy = RecoveryPolicy::new(notifier.clone(), control.clone(), metrics.clone());
        let providers = ChainProviders::from_urls(CHAIN_ID, &[PROVIDER.to_string()]);

        for _ in 0..2 {
            policy
                .handle(
                    &full_error(NonceValidation::DuplicatedNonce),
                    CHAIN_ID,
                    &providers,
                    PROVIDER,
                )
                .await;
        }

        // Every duplicate is alerted, only the transition is a pause
        assert_eq!(notifier.messages.lock().unwrap().len(), 2);
        let pauses = || {
            metrics
                .chain_pauses_total
                .with_label_values(&[&CHAIN_ID.to_string()])
                .get()
        };
        assert_eq!(pauses(), 1);

        control.resume(CHAIN_ID);
        policy
            .handle(
                &full_error(NonceValidation::DuplicatedNonce),
                CHAIN_ID,
                &providers,
                PROVIDER,
            )
            .await;
        assert!(status.is_paused());
        assert_eq!(pauses(), 2);
    }

    #[test]
    fn test_from_validation() {
        assert_eq!(
            ProcessResult::from_validation(NonceValidation::Success, "0xa", 1),
            ProcessResult::Success
        );
        assert_eq!(
            ProcessResult::from_validation(NonceValidation::MissedNonce, "0xa", 5),
            ProcessResult::Error {
                status: NonceValidation::MissedNonce,
                submission_id: Some("0xa".to_string()),
                nonce: Some(5),
            }
        );
    }
}
