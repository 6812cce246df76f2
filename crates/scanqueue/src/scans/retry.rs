use crate::scans::model::ScanStatus;
use crate::scans::upload::UploadOutcome;

/// What happens to a scan after a failed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Park it as `failed` until someone resets it to `pending`.
    #[default]
    Manual,
    /// Put retryable failures back to `pending` (picked up on the next
    /// connectivity event) until `max_attempts` uploads have been tried.
    Bounded { max_attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    NonRetryable,
}

pub fn classify_http_status(status: u16) -> FailureClass {
    match status {
        408 | 425 | 429 => FailureClass::Retryable,
        400..=499 => FailureClass::NonRetryable,
        _ => FailureClass::Retryable,
    }
}

/// `None` for a delivered upload.
pub fn classify_outcome(outcome: &UploadOutcome) -> Option<FailureClass> {
    match outcome {
        UploadOutcome::Delivered => None,
        UploadOutcome::Rejected { status, .. } => Some(classify_http_status(*status)),
        UploadOutcome::TransportFailure(_) => Some(FailureClass::Retryable),
    }
}

impl RetryPolicy {
    /// `attempts` counts the attempt that just failed.
    pub fn status_after_failure(&self, class: FailureClass, attempts: i32) -> ScanStatus {
        match self {
            RetryPolicy::Manual => ScanStatus::Failed,
            RetryPolicy::Bounded { max_attempts } => {
                let attempts = attempts.max(0) as u32;
                if class == FailureClass::Retryable && attempts < *max_attempts {
                    ScanStatus::Pending
                } else {
                    ScanStatus::Failed
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_final_except_throttling() {
        assert_eq!(classify_http_status(400), FailureClass::NonRetryable);
        assert_eq!(classify_http_status(415), FailureClass::NonRetryable);
        assert_eq!(classify_http_status(429), FailureClass::Retryable);
        assert_eq!(classify_http_status(408), FailureClass::Retryable);
        assert_eq!(classify_http_status(500), FailureClass::Retryable);
        assert_eq!(classify_http_status(503), FailureClass::Retryable);
    }

    #[test]
    fn transport_failures_are_retryable() {
        let outcome = UploadOutcome::TransportFailure("connection refused".into());
        assert_eq!(classify_outcome(&outcome), Some(FailureClass::Retryable));
        assert_eq!(classify_outcome(&UploadOutcome::Delivered), None);
    }

    #[test]
    fn manual_policy_always_parks_the_scan() {
        let policy = RetryPolicy::Manual;
        assert_eq!(
            policy.status_after_failure(FailureClass::Retryable, 1),
            ScanStatus::Failed
        );
    }

    #[test]
    fn bounded_policy_requeues_until_exhausted() {
        let policy = RetryPolicy::Bounded { max_attempts: 3 };

        assert_eq!(
            policy.status_after_failure(FailureClass::Retryable, 1),
            ScanStatus::Pending
        );
        assert_eq!(
            policy.status_after_failure(FailureClass::Retryable, 2),
            ScanStatus::Pending
        );
        assert_eq!(
            policy.status_after_failure(FailureClass::Retryable, 3),
            ScanStatus::Failed
        );
        assert_eq!(
            policy.status_after_failure(FailureClass::NonRetryable, 1),
            ScanStatus::Failed
        );
    }
}
