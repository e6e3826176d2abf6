//! The eventual outcome of a promise.
use std::sync::Arc;

use crate::Error;

/// Holds either a value or an error plus a completion flag.
///
/// Nothing here checks that only one of `value` and `error` is set; the
/// promise is the single writer and sets exactly one of them before
/// marking the record completed.
#[derive(Debug)]
pub struct CompletionRecord<T> {
    completed: bool,
    value: Option<Arc<T>>,
    error: Option<Error>,
}

impl<T> Default for CompletionRecord<T> {
    fn default() -> Self {
        Self {
            completed: false,
            value: None,
            error: None,
        }
    }
}

impl<T> CompletionRecord<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, value: T) {
        self.value = Some(Arc::new(value));
    }

    pub fn set_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    /// Completion is monotonic: once set, passing `false` is ignored.
    pub fn set_completed(&mut self, completed: bool) {
        self.completed |= completed;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_success(&self) -> bool {
        self.completed && self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.completed && self.error.is_some()
    }

    pub fn value(&self) -> Option<&Arc<T>> {
        self.value.as_ref()
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::CompletionRecord;
    use crate::Error;

    #[test]
    fn test_pending_is_neither() {
        let record = CompletionRecord::<String>::new();
        assert!(!record.is_completed());
        assert!(!record.is_success());
        assert!(!record.is_error());
        assert!(record.value().is_none());
    }

    #[test]
    fn test_value_then_completed() {
        let mut record = CompletionRecord::new();
        record.set_value(String::from("rice"));
        assert!(!record.is_success());
        record.set_completed(true);
        assert!(record.is_success());
        assert!(!record.is_error());
        assert_eq!(record.value().map(|v| v.as_str()), Some("rice"));
    }

    #[test]
    fn test_error_then_completed() {
        let mut record = CompletionRecord::<String>::new();
        record.set_error(Error::msg("burnt"));
        record.set_completed(true);
        assert!(record.is_error());
        assert!(!record.is_success());
        assert_eq!(record.error().map(|e| e.to_string()), Some("burnt".into()));
    }

    #[test]
    fn test_completed_never_resets() {
        let mut record = CompletionRecord::<()>::new();
        record.set_completed(true);
        record.set_completed(false);
        assert!(record.is_completed());
    }
}
