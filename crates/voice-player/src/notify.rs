//! User-facing status messages.

use std::error::Error;

/// Error type returned by notifiers.
pub type NotifyError = Box<dyn Error + Send + Sync>;

/// Delivers a text message to the user that requested playback.
pub trait Notifier: Send + Sync {
    fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

impl<F> Notifier for F
where
    F: Fn(&str) -> Result<(), NotifyError> + Send + Sync,
{
    fn notify(&self, text: &str) -> Result<(), NotifyError> {
        self(text)
    }
}

/// Send a message, logging (never propagating) delivery failures.
pub(crate) fn notify_user(notifier: &dyn Notifier, text: &str) {
    if let Err(err) = notifier.notify(text) {
        tracing::warn!(error = %err, message = %text, "failed to deliver notification");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Notifier recording every message.
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        pub messages: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingNotifier {
        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, text: &str) -> Result<(), NotifyError> {
            self.messages.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_errors_are_swallowed() {
        let failing = |_: &str| -> Result<(), NotifyError> { Err("channel gone".into()) };
        notify_user(&failing, "hello");
    }

    #[test]
    fn recording_notifier_keeps_order() {
        let rec = test_support::RecordingNotifier::default();
        notify_user(&rec, "one");
        notify_user(&rec, "two");
        assert_eq!(rec.messages(), vec!["one", "two"]);
    }
}
