/// Transient user-facing notification channel. A UI layer shows these as
/// dismissible toasts; the default implementation routes them to the log.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn success(&self, message: &str) {
        tracing::info!("notification: {message}");
    }

    fn error(&self, message: &str) {
        tracing::warn!("notification: {message}");
    }
}
