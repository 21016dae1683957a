use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info};

use crate::platform::Notifier;

/// Outcome of one fan-out, per recipient
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<i64>,
    pub failed: Vec<i64>,
}

/// Sends alerts to every admin. A failed recipient never blocks the others.
#[derive(Clone)]
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub async fn dispatch(&self, alert_text: &str, admins: &[i64]) -> DispatchReport {
        let sends = admins.iter().map(|&admin| async move {
            let result = self.notifier.send_message(admin, alert_text, true).await;
            (admin, result)
        });

        let mut report = DispatchReport::default();
        for (admin, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    info!("Alert sent to admin {}", admin);
                    report.delivered.push(admin);
                }
                Err(e) => {
                    error!("Failed to send alert to admin {}: {:#}", admin, e);
                    report.failed.push(admin);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::FakeNotifier;

    #[tokio::test]
    async fn test_failure_does_not_stop_other_recipients() {
        let notifier = Arc::new(FakeNotifier::new().failing_for(2));
        let dispatcher = AlertDispatcher::new(notifier.clone());

        let report = dispatcher.dispatch("alert", &[1, 2, 3]).await;

        assert_eq!(report.delivered, vec![1, 3]);
        assert_eq!(report.failed, vec![2]);
        assert_eq!(notifier.recipients(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_link_preview_disabled() {
        let notifier = Arc::new(FakeNotifier::new());
        let dispatcher = AlertDispatcher::new(notifier.clone());

        dispatcher.dispatch("https://t.me/news/1", &[7]).await;

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].2);
    }

    #[tokio::test]
    async fn test_no_admins_is_a_noop() {
        let notifier = Arc::new(FakeNotifier::new());
        let report = AlertDispatcher::new(notifier.clone())
            .dispatch("alert", &[])
            .await;
        assert_eq!(report, DispatchReport::default());
    }
}
