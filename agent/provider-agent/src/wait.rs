use crate::clients::{ClientError, ClientResult};
use log::trace;
use provsys_model::constants::{DEFAULT_POLL_DELAY, REFRESH_TIMEOUT, WAIT_FOR_DELETE_TIMEOUT};
use std::future::Future;
use std::time::Duration;

/// Timeouts and the polling delay used when waiting on the appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub delete_timeout: Duration,
    pub refresh_timeout: Duration,
    pub delay: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            delete_timeout: WAIT_FOR_DELETE_TIMEOUT,
            refresh_timeout: REFRESH_TIMEOUT,
            delay: DEFAULT_POLL_DELAY,
        }
    }
}

impl WaitSettings {
    /// Settings for appliances that answer instantly, such as in-memory fakes.
    pub fn immediate() -> Self {
        Self {
            delete_timeout: Duration::from_secs(5),
            refresh_timeout: Duration::from_secs(5),
            delay: Duration::from_millis(1),
        }
    }
}

/// Poll `check` every `delay` until it returns `true`, giving up after `timeout`. Errors from
/// `check` end the wait immediately.
pub async fn wait_for<F, Fut>(
    what: &str,
    timeout: Duration,
    delay: Duration,
    mut check: F,
) -> ClientResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<bool>>,
{
    let poll = async {
        loop {
            if check().await? {
                return Ok(());
            }
            trace!("Still waiting for {}", what);
            tokio::time::sleep(delay).await;
        }
    };
    tokio::time::timeout(timeout, poll).await.map_err(|_| {
        ClientError::Timeout(Some(
            format!("Waited {:?} for {}", timeout, what).into(),
        ))
    })?
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn waits_until_true() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        wait_for("three calls", Duration::from_secs(5), Duration::from_millis(1), move || async move {
            Ok(calls.fetch_add(1, Ordering::SeqCst) >= 2)
        })
        .await
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn times_out() {
        let err = wait_for(
            "never",
            Duration::from_millis(20),
            Duration::from_millis(5),
            || async { Ok(false) },
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("never"));
    }

    #[tokio::test]
    async fn errors_end_the_wait() {
        let err = wait_for("error", Duration::from_secs(5), Duration::from_millis(1), || async {
            Err(ClientError::missing_data("gone"))
        })
        .await
        .unwrap_err();
        assert!(!err.is_timeout());
    }
}
