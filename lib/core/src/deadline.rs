use std::future::Future;
use std::time::{Duration, Instant};
use crate::{Error, Result};

/// Caller-supplied bound on how long a shadow index operation may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// No bound at all.
    #[must_use]
    pub fn none() -> Self {
        Self { at: None }
    }

    #[must_use]
    pub fn at(instant: Instant) -> Self {
        Self { at: Some(instant) }
    }

    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    #[inline]
    pub fn instant(&self) -> Option<Instant> {
        self.at
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.at.map(|at| Instant::now() >= at).unwrap_or(false)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Fails with [`Error::Timeout`] once the deadline has passed.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            return Err(Error::Timeout);
        }
        Ok(())
    }

    /// Await `fut`, giving up with [`Error::Timeout`] when the deadline passes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        match self.at {
            None => Ok(fut.await),
            Some(at) => tokio::time::timeout_at(at.into(), fut)
                .await
                .map_err(|_| Error::Timeout),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_expires() {
        let d = Deadline::none();
        assert!(!d.is_expired());
        assert!(d.check().is_ok());
        assert_eq!(d.remaining(), None);
    }

    #[test]
    fn test_past_deadline_is_expired() {
        let d = Deadline::at(Instant::now() - Duration::from_millis(1));
        assert!(d.is_expired());
        assert!(matches!(d.check(), Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let d = Deadline::after(Duration::from_millis(10));
        let result = d.run(tokio::time::sleep(Duration::from_secs(5))).await;
        assert!(matches!(result, Err(Error::Timeout)));

        let d = Deadline::after(Duration::from_secs(5));
        assert_eq!(d.run(async { 7 }).await.unwrap(), 7);
    }
}
