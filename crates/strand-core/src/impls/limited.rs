//! ConcurrencyLimited - key をまたいだ同時 apply 数の上限
//!
//! lane ごとの順序は Dispatcher が守るので、ここでは数だけを絞ります。
//! 待っている間も lane の先頭は「実行中」扱いのままなので、同じ key の
//! 次のタスクが追い越すことはありません。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::domain::{ApplyError, NamespaceKey};
use crate::ports::ApplyEpisode;

pub struct ConcurrencyLimited<A> {
    inner: A,
    permits: Arc<Semaphore>,
    limit: usize,
}

impl<A> ConcurrencyLimited<A> {
    pub fn new(inner: A, limit: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits not currently held by an apply call.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: ApplyEpisode> ApplyEpisode for ConcurrencyLimited<A> {
    type Payload = A::Payload;
    type Output = A::Output;

    async fn apply(
        &self,
        key: &NamespaceKey,
        payload: Self::Payload,
    ) -> Result<Self::Output, ApplyError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ApplyError::new("concurrency limiter closed"))?;
        self.inner.apply(key, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Dispatcher;
    use crate::testing::{ExclusiveApply, await_all};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn limit_one_serializes_across_keys() {
        // ExclusiveApply tracks concurrency across all keys it sees
        let exclusive = ExclusiveApply::new();
        let max_seen = exclusive.max_concurrency();
        let dispatcher = Dispatcher::builder(ConcurrencyLimited::new(exclusive, 1))
            .build()
            .unwrap();

        let handles: Vec<_> = (0..40)
            .map(|i| {
                let key = format!("k{}", i % 4);
                dispatcher.submit(&key, i).unwrap().handle
            })
            .collect();

        let results = tokio::time::timeout(Duration::from_secs(10), await_all(handles))
            .await
            .unwrap();
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permits_are_returned_after_apply() {
        let limited = ConcurrencyLimited::new(ExclusiveApply::new(), 3);
        let key = NamespaceKey::parse("g").unwrap();

        limited.apply(&key, 1).await.unwrap();
        assert_eq!(limited.available(), 3);
        assert_eq!(limited.limit(), 3);
    }
}
