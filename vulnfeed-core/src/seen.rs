use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use vulnfeed_types::DetectionKey;

/// Identity keys already emitted on a stream.
#[derive(Debug, Default)]
pub struct SeenSet {
    inner: Mutex<HashSet<DetectionKey>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key`; `true` when it was not present before.
    pub fn insert_if_absent(&self, key: DetectionKey) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(device: &str, vuln: &str) -> DetectionKey {
        DetectionKey {
            device_id: device.into(),
            vulnerability_id: vuln.into(),
        }
    }

    #[test]
    fn second_insert_is_rejected() {
        let seen = SeenSet::new();
        assert!(seen.is_empty());
        assert!(seen.insert_if_absent(key("1", "38170")));
        assert!(!seen.insert_if_absent(key("1", "38170")));
        assert!(seen.insert_if_absent(key("1", "38171")));
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_admit_each_key_once() {
        let seen = Arc::new(SeenSet::new());
        let admitted = Arc::new(AtomicUsize::new(0));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let seen = seen.clone();
            let admitted = admitted.clone();
            tasks.spawn(async move {
                for n in 0..100 {
                    if seen.insert_if_absent(key(&n.to_string(), "1")) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 100);
        assert_eq!(seen.len(), 100);
    }
}
