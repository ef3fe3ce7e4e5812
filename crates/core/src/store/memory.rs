use tokio::sync::RwLock;

use crate::domain::envelope::Envelope;
use crate::errors::QueueStoreError;

use super::QueueStore;

#[derive(Default)]
pub struct InMemoryQueueStore {
    envelopes: RwLock<Vec<Envelope>>,
}

impl InMemoryQueueStore {
    pub fn with_envelopes(envelopes: Vec<Envelope>) -> Self {
        Self { envelopes: RwLock::new(envelopes) }
    }
}

#[async_trait::async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn load(&self) -> Vec<Envelope> {
        self.envelopes.read().await.clone()
    }

    async fn save(&self, envelopes: &[Envelope]) -> Result<(), QueueStoreError> {
        let mut stored = self.envelopes.write().await;
        *stored = envelopes.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use crate::domain::envelope::Envelope;
    use crate::store::{InMemoryQueueStore, QueueStore};

    fn envelope(name: &str) -> Envelope {
        Envelope::new("T1", Map::new(), "", name)
    }

    #[tokio::test]
    async fn provided_operations_keep_fifo_order() {
        let store = InMemoryQueueStore::default();

        assert_eq!(store.append(envelope("a")).await.expect("append"), 1);
        assert_eq!(store.append(envelope("b")).await.expect("append"), 2);
        assert_eq!(store.peek_first().await.map(|e| e.name), Some("a".to_owned()));

        let removed = store.remove_first().await.expect("remove");
        assert_eq!(removed.map(|e| e.name), Some("a".to_owned()));
        assert_eq!(store.load().await, vec![envelope("b")]);
    }

    #[tokio::test]
    async fn remove_first_on_empty_queue_is_a_no_op() {
        let store = InMemoryQueueStore::default();

        assert!(store.remove_first().await.expect("remove").is_none());
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn seeded_store_loads_its_backlog() {
        let store = InMemoryQueueStore::with_envelopes(vec![envelope("x"), envelope("y")]);

        let names: Vec<_> = store.load().await.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["x", "y"]);
    }
}
