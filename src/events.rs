use crate::asset_data::AssetRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadProgress {
    pub discovered_assets: usize,
    pub total_assets: usize,
    pub pending_results: usize,
    pub is_discovering: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    AssetAdded(AssetRecord),
    AssetRemoved(AssetRecord),
    AssetRenamed {
        asset: AssetRecord,
        old_object_path: String,
    },
    PathAdded(String),
    PathRemoved(String),
    InMemoryAssetCreated(AssetRecord),
    InMemoryAssetDeleted(AssetRecord),
    FileLoadProgress(LoadProgress),
    FileLoadComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&RegistryEvent) + Send>;

#[derive(Default)]
pub struct Notifier {
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&RegistryEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn broadcast(&mut self, event: &RegistryEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unsubscribed_listeners_stop_receiving() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut notifier = Notifier::new();

        let seen = Arc::clone(&count);
        let id = notifier.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        notifier.broadcast(&RegistryEvent::FileLoadComplete);
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.broadcast(&RegistryEvent::FileLoadComplete);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
