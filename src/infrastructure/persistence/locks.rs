//! Per-collection async locks

use crate::domain::collection::Collection;
use tokio::sync::{Mutex, MutexGuard};

/// One mutex per collection, owned by whichever component needs to
/// serialize access to that collection.
#[derive(Debug, Default)]
pub(crate) struct CollectionLocks {
    subscribers: Mutex<()>,
    users: Mutex<()>,
    calls: Mutex<()>,
}

impl CollectionLocks {
    pub(crate) async fn lock(&self, collection: Collection) -> MutexGuard<'_, ()> {
        match collection {
            Collection::Subscribers => self.subscribers.lock().await,
            Collection::Users => self.users.lock().await,
            Collection::Calls => self.calls.lock().await,
        }
    }
}
