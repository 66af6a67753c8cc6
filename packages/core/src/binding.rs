//! Binding protocol: the record-to-source half of the synchronization link.
//!
//! A [`Binding`] joins exactly one [`Record`](crate::record::Record) and one
//! backing-store location. The record-to-source direction lives here: on
//! every successful `set` the record fires
//! [`notice_update_to_source`](Binding::notice_update_to_source), and on
//! `delete()` it fires [`notice_delete_to_source`](Binding::notice_delete_to_source).
//! Backends attach observers through the subscribe methods; multiple
//! observers may attach, and unsubscription is an explicit
//! [`SourceSubscription::cancel`] call.
//!
//! The source-to-record direction is [`DataPort`](crate::record::DataPort),
//! which holds only a weak handle to the record — the record owns the
//! binding, never the reverse.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::value::Value;

/// Plain-value handle from a binding back to its concrete store location.
///
/// Deliberately never a reference to the record or to live backend state, so
/// rewiring bindings cannot create retain cycles.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceHandle {
    /// A relational row, addressed by primary key.
    Row {
        /// Backend table name.
        table: String,
        /// Primary-key column name.
        key_column: String,
        /// Primary-key value of the bound row.
        key: Value,
    },
    /// A rectangular block of cells, addressed by its origin.
    Block {
        /// Zero-based row of the block origin.
        row: i64,
        /// Zero-based column of the block origin.
        col: i64,
    },
    /// Backend-specific address for stores with no structured key.
    Opaque(String),
}

type UpdateObserver = Arc<dyn Fn(&str, &Value) + Send + Sync>;
type DeleteObserver = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct SourceObservers {
    updates: Vec<(u64, UpdateObserver)>,
    deletes: Vec<(u64, DeleteObserver)>,
    next_id: u64,
}

/// Subscriber list for the record-to-source notification direction.
struct SourceChannel {
    observers: Mutex<SourceObservers>,
}

/// Which observer list a [`SourceSubscription`] belongs to.
enum SubscriptionKind {
    Update,
    Delete,
}

/// Registration handle returned by the binding's subscribe methods.
///
/// Unsubscription is the explicit [`cancel`](SourceSubscription::cancel)
/// call; dropping the handle without cancelling leaves the observer
/// attached for the binding's lifetime.
pub struct SourceSubscription {
    channel: Weak<SourceChannel>,
    id: u64,
    kind: SubscriptionKind,
}

impl SourceSubscription {
    /// Detaches the observer this subscription registered.
    pub fn cancel(self) {
        if let Some(channel) = self.channel.upgrade() {
            let mut observers = channel.observers.lock();
            match self.kind {
                SubscriptionKind::Update => observers.updates.retain(|(id, _)| *id != self.id),
                SubscriptionKind::Delete => observers.deletes.retain(|(id, _)| *id != self.id),
            }
        }
    }
}

/// The synchronization link between one record and one store location.
///
/// Cloning yields another handle to the same subscriber channel; the record
/// holds one clone for its lifetime and fires it on every write and on
/// delete.
#[derive(Clone)]
pub struct Binding {
    handle: SourceHandle,
    source: Arc<SourceChannel>,
}

impl Binding {
    /// Creates a binding anchored at the given store location.
    #[must_use]
    pub fn new(handle: SourceHandle) -> Self {
        Self {
            handle,
            source: Arc::new(SourceChannel {
                observers: Mutex::new(SourceObservers::default()),
            }),
        }
    }

    /// The store-side location this binding resolves to.
    #[must_use]
    pub fn handle(&self) -> &SourceHandle {
        &self.handle
    }

    /// Attaches an observer for record-to-source value updates.
    pub fn subscribe_update(
        &self,
        observer: impl Fn(&str, &Value) + Send + Sync + 'static,
    ) -> SourceSubscription {
        let mut observers = self.source.observers.lock();
        let id = observers.next_id;
        observers.next_id += 1;
        observers.updates.push((id, Arc::new(observer)));
        SourceSubscription {
            channel: Arc::downgrade(&self.source),
            id,
            kind: SubscriptionKind::Update,
        }
    }

    /// Attaches an observer for the record-to-source delete notification.
    pub fn subscribe_delete(
        &self,
        observer: impl Fn() + Send + Sync + 'static,
    ) -> SourceSubscription {
        let mut observers = self.source.observers.lock();
        let id = observers.next_id;
        observers.next_id += 1;
        observers.deletes.push((id, Arc::new(observer)));
        SourceSubscription {
            channel: Arc::downgrade(&self.source),
            id,
            kind: SubscriptionKind::Delete,
        }
    }

    /// Fans a value update out to every update observer.
    ///
    /// Called by the record after a successful `set`.
    pub fn notice_update_to_source(&self, name: &str, value: &Value) {
        let observers: Vec<UpdateObserver> = {
            let lock = self.source.observers.lock();
            lock.updates.iter().map(|(_, f)| Arc::clone(f)).collect()
        };
        for observer in observers {
            observer(name, value);
        }
    }

    /// Fans the delete notification out to every delete observer.
    ///
    /// Called by the record exactly once, from `delete()`. The
    /// source-to-record teardown path
    /// ([`DataPort::notice_delete_to_data`](crate::record::DataPort::notice_delete_to_data))
    /// never calls back into this method; that one-way suppression is what
    /// breaks the delete cycle.
    pub fn notice_delete_to_source(&self) {
        let observers: Vec<DeleteObserver> = {
            let lock = self.source.observers.lock();
            lock.deletes.iter().map(|(_, f)| Arc::clone(f)).collect()
        };
        for observer in observers {
            observer();
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn update_fan_out_reaches_all_observers() {
        let binding = Binding::new(SourceHandle::Opaque("loc".into()));
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&count);
        let _s1 = binding.subscribe_update(move |_, _| {
            c1.fetch_add(1, Ordering::Relaxed);
        });
        let c2 = Arc::clone(&count);
        let _s2 = binding.subscribe_update(move |_, _| {
            c2.fetch_add(1, Ordering::Relaxed);
        });

        binding.notice_update_to_source("x", &Value::Int(1));
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn cancelled_subscription_stops_receiving() {
        let binding = Binding::new(SourceHandle::Opaque("loc".into()));
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let sub = binding.subscribe_delete(move || {
            c.fetch_add(1, Ordering::Relaxed);
        });

        binding.notice_delete_to_source();
        sub.cancel();
        binding.notice_delete_to_source();

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn handle_is_a_plain_value() {
        let binding = Binding::new(SourceHandle::Row {
            table: "users".into(),
            key_column: "id".into(),
            key: Value::Int(7),
        });
        assert_eq!(
            binding.handle(),
            &SourceHandle::Row {
                table: "users".into(),
                key_column: "id".into(),
                key: Value::Int(7),
            }
        );
    }
}
