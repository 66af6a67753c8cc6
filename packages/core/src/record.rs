//! Schema-checked, order-preserving record with change notification and an
//! optional live binding.
//!
//! A [`Record`] is a shareable handle (`Clone` gives another handle to the
//! same state) so a backend's [`DataPort`] can push external changes in
//! while application code holds the record. All notifications fire outside
//! the internal lock, so observers may safely call back into the record.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::binding::Binding;
use crate::error::PipeError;
use crate::schema::{Schema, SchemaError};
use crate::value::Value;

type ChangeObserver = Arc<dyn Fn(&str) + Send + Sync>;
type DeleteObserver = Arc<dyn Fn() + Send + Sync>;

struct RecordState {
    /// Insertion-ordered `(name, value)` pairs.
    values: Vec<(String, Value)>,
    /// Set exactly once; any later `set_schema` is an error.
    schema: Option<Schema>,
    binding: Option<Binding>,
    changed: Vec<(u64, ChangeObserver)>,
    deleted: Vec<(u64, DeleteObserver)>,
    next_sub_id: u64,
}

pub(crate) struct RecordShared {
    state: RwLock<RecordState>,
}

/// Which observer list a [`RecordSubscription`] belongs to.
enum SubscriptionKind {
    Changed,
    Deleted,
}

/// Registration handle for record change/delete observers.
///
/// Unsubscription is the explicit [`cancel`](RecordSubscription::cancel)
/// call.
pub struct RecordSubscription {
    shared: Weak<RecordShared>,
    id: u64,
    kind: SubscriptionKind,
}

impl RecordSubscription {
    /// Detaches the observer this subscription registered.
    pub fn cancel(self) {
        if let Some(shared) = self.shared.upgrade() {
            let mut state = shared.state.write();
            match self.kind {
                SubscriptionKind::Changed => state.changed.retain(|(id, _)| *id != self.id),
                SubscriptionKind::Deleted => state.deleted.retain(|(id, _)| *id != self.id),
            }
        }
    }
}

/// Source-to-record notification port.
///
/// Handed to binding-capable backends so they can push external changes into
/// the record. Holds only a weak handle: the record owns the binding, the
/// binding never owns the record. The delete path here tears the record down
/// WITHOUT re-notifying the source — that one-way suppression is the
/// invariant that breaks the delete cycle.
#[derive(Clone)]
pub struct DataPort {
    shared: Weak<RecordShared>,
}

impl DataPort {
    /// Pushes an external value change into the record.
    ///
    /// Fires the record's change channel but does NOT re-trigger the
    /// record-to-source update notification. A no-op if the record has been
    /// dropped.
    ///
    /// # Errors
    ///
    /// [`PipeError::KeyNotFound`] if the record does not carry `name`;
    /// [`PipeError::Schema`] if the pushed value violates the record's
    /// schema.
    pub fn notice_update_to_data(&self, name: &str, value: Value) -> Result<(), PipeError> {
        let Some(shared) = self.shared.upgrade() else {
            return Ok(());
        };
        let observers = {
            let mut state = shared.state.write();
            set_value(&mut state, name, value)?;
            snapshot_changed(&state)
        };
        for observer in observers {
            observer(name);
        }
        Ok(())
    }

    /// Pushes an external deletion into the record.
    ///
    /// Fires local delete observers once and clears all subscriptions and
    /// the binding, without calling the binding's delete-to-source path.
    pub fn notice_delete_to_data(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let observers = {
            let mut state = shared.state.write();
            // Drop the binding silently: the source initiated this delete.
            state.binding = None;
            state.changed.clear();
            std::mem::take(&mut state.deleted)
        };
        for (_, observer) in observers {
            observer();
        }
    }
}

/// A schema-checked, order-preserving name-to-value container.
#[derive(Clone)]
pub struct Record {
    shared: Arc<RecordShared>,
}

fn set_value(state: &mut RecordState, name: &str, value: Value) -> Result<(), PipeError> {
    let Some(slot) = state.values.iter_mut().find(|(n, _)| n == name) else {
        return Err(PipeError::key_not_found(name));
    };
    if let Some(schema) = &state.schema {
        schema.check_field(name, &value)?;
    }
    slot.1 = value;
    Ok(())
}

fn snapshot_changed(state: &RecordState) -> Vec<ChangeObserver> {
    state.changed.iter().map(|(_, f)| Arc::clone(f)).collect()
}

impl Record {
    /// Creates an empty record with no schema and no binding.
    #[must_use]
    pub fn new() -> Self {
        Self::from_fields(Vec::<(String, Value)>::new())
    }

    /// Creates a record from `(name, value)` pairs, preserving order.
    ///
    /// A repeated name replaces the earlier value in place.
    pub fn from_fields<N>(pairs: impl IntoIterator<Item = (N, Value)>) -> Self
    where
        N: Into<String>,
    {
        let mut values: Vec<(String, Value)> = Vec::new();
        for (name, value) in pairs {
            let name = name.into();
            if let Some(slot) = values.iter_mut().find(|(n, _)| *n == name) {
                slot.1 = value;
            } else {
                values.push((name, value));
            }
        }
        Self {
            shared: Arc::new(RecordShared {
                state: RwLock::new(RecordState {
                    values,
                    schema: None,
                    binding: None,
                    changed: Vec::new(),
                    deleted: Vec::new(),
                    next_sub_id: 0,
                }),
            }),
        }
    }

    /// Adds a field, or silently replaces an existing one.
    ///
    /// Construction-time API: fires no notifications.
    ///
    /// # Errors
    ///
    /// [`PipeError::Schema`] if a schema is set and the value violates it.
    pub fn insert(&self, name: impl Into<String>, value: Value) -> Result<(), PipeError> {
        let name = name.into();
        let mut state = self.shared.state.write();
        if let Some(schema) = &state.schema {
            schema.check_field(&name, &value)?;
        }
        if let Some(slot) = state.values.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            state.values.push((name, value));
        }
        Ok(())
    }

    /// Reads a field value.
    ///
    /// # Errors
    ///
    /// [`PipeError::KeyNotFound`] if the record does not carry `name`.
    pub fn get(&self, name: &str) -> Result<Value, PipeError> {
        let state = self.shared.state.read();
        state
            .values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| PipeError::key_not_found(name))
    }

    /// Writes a field value.
    ///
    /// On success: (a) the change channel fires for `name`, (b) if a binding
    /// is attached, its update-to-source notification fires.
    ///
    /// # Errors
    ///
    /// [`PipeError::KeyNotFound`] if the record does not carry `name`;
    /// [`PipeError::Schema`] if the value violates the record's schema.
    pub fn set(&self, name: &str, value: Value) -> Result<(), PipeError> {
        let (observers, binding) = {
            let mut state = self.shared.state.write();
            set_value(&mut state, name, value.clone())?;
            (snapshot_changed(&state), state.binding.clone())
        };
        for observer in observers {
            observer(name);
        }
        if let Some(binding) = binding {
            binding.notice_update_to_source(name, &value);
        }
        Ok(())
    }

    /// Non-throwing [`set`](Record::set): reports success instead of erroring.
    pub fn try_set(&self, name: &str, value: Value) -> bool {
        self.set(name, value).is_ok()
    }

    /// Forces a "re-read everything" notification: the change channel fires
    /// with the empty name.
    pub fn refresh(&self) {
        let observers = snapshot_changed(&self.shared.state.read());
        for observer in observers {
            observer("");
        }
    }

    /// Field names in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let state = self.shared.state.read();
        state.values.iter().map(|(n, _)| n.clone()).collect()
    }

    /// `(name, value)` pairs in insertion order.
    #[must_use]
    pub fn fields(&self) -> Vec<(String, Value)> {
        self.shared.state.read().values.clone()
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.read().values.len()
    }

    /// Whether the record carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.state.read().values.is_empty()
    }

    /// The record's schema, if one has been set.
    #[must_use]
    pub fn schema(&self) -> Option<Schema> {
        self.shared.state.read().schema.clone()
    }

    /// Sets the schema. Settable exactly once.
    ///
    /// # Errors
    ///
    /// [`SchemaError::AlreadySet`] if a schema is already present (including
    /// when re-setting to an empty schema); the first schema violation if
    /// the record's current contents are not assignable.
    pub fn set_schema(&self, schema: Schema) -> Result<(), PipeError> {
        let mut state = self.shared.state.write();
        if state.schema.is_some() {
            return Err(SchemaError::AlreadySet.into());
        }
        for (name, value) in &state.values {
            schema.check_field(name, value)?;
        }
        state.schema = Some(schema);
        Ok(())
    }

    /// Attaches the binding. A record carries at most one binding for its
    /// lifetime.
    ///
    /// # Errors
    ///
    /// [`PipeError::Unsupported`] if a binding is already attached.
    pub fn bind(&self, binding: Binding) -> Result<(), PipeError> {
        let mut state = self.shared.state.write();
        if state.binding.is_some() {
            return Err(PipeError::unsupported("record is already bound"));
        }
        state.binding = Some(binding);
        Ok(())
    }

    /// The attached binding, if any.
    #[must_use]
    pub fn binding(&self) -> Option<Binding> {
        self.shared.state.read().binding.clone()
    }

    /// Creates the source-to-record port for this record.
    ///
    /// Backends keep the port; it holds only a weak handle.
    #[must_use]
    pub fn data_port(&self) -> DataPort {
        DataPort {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Attaches a change observer. The observer receives the field name, or
    /// the empty string for a [`refresh`](Record::refresh).
    pub fn subscribe_changed(
        &self,
        observer: impl Fn(&str) + Send + Sync + 'static,
    ) -> RecordSubscription {
        let mut state = self.shared.state.write();
        let id = state.next_sub_id;
        state.next_sub_id += 1;
        state.changed.push((id, Arc::new(observer)));
        RecordSubscription {
            shared: Arc::downgrade(&self.shared),
            id,
            kind: SubscriptionKind::Changed,
        }
    }

    /// Attaches a delete observer, fired exactly once when the record is
    /// deleted (locally or by the source).
    pub fn subscribe_deleted(
        &self,
        observer: impl Fn() + Send + Sync + 'static,
    ) -> RecordSubscription {
        let mut state = self.shared.state.write();
        let id = state.next_sub_id;
        state.next_sub_id += 1;
        state.deleted.push((id, Arc::new(observer)));
        RecordSubscription {
            shared: Arc::downgrade(&self.shared),
            id,
            kind: SubscriptionKind::Deleted,
        }
    }

    /// Deletes the record: notifies the backing store (if bound), fires
    /// local delete observers once, then clears all subscriptions and the
    /// binding.
    ///
    /// Idempotent — a second call finds the channels already cleared and is
    /// a no-op.
    pub fn delete(&self) {
        let (binding, observers) = {
            let mut state = self.shared.state.write();
            let binding = state.binding.take();
            let observers = std::mem::take(&mut state.deleted);
            state.changed.clear();
            (binding, observers)
        };
        if let Some(binding) = binding {
            binding.notice_delete_to_source();
        }
        for (_, observer) in observers {
            observer();
        }
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("Record")
            .field("values", &state.values)
            .field("schema", &state.schema)
            .field("bound", &state.binding.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::binding::SourceHandle;
    use crate::value::ValueKind;

    fn sample() -> Record {
        Record::from_fields([("name", Value::Text("A".into())), ("age", Value::Int(1))])
    }

    #[test]
    fn get_and_set_round_trip() {
        let record = sample();
        record.set("age", Value::Int(2)).unwrap();
        assert_eq!(record.get("age").unwrap(), Value::Int(2));
    }

    #[test]
    fn set_of_absent_name_is_key_not_found() {
        let record = sample();
        let err = record.set("missing", Value::Int(0)).unwrap_err();
        assert!(matches!(err, PipeError::KeyNotFound { name } if name == "missing"));
        assert!(!record.try_set("missing", Value::Int(0)));
    }

    #[test]
    fn set_fires_change_channel_with_field_name() {
        let record = sample();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = record.subscribe_changed(move |name| {
            sink.lock().unwrap().push(name.to_string());
        });

        record.set("name", Value::Text("B".into())).unwrap();
        record.refresh();

        assert_eq!(*seen.lock().unwrap(), vec!["name".to_string(), String::new()]);
    }

    #[test]
    fn schema_is_settable_exactly_once() {
        let record = sample();
        let schema = Schema::new([("name", ValueKind::Text), ("age", ValueKind::Int)]).unwrap();
        record.set_schema(schema).unwrap();

        // Re-setting, including to empty, is an error.
        let err = record.set_schema(Schema::empty()).unwrap_err();
        assert!(matches!(err, PipeError::Schema(SchemaError::AlreadySet)));
    }

    #[test]
    fn incompatible_schema_is_rejected_eagerly() {
        let record = sample();
        let schema = Schema::new([("name", ValueKind::Int), ("age", ValueKind::Int)]).unwrap();
        let err = record.set_schema(schema).unwrap_err();
        assert!(matches!(
            err,
            PipeError::Schema(SchemaError::WrongKind { ref name, .. }) if name == "name"
        ));
    }

    #[test]
    fn schema_checked_set_rejects_wrong_kind() {
        let record = sample();
        record
            .set_schema(Schema::new([("name", ValueKind::Text), ("age", ValueKind::Int)]).unwrap())
            .unwrap();
        assert!(record.set("age", Value::Text("two".into())).is_err());
        // Null is assignable anywhere.
        record.set("age", Value::Null).unwrap();
    }

    #[test]
    fn set_notifies_binding_source() {
        let record = sample();
        let binding = Binding::new(SourceHandle::Opaque("loc".into()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = binding.subscribe_update(move |name, value| {
            sink.lock().unwrap().push((name.to_string(), value.clone()));
        });
        record.bind(binding).unwrap();

        record.set("age", Value::Int(9)).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("age".to_string(), Value::Int(9))]
        );
    }

    #[test]
    fn second_bind_is_an_error() {
        let record = sample();
        record
            .bind(Binding::new(SourceHandle::Opaque("a".into())))
            .unwrap();
        assert!(record
            .bind(Binding::new(SourceHandle::Opaque("b".into())))
            .is_err());
    }

    #[test]
    fn delete_is_idempotent() {
        let record = sample();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = record.subscribe_deleted(move || {
            c.fetch_add(1, Ordering::Relaxed);
        });

        record.delete();
        record.delete();
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    /// The no-cycle invariant: `record.delete()` invokes the store's delete
    /// exactly once, even though the store's own delete handling is wired
    /// back into the record through the data port.
    #[test]
    fn delete_does_not_cycle_through_the_data_port() {
        let record = sample();
        let binding = Binding::new(SourceHandle::Opaque("loc".into()));
        let store_deletes = Arc::new(AtomicUsize::new(0));

        let port = record.data_port();
        let counter = Arc::clone(&store_deletes);
        let _sub = binding.subscribe_delete(move || {
            counter.fetch_add(1, Ordering::Relaxed);
            // The store reacts by notifying "data deleted" back to the
            // record, as a real backend would.
            port.notice_delete_to_data();
        });
        record.bind(binding).unwrap();

        let local_deletes = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&local_deletes);
        let _local = record.subscribe_deleted(move || {
            c.fetch_add(1, Ordering::Relaxed);
        });

        record.delete();

        assert_eq!(store_deletes.load(Ordering::Relaxed), 1);
        assert_eq!(local_deletes.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn data_port_update_does_not_notify_source() {
        let record = sample();
        let binding = Binding::new(SourceHandle::Opaque("loc".into()));
        let source_updates = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&source_updates);
        let _sub = binding.subscribe_update(move |_, _| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        record.bind(binding).unwrap();

        let changes = Arc::new(AtomicUsize::new(0));
        let cc = Arc::clone(&changes);
        let _local = record.subscribe_changed(move |_| {
            cc.fetch_add(1, Ordering::Relaxed);
        });

        record
            .data_port()
            .notice_update_to_data("age", Value::Int(40))
            .unwrap();

        assert_eq!(record.get("age").unwrap(), Value::Int(40));
        assert_eq!(changes.load(Ordering::Relaxed), 1, "change channel fires");
        assert_eq!(source_updates.load(Ordering::Relaxed), 0, "source stays quiet");
    }

    #[test]
    fn data_port_outlives_record_gracefully() {
        let record = sample();
        let port = record.data_port();
        drop(record);
        assert!(port.notice_update_to_data("age", Value::Int(1)).is_ok());
        port.notice_delete_to_data();
    }
}
