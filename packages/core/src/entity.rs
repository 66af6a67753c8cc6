//! Strongly-typed records ("entities").
//!
//! An [`EntityDescriptor`] is a per-type static table of field accessors,
//! built once through [`EntityDescriptorBuilder`] (typically inside a
//! `LazyLock`) — never reflection on every access. The descriptor derives
//! the schema exactly once; records produced from an entity carry that
//! schema already set, so any later `set_schema` is an error: the type
//! itself is the schema.

use crate::error::PipeError;
use crate::record::Record;
use crate::schema::{Schema, SchemaError};
use crate::value::{Value, ValueKind};

/// One field's typed accessor pair.
pub struct FieldAccessor<T> {
    name: String,
    kind: ValueKind,
    get: fn(&T) -> Value,
    set: fn(&mut T, &Value) -> Result<(), PipeError>,
}

/// Static per-type descriptor: ordered accessors plus the derived schema.
pub struct EntityDescriptor<T> {
    fields: Vec<FieldAccessor<T>>,
    schema: Schema,
}

/// Builder for [`EntityDescriptor`]; register fields in column order.
pub struct EntityDescriptorBuilder<T> {
    fields: Vec<FieldAccessor<T>>,
}

impl<T> EntityDescriptorBuilder<T> {
    /// Starts an empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Registers a field with its typed accessor pair.
    #[must_use]
    pub fn field(
        mut self,
        name: impl Into<String>,
        kind: ValueKind,
        get: fn(&T) -> Value,
        set: fn(&mut T, &Value) -> Result<(), PipeError>,
    ) -> Self {
        self.fields.push(FieldAccessor {
            name: name.into(),
            kind,
            get,
            set,
        });
        self
    }

    /// Finishes the descriptor, deriving the schema once.
    ///
    /// # Errors
    ///
    /// [`SchemaError::Duplicate`] if a field name was registered twice.
    pub fn build(self) -> Result<EntityDescriptor<T>, SchemaError> {
        let schema = Schema::new(self.fields.iter().map(|f| (f.name.clone(), f.kind)))?;
        Ok(EntityDescriptor {
            fields: self.fields,
            schema,
        })
    }
}

impl<T> Default for EntityDescriptorBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EntityDescriptor<T> {
    /// The schema derived from the registered fields. Immutable.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Maps an entity value to a record with the schema already set.
    ///
    /// # Errors
    ///
    /// Propagates accessor failures.
    pub fn to_record(&self, entity: &T) -> Result<Record, PipeError> {
        let record = Record::from_fields(
            self.fields
                .iter()
                .map(|f| (f.name.clone(), (f.get)(entity))),
        );
        record.set_schema(self.schema.clone())?;
        Ok(record)
    }

    /// Reads a record back into an entity value.
    ///
    /// # Errors
    ///
    /// [`PipeError::KeyNotFound`] for a missing column, or whatever the
    /// typed setter reports for an unassignable value.
    pub fn read_into(&self, record: &Record, entity: &mut T) -> Result<(), PipeError> {
        for f in &self.fields {
            let value = record.get(&f.name)?;
            (f.set)(entity, &value)?;
        }
        Ok(())
    }
}

/// A type whose column layout is described by a static descriptor.
///
/// The `'static` bound is inherent: the descriptor is a per-type static
/// table.
pub trait Entity: Sized + 'static {
    /// The per-type descriptor, built once.
    fn descriptor() -> &'static EntityDescriptor<Self>;

    /// This entity as a schema-locked record.
    ///
    /// # Errors
    ///
    /// Propagates accessor failures.
    fn to_record(&self) -> Result<Record, PipeError> {
        Self::descriptor().to_record(self)
    }

    /// Builds an entity from a record.
    ///
    /// # Errors
    ///
    /// [`PipeError::KeyNotFound`] / [`PipeError::Schema`] per the
    /// descriptor's setters.
    fn from_record(record: &Record) -> Result<Self, PipeError>
    where
        Self: Default,
    {
        let mut entity = Self::default();
        Self::descriptor().read_into(record, &mut entity)?;
        Ok(entity)
    }
}

/// Typed setter helper: expects a [`Value::Int`], reporting
/// [`SchemaError::WrongKind`] otherwise.
///
/// # Errors
///
/// [`PipeError::Schema`] on kind mismatch.
pub fn expect_int(name: &str, value: &Value) -> Result<i64, PipeError> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(SchemaError::WrongKind {
            name: name.to_string(),
            expected: ValueKind::Int,
            found: other.kind(),
        }
        .into()),
    }
}

/// Typed setter helper for [`Value::Text`].
///
/// # Errors
///
/// [`PipeError::Schema`] on kind mismatch.
pub fn expect_text(name: &str, value: &Value) -> Result<String, PipeError> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        other => Err(SchemaError::WrongKind {
            name: name.to_string(),
            expected: ValueKind::Text,
            found: other.kind(),
        }
        .into()),
    }
}
