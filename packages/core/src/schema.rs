//! Schema: the immutable name-to-kind contract a record adheres to.
//!
//! Two distinct checks live here:
//!
//! - **Schema-to-schema compatibility** ([`Schema::compatible_with`]):
//!   subset-or-equal with *identical* kinds per name.
//! - **Record-instance validation** ([`Schema::check_record`]): only
//!   *assignability* (covariance) per [`ValueKind::accepts`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::value::{Value, ValueKind};

/// Errors raised by schema construction and validation.
///
/// Validation errors are surfaced eagerly at schema-set or bind time and
/// identify the first offending field; they are never silently coerced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A required name is absent.
    #[error("schema field missing: {name}")]
    Missing {
        /// The absent field name.
        name: String,
    },
    /// A name is present with the wrong kind.
    #[error("schema field {name}: expected {expected}, found {found}")]
    WrongKind {
        /// The offending field name.
        name: String,
        /// Kind declared by the schema.
        expected: ValueKind,
        /// Kind actually found.
        found: ValueKind,
    },
    /// A field name appeared twice during construction.
    #[error("duplicate schema field: {name}")]
    Duplicate {
        /// The repeated field name.
        name: String,
    },
    /// A schema was set on a record that already has one.
    #[error("schema is already set")]
    AlreadySet,
}

/// Immutable mapping of field name to [`ValueKind`].
///
/// Insertion order is irrelevant; names are unique by construction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: BTreeMap<String, ValueKind>,
}

impl Schema {
    /// Builds a schema from `(name, kind)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Duplicate`] if the same name appears twice.
    pub fn new<N>(pairs: impl IntoIterator<Item = (N, ValueKind)>) -> Result<Self, SchemaError>
    where
        N: Into<String>,
    {
        let mut fields = BTreeMap::new();
        for (name, kind) in pairs {
            let name = name.into();
            if fields.insert(name.clone(), kind).is_some() {
                return Err(SchemaError::Duplicate { name });
            }
        }
        Ok(Self { fields })
    }

    /// An empty schema (no fields).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Declared kind of `name`, if present.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<ValueKind> {
        self.fields.get(name).copied()
    }

    /// Number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema declares no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates `(name, kind)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ValueKind)> {
        self.fields.iter().map(|(n, k)| (n.as_str(), *k))
    }

    /// Subset-or-equal compatibility: every field of `self` must exist in
    /// `other` with an *identical* kind.
    ///
    /// Reflexive by construction; mutual compatibility implies identical
    /// name/kind sets.
    ///
    /// # Errors
    ///
    /// Reports the first offending name as [`SchemaError::Missing`] or
    /// [`SchemaError::WrongKind`].
    pub fn compatible_with(&self, other: &Schema) -> Result<(), SchemaError> {
        for (name, kind) in &self.fields {
            match other.fields.get(name) {
                None => {
                    return Err(SchemaError::Missing { name: name.clone() });
                }
                Some(found) if *found != *kind => {
                    return Err(SchemaError::WrongKind {
                        name: name.clone(),
                        expected: *kind,
                        found: *found,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Validates a record instance against this schema.
    ///
    /// Every field the record carries must be declared here, and its value
    /// must be *assignable* to the declared kind (covariance — `Null`
    /// anywhere, `Int` where `Float` is declared).
    ///
    /// # Errors
    ///
    /// Reports the first offending name as [`SchemaError::Missing`] or
    /// [`SchemaError::WrongKind`].
    pub fn check_record(&self, record: &Record) -> Result<(), SchemaError> {
        for (name, value) in record.fields() {
            self.check_field(&name, &value)?;
        }
        Ok(())
    }

    /// Validates a single `(name, value)` pair with the assignability rule.
    ///
    /// # Errors
    ///
    /// [`SchemaError::Missing`] if the name is not declared,
    /// [`SchemaError::WrongKind`] if the value is not assignable.
    pub fn check_field(&self, name: &str, value: &Value) -> Result<(), SchemaError> {
        let Some(kind) = self.kind_of(name) else {
            return Err(SchemaError::Missing {
                name: name.to_string(),
            });
        };
        if kind.accepts(value) {
            Ok(())
        } else {
            Err(SchemaError::WrongKind {
                name: name.to_string(),
                expected: kind,
                found: value.kind(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn schema(pairs: &[(&str, ValueKind)]) -> Schema {
        Schema::new(pairs.iter().map(|(n, k)| ((*n).to_string(), *k))).unwrap()
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let result = Schema::new([("a", ValueKind::Int), ("a", ValueKind::Text)]);
        assert_eq!(
            result.unwrap_err(),
            SchemaError::Duplicate { name: "a".into() }
        );
    }

    #[test]
    fn subset_is_compatible_with_superset() {
        let small = schema(&[("a", ValueKind::Int)]);
        let big = schema(&[("a", ValueKind::Int), ("b", ValueKind::Text)]);
        assert!(small.compatible_with(&big).is_ok());
        assert_eq!(
            big.compatible_with(&small).unwrap_err(),
            SchemaError::Missing { name: "b".into() }
        );
    }

    #[test]
    fn kind_mismatch_names_the_offending_field() {
        let a = schema(&[("x", ValueKind::Int)]);
        let b = schema(&[("x", ValueKind::Float)]);
        assert_eq!(
            a.compatible_with(&b).unwrap_err(),
            SchemaError::WrongKind {
                name: "x".into(),
                expected: ValueKind::Int,
                found: ValueKind::Float,
            }
        );
    }

    #[test]
    fn compatibility_requires_exact_kinds_even_where_assignability_would_pass() {
        // Int is assignable to Float for instances, but schema compatibility
        // demands identity.
        let ints = schema(&[("x", ValueKind::Int)]);
        let floats = schema(&[("x", ValueKind::Float)]);
        assert!(ints.compatible_with(&floats).is_err());
        assert!(floats.kind_of("x").unwrap().accepts(&Value::Int(1)));
    }

    fn arb_kind() -> impl Strategy<Value = ValueKind> {
        prop_oneof![
            Just(ValueKind::Bool),
            Just(ValueKind::Int),
            Just(ValueKind::Float),
            Just(ValueKind::Text),
        ]
    }

    fn arb_schema() -> impl Strategy<Value = Schema> {
        proptest::collection::btree_map("[a-z]{1,6}", arb_kind(), 0..8)
            .prop_map(|m| Schema::new(m).unwrap())
    }

    proptest! {
        /// Every schema is compatible with itself.
        #[test]
        fn compatibility_is_reflexive(s in arb_schema()) {
            prop_assert!(s.compatible_with(&s).is_ok());
        }

        /// Mutual compatibility implies identical name/kind sets.
        #[test]
        fn compatibility_is_antisymmetric(a in arb_schema(), b in arb_schema()) {
            if a.compatible_with(&b).is_ok() && b.compatible_with(&a).is_ok() {
                prop_assert_eq!(a, b);
            }
        }
    }
}
