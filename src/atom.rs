//! Decoded records (atoms) and their values
//!
//! An [`Atom`] is one decoded instance of a schema: an insertion-ordered
//! mapping from field name to [`Value`], tagged with the namespace path that
//! locates it inside a nested record tree. Atoms are populated by the decode
//! driver, frozen once their group finishes, and from then on only allow
//! value replacement; the node tree shape never changes through an atom.

use indexmap::IndexMap;

use crate::error::{Result, SchemaError};
use crate::schema::Node;

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Record(Atom),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Atom> {
        match self {
            Value::Record(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Atom> {
        match self {
            Value::Record(a) => Some(a),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

/// One decoded record
#[derive(Debug, Clone)]
pub struct Atom {
    fields: IndexMap<String, Value>,
    read_only: Vec<String>,
    namespace: Vec<String>,
    schema: Node,
    frozen: bool,
}

impl Atom {
    pub(crate) fn new(schema: Node, namespace: Vec<String>) -> Self {
        Atom {
            fields: IndexMap::new(),
            read_only: Vec::new(),
            namespace,
            schema,
            frozen: false,
        }
    }

    /// Field names from the schema root down to this record
    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    /// The group node this record was decoded by
    pub fn schema(&self) -> &Node {
        &self.schema
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Integer value of a field, if present and integral
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    /// Mutable access to a field value; derived fields are withheld
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        if self.read_only.iter().any(|f| f == name) {
            return None;
        }
        self.fields.get_mut(name)
    }

    /// Replace a field's value.
    ///
    /// Structural shape is fixed after decode: unknown names are rejected
    /// rather than inserted, and derived fields stay read-only.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> std::result::Result<(), SchemaError> {
        if self.read_only.iter().any(|f| f == name) {
            return Err(SchemaError::ReadOnlyField {
                name: name.to_string(),
            });
        }
        match self.fields.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(SchemaError::UnknownField {
                name: name.to_string(),
            }),
        }
    }

    /// Mutable access to a nested record field
    pub fn record_mut(&mut self, name: &str) -> Option<&mut Atom> {
        self.get_mut(name).and_then(Value::as_record_mut)
    }

    /// Ordered view of the record's fields
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Walk down to the record at `namespace`, which must extend this
    /// record's own namespace
    pub fn locate(&self, namespace: &[String]) -> Option<&Atom> {
        if !namespace.starts_with(&self.namespace) {
            return None;
        }
        let mut cur = self;
        for name in &namespace[self.namespace.len()..] {
            cur = cur.get(name)?.as_record()?;
        }
        Some(cur)
    }

    /// Re-serialize through the originating group node
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let schema = self.schema.clone();
        crate::encode::encode(&schema, self)
    }

    pub(crate) fn insert(&mut self, name: &str, value: Value) -> std::result::Result<(), SchemaError> {
        if self.frozen && !self.fields.contains_key(name) {
            return Err(SchemaError::FrozenRecord);
        }
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    pub(crate) fn mark_read_only(&mut self, name: &str) {
        if !self.read_only.iter().any(|f| f == name) {
            self.read_only.push(name.to_string());
        }
    }

    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.fields == other.fields
    }
}

/// Dotted path for error messages
pub(crate) fn join_path(namespace: &[String], name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace.join("."), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FormatCode, FormatNode};

    fn test_atom(namespace: Vec<String>) -> Atom {
        let schema = FormatNode::group(vec![FormatNode::scalar("hp", FormatCode::U8)]);
        Atom::new(schema, namespace)
    }

    #[test]
    fn test_freeze_blocks_new_fields() {
        let mut atom = test_atom(vec![]);
        atom.insert("hp", Value::Int(45)).unwrap();
        atom.freeze();
        assert!(matches!(
            atom.insert("atk", Value::Int(49)),
            Err(SchemaError::FrozenRecord)
        ));
        // replacement is still allowed
        atom.set("hp", 50).unwrap();
        assert_eq!(atom.get_int("hp"), Some(50));
    }

    #[test]
    fn test_set_unknown_field() {
        let mut atom = test_atom(vec![]);
        atom.freeze();
        assert!(matches!(
            atom.set("nope", 1),
            Err(SchemaError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_derived_fields_read_only() {
        let mut atom = test_atom(vec![]);
        atom.insert("total", Value::Int(7)).unwrap();
        atom.mark_read_only("total");
        atom.freeze();
        assert!(matches!(
            atom.set("total", 9),
            Err(SchemaError::ReadOnlyField { .. })
        ));
        assert!(atom.get_mut("total").is_none());
        assert_eq!(atom.get_int("total"), Some(7));
    }

    #[test]
    fn test_locate_descends_by_namespace() {
        let mut inner = test_atom(vec!["stats".to_string()]);
        inner.insert("hp", Value::Int(45)).unwrap();
        inner.freeze();

        let mut outer = test_atom(vec![]);
        outer.insert("stats", Value::Record(inner)).unwrap();
        outer.freeze();

        let ns = vec!["stats".to_string()];
        let found = outer.locate(&ns).unwrap();
        assert_eq!(found.get_int("hp"), Some(45));
        assert!(outer.locate(&["other".to_string()]).is_none());
        // a record locates itself
        assert_eq!(outer.locate(&[]).unwrap().len(), 1);
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(&[], "hp"), "hp");
        let ns = vec!["stats".to_string()];
        assert_eq!(join_path(&ns, "hp"), "stats.hp");
    }
}
