//! Constraint merging (allOf resolution)

use super::{NodeId, NodeKind, ParameterArena};
use crate::error::CoreError;

impl ParameterArena {
    /// Merge the constraints of `other` into `target`.
    ///
    /// Numeric bounds and string lengths intersect to the tighter range, enums
    /// intersect, object properties are unioned (recursively merged on name
    /// collision) and arrays merge their reference element. Arrays also
    /// intersect their item counts and keep `uniqueItems` if either side sets
    /// it, since an `allOf` value must satisfy both schemas. A generic `other`
    /// adds nothing.
    ///
    /// # Errors
    ///
    /// [`CoreError::TypeMismatch`] when the two nodes are of different kinds,
    /// [`CoreError::ReadOnlyViolation`] on a frozen arena.
    pub fn merge(&mut self, target: NodeId, other: NodeId) -> Result<(), CoreError> {
        let source = self.get(other).ok_or(CoreError::UnknownNode(other))?.clone();
        if matches!(source.kind, NodeKind::Generic(_)) {
            return Ok(());
        }
        if let NodeKind::Combined(_) = source.kind {
            return match self.effective_schema(other) {
                Some(effective) => self.merge(target, effective),
                None => Ok(()),
            };
        }

        let node = self.node_mut(target)?;
        if node.format.is_none() {
            node.format.clone_from(&source.format);
        }
        if node.default_value.is_none() {
            node.default_value.clone_from(&source.default_value);
        }
        if !source.enum_values.is_empty() {
            if node.enum_values.is_empty() {
                node.enum_values.clone_from(&source.enum_values);
            } else {
                node.enum_values.retain(|v| source.enum_values.contains(v));
            }
        }
        for example in &source.examples {
            if !node.examples.contains(example) {
                node.examples.push(example.clone());
            }
        }
        node.required |= source.required;

        let expected = node.parameter_type();
        match (&mut node.kind, &source.kind) {
            (NodeKind::String(s), NodeKind::String(o)) => {
                s.min_length = tighter(s.min_length, o.min_length, u64::max);
                s.max_length = tighter(s.max_length, o.max_length, u64::min);
                if s.pattern.is_none() {
                    s.pattern.clone_from(&o.pattern);
                }
                Ok(())
            }
            (NodeKind::Number(n), NodeKind::Number(o)) => {
                n.integer |= o.integer;
                (n.minimum, n.exclusive_minimum) = match (n.minimum, o.minimum) {
                    (Some(a), Some(b)) if b > a => (Some(b), o.exclusive_minimum),
                    (Some(a), Some(b)) if b == a => {
                        (Some(a), n.exclusive_minimum || o.exclusive_minimum)
                    }
                    (None, Some(b)) => (Some(b), o.exclusive_minimum),
                    keep => (keep.0, n.exclusive_minimum),
                };
                (n.maximum, n.exclusive_maximum) = match (n.maximum, o.maximum) {
                    (Some(a), Some(b)) if b < a => (Some(b), o.exclusive_maximum),
                    (Some(a), Some(b)) if b == a => {
                        (Some(a), n.exclusive_maximum || o.exclusive_maximum)
                    }
                    (None, Some(b)) => (Some(b), o.exclusive_maximum),
                    keep => (keep.0, n.exclusive_maximum),
                };
                Ok(())
            }
            (NodeKind::Boolean(_), NodeKind::Boolean(_)) | (NodeKind::Null(_), NodeKind::Null(_)) => {
                Ok(())
            }
            (NodeKind::Array(a), NodeKind::Array(o)) => {
                a.min_items = tighter(a.min_items, o.min_items, u64::max);
                a.max_items = tighter(a.max_items, o.max_items, u64::min);
                a.unique_items |= o.unique_items;
                let reference = a.reference_element;
                self.merge(reference, o.reference_element)
            }
            (NodeKind::Object(_), NodeKind::Object(o)) => {
                for property in &o.properties {
                    let name = self[*property].name.clone();
                    match self.property(target, &name) {
                        Some(existing) => self.merge(existing, *property)?,
                        None => {
                            let copy = self.duplicate_subtree(*property, None)?;
                            self.add_property(target, copy)?;
                        }
                    }
                }
                Ok(())
            }
            _ => Err(CoreError::TypeMismatch {
                name: source.name.clone(),
                expected,
                value: source.parameter_type().to_string(),
            }),
        }
    }
}

fn tighter(a: Option<u64>, b: Option<u64>, pick: fn(u64, u64) -> u64) -> Option<u64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(pick(x, y)),
        (x, y) => x.or(y),
    }
}
