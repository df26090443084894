//! Index definitions: which properties feed an index and how.

use crate::document::Value;
use crate::error::{CoreError, CoreResult};
use crate::index::key::{IndexKey, KeyPart};

/// How a property's value contributes to index keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBy {
    /// Index the value itself; collection values expand per element
    /// (per entry key for maps).
    Value,
    /// Index each element of a collection-valued property.
    Element,
    /// Index each key of a map-valued property.
    MapKey,
    /// Index each value of a map-valued property.
    MapValue,
}

/// One indexed property.
#[derive(Debug, Clone)]
pub struct PropertyDefinition {
    field: String,
    by: IndexBy,
}

impl PropertyDefinition {
    /// Indexes the property's value.
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            by: IndexBy::Value,
        }
    }

    /// Indexes each element of the collection-valued property.
    #[must_use]
    pub fn by_element(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            by: IndexBy::Element,
        }
    }

    /// Indexes each key of the map-valued property.
    #[must_use]
    pub fn by_map_key(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            by: IndexBy::MapKey,
        }
    }

    /// Indexes each value of the map-valued property.
    #[must_use]
    pub fn by_map_value(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            by: IndexBy::MapValue,
        }
    }

    /// Returns the property name.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns the contribution mode.
    #[must_use]
    pub fn mode(&self) -> IndexBy {
        self.by
    }
}

/// What one property contributed to key building.
enum Extraction {
    Single(KeyPart),
    Multi(Vec<KeyPart>),
}

/// Definition of a secondary index: the schema class it covers, the
/// ordered properties forming the key, and the null policy.
///
/// At most one property may expand per element; a composite key then
/// splits into one key per element of that property's collection.
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    class_name: String,
    properties: Vec<PropertyDefinition>,
    ignore_null: bool,
}

impl IndexDefinition {
    /// Creates a definition over the given properties, in key order.
    pub fn new(
        class_name: impl Into<String>,
        properties: Vec<PropertyDefinition>,
    ) -> CoreResult<Self> {
        if properties.is_empty() {
            return Err(CoreError::validation(
                "an index definition needs at least one property",
            ));
        }
        Ok(Self {
            class_name: class_name.into(),
            properties,
            ignore_null: false,
        })
    }

    /// Makes records with null key components contribute no entries.
    #[must_use]
    pub fn ignore_null(mut self, value: bool) -> Self {
        self.ignore_null = value;
        self
    }

    /// Returns true if null key components suppress entries.
    #[must_use]
    pub fn is_null_ignored(&self) -> bool {
        self.ignore_null
    }

    /// Returns the schema class this definition covers.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the indexed property names, in key order.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.field()).collect()
    }

    /// Returns the indexed properties.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDefinition] {
        &self.properties
    }

    /// Returns true if the key has more than one component.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.properties.len() > 1
    }

    /// Builds the keys a record with the resolved property values
    /// contributes.
    ///
    /// Returns an empty vector when the null policy suppresses the record.
    /// Fails with `Validation` when more than one property expands per
    /// element.
    pub(crate) fn keys_with(&self, resolve: &dyn Fn(&str) -> Value) -> CoreResult<Vec<IndexKey>> {
        let mut singles: Vec<Option<KeyPart>> = vec![None; self.properties.len()];
        let mut multi: Option<(usize, Vec<KeyPart>)> = None;

        for (i, property) in self.properties.iter().enumerate() {
            let value = resolve(property.field());
            match extract(property.mode(), &value) {
                Extraction::Single(part) => singles[i] = Some(part),
                Extraction::Multi(parts) => {
                    if multi.is_some() {
                        return Err(CoreError::validation(format!(
                            "index on '{}' has more than one per-element property",
                            self.class_name
                        )));
                    }
                    multi = Some((i, parts));
                }
            }
        }

        if self.ignore_null
            && singles
                .iter()
                .any(|part| matches!(part, Some(KeyPart::Null)))
        {
            return Ok(Vec::new());
        }

        match multi {
            None => {
                let parts = singles.into_iter().map(Option::unwrap).collect();
                Ok(vec![IndexKey::new(parts)])
            }
            Some((slot, mut parts)) => {
                if self.ignore_null {
                    parts.retain(|part| !part.is_null());
                    if parts.is_empty() {
                        return Ok(Vec::new());
                    }
                } else if parts.is_empty() {
                    // an empty collection contributes a null placeholder
                    parts.push(KeyPart::Null);
                }
                let mut keys = Vec::with_capacity(parts.len());
                for part in parts {
                    let components = singles
                        .iter()
                        .enumerate()
                        .map(|(i, single)| {
                            if i == slot {
                                part.clone()
                            } else {
                                single.clone().unwrap_or(KeyPart::Null)
                            }
                        })
                        .collect();
                    let key = IndexKey::new(components);
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                Ok(keys)
            }
        }
    }
}

fn extract(mode: IndexBy, value: &Value) -> Extraction {
    match mode {
        IndexBy::Value => match value {
            Value::List(list) => {
                Extraction::Multi(list.values().iter().map(KeyPart::from_value).collect())
            }
            Value::Set(set) => {
                Extraction::Multi(set.values().iter().map(KeyPart::from_value).collect())
            }
            Value::Map(map) => Extraction::Multi(
                map.keys().into_iter().map(KeyPart::Text).collect(),
            ),
            Value::LinkBag(bag) => {
                Extraction::Multi(bag.rids().into_iter().map(KeyPart::Link).collect())
            }
            scalar => Extraction::Single(KeyPart::from_value(scalar)),
        },
        IndexBy::Element => match value {
            Value::List(list) => {
                Extraction::Multi(list.values().iter().map(KeyPart::from_value).collect())
            }
            Value::Set(set) => {
                Extraction::Multi(set.values().iter().map(KeyPart::from_value).collect())
            }
            Value::LinkBag(bag) => {
                Extraction::Multi(bag.rids().into_iter().map(KeyPart::Link).collect())
            }
            Value::Null => Extraction::Multi(Vec::new()),
            scalar => Extraction::Multi(vec![KeyPart::from_value(scalar)]),
        },
        IndexBy::MapKey => match value {
            Value::Map(map) => Extraction::Multi(
                map.keys().into_iter().map(KeyPart::Text).collect(),
            ),
            _ => Extraction::Multi(Vec::new()),
        },
        IndexBy::MapValue => match value {
            Value::Map(map) => Extraction::Multi(
                map.entries()
                    .iter()
                    .map(|(_, v)| KeyPart::from_value(v))
                    .collect(),
            ),
            _ => Extraction::Multi(Vec::new()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{TrackedList, TrackedMap};

    fn resolver(pairs: Vec<(&'static str, Value)>) -> impl Fn(&str) -> Value {
        move |name: &str| {
            pairs
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null)
        }
    }

    #[test]
    fn single_property_key() {
        let def =
            IndexDefinition::new("person", vec![PropertyDefinition::new("name")]).unwrap();
        let keys = def
            .keys_with(&resolver(vec![("name", Value::from("a"))]))
            .unwrap();
        assert_eq!(keys, vec![IndexKey::single(KeyPart::Text("a".to_string()))]);
    }

    #[test]
    fn null_policy_suppresses_entries() {
        let def = IndexDefinition::new("person", vec![PropertyDefinition::new("name")])
            .unwrap()
            .ignore_null(true);
        assert!(def.keys_with(&resolver(vec![])).unwrap().is_empty());

        let keeping = IndexDefinition::new("person", vec![PropertyDefinition::new("name")])
            .unwrap();
        assert_eq!(
            keeping.keys_with(&resolver(vec![])).unwrap(),
            vec![IndexKey::single(KeyPart::Null)]
        );
    }

    #[test]
    fn collection_expands_per_element() {
        let def = IndexDefinition::new(
            "person",
            vec![PropertyDefinition::by_element("tags")],
        )
        .unwrap();
        let list = TrackedList::from_values(vec![Value::Integer(1), Value::Integer(2)]);
        let keys = def
            .keys_with(&resolver(vec![("tags", Value::List(list))]))
            .unwrap();
        assert_eq!(
            keys,
            vec![
                IndexKey::single(KeyPart::Integer(1)),
                IndexKey::single(KeyPart::Integer(2)),
            ]
        );
    }

    #[test]
    fn composite_with_collection_splits_keys() {
        let def = IndexDefinition::new(
            "person",
            vec![
                PropertyDefinition::new("prop1"),
                PropertyDefinition::by_element("prop2"),
            ],
        )
        .unwrap();
        let list = TrackedList::from_values(vec![Value::Integer(1), Value::Integer(2)]);
        let keys = def
            .keys_with(&resolver(vec![
                ("prop1", Value::from("test1")),
                ("prop2", Value::List(list)),
            ]))
            .unwrap();
        assert_eq!(
            keys,
            vec![
                IndexKey::new(vec![KeyPart::Text("test1".to_string()), KeyPart::Integer(1)]),
                IndexKey::new(vec![KeyPart::Text("test1".to_string()), KeyPart::Integer(2)]),
            ]
        );
    }

    #[test]
    fn empty_collection_contributes_null_placeholder() {
        let def = IndexDefinition::new(
            "person",
            vec![
                PropertyDefinition::new("prop1"),
                PropertyDefinition::by_element("prop2"),
            ],
        )
        .unwrap();
        let keys = def
            .keys_with(&resolver(vec![
                ("prop1", Value::from("x")),
                ("prop2", Value::List(TrackedList::new())),
            ]))
            .unwrap();
        assert_eq!(
            keys,
            vec![IndexKey::new(vec![
                KeyPart::Text("x".to_string()),
                KeyPart::Null
            ])]
        );

        let suppressing = IndexDefinition::new(
            "person",
            vec![
                PropertyDefinition::new("prop1"),
                PropertyDefinition::by_element("prop2"),
            ],
        )
        .unwrap()
        .ignore_null(true);
        assert!(suppressing
            .keys_with(&resolver(vec![
                ("prop1", Value::from("x")),
                ("prop2", Value::List(TrackedList::new())),
            ]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn map_modes() {
        let map = TrackedMap::from_entries(vec![
            ("k1".to_string(), Value::Integer(10)),
            ("k2".to_string(), Value::Integer(20)),
        ]);

        let by_key = IndexDefinition::new(
            "person",
            vec![PropertyDefinition::by_map_key("attrs")],
        )
        .unwrap();
        let keys = by_key
            .keys_with(&resolver(vec![("attrs", Value::Map(map.clone()))]))
            .unwrap();
        assert_eq!(
            keys,
            vec![
                IndexKey::single(KeyPart::Text("k1".to_string())),
                IndexKey::single(KeyPart::Text("k2".to_string())),
            ]
        );

        let by_value = IndexDefinition::new(
            "person",
            vec![PropertyDefinition::by_map_value("attrs")],
        )
        .unwrap();
        let keys = by_value
            .keys_with(&resolver(vec![("attrs", Value::Map(map))]))
            .unwrap();
        assert_eq!(
            keys,
            vec![
                IndexKey::single(KeyPart::Integer(10)),
                IndexKey::single(KeyPart::Integer(20)),
            ]
        );
    }

    #[test]
    fn two_collection_properties_are_rejected() {
        let def = IndexDefinition::new(
            "person",
            vec![
                PropertyDefinition::by_element("a"),
                PropertyDefinition::by_element("b"),
            ],
        )
        .unwrap();
        let list = TrackedList::from_values(vec![Value::Integer(1)]);
        let result = def.keys_with(&resolver(vec![
            ("a", Value::List(list.clone())),
            ("b", Value::List(list)),
        ]));
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn duplicate_elements_produce_one_key() {
        let def = IndexDefinition::new(
            "person",
            vec![PropertyDefinition::by_element("tags")],
        )
        .unwrap();
        let list = TrackedList::from_values(vec![Value::Integer(1), Value::Integer(1)]);
        let keys = def
            .keys_with(&resolver(vec![("tags", Value::List(list))]))
            .unwrap();
        assert_eq!(keys.len(), 1);
    }
}
