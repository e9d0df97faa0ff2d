//! Table definitions: attributes, tiers, and foreign keys.

use crate::table_name::TableName;
use crate::tier::Tier;
use crate::value::AttrType;
use serde::{Deserialize, Serialize};

/// One attribute of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub attr_type: AttrType,
    /// Whether the attribute is part of the primary key.
    pub in_key: bool,
    pub nullable: bool,
}

/// A directed dependency edge: every key of the child must reference an
/// existing key of the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub parent: TableName,
    /// (child attribute, parent primary-key attribute) pairs. The mapping
    /// must cover the parent's entire primary key.
    pub attr_map: Vec<(String, String)>,
}

impl ForeignKey {
    pub fn new(parent: impl Into<TableName>) -> Self {
        Self {
            parent: parent.into(),
            attr_map: Vec::new(),
        }
    }

    /// Builder-style mapping of one child attribute onto one parent
    /// primary-key attribute.
    pub fn map(mut self, child_attr: impl Into<String>, parent_attr: impl Into<String>) -> Self {
        self.attr_map.push((child_attr.into(), parent_attr.into()));
        self
    }

    /// Reference `parent` keeping the attribute names unchanged.
    pub fn inherited(parent: impl Into<TableName>, attrs: &[&str]) -> Self {
        let mut fk = Self::new(parent);
        for attr in attrs {
            fk = fk.map(*attr, *attr);
        }
        fk
    }

    pub fn child_attrs(&self) -> impl Iterator<Item = &str> {
        self.attr_map.iter().map(|(c, _)| c.as_str())
    }

    pub fn parent_attr_for(&self, child_attr: &str) -> Option<&str> {
        self.attr_map
            .iter()
            .find(|(c, _)| c == child_attr)
            .map(|(_, p)| p.as_str())
    }
}

/// A named relation with a primary key, a tier, and foreign-key
/// dependencies on other tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: TableName,
    pub tier: Tier,
    pub comment: Option<String>,
    /// All attributes in declaration order; key attributes first by
    /// convention, but ordering is not load-bearing.
    pub attributes: Vec<AttributeDef>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDef {
    /// Start building a table definition.
    pub fn build(name: impl Into<TableName>, tier: Tier) -> TableDefBuilder {
        TableDefBuilder {
            def: TableDef {
                name: name.into(),
                tier,
                comment: None,
                attributes: Vec::new(),
                foreign_keys: Vec::new(),
            },
        }
    }

    /// Primary-key attribute names in declaration order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|a| a.in_key)
            .map(|a| a.name.as_str())
            .collect()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Foreign keys embedded in the primary key: every mapped child
    /// attribute is a key attribute. These are the edges the key source
    /// joins over.
    pub fn key_foreign_keys(&self) -> Vec<&ForeignKey> {
        self.foreign_keys
            .iter()
            .filter(|fk| {
                fk.child_attrs()
                    .all(|a| self.attribute(a).is_some_and(|d| d.in_key))
            })
            .collect()
    }

    /// Primary-key attributes inherited through key-embedded foreign keys,
    /// in primary-key order. This is the sub-key a key source enumerates
    /// and the identity under which provenance is recorded.
    pub fn inherited_key_attrs(&self) -> Vec<&str> {
        let fks = self.key_foreign_keys();
        self.primary_key()
            .into_iter()
            .filter(|attr| fks.iter().any(|fk| fk.child_attrs().any(|c| c == *attr)))
            .collect()
    }
}

/// Builder for [`TableDef`].
#[derive(Debug)]
pub struct TableDefBuilder {
    def: TableDef,
}

impl TableDefBuilder {
    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.def.comment = Some(text.into());
        self
    }

    /// Add a primary-key attribute.
    pub fn key_attr(mut self, name: impl Into<String>, attr_type: AttrType) -> Self {
        self.def.attributes.push(AttributeDef {
            name: name.into(),
            attr_type,
            in_key: true,
            nullable: false,
        });
        self
    }

    /// Add a non-key, non-nullable attribute.
    pub fn attr(mut self, name: impl Into<String>, attr_type: AttrType) -> Self {
        self.def.attributes.push(AttributeDef {
            name: name.into(),
            attr_type,
            in_key: false,
            nullable: false,
        });
        self
    }

    /// Add a non-key, nullable attribute.
    pub fn nullable_attr(mut self, name: impl Into<String>, attr_type: AttrType) -> Self {
        self.def.attributes.push(AttributeDef {
            name: name.into(),
            attr_type,
            in_key: false,
            nullable: true,
        });
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.def.foreign_keys.push(fk);
        self
    }

    /// Inherit `parent`'s primary key: copies any of the parent's key
    /// attributes the child does not yet declare (as key attributes) and
    /// adds the same-name foreign key.
    pub fn inherits(mut self, parent: &TableDef) -> Self {
        let mut attrs = Vec::new();
        for pk_attr in parent.primary_key() {
            attrs.push(pk_attr.to_string());
            if self.def.attribute(pk_attr).is_none() {
                let parent_attr = parent
                    .attribute(pk_attr)
                    .cloned()
                    .unwrap_or(AttributeDef {
                        name: pk_attr.to_string(),
                        attr_type: AttrType::Integer,
                        in_key: true,
                        nullable: false,
                    });
                self.def.attributes.push(AttributeDef {
                    in_key: true,
                    nullable: false,
                    ..parent_attr
                });
            }
        }
        let attr_refs: Vec<&str> = attrs.iter().map(String::as_str).collect();
        self.def
            .foreign_keys
            .push(ForeignKey::inherited(parent.name.clone(), &attr_refs));
        self
    }

    pub fn finish(self) -> TableDef {
        self.def
    }
}

#[cfg(test)]
#[path = "table_test.rs"]
mod tests;
