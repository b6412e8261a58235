// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use fen_var::{Dbref, ObjId, Var};

/// The distinguished root of every class parent chain.
pub const ROOT_CLASS_NAME: &str = "Object";
/// Objects of this class (or a descendant) are exits and get direction
/// abbreviation matching in the resolver.
pub const EXIT_CLASS_NAME: &str = "obj_exit";
/// Display name fallback for the single system object.
pub const SYSTEM_OBJECT_NAME: &str = "system";

pub const PROP_NAME: &str = "name";
pub const PROP_ALIASES: &str = "aliases";
pub const PROP_DESCRIPTION: &str = "description";
pub const PROP_DIRECTION: &str = "direction";
pub const PROP_DESTINATION: &str = "destination";
pub const PROP_TYPE: &str = "type";
pub const PROP_IS_SYSTEM_OBJECT: &str = "isSystemObject";

/// A class: the prototype end of the property chain. Classes carry defaults;
/// instances override them. The parent chain is acyclic and ends at `Object`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectClass {
    pub id: ObjId,
    pub name: String,
    pub parent: Option<ObjId>,
    pub description: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Var>,
}

/// A thing in the world: room, item, actor, exit, player body.
///
/// `location` is the containment link; `None` means "nowhere". Containment
/// forms a forest, enforced by the world move operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameObject {
    pub id: ObjId,
    #[serde(default)]
    pub dbref: Option<Dbref>,
    pub class: ObjId,
    pub name: String,
    #[serde(default)]
    pub location: Option<ObjId>,
    #[serde(default)]
    pub properties: BTreeMap<String, Var>,
}

impl GameObject {
    /// The value in this object's own bag, ignoring the class chain.
    pub fn own_property(&self, key: &str) -> Option<&Var> {
        self.properties.get(key)
    }

    /// The alias list of this object: the `aliases` property, accepting
    /// either an array of strings or one whitespace/comma-delimited string.
    pub fn aliases(&self) -> Vec<String> {
        self.properties
            .get(PROP_ALIASES)
            .map(parse_aliases)
            .unwrap_or_default()
    }
}

/// Parse an `aliases` property value: an array of strings, or one
/// whitespace/comma-delimited string.
pub fn parse_aliases(value: &Var) -> Vec<String> {
    match value {
        Var::List(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect(),
        Var::Str(s) => s
            .split([' ', ',', '\t'])
            .filter(|a| !a.is_empty())
            .map(|a| a.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use fen_var::{v_list, v_str};

    use super::*;

    fn obj_with_aliases(aliases: Var) -> GameObject {
        GameObject {
            id: ObjId::from("o1"),
            dbref: None,
            class: ObjId::from("c1"),
            name: "A Wooden Staff".to_string(),
            location: None,
            properties: BTreeMap::from([(PROP_ALIASES.to_string(), aliases)]),
        }
    }

    #[test]
    fn test_aliases_from_list() {
        let o = obj_with_aliases(v_list(vec![v_str("stick"), v_str("staff")]));
        assert_eq!(o.aliases(), vec!["stick", "staff"]);
    }

    #[test]
    fn test_aliases_from_delimited_string() {
        let o = obj_with_aliases(v_str("stick, staff  rod"));
        assert_eq!(o.aliases(), vec!["stick", "staff", "rod"]);
    }

    #[test]
    fn test_aliases_absent() {
        let mut o = obj_with_aliases(v_str(""));
        o.properties.clear();
        assert!(o.aliases().is_empty());
    }
}
