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

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::WorldError;
use crate::util::is_valid_ident;
use fen_var::ObjId;

/// Declared parameter/return types for functions. A closed vocabulary:
/// `void`, `string`, `int`, `bool`, `float`, `GameObject` and `List<…>` of
/// the same.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    Void,
    Str,
    Int,
    Bool,
    Float,
    Object,
    List(Box<TypeTag>),
}

impl TypeTag {
    pub fn parse(s: &str) -> Result<Self, WorldError> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix("List<").and_then(|r| r.strip_suffix('>')) {
            let element = Self::parse(inner)?;
            if element == TypeTag::Void {
                return Err(WorldError::InvalidInput("List<void> is not a type".into()));
            }
            return Ok(TypeTag::List(Box::new(element)));
        }
        match s {
            "void" => Ok(TypeTag::Void),
            "string" => Ok(TypeTag::Str),
            "int" => Ok(TypeTag::Int),
            "bool" => Ok(TypeTag::Bool),
            "float" => Ok(TypeTag::Float),
            "GameObject" => Ok(TypeTag::Object),
            other => Err(WorldError::InvalidInput(format!(
                "unknown parameter type {other:?}"
            ))),
        }
    }
}

impl Display for TypeTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeTag::Void => write!(f, "void"),
            TypeTag::Str => write!(f, "string"),
            TypeTag::Int => write!(f, "int"),
            TypeTag::Bool => write!(f, "bool"),
            TypeTag::Float => write!(f, "float"),
            TypeTag::Object => write!(f, "GameObject"),
            TypeTag::List(e) => write!(f, "List<{e}>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: TypeTag,
}

/// A function: code attached to an object, callable from other scripts with
/// typed parameters. Within one owner, function names are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub id: Uuid,
    pub owner: ObjId,
    pub name: String,
    pub params: Vec<Param>,
    pub returns: TypeTag,
    pub body: String,
}

impl FunctionDef {
    /// Validate the declaration invariants: identifier-shaped name,
    /// identifier-shaped parameter names, no `void` parameters.
    pub fn validate(&self) -> Result<(), WorldError> {
        if !is_valid_ident(&self.name) {
            return Err(WorldError::InvalidInput(format!(
                "invalid function name {:?}",
                self.name
            )));
        }
        for p in &self.params {
            if !is_valid_ident(&p.name) {
                return Err(WorldError::InvalidInput(format!(
                    "invalid parameter name {:?} in function {}",
                    p.name, self.name
                )));
            }
            if p.ty == TypeTag::Void {
                return Err(WorldError::InvalidInput(format!(
                    "parameter {:?} of function {} cannot be void",
                    p.name, self.name
                )));
            }
        }
        Ok(())
    }
}

// Serialized form used by the on-disk function file header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("string", TypeTag::Str)]
    #[test_case("void", TypeTag::Void)]
    #[test_case("GameObject", TypeTag::Object)]
    #[test_case("List<int>", TypeTag::List(Box::new(TypeTag::Int)))]
    #[test_case("List<List<string>>", TypeTag::List(Box::new(TypeTag::List(Box::new(TypeTag::Str)))))]
    fn test_type_tag_parse(input: &str, expected: TypeTag) {
        assert_eq!(TypeTag::parse(input).unwrap(), expected);
    }

    #[test]
    fn test_type_tag_rejects_unknown() {
        assert!(TypeTag::parse("object").is_err());
        assert!(TypeTag::parse("List<void>").is_err());
        assert!(TypeTag::parse("List<int").is_err());
    }

    #[test]
    fn test_type_tag_display_roundtrip() {
        for s in ["void", "string", "List<GameObject>", "List<List<bool>>"] {
            assert_eq!(TypeTag::parse(s).unwrap().to_string(), s);
        }
    }

    fn mk_fn(name: &str, params: Vec<Param>) -> FunctionDef {
        FunctionDef {
            id: Uuid::new_v4(),
            owner: ObjId::from("o"),
            name: name.to_string(),
            params,
            returns: TypeTag::Void,
            body: String::new(),
        }
    }

    #[test]
    fn test_validate_name() {
        assert!(mk_fn("describe_to", vec![]).validate().is_ok());
        assert!(mk_fn("9bad", vec![]).validate().is_err());
    }

    #[test]
    fn test_validate_params() {
        let bad = mk_fn(
            "f",
            vec![Param {
                name: "x".into(),
                ty: TypeTag::Void,
            }],
        );
        assert!(bad.validate().is_err());
    }
}
