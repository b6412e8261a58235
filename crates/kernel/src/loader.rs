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

//! The on-disk verb and function format: one definition per file, a JSON
//! header, a `---` separator line, then the opaque source body. These trees
//! are what the reload supervisor watches.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fen_common::model::{
    FunctionDef, Param, ParamSpec, TypeTag, VerbDef, VerbPattern, WorldError,
};
use fen_db::WorldState;
use fen_var::ObjId;

pub const VERB_EXTENSION: &str = "verb";
pub const FUNCTION_EXTENSION: &str = "func";
const SEPARATOR: &str = "---";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerbFileHeader {
    pub name: String,
    /// `class:<Name>`, `system`, or a raw identity string.
    pub owner: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub permission: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionFileHeader {
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    #[serde(default = "default_returns")]
    pub returns: String,
}

fn default_enabled() -> bool {
    true
}

fn default_returns() -> String {
    "void".to_string()
}

/// Split a source file into its JSON header and body.
pub fn parse_source_file(text: &str) -> Result<(String, String), WorldError> {
    let mut header = String::new();
    let mut lines = text.lines();
    for line in lines.by_ref() {
        if line.trim() == SEPARATOR {
            let body = lines.collect::<Vec<_>>().join("\n");
            return Ok((header, body));
        }
        header.push_str(line);
        header.push('\n');
    }
    Err(WorldError::InvalidInput(format!(
        "missing {SEPARATOR:?} separator between header and body"
    )))
}

/// Resolve a header's owner reference against the world.
fn resolve_owner(world: &WorldState, owner: &str) -> Result<ObjId, WorldError> {
    if let Some(class_name) = owner.strip_prefix("class:") {
        return world
            .class_named(class_name)?
            .map(|c| c.id)
            .ok_or_else(|| WorldError::NotFound(format!("class {class_name:?}")));
    }
    if owner == "system" {
        return world
            .system_object()?
            .map(|o| o.id)
            .ok_or_else(|| WorldError::NotFound("system object".to_string()));
    }
    let id = ObjId::from(owner);
    if world.object_exists(&id)? || world.get_class(&id).is_ok() {
        return Ok(id);
    }
    Err(WorldError::NotFound(format!("verb owner {owner:?}")))
}

pub fn verb_from_source(
    world: &WorldState,
    text: &str,
    origin: &str,
) -> Result<VerbDef, WorldError> {
    let (header_text, body) = parse_source_file(text)?;
    let header: VerbFileHeader = serde_json::from_str(&header_text)
        .map_err(|e| WorldError::InvalidInput(format!("{origin}: bad verb header: {e}")))?;

    let pattern_texts = if header.patterns.is_empty() {
        vec![header.name.clone()]
    } else {
        header.patterns
    };
    let patterns = pattern_texts
        .iter()
        .map(|p| VerbPattern::parse(p))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| WorldError::InvalidInput(format!("{origin}: {e}")))?;

    Ok(VerbDef {
        id: Uuid::new_v4(),
        owner: resolve_owner(world, &header.owner)?,
        name: header.name,
        patterns,
        body,
        permission: header.permission,
        enabled: header.enabled,
        author: header.author,
        created_at: header.created_at,
    })
}

pub fn function_from_source(
    world: &WorldState,
    text: &str,
    origin: &str,
) -> Result<FunctionDef, WorldError> {
    let (header_text, body) = parse_source_file(text)?;
    let header: FunctionFileHeader = serde_json::from_str(&header_text)
        .map_err(|e| WorldError::InvalidInput(format!("{origin}: bad function header: {e}")))?;

    let params = header
        .params
        .iter()
        .map(|p| {
            Ok(Param {
                name: p.name.clone(),
                ty: TypeTag::parse(&p.ty)?,
            })
        })
        .collect::<Result<Vec<_>, WorldError>>()
        .map_err(|e| WorldError::InvalidInput(format!("{origin}: {e}")))?;

    let def = FunctionDef {
        id: Uuid::new_v4(),
        owner: resolve_owner(world, &header.owner)?,
        name: header.name,
        params,
        returns: TypeTag::parse(&header.returns)
            .map_err(|e| WorldError::InvalidInput(format!("{origin}: {e}")))?,
        body,
    };
    def.validate()
        .map_err(|e| WorldError::InvalidInput(format!("{origin}: {e}")))?;
    Ok(def)
}

/// Render a verb definition back into file form; the daemon uses this to
/// seed the initial tree.
pub fn format_verb_file(header: &VerbFileHeader, body: &str) -> String {
    let header_json =
        serde_json::to_string_pretty(header).expect("verb header serialization cannot fail");
    format!("{header_json}\n{SEPARATOR}\n{body}\n")
}

fn collect_files(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> Result<(), WorldError> {
    if !dir.exists() {
        return Ok(());
    }
    let entries =
        std::fs::read_dir(dir).map_err(|e| WorldError::Io(format!("{}: {e}", dir.display())))?;
    for entry in entries {
        let entry = entry.map_err(|e| WorldError::Io(e.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, extension, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            out.push(path);
        }
    }
    Ok(())
}

/// Load every verb and function under the two trees. Any unreadable or
/// unparseable file fails the whole load; the caller keeps its current
/// registry.
pub fn load_tree(
    world: &WorldState,
    verbs_dir: &Path,
    functions_dir: &Path,
) -> Result<(Vec<VerbDef>, Vec<FunctionDef>), WorldError> {
    let mut verb_files = Vec::new();
    collect_files(verbs_dir, VERB_EXTENSION, &mut verb_files)?;
    verb_files.sort();

    let mut verbs = Vec::new();
    for path in verb_files {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| WorldError::Io(format!("{}: {e}", path.display())))?;
        verbs.push(verb_from_source(world, &text, &path.display().to_string())?);
    }

    let mut function_files = Vec::new();
    collect_files(functions_dir, FUNCTION_EXTENSION, &mut function_files)?;
    function_files.sort();

    let mut functions = Vec::new();
    for path in function_files {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| WorldError::Io(format!("{}: {e}", path.display())))?;
        functions.push(function_from_source(
            world,
            &text,
            &path.display().to_string(),
        )?);
    }

    Ok((verbs, functions))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use fen_db::MemStore;

    fn world() -> WorldState {
        WorldState::open(Arc::new(MemStore::new())).unwrap()
    }

    #[test]
    fn test_parse_source_file_splits_on_separator() {
        let (header, body) = parse_source_file("{\"a\": 1}\n---\nline one\nline two").unwrap();
        assert_eq!(header.trim(), "{\"a\": 1}");
        assert_eq!(body, "line one\nline two");
    }

    #[test]
    fn test_parse_source_file_requires_separator() {
        assert!(parse_source_file("{\"a\": 1}\nno separator").is_err());
    }

    #[test]
    fn test_verb_from_source() {
        let world = world();
        let text = r#"{"name": "ping", "owner": "class:Object", "author": "wizard"}
---
emit pong"#;
        let verb = verb_from_source(&world, text, "test").unwrap();
        assert_eq!(verb.name, "ping");
        assert_eq!(verb.body, "emit pong");
        assert!(verb.enabled);
        // Default pattern is the bare verb name.
        assert_eq!(verb.patterns.len(), 1);
        assert_eq!(verb.patterns[0].first_token(), "ping");
        assert_eq!(verb.owner, world.root_class().unwrap().id);
    }

    #[test]
    fn test_verb_from_source_system_owner() {
        let world = world();
        let text = "{\"name\": \"ping\", \"owner\": \"system\"}\n---\nemit pong";
        let verb = verb_from_source(&world, text, "test").unwrap();
        assert_eq!(verb.owner, world.system_object().unwrap().unwrap().id);
    }

    #[test]
    fn test_verb_from_source_rejects_unknown_owner() {
        let world = world();
        let text = "{\"name\": \"ping\", \"owner\": \"class:Missing\"}\n---\nemit pong";
        assert!(verb_from_source(&world, text, "test").is_err());
    }

    #[test]
    fn test_function_from_source_with_params() {
        let world = world();
        let text = r#"{"name": "describe_to", "owner": "class:Object",
                       "params": [{"name": "viewer", "type": "GameObject"},
                                  {"name": "verbose", "type": "bool"}],
                       "returns": "string"}
---
emit described"#;
        let f = function_from_source(&world, text, "test").unwrap();
        assert_eq!(f.name, "describe_to");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.returns, TypeTag::Str);
    }

    #[test]
    fn test_function_from_source_rejects_bad_type() {
        let world = world();
        let text = r#"{"name": "f", "owner": "class:Object",
                       "params": [{"name": "x", "type": "decimal"}]}
---
emit x"#;
        assert!(function_from_source(&world, text, "test").is_err());
    }

    #[test]
    fn test_load_tree_roundtrip() {
        let world = world();
        let dir = tempfile::tempdir().unwrap();
        let verbs_dir = dir.path().join("verbs");
        let functions_dir = dir.path().join("functions");
        std::fs::create_dir_all(verbs_dir.join("core")).unwrap();
        std::fs::create_dir_all(&functions_dir).unwrap();

        let header = VerbFileHeader {
            name: "ping".to_string(),
            owner: "class:Object".to_string(),
            patterns: vec!["ping".to_string()],
            permission: None,
            enabled: true,
            author: "wizard".to_string(),
            created_at: None,
        };
        std::fs::write(
            verbs_dir.join("core").join("ping.verb"),
            format_verb_file(&header, "emit pong"),
        )
        .unwrap();
        std::fs::write(
            functions_dir.join("noop.func"),
            "{\"name\": \"noop\", \"owner\": \"system\"}\n---\nemit nothing",
        )
        .unwrap();
        // A stray file with the wrong extension is ignored.
        std::fs::write(verbs_dir.join("README.md"), "not a verb").unwrap();

        let (verbs, functions) = load_tree(&world, &verbs_dir, &functions_dir).unwrap();
        assert_eq!(verbs.len(), 1);
        assert_eq!(verbs[0].body, "emit pong");
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "noop");
    }

    #[test]
    fn test_load_tree_missing_dirs_is_empty() {
        let world = world();
        let dir = tempfile::tempdir().unwrap();
        let (verbs, functions) = load_tree(
            &world,
            &dir.path().join("nope"),
            &dir.path().join("also-nope"),
        )
        .unwrap();
        assert!(verbs.is_empty());
        assert!(functions.is_empty());
    }
}
