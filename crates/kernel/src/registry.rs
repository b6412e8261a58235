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

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::host::{CompileCache, CompiledUnit};
use fen_common::model::{FunctionDef, VerbDef, WorldError};
use fen_var::ObjId;

/// A verb with its compiled body. In-flight executions hold the `Arc` and
/// keep running against the unit they started with even if a reload swaps
/// the registry out from under them.
pub struct VerbEntry {
    pub def: VerbDef,
    pub unit: Arc<dyn CompiledUnit>,
}

pub struct FunctionEntry {
    pub def: FunctionDef,
    pub unit: Arc<dyn CompiledUnit>,
}

/// An immutable snapshot of all code attached to the world: verbs indexed by
/// owner and by leading command word, functions keyed by (owner, name).
///
/// Built whole, swapped whole; never mutated in place.
#[derive(Default)]
pub struct Registry {
    verbs_by_owner: HashMap<ObjId, Vec<Arc<VerbEntry>>>,
    verbs_by_token: HashMap<String, Vec<Arc<VerbEntry>>>,
    functions: HashMap<(ObjId, String), Arc<FunctionEntry>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile every body and index the results. Any compile failure fails
    /// the whole build; the caller keeps whatever registry it already had.
    pub fn build(
        verbs: Vec<VerbDef>,
        functions: Vec<FunctionDef>,
        cache: &CompileCache,
    ) -> Result<Self, WorldError> {
        let mut registry = Self::empty();
        for def in verbs {
            let unit = cache.compile(&def.body).map_err(|e| {
                WorldError::ScriptError(format!(
                    "verb {}:{} failed to compile: {e}",
                    def.owner, def.name
                ))
            })?;
            let entry = Arc::new(VerbEntry { def, unit });
            registry
                .verbs_by_owner
                .entry(entry.def.owner.clone())
                .or_default()
                .push(entry.clone());
            for pattern in &entry.def.patterns {
                let token = pattern.first_token().to_string();
                let bucket = registry.verbs_by_token.entry(token).or_default();
                if !bucket.iter().any(|e| Arc::ptr_eq(e, &entry)) {
                    bucket.push(entry.clone());
                }
            }
        }
        for def in functions {
            def.validate()?;
            let key = (def.owner.clone(), def.name.clone());
            if registry.functions.contains_key(&key) {
                return Err(WorldError::Conflict(format!(
                    "duplicate function {}:{}",
                    def.owner, def.name
                )));
            }
            let unit = cache.compile(&def.body).map_err(|e| {
                WorldError::ScriptError(format!(
                    "function {}:{} failed to compile: {e}",
                    def.owner, def.name
                ))
            })?;
            registry
                .functions
                .insert(key, Arc::new(FunctionEntry { def, unit }));
        }
        Ok(registry)
    }

    /// Verbs defined directly on `owner`.
    pub fn lookup_verbs_on(&self, owner: &ObjId) -> &[Arc<VerbEntry>] {
        self.verbs_by_owner
            .get(owner)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Verbs applicable to an object: its own, then each class on its parent
    /// chain, nearest first. `depth` is 0 for the object itself, 1 for its
    /// class, and so on; callers walking nearest-first get shadowing for
    /// free by keeping the first (name, pattern signature) they see.
    pub fn lookup_verbs_inherited(
        &self,
        object: &ObjId,
        class_chain: &[ObjId],
    ) -> Vec<(usize, Arc<VerbEntry>)> {
        let mut out = Vec::new();
        for entry in self.lookup_verbs_on(object) {
            out.push((0, entry.clone()));
        }
        for (i, class) in class_chain.iter().enumerate() {
            for entry in self.lookup_verbs_on(class) {
                out.push((i + 1, entry.clone()));
            }
        }
        out
    }

    /// Quick pruning index: every verb any of whose patterns starts with the
    /// given command word (lowercase).
    pub fn verbs_for_token(&self, token: &str) -> &[Arc<VerbEntry>] {
        self.verbs_by_token
            .get(token)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get_function(&self, owner: &ObjId, name: &str) -> Option<Arc<FunctionEntry>> {
        self.functions.get(&(owner.clone(), name.to_string())).cloned()
    }

    pub fn verb_count(&self) -> usize {
        self.verbs_by_owner.values().map(Vec::len).sum()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

/// The single atomic reference every dispatcher reads through. A dispatch
/// loads the snapshot once and uses it for its whole run; the supervisor
/// publishes a new one with `swap`.
pub struct RegistryRef {
    current: ArcSwap<Registry>,
}

impl RegistryRef {
    pub fn new(registry: Registry) -> Self {
        Self {
            current: ArcSwap::from_pointee(registry),
        }
    }

    pub fn load(&self) -> Arc<Registry> {
        self.current.load_full()
    }

    /// Publish a new snapshot, returning the one it replaced. Supervisor
    /// only.
    pub fn swap(&self, next: Arc<Registry>) -> Arc<Registry> {
        self.current.swap(next)
    }
}

impl Default for RegistryRef {
    fn default() -> Self {
        Self::new(Registry::empty())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::testing::test_cache;
    use fen_common::model::VerbPattern;

    fn verb(owner: &str, name: &str, patterns: &[&str], body: &str) -> VerbDef {
        VerbDef {
            id: Uuid::new_v4(),
            owner: ObjId::from(owner),
            name: name.to_string(),
            patterns: patterns
                .iter()
                .map(|p| VerbPattern::parse(p).unwrap())
                .collect(),
            body: body.to_string(),
            permission: None,
            enabled: true,
            author: "test".to_string(),
            created_at: None,
        }
    }

    #[test]
    fn test_build_and_lookup() {
        let cache = test_cache();
        let registry = Registry::build(
            vec![
                verb("class-a", "ping", &["ping"], "emit pong"),
                verb("obj-1", "look", &["look", "look at dobj"], "look"),
            ],
            vec![],
            &cache,
        )
        .unwrap();

        assert_eq!(registry.verb_count(), 2);
        assert_eq!(registry.lookup_verbs_on(&ObjId::from("obj-1")).len(), 1);
        assert_eq!(registry.verbs_for_token("ping").len(), 1);
        assert_eq!(registry.verbs_for_token("look").len(), 1);
        assert_eq!(registry.verbs_for_token("missing").len(), 0);
    }

    #[test]
    fn test_inherited_walk_nearest_first() {
        let cache = test_cache();
        let registry = Registry::build(
            vec![
                verb("obj-1", "wield", &["wield <w>"], "emit instance"),
                verb("class-sword", "wield", &["wield <w>"], "emit sword"),
                verb("class-weapon", "wield", &["wield <w>"], "emit weapon"),
            ],
            vec![],
            &cache,
        )
        .unwrap();

        let chain = vec![ObjId::from("class-sword"), ObjId::from("class-weapon")];
        let found = registry.lookup_verbs_inherited(&ObjId::from("obj-1"), &chain);
        let depths: Vec<usize> = found.iter().map(|(d, _)| *d).collect();
        assert_eq!(depths, vec![0, 1, 2]);
        assert_eq!(found[0].1.def.body, "emit instance");
        assert_eq!(found[2].1.def.body, "emit weapon");
    }

    #[test]
    fn test_compile_failure_fails_build() {
        let cache = test_cache();
        let result = Registry::build(
            vec![verb("obj-1", "broken", &["broken"], "no_such_native x")],
            vec![],
            &cache,
        );
        assert!(matches!(result, Err(WorldError::ScriptError(_))));
    }

    #[test]
    fn test_duplicate_function_name_rejected() {
        let cache = test_cache();
        let mk = |name: &str| fen_common::model::FunctionDef {
            id: Uuid::new_v4(),
            owner: ObjId::from("obj-1"),
            name: name.to_string(),
            params: vec![],
            returns: fen_common::model::TypeTag::Void,
            body: "emit x".to_string(),
        };
        let result = Registry::build(vec![], vec![mk("f"), mk("f")], &cache);
        assert!(matches!(result, Err(WorldError::Conflict(_))));
    }

    #[test]
    fn test_swap_returns_previous() {
        let registry_ref = RegistryRef::default();
        let first = registry_ref.load();
        let old = registry_ref.swap(Arc::new(Registry::empty()));
        assert!(Arc::ptr_eq(&first, &old));
    }
}
