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

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::locks::LockTable;
use crate::store::{ObjectStore, StoreTx, collections, find_docs, get_doc, put_doc};
use fen_common::matching::ResolveEnv;
use fen_common::model::{
    EXIT_CLASS_NAME, GameObject, ObjectClass, PROP_IS_SYSTEM_OBJECT, ROOT_CLASS_NAME,
    SYSTEM_OBJECT_NAME, WorldError,
};
use fen_var::{Dbref, ObjId, Var};

const DBREF_COUNTER_KEY: &str = "dbref";

/// The world model: classes, instances, properties, containment, dbrefs.
///
/// Reads go straight to the store; mutations take per-object locks through
/// the [`LockTable`] so concurrent movers and property writers serialize on
/// exactly the objects they touch.
pub struct WorldState {
    store: Arc<dyn ObjectStore>,
    locks: LockTable,
    // ensure_dbref is a read-bump-write on a shared counter; one mutex keeps
    // allocations from racing between the read and the commit.
    dbref_alloc: Mutex<()>,
}

impl WorldState {
    /// Open the world over a store: seed the root class, exit class, and
    /// system object if absent, and normalize legacy quoted string
    /// properties.
    pub fn open(store: Arc<dyn ObjectStore>) -> Result<Self, WorldError> {
        let world = Self {
            store,
            locks: LockTable::new(),
            dbref_alloc: Mutex::new(()),
        };
        world.bootstrap()?;
        world.normalize_quoted_properties()?;
        Ok(world)
    }

    fn bootstrap(&self) -> Result<(), WorldError> {
        let root = match self.class_named(ROOT_CLASS_NAME)? {
            Some(c) => c,
            None => {
                info!("Seeding root class {ROOT_CLASS_NAME}");
                self.create_root_class()?
            }
        };
        if self.class_named(EXIT_CLASS_NAME)?.is_none() {
            info!("Seeding exit class {EXIT_CLASS_NAME}");
            self.create_class(EXIT_CLASS_NAME, Some(&root.id), "A way out of somewhere.")?;
        }
        if self.system_object()?.is_none() {
            info!("Seeding system object");
            let mut system = self.create_instance(&root.id)?;
            system.name = SYSTEM_OBJECT_NAME.to_string();
            system
                .properties
                .insert(PROP_IS_SYSTEM_OBJECT.to_string(), Var::Bool(true));
            self.put_object(&system)?;
        }
        Ok(())
    }

    fn create_root_class(&self) -> Result<ObjectClass, WorldError> {
        let class = ObjectClass {
            id: ObjId::generate(),
            name: ROOT_CLASS_NAME.to_string(),
            parent: None,
            description: "The root of all things.".to_string(),
            properties: Default::default(),
        };
        put_doc(&*self.store, collections::CLASSES, class.id.as_str(), &class)?;
        Ok(class)
    }

    // ------------------------------------------------------------------
    // Classes

    pub fn create_class(
        &self,
        name: &str,
        parent: Option<&ObjId>,
        description: &str,
    ) -> Result<ObjectClass, WorldError> {
        let parent_id = match parent {
            Some(p) => {
                self.get_class(p)?;
                Some(p.clone())
            }
            None => Some(self.root_class()?.id),
        };
        let class = ObjectClass {
            id: ObjId::generate(),
            name: name.to_string(),
            parent: parent_id,
            description: description.to_string(),
            properties: Default::default(),
        };
        put_doc(&*self.store, collections::CLASSES, class.id.as_str(), &class)?;
        Ok(class)
    }

    pub fn get_class(&self, id: &ObjId) -> Result<ObjectClass, WorldError> {
        get_doc(&*self.store, collections::CLASSES, id.as_str())?
            .ok_or_else(|| WorldError::NotFound(format!("class {id}")))
    }

    pub fn class_named(&self, name: &str) -> Result<Option<ObjectClass>, WorldError> {
        let mut found: Vec<ObjectClass> =
            find_docs(&*self.store, collections::CLASSES, |c: &ObjectClass| {
                c.name == name
            })?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.remove(0))
        })
    }

    pub fn root_class(&self) -> Result<ObjectClass, WorldError> {
        self.class_named(ROOT_CLASS_NAME)?
            .ok_or_else(|| WorldError::NotFound("root class".to_string()))
    }

    /// The chain from `id` up to the root, inclusive. A cycle in stored data
    /// is reported as a conflict rather than looping forever.
    pub fn class_chain(&self, id: &ObjId) -> Result<Vec<ObjectClass>, WorldError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(id.clone());
        while let Some(current) = cursor {
            if !seen.insert(current.clone()) {
                return Err(WorldError::Conflict(format!(
                    "class parent chain of {id} is cyclic"
                )));
            }
            let class = self.get_class(&current)?;
            cursor = class.parent.clone();
            chain.push(class);
        }
        Ok(chain)
    }

    /// `class` itself and every class below it.
    pub fn subclasses_of(&self, class: &ObjId) -> Result<Vec<ObjId>, WorldError> {
        let all: Vec<ObjectClass> = find_docs(&*self.store, collections::CLASSES, |_| true)?;
        let mut members: HashSet<ObjId> = HashSet::from([class.clone()]);
        // Parent links only go up, so iterate until closure.
        loop {
            let before = members.len();
            for c in &all {
                if let Some(parent) = &c.parent
                    && members.contains(parent)
                {
                    members.insert(c.id.clone());
                }
            }
            if members.len() == before {
                break;
            }
        }
        Ok(all
            .iter()
            .filter(|c| members.contains(&c.id))
            .map(|c| c.id.clone())
            .collect())
    }

    /// Edit a class's own property bag. Instance writes never land here.
    pub fn set_class_property(
        &self,
        class: &ObjId,
        key: &str,
        value: Var,
    ) -> Result<(), WorldError> {
        let _guard = self.locks.acquire(BTreeSet::from([class.clone()]));
        let mut c = self.get_class(class)?;
        if value.is_none() {
            c.properties.remove(key);
        } else {
            c.properties.insert(key.to_string(), value);
        }
        put_doc(&*self.store, collections::CLASSES, c.id.as_str(), &c)?;
        Ok(())
    }

    pub fn delete_class(&self, id: &ObjId) -> Result<(), WorldError> {
        let class = self.get_class(id)?;
        if class.name == ROOT_CLASS_NAME {
            return Err(WorldError::Conflict("cannot delete the root class".into()));
        }
        let instances = self.find_by_class(id, false)?;
        if !instances.is_empty() {
            return Err(WorldError::Conflict(format!(
                "class {} still has {} instance(s)",
                class.name,
                instances.len()
            )));
        }
        let children: Vec<ObjectClass> =
            find_docs(&*self.store, collections::CLASSES, |c: &ObjectClass| {
                c.parent.as_ref() == Some(id)
            })?;
        if !children.is_empty() {
            return Err(WorldError::Conflict(format!(
                "class {} still has subclasses",
                class.name
            )));
        }
        self.store
            .delete(collections::CLASSES, id.as_str())
            .map_err(WorldError::from)
    }

    // ------------------------------------------------------------------
    // Objects

    pub fn create_instance(&self, class: &ObjId) -> Result<GameObject, WorldError> {
        let class_doc = self.get_class(class)?;
        let object = GameObject {
            id: ObjId::generate(),
            dbref: None,
            class: class.clone(),
            name: class_doc.name,
            location: None,
            properties: Default::default(),
        };
        self.put_object(&object)?;
        Ok(object)
    }

    pub fn get_object(&self, id: &ObjId) -> Result<GameObject, WorldError> {
        get_doc(&*self.store, collections::OBJECTS, id.as_str())?
            .ok_or_else(|| WorldError::NotFound(format!("object {id}")))
    }

    pub fn object_exists(&self, id: &ObjId) -> Result<bool, WorldError> {
        Ok(get_doc::<GameObject>(&*self.store, collections::OBJECTS, id.as_str())?.is_some())
    }

    fn put_object(&self, object: &GameObject) -> Result<(), WorldError> {
        put_doc(
            &*self.store,
            collections::OBJECTS,
            object.id.as_str(),
            object,
        )?;
        Ok(())
    }

    pub fn rename(&self, id: &ObjId, name: &str) -> Result<(), WorldError> {
        let _guard = self.locks.acquire(BTreeSet::from([id.clone()]));
        let mut object = self.get_object(id)?;
        object.name = name.to_string();
        self.put_object(&object)
    }

    pub fn delete_object(&self, id: &ObjId) -> Result<(), WorldError> {
        let _guard = self.locks.acquire(BTreeSet::from([id.clone()]));
        let object = self.get_object(id)?;
        let contents = self.contents_of(id)?;
        if !contents.is_empty() {
            return Err(WorldError::Conflict(format!(
                "{} still contains {} object(s)",
                object.name,
                contents.len()
            )));
        }
        self.store
            .delete(collections::OBJECTS, id.as_str())
            .map_err(WorldError::from)
    }

    // ------------------------------------------------------------------
    // Properties

    /// Prototype-chain lookup: the instance's own bag first, then its class
    /// and the class's ancestors, nearest first. Absent everywhere is
    /// `Var::None`.
    pub fn get_property(&self, id: &ObjId, key: &str) -> Result<Var, WorldError> {
        let object = self.get_object(id)?;
        if let Some(v) = object.own_property(key) {
            return Ok(v.clone());
        }
        for class in self.class_chain(&object.class)? {
            if let Some(v) = class.properties.get(key) {
                return Ok(v.clone());
            }
        }
        Ok(Var::None)
    }

    /// Writes always land in the instance bag. Writing `Var::None` removes
    /// the override, re-exposing whatever the class chain provides.
    pub fn set_property(&self, id: &ObjId, key: &str, value: Var) -> Result<(), WorldError> {
        let _guard = self.locks.acquire(BTreeSet::from([id.clone()]));
        let mut object = self.get_object(id)?;
        if value.is_none() {
            object.properties.remove(key);
        } else {
            object.properties.insert(key.to_string(), value);
        }
        self.put_object(&object)
    }

    // ------------------------------------------------------------------
    // Containment

    /// Move an object. Fails with a conflict if the destination is the moving
    /// object or anything beneath it. Takes the mover, the old location, and
    /// the new location as one lock set so the cycle check and the write are
    /// atomic against concurrent moves.
    pub fn move_object(&self, id: &ObjId, new_location: Option<&ObjId>) -> Result<(), WorldError> {
        let object = self.get_object(id)?;

        let mut lock_ids = BTreeSet::from([id.clone()]);
        if let Some(old) = &object.location {
            lock_ids.insert(old.clone());
        }
        if let Some(new) = new_location {
            lock_ids.insert(new.clone());
        }
        let _guard = self.locks.acquire(lock_ids);

        if let Some(dest) = new_location {
            self.get_object(dest)?;
            // Walk up from the destination; hitting the mover means the
            // destination sits inside it.
            let mut seen = HashSet::new();
            let mut cursor = Some(dest.clone());
            while let Some(current) = cursor {
                if current == *id {
                    return Err(WorldError::Conflict(format!(
                        "moving {} into {} would create a containment cycle",
                        id, dest
                    )));
                }
                if !seen.insert(current.clone()) {
                    return Err(WorldError::Conflict(format!(
                        "containment above {dest} is cyclic"
                    )));
                }
                cursor = self.get_object(&current)?.location;
            }
        }

        // Re-read under the lock; the containment link may have changed
        // between the unlocked read and acquisition.
        let mut object = self.get_object(id)?;
        object.location = new_location.cloned();
        self.put_object(&object)
    }

    /// Everything whose location is `id`, in store key order.
    pub fn contents_of(&self, id: &ObjId) -> Result<Vec<GameObject>, WorldError> {
        Ok(find_docs(
            &*self.store,
            collections::OBJECTS,
            |o: &GameObject| o.location.as_ref() == Some(id),
        )?)
    }

    pub fn find_by_class(
        &self,
        class: &ObjId,
        include_subclasses: bool,
    ) -> Result<Vec<GameObject>, WorldError> {
        if include_subclasses {
            let members: HashSet<ObjId> = self.subclasses_of(class)?.into_iter().collect();
            Ok(find_docs(
                &*self.store,
                collections::OBJECTS,
                |o: &GameObject| members.contains(&o.class),
            )?)
        } else {
            Ok(find_docs(
                &*self.store,
                collections::OBJECTS,
                |o: &GameObject| o.class == *class,
            )?)
        }
    }

    /// Exits contained in `location`: contents whose class chain reaches the
    /// exit class.
    pub fn exits_of(&self, location: &ObjId) -> Result<Vec<GameObject>, WorldError> {
        let mut exits = Vec::new();
        for object in self.contents_of(location)? {
            if self.object_is_exit(&object)? {
                exits.push(object);
            }
        }
        Ok(exits)
    }

    fn object_is_exit(&self, object: &GameObject) -> Result<bool, WorldError> {
        Ok(self
            .class_chain(&object.class)?
            .iter()
            .any(|c| c.name == EXIT_CLASS_NAME))
    }

    // ------------------------------------------------------------------
    // Dbrefs

    /// Assign a dbref if the object has none, from a persisted monotone
    /// counter. The counter bump and the object write commit in one
    /// transaction, so a crash cannot hand the same number out twice.
    pub fn ensure_dbref(&self, id: &ObjId) -> Result<Dbref, WorldError> {
        let _alloc = self.dbref_alloc.lock().unwrap();
        let object = self.get_object(id)?;
        if let Some(dbref) = object.dbref {
            return Ok(dbref);
        }

        let mut tx = StoreTx::new(&*self.store);
        let next = match tx
            .get(collections::COUNTERS, DBREF_COUNTER_KEY)
            .map_err(WorldError::from)?
        {
            Some(raw) => {
                let current: i64 =
                    crate::store::decode(collections::COUNTERS, DBREF_COUNTER_KEY, &raw)?;
                current + 1
            }
            None => 1,
        };
        if next == i64::MAX {
            return Err(WorldError::Conflict("dbref space exhausted".into()));
        }
        let dbref = Dbref(next);
        let mut object = object;
        object.dbref = Some(dbref);
        tx.upsert(
            collections::COUNTERS,
            DBREF_COUNTER_KEY,
            crate::store::encode(&next),
        );
        tx.upsert(
            collections::OBJECTS,
            object.id.as_str(),
            crate::store::encode(&object),
        );
        tx.commit().map_err(WorldError::from)?;
        Ok(dbref)
    }

    pub fn object_by_dbref(&self, dbref: Dbref) -> Result<Option<GameObject>, WorldError> {
        let mut found: Vec<GameObject> =
            find_docs(&*self.store, collections::OBJECTS, |o: &GameObject| {
                o.dbref == Some(dbref)
            })?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.remove(0))
        })
    }

    pub fn system_object(&self) -> Result<Option<GameObject>, WorldError> {
        let flagged: Vec<GameObject> =
            find_docs(&*self.store, collections::OBJECTS, |o: &GameObject| {
                matches!(
                    o.own_property(PROP_IS_SYSTEM_OBJECT),
                    Some(Var::Bool(true))
                )
            })?;
        if let Some(first) = flagged.into_iter().next() {
            return Ok(Some(first));
        }
        let named: Vec<GameObject> =
            find_docs(&*self.store, collections::OBJECTS, |o: &GameObject| {
                o.name == SYSTEM_OBJECT_NAME
            })?;
        Ok(named.into_iter().next())
    }

    // ------------------------------------------------------------------
    // Legacy data repair

    /// Older dumps stored some string properties with one layer of
    /// surrounding double quotes. Normalize them once on load; nothing at
    /// read time ever strips quotes.
    fn normalize_quoted_properties(&self) -> Result<(), WorldError> {
        fn strip(bag: &mut std::collections::BTreeMap<String, Var>) -> usize {
            let mut fixed = 0;
            for value in bag.values_mut() {
                if let Var::Str(s) = value
                    && s.len() >= 2
                    && s.starts_with('"')
                    && s.ends_with('"')
                {
                    *value = Var::Str(s[1..s.len() - 1].to_string());
                    fixed += 1;
                }
            }
            fixed
        }

        let mut fixed = 0;
        let objects: Vec<GameObject> = find_docs(&*self.store, collections::OBJECTS, |_| true)?;
        for mut object in objects {
            let n = strip(&mut object.properties);
            if n > 0 {
                fixed += n;
                self.put_object(&object)?;
            }
        }
        let classes: Vec<ObjectClass> = find_docs(&*self.store, collections::CLASSES, |_| true)?;
        for mut class in classes {
            let n = strip(&mut class.properties);
            if n > 0 {
                fixed += n;
                put_doc(&*self.store, collections::CLASSES, class.id.as_str(), &class)?;
            }
        }
        if fixed > 0 {
            warn!(fixed, "Normalized legacy quoted string properties");
        }
        Ok(())
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

/// The resolver sees the world through this narrowed surface.
impl ResolveEnv for WorldState {
    fn obj_exists(&self, id: &ObjId) -> Result<bool, WorldError> {
        self.object_exists(id)
    }

    fn location_of(&self, id: &ObjId) -> Result<Option<ObjId>, WorldError> {
        Ok(self.get_object(id)?.location)
    }

    fn contents_of(&self, id: &ObjId) -> Result<Vec<ObjId>, WorldError> {
        Ok(WorldState::contents_of(self, id)?
            .into_iter()
            .map(|o| o.id)
            .collect())
    }

    fn display_name(&self, id: &ObjId) -> Result<String, WorldError> {
        Ok(self.get_object(id)?.name)
    }

    fn property(&self, id: &ObjId, key: &str) -> Result<Var, WorldError> {
        self.get_property(id, key)
    }

    fn class_of(&self, id: &ObjId) -> Result<ObjId, WorldError> {
        Ok(self.get_object(id)?.class)
    }

    fn is_exit(&self, id: &ObjId) -> Result<bool, WorldError> {
        let object = self.get_object(id)?;
        self.object_is_exit(&object)
    }

    fn by_dbref(&self, dbref: Dbref) -> Result<Option<ObjId>, WorldError> {
        Ok(self.object_by_dbref(dbref)?.map(|o| o.id))
    }

    fn system_object(&self) -> Result<Option<ObjId>, WorldError> {
        Ok(WorldState::system_object(self)?.map(|o| o.id))
    }
}
