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

//! An in-memory `ResolveEnv` for exercising the matching code without a
//! world state behind it.

use std::collections::BTreeMap;

use crate::matching::resolver::ResolveEnv;
use crate::model::{PROP_DIRECTION, PROP_IS_SYSTEM_OBJECT, WorldError};
use fen_var::{Dbref, ObjId, Var, v_bool, v_str};

struct MockObject {
    name: String,
    location: Option<ObjId>,
    class: ObjId,
    properties: BTreeMap<String, Var>,
    dbref: Option<i64>,
    is_exit: bool,
}

#[derive(Default)]
pub struct MockEnv {
    // Insertion-ordered; contents_of preserves this order.
    objects: Vec<(ObjId, MockObject)>,
    next_id: u32,
}

impl MockEnv {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&mut self) -> ObjId {
        self.next_id += 1;
        ObjId::from(format!("mock-{:04}", self.next_id))
    }

    fn insert(&mut self, name: &str, location: Option<&ObjId>, is_exit: bool) -> ObjId {
        let id = self.mint();
        let class = ObjId::from(if is_exit { "class-exit" } else { "class-thing" });
        self.objects.push((
            id.clone(),
            MockObject {
                name: name.to_string(),
                location: location.cloned(),
                class,
                properties: BTreeMap::new(),
                dbref: None,
                is_exit,
            },
        ));
        id
    }

    pub fn add_room(&mut self, name: &str) -> ObjId {
        self.insert(name, None, false)
    }

    pub fn add_object(&mut self, name: &str, location: Option<&ObjId>) -> ObjId {
        self.insert(name, location, false)
    }

    pub fn add_exit(&mut self, name: &str, direction: &str, room: &ObjId) -> ObjId {
        let id = self.insert(name, Some(room), true);
        self.set_property(&id, PROP_DIRECTION, v_str(direction));
        id
    }

    pub fn add_system_object(&mut self) -> ObjId {
        let id = self.insert("System Core", None, false);
        self.set_property(&id, PROP_IS_SYSTEM_OBJECT, v_bool(true));
        id
    }

    pub fn set_property(&mut self, id: &ObjId, key: &str, value: Var) {
        let obj = self
            .objects
            .iter_mut()
            .find(|(oid, _)| oid == id)
            .map(|(_, o)| o)
            .expect("unknown mock object");
        obj.properties.insert(key.to_string(), value);
    }

    pub fn set_dbref(&mut self, id: &ObjId, dbref: i64) {
        let obj = self
            .objects
            .iter_mut()
            .find(|(oid, _)| oid == id)
            .map(|(_, o)| o)
            .expect("unknown mock object");
        obj.dbref = Some(dbref);
    }

    pub fn ids_by_name(&self, name: &str) -> Vec<ObjId> {
        self.objects
            .iter()
            .filter(|(_, o)| o.name == name)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn get(&self, id: &ObjId) -> Result<&MockObject, WorldError> {
        self.objects
            .iter()
            .find(|(oid, _)| oid == id)
            .map(|(_, o)| o)
            .ok_or_else(|| WorldError::NotFound(id.to_string()))
    }
}

impl ResolveEnv for MockEnv {
    fn obj_exists(&self, id: &ObjId) -> Result<bool, WorldError> {
        Ok(self.objects.iter().any(|(oid, _)| oid == id))
    }

    fn location_of(&self, id: &ObjId) -> Result<Option<ObjId>, WorldError> {
        Ok(self.get(id)?.location.clone())
    }

    fn contents_of(&self, id: &ObjId) -> Result<Vec<ObjId>, WorldError> {
        Ok(self
            .objects
            .iter()
            .filter(|(_, o)| o.location.as_ref() == Some(id))
            .map(|(oid, _)| oid.clone())
            .collect())
    }

    fn display_name(&self, id: &ObjId) -> Result<String, WorldError> {
        Ok(self.get(id)?.name.clone())
    }

    fn property(&self, id: &ObjId, key: &str) -> Result<Var, WorldError> {
        Ok(self
            .get(id)?
            .properties
            .get(key)
            .cloned()
            .unwrap_or(Var::None))
    }

    fn class_of(&self, id: &ObjId) -> Result<ObjId, WorldError> {
        Ok(self.get(id)?.class.clone())
    }

    fn is_exit(&self, id: &ObjId) -> Result<bool, WorldError> {
        Ok(self.get(id)?.is_exit)
    }

    fn by_dbref(&self, dbref: Dbref) -> Result<Option<ObjId>, WorldError> {
        Ok(self
            .objects
            .iter()
            .find(|(_, o)| o.dbref == Some(dbref.0))
            .map(|(id, _)| id.clone()))
    }

    fn system_object(&self) -> Result<Option<ObjId>, WorldError> {
        Ok(self
            .objects
            .iter()
            .find(|(_, o)| {
                matches!(
                    o.properties.get(PROP_IS_SYSTEM_OBJECT),
                    Some(Var::Bool(true))
                ) || o.name == "system"
            })
            .map(|(id, _)| id.clone()))
    }
}
