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

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fen_var::ObjId;

pub const PERM_ADMIN: &str = "admin";
pub const PERM_BUILDER: &str = "builder";

/// The player record behind a game object.
///
/// Shares its identity with the game object that is the player's body; the
/// `players` collection is keyed the same way as `objects`. Player names are
/// unique case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: ObjId,
    pub name: String,
    /// PHC-format salted hash, never the password itself.
    pub password_hash: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// The session currently bound to this player, if any. At most one
    /// session per player and one player per session.
    #[serde(default)]
    pub session: Option<Uuid>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Player {
    pub fn has_permission(&self, tag: &str) -> bool {
        self.permissions.contains(tag)
    }

    pub fn is_admin(&self) -> bool {
        self.has_permission(PERM_ADMIN)
    }
}
