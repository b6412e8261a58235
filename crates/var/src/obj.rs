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

/// The identity of an object, class, or player in the world.
///
/// Identity strings are chosen by the persistence provider and are opaque to
/// everything above it. Equality and ordering are byte-wise; ordering is what
/// the world state uses to take multi-object locks without deadlocking.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjId(String);

impl ObjId {
    /// Mint a fresh identity. Only the store should need to do this.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ObjId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for ObjId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stable small-integer alias for a game object, printed as `#N`.
///
/// Once assigned, a dbref never changes and is never reused, even across
/// server restarts.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dbref(pub i64);

impl Dbref {
    pub fn parse(s: &str) -> Option<Self> {
        let digits = s.strip_prefix('#')?;
        let n = digits.parse::<i64>().ok()?;
        (n > 0).then_some(Self(n))
    }
}

impl Display for Dbref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dbref_parse() {
        assert_eq!(Dbref::parse("#42"), Some(Dbref(42)));
        assert_eq!(Dbref::parse("42"), None);
        assert_eq!(Dbref::parse("#0"), None);
        assert_eq!(Dbref::parse("#-3"), None);
        assert_eq!(Dbref::parse("#4x"), None);
    }

    #[test]
    fn test_dbref_display() {
        assert_eq!(Dbref(7).to_string(), "#7");
    }

    #[test]
    fn test_objid_ordering_is_bytewise() {
        let a = ObjId::from("a");
        let b = ObjId::from("b");
        assert!(a < b);
    }
}
