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

pub use crate::model::functions::{FunctionDef, Param, ParamSpec, TypeTag};
pub use crate::model::objects::{
    EXIT_CLASS_NAME, GameObject, ObjectClass, PROP_ALIASES, PROP_DESCRIPTION, PROP_DESTINATION,
    PROP_DIRECTION, PROP_IS_SYSTEM_OBJECT, PROP_NAME, PROP_TYPE, ROOT_CLASS_NAME,
    SYSTEM_OBJECT_NAME, parse_aliases,
};
pub use crate::model::players::{PERM_ADMIN, PERM_BUILDER, Player};
pub use crate::model::verbs::{PatternToken, VerbDef, VerbPattern};

use thiserror::Error;

mod functions;
mod objects;
mod players;
mod verbs;

/// Errors for world operations, dispatch, and script execution.
///
/// These are values, not panics: everything here flows back to the dispatch
/// loop as a result. Only store I/O is allowed to unwind past a dispatch, and
/// it is caught and logged at the session boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorldError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("ambiguous match: {0}")]
    Ambiguous(String),
    #[error("permission denied")]
    PermissionDenied,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("script error: {0}")]
    ScriptError(String),
    #[error("execution time budget exceeded")]
    Timeout,
    #[error("i/o error: {0}")]
    Io(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl WorldError {
    /// The line shown to a player when this error surfaces from a command.
    /// Debug detail stays in the logs unless the server runs in debug mode.
    pub fn player_message(&self, debug: bool) -> String {
        match self {
            WorldError::NotFound(what) => format!("There is no \"{what}\" here."),
            WorldError::Ambiguous(what) => format!("Which \"{what}\" do you mean?"),
            WorldError::PermissionDenied => "You can't do that.".to_string(),
            WorldError::InvalidInput(_) => "I don't understand that.".to_string(),
            WorldError::Timeout => "That took too long and was stopped.".to_string(),
            WorldError::ScriptError(detail) => {
                if debug {
                    format!("Something went wrong: {detail}")
                } else {
                    "Something went wrong.".to_string()
                }
            }
            WorldError::Io(_) | WorldError::Conflict(_) => {
                if debug {
                    format!("Something went wrong: {self}")
                } else {
                    "Something went wrong.".to_string()
                }
            }
        }
    }
}
