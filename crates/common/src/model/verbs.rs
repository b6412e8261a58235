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

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::WorldError;
use fen_var::ObjId;

/// One token of a verb command pattern.
///
/// `Dobj`, `Prep` and `Iobj` are the positional markers of the classic
/// direct-object / preposition / indirect-object parse; `Capture` is a free
/// noun phrase bound to a named pattern variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternToken {
    Literal(String),
    Capture(String),
    Dobj,
    Prep,
    Iobj,
}

/// A parsed pattern template, e.g. `wield <weapon> with <grip>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbPattern {
    tokens: Vec<PatternToken>,
}

impl VerbPattern {
    /// Parse a whitespace-separated template. The first token must be a
    /// literal: it is the command word the dispatcher prunes on.
    pub fn parse(template: &str) -> Result<Self, WorldError> {
        let mut tokens = Vec::new();
        for word in template.split_whitespace() {
            let token = if let Some(name) = word.strip_prefix('<').and_then(|w| w.strip_suffix('>'))
            {
                if name.is_empty() {
                    return Err(WorldError::InvalidInput(format!(
                        "empty capture in pattern {template:?}"
                    )));
                }
                PatternToken::Capture(name.to_string())
            } else {
                match word {
                    "dobj" => PatternToken::Dobj,
                    "prep" => PatternToken::Prep,
                    "iobj" => PatternToken::Iobj,
                    _ => PatternToken::Literal(word.to_lowercase()),
                }
            };
            tokens.push(token);
        }
        match tokens.first() {
            Some(PatternToken::Literal(_)) => Ok(Self { tokens }),
            _ => Err(WorldError::InvalidInput(format!(
                "pattern {template:?} must start with a literal command word"
            ))),
        }
    }

    pub fn tokens(&self) -> &[PatternToken] {
        &self.tokens
    }

    /// The command word: the leading literal, lowercased.
    pub fn first_token(&self) -> &str {
        match &self.tokens[0] {
            PatternToken::Literal(w) => w,
            _ => unreachable!("patterns always start with a literal"),
        }
    }

    pub fn literal_count(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| matches!(t, PatternToken::Literal(_)))
            .count()
    }

    /// A normalized signature used for shadowing: two verbs with the same
    /// name and the same signature on different owners shadow, nearest wins.
    /// Capture names do not participate.
    pub fn signature(&self) -> String {
        let parts: Vec<&str> = self
            .tokens
            .iter()
            .map(|t| match t {
                PatternToken::Literal(w) => w.as_str(),
                PatternToken::Capture(_) => "<>",
                PatternToken::Dobj => "dobj",
                PatternToken::Prep => "prep",
                PatternToken::Iobj => "iobj",
            })
            .collect();
        parts.join(" ")
    }
}

impl Display for VerbPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .tokens
            .iter()
            .map(|t| match t {
                PatternToken::Literal(w) => w.clone(),
                PatternToken::Capture(n) => format!("<{n}>"),
                PatternToken::Dobj => "dobj".to_string(),
                PatternToken::Prep => "prep".to_string(),
                PatternToken::Iobj => "iobj".to_string(),
            })
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// A verb: code bound to a command surface on an object or class.
///
/// A verb on a class applies to every instance of that class and its
/// descendants unless shadowed nearer. Uniquely identified by
/// (owner, name, pattern index).
#[derive(Debug, Clone, PartialEq)]
pub struct VerbDef {
    pub id: Uuid,
    /// The owning object or class.
    pub owner: ObjId,
    pub name: String,
    pub patterns: Vec<VerbPattern>,
    /// Opaque source text; only the script host interprets it.
    pub body: String,
    /// Capability tag required to run this verb; `None` means public.
    pub permission: Option<String>,
    pub enabled: bool,
    pub author: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl VerbDef {
    pub fn is_public(&self) -> bool {
        self.permission.is_none()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_parse_literals_and_captures() {
        let p = VerbPattern::parse("wield <weapon> with <grip>").unwrap();
        assert_eq!(
            p.tokens(),
            &[
                PatternToken::Literal("wield".into()),
                PatternToken::Capture("weapon".into()),
                PatternToken::Literal("with".into()),
                PatternToken::Capture("grip".into()),
            ]
        );
        assert_eq!(p.first_token(), "wield");
        assert_eq!(p.literal_count(), 2);
    }

    #[test]
    fn test_parse_positional_markers() {
        let p = VerbPattern::parse("put dobj prep iobj").unwrap();
        assert_eq!(
            p.tokens(),
            &[
                PatternToken::Literal("put".into()),
                PatternToken::Dobj,
                PatternToken::Prep,
                PatternToken::Iobj,
            ]
        );
    }

    #[test]
    fn test_parse_lowercases_literals() {
        let p = VerbPattern::parse("Look AT <thing>").unwrap();
        assert_eq!(p.first_token(), "look");
        assert_eq!(p.signature(), "look at <>");
    }

    #[test_case("<x> foo" ; "capture first")]
    #[test_case("dobj in iobj" ; "marker first")]
    #[test_case("" ; "empty")]
    fn test_parse_rejects_nonliteral_start(template: &str) {
        assert!(VerbPattern::parse(template).is_err());
    }

    #[test]
    fn test_signature_ignores_capture_names() {
        let a = VerbPattern::parse("wield <weapon>").unwrap();
        let b = VerbPattern::parse("wield <thing>").unwrap();
        assert_eq!(a.signature(), b.signature());
        let c = VerbPattern::parse("wield <weapon> with <grip>").unwrap();
        assert_ne!(a.signature(), c.signature());
    }
}
