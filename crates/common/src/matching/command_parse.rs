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

use crate::matching::Preposition;
use crate::model::WorldError;
use crate::util::parse_into_words;

/// A player-typed command split into its grammatical parts.
///
/// The verb token is separated from the rest; the rest is additionally run
/// through the direct-object / preposition / indirect-object split. Noun
/// phrase resolution is the dispatcher's business, not the parser's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub verb: String,
    /// Everything after the verb token, verbatim.
    pub argstr: String,
    /// The words of `argstr`.
    pub args: Vec<String>,
    /// The phrase before the preposition, or the whole remainder.
    pub dobjstr: Option<String>,
    pub prep: Option<Preposition>,
    /// The preposition word as typed.
    pub prepstr: Option<String>,
    /// The phrase after the preposition.
    pub iobjstr: Option<String>,
}

/// Parse a raw command line. `"` at the start abbreviates `say`, `:`
/// abbreviates `emote`.
pub fn parse_command(input: &str) -> Result<ParsedCommand, WorldError> {
    let mut command = input.trim().to_string();
    match command.chars().next() {
        Some('"') => command.replace_range(..1, "say "),
        Some(':') => command.replace_range(..1, "emote "),
        _ => {}
    }

    let command = command.trim();
    if command.is_empty() {
        return Err(WorldError::InvalidInput("empty command".to_string()));
    }

    let mut parts = command.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or_default().to_string();
    let argstr = parts.next().unwrap_or_default().trim_start().to_string();
    let args = parse_into_words(&argstr);

    let prep_index = args
        .iter()
        .position(|word| Preposition::parse(word).is_some());

    let (dobjstr, prep, prepstr, iobjstr) = match prep_index {
        Some(i) => {
            let dobjstr = (i > 0).then(|| args[..i].join(" "));
            let iobjstr = (i + 1 < args.len()).then(|| args[i + 1..].join(" "));
            (
                dobjstr,
                Preposition::parse(&args[i]),
                Some(args[i].clone()),
                iobjstr,
            )
        }
        None => {
            let dobjstr = (!args.is_empty()).then(|| args.join(" "));
            (dobjstr, None, None, None)
        }
    };

    Ok(ParsedCommand {
        verb,
        argstr,
        args,
        dobjstr,
        prep,
        prepstr,
        iobjstr,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_bare_verb() {
        let pc = parse_command("look").unwrap();
        assert_eq!(pc.verb, "look");
        assert_eq!(pc.argstr, "");
        assert_eq!(pc.dobjstr, None);
        assert_eq!(pc.prep, None);
        assert_eq!(pc.iobjstr, None);
    }

    #[test]
    fn test_dobj_only() {
        let pc = parse_command("take staff").unwrap();
        assert_eq!(pc.verb, "take");
        assert_eq!(pc.dobjstr, Some("staff".to_string()));
        assert_eq!(pc.prep, None);
        assert_eq!(pc.iobjstr, None);
    }

    #[test]
    fn test_dobj_prep_iobj() {
        let pc = parse_command("put the staff in wooden chest").unwrap();
        assert_eq!(pc.verb, "put");
        assert_eq!(pc.dobjstr, Some("the staff".to_string()));
        assert_eq!(pc.prep, Some(Preposition::In));
        assert_eq!(pc.prepstr, Some("in".to_string()));
        assert_eq!(pc.iobjstr, Some("wooden chest".to_string()));
    }

    #[test]
    fn test_prep_without_dobj() {
        let pc = parse_command("look at staff").unwrap();
        assert_eq!(pc.dobjstr, None);
        assert_eq!(pc.prep, Some(Preposition::At));
        assert_eq!(pc.iobjstr, Some("staff".to_string()));
    }

    #[test]
    fn test_prep_without_iobj() {
        let pc = parse_command("jump over").unwrap();
        assert_eq!(pc.dobjstr, None);
        assert_eq!(pc.prep, Some(Preposition::Over));
        assert_eq!(pc.iobjstr, None);
    }

    #[test]
    fn test_first_preposition_wins() {
        let pc = parse_command("give box of chocolates to anna").unwrap();
        assert_eq!(pc.dobjstr, Some("box".to_string()));
        assert_eq!(pc.prep, Some(Preposition::Of));
        assert_eq!(pc.iobjstr, Some("chocolates to anna".to_string()));
    }

    #[test]
    fn test_say_abbreviation() {
        let pc = parse_command("\"hello there").unwrap();
        assert_eq!(pc.verb, "say");
        assert_eq!(pc.argstr, "hello there");
    }

    #[test]
    fn test_emote_abbreviation() {
        let pc = parse_command(":waves").unwrap();
        assert_eq!(pc.verb, "emote");
        assert_eq!(pc.argstr, "waves");
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(parse_command("   ").is_err());
    }

    #[test]
    fn test_quoted_phrase_stays_one_word() {
        let pc = parse_command("rename staff to \"The Big Stick\"").unwrap();
        assert_eq!(pc.dobjstr, Some("staff".to_string()));
        assert_eq!(pc.iobjstr, Some("The Big Stick".to_string()));
    }
}
