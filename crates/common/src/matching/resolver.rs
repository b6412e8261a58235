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

use crate::matching::exits::matches_direction;
use crate::model::{
    PROP_ALIASES, PROP_DIRECTION, PROP_NAME, PROP_TYPE, WorldError, parse_aliases,
};
use fen_var::{Dbref, ObjId, Var};

// The interface the resolver needs onto the world. Separated out so the
// matching code can be exercised against a mock environment.
pub trait ResolveEnv {
    fn obj_exists(&self, id: &ObjId) -> Result<bool, WorldError>;
    fn location_of(&self, id: &ObjId) -> Result<Option<ObjId>, WorldError>;
    fn contents_of(&self, id: &ObjId) -> Result<Vec<ObjId>, WorldError>;
    /// The object's display name.
    fn display_name(&self, id: &ObjId) -> Result<String, WorldError>;
    /// Chain property lookup; `Var::None` when absent anywhere on the chain.
    fn property(&self, id: &ObjId, key: &str) -> Result<Var, WorldError>;
    fn class_of(&self, id: &ObjId) -> Result<ObjId, WorldError>;
    /// Whether the object is an exit (its class chain reaches the exit class).
    fn is_exit(&self, id: &ObjId) -> Result<bool, WorldError>;
    fn by_dbref(&self, dbref: Dbref) -> Result<Option<ObjId>, WorldError>;
    /// The single object flagged `isSystemObject`, or named `system`.
    fn system_object(&self) -> Result<Option<ObjId>, WorldError>;
}

/// The result of resolving a noun phrase to exactly one object.
/// Ambiguity is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    None,
    One(ObjId),
    Ambiguous(Vec<ObjId>),
}

/// The auto-generated short form of a display name: its uppercase letters
/// and digits, in order. `A Wooden Staff` yields `AWS`.
pub fn dynamic_alias(display_name: &str) -> String {
    display_name
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect()
}

/// The place from which the looker perceives the world: the explicit
/// location when given, else the looker's own location, else the looker
/// itself (rooms have no location but contain themselves for searching).
fn effective_location<E: ResolveEnv>(
    env: &E,
    looker: &ObjId,
    location: Option<&ObjId>,
) -> Result<ObjId, WorldError> {
    if let Some(loc) = location {
        return Ok(loc.clone());
    }
    Ok(env.location_of(looker)?.unwrap_or_else(|| looker.clone()))
}

// How well a candidate matched, best first. Only candidates sharing the best
// achieved strength are returned, so an exact name hit hides prefix hits.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
enum MatchStrength {
    ExactName,
    Alias,
    DynamicAlias,
    ExitDirection,
    TokenPrefix,
}

fn match_candidate<E: ResolveEnv>(
    env: &E,
    id: &ObjId,
    phrase: &str,
) -> Result<Option<MatchStrength>, WorldError> {
    let phrase_lower = phrase.to_lowercase();

    let display = env.display_name(id)?;
    let mut names = vec![display.clone()];
    if let Var::Str(name_prop) = env.property(id, PROP_NAME)? {
        names.push(name_prop);
    }
    if names.iter().any(|n| n.to_lowercase() == phrase_lower) {
        return Ok(Some(MatchStrength::ExactName));
    }

    let aliases = parse_aliases(&env.property(id, PROP_ALIASES)?);
    if aliases.iter().any(|a| a.to_lowercase() == phrase_lower) {
        return Ok(Some(MatchStrength::Alias));
    }

    let dynamic = dynamic_alias(&display);
    if !dynamic.is_empty() && dynamic.to_lowercase() == phrase_lower {
        return Ok(Some(MatchStrength::DynamicAlias));
    }

    if env.is_exit(id)?
        && let Var::Str(direction) = env.property(id, PROP_DIRECTION)?
        && matches_direction(phrase, &direction)
    {
        return Ok(Some(MatchStrength::ExitDirection));
    }

    // Partial: any word of a name or alias starting with the phrase.
    let tokens = names
        .iter()
        .flat_map(|n| n.split_whitespace())
        .chain(aliases.iter().map(String::as_str));
    for token in tokens {
        if token.to_lowercase().starts_with(&phrase_lower) {
            return Ok(Some(MatchStrength::TokenPrefix));
        }
    }

    Ok(None)
}

/// Turn a noun phrase into the objects it names, from the looker's point of
/// view. Steps are tried in order and the first that produces anything wins:
/// keywords, `#N` dbref, raw identity, then the local search space scored by
/// name/alias/dynamic-alias/exit-direction/prefix strength.
pub fn resolve<E: ResolveEnv>(
    env: &E,
    phrase: &str,
    looker: &ObjId,
    location: Option<&ObjId>,
    type_filter: Option<&str>,
) -> Result<Vec<ObjId>, WorldError> {
    let phrase = phrase.trim();
    if phrase.is_empty() {
        return Ok(vec![]);
    }

    match phrase.to_lowercase().as_str() {
        "me" | "player" => return Ok(vec![looker.clone()]),
        "here" | "room" => return Ok(vec![effective_location(env, looker, location)?]),
        "system" => {
            if let Some(system) = env.system_object()? {
                return Ok(vec![system]);
            }
        }
        _ => {}
    }

    if let Some(dbref) = Dbref::parse(phrase)
        && let Some(id) = env.by_dbref(dbref)?
    {
        return Ok(vec![id]);
    }

    let as_id = ObjId::from(phrase);
    if env.obj_exists(&as_id)? {
        return Ok(vec![as_id]);
    }

    let effective = effective_location(env, looker, location)?;
    let mut search_space = env.contents_of(&effective)?;
    for held in env.contents_of(looker)? {
        if !search_space.contains(&held) {
            search_space.push(held);
        }
    }

    if let Some(filter) = type_filter {
        let filter_lower = filter.to_lowercase();
        let filter_id = ObjId::from(filter);
        let mut filtered = Vec::new();
        for id in search_space {
            let class_hit = env.class_of(&id)? == filter_id;
            let type_hit = matches!(
                env.property(&id, PROP_TYPE)?,
                Var::Str(t) if t.to_lowercase() == filter_lower
            );
            if class_hit || type_hit {
                filtered.push(id);
            }
        }
        search_space = filtered;
    }

    let mut best: Option<MatchStrength> = None;
    let mut hits: Vec<(MatchStrength, ObjId)> = Vec::new();
    for id in search_space {
        if let Some(strength) = match_candidate(env, &id, phrase)? {
            if best.is_none_or(|b| strength < b) {
                best = Some(strength);
            }
            hits.push((strength, id));
        }
    }
    let Some(best) = best else {
        return Ok(vec![]);
    };
    Ok(hits
        .into_iter()
        .filter(|(s, _)| *s == best)
        .map(|(_, id)| id)
        .collect())
}

/// `resolve`, folded to a single-object outcome.
pub fn resolve_unique<E: ResolveEnv>(
    env: &E,
    phrase: &str,
    looker: &ObjId,
    location: Option<&ObjId>,
    type_filter: Option<&str>,
) -> Result<ResolveOutcome, WorldError> {
    let mut matches = resolve(env, phrase, looker, location, type_filter)?;
    Ok(match matches.len() {
        0 => ResolveOutcome::None,
        1 => ResolveOutcome::One(matches.remove(0)),
        _ => ResolveOutcome::Ambiguous(matches),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::matching::mock_env::MockEnv;
    use fen_var::{v_list, v_str};

    // The standing fixture: player P1 in room R1 with a wooden staff, plus a
    // north exit. Mirrors the worked scenarios the resolver must satisfy.
    fn setup() -> (MockEnv, ObjId, ObjId, ObjId, ObjId) {
        let mut env = MockEnv::new();
        let room = env.add_room("The Common Room");
        let player = env.add_object("Porcupine", Some(&room));
        let staff = env.add_object("A Wooden Staff", Some(&room));
        let exit = env.add_exit("North Exit", "north", &room);
        (env, room, player, staff, exit)
    }

    #[test]
    fn test_keyword_me() {
        let (env, _room, player, _staff, _exit) = setup();
        assert_eq!(
            resolve(&env, "me", &player, None, None).unwrap(),
            vec![player.clone()]
        );
        assert_eq!(
            resolve(&env, "PLAYER", &player, None, None).unwrap(),
            vec![player]
        );
    }

    #[test]
    fn test_keyword_here() {
        let (env, room, player, _staff, _exit) = setup();
        assert_eq!(
            resolve(&env, "here", &player, None, None).unwrap(),
            vec![room.clone()]
        );
        assert_eq!(
            resolve(&env, "room", &player, None, None).unwrap(),
            vec![room]
        );
    }

    #[test]
    fn test_keyword_here_for_roomless_looker_is_looker() {
        let (env, room, _player, _staff, _exit) = setup();
        // A room has no location; "here" resolves to the room itself.
        assert_eq!(
            resolve(&env, "here", &room, None, None).unwrap(),
            vec![room]
        );
    }

    #[test]
    fn test_keyword_system() {
        let (mut env, _room, player, _staff, _exit) = setup();
        let system = env.add_system_object();
        assert_eq!(
            resolve(&env, "system", &player, None, None).unwrap(),
            vec![system]
        );
    }

    #[test]
    fn test_dbref_lookup() {
        let (mut env, _room, player, staff, _exit) = setup();
        env.set_dbref(&staff, 7);
        assert_eq!(
            resolve(&env, "#7", &player, None, None).unwrap(),
            vec![staff]
        );
        assert_eq!(resolve(&env, "#8", &player, None, None).unwrap(), vec![]);
    }

    #[test]
    fn test_raw_identity_lookup() {
        let (env, _room, player, staff, _exit) = setup();
        let raw = staff.as_str().to_string();
        assert_eq!(
            resolve(&env, &raw, &player, None, None).unwrap(),
            vec![staff]
        );
    }

    #[test]
    fn test_exact_name_match() {
        let (env, room, player, staff, _exit) = setup();
        assert_eq!(
            resolve_unique(&env, "a wooden staff", &player, Some(&room), None).unwrap(),
            ResolveOutcome::One(staff)
        );
    }

    #[test]
    fn test_partial_prefix_unique() {
        let (env, room, player, staff, _exit) = setup();
        assert_eq!(
            resolve_unique(&env, "wood", &player, Some(&room), None).unwrap(),
            ResolveOutcome::One(staff)
        );
    }

    #[test]
    fn test_partial_prefix_ambiguous() {
        let (mut env, room, player, staff, _exit) = setup();
        let sword = env.add_object("A Wooden Sword", Some(&room));
        assert_eq!(
            resolve_unique(&env, "wood", &player, Some(&room), None).unwrap(),
            ResolveOutcome::Ambiguous(vec![staff, sword])
        );
    }

    #[test]
    fn test_exact_beats_partial() {
        let (mut env, room, player, _staff, _exit) = setup();
        let staff2 = env.add_object("Staff", Some(&room));
        // "staff" is exact on one object, a token prefix on the other.
        assert_eq!(
            resolve_unique(&env, "staff", &player, Some(&room), None).unwrap(),
            ResolveOutcome::One(staff2)
        );
    }

    #[test]
    fn test_alias_match() {
        let (mut env, room, player, staff, _exit) = setup();
        env.set_property(
            &staff,
            PROP_ALIASES,
            v_list(vec![v_str("stick"), v_str("staff")]),
        );
        assert_eq!(
            resolve_unique(&env, "stick", &player, Some(&room), None).unwrap(),
            ResolveOutcome::One(staff)
        );
    }

    #[test]
    fn test_delimited_alias_string() {
        let (mut env, room, player, staff, _exit) = setup();
        env.set_property(&staff, PROP_ALIASES, v_str("stick,rod"));
        assert_eq!(
            resolve_unique(&env, "rod", &player, Some(&room), None).unwrap(),
            ResolveOutcome::One(staff)
        );
    }

    #[test]
    fn test_dynamic_alias() {
        let (env, room, player, staff, _exit) = setup();
        assert_eq!(
            resolve_unique(&env, "AWS", &player, Some(&room), None).unwrap(),
            ResolveOutcome::One(staff.clone())
        );
        // Case-insensitive like the other rungs.
        assert_eq!(
            resolve_unique(&env, "aws", &player, Some(&room), None).unwrap(),
            ResolveOutcome::One(staff)
        );
    }

    #[test]
    fn test_exit_abbreviation() {
        let (env, room, player, _staff, exit) = setup();
        assert_eq!(
            resolve_unique(&env, "n", &player, Some(&room), None).unwrap(),
            ResolveOutcome::One(exit.clone())
        );
        assert_eq!(
            resolve_unique(&env, "north", &player, Some(&room), None).unwrap(),
            ResolveOutcome::One(exit)
        );
    }

    #[test]
    fn test_inventory_is_searched() {
        let (mut env, _room, player, _staff, _exit) = setup();
        let coin = env.add_object("A Gold Coin", Some(&player));
        assert_eq!(
            resolve_unique(&env, "coin", &player, None, None).unwrap(),
            ResolveOutcome::One(coin)
        );
    }

    #[test]
    fn test_type_filter_by_class() {
        let (env, room, player, _staff, exit) = setup();
        let exit_class = env.class_of(&exit).unwrap();
        // Without the filter "n" already hits only the exit, so filter on a
        // phrase that would otherwise be ambiguous between exit and staff.
        let all = resolve(&env, "north exit", &player, Some(&room), None).unwrap();
        assert_eq!(all, vec![exit.clone()]);
        let filtered = resolve(
            &env,
            "north exit",
            &player,
            Some(&room),
            Some(exit_class.as_str()),
        )
        .unwrap();
        assert_eq!(filtered, vec![exit]);
    }

    #[test]
    fn test_type_filter_by_type_property() {
        let (mut env, room, player, staff, _exit) = setup();
        env.set_property(&staff, PROP_TYPE, v_str("weapon"));
        assert_eq!(
            resolve(&env, "wood", &player, Some(&room), Some("weapon")).unwrap(),
            vec![staff]
        );
        assert_eq!(
            resolve(&env, "wood", &player, Some(&room), Some("furniture")).unwrap(),
            vec![]
        );
    }

    #[test]
    fn test_no_match_is_empty() {
        let (env, room, player, _staff, _exit) = setup();
        assert_eq!(
            resolve(&env, "dragon", &player, Some(&room), None).unwrap(),
            vec![]
        );
        assert_eq!(
            resolve_unique(&env, "dragon", &player, Some(&room), None).unwrap(),
            ResolveOutcome::None
        );
    }

    #[test]
    fn test_deterministic_order() {
        let (mut env, room, player, staff, _exit) = setup();
        let sword = env.add_object("A Wooden Sword", Some(&room));
        let first = resolve(&env, "wood", &player, Some(&room), None).unwrap();
        for _ in 0..8 {
            assert_eq!(resolve(&env, "wood", &player, Some(&room), None).unwrap(), first);
        }
        assert_eq!(first, vec![staff, sword]);
    }

    #[test]
    fn test_dynamic_alias_extraction() {
        assert_eq!(dynamic_alias("A Wooden Staff"), "AWS");
        assert_eq!(dynamic_alias("Mark IV Probe 7"), "MIVP7");
        assert_eq!(dynamic_alias("lowercase"), "");
    }
}
