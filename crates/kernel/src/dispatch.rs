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

//! The command dispatcher: takes one raw line from a session, walks the
//! search order, picks the best matching verb, and drives the script host.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::debug;

use crate::host::{Builtins, NotifySink, ScriptHost, VerbCall};
use crate::registry::{Registry, RegistryRef, VerbEntry};
use fen_common::matching::{
    ParsedCommand, Preposition, ResolveOutcome, parse_command, resolve_unique,
};
use fen_common::model::{PatternToken, VerbPattern, WorldError};
use fen_var::{ObjId, Var, v_str};

/// What became of one dispatched line.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Handled,
    NoMatch,
    Ambiguous(Vec<ObjId>),
    PermissionDenied,
    Error(WorldError),
}

pub struct Dispatcher {
    world: Arc<fen_db::WorldState>,
    players: Arc<fen_db::PlayerManager>,
    registry: Arc<RegistryRef>,
    host: Arc<ScriptHost>,
    builtins: Arc<Builtins>,
    sink: Arc<dyn NotifySink>,
}

// One verb pattern that matched the input, with everything needed to rank
// and run it.
struct Candidate {
    order_idx: usize,
    literal_count: usize,
    depth: usize,
    seq: usize,
    this: ObjId,
    entry: Arc<VerbEntry>,
    vars: BTreeMap<String, Var>,
}

enum PatternFit {
    Fit(BTreeMap<String, Var>),
    NoFit,
    AmbiguousPhrase(Vec<ObjId>),
}

impl Dispatcher {
    pub fn new(
        world: Arc<fen_db::WorldState>,
        players: Arc<fen_db::PlayerManager>,
        registry: Arc<RegistryRef>,
        host: Arc<ScriptHost>,
        builtins: Arc<Builtins>,
        sink: Arc<dyn NotifySink>,
    ) -> Self {
        Self {
            world,
            players,
            registry,
            host,
            builtins,
            sink,
        }
    }

    pub fn registry(&self) -> &Arc<RegistryRef> {
        &self.registry
    }

    /// Dispatch one line on behalf of `player`. Never panics, never tears
    /// down the session: everything comes back as an outcome.
    pub fn dispatch(&self, player: &ObjId, raw: &str, cancel: Arc<AtomicBool>) -> DispatchOutcome {
        match self.dispatch_inner(player, raw, cancel) {
            Ok(outcome) => outcome,
            Err(e) => DispatchOutcome::Error(e),
        }
    }

    fn dispatch_inner(
        &self,
        player: &ObjId,
        raw: &str,
        cancel: Arc<AtomicBool>,
    ) -> Result<DispatchOutcome, WorldError> {
        let pc = match parse_command(raw) {
            Ok(pc) => pc,
            Err(_) => return Ok(DispatchOutcome::NoMatch),
        };
        let verb_token = pc.verb.to_lowercase();

        // One snapshot for the whole dispatch: a concurrent reload swaps the
        // reference, not the snapshot we already hold.
        let registry = self.registry.load();

        let perms: BTreeSet<String> = self
            .players
            .get_player(player)?
            .map(|p| p.permissions)
            .unwrap_or_default();

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut ambiguity: Option<Vec<ObjId>> = None;
        let mut permission_blocked = false;
        let mut seq = 0;

        // Prune on the command word first: the registry's first-token index
        // knows which owners have a verb answering to it, so a word nothing
        // answers to skips the whole walk, and search-order objects whose
        // chain holds no such owner skip theirs.
        let token_verbs = registry.verbs_for_token(&verb_token);
        if !token_verbs.is_empty() {
            let token_owners: HashSet<&ObjId> =
                token_verbs.iter().map(|e| &e.def.owner).collect();

            let order = self.search_order(player)?;
            for (order_idx, obj) in order.iter().enumerate() {
                let class = self.world.get_object(obj)?.class;
                let chain: Vec<ObjId> = self
                    .world
                    .class_chain(&class)?
                    .into_iter()
                    .map(|c| c.id)
                    .collect();
                if !token_owners.contains(obj)
                    && !chain.iter().any(|c| token_owners.contains(c))
                {
                    continue;
                }

                // Nearest-first walk; the first (name, signature) wins and
                // shadows anything deeper on this object's chain.
                let mut seen: HashSet<(String, String)> = HashSet::new();
                for (depth, entry) in registry.lookup_verbs_inherited(obj, &chain) {
                    if !entry.def.enabled {
                        continue;
                    }
                    for pattern in &entry.def.patterns {
                        if pattern.first_token() != verb_token {
                            continue;
                        }
                        let shadow_key = (entry.def.name.to_lowercase(), pattern.signature());
                        if !seen.insert(shadow_key) {
                            continue;
                        }
                        if let Some(required) = &entry.def.permission
                            && !perms.contains(required)
                        {
                            permission_blocked = true;
                            continue;
                        }
                        seq += 1;
                        match self.fit_pattern(pattern, &pc, player)? {
                            PatternFit::Fit(vars) => candidates.push(Candidate {
                                order_idx,
                                literal_count: pattern.literal_count(),
                                depth,
                                seq,
                                this: obj.clone(),
                                entry: entry.clone(),
                                vars,
                            }),
                            PatternFit::NoFit => {}
                            PatternFit::AmbiguousPhrase(objs) => {
                                if ambiguity.is_none() {
                                    ambiguity = Some(objs);
                                }
                            }
                        }
                    }
                }
            }
        }

        // Closest in the search order wins; then the most literal tokens;
        // then instance over class and nearer ancestor; then definition
        // order.
        candidates.sort_by(|a, b| {
            a.order_idx
                .cmp(&b.order_idx)
                .then(b.literal_count.cmp(&a.literal_count))
                .then(a.depth.cmp(&b.depth))
                .then(a.seq.cmp(&b.seq))
        });

        if let Some(best) = candidates.into_iter().next() {
            debug!(verb = %best.entry.def.name, this = %best.this, "Dispatching verb");
            return Ok(self.run(best, &pc, player, cancel, &registry));
        }

        if let Some(objs) = ambiguity {
            return Ok(DispatchOutcome::Ambiguous(objs));
        }
        if permission_blocked {
            return Ok(DispatchOutcome::PermissionDenied);
        }

        // A bare command that names an exit fires the exit's movement verb:
        // `n` walks north even though no verb's pattern starts with "n".
        if pc.argstr.is_empty()
            && let Some(outcome) = self.exit_fallback(&registry, &pc, player, &perms, cancel)?
        {
            return Ok(outcome);
        }

        Ok(DispatchOutcome::NoMatch)
    }

    /// The standard search order: the player, their location, the things in
    /// it, the player's inventory, and the system object. First occurrence
    /// wins on overlap.
    fn search_order(&self, player: &ObjId) -> Result<Vec<ObjId>, WorldError> {
        let mut order: Vec<ObjId> = vec![player.clone()];
        let player_obj = self.world.get_object(player)?;
        if let Some(location) = &player_obj.location {
            order.push(location.clone());
            for o in self.world.contents_of(location)? {
                order.push(o.id);
            }
        }
        for o in self.world.contents_of(player)? {
            order.push(o.id);
        }
        if let Some(system) = self.world.system_object()? {
            order.push(system.id);
        }

        let mut seen = HashSet::new();
        order.retain(|id| seen.insert(id.clone()));
        Ok(order)
    }

    /// Match one pattern's tokens against the words after the verb.
    /// Captures and positional slots take words up to the next anchor
    /// (literal or preposition); `dobj`/`iobj` phrases must resolve to
    /// exactly one object.
    fn fit_pattern(
        &self,
        pattern: &VerbPattern,
        pc: &ParsedCommand,
        player: &ObjId,
    ) -> Result<PatternFit, WorldError> {
        let words = &pc.args;
        let tokens = pattern.tokens();
        let mut vars: BTreeMap<String, Var> = BTreeMap::new();
        let mut i = 0;

        let mut t = 1;
        while t < tokens.len() {
            match &tokens[t] {
                PatternToken::Literal(word) => {
                    if i < words.len() && words[i].to_lowercase() == *word {
                        i += 1;
                    } else {
                        return Ok(PatternFit::NoFit);
                    }
                }
                PatternToken::Prep => {
                    if i < words.len() && Preposition::parse(&words[i]).is_some() {
                        vars.insert("prep".to_string(), v_str(&words[i]));
                        i += 1;
                    } else {
                        return Ok(PatternFit::NoFit);
                    }
                }
                PatternToken::Dobj | PatternToken::Iobj | PatternToken::Capture(_) => {
                    let end = match tokens.get(t + 1) {
                        Some(PatternToken::Literal(stop)) => {
                            match (i..words.len()).find(|j| words[*j].to_lowercase() == *stop) {
                                Some(j) => j,
                                None => return Ok(PatternFit::NoFit),
                            }
                        }
                        Some(PatternToken::Prep) => {
                            match (i..words.len())
                                .find(|j| Preposition::parse(&words[*j]).is_some())
                            {
                                Some(j) => j,
                                None => return Ok(PatternFit::NoFit),
                            }
                        }
                        Some(_) => (i + 1).min(words.len()),
                        None => words.len(),
                    };
                    if end == i {
                        return Ok(PatternFit::NoFit);
                    }
                    let phrase = words[i..end].join(" ");
                    i = end;

                    match &tokens[t] {
                        PatternToken::Capture(name) => {
                            vars.insert(name.clone(), v_str(&phrase));
                        }
                        positional => {
                            let (obj_key, str_key) = if matches!(positional, PatternToken::Dobj) {
                                ("dobj", "dobjstr")
                            } else {
                                ("iobj", "iobjstr")
                            };
                            match resolve_unique(&*self.world, &phrase, player, None, None)? {
                                ResolveOutcome::One(obj) => {
                                    vars.insert(obj_key.to_string(), Var::Obj(obj));
                                    vars.insert(str_key.to_string(), v_str(&phrase));
                                }
                                ResolveOutcome::None => return Ok(PatternFit::NoFit),
                                ResolveOutcome::Ambiguous(objs) => {
                                    return Ok(PatternFit::AmbiguousPhrase(objs));
                                }
                            }
                        }
                    }
                }
            }
            t += 1;
        }

        if i != words.len() {
            return Ok(PatternFit::NoFit);
        }
        Ok(PatternFit::Fit(vars))
    }

    fn exit_fallback(
        &self,
        registry: &Arc<Registry>,
        pc: &ParsedCommand,
        player: &ObjId,
        perms: &BTreeSet<String>,
        cancel: Arc<AtomicBool>,
    ) -> Result<Option<DispatchOutcome>, WorldError> {
        use fen_common::matching::ResolveEnv;

        let exit_id = match resolve_unique(&*self.world, &pc.verb, player, None, None)? {
            ResolveOutcome::One(id) if self.world.is_exit(&id)? => id,
            ResolveOutcome::Ambiguous(objs) => {
                // Only exits make a bare token a command; ambiguity among
                // anything else is just not a match.
                let mut exits = Vec::new();
                for id in objs {
                    if self.world.is_exit(&id)? {
                        exits.push(id);
                    }
                }
                match exits.len() {
                    0 => return Ok(None),
                    1 => exits.remove(0),
                    _ => return Ok(Some(DispatchOutcome::Ambiguous(exits))),
                }
            }
            _ => return Ok(None),
        };

        let class = self.world.get_object(&exit_id)?.class;
        let chain: Vec<ObjId> = self
            .world
            .class_chain(&class)?
            .into_iter()
            .map(|c| c.id)
            .collect();
        let mut blocked = false;
        for (_, entry) in registry.lookup_verbs_inherited(&exit_id, &chain) {
            if !entry.def.enabled || !entry.def.name.eq_ignore_ascii_case("go") {
                continue;
            }
            if let Some(required) = &entry.def.permission
                && !perms.contains(required)
            {
                blocked = true;
                continue;
            }
            let candidate = Candidate {
                order_idx: 0,
                literal_count: 0,
                depth: 0,
                seq: 0,
                this: exit_id.clone(),
                entry: entry.clone(),
                vars: BTreeMap::new(),
            };
            return Ok(Some(self.run(candidate, pc, player, cancel, registry)));
        }
        Ok(if blocked {
            Some(DispatchOutcome::PermissionDenied)
        } else {
            None
        })
    }

    fn run(
        &self,
        candidate: Candidate,
        pc: &ParsedCommand,
        player: &ObjId,
        cancel: Arc<AtomicBool>,
        registry: &Arc<Registry>,
    ) -> DispatchOutcome {
        let call = VerbCall {
            player: player.clone(),
            this: candidate.this,
            args: pc.args.clone(),
            argstr: pc.argstr.clone(),
            vars: candidate.vars,
            cancel,
        };
        match self.host.invoke_verb(
            &candidate.entry,
            registry,
            &self.builtins,
            &*self.sink,
            call,
        ) {
            Ok(_) => DispatchOutcome::Handled,
            Err(e) => DispatchOutcome::Error(e),
        }
    }
}
