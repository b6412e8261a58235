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
use std::sync::{Condvar, Mutex};

use fen_var::ObjId;

/// Exclusive per-object locks for world mutations.
///
/// A caller acquires the whole set of objects it will touch in one shot:
/// either every lock in the set is free and all are taken, or the caller
/// waits. All-or-nothing acquisition cannot deadlock; the identity-ordered
/// `BTreeSet` keeps lock-set hashing and comparison deterministic.
#[derive(Default)]
pub struct LockTable {
    held: Mutex<HashSet<ObjId>>,
    released: Condvar,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, ids: BTreeSet<ObjId>) -> LockSet<'_> {
        let mut held = self.held.lock().unwrap();
        loop {
            if ids.iter().all(|id| !held.contains(id)) {
                for id in &ids {
                    held.insert(id.clone());
                }
                return LockSet { table: self, ids };
            }
            held = self.released.wait(held).unwrap();
        }
    }
}

pub struct LockSet<'a> {
    table: &'a LockTable,
    ids: BTreeSet<ObjId>,
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        let mut held = self.table.held.lock().unwrap();
        for id in &self.ids {
            held.remove(id);
        }
        self.table.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_disjoint_sets_do_not_block() {
        let table = LockTable::new();
        let a = table.acquire(BTreeSet::from([ObjId::from("a")]));
        let _b = table.acquire(BTreeSet::from([ObjId::from("b")]));
        drop(a);
    }

    #[test]
    fn test_overlapping_sets_serialize() {
        let table = Arc::new(LockTable::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        // Every thread locks {x, y}; mutual exclusion means the observed
        // in-critical-section count never exceeds one.
        for _ in 0..8 {
            let table = table.clone();
            let counter = counter.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    let ids = BTreeSet::from([ObjId::from("x"), ObjId::from("y")]);
                    let _guard = table.acquire(ids);
                    let inside = counter.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(inside, 0);
                    counter.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_reverse_order_acquisition_cannot_deadlock() {
        let table = Arc::new(LockTable::new());
        let t1 = {
            let table = table.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let _g =
                        table.acquire(BTreeSet::from([ObjId::from("a"), ObjId::from("b")]));
                }
            })
        };
        let t2 = {
            let table = table.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let _g =
                        table.acquire(BTreeSet::from([ObjId::from("b"), ObjId::from("a")]));
                }
            })
        };
        t1.join().unwrap();
        t2.join().unwrap();
    }
}
