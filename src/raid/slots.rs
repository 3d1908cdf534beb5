//! The per-disk lock table.
//!
//! Every backing disk sits behind its own reader/writer lock, together with its failure flag.
//! Holding a disk's lock is the only way to reach the disk or observe the flag, so an operation
//! that holds the locks of every disk it touches sees a consistent view: `disk_fail` and
//! `disk_repaired` cannot slip in between the flag check and the I/O.
//!
//! Whenever an operation needs more than one disk, the locks are acquired in ascending disk
//! order. All multi-disk paths follow this rule, which rules out deadlock between them.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A backing disk together with its failure flag.
pub struct Slot<D> {
    /// The disk handle.
    pub disk: D,
    /// Is the disk marked failed?
    ///
    /// A failed disk takes no reads and no writes; its content is treated as lost until a
    /// rebuild completes.
    pub failed: bool,
}

/// The lock table over all backing disks.
///
/// Disks are numbered starting from 1, matching the public API.
pub struct Slots<D> {
    slots: Vec<RwLock<Slot<D>>>,
}

impl<D> Slots<D> {
    /// Wrap `disks` into a lock table, all disks healthy.
    pub fn new(disks: Vec<D>) -> Slots<D> {
        Slots {
            slots: disks
                .into_iter()
                .map(|disk| {
                    RwLock::new(Slot {
                        disk: disk,
                        failed: false,
                    })
                })
                .collect(),
        }
    }

    /// The number of disks in the table.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Acquire disk `disk` shared.
    pub fn read(&self, disk: usize) -> RwLockReadGuard<Slot<D>> {
        self.slots[disk - 1].read()
    }

    /// Acquire disk `disk` exclusively.
    pub fn write(&self, disk: usize) -> RwLockWriteGuard<Slot<D>> {
        self.slots[disk - 1].write()
    }

    /// Acquire every disk shared, in ascending order.
    ///
    /// Entry `i` of the returned vector holds disk `i + 1`.
    pub fn read_all(&self) -> Vec<RwLockReadGuard<Slot<D>>> {
        self.slots.iter().map(|slot| slot.read()).collect()
    }

    /// Acquire every disk exclusively, in ascending order.
    ///
    /// Entry `i` of the returned vector holds disk `i + 1`.
    pub fn write_all(&self) -> Vec<RwLockWriteGuard<Slot<D>>> {
        self.slots.iter().map(|slot| slot.write()).collect()
    }

    /// Acquire disks `a` and `b` exclusively.
    ///
    /// The guards are returned in argument order, but the locks are always taken in ascending
    /// disk order.
    pub fn write_pair(&self, a: usize, b: usize) -> (RwLockWriteGuard<Slot<D>>, RwLockWriteGuard<Slot<D>>) {
        debug_assert_ne!(a, b);

        if a < b {
            let first = self.write(a);
            let second = self.write(b);
            (first, second)
        } else {
            let second = self.write(b);
            let first = self.write(a);
            (first, second)
        }
    }

    /// Clear every failure flag.
    ///
    /// Used when the array is (re)initialised: a fresh generation starts with all disks healthy.
    pub fn clear_failed(&self) {
        for slot in &self.slots {
            slot.write().failed = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn flags_start_clear() {
        let slots = Slots::new(vec![(); 4]);

        for disk in 1..5 {
            assert!(!slots.read(disk).failed);
        }
    }

    #[test]
    fn flag_survives_release() {
        let slots = Slots::new(vec![(); 2]);

        slots.write(2).failed = true;
        assert!(slots.read(2).failed);
        assert!(!slots.read(1).failed);

        slots.clear_failed();
        assert!(!slots.read(2).failed);
    }

    #[test]
    fn readers_are_concurrent() {
        let slots = Slots::new(vec![(); 2]);

        let first = slots.read(1);
        let second = slots.read(1);
        assert!(!first.failed);
        assert!(!second.failed);
    }

    #[test]
    fn opposite_pair_orders_do_not_deadlock() {
        let slots = Arc::new(Slots::new(vec![(); 4]));
        let mut joins = Vec::new();

        for t in 0..8 {
            let slots = slots.clone();
            joins.push(thread::spawn(move || {
                for _ in 0..1000 {
                    // Half the threads ask for the pair one way around, half the other.
                    let (mut a, _b) = if t % 2 == 0 {
                        slots.write_pair(1, 4)
                    } else {
                        slots.write_pair(4, 1)
                    };
                    a.failed = !a.failed;
                }
            }));
        }

        for j in joins {
            j.join().unwrap();
        }
    }

    #[test]
    fn write_all_is_exclusive() {
        let slots = Arc::new(Slots::new(vec![0u32; 3]));
        let mut joins = Vec::new();

        for _ in 0..4 {
            let slots = slots.clone();
            joins.push(thread::spawn(move || {
                for _ in 0..500 {
                    let mut guards = slots.write_all();
                    // Bump every disk while holding the whole table; no other thread can see
                    // the counters mid-update.
                    for guard in guards.iter_mut() {
                        guard.disk += 1;
                    }
                    let first = guards[0].disk;
                    assert!(guards.iter().all(|guard| guard.disk == first));
                }
            }));
        }

        for j in joins {
            j.join().unwrap();
        }
    }
}
