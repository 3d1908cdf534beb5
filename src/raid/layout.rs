//! Logical-to-physical address translation.
//!
//! The translator is pure: it maps a logical block number to the physical location(s) holding it,
//! specific to the active RAID level. It performs no I/O and takes no locks.

use disk::BlockNumber;
use raid::level::RaidLevel;

/// A single physical position: one block on one disk.
///
/// Disks are numbered starting from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    /// The backing disk holding the block.
    pub disk: usize,
    /// The physical block number on that disk.
    pub block: BlockNumber,
}

/// The physical placement of one logical block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    /// Exactly one copy exists (RAID0).
    Single(Location),
    /// Every disk holds the block at this physical block number (RAID1).
    Mirrored(BlockNumber),
    /// A striped mirror pair (RAID0+1): the primary location and its mirror partner.
    Paired(Location, Location),
    /// A data location protected by the XOR parity block of its stripe (RAID4, RAID5).
    ///
    /// The parity location always sits at the same physical block number as the data, on the
    /// stripe's parity disk.
    Parity {
        /// Where the data itself lives.
        data: Location,
        /// Where the stripe's parity lives.
        parity: Location,
    },
}

/// The address translator for one array shape.
#[derive(Clone, Copy, Debug)]
pub struct Layout {
    /// The active RAID level.
    pub level: RaidLevel,
    /// The number of backing disks.
    pub disks: usize,
}

impl Layout {
    /// The number of logical blocks the array exposes, given the per-disk capacity.
    pub fn logical_blocks(&self, per_disk: BlockNumber) -> BlockNumber {
        match self.level {
            RaidLevel::Raid0 => self.disks * per_disk,
            RaidLevel::Raid1 => per_disk,
            // With an odd disk count the last disk sits outside both mirror halves and holds
            // no data.
            RaidLevel::Raid01 => self.disks / 2 * per_disk,
            RaidLevel::Raid4 | RaidLevel::Raid5 => (self.disks - 1) * per_disk,
        }
    }

    /// Translate logical block `block` to its physical placement.
    ///
    /// `block` must be below `logical_blocks`.
    pub fn locate(&self, block: BlockNumber) -> Target {
        let n = self.disks;

        match self.level {
            RaidLevel::Raid0 => Target::Single(Location {
                disk: block % n + 1,
                block: block / n,
            }),
            RaidLevel::Raid1 => Target::Mirrored(block),
            RaidLevel::Raid01 => {
                let half = n / 2;
                let primary = block % half + 1;

                Target::Paired(
                    Location {
                        disk: primary,
                        block: block / half,
                    },
                    Location {
                        disk: primary + half,
                        block: block / half,
                    },
                )
            },
            RaidLevel::Raid4 => Target::Parity {
                data: Location {
                    disk: block % (n - 1) + 1,
                    block: block / (n - 1),
                },
                parity: Location {
                    disk: n,
                    block: block / (n - 1),
                },
            },
            RaidLevel::Raid5 => {
                // The stripe this block belongs to, and its position within the stripe.
                let stripe = block / (n - 1);
                let position = block % (n - 1);
                // The parity disk rotates per stripe; the stripe's data disks are the remaining
                // disks in ascending cyclic order starting just after the parity disk.
                let parity = stripe % n;
                let data = (parity + 1 + position) % n;

                Target::Parity {
                    data: Location {
                        disk: data + 1,
                        block: stripe,
                    },
                    parity: Location {
                        disk: parity + 1,
                        block: stripe,
                    },
                }
            },
        }
    }

    /// The mirror partner of `disk` under RAID0+1.
    ///
    /// Returns `None` for the spare disk that exists when the disk count is odd; it belongs to
    /// neither mirror half and holds no data.
    pub fn mirror_partner(&self, disk: usize) -> Option<usize> {
        let half = self.disks / 2;

        if disk <= half {
            Some(disk + half)
        } else if disk <= half * 2 {
            Some(disk - half)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(level: RaidLevel, disks: usize) -> Layout {
        Layout {
            level: level,
            disks: disks,
        }
    }

    #[test]
    fn capacities() {
        assert_eq!(layout(RaidLevel::Raid0, 4).logical_blocks(100), 400);
        assert_eq!(layout(RaidLevel::Raid1, 4).logical_blocks(100), 100);
        assert_eq!(layout(RaidLevel::Raid01, 4).logical_blocks(100), 200);
        assert_eq!(layout(RaidLevel::Raid01, 5).logical_blocks(100), 200);
        assert_eq!(layout(RaidLevel::Raid4, 5).logical_blocks(100), 400);
        assert_eq!(layout(RaidLevel::Raid5, 5).logical_blocks(100), 400);
    }

    #[test]
    fn raid0_round_robin() {
        let l = layout(RaidLevel::Raid0, 4);

        assert_eq!(l.locate(0), Target::Single(Location { disk: 1, block: 0 }));
        assert_eq!(l.locate(3), Target::Single(Location { disk: 4, block: 0 }));
        assert_eq!(l.locate(4), Target::Single(Location { disk: 1, block: 1 }));
        assert_eq!(l.locate(9), Target::Single(Location { disk: 2, block: 2 }));
    }

    #[test]
    fn raid1_identity() {
        let l = layout(RaidLevel::Raid1, 3);

        assert_eq!(l.locate(0), Target::Mirrored(0));
        assert_eq!(l.locate(17), Target::Mirrored(17));
    }

    #[test]
    fn raid01_pairs() {
        let l = layout(RaidLevel::Raid01, 4);

        assert_eq!(
            l.locate(0),
            Target::Paired(Location { disk: 1, block: 0 }, Location { disk: 3, block: 0 })
        );
        assert_eq!(
            l.locate(1),
            Target::Paired(Location { disk: 2, block: 0 }, Location { disk: 4, block: 0 })
        );
        assert_eq!(
            l.locate(2),
            Target::Paired(Location { disk: 1, block: 1 }, Location { disk: 3, block: 1 })
        );
    }

    #[test]
    fn raid01_odd_disk_count_leaves_spare() {
        let l = layout(RaidLevel::Raid01, 5);

        // Striping never reaches disk 5.
        for block in 0..l.logical_blocks(16) {
            match l.locate(block) {
                Target::Paired(primary, partner) => {
                    assert!(primary.disk <= 2);
                    assert!(partner.disk > 2 && partner.disk <= 4);
                    assert_eq!(partner.disk, primary.disk + 2);
                },
                other => panic!("unexpected target {:?}", other),
            }
        }

        assert_eq!(l.mirror_partner(1), Some(3));
        assert_eq!(l.mirror_partner(4), Some(2));
        assert_eq!(l.mirror_partner(5), None);
    }

    #[test]
    fn raid4_fixed_parity() {
        let l = layout(RaidLevel::Raid4, 5);

        assert_eq!(
            l.locate(0),
            Target::Parity {
                data: Location { disk: 1, block: 0 },
                parity: Location { disk: 5, block: 0 },
            }
        );
        assert_eq!(
            l.locate(6),
            Target::Parity {
                data: Location { disk: 3, block: 1 },
                parity: Location { disk: 5, block: 1 },
            }
        );

        // The parity disk never holds data.
        for block in 0..l.logical_blocks(32) {
            match l.locate(block) {
                Target::Parity { data, parity } => {
                    assert!(data.disk < 5);
                    assert_eq!(parity.disk, 5);
                    assert_eq!(data.block, parity.block);
                },
                other => panic!("unexpected target {:?}", other),
            }
        }
    }

    #[test]
    fn raid5_parity_rotates() {
        let l = layout(RaidLevel::Raid5, 5);

        // Stripe 0 keeps its parity on disk 1, stripe 1 on disk 2, and so on around.
        for stripe in 0..10 {
            match l.locate(stripe * 4) {
                Target::Parity { parity, .. } => {
                    assert_eq!(parity.disk, stripe % 5 + 1);
                    assert_eq!(parity.block, stripe);
                },
                other => panic!("unexpected target {:?}", other),
            }
        }
    }

    #[test]
    fn raid5_stripe_members_are_distinct() {
        let l = layout(RaidLevel::Raid5, 5);

        for stripe in 0..16 {
            let mut seen = [false; 6];

            for position in 0..4 {
                match l.locate(stripe * 4 + position) {
                    Target::Parity { data, parity } => {
                        assert_eq!(data.block, stripe);
                        assert_ne!(data.disk, parity.disk);
                        assert!(!seen[data.disk], "disk {} used twice in stripe", data.disk);
                        seen[data.disk] = true;
                    },
                    other => panic!("unexpected target {:?}", other),
                }
            }

            // Four distinct data disks plus the parity disk cover all five disks.
            match l.locate(stripe * 4) {
                Target::Parity { parity, .. } => assert!(!seen[parity.disk]),
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn raid5_placement_is_injective() {
        let l = layout(RaidLevel::Raid5, 5);
        let per_disk = 8;
        let mut used = vec![false; 6 * per_disk];

        for block in 0..l.logical_blocks(per_disk) {
            match l.locate(block) {
                Target::Parity { data, .. } => {
                    let slot = data.disk * per_disk + data.block;
                    assert!(!used[slot], "two logical blocks share {:?}", data);
                    used[slot] = true;
                },
                _ => unreachable!(),
            }
        }
    }
}
