//! RAID levels.

/// The redundancy scheme of an array.
///
/// The level is chosen at `init` and is immutable until the array is destroyed. All level
/// specific behavior (address translation, degraded paths, rebuild) dispatches on this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaidLevel {
    /// Striping: blocks are distributed round-robin over all disks, with no redundancy.
    Raid0,
    /// Mirroring: every disk holds a full copy of the logical address space.
    Raid1,
    /// Striped mirrors: the disks split into two halves, the second half mirroring the first,
    /// with RAID0 striping inside each half.
    Raid01,
    /// Block striping with a dedicated parity disk (the last disk).
    Raid4,
    /// Block striping with the parity block rotating over the disks per stripe.
    Raid5,
}

impl RaidLevel {
    /// The human-readable name of the level.
    pub fn name(self) -> &'static str {
        match self {
            RaidLevel::Raid0 => "RAID0",
            RaidLevel::Raid1 => "RAID1",
            RaidLevel::Raid01 => "RAID0+1",
            RaidLevel::Raid4 => "RAID4",
            RaidLevel::Raid5 => "RAID5",
        }
    }

    /// Does this level store any redundancy?
    ///
    /// A level without redundancy cannot serve degraded reads and cannot rebuild a repaired
    /// disk.
    pub fn redundant(self) -> bool {
        match self {
            RaidLevel::Raid0 => false,
            _ => true,
        }
    }
}
