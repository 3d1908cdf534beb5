//! The array orchestrator.
//!
//! `RaidArray` composes the translator, the lock table, and the parity arithmetic into the
//! public operations. Every operation follows the same shape: check the lifecycle state, check
//! ranges, translate the logical address, acquire the locks of every disk the operation touches
//! (ascending), consult the failure flags under those locks, and only then perform device I/O.

use parking_lot::{RwLock, RwLockWriteGuard};
use slog::Logger;

use disk::{BlockBuf, BlockNumber, Disk, BLOCK_SIZE};
use raid::Error;
use raid::layout::{Layout, Location, Target};
use raid::level::RaidLevel;
use raid::parity;
use raid::slots::{Slot, Slots};

/// The shape of a booted array.
struct Config {
    /// The address translator for the active level.
    layout: Layout,
    /// The number of logical blocks the array exposes.
    logical_blocks: BlockNumber,
}

/// The numbers `info` reports about a booted array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArrayInfo {
    /// The number of logical blocks.
    pub logical_blocks: BlockNumber,
    /// The block size, in bytes.
    pub block_size: usize,
    /// The number of backing disks.
    pub disks: usize,
}

/// A software RAID array over a fixed set of backing disks.
///
/// The array starts out unbooted; every operation except `init` fails with `NotInitialized`
/// until `init` picks a level. All operations take `&self` and block until complete, so the
/// array can be shared between threads behind an `Arc`.
///
/// The outer lifecycle lock is read-held by every data-path operation and write-held by
/// `init`/`destroy`, so the configuration can never change under an in-flight operation.
pub struct RaidArray<D> {
    /// The lock table owning the backing disks.
    slots: Slots<D>,
    /// The per-disk capacity, in blocks.
    per_disk: BlockNumber,
    /// The active configuration; `None` while the array is not booted.
    config: RwLock<Option<Config>>,
    /// The logger.
    log: Logger,
}

impl<D: Disk> RaidArray<D> {
    /// Construct an (unbooted) array over `disks`.
    ///
    /// The disks are numbered 1 and up, in the order given. They must all expose the same
    /// number of blocks.
    pub fn new(disks: Vec<D>, log: Logger) -> Result<RaidArray<D>, Error> {
        if disks.len() < 2 {
            return Err(Error::TooFewDisks);
        }

        let per_disk = disks[0].number_of_blocks();
        if disks.iter().any(|disk| disk.number_of_blocks() != per_disk) {
            return Err(Error::SizeMismatch);
        }

        Ok(RaidArray {
            slots: Slots::new(disks),
            per_disk: per_disk,
            config: RwLock::new(None),
            log: log,
        })
    }

    /// Boot the array with redundancy scheme `level`.
    ///
    /// This clears every failure flag left over from a previous generation and derives the
    /// logical capacity from the level and the per-disk capacity.
    pub fn init(&self, level: RaidLevel) -> Result<(), Error> {
        let mut state = self.config.write();
        if state.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        self.slots.clear_failed();

        let layout = Layout {
            level: level,
            disks: self.slots.len(),
        };
        let logical_blocks = layout.logical_blocks(self.per_disk);

        info!(self.log, "array initialised";
              "level" => level.name(),
              "disks" => self.slots.len(),
              "logical_blocks" => logical_blocks);

        *state = Some(Config {
            layout: layout,
            logical_blocks: logical_blocks,
        });

        Ok(())
    }

    /// Report the array's logical capacity, block size, and disk count.
    pub fn info(&self) -> Result<ArrayInfo, Error> {
        let state = self.config.read();
        match *state {
            Some(ref config) => Ok(ArrayInfo {
                logical_blocks: config.logical_blocks,
                block_size: BLOCK_SIZE,
                disks: self.slots.len(),
            }),
            None => Err(Error::NotInitialized),
        }
    }

    /// Unboot the array.
    ///
    /// Failure flags are not touched here; the next `init` resets them.
    pub fn destroy(&self) -> Result<(), Error> {
        let mut state = self.config.write();
        if state.take().is_some() {
            info!(self.log, "array destroyed");
        }

        Ok(())
    }

    /// Read logical block `block` into `buf`.
    ///
    /// If the block's primary location is on a failed disk, the read is served through the
    /// remaining redundancy: another mirror copy, or XOR reconstruction from the stripe's
    /// surviving members. A read never writes, not even while reconstructing.
    pub fn read(&self, block: BlockNumber, buf: &mut BlockBuf) -> Result<(), Error> {
        let state = self.config.read();
        let config = match *state {
            Some(ref config) => config,
            None => return Err(Error::NotInitialized),
        };
        if block >= config.logical_blocks {
            return Err(Error::OutOfRange { block: block });
        }

        match config.layout.locate(block) {
            Target::Single(location) => {
                let slot = self.slots.read(location.disk);
                if slot.failed {
                    return Err(Error::DataUnavailable);
                }
                slot.disk.read(location.block, buf);

                Ok(())
            },
            Target::Mirrored(physical) => {
                // Serve from the first healthy disk, scanning the whole set in fixed order.
                for disk in 1..self.slots.len() + 1 {
                    let slot = self.slots.read(disk);
                    if !slot.failed {
                        slot.disk.read(physical, buf);
                        return Ok(());
                    }
                }

                Err(Error::DataUnavailable)
            },
            Target::Paired(primary, partner) => {
                {
                    let slot = self.slots.read(primary.disk);
                    if !slot.failed {
                        slot.disk.read(primary.block, buf);
                        return Ok(());
                    }
                }

                let slot = self.slots.read(partner.disk);
                if slot.failed {
                    return Err(Error::DataUnavailable);
                }
                slot.disk.read(partner.block, buf);

                Ok(())
            },
            Target::Parity { data, .. } => {
                {
                    let slot = self.slots.read(data.disk);
                    if !slot.failed {
                        slot.disk.read(data.block, buf);
                        return Ok(());
                    }
                }

                debug!(self.log, "reconstructing degraded block";
                       "block" => block,
                       "disk" => data.disk);
                self.reconstruct(data, buf)
            },
        }
    }

    /// Write `data` to logical block `block`.
    ///
    /// Mirrored levels write every healthy copy; parity levels maintain the stripe's parity in
    /// the same critical section as the data write, so concurrent operations on the same stripe
    /// never observe data and parity out of step.
    pub fn write(&self, block: BlockNumber, data: &BlockBuf) -> Result<(), Error> {
        let state = self.config.read();
        let config = match *state {
            Some(ref config) => config,
            None => return Err(Error::NotInitialized),
        };
        if block >= config.logical_blocks {
            return Err(Error::OutOfRange { block: block });
        }

        match config.layout.locate(block) {
            Target::Single(location) => {
                let mut slot = self.slots.write(location.disk);
                if slot.failed {
                    return Err(Error::DataUnavailable);
                }
                slot.disk.write(location.block, data);

                Ok(())
            },
            Target::Mirrored(physical) => {
                // The whole mirror set is locked at once so every copy moves together.
                let mut guards = self.slots.write_all();
                let mut written = false;

                for slot in guards.iter_mut() {
                    if !slot.failed {
                        slot.disk.write(physical, data);
                        written = true;
                    }
                }

                // A partially degraded mirror set still succeeds; only a fully failed one
                // cannot take the write.
                if written {
                    Ok(())
                } else {
                    Err(Error::DataUnavailable)
                }
            },
            Target::Paired(primary, partner) => {
                let (mut first, mut second) = self.slots.write_pair(primary.disk, partner.disk);
                let mut written = false;

                if !first.failed {
                    first.disk.write(primary.block, data);
                    written = true;
                }
                if !second.failed {
                    second.disk.write(partner.block, data);
                    written = true;
                }

                if written {
                    Ok(())
                } else {
                    Err(Error::DataUnavailable)
                }
            },
            Target::Parity { data: location, parity } => {
                self.parity_write(location, parity, data)
            },
        }
    }

    /// The RAID4/RAID5 read-modify-write.
    ///
    /// Data and parity disk are locked together for the whole sequence. Without a live parity
    /// disk the write is rejected before any device is touched: writing the data alone would
    /// leave the stripe's parity stale.
    fn parity_write(&self, location: Location, parity: Location, new: &BlockBuf) -> Result<(), Error> {
        let (mut data_slot, mut parity_slot) = self.slots.write_pair(location.disk, parity.disk);

        if parity_slot.failed {
            return Err(Error::DataUnavailable);
        }

        let mut parity_buf = [0; BLOCK_SIZE];
        parity_slot.disk.read(parity.block, &mut parity_buf);

        if data_slot.failed {
            // The data disk cannot take the block. Fold the new content into the parity so a
            // later reconstruction serves it; the old data cannot be read back out of the
            // parity, so its contribution is taken as zero.
            parity::xor(&mut parity_buf, new);
            parity_slot.disk.write(parity.block, &parity_buf);

            return Ok(());
        }

        // Subtract the old data from the parity, add the new, and write both.
        let mut old = [0; BLOCK_SIZE];
        data_slot.disk.read(location.block, &mut old);
        parity::xor(&mut parity_buf, &old);
        parity::xor(&mut parity_buf, new);

        data_slot.disk.write(location.block, new);
        parity_slot.disk.write(parity.block, &parity_buf);

        Ok(())
    }

    /// Rebuild one missing stripe member by folding all the others together.
    ///
    /// The flag probe that routed us here happened under a different lock; the full lock set is
    /// taken shared and the situation re-evaluated under it.
    fn reconstruct(&self, target: Location, buf: &mut BlockBuf) -> Result<(), Error> {
        let guards = self.slots.read_all();

        // The disk may have been repaired between the probe and retaking the locks.
        if !guards[target.disk - 1].failed {
            guards[target.disk - 1].disk.read(target.block, buf);
            return Ok(());
        }

        // Single parity tolerates exactly one missing member.
        if guards.iter().enumerate().any(|(i, slot)| i + 1 != target.disk && slot.failed) {
            return Err(Error::DataUnavailable);
        }

        *buf = [0; BLOCK_SIZE];
        let mut member = [0; BLOCK_SIZE];
        for (i, slot) in guards.iter().enumerate() {
            if i + 1 == target.disk {
                continue;
            }
            slot.disk.read(target.block, &mut member);
            parity::xor(buf, &member);
        }

        Ok(())
    }

    /// Mark disk `disk` failed.
    ///
    /// No I/O happens; the disk simply stops taking reads and writes, and degraded paths take
    /// over for blocks depending on it. Failing an already-failed disk is rejected.
    pub fn disk_fail(&self, disk: usize) -> Result<(), Error> {
        let state = self.config.read();
        if state.is_none() {
            return Err(Error::NotInitialized);
        }
        if disk < 1 || disk > self.slots.len() {
            return Err(Error::BadDisk { disk: disk });
        }

        let mut slot = self.slots.write(disk);
        if slot.failed {
            return Err(Error::AlreadyFailed { disk: disk });
        }
        slot.failed = true;

        warn!(self.log, "disk marked failed"; "disk" => disk);

        Ok(())
    }

    /// Repair disk `disk`: rebuild its content, then mark it healthy again.
    ///
    /// The rebuild scans the full array and holds every disk exclusively for its whole
    /// duration. If the rebuild is impossible (`Unrecoverable`), the disk stays failed.
    pub fn disk_repaired(&self, disk: usize) -> Result<(), Error> {
        let state = self.config.read();
        let config = match *state {
            Some(ref config) => config,
            None => return Err(Error::NotInitialized),
        };
        if disk < 1 || disk > self.slots.len() {
            return Err(Error::BadDisk { disk: disk });
        }

        let mut guards = self.slots.write_all();
        if !guards[disk - 1].failed {
            return Err(Error::NotFailed { disk: disk });
        }

        match config.layout.level {
            // Nothing to rebuild from.
            RaidLevel::Raid0 => return Err(Error::Unrecoverable),
            RaidLevel::Raid1 => self.rebuild_mirror(&mut guards, disk)?,
            RaidLevel::Raid01 => self.rebuild_pair(config.layout, &mut guards, disk)?,
            RaidLevel::Raid4 | RaidLevel::Raid5 => self.rebuild_parity(&mut guards, disk)?,
        }

        guards[disk - 1].failed = false;

        info!(self.log, "disk rebuilt"; "disk" => disk, "level" => config.layout.level.name());

        Ok(())
    }

    /// RAID1 rebuild: copy every block from any healthy disk.
    fn rebuild_mirror(&self, guards: &mut [RwLockWriteGuard<Slot<D>>], target: usize) -> Result<(), Error> {
        let source = match guards.iter().position(|slot| !slot.failed) {
            Some(i) => i,
            None => return Err(Error::Unrecoverable),
        };

        self.copy_blocks(guards, source, target - 1);

        Ok(())
    }

    /// RAID0+1 rebuild: copy every block from the disk's mirror partner.
    fn rebuild_pair(&self, layout: Layout, guards: &mut [RwLockWriteGuard<Slot<D>>], target: usize) -> Result<(), Error> {
        let partner = match layout.mirror_partner(target) {
            Some(partner) => partner,
            // The spare disk outside both mirror halves holds no data.
            None => return Ok(()),
        };

        if guards[partner - 1].failed {
            return Err(Error::Unrecoverable);
        }

        self.copy_blocks(guards, partner - 1, target - 1);

        Ok(())
    }

    /// RAID4/RAID5 rebuild: recompute every block position as the XOR of all other disks.
    ///
    /// This covers both cases at once: where the rebuilt disk held data, the fold of the other
    /// data disks with the parity yields the data; where it held the stripe's parity, the fold
    /// of the data disks yields the parity.
    fn rebuild_parity(&self, guards: &mut [RwLockWriteGuard<Slot<D>>], target: usize) -> Result<(), Error> {
        // A second failed disk makes the stripes unsolvable.
        if guards.iter().enumerate().any(|(i, slot)| i + 1 != target && slot.failed) {
            return Err(Error::Unrecoverable);
        }

        let mut member = [0; BLOCK_SIZE];
        for block in 0..self.per_disk {
            let mut buf = [0; BLOCK_SIZE];
            for i in 0..guards.len() {
                if i + 1 == target {
                    continue;
                }
                guards[i].disk.read(block, &mut member);
                parity::xor(&mut buf, &member);
            }
            guards[target - 1].disk.write(block, &buf);
        }

        Ok(())
    }

    /// Copy all blocks from `source` to `target` (0-based table indices).
    fn copy_blocks(&self, guards: &mut [RwLockWriteGuard<Slot<D>>], source: usize, target: usize) {
        let mut buf = [0; BLOCK_SIZE];
        for block in 0..self.per_disk {
            guards[source].disk.read(block, &mut buf);
            guards[target].disk.write(block, &buf);
        }
    }
}
