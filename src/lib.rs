//! The softraid library.
//!
//! This crate implements a software RAID layer: it combines a fixed set of equally sized block
//! devices into a single logical block address space with configurable redundancy. The supported
//! schemes are striping (RAID0), mirroring (RAID1), striped mirrors (RAID0+1), and single XOR
//! parity with a dedicated (RAID4) or rotating (RAID5) parity disk.
//!
//! The array is an explicit value, not process-global state: construct a `RaidArray` over any
//! types implementing the `Disk` trait, boot it with `init`, and share it freely between threads.
//! Every operation blocks the calling thread until it completes. Consistency across the disks a
//! single operation touches is provided by per-disk reader/writer locks, always acquired in
//! ascending disk order.
//!
//! Failed disks are bookkept explicitly: after `disk_fail`, reads of affected blocks are served
//! through the remaining redundancy (mirror copies, or XOR reconstruction for the parity levels),
//! and `disk_repaired` rebuilds the disk's full content from the surviving members before it
//! rejoins the array.

#[macro_use]
extern crate quick_error;
#[macro_use]
extern crate slog;
extern crate parking_lot;

#[cfg(test)]
extern crate rand;

mod disk;
mod raid;

pub use disk::{Disk, Memory, BlockBuf, BlockNumber, BLOCK_SIZE};
pub use raid::{ArrayInfo, Error, RaidArray, RaidLevel};
