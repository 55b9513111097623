// src/claim/mod.rs

//! Filesystem-based claiming of work items.
//!
//! Each item has at most one descriptor in the claims directory:
//!
//! - `<id>.unclaimed`: offered, nobody works on it;
//! - `<id>.claimed`: a worker owns it;
//! - no file: never offered, or consumed after the full pipeline succeeded.
//!
//! The unclaimed → claimed transition is a hard link followed by removing
//! the unclaimed name. Linking fails when the claimed name exists, so among
//! workers racing for the same item exactly one wins.

pub mod shard;

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::Result;

pub use shard::ShardSpec;

const UNCLAIMED: &str = "unclaimed";
const CLAIMED: &str = "claimed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState {
    Absent,
    Unclaimed,
    Claimed,
}

#[derive(Debug, Clone)]
pub struct WorkClaimer {
    dir: PathBuf,
    shard: ShardSpec,
}

impl WorkClaimer {
    pub fn new(dir: impl Into<PathBuf>, shard: ShardSpec) -> Self {
        Self {
            dir: dir.into(),
            shard,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn shard(&self) -> ShardSpec {
        self.shard
    }

    fn descriptor(&self, item: &str, suffix: &str) -> PathBuf {
        self.dir.join(format!("{item}.{suffix}"))
    }

    pub fn state(&self, item: &str) -> ClaimState {
        if self.descriptor(item, CLAIMED).exists() {
            ClaimState::Claimed
        } else if self.descriptor(item, UNCLAIMED).exists() {
            ClaimState::Unclaimed
        } else {
            ClaimState::Absent
        }
    }

    /// Create the unclaimed descriptor unless the item already has one in
    /// either form. Returns `true` if a descriptor was created.
    pub fn offer(&self, item: &str) -> Result<bool> {
        fs::create_dir_all(&self.dir)?;
        if self.descriptor(item, CLAIMED).exists() {
            return Ok(false);
        }

        let path = self.descriptor(item, UNCLAIMED);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(item.as_bytes())?;
                debug!(item, "claim descriptor offered");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Try to take ownership of an offered item.
    ///
    /// The claimed descriptor is created as a hard link to the unclaimed one,
    /// which fails if a claimed descriptor already exists. Exactly one worker
    /// wins even when an offer races with another worker's claim. Returns
    /// `false` when the claim is lost.
    pub fn claim(&self, item: &str) -> Result<bool> {
        let unclaimed = self.descriptor(item, UNCLAIMED);
        let claimed = self.descriptor(item, CLAIMED);
        match fs::hard_link(&unclaimed, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(item, "claim lost to another worker");
                return Ok(false);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // Our offer came after the winner's claim.
                remove_if_exists(&unclaimed)?;
                debug!(item, "item already claimed by another worker");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }
        remove_if_exists(&unclaimed)?;

        let owner = format!(
            "worker {}/{} pid {}\n",
            self.shard.index,
            self.shard.count,
            std::process::id()
        );
        fs::write(&claimed, owner)?;
        debug!(item, shard = %self.shard, "item claimed");
        Ok(true)
    }

    /// Delete the claimed descriptor once the item is fully done.
    pub fn release(&self, item: &str) -> Result<()> {
        match fs::remove_file(self.descriptor(item, CLAIMED)) {
            Ok(()) => {
                debug!(item, "claim released");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(item, "released a claim that was not held");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Give an item back after a failed attempt so a later run can retry it.
    pub fn relinquish(&self, item: &str) -> Result<()> {
        let claimed = self.descriptor(item, CLAIMED);
        let unclaimed = self.descriptor(item, UNCLAIMED);
        match fs::rename(&claimed, &unclaimed) {
            Ok(()) => {
                fs::write(&unclaimed, item)?;
                debug!(item, "claim relinquished");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Return claimed descriptors of the given items to the unclaimed state.
    ///
    /// Only meant to be run out of band, when no worker of this shard is
    /// alive. Returns the items that were swept.
    pub fn sweep_stale<'a>(&self, items: impl IntoIterator<Item = &'a str>) -> Result<Vec<String>> {
        let mut swept = Vec::new();
        for item in items {
            let claimed = self.descriptor(item, CLAIMED);
            let unclaimed = self.descriptor(item, UNCLAIMED);
            if !claimed.exists() || unclaimed.exists() {
                continue;
            }
            match fs::rename(&claimed, &unclaimed) {
                Ok(()) => {
                    fs::write(&unclaimed, item)?;
                    swept.push(item.to_string());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if !swept.is_empty() {
            info!(count = swept.len(), items = ?swept, "stale claims swept");
        }
        Ok(swept)
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
