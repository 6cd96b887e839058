//! Distributed phase machine (spec §4.3).
//!
//! Every rank runs the same slave-mode handler until it locally finishes,
//! at which point it sends a single acknowledgement to the master. Only
//! rank 0 runs master modes; a master mode's job is to broadcast the tag
//! that kicks off the pool's next slave mode and to count acknowledgements
//! until every rank has reported in, at which point it advances to the
//! next master mode in a pre-registered order. Grounded in
//! `Platform::scheduling::SwitchMan`: `getNextMasterMode` is
//! [`SwitchMan::next_master_mode`], `openMasterMode`/`sendToAll` is
//! [`SwitchMan::open_master_mode`], `openSlaveModeLocally` is
//! [`SwitchMan::open_slave_mode_locally`], and `closeSlaveModeLocally` is
//! [`SwitchMan::close_slave_mode_locally`].

use std::collections::HashMap;

use tracing::debug;

use crate::error::EngineError;
use crate::message::Message;
use crate::rank::{Rank, MASTER_RANK};
use crate::registry::{MasterMode, SlaveMode};
use crate::tag::Tag;

/// Terminal slave mode: a rank in this mode has nothing left to do and
/// ignores kickoff tags other than shutdown.
pub const NO_SLAVE_MODE: SlaveMode = SlaveMode(u32::MAX);

/// Terminal master mode: the program has no further phase to run.
pub const NO_MASTER_MODE: MasterMode = MasterMode(u32::MAX);

pub struct SwitchMan {
    size: usize,
    ack_tag: Tag,
    slave_mode: SlaveMode,
    master_mode: MasterMode,
    last_master_mode: MasterMode,
    counter: usize,
    master_mode_order: HashMap<MasterMode, MasterMode>,
    tag_to_slave_mode: HashMap<Tag, SlaveMode>,
    master_mode_to_tag: HashMap<MasterMode, Tag>,
}

impl SwitchMan {
    /// `ack_tag` is a runtime tag the engine allocates at boot (before any
    /// plugin registration) and uses exclusively to carry slave-mode
    /// completion acknowledgements back to the master.
    pub fn new(size: usize, ack_tag: Tag) -> Self {
        Self {
            size,
            ack_tag,
            slave_mode: NO_SLAVE_MODE,
            master_mode: NO_MASTER_MODE,
            last_master_mode: NO_MASTER_MODE,
            counter: 0,
            master_mode_order: HashMap::new(),
            tag_to_slave_mode: HashMap::new(),
            master_mode_to_tag: HashMap::new(),
        }
    }

    pub fn ack_tag(&self) -> Tag {
        self.ack_tag
    }

    pub fn slave_mode(&self) -> SlaveMode {
        self.slave_mode
    }

    pub fn set_slave_mode(&mut self, mode: SlaveMode) {
        self.slave_mode = mode;
    }

    pub fn master_mode(&self) -> MasterMode {
        self.master_mode
    }

    pub fn last_master_mode(&self) -> MasterMode {
        self.last_master_mode
    }

    pub fn set_first_master_mode(&mut self, mode: MasterMode) {
        self.master_mode = mode;
    }

    /// Register that `b` follows `a` in the master-mode program.
    pub fn add_next_master_mode(&mut self, a: MasterMode, b: MasterMode) {
        self.master_mode_order.insert(a, b);
    }

    /// Register that receiving `tag` puts a rank into `mode`.
    pub fn add_slave_switch(&mut self, tag: Tag, mode: SlaveMode) {
        self.tag_to_slave_mode.insert(tag, mode);
    }

    /// Register which tag a master mode broadcasts to kick off its slave mode.
    pub fn add_master_switch(&mut self, mode: MasterMode, tag: Tag) {
        self.master_mode_to_tag.insert(mode, tag);
    }

    pub fn next_master_mode(&self, current: MasterMode) -> Option<MasterMode> {
        self.master_mode_order.get(&current).copied()
    }

    /// Resolve `tag` to a slave mode via the registered switch table and
    /// enter it. Fatal if `tag` was never registered with
    /// [`SwitchMan::add_slave_switch`] — a kickoff tag with no destination
    /// mode is a program wiring bug, not a runtime condition to tolerate.
    pub fn open_slave_mode_locally(&mut self, tag: Tag) -> Result<(), EngineError> {
        let mode = self
            .tag_to_slave_mode
            .get(&tag)
            .copied()
            .ok_or_else(|| EngineError::Configuration(format!("tag {tag} has no registered slave mode")))?;
        debug!(mode = mode.0, "entering slave mode");
        self.slave_mode = mode;
        Ok(())
    }

    /// Broadcast the current master mode's kickoff tag to every rank in the
    /// pool, rank `self_rank` included.
    pub fn open_master_mode(&self, self_rank: Rank) -> Result<Vec<Message>, EngineError> {
        let tag = self.master_mode_to_tag.get(&self.master_mode).copied().ok_or_else(|| {
            EngineError::Configuration(format!("master mode {} has no registered kickoff tag", self.master_mode.0))
        })?;
        Ok((0..self.size as u32)
            .map(|destination| Message::new(self_rank, Rank(destination), tag, Vec::new()))
            .collect())
    }

    /// Advance to the next master mode and reset the acknowledgement
    /// counter. Fatal if the current master mode has no registered
    /// successor — the program must explicitly end the chain at
    /// [`NO_MASTER_MODE`].
    pub fn close_master_mode(&mut self) -> Result<(), EngineError> {
        let next = self.next_master_mode(self.master_mode).ok_or_else(|| {
            EngineError::Configuration(format!("master mode {} has no registered successor", self.master_mode.0))
        })?;
        self.last_master_mode = self.master_mode;
        self.master_mode = next;
        self.counter = 0;
        Ok(())
    }

    /// Build the acknowledgement `self_rank` sends to the master once its
    /// local slave-mode work is done. The master must still call
    /// [`SwitchMan::record_ack`] when it is delivered, including when
    /// `self_rank` is the master itself.
    pub fn close_slave_mode_locally(&self, self_rank: Rank) -> Message {
        Message::new(self_rank, MASTER_RANK, self.ack_tag, Vec::new())
    }

    /// Called by the master on receiving one acknowledgement.
    pub fn record_ack(&mut self) {
        self.counter += 1;
    }

    pub fn all_ranks_are_ready(&self) -> bool {
        self.counter >= self.size
    }

    pub fn acks_received(&self) -> usize {
        self.counter
    }
}
