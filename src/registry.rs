//! Plugin registry and dispatch tables (spec §4.4).
//!
//! Three disjoint handler tables indexed by tag, master mode, and slave
//! mode respectively; each entry is either unbound or bound to one
//! `(plugin, callable)`. Tag/mode handles are allocated sequentially from a
//! per-category counter (so a plugin never invents its own tag number);
//! plugin handles are randomly drawn 64-bit ids with collision retry,
//! mirroring `RayPlatform::ComputeCore::generatePluginHandle`. Symbols let
//! cooperating plugins resolve each other's handles by name at boot
//! instead of by integer, the same role `__DeclarePlugin`/`__ConfigureXxx`
//! macros play in RayPlatform.

use std::collections::{HashMap, HashSet};

use rand::Rng;

use crate::error::EngineError;
use crate::message::Message;
use crate::tag::{Tag, ROUTING_TAG_BASE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MasterMode(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlaveMode(pub u32);

/// A handle a symbol can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    Tag(Tag),
    Master(MasterMode),
    Slave(SlaveMode),
}

/// Human-facing plugin metadata, used for introspection/diagnostics only —
/// never consulted by dispatch itself.
#[derive(Debug, Clone, Default)]
pub struct PluginInfo {
    pub name: String,
    pub author: String,
    pub license: String,
}

struct PluginRecord {
    info: PluginInfo,
    owned_tags: HashSet<Tag>,
    owned_master_modes: HashSet<MasterMode>,
    owned_slave_modes: HashSet<SlaveMode>,
}

pub type TagCallback = Box<dyn FnMut(&Message) -> Vec<Message> + Send>;
pub type ModeCallback = Box<dyn FnMut() -> Vec<Message> + Send>;

struct TagEntry {
    owner: PluginHandle,
    callback: TagCallback,
}

struct ModeEntry {
    owner: PluginHandle,
    callback: ModeCallback,
}

#[derive(Default)]
pub struct Registry {
    plugins: HashMap<PluginHandle, PluginRecord>,
    tag_handlers: HashMap<Tag, TagEntry>,
    master_mode_handlers: HashMap<MasterMode, ModeEntry>,
    slave_mode_handlers: HashMap<SlaveMode, ModeEntry>,
    symbols: HashMap<String, Handle>,
    next_tag: u32,
    next_master_mode: u32,
    next_slave_mode: u32,
    reserved_tags: HashSet<Tag>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Withhold `tag` from [`Registry::allocate_tag`]. Used by the engine to
    /// reserve its internal ack tag before any plugin registers, so a
    /// sequentially-allocated application tag can never collide with it —
    /// without this, an ack tag equal to a plugin's tag would shadow that
    /// tag's handler (the ack check runs before dispatch).
    pub fn reserve_tag(&mut self, tag: Tag) {
        self.reserved_tags.insert(tag);
    }

    /// Draw a fresh random 64-bit plugin handle, retrying on collision.
    pub fn register_plugin(&mut self, info: PluginInfo) -> PluginHandle {
        let mut rng = rand::thread_rng();
        loop {
            let candidate = PluginHandle(rng.gen());
            if !self.plugins.contains_key(&candidate) {
                self.plugins.insert(
                    candidate,
                    PluginRecord {
                        info,
                        owned_tags: HashSet::new(),
                        owned_master_modes: HashSet::new(),
                        owned_slave_modes: HashSet::new(),
                    },
                );
                return candidate;
            }
        }
    }

    pub fn plugin_info(&self, handle: PluginHandle) -> Option<&PluginInfo> {
        self.plugins.get(&handle).map(|r| &r.info)
    }

    /// Allocate the next application tag for `plugin`. Tags are handed out
    /// sequentially and must stay below `ROUTING_TAG_BASE`; the runtime
    /// tags (phase transitions, keep-alive, key-value transfer) are
    /// reserved before any plugin registration begins, by simply being
    /// allocated first via this same call.
    pub fn allocate_tag(&mut self, plugin: PluginHandle) -> Result<Tag, EngineError> {
        let record = self
            .plugins
            .get_mut(&plugin)
            .ok_or_else(|| EngineError::Configuration("unknown plugin handle".into()))?;
        while self.reserved_tags.contains(&Tag(self.next_tag)) {
            self.next_tag += 1;
        }
        if self.next_tag >= ROUTING_TAG_BASE {
            return Err(EngineError::Configuration(format!(
                "tag space exhausted: cannot allocate beyond {ROUTING_TAG_BASE}"
            )));
        }
        let tag = Tag(self.next_tag);
        self.next_tag += 1;
        record.owned_tags.insert(tag);
        Ok(tag)
    }

    pub fn allocate_master_mode(&mut self, plugin: PluginHandle) -> Result<MasterMode, EngineError> {
        let record = self
            .plugins
            .get_mut(&plugin)
            .ok_or_else(|| EngineError::Configuration("unknown plugin handle".into()))?;
        let mode = MasterMode(self.next_master_mode);
        self.next_master_mode += 1;
        record.owned_master_modes.insert(mode);
        Ok(mode)
    }

    pub fn allocate_slave_mode(&mut self, plugin: PluginHandle) -> Result<SlaveMode, EngineError> {
        let record = self
            .plugins
            .get_mut(&plugin)
            .ok_or_else(|| EngineError::Configuration("unknown plugin handle".into()))?;
        let mode = SlaveMode(self.next_slave_mode);
        self.next_slave_mode += 1;
        record.owned_slave_modes.insert(mode);
        Ok(mode)
    }

    pub fn bind_tag_handler(
        &mut self,
        plugin: PluginHandle,
        tag: Tag,
        callback: TagCallback,
    ) -> Result<(), EngineError> {
        if !tag.is_application_tag() {
            return Err(EngineError::Configuration(format!(
                "tag {tag} is out of the application range"
            )));
        }
        let record = self
            .plugins
            .get(&plugin)
            .ok_or_else(|| EngineError::Configuration("unknown plugin handle".into()))?;
        if !record.owned_tags.contains(&tag) {
            return Err(EngineError::Configuration(format!(
                "plugin does not own tag {tag}; allocate_tag must be called first"
            )));
        }
        if self.tag_handlers.contains_key(&tag) {
            return Err(EngineError::Configuration(format!(
                "tag {tag} already has a registered handler"
            )));
        }
        self.tag_handlers.insert(tag, TagEntry { owner: plugin, callback });
        Ok(())
    }

    pub fn bind_master_mode_handler(
        &mut self,
        plugin: PluginHandle,
        mode: MasterMode,
        callback: ModeCallback,
    ) -> Result<(), EngineError> {
        let record = self
            .plugins
            .get(&plugin)
            .ok_or_else(|| EngineError::Configuration("unknown plugin handle".into()))?;
        if !record.owned_master_modes.contains(&mode) {
            return Err(EngineError::Configuration("plugin does not own this master mode".into()));
        }
        self.master_mode_handlers.insert(mode, ModeEntry { owner: plugin, callback });
        Ok(())
    }

    pub fn bind_slave_mode_handler(
        &mut self,
        plugin: PluginHandle,
        mode: SlaveMode,
        callback: ModeCallback,
    ) -> Result<(), EngineError> {
        let record = self
            .plugins
            .get(&plugin)
            .ok_or_else(|| EngineError::Configuration("unknown plugin handle".into()))?;
        if !record.owned_slave_modes.contains(&mode) {
            return Err(EngineError::Configuration("plugin does not own this slave mode".into()));
        }
        self.slave_mode_handlers.insert(mode, ModeEntry { owner: plugin, callback });
        Ok(())
    }

    /// Register a name that resolves to `handle`. Fails if the name is
    /// already taken by a different handle — "each symbol resolves back to
    /// a unique tag/mode" (spec §3 registry invariant).
    pub fn register_symbol(&mut self, symbol: &str, handle: Handle) -> Result<(), EngineError> {
        if let Some(existing) = self.symbols.get(symbol) {
            if *existing != handle {
                return Err(EngineError::Configuration(format!("duplicate symbol: {symbol}")));
            }
            return Ok(());
        }
        self.symbols.insert(symbol.to_string(), handle);
        Ok(())
    }

    pub fn resolve_symbol(&self, symbol: &str) -> Option<Handle> {
        self.symbols.get(symbol).copied()
    }

    /// Fatal if any of `required` was never registered — called once at
    /// boot, after all plugins have had a chance to register.
    pub fn resolve_symbols(&self, required: &[&str]) -> Result<(), EngineError> {
        for symbol in required {
            if !self.symbols.contains_key(*symbol) {
                return Err(EngineError::UnresolvedSymbol((*symbol).to_string()));
            }
        }
        Ok(())
    }

    /// Invoke the handler bound to `tag`, if any. Returns `None` if no
    /// handler is registered (an unknown tag on ingress is discarded with a
    /// warning upstream, never fatal — spec §7).
    pub fn dispatch_tag(&mut self, tag: Tag, message: &Message) -> Option<Vec<Message>> {
        self.tag_handlers.get_mut(&tag).map(|entry| (entry.callback)(message))
    }

    pub fn has_tag_handler(&self, tag: Tag) -> bool {
        self.tag_handlers.contains_key(&tag)
    }

    pub fn tick_master_mode(&mut self, mode: MasterMode) -> Vec<Message> {
        self.master_mode_handlers
            .get_mut(&mode)
            .map(|entry| (entry.callback)())
            .unwrap_or_default()
    }

    pub fn tick_slave_mode(&mut self, mode: SlaveMode) -> Vec<Message> {
        self.slave_mode_handlers
            .get_mut(&mode)
            .map(|entry| (entry.callback)())
            .unwrap_or_default()
    }
}
