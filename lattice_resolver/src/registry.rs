//! The module registry — arena of live modules plus all mutable resolver
//! state, guarded by one registry-wide mutex (the "factory lock").
//!
//! Everything the resolver mutates lives behind this single lock: the
//! module arena, the resolved/wire state per module, and the in-use
//! capability map. Resolver internals receive `&mut RegistryInner` and
//! never re-lock; public accessors take the lock briefly and clone out
//! `Arc` snapshots.
//!
//! Module add/remove listeners use a separate monitor with copy-on-write
//! snapshot arrays, so event delivery never holds the factory lock and a
//! listener may freely call back into the registry.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use lattice_core::{Capability, ModuleDefinition};
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use tracing::error;

use crate::module::{ContentLoader, ModuleHandle, ModuleId, SecurityContext};
use crate::source::PackageSource;
use crate::wire::Wire;

// =============================================================================
// Events & listeners
// =============================================================================

/// Notification payload for module and resolver listeners.
#[derive(Debug, Clone)]
pub struct ModuleEvent {
    pub module: ModuleHandle,
    pub id: ModuleId,
    /// Resolution state of the module at the time the event was raised.
    pub resolved: bool,
}

/// Observer of registry membership. Registration order is delivery order.
pub trait ModuleListener: Send + Sync {
    fn module_added(&self, _event: &ModuleEvent) {}
    fn module_removed(&self, _event: &ModuleEvent) {}
}

/// Deliver one event to one listener, isolating panics so a misbehaving
/// listener cannot starve the rest of the snapshot.
pub(crate) fn deliver(what: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!("listener panicked during {} delivery", what);
    }
}

// =============================================================================
// Registry
// =============================================================================

/// One live module: its identity, frozen definition, and host seams.
pub(crate) struct ModuleEntry {
    pub(crate) handle: ModuleHandle,
    pub(crate) id: ModuleId,
    pub(crate) definition: Arc<ModuleDefinition>,
    pub(crate) content: Arc<dyn ContentLoader>,
    pub(crate) security: Option<Arc<dyn SecurityContext>>,
}

/// Per-module resolver state.
#[derive(Default)]
struct ModuleData {
    resolved: bool,
    wires: Option<Arc<[Wire]>>,
}

/// State behind the factory lock.
#[derive(Default)]
pub(crate) struct RegistryInner {
    /// Arena of live modules; a removed module leaves a hole so handles
    /// stay stable and are never reused.
    slots: Vec<Option<ModuleEntry>>,
    /// Resolution state and wires, keyed by handle.
    data: FxHashMap<ModuleHandle, ModuleData>,
    /// Capabilities currently bound by at least one live wire (plus
    /// export-only capabilities of resolved modules).
    in_use: FxHashMap<ModuleHandle, Vec<Arc<Capability>>>,
}

impl RegistryInner {
    pub(crate) fn entry(&self, handle: ModuleHandle) -> Option<&ModuleEntry> {
        self.slots.get(handle.index()).and_then(|slot| slot.as_ref())
    }

    /// Live modules in handle (insertion) order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = &ModuleEntry> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    pub(crate) fn is_resolved(&self, handle: ModuleHandle) -> bool {
        self.data.get(&handle).map_or(false, |d| d.resolved)
    }

    pub(crate) fn set_resolved(&mut self, handle: ModuleHandle, resolved: bool) {
        self.data.entry(handle).or_default().resolved = resolved;
    }

    pub(crate) fn wires(&self, handle: ModuleHandle) -> Option<Arc<[Wire]>> {
        self.data.get(&handle).and_then(|d| d.wires.clone())
    }

    pub(crate) fn set_wires(&mut self, handle: ModuleHandle, wires: Arc<[Wire]>) {
        self.data.entry(handle).or_default().wires = Some(wires);
    }

    /// Append one wire, replacing the snapshot array.
    pub(crate) fn append_wire(&mut self, handle: ModuleHandle, wire: Wire) {
        let data = self.data.entry(handle).or_default();
        let mut list: Vec<Wire> = data.wires.as_deref().map(<[Wire]>::to_vec).unwrap_or_default();
        list.push(wire);
        data.wires = Some(Arc::from(list.into_boxed_slice()));
    }

    /// Capabilities of `handle` currently in use.
    pub(crate) fn in_use_for(&self, handle: ModuleHandle) -> &[Arc<Capability>] {
        self.in_use.get(&handle).map_or(&[], |caps| caps.as_slice())
    }

    pub(crate) fn is_capability_in_use(
        &self,
        handle: ModuleHandle,
        cap: &Arc<Capability>,
    ) -> bool {
        self.in_use_for(handle).iter().any(|c| Arc::ptr_eq(c, cap))
    }

    /// Record a capability as in use; idempotent.
    pub(crate) fn add_in_use(&mut self, handle: ModuleHandle, cap: Arc<Capability>) {
        let caps = self.in_use.entry(handle).or_default();
        if !caps.iter().any(|c| Arc::ptr_eq(c, &cap)) {
            caps.push(cap);
        }
    }

    /// Build a [`PackageSource`] for one capability of a live module.
    pub(crate) fn source_for(
        &self,
        handle: ModuleHandle,
        cap: &Arc<Capability>,
    ) -> Option<PackageSource> {
        let entry = self.entry(handle)?;
        let index = entry
            .definition
            .capabilities()
            .iter()
            .position(|c| Arc::ptr_eq(c, cap))
            .unwrap_or(0) as u32;
        Some(PackageSource::new(handle, index, cap.clone(), entry.id.bundle()))
    }
}

/// Arena of live modules plus the resolver's shared mutable state.
pub struct ModuleRegistry {
    inner: Mutex<RegistryInner>,
    listeners: Mutex<Arc<[Arc<dyn ModuleListener>]>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        let empty: Arc<[Arc<dyn ModuleListener>]> = Arc::new([]);
        ModuleRegistry {
            inner: Mutex::new(RegistryInner::default()),
            listeners: Mutex::new(empty),
        }
    }

    /// Install a module; returns the stable handle. Fires `module_added`.
    pub fn add_module(
        &self,
        id: ModuleId,
        definition: Arc<ModuleDefinition>,
        content: Arc<dyn ContentLoader>,
        security: Option<Arc<dyn SecurityContext>>,
    ) -> ModuleHandle {
        let handle = {
            let mut inner = self.inner.lock();
            let handle = ModuleHandle::new(inner.slots.len() as u32);
            inner.slots.push(Some(ModuleEntry {
                handle,
                id,
                definition,
                content,
                security,
            }));
            handle
        };

        self.fire(|l, ev| l.module_added(ev), ModuleEvent {
            module: handle,
            id,
            resolved: false,
        });
        handle
    }

    /// Remove a module, clearing its resolver state. Wires of other
    /// modules pointing at it are untouched; their lookups simply start
    /// missing. Fires `module_removed`.
    pub fn remove_module(&self, handle: ModuleHandle) -> bool {
        let event = {
            let mut inner = self.inner.lock();
            let Some(slot) = inner.slots.get_mut(handle.index()) else {
                return false;
            };
            let Some(entry) = slot.take() else {
                return false;
            };
            let resolved = inner.is_resolved(handle);
            inner.in_use.remove(&handle);
            inner.data.remove(&handle);
            ModuleEvent {
                module: handle,
                id: entry.id,
                resolved,
            }
        };

        self.fire(|l, ev| l.module_removed(ev), event);
        true
    }

    /// Handles of all live modules, in insertion order.
    pub fn modules(&self) -> Vec<ModuleHandle> {
        self.inner.lock().entries().map(|e| e.handle).collect()
    }

    pub fn module_id(&self, handle: ModuleHandle) -> Option<ModuleId> {
        self.inner.lock().entry(handle).map(|e| e.id)
    }

    pub fn definition(&self, handle: ModuleHandle) -> Option<Arc<ModuleDefinition>> {
        self.inner.lock().entry(handle).map(|e| e.definition.clone())
    }

    pub fn content_loader(&self, handle: ModuleHandle) -> Option<Arc<dyn ContentLoader>> {
        self.inner.lock().entry(handle).map(|e| e.content.clone())
    }

    pub fn is_resolved(&self, handle: ModuleHandle) -> bool {
        self.inner.lock().is_resolved(handle)
    }

    /// The module's committed wires; empty when unresolved.
    pub fn wires(&self, handle: ModuleHandle) -> Vec<Wire> {
        self.inner
            .lock()
            .wires(handle)
            .map(|w| w.to_vec())
            .unwrap_or_default()
    }

    /// The module's capabilities currently bound by live wires (or
    /// export-only promoted).
    pub fn in_use_capabilities(&self, handle: ModuleHandle) -> Vec<Arc<Capability>> {
        self.inner.lock().in_use_for(handle).to_vec()
    }

    /// Acquire the factory lock. Resolver internals run entirely inside
    /// one acquisition.
    pub(crate) fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock()
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn add_module_listener(&self, listener: Arc<dyn ModuleListener>) {
        let mut guard = self.listeners.lock();
        let mut list: Vec<Arc<dyn ModuleListener>> = guard.to_vec();
        list.push(listener);
        *guard = Arc::from(list.into_boxed_slice());
    }

    pub fn remove_module_listener(&self, listener: &Arc<dyn ModuleListener>) {
        let mut guard = self.listeners.lock();
        let list: Vec<Arc<dyn ModuleListener>> = guard
            .iter()
            .filter(|l| !Arc::ptr_eq(l, listener))
            .cloned()
            .collect();
        *guard = Arc::from(list.into_boxed_slice());
    }

    fn fire(&self, call: impl Fn(&dyn ModuleListener, &ModuleEvent), event: ModuleEvent) {
        let snapshot = self.listeners.lock().clone();
        for listener in snapshot.iter() {
            deliver("module event", || call(listener.as_ref(), &event));
        }
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        ModuleRegistry::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
