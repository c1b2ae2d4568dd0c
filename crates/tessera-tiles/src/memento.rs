//! Undo history of a grid.
//!
//! # State machine per cell
//!
//! ```text
//! untouched ──register──► indexed ──commit──► committed (head)
//!                            ▲                    │
//!                            └──── next edit ─────┘
//! ```
//!
//! Items live in an arena addressed by `ItemId`. The *index* maps cells
//! to uncommitted items; *heads* maps cells to their newest committed
//! item. Each committed item links to its parent, the head it replaced,
//! so a cell's history is a chain through the arena. Revisions group the
//! items of one commit and are tagged with the [`Memento`] that was open,
//! if any.
//!
//! Rollback and rollforward compute the table edits under the history
//! lock and apply them after releasing it, so the lock order is always
//! table before history.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tessera_core::{MementoId, Rect, TileCoord};
use tessera_store::{StoreHandle, TileData, TileDataHandle};

use crate::hash_table::TileHashTable;
use crate::tile::Tile;

// ── Memento ─────────────────────────────────────────────────────

/// One commit boundary of a grid's history.
///
/// Obtained from [`MementoManager::get_memento`]; stays valid until a
/// purge removes its revision.
pub struct Memento {
    id: MementoId,
    valid: AtomicBool,
    inner: Mutex<MementoInner>,
}

#[derive(Default)]
struct MementoInner {
    extent: Rect,
    old_default: Option<Box<[u8]>>,
    new_default: Option<Box<[u8]>>,
}

impl Memento {
    fn new() -> Self {
        Self {
            id: MementoId::next(),
            valid: AtomicBool::new(true),
            inner: Mutex::new(MementoInner::default()),
        }
    }

    /// Unique id.
    pub fn id(&self) -> MementoId {
        self.id
    }

    /// Whether the memento's revision is still in history.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Bounding rectangle of every cell touched in this transaction.
    pub fn extent(&self) -> Rect {
        self.inner.lock().extent
    }

    /// Default pixel before and after the transaction, if it changed.
    pub fn default_pixel_change(&self) -> Option<(Box<[u8]>, Box<[u8]>)> {
        let inner = self.inner.lock();
        match (&inner.old_default, &inner.new_default) {
            (Some(old), Some(new)) => Some((old.clone(), new.clone())),
            _ => None,
        }
    }

    pub(crate) fn record_default_pixel(&self, old: &[u8], new: &[u8]) {
        let mut inner = self.inner.lock();
        if inner.old_default.is_none() {
            inner.old_default = Some(old.into());
        }
        inner.new_default = Some(new.into());
    }

    fn grow(&self, rect: Rect) {
        let mut inner = self.inner.lock();
        inner.extent = inner.extent.united(&rect);
    }

    fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Memento {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memento")
            .field("id", &self.id)
            .field("valid", &self.is_valid())
            .field("extent", &self.extent())
            .finish()
    }
}

// ── Items ───────────────────────────────────────────────────────

/// Index of an item in the history arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ItemId(usize);

/// What an item records about its cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ItemKind {
    /// The cell held the item's version.
    Changed,
    /// The cell was empty.
    Deleted,
}

struct MementoItem {
    coord: TileCoord,
    kind: ItemKind,
    data: Arc<TileData>,
    /// Set on commit; makes the version count as shared.
    user: Option<TileDataHandle>,
    parent: Option<ItemId>,
}

impl MementoItem {
    fn uncommitted(coord: TileCoord, kind: ItemKind, data: Arc<TileData>) -> Self {
        Self {
            coord,
            kind,
            data,
            user: None,
            parent: None,
        }
    }
}

struct Revision {
    memento: Option<Arc<Memento>>,
    items: Vec<ItemId>,
}

/// Edit to apply to the live table once the history lock is released.
enum TableEdit {
    Insert(TileCoord, Arc<TileData>),
    Remove(TileCoord),
}

/// Outcome of a successful [`MementoManager::rollback`] or
/// [`MementoManager::rollforward`].
#[derive(Debug)]
pub struct Replayed {
    /// The memento of the replayed revision; `None` for anonymous commits.
    pub memento: Option<Arc<Memento>>,
    /// Cells whose tile was inserted or removed.
    pub touched: Vec<TileCoord>,
}

// ── State ───────────────────────────────────────────────────────

struct State {
    items: Vec<Option<MementoItem>>,
    free: Vec<usize>,
    index: IndexMap<TileCoord, ItemId>,
    heads: IndexMap<TileCoord, ItemId>,
    revisions: VecDeque<Revision>,
    cancelled: Vec<Revision>,
    current: Option<Arc<Memento>>,
    default_data: Arc<TileData>,
}

impl State {
    fn alloc(&mut self, item: MementoItem) -> ItemId {
        match self.free.pop() {
            Some(i) => {
                self.items[i] = Some(item);
                ItemId(i)
            }
            None => {
                self.items.push(Some(item));
                ItemId(self.items.len() - 1)
            }
        }
    }

    fn item(&self, id: ItemId) -> Option<&MementoItem> {
        self.items.get(id.0)?.as_ref()
    }

    fn item_mut(&mut self, id: ItemId) -> Option<&mut MementoItem> {
        self.items.get_mut(id.0)?.as_mut()
    }

    fn index_item(&mut self, coord: TileCoord, kind: ItemKind, data: Arc<TileData>) {
        if let Some(&id) = self.index.get(&coord) {
            if let Some(item) = self.item_mut(id) {
                item.kind = kind;
                item.data = data;
                return;
            }
        }
        let id = self.alloc(MementoItem::uncommitted(coord, kind, data));
        self.index.insert(coord, id);
        if let Some(memento) = &self.current {
            memento.grow(coord.rect());
        }
    }

    /// Move the index into history. Returns whether a revision was added.
    fn commit(&mut self) -> bool {
        if self.index.is_empty() && self.current.is_none() {
            return false;
        }
        let memento = self.current.take();
        let ids: Vec<ItemId> = self.index.drain(..).map(|(_, id)| id).collect();
        for &id in &ids {
            let Some(coord) = self.item(id).map(|i| i.coord) else {
                continue;
            };
            let head = self.heads.get(&coord).copied();
            let parent = match head {
                Some(head) => head,
                None => self.deleted_root(coord),
            };
            if let Some(item) = self.item_mut(id) {
                item.parent = Some(parent);
                item.user = Some(TileDataHandle::new(Arc::clone(&item.data)));
            }
            self.heads.insert(coord, id);
        }
        tracing::trace!(
            items = ids.len(),
            named = memento.is_some(),
            "committed revision"
        );
        self.revisions.push_back(Revision {
            memento,
            items: ids,
        });
        true
    }

    /// A committed `Deleted` item standing for "no tile yet".
    fn deleted_root(&mut self, coord: TileCoord) -> ItemId {
        let data = Arc::clone(&self.default_data);
        let mut root = MementoItem::uncommitted(coord, ItemKind::Deleted, Arc::clone(&data));
        root.user = Some(TileDataHandle::new(data));
        self.alloc(root)
    }

    fn is_changed(&self, id: Option<ItemId>) -> Option<&MementoItem> {
        self.item(id?).filter(|i| i.kind == ItemKind::Changed)
    }

    /// Drop every item unreachable from the index, heads and revisions.
    fn collect_garbage(&mut self) -> usize {
        let mut marked = vec![false; self.items.len()];
        let mut stack: Vec<ItemId> = self
            .index
            .values()
            .chain(self.heads.values())
            .copied()
            .chain(self.revisions.iter().flat_map(|r| r.items.iter().copied()))
            .chain(self.cancelled.iter().flat_map(|r| r.items.iter().copied()))
            .collect();
        while let Some(id) = stack.pop() {
            if marked[id.0] {
                continue;
            }
            marked[id.0] = true;
            if let Some(parent) = self.item(id).and_then(|i| i.parent) {
                stack.push(parent);
            }
        }
        let mut swept = 0;
        for (i, slot) in self.items.iter_mut().enumerate() {
            if !marked[i] && slot.take().is_some() {
                self.free.push(i);
                swept += 1;
            }
        }
        swept
    }
}

// ── MementoManager ──────────────────────────────────────────────

/// Change index, revision history and redo stack of one grid.
///
/// Only one of [`commit`](Self::commit), [`rollback`](Self::rollback),
/// [`rollforward`](Self::rollforward) and
/// [`purge_history`](Self::purge_history) may run at a time per grid;
/// the caller serializes them. Tile edits on other cells may proceed
/// concurrently.
pub struct MementoManager {
    state: Mutex<State>,
    store: StoreHandle,
}

impl MementoManager {
    /// An empty history whose untouched cells hold `default_data`.
    pub fn new(store: StoreHandle, default_data: Arc<TileData>) -> Self {
        Self {
            state: Mutex::new(State {
                items: Vec::new(),
                free: Vec::new(),
                index: IndexMap::new(),
                heads: IndexMap::new(),
                revisions: VecDeque::new(),
                cancelled: Vec::new(),
                current: None,
                default_data,
            }),
            store,
        }
    }

    /// Record that `coord` now holds `data`.
    pub fn register_tile_change(&self, coord: TileCoord, data: Arc<TileData>) {
        self.state.lock().index_item(coord, ItemKind::Changed, data);
    }

    /// Record that `coord` no longer holds a tile.
    pub fn register_tile_deleted(&self, coord: TileCoord) {
        let mut state = self.state.lock();
        let data = Arc::clone(&state.default_data);
        state.index_item(coord, ItemKind::Deleted, data);
    }

    /// Data used for cells that never had a tile.
    pub fn set_default_tile_data(&self, data: Arc<TileData>) {
        self.state.lock().default_data = data;
    }

    /// Open a named transaction.
    ///
    /// Pending changes are committed first; a named transaction that is
    /// still open is committed with a warning. The redo stack is cleared.
    pub fn get_memento(&self) -> Arc<Memento> {
        let memento = Arc::new(Memento::new());
        {
            let mut state = self.state.lock();
            if let Some(open) = &state.current {
                tracing::warn!(
                    memento = %open.id(),
                    "nested memento requested, committing the open one"
                );
            }
            state.commit();
            state.cancelled.clear();
            state.current = Some(Arc::clone(&memento));
        }
        self.kick_workers();
        memento
    }

    /// Commit pending changes. A no-op when nothing is pending.
    pub fn commit(&self) {
        let committed = self.state.lock().commit();
        if committed {
            self.kick_workers();
        }
    }

    /// Undo the newest revision against `table`.
    ///
    /// Returns `None` when there is nothing to undo.
    pub fn rollback(self: &Arc<Self>, table: &TileHashTable) -> Option<Replayed> {
        let (edits, memento) = {
            let mut state = self.state.lock();
            state.commit();
            let revision = state.revisions.pop_back()?;
            let mut edits = Vec::with_capacity(revision.items.len());
            for &id in &revision.items {
                let Some((coord, parent)) = state.item(id).map(|i| (i.coord, i.parent)) else {
                    continue;
                };
                match state.is_changed(parent) {
                    Some(p) => edits.push(TableEdit::Insert(coord, Arc::clone(&p.data))),
                    None => edits.push(TableEdit::Remove(coord)),
                }
                match parent {
                    Some(p) => {
                        state.heads.insert(coord, p);
                    }
                    None => {
                        state.heads.swap_remove(&coord);
                    }
                }
            }
            let memento = revision.memento.clone();
            state.cancelled.push(revision);
            (edits, memento)
        };
        let touched = self.apply(table, edits);
        self.kick_workers();
        Some(Replayed { memento, touched })
    }

    /// Redo the most recently undone revision against `table`.
    ///
    /// Pending changes are committed first; if there were any, the redo
    /// stack no longer applies and is discarded.
    pub fn rollforward(self: &Arc<Self>, table: &TileHashTable) -> Option<Replayed> {
        let (edits, memento) = {
            let mut state = self.state.lock();
            if state.commit() {
                tracing::debug!("edits after rollback, discarding redo stack");
                state.cancelled.clear();
                return None;
            }
            let revision = state.cancelled.pop()?;
            let mut edits = Vec::with_capacity(revision.items.len() * 2);
            for &id in &revision.items {
                let Some(item) = state.item(id) else {
                    continue;
                };
                let coord = item.coord;
                if state.is_changed(item.parent).is_some() {
                    edits.push(TableEdit::Remove(coord));
                }
                if item.kind == ItemKind::Changed {
                    edits.push(TableEdit::Insert(coord, Arc::clone(&item.data)));
                }
                state.heads.insert(coord, id);
            }
            let memento = revision.memento.clone();
            state.revisions.push_back(revision);
            (edits, memento)
        };
        let touched = self.apply(table, edits);
        self.kick_workers();
        Some(Replayed { memento, touched })
    }

    fn apply(self: &Arc<Self>, table: &TileHashTable, edits: Vec<TableEdit>) -> Vec<TileCoord> {
        let mut touched = Vec::with_capacity(edits.len());
        for edit in edits {
            match edit {
                TableEdit::Insert(coord, data) => {
                    table.add_tile_silent(Tile::new(coord, data, Some(Arc::clone(self))));
                    touched.push(coord);
                }
                TableEdit::Remove(coord) => {
                    table.delete_tile_silent(coord);
                    touched.push(coord);
                }
            }
        }
        touched
    }

    /// Forget every revision up to and including `memento`'s.
    ///
    /// Items of the removed revisions that are still referenced lose
    /// their parent links, so the forgotten states cannot come back.
    /// Purging a memento that is no longer in history does nothing.
    pub fn purge_history(&self, memento: &Arc<Memento>) {
        let mut state = self.state.lock();
        if state
            .current
            .as_ref()
            .is_some_and(|m| Arc::ptr_eq(m, memento))
        {
            state.commit();
        }
        let Some(pos) = state
            .revisions
            .iter()
            .position(|r| r.memento.as_ref().is_some_and(|m| Arc::ptr_eq(m, memento)))
        else {
            return;
        };
        let removed: Vec<Revision> = state.revisions.drain(..=pos).collect();
        for revision in &removed {
            if let Some(m) = &revision.memento {
                m.invalidate();
            }
            for &id in &revision.items {
                if let Some(item) = state.item_mut(id) {
                    item.parent = None;
                }
            }
        }
        let swept = state.collect_garbage();
        tracing::debug!(
            revisions = removed.len(),
            swept,
            memento = %memento.id(),
            "purged history"
        );
    }

    /// The committed version of `coord` for "old data" reads.
    ///
    /// Returns `None` outside a named transaction, and for cells with no
    /// history that were not touched in it; the current tile is the old
    /// one then. Otherwise returns a detached tile and whether that
    /// version is a real tile rather than the default.
    pub fn get_committed_tile(&self, coord: TileCoord) -> Option<(Tile, bool)> {
        let state = self.state.lock();
        state.current.as_ref()?;
        if let Some(&head) = state.heads.get(&coord) {
            let item = state.item(head)?;
            let exists = item.kind == ItemKind::Changed;
            return Some((Tile::detached(coord, Arc::clone(&item.data)), exists));
        }
        if state.index.contains_key(&coord) {
            let data = Arc::clone(&state.default_data);
            return Some((Tile::detached(coord, data), false));
        }
        None
    }

    /// Whether a named transaction is open.
    pub fn has_current_memento(&self) -> bool {
        self.state.lock().current.is_some()
    }

    /// The open named transaction, if any.
    pub fn current_memento(&self) -> Option<Arc<Memento>> {
        self.state.lock().current.clone()
    }

    /// Number of revisions available to undo.
    pub fn revision_count(&self) -> usize {
        self.state.lock().revisions.len()
    }

    /// Number of revisions available to redo.
    pub fn cancelled_count(&self) -> usize {
        self.state.lock().cancelled.len()
    }

    /// Number of uncommitted changes.
    pub fn pending_count(&self) -> usize {
        self.state.lock().index.len()
    }

    /// Number of items alive in the history arena.
    pub fn item_count(&self) -> usize {
        self.state.lock().items.iter().filter(|i| i.is_some()).count()
    }

    fn kick_workers(&self) {
        self.store.kick_pooler();
        self.store.kick_swapper();
    }
}

impl fmt::Debug for MementoManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MementoManager")
            .field("pending", &state.index.len())
            .field("revisions", &state.revisions.len())
            .field("cancelled", &state.cancelled.len())
            .field("open", &state.current.as_ref().map(|m| m.id()))
            .finish()
    }
}
