//! Registry operations on the stage
//!
//! Creation, z-band management, hit-testing, and destruction. All of these
//! run under the registry lock; none of them touch the channel.

use protocol::{ClientId, WindowId, ZBand};

use crate::shm::SharedBuffer;

use super::{AnimMode, Stage, Window};

impl Stage {
    pub fn alloc_wid(&mut self) -> WindowId {
        let wid = WindowId(self.next_wid);
        self.next_wid += 1;
        wid
    }

    pub fn alloc_bufid(&mut self) -> u32 {
        let bufid = self.next_bufid;
        self.next_bufid += 1;
        bufid
    }

    /// Register a freshly created window: frontmost MID slot, owner bucket,
    /// fade-in already stamped by the caller.
    pub fn insert(&mut self, window: Window) {
        let wid = window.wid;
        let owner = window.owner;
        self.windows.insert(wid, window);
        self.mid.push(wid);
        self.by_client.entry(owner).or_default().push(wid);
    }

    pub fn lookup(&self, wid: WindowId) -> Option<&Window> {
        self.windows.get(&wid)
    }

    pub fn lookup_mut(&mut self, wid: WindowId) -> Option<&mut Window> {
        self.windows.get_mut(&wid)
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn bottom(&self) -> Option<WindowId> {
        self.bottom
    }

    pub fn top(&self) -> Option<WindowId> {
        self.top
    }

    /// MID band ids, back to front.
    pub fn mid(&self) -> &[WindowId] {
        &self.mid
    }

    /// Ids of every window a client owns.
    pub fn client_windows(&self, client: ClientId) -> Vec<WindowId> {
        self.by_client.get(&client).cloned().unwrap_or_default()
    }

    pub fn client_count(&self) -> usize {
        self.by_client.len()
    }

    /// Snapshot of every client bucket.
    pub fn buckets(&self) -> Vec<(ClientId, Vec<WindowId>)> {
        self.by_client.iter().map(|(c, wids)| (*c, wids.clone())).collect()
    }

    /// Drop a window from its band slot without touching anything else.
    fn unorder(&mut self, wid: WindowId) {
        if self.bottom == Some(wid) {
            self.bottom = None;
            return;
        }
        if self.top == Some(wid) {
            self.top = None;
            return;
        }
        self.mid.retain(|w| *w != wid);
    }

    /// Move a window to a new band. Entering BOTTOM or TOP evicts the
    /// current occupant back into MID at the front.
    pub fn reorder(&mut self, wid: WindowId, z: ZBand) {
        if !self.windows.contains_key(&wid) {
            return;
        }
        self.unorder(wid);

        match z {
            ZBand::Mid => {
                self.mid.push(wid);
            }
            ZBand::Top => {
                if let Some(evicted) = self.top.take() {
                    self.set_band(evicted, ZBand::Mid);
                    self.mid.push(evicted);
                }
                self.top = Some(wid);
            }
            ZBand::Bottom => {
                if let Some(evicted) = self.bottom.take() {
                    self.set_band(evicted, ZBand::Mid);
                    self.mid.push(evicted);
                }
                self.bottom = Some(wid);
            }
        }
        self.set_band(wid, z);
    }

    fn set_band(&mut self, wid: WindowId, z: ZBand) {
        if let Some(win) = self.windows.get_mut(&wid) {
            win.z = z;
        }
    }

    /// Bring a MID window to the frontmost MID slot. No-op for BOTTOM/TOP.
    pub fn raise(&mut self, wid: WindowId) {
        match self.windows.get(&wid) {
            Some(win) if win.z == ZBand::Mid => {}
            _ => return,
        }
        if let Some(pos) = self.mid.iter().position(|w| *w == wid) {
            self.mid.remove(pos);
            self.mid.push(wid);
        }
    }

    /// The topmost window whose opaque pixel lies at the device coordinate:
    /// TOP first, then MID front to back, then BOTTOM.
    pub fn hit_test(&self, x: i32, y: i32) -> Option<WindowId> {
        if let Some(wid) = self.top {
            if self.windows.get(&wid).is_some_and(|w| w.hit_at(x, y)) {
                return Some(wid);
            }
        }
        for wid in self.mid.iter().rev() {
            if self.windows.get(wid).is_some_and(|w| w.hit_at(x, y)) {
                return Some(*wid);
            }
        }
        if let Some(wid) = self.bottom {
            if self.windows.get(&wid).is_some_and(|w| w.hit_at(x, y)) {
                return Some(wid);
            }
        }
        None
    }

    /// Blit order for one frame: BOTTOM, MID back to front, TOP.
    pub fn blit_order(&self) -> Vec<WindowId> {
        let mut order = Vec::with_capacity(self.mid.len() + 2);
        order.extend(self.bottom);
        order.extend(self.mid.iter().copied());
        order.extend(self.top);
        order
    }

    /// Advertisement order for QUERY_WINDOWS: BOTTOM, MID front to back, TOP.
    pub fn query_order(&self) -> Vec<WindowId> {
        let mut order = Vec::with_capacity(self.mid.len() + 2);
        order.extend(self.bottom);
        order.extend(self.mid.iter().rev().copied());
        order.extend(self.top);
        order
    }

    /// Begin the fade-out that ends in destruction.
    pub fn mark_for_close(&mut self, wid: WindowId, tick: u64) {
        if let Some(win) = self.windows.get_mut(&wid) {
            win.anim_mode = AnimMode::FadeOut;
            win.anim_start = tick;
        }
    }

    /// Detach a window from its owner's bucket, dropping the bucket when it
    /// empties.
    pub fn remove_from_client(&mut self, wid: WindowId) {
        let Some(owner) = self.windows.get(&wid).map(|w| w.owner) else {
            return;
        };
        if let Some(bucket) = self.by_client.get_mut(&owner) {
            bucket.retain(|w| *w != wid);
            if bucket.is_empty() {
                self.by_client.remove(&owner);
            }
        }
    }

    /// Drop a client's bucket, returning the windows it owned.
    pub fn drop_client(&mut self, client: ClientId) -> Vec<WindowId> {
        self.by_client.remove(&client).unwrap_or_default()
    }

    /// Remove a window from every index and hand back its state (the caller
    /// releases the shared buffer and notifies subscribers). Stale focus,
    /// hover, and outline ids pointing at it are cleared.
    pub fn destroy(&mut self, wid: WindowId) -> Option<Window> {
        let window = self.windows.remove(&wid)?;
        self.unorder(wid);

        if let Some(bucket) = self.by_client.get_mut(&window.owner) {
            bucket.retain(|w| *w != wid);
            if bucket.is_empty() {
                self.by_client.remove(&window.owner);
            }
        }

        if self.focused == Some(wid) {
            self.focused = None;
        }
        if self.hover == Some(wid) {
            self.hover = None;
        }
        if self.resize_outline.is_some_and(|o| o.wid == wid) {
            self.resize_outline = None;
        }

        Some(window)
    }

    /// Validate a stored id against the arena.
    pub fn contains(&self, wid: WindowId) -> bool {
        self.windows.contains_key(&wid)
    }
}

/// Build a window value for [`Stage::insert`].
#[allow(clippy::too_many_arguments)]
pub fn new_window(
    wid: WindowId,
    owner: ClientId,
    width: u32,
    height: u32,
    buffer: SharedBuffer,
    bufid: u32,
    tick: u64,
) -> Window {
    Window {
        wid,
        owner,
        x: 0,
        y: 0,
        width,
        height,
        z: ZBand::Mid,
        buffer,
        bufid,
        pending_buffer: None,
        pending_bufid: 0,
        rotation: 0,
        alpha_threshold: 0,
        anim_mode: AnimMode::FadeIn,
        anim_start: tick,
        ad: None,
    }
}
