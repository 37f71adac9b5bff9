//! The interaction state machine
//!
//! Raw key and mouse packets land here from the dispatcher and come out the
//! other side as focus changes, window moves, resize offers, tiling, and
//! window-local mouse events. The pointer is tracked in 3x subpixels and
//! clamped to the screen; all click coordinates handed to clients go through
//! the inverse rotation mapping into window-local space.
//!
//! Gesture state lives in [`InputState`], owned by the dispatcher thread.
//! The captured window is stored as an id and re-validated on every event,
//! so a window destroyed mid-gesture simply drops the gesture.

use std::collections::HashMap;

use protocol::{
    keys, BindResponse, ClientId, KeyAction, KeyEvent, Message, Modifiers, MouseButtons,
    MouseEvent, MouseSample, WindowId, WindowMouseKind, ZBand,
};

use crate::server::{Outbox, Server};
use crate::state::{ResizeOutline, Stage};

/// Subpixel units per screen pixel for pointer tracking.
pub const POINTER_SCALE: i32 = 3;

/// Degrees added/removed per rotation shortcut press.
const ROTATE_STEP: i32 = 5;

/// Mouse gesture the machine is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseState {
    #[default]
    Normal,
    /// ALT+left drag repositioning the captured window
    Moving,
    /// Plain left-button drag forwarded to the client
    Dragging,
    /// ALT+middle drag sizing the captured window's outline
    Resizing,
}

/// A global key binding installed via `KEY_BIND`.
#[derive(Debug, Clone, Copy)]
pub struct KeyBind {
    pub owner: ClientId,
    pub response: BindResponse,
}

/// Dispatcher-owned interaction state.
#[derive(Default)]
pub struct InputState {
    pub mouse_state: MouseState,
    pub modifiers: Modifiers,
    pub capture: Option<WindowId>,
    pub binds: HashMap<u32, KeyBind>,

    // Subpixel pointer as of the previous event, for motion detection
    last_x: i32,
    last_y: i32,

    // Gesture scratch
    init_x: i32,
    init_y: i32,
    win_x: i32,
    win_y: i32,
    click_x: i32,
    click_y: i32,
    moved: bool,
    drag_button: u8,
    resizing_w: i32,
    resizing_h: i32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or overwrite the binding for a key combination.
    pub fn install_bind(
        &mut self,
        modifiers: Modifiers,
        keycode: u32,
        owner: ClientId,
        response: BindResponse,
    ) {
        self.binds.insert(bind_key(modifiers, keycode), KeyBind { owner, response });
    }
}

/// Hash key for the bind table.
fn bind_key(modifiers: Modifiers, keycode: u32) -> u32 {
    ((modifiers.0 as u32) << 24) | (keycode & 0x00FF_FFFF)
}

impl Server {
    /// Route one raw keyboard event: built-in shortcuts, then global binds,
    /// then the focused window.
    pub fn handle_key_event(&self, input: &mut InputState, event: KeyEvent) {
        input.modifiers = event.modifiers;

        let mut outbox = Outbox::new();
        {
            let mut stage = self.stage.lock().unwrap();
            let focused = self.focused_or_bottom(&stage);

            'route: {
                if let Some(wid) = focused {
                    if self.builtin_shortcut(&mut stage, wid, &event, &mut outbox) {
                        break 'route;
                    }
                }

                if let Some(bind) = input.binds.get(&bind_key(event.modifiers, event.keycode)) {
                    outbox.push(
                        bind.owner,
                        Message::WindowKeyEvent { wid: focused.unwrap_or(WindowId(0)), event },
                    );
                    if bind.response == BindResponse::Steal {
                        break 'route;
                    }
                }

                if let Some(wid) = focused {
                    if let Some(win) = stage.lookup(wid) {
                        outbox.push(win.owner, Message::WindowKeyEvent { wid, event });
                    }
                }
            }
        }
        self.flush(outbox);
    }

    /// Server-reserved shortcuts. Returns true when the event was consumed.
    fn builtin_shortcut(
        &self,
        stage: &mut Stage,
        wid: WindowId,
        event: &KeyEvent,
        outbox: &mut Outbox,
    ) -> bool {
        if event.action != KeyAction::Down {
            return false;
        }
        let mods = event.modifiers;
        let in_mid = stage.lookup(wid).is_some_and(|w| w.z == ZBand::Mid);

        if mods.ctrl() && mods.shift() {
            match event.keycode {
                k if k == 'z' as u32 && in_mid => {
                    self.rotate_by(stage, wid, -ROTATE_STEP);
                    return true;
                }
                k if k == 'x' as u32 && in_mid => {
                    self.rotate_by(stage, wid, ROTATE_STEP);
                    return true;
                }
                k if k == 'c' as u32 && in_mid => {
                    self.rotate_reset(stage, wid);
                    return true;
                }
                k if k == 'v' as u32 => {
                    stage.debug.shapes = !stage.debug.shapes;
                    tracing::info!(enabled = stage.debug.shapes, "hit-test visualiser toggled");
                    return true;
                }
                k if k == 'b' as u32 => {
                    stage.debug.bounds = !stage.debug.bounds;
                    tracing::info!(enabled = stage.debug.bounds, "bounds overlay toggled");
                    return true;
                }
                _ => {}
            }
        }

        if mods.alt() && event.keycode == keys::F10 && in_mid {
            self.tile(stage, wid, 1, 1, 0, 0, outbox);
            return true;
        }

        if mods.superkey() && in_mid {
            let tiled = match event.keycode {
                keys::ARROW_LEFT if mods.shift() => Some((2, 2, 0, 0)),
                keys::ARROW_RIGHT if mods.shift() => Some((2, 2, 1, 0)),
                keys::ARROW_LEFT if mods.ctrl() => Some((2, 2, 0, 1)),
                keys::ARROW_RIGHT if mods.ctrl() => Some((2, 2, 1, 1)),
                keys::ARROW_LEFT => Some((2, 1, 0, 0)),
                keys::ARROW_RIGHT => Some((2, 1, 1, 0)),
                keys::ARROW_UP => Some((1, 2, 0, 0)),
                keys::ARROW_DOWN => Some((1, 2, 0, 1)),
                _ => None,
            };
            if let Some((wdiv, hdiv, cx, cy)) = tiled {
                self.tile(stage, wid, wdiv, hdiv, cx, cy, outbox);
                return true;
            }
        }

        false
    }

    fn rotate_by(&self, stage: &mut Stage, wid: WindowId, degrees: i32) {
        if let Some(win) = stage.lookup_mut(wid) {
            self.damage.mark_window(win);
            win.rotation += degrees;
            self.damage.mark_window(win);
        }
    }

    fn rotate_reset(&self, stage: &mut Stage, wid: WindowId) {
        if let Some(win) = stage.lookup_mut(wid) {
            self.damage.mark_window(win);
            win.rotation = 0;
            self.damage.mark_window(win);
        }
    }

    /// Snap a window into a grid cell above the TOP band and offer it the
    /// cell size.
    pub fn tile(
        &self,
        stage: &mut Stage,
        wid: WindowId,
        wdiv: u32,
        hdiv: u32,
        cx: u32,
        cy: u32,
        outbox: &mut Outbox,
    ) {
        let (screen_w, screen_h) = self.size();
        let panel_h = stage
            .top()
            .and_then(|top| stage.lookup(top))
            .map(|w| w.height)
            .unwrap_or(0);

        let w = screen_w / wdiv;
        let h = (screen_h - panel_h) / hdiv;

        let Some(win) = stage.lookup_mut(wid) else {
            return;
        };
        self.damage.mark_window(win);
        win.x = (w * cx) as i32;
        win.y = (panel_h + h * cy) as i32;
        self.damage.mark_window(win);

        outbox.push(win.owner, Message::ResizeOffer { wid, width: w, height: h, bufid: 0 });
        tracing::debug!(%wid, w, h, cx, cy, "window tiled");
    }

    /// Route one raw mouse event through the gesture machine.
    pub fn handle_mouse_event(&self, input: &mut InputState, event: MouseEvent) {
        let (sub_x, sub_y) = self.move_pointer(&event);
        let pointer_moved = (sub_x, sub_y) != (input.last_x, input.last_y);
        input.last_x = sub_x;
        input.last_y = sub_y;

        // A buttonless, motionless event carries no information
        if !pointer_moved && event.buttons == MouseButtons::empty()
            && input.mouse_state == MouseState::Normal
        {
            return;
        }

        let mx = sub_x / POINTER_SCALE;
        let my = sub_y / POINTER_SCALE;

        let mut outbox = Outbox::new();
        {
            let mut stage = self.stage.lock().unwrap();

            // A window destroyed mid-gesture drops the gesture.
            if let Some(captured) = input.capture {
                if !stage.contains(captured) {
                    input.capture = None;
                    input.mouse_state = MouseState::Normal;
                    stage.resize_outline = None;
                }
            }

            match input.mouse_state {
                MouseState::Normal => {
                    self.mouse_normal(&mut stage, input, &event, mx, my, sub_x, sub_y, &mut outbox)
                }
                MouseState::Moving => self.mouse_moving(&mut stage, input, &event, sub_x, sub_y),
                MouseState::Dragging => {
                    self.mouse_dragging(&mut stage, input, &event, mx, my, &mut outbox)
                }
                MouseState::Resizing => {
                    self.mouse_resizing(&mut stage, input, &event, sub_x, sub_y, &mut outbox)
                }
            }
        }
        self.flush(outbox);
    }

    /// Apply a mouse sample to the subpixel pointer, clamped to the screen.
    fn move_pointer(&self, event: &MouseEvent) -> (i32, i32) {
        let (width, height) = self.size();
        let mut pointer = self.pointer_mut();
        match event.sample {
            MouseSample::Relative => {
                pointer.x += event.dx * POINTER_SCALE;
                pointer.y -= event.dy * POINTER_SCALE;
            }
            MouseSample::Absolute => {
                pointer.x = event.dx * POINTER_SCALE;
                pointer.y = event.dy * POINTER_SCALE;
            }
        }
        pointer.x = pointer.x.clamp(0, width as i32 * POINTER_SCALE);
        pointer.y = pointer.y.clamp(0, height as i32 * POINTER_SCALE);
        (pointer.x, pointer.y)
    }

    #[allow(clippy::too_many_arguments)]
    fn mouse_normal(
        &self,
        stage: &mut Stage,
        input: &mut InputState,
        event: &MouseEvent,
        mx: i32,
        my: i32,
        sub_x: i32,
        sub_y: i32,
        outbox: &mut Outbox,
    ) {
        if event.buttons.left() && input.modifiers.alt() {
            self.start_move(stage, input, mx, my, sub_x, sub_y, outbox);
        } else if event.buttons.middle() && input.modifiers.alt() {
            self.start_resize(stage, input, mx, my, sub_x, sub_y, outbox);
        } else if event.buttons.left() {
            self.focus_at(stage, mx, my, outbox);
            let Some(wid) = self.focused_or_bottom(stage) else {
                return;
            };
            let win = match stage.lookup(wid) {
                Some(win) => win,
                None => return,
            };
            let (lx, ly) = win.placement().to_local(mx, my);
            input.mouse_state = MouseState::Dragging;
            input.capture = Some(wid);
            input.moved = false;
            input.drag_button = MouseButtons::LEFT;
            input.click_x = lx;
            input.click_y = ly;
            outbox.push(
                win.owner,
                Message::WindowMouseEvent {
                    wid,
                    x: lx,
                    y: ly,
                    old_x: -1,
                    old_y: -1,
                    buttons: event.buttons,
                    kind: WindowMouseKind::Down,
                },
            );
        } else {
            // Plain motion: the focused window always sees it; hover
            // transitions produce enter/leave pairs.
            if let Some(wid) = self.focused_or_bottom(stage) {
                if let Some(win) = stage.lookup(wid) {
                    let (lx, ly) = win.placement().to_local(mx, my);
                    outbox.push(
                        win.owner,
                        Message::WindowMouseEvent {
                            wid,
                            x: lx,
                            y: ly,
                            old_x: -1,
                            old_y: -1,
                            buttons: event.buttons,
                            kind: WindowMouseKind::Move,
                        },
                    );
                }
            }

            let focused = self.focused_or_bottom(stage);
            if let Some(hovered) = stage.hit_test(mx, my) {
                if stage.hover != Some(hovered) {
                    if let Some(old) = stage.hover.filter(|old| stage.contains(*old)) {
                        let win = stage.lookup(old).unwrap();
                        let (lx, ly) = win.placement().to_local(mx, my);
                        outbox.push(
                            win.owner,
                            Message::WindowMouseEvent {
                                wid: old,
                                x: lx,
                                y: ly,
                                old_x: -1,
                                old_y: -1,
                                buttons: event.buttons,
                                kind: WindowMouseKind::Leave,
                            },
                        );
                    }
                    let win = stage.lookup(hovered).unwrap();
                    let (lx, ly) = win.placement().to_local(mx, my);
                    outbox.push(
                        win.owner,
                        Message::WindowMouseEvent {
                            wid: hovered,
                            x: lx,
                            y: ly,
                            old_x: -1,
                            old_y: -1,
                            buttons: event.buttons,
                            kind: WindowMouseKind::Enter,
                        },
                    );
                    stage.hover = Some(hovered);
                }
                if focused != Some(hovered) {
                    let win = stage.lookup(hovered).unwrap();
                    let (lx, ly) = win.placement().to_local(mx, my);
                    outbox.push(
                        win.owner,
                        Message::WindowMouseEvent {
                            wid: hovered,
                            x: lx,
                            y: ly,
                            old_x: -1,
                            old_y: -1,
                            buttons: event.buttons,
                            kind: WindowMouseKind::Move,
                        },
                    );
                }
            }
        }
    }

    /// Begin an ALT+left (or `WINDOW_DRAG_START`) move gesture.
    pub fn start_move(
        &self,
        stage: &mut Stage,
        input: &mut InputState,
        mx: i32,
        my: i32,
        sub_x: i32,
        sub_y: i32,
        outbox: &mut Outbox,
    ) {
        self.focus_at(stage, mx, my, outbox);
        let Some(wid) = self.focused_or_bottom(stage) else {
            return;
        };
        let Some(win) = stage.lookup(wid) else {
            return;
        };
        if win.is_banded() {
            input.mouse_state = MouseState::Normal;
            input.capture = None;
            return;
        }

        input.mouse_state = MouseState::Moving;
        input.capture = Some(wid);
        input.init_x = sub_x;
        input.init_y = sub_y;
        input.win_x = win.x;
        input.win_y = win.y;
        stage.raise(wid);
        tracing::debug!(%wid, "move gesture started");
    }

    #[allow(clippy::too_many_arguments)]
    fn start_resize(
        &self,
        stage: &mut Stage,
        input: &mut InputState,
        mx: i32,
        my: i32,
        sub_x: i32,
        sub_y: i32,
        outbox: &mut Outbox,
    ) {
        self.focus_at(stage, mx, my, outbox);
        let Some(wid) = self.focused_or_bottom(stage) else {
            return;
        };
        let Some(win) = stage.lookup(wid) else {
            return;
        };
        if win.is_banded() {
            input.mouse_state = MouseState::Normal;
            input.capture = None;
            return;
        }

        input.mouse_state = MouseState::Resizing;
        input.capture = Some(wid);
        input.init_x = sub_x;
        input.init_y = sub_y;
        input.win_x = win.x;
        input.win_y = win.y;
        input.resizing_w = win.width as i32;
        input.resizing_h = win.height as i32;
        stage.resize_outline = Some(ResizeOutline {
            wid,
            width: input.resizing_w,
            height: input.resizing_h,
        });
        stage.raise(wid);
        tracing::info!(%wid, "resize gesture started");
    }

    fn mouse_moving(
        &self,
        stage: &mut Stage,
        input: &mut InputState,
        event: &MouseEvent,
        sub_x: i32,
        sub_y: i32,
    ) {
        if !event.buttons.left() {
            input.capture = None;
            input.mouse_state = MouseState::Normal;
            return;
        }
        let Some(win) = input.capture.and_then(|wid| stage.lookup_mut(wid)) else {
            return;
        };
        self.damage.mark_window(win);
        win.x = input.win_x + (sub_x - input.init_x) / POINTER_SCALE;
        win.y = input.win_y + (sub_y - input.init_y) / POINTER_SCALE;
        self.damage.mark_window(win);
    }

    fn mouse_dragging(
        &self,
        stage: &mut Stage,
        input: &mut InputState,
        event: &MouseEvent,
        mx: i32,
        my: i32,
        outbox: &mut Outbox,
    ) {
        let Some(wid) = input.capture else {
            input.mouse_state = MouseState::Normal;
            return;
        };
        let Some(win) = stage.lookup(wid) else {
            return;
        };
        let (lx, ly) = win.placement().to_local(mx, my);
        let (old_x, old_y) = (input.click_x, input.click_y);

        if !event.buttons.contains(input.drag_button) {
            input.mouse_state = MouseState::Normal;
            input.capture = None;
            input.click_x = lx;
            input.click_y = ly;
            let kind = if input.moved { WindowMouseKind::Raise } else { WindowMouseKind::Click };
            outbox.push(
                win.owner,
                Message::WindowMouseEvent {
                    wid,
                    x: lx,
                    y: ly,
                    old_x: if input.moved { old_x } else { -1 },
                    old_y: if input.moved { old_y } else { -1 },
                    buttons: event.buttons,
                    kind,
                },
            );
            return;
        }

        if (lx, ly) != (old_x, old_y) {
            input.moved = true;
            input.click_x = lx;
            input.click_y = ly;
            outbox.push(
                win.owner,
                Message::WindowMouseEvent {
                    wid,
                    x: lx,
                    y: ly,
                    old_x,
                    old_y,
                    buttons: event.buttons,
                    kind: WindowMouseKind::Drag,
                },
            );
        }
    }

    fn mouse_resizing(
        &self,
        stage: &mut Stage,
        input: &mut InputState,
        event: &MouseEvent,
        sub_x: i32,
        sub_y: i32,
        outbox: &mut Outbox,
    ) {
        let Some(wid) = input.capture else {
            input.mouse_state = MouseState::Normal;
            return;
        };
        let width_diff = (sub_x - input.init_x) / POINTER_SCALE;
        let height_diff = (sub_y - input.init_y) / POINTER_SCALE;

        let Some(win) = stage.lookup(wid) else {
            return;
        };
        let (base_w, base_h) = (win.width as i32, win.height as i32);
        self.damage.mark_window_relative(win, -2, -2, input.resizing_w + 10, input.resizing_h + 10);

        input.resizing_w = (base_w + width_diff).max(1);
        input.resizing_h = (base_h + height_diff).max(1);

        let win = stage.lookup(wid).unwrap();
        self.damage.mark_window_relative(win, -2, -2, input.resizing_w + 10, input.resizing_h + 10);
        let owner = win.owner;

        stage.resize_outline = Some(ResizeOutline {
            wid,
            width: input.resizing_w,
            height: input.resizing_h,
        });

        if !event.buttons.middle() {
            tracing::info!(%wid, w = input.resizing_w, h = input.resizing_h, "resize gesture complete");
            outbox.push(
                owner,
                Message::ResizeOffer {
                    wid,
                    width: input.resizing_w as u32,
                    height: input.resizing_h as u32,
                    bufid: 0,
                },
            );
            stage.resize_outline = None;
            input.capture = None;
            input.mouse_state = MouseState::Normal;
        }
    }
}
