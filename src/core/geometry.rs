use crate::core::platform::{Desktop, WindowHandle};
use crate::models::{Placement, ShowState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn from_sizes(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            right: left + width,
            bottom: top + height,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn top_left(&self) -> Point {
        Point {
            x: self.left,
            y: self.top,
        }
    }

    pub fn bottom_right(&self) -> Point {
        Point {
            x: self.right,
            y: self.bottom,
        }
    }
}

/// Computes the rect to hand to the OS so that the window's *visible* frame
/// lands on `desired`.
///
/// `window` is the raw OS window rect and `frame_top_left`/`frame_bottom_right`
/// are the compositor frame corners already mapped to logical coordinates.
/// On composited desktops the OS rect extends past the visible frame by an
/// invisible resize border, and the two corners can carry different offsets
/// when the window straddles a DPI boundary, so each is compensated
/// independently.
pub fn compensated_rect(
    desired: Rect,
    window: Rect,
    frame_top_left: Point,
    frame_bottom_right: Point,
) -> Rect {
    let tl_dx = frame_top_left.x - window.left;
    let tl_dy = frame_top_left.y - window.top;
    let br_dx = window.right - frame_bottom_right.x;
    let br_dy = window.bottom - frame_bottom_right.y;

    Rect::from_sizes(
        desired.left - tl_dx,
        desired.top - tl_dy,
        desired.width() + tl_dx + br_dx,
        desired.height() + tl_dy + br_dy,
    )
}

/// Moves `window` so its visible frame matches `state`, then applies the
/// show-state. Best-effort: any failed query degrades to a direct move and a
/// failed move leaves the window where the OS put it.
pub fn apply_placement(desktop: &dyn Desktop, window: WindowHandle, state: &Placement) {
    let desired = Rect::from_sizes(state.left, state.top, state.width, state.height);

    let Some(wrect) = desktop.window_rect(window) else {
        return;
    };
    // No compositor frame means no invisible border to compensate for.
    let frame = desktop.frame_rect(window).unwrap_or(wrect);
    let frame_tl = desktop.to_logical(window, frame.top_left());
    let frame_br = desktop.to_logical(window, frame.bottom_right());

    let adjusted = compensated_rect(desired, wrect, frame_tl, frame_br);
    desktop.move_window(window, adjusted);
    desktop.show_window(window, restore_show_state(state.show_state));
}

/// A rule that last saw its window hidden still restores it as a normal
/// window; replaying "hidden" would make the placement unreachable.
fn restore_show_state(state: ShowState) -> ShowState {
    match state {
        ShowState::Hidden => ShowState::Normal,
        other => other,
    }
}
