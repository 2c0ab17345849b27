//! Pure placement policy: visibility state + screen metrics + preferences
//! map to a target rectangle, opacity and z-order.

use serde::{Deserialize, Serialize};

use crate::machine::VisibilityState;

/// Pixels of a hidden window left on-screen at the dock edge.
pub const HIDDEN_SLIVER_PX: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        !self.is_empty() && x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Linear blend between two rectangles, `t` in `[0, 1]`.
    pub fn lerp(from: Rect, to: Rect, t: f32) -> Rect {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: i32, b: i32| a + ((b - a) as f32 * t).round() as i32;
        Rect {
            x: mix(from.x, to.x),
            y: mix(from.y, to.y),
            width: mix(from.width, to.width),
            height: mix(from.height, to.height),
        }
    }
}

/// Screen edge the window docks against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DockEdge {
    #[default]
    Left,
    Right,
    Top,
    Bottom,
}

/// Snapshot of the display the window docks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenMetrics {
    pub origin_x: i32,
    pub origin_y: i32,
    pub width: i32,
    pub height: i32,
    /// Edge-trigger band width in pixels.
    pub edge_band: i32,
}

impl ScreenMetrics {
    pub fn new(bounds: Rect, edge_band: i32) -> Self {
        Self {
            origin_x: bounds.x,
            origin_y: bounds.y,
            width: bounds.width,
            height: bounds.height,
            edge_band: edge_band.max(1),
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.origin_x, self.origin_y, self.width, self.height)
    }

    /// Strip of `edge_band` pixels along `edge`.
    pub fn edge_band_rect(&self, edge: DockEdge) -> Rect {
        let b = self.edge_band.min(self.width).min(self.height);
        match edge {
            DockEdge::Left => Rect::new(self.origin_x, self.origin_y, b, self.height),
            DockEdge::Right => Rect::new(self.origin_x + self.width - b, self.origin_y, b, self.height),
            DockEdge::Top => Rect::new(self.origin_x, self.origin_y, self.width, b),
            DockEdge::Bottom => Rect::new(self.origin_x, self.origin_y + self.height - b, self.width, b),
        }
    }

    pub fn in_edge_band(&self, edge: DockEdge, x: i32, y: i32) -> bool {
        self.edge_band_rect(edge).contains(x, y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZOrder {
    /// Regular stacking, below any raised window.
    #[default]
    Normal,
    /// Brought to the front once.
    Raised,
    /// Kept above all other windows.
    AlwaysOnTop,
}

/// User geometry preferences consumed from settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryPrefs {
    pub dock_edge: DockEdge,
    pub peek_width: i32,
    pub visible_size: (i32, i32),
    pub pinned_size: Option<(i32, i32)>,
    /// Last user-dragged position of the pinned window.
    pub pinned_position: Option<(i32, i32)>,
    pub peek_opacity: f32,
    pub hidden_opacity: f32,
    pub animate: bool,
}

impl Default for GeometryPrefs {
    fn default() -> Self {
        Self {
            dock_edge: DockEdge::Left,
            peek_width: 300,
            visible_size: (1200, 800),
            pinned_size: None,
            pinned_position: None,
            peek_opacity: 0.9,
            hidden_opacity: 0.1,
            animate: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub rect: Rect,
    pub opacity: f32,
    pub z_order: ZOrder,
    pub animate: bool,
}

/// Map a visibility state to the window placement it requires.
pub fn resolve(state: VisibilityState, metrics: &ScreenMetrics, prefs: &GeometryPrefs) -> Placement {
    match state {
        VisibilityState::Hidden => Placement {
            rect: hidden_rect(metrics, prefs.dock_edge),
            opacity: prefs.hidden_opacity.clamp(0.0, 1.0),
            z_order: ZOrder::Normal,
            animate: prefs.animate,
        },
        VisibilityState::Peek => Placement {
            rect: peek_rect(metrics, prefs.dock_edge, prefs.peek_width),
            opacity: prefs.peek_opacity.clamp(0.0, 1.0),
            z_order: ZOrder::Raised,
            animate: prefs.animate,
        },
        VisibilityState::Visible => Placement {
            rect: centered(metrics, prefs.visible_size),
            opacity: 1.0,
            z_order: ZOrder::Raised,
            animate: prefs.animate,
        },
        VisibilityState::Pinned => {
            let size = prefs.pinned_size.unwrap_or(prefs.visible_size);
            let rect = match prefs.pinned_position {
                Some((x, y)) => Rect::new(x, y, size.0.max(1), size.1.max(1)),
                None => centered(metrics, size),
            };
            Placement {
                rect,
                opacity: 1.0,
                z_order: ZOrder::AlwaysOnTop,
                animate: prefs.animate,
            }
        }
    }
}

fn hidden_rect(metrics: &ScreenMetrics, edge: DockEdge) -> Rect {
    let band = metrics.edge_band;
    let sliver = HIDDEN_SLIVER_PX.min(band);
    let m = metrics;
    match edge {
        DockEdge::Left => Rect::new(m.origin_x - band + sliver, m.origin_y, band, m.height),
        DockEdge::Right => Rect::new(m.origin_x + m.width - sliver, m.origin_y, band, m.height),
        DockEdge::Top => Rect::new(m.origin_x, m.origin_y - band + sliver, m.width, band),
        DockEdge::Bottom => Rect::new(m.origin_x, m.origin_y + m.height - sliver, m.width, band),
    }
}

fn peek_rect(metrics: &ScreenMetrics, edge: DockEdge, peek_width: i32) -> Rect {
    let m = metrics;
    match edge {
        DockEdge::Left => Rect::new(m.origin_x, m.origin_y, peek_width.min(m.width), m.height),
        DockEdge::Right => {
            let w = peek_width.min(m.width);
            Rect::new(m.origin_x + m.width - w, m.origin_y, w, m.height)
        }
        DockEdge::Top => Rect::new(m.origin_x, m.origin_y, m.width, peek_width.min(m.height)),
        DockEdge::Bottom => {
            let h = peek_width.min(m.height);
            Rect::new(m.origin_x, m.origin_y + m.height - h, m.width, h)
        }
    }
}

fn centered(metrics: &ScreenMetrics, size: (i32, i32)) -> Rect {
    let w = size.0.clamp(1, metrics.width.max(1));
    let h = size.1.clamp(1, metrics.height.max(1));
    Rect::new(
        metrics.origin_x + (metrics.width - w) / 2,
        metrics.origin_y + (metrics.height - h) / 2,
        w,
        h,
    )
}
