//! Screen/client coordinate conversion.
//!
//! The engine speaks screen pixels; interactors are laid out in client
//! (page) space. A [`CoordinatesFacade`] holds the active converter, which
//! the host may swap at runtime, and the two signals the interactor layer
//! listens to: `client_changed` (the mapping moved) and
//! `virtual_bounds_changed` (the scrollable area was resized).

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::geometry::Rect;
use crate::signal::Signal;

/// Margin added around the page when computing virtual bounds
pub const VIRTUAL_BOUNDS_MARGIN: f64 = 250.0;

/// Conversion between screen and client coordinates.
pub trait CoordinateConverter: Send + Sync {
    /// Screen rectangle to client space
    fn screen_to_client(&self, rect: &Rect) -> Rect;

    /// Client rectangle to screen space
    fn client_to_screen(&self, rect: &Rect) -> Rect;

    /// Client-space area that interactors may occupy
    fn virtual_bounds(&self) -> Rect;
}

/// Converter for hosts whose client space is the screen.
#[derive(Debug)]
pub struct IdentityConverter {
    virtual_bounds: RwLock<Rect>,
}

impl IdentityConverter {
    /// Create a converter reporting `virtual_bounds`
    pub fn new(virtual_bounds: Rect) -> Self {
        Self {
            virtual_bounds: RwLock::new(virtual_bounds),
        }
    }

    /// Replace the reported virtual bounds
    pub fn set_virtual_bounds(&self, bounds: Rect) {
        *self.virtual_bounds.write() = bounds;
    }
}

impl CoordinateConverter for IdentityConverter {
    fn screen_to_client(&self, rect: &Rect) -> Rect {
        *rect
    }

    fn client_to_screen(&self, rect: &Rect) -> Rect {
        *rect
    }

    fn virtual_bounds(&self) -> Rect {
        *self.virtual_bounds.read()
    }
}

/// Geometry of a browser-like viewport, reported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMetrics {
    /// Window position on screen (screen pixels)
    pub window_x: f64,
    /// Window position on screen (screen pixels)
    pub window_y: f64,
    /// Offset of the page inside the window (screen pixels)
    pub page_offset_x: f64,
    /// Offset of the page inside the window (screen pixels)
    pub page_offset_y: f64,
    /// Page scroll offset (page pixels)
    pub scroll_x: f64,
    /// Page scroll offset (page pixels)
    pub scroll_y: f64,
    /// Device pixel ratio
    pub zoom: f64,
    /// Visible page size
    pub viewport_width: f64,
    /// Visible page size
    pub viewport_height: f64,
    /// Full scrollable page size
    pub page_width: f64,
    /// Full scrollable page size
    pub page_height: f64,
}

impl Default for ViewportMetrics {
    fn default() -> Self {
        Self {
            window_x: 0.0,
            window_y: 0.0,
            page_offset_x: 0.0,
            page_offset_y: 0.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
            zoom: 1.0,
            viewport_width: 0.0,
            viewport_height: 0.0,
            page_width: 0.0,
            page_height: 0.0,
        }
    }
}

/// What a metrics update changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewportChange {
    /// The screen/client mapping moved
    pub client_changed: bool,
    /// The virtual bounds were resized
    pub virtual_bounds_changed: bool,
}

/// Converter for a scrolled, zoomed page inside a window on screen.
#[derive(Debug, Default)]
pub struct ViewportConverter {
    metrics: Mutex<ViewportMetrics>,
}

impl ViewportConverter {
    /// Create a converter with initial metrics
    pub fn new(metrics: ViewportMetrics) -> Self {
        Self {
            metrics: Mutex::new(metrics),
        }
    }

    /// Current metrics
    pub fn metrics(&self) -> ViewportMetrics {
        *self.metrics.lock()
    }

    /// Store new metrics and report what changed.
    ///
    /// Position and size jitter below a pixel (two for offsets) is ignored.
    pub fn update(&self, next: ViewportMetrics) -> ViewportChange {
        let mut metrics = self.metrics.lock();
        let prev = *metrics;
        let client_changed = !almost_equals(prev.window_x, next.window_x, 1.0)
            || !almost_equals(prev.window_y, next.window_y, 1.0)
            || !almost_equals(prev.page_offset_x, next.page_offset_x, 2.0)
            || !almost_equals(prev.page_offset_y, next.page_offset_y, 2.0)
            || !almost_equals(prev.scroll_x, next.scroll_x, 2.0)
            || !almost_equals(prev.scroll_y, next.scroll_y, 2.0)
            || !almost_equals(prev.viewport_width, next.viewport_width, 1.0)
            || !almost_equals(prev.viewport_height, next.viewport_height, 1.0)
            || !almost_equals(prev.zoom, next.zoom, 0.01);
        let virtual_bounds_changed =
            !virtual_bounds_of(&prev).almost_equals(&virtual_bounds_of(&next), 1.0);
        *metrics = next;

        let change = ViewportChange {
            client_changed,
            virtual_bounds_changed,
        };
        if change != ViewportChange::default() {
            debug!(?change, "Viewport metrics changed");
        }
        change
    }
}

impl CoordinateConverter for ViewportConverter {
    fn screen_to_client(&self, rect: &Rect) -> Rect {
        let m = self.metrics.lock();
        Rect::new(
            (rect.x - m.window_x - m.page_offset_x) / m.zoom + m.scroll_x,
            (rect.y - m.window_y - m.page_offset_y) / m.zoom + m.scroll_y,
            rect.width / m.zoom,
            rect.height / m.zoom,
        )
    }

    fn client_to_screen(&self, rect: &Rect) -> Rect {
        let m = self.metrics.lock();
        Rect::new(
            (rect.x - m.scroll_x) * m.zoom + m.window_x + m.page_offset_x,
            (rect.y - m.scroll_y) * m.zoom + m.window_y + m.page_offset_y,
            rect.width * m.zoom,
            rect.height * m.zoom,
        )
    }

    fn virtual_bounds(&self) -> Rect {
        virtual_bounds_of(&self.metrics.lock())
    }
}

fn virtual_bounds_of(metrics: &ViewportMetrics) -> Rect {
    Rect::new(
        -VIRTUAL_BOUNDS_MARGIN,
        -VIRTUAL_BOUNDS_MARGIN,
        metrics.page_width + 2.0 * VIRTUAL_BOUNDS_MARGIN,
        metrics.page_height + 2.0 * VIRTUAL_BOUNDS_MARGIN,
    )
}

fn almost_equals(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

/// The active converter plus change signals.
pub struct CoordinatesFacade {
    converter: RwLock<Arc<dyn CoordinateConverter>>,
    /// Raised when the screen/client mapping changes
    pub client_changed: Signal,
    /// Raised when the virtual bounds change
    pub virtual_bounds_changed: Signal,
}

impl CoordinatesFacade {
    /// Create a facade over `converter`
    pub fn new(converter: Arc<dyn CoordinateConverter>) -> Self {
        Self {
            converter: RwLock::new(converter),
            client_changed: Signal::new("client_changed"),
            virtual_bounds_changed: Signal::new("virtual_bounds_changed"),
        }
    }

    /// Swap the active converter.
    ///
    /// Both signals fire, since every cached mapping is stale afterwards.
    pub fn set_converter(&self, converter: Arc<dyn CoordinateConverter>) {
        *self.converter.write() = converter;
        self.client_changed.raise();
        self.virtual_bounds_changed.raise();
    }

    /// Raise the signals a [`ViewportConverter::update`] asked for
    pub fn notify(&self, change: ViewportChange) {
        if change.client_changed {
            self.client_changed.raise();
        }
        if change.virtual_bounds_changed {
            self.virtual_bounds_changed.raise();
        }
    }

    fn current(&self) -> Arc<dyn CoordinateConverter> {
        Arc::clone(&self.converter.read())
    }
}

impl CoordinateConverter for CoordinatesFacade {
    fn screen_to_client(&self, rect: &Rect) -> Rect {
        self.current().screen_to_client(rect)
    }

    fn client_to_screen(&self, rect: &Rect) -> Rect {
        self.current().client_to_screen(rect)
    }

    fn virtual_bounds(&self) -> Rect {
        self.current().virtual_bounds()
    }
}

impl std::fmt::Debug for CoordinatesFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatesFacade")
            .field("virtual_bounds", &self.virtual_bounds())
            .finish_non_exhaustive()
    }
}
