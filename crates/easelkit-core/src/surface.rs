//! Surface model: drawables, the health contract, and ownership forms.
//!
//! The registry is the exclusive owner of every live surface
//! (`SharedSurface`); everything else holds a [`SurfaceRef`], a non-owning
//! handle that dies when the registry disposes the entry.

use kurbo::{Point, Size};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use thiserror::Error;
use uuid::Uuid;

/// Surface errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("surface is disposed")]
    Disposed,
    #[error("invalid design data: {0}")]
    InvalidDesign(String),
    #[error("render failed: {0}")]
    RenderFailed(String),
}

/// Result type for surface operations.
pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// Explicit liveness contract for surfaces.
///
/// The registry consults this before returning a cached surface; anything
/// but `Alive` causes the entry to be discarded and rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceHealth {
    /// Fully functional.
    Alive,
    /// Resources released; the surface will never work again.
    Disposed,
    /// Structurally present but no longer functional (e.g. its backing
    /// element was torn down out-of-band).
    Defunct,
}

impl SurfaceHealth {
    pub fn is_alive(self) -> bool {
        matches!(self, SurfaceHealth::Alive)
    }
}

/// Kind of drawable object held by a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawableKind {
    Rect,
    Ellipse,
    Line,
    Text,
}

/// A drawable object on a surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drawable {
    /// Unique drawable identifier.
    pub id: Uuid,
    /// Shape kind.
    pub kind: DrawableKind,
    /// Top-left corner in canvas coordinates.
    pub origin: Point,
    /// Extent of the drawable.
    pub size: Size,
    /// Fill color as RGBA bytes.
    pub fill: [u8; 4],
}

impl Drawable {
    /// Create a drawable with a fresh id and an opaque black fill.
    pub fn new(kind: DrawableKind, origin: Point, size: Size) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            origin,
            size,
            fill: [0, 0, 0, 255],
        }
    }

    /// Set the fill color.
    pub fn with_fill(mut self, fill: [u8; 4]) -> Self {
        self.fill = fill;
        self
    }
}

/// Options for constructing a surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceOptions {
    /// Logical canvas identifier.
    pub id: String,
    /// Width in logical pixels.
    pub width: f64,
    /// Height in logical pixels.
    pub height: f64,
    /// Background color as RGBA bytes.
    pub background: [u8; 4],
}

impl SurfaceOptions {
    /// Create options with a white background.
    pub fn new(id: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            background: [255, 255, 255, 255],
        }
    }

    /// Set the background color.
    pub fn with_background(mut self, background: [u8; 4]) -> Self {
        self.background = background;
        self
    }
}

/// The live, stateful drawing surface owned by the registry.
///
/// This is the small operation set consumers actually use; it is also the
/// contract the fallback stub engine must satisfy.
pub trait Surface {
    /// Logical canvas identifier this surface was constructed for.
    fn id(&self) -> &str;

    /// Add a drawable, returning its id.
    fn add_drawable(&mut self, drawable: Drawable) -> SurfaceResult<Uuid>;

    /// Remove a drawable by id. Returns true if it was present.
    fn remove_drawable(&mut self, id: Uuid) -> SurfaceResult<bool>;

    /// Snapshot of the current drawables, back to front.
    fn drawables(&self) -> Vec<Drawable>;

    /// Serialize the design to JSON.
    fn serialize_design(&self) -> SurfaceResult<String>;

    /// Replace the design from JSON previously produced by
    /// [`Surface::serialize_design`].
    fn load_design(&mut self, json: &str) -> SurfaceResult<()>;

    /// Render a frame. Returns the total number of frames rendered.
    fn render(&mut self) -> SurfaceResult<u64>;

    /// Current health of the surface.
    fn health(&self) -> SurfaceHealth;

    /// Release resources. After this, `health()` reports `Disposed` and
    /// every mutating operation fails.
    fn dispose(&mut self);
}

/// Owned form of a surface. Held only by the registry and by settlement
/// results that consumers are expected to use immediately rather than
/// cache.
pub type SharedSurface = Rc<RefCell<dyn Surface>>;

/// Non-owning surface handle. Consumers keep these and re-query rather
/// than holding a surface across long lifetimes; once the registry
/// disposes an entry, `upgrade()` on outstanding refs returns `None`.
#[derive(Clone)]
pub struct SurfaceRef {
    id: String,
    inner: Weak<RefCell<dyn Surface>>,
}

impl SurfaceRef {
    /// Create a non-owning reference to an owned surface.
    pub fn new(surface: &SharedSurface) -> Self {
        Self {
            id: surface.borrow().id().to_string(),
            inner: Rc::downgrade(surface),
        }
    }

    /// Canvas id this reference points at.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Upgrade to the owned form, if the registry still owns it.
    pub fn upgrade(&self) -> Option<SharedSurface> {
        self.inner.upgrade()
    }

    /// Whether the surface is still owned and passes its health check.
    pub fn is_alive(&self) -> bool {
        self.inner
            .upgrade()
            .map(|s| s.borrow().health().is_alive())
            .unwrap_or(false)
    }
}

impl fmt::Debug for SurfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceRef")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Serialized design document.
#[derive(Debug, Serialize, Deserialize)]
struct DesignData {
    id: String,
    drawables: Vec<Drawable>,
}

/// In-process surface implementation.
///
/// This is what the fallback stub engine constructs when no real engine
/// loads within budget; it is deliberately minimal but honors the full
/// `Surface` contract.
#[derive(Debug)]
pub struct BasicSurface {
    id: String,
    width: f64,
    height: f64,
    background: [u8; 4],
    drawables: Vec<Drawable>,
    frames_rendered: u64,
    health: SurfaceHealth,
}

impl BasicSurface {
    /// Create a surface from construction options.
    pub fn new(options: &SurfaceOptions) -> Self {
        Self {
            id: options.id.clone(),
            width: options.width,
            height: options.height,
            background: options.background,
            drawables: Vec::new(),
            frames_rendered: 0,
            health: SurfaceHealth::Alive,
        }
    }

    /// Width in logical pixels.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Height in logical pixels.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Background color.
    pub fn background(&self) -> [u8; 4] {
        self.background
    }

    /// Mark the surface as structurally present but non-functional, as an
    /// out-of-band teardown would. The registry self-heals on the next
    /// lookup.
    pub fn mark_defunct(&mut self) {
        if self.health == SurfaceHealth::Alive {
            self.health = SurfaceHealth::Defunct;
        }
    }

    fn ensure_alive(&self) -> SurfaceResult<()> {
        match self.health {
            SurfaceHealth::Alive => Ok(()),
            SurfaceHealth::Disposed => Err(SurfaceError::Disposed),
            SurfaceHealth::Defunct => {
                Err(SurfaceError::RenderFailed("surface is defunct".to_string()))
            }
        }
    }
}

impl Surface for BasicSurface {
    fn id(&self) -> &str {
        &self.id
    }

    fn add_drawable(&mut self, drawable: Drawable) -> SurfaceResult<Uuid> {
        self.ensure_alive()?;
        let id = drawable.id;
        self.drawables.push(drawable);
        Ok(id)
    }

    fn remove_drawable(&mut self, id: Uuid) -> SurfaceResult<bool> {
        self.ensure_alive()?;
        let before = self.drawables.len();
        self.drawables.retain(|d| d.id != id);
        Ok(self.drawables.len() != before)
    }

    fn drawables(&self) -> Vec<Drawable> {
        self.drawables.clone()
    }

    fn serialize_design(&self) -> SurfaceResult<String> {
        self.ensure_alive()?;
        let data = DesignData {
            id: self.id.clone(),
            drawables: self.drawables.clone(),
        };
        serde_json::to_string(&data).map_err(|e| SurfaceError::InvalidDesign(e.to_string()))
    }

    fn load_design(&mut self, json: &str) -> SurfaceResult<()> {
        self.ensure_alive()?;
        let data: DesignData =
            serde_json::from_str(json).map_err(|e| SurfaceError::InvalidDesign(e.to_string()))?;
        self.drawables = data.drawables;
        Ok(())
    }

    fn render(&mut self) -> SurfaceResult<u64> {
        self.ensure_alive()?;
        self.frames_rendered += 1;
        log::trace!(
            "rendered surface '{}': {} drawables, frame {}",
            self.id,
            self.drawables.len(),
            self.frames_rendered
        );
        Ok(self.frames_rendered)
    }

    fn health(&self) -> SurfaceHealth {
        self.health
    }

    fn dispose(&mut self) {
        if self.health == SurfaceHealth::Disposed {
            return;
        }
        self.drawables.clear();
        self.health = SurfaceHealth::Disposed;
        log::debug!("disposed surface '{}'", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> BasicSurface {
        BasicSurface::new(&SurfaceOptions::new("c1", 800.0, 600.0))
    }

    #[test]
    fn add_and_remove_drawables() {
        let mut s = surface();
        let id = s
            .add_drawable(Drawable::new(
                DrawableKind::Rect,
                Point::new(10.0, 10.0),
                Size::new(100.0, 50.0),
            ))
            .unwrap();
        assert_eq!(s.drawables().len(), 1);
        assert!(s.remove_drawable(id).unwrap());
        assert!(!s.remove_drawable(id).unwrap());
        assert!(s.drawables().is_empty());
    }

    #[test]
    fn design_roundtrip() {
        let mut s = surface();
        s.add_drawable(
            Drawable::new(
                DrawableKind::Ellipse,
                Point::new(0.0, 0.0),
                Size::new(20.0, 20.0),
            )
            .with_fill([255, 0, 0, 255]),
        )
        .unwrap();
        let json = s.serialize_design().unwrap();

        let mut other = surface();
        other.load_design(&json).unwrap();
        assert_eq!(other.drawables().len(), 1);
        assert_eq!(other.drawables()[0].fill, [255, 0, 0, 255]);
    }

    #[test]
    fn load_rejects_garbage() {
        let mut s = surface();
        assert!(matches!(
            s.load_design("not json"),
            Err(SurfaceError::InvalidDesign(_))
        ));
    }

    #[test]
    fn dispose_fails_operations_and_kills_refs() {
        let shared: SharedSurface = Rc::new(RefCell::new(surface()));
        let non_owning = SurfaceRef::new(&shared);
        assert!(non_owning.is_alive());

        shared.borrow_mut().dispose();
        assert_eq!(shared.borrow().health(), SurfaceHealth::Disposed);
        assert!(!non_owning.is_alive());
        assert!(matches!(
            shared.borrow_mut().render(),
            Err(SurfaceError::Disposed)
        ));

        drop(shared);
        assert!(non_owning.upgrade().is_none());
    }

    #[test]
    fn defunct_surface_fails_health_check() {
        let mut s = surface();
        s.mark_defunct();
        assert_eq!(s.health(), SurfaceHealth::Defunct);
        assert!(s.render().is_err());
    }

    #[test]
    fn render_counts_frames() {
        let mut s = surface();
        assert_eq!(s.render().unwrap(), 1);
        assert_eq!(s.render().unwrap(), 2);
    }
}
