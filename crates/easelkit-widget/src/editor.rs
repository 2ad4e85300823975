//! The editor widget.
//!
//! Holds a canvas id and a coordinator handle, nothing else. The surface
//! itself stays owned by the registry; every operation re-queries it so a
//! disposal or self-heal elsewhere is picked up on the next call instead
//! of leaving the widget drawing on a dead instance.

use easelkit_core::coordinator::{CanvasCoordinator, CanvasOptions, CoordinatorError};
use easelkit_core::deferred::Deferred;
use easelkit_core::events::CoordinatorEvent;
use easelkit_core::surface::{Drawable, DrawableKind, SharedSurface, SurfaceError, SurfaceRef};
use kurbo::{Point, Size};
use thiserror::Error;
use uuid::Uuid;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// Widget errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WidgetError {
    #[error("widget has no canvas; call attach first")]
    NotAttached,
    #[error("canvas '{id}' is gone; the surface was disposed")]
    SurfaceGone { id: String },
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error("canvas initialization failed: {0}")]
    Init(#[from] CoordinatorError),
}

/// An editor bound to one canvas id.
pub struct EditorWidget {
    id: String,
    width: f64,
    height: f64,
    coordinator: CanvasCoordinator,
}

impl EditorWidget {
    pub fn new(
        coordinator: CanvasCoordinator,
        id: impl Into<String>,
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            coordinator,
        }
    }

    /// Canvas id this widget edits.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request the widget's canvas from the coordinator and announce
    /// readiness once it exists.
    ///
    /// Safe to call any number of times and from any number of widgets
    /// sharing an id; the coordinator coalesces the requests onto one
    /// construction.
    pub fn attach(&self, now: Instant) -> Deferred<SurfaceRef, WidgetError> {
        let out: Deferred<SurfaceRef, WidgetError> = Deferred::new();
        let options = CanvasOptions::new(self.id.clone(), self.width, self.height)
            .with_source("editor-widget");
        let events = self.coordinator.events();
        let id = self.id.clone();
        let out_for_waiters = out.clone();
        self.coordinator
            .initialize_canvas(options, now)
            .subscribe(move |outcome| match outcome {
                Ok(init) => {
                    events.emit(CoordinatorEvent::WidgetReady { id: id.clone() });
                    out_for_waiters.resolve(init.surface.clone());
                }
                Err(err) => {
                    log::error!("widget attach for '{id}' failed: {err}");
                    out_for_waiters.reject(WidgetError::Init(err.clone()));
                }
            });
        out
    }

    /// Whether the widget's canvas currently exists and is healthy.
    pub fn is_ready(&self) -> bool {
        self.coordinator
            .get_canvas(&self.id)
            .map(|r| r.is_alive())
            .unwrap_or(false)
    }

    /// Add a shape to the canvas, returning its id.
    pub fn add_shape(
        &self,
        kind: DrawableKind,
        origin: Point,
        size: Size,
    ) -> Result<Uuid, WidgetError> {
        let surface = self.surface()?;
        let id = surface.borrow_mut().add_drawable(Drawable::new(kind, origin, size))?;
        Ok(id)
    }

    /// Remove a shape by id. Returns true if it was present.
    pub fn remove_shape(&self, id: Uuid) -> Result<bool, WidgetError> {
        let surface = self.surface()?;
        let removed = surface.borrow_mut().remove_drawable(id)?;
        Ok(removed)
    }

    /// Number of shapes on the canvas.
    pub fn shape_count(&self) -> Result<usize, WidgetError> {
        Ok(self.surface()?.borrow().drawables().len())
    }

    /// Render a frame. Returns the total frames rendered.
    pub fn render(&self) -> Result<u64, WidgetError> {
        let surface = self.surface()?;
        let frames = surface.borrow_mut().render()?;
        Ok(frames)
    }

    /// Serialize the current design to JSON.
    pub fn save_design(&self) -> Result<String, WidgetError> {
        let surface = self.surface()?;
        let json = surface.borrow().serialize_design()?;
        Ok(json)
    }

    /// Replace the design from JSON produced by [`EditorWidget::save_design`].
    pub fn restore_design(&self, json: &str) -> Result<(), WidgetError> {
        let surface = self.surface()?;
        surface.borrow_mut().load_design(json)?;
        Ok(())
    }

    // Re-queried on every operation; the registry decides what is live.
    fn surface(&self) -> Result<SharedSurface, WidgetError> {
        match self.coordinator.get_canvas(&self.id) {
            Some(r) => r.upgrade().ok_or_else(|| WidgetError::SurfaceGone {
                id: self.id.clone(),
            }),
            None => Err(WidgetError::NotAttached),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easelkit_core::coordinator::CoordinatorConfig;
    use easelkit_core::engine::bundled::{ModuleCache, ModuleExport};
    use easelkit_core::engine::fallback::FallbackEngine;
    use easelkit_core::engine::Engine;
    use easelkit_core::events::EventKey;
    use std::cell::Cell;
    use std::rc::Rc;

    struct EngineExport(Rc<dyn Engine>);
    impl ModuleExport for EngineExport {
        fn as_engine(&self) -> Option<Rc<dyn Engine>> {
            Some(self.0.clone())
        }
    }

    fn coordinator() -> CanvasCoordinator {
        let coordinator = CanvasCoordinator::new(CoordinatorConfig::default());
        let mut cache = ModuleCache::new();
        cache.insert(
            "render-engine",
            Rc::new(EngineExport(Rc::new(FallbackEngine::new()))),
        );
        coordinator.register_bundled_cache(cache);
        coordinator
    }

    #[test]
    fn attach_initializes_and_announces() {
        let coordinator = coordinator();
        let ready = Rc::new(Cell::new(0));
        let r = ready.clone();
        coordinator
            .events()
            .once(EventKey::widget_ready("c1"), move |_| r.set(r.get() + 1));

        let widget = EditorWidget::new(coordinator.clone(), "c1", 800.0, 600.0);
        assert!(!widget.is_ready());

        let attached = widget.attach(Instant::now());
        assert!(matches!(attached.peek(), Some(Ok(_))));
        assert!(widget.is_ready());
        assert_eq!(ready.get(), 1);
    }

    #[test]
    fn operations_go_through_the_registry() {
        let coordinator = coordinator();
        let widget = EditorWidget::new(coordinator, "c1", 800.0, 600.0);
        widget.attach(Instant::now());

        let id = widget
            .add_shape(
                DrawableKind::Rect,
                Point::new(10.0, 10.0),
                Size::new(100.0, 50.0),
            )
            .unwrap();
        assert_eq!(widget.shape_count().unwrap(), 1);
        assert_eq!(widget.render().unwrap(), 1);

        let json = widget.save_design().unwrap();
        assert!(widget.remove_shape(id).unwrap());
        assert_eq!(widget.shape_count().unwrap(), 0);

        widget.restore_design(&json).unwrap();
        assert_eq!(widget.shape_count().unwrap(), 1);
    }

    #[test]
    fn detached_widget_refuses_operations() {
        let coordinator = coordinator();
        let widget = EditorWidget::new(coordinator, "c1", 800.0, 600.0);
        assert_eq!(
            widget.shape_count().unwrap_err(),
            WidgetError::NotAttached
        );
        assert_eq!(widget.render().unwrap_err(), WidgetError::NotAttached);
    }

    #[test]
    fn disposal_is_picked_up_on_the_next_operation() {
        let coordinator = coordinator();
        let widget = EditorWidget::new(coordinator.clone(), "c1", 800.0, 600.0);
        widget.attach(Instant::now());
        widget
            .add_shape(
                DrawableKind::Ellipse,
                Point::new(0.0, 0.0),
                Size::new(20.0, 20.0),
            )
            .unwrap();

        assert!(coordinator.dispose("c1"));
        assert!(!widget.is_ready());
        assert_eq!(
            widget.shape_count().unwrap_err(),
            WidgetError::NotAttached
        );

        // A fresh attach runs a whole new lifecycle with an empty canvas.
        let attached = widget.attach(Instant::now());
        assert!(matches!(attached.peek(), Some(Ok(_))));
        assert_eq!(widget.shape_count().unwrap(), 0);
    }

    #[test]
    fn widgets_sharing_an_id_share_the_surface() {
        let coordinator = coordinator();
        let first = EditorWidget::new(coordinator.clone(), "c1", 800.0, 600.0);
        let second = EditorWidget::new(coordinator.clone(), "c1", 800.0, 600.0);

        let now = Instant::now();
        first.attach(now);
        second.attach(now);
        assert_eq!(coordinator.get_status().attempts, 1);

        first
            .add_shape(
                DrawableKind::Line,
                Point::new(0.0, 0.0),
                Size::new(50.0, 0.0),
            )
            .unwrap();
        assert_eq!(second.shape_count().unwrap(), 1);
    }
}
