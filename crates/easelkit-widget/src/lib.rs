//! Editor widget boundary for EaselKit canvases.
//!
//! The widget is a well-behaved consumer of the coordinator: it requests
//! its canvas through [`CanvasCoordinator::initialize_canvas`], never
//! constructs a surface directly, and re-queries the registry for every
//! operation instead of caching the instance it saw at attach time.
//!
//! [`CanvasCoordinator::initialize_canvas`]: easelkit_core::coordinator::CanvasCoordinator::initialize_canvas

pub mod editor;

pub use editor::{EditorWidget, WidgetError};
