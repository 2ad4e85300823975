//! EaselKit Core Library
//!
//! Canvas lifecycle coordination: exactly one live rendering surface per
//! canvas id, no matter how many initialization paths race for it.

pub mod coordinator;
pub mod deferred;
pub mod engine;
pub mod events;
pub mod gatekeeper;
pub mod registry;
pub mod surface;

pub use coordinator::{
    CanvasCoordinator, CanvasInit, CanvasOptions, CoordinatorConfig, CoordinatorError,
    CoordinatorStatus,
};
pub use deferred::Deferred;
pub use engine::broker::{EngineBroker, LoaderPoll, LoaderStrategy};
pub use engine::bundled::{ModuleCache, ModuleExport};
pub use engine::network::NetworkLoadHandle;
pub use engine::{Engine, EngineError, EngineHandle, EngineSource};
pub use events::{CoordinatorEvent, EventFabric, EventKey, EventKind};
pub use registry::{Disposition, SurfaceRegistry};
pub use surface::{
    BasicSurface, Drawable, DrawableKind, SharedSurface, Surface, SurfaceError, SurfaceHealth,
    SurfaceOptions, SurfaceRef,
};
