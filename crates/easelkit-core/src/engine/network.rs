//! Hosted-copy loading strategy.
//!
//! The second-priority strategy: insert a reference to a hosted copy of
//! the engine and wait for its load/error signal. The signal arrives
//! through a [`NetworkLoadHandle`] so the transport itself stays outside
//! the coordinator; on wasm32 a script-element injector drives the handle,
//! natively the embedder does.
//!
//! A signal arriving after the broker has already resolved is checked
//! against the resolution state there and discarded, never swapped in.

use super::broker::{LoaderPoll, LoaderStrategy};
use super::{Engine, EngineSource};
use std::cell::RefCell;
use std::rc::Rc;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// Outcome of the hosted-copy load.
#[derive(Clone)]
pub enum LoadSignal {
    Loaded(Rc<dyn Engine>),
    Failed(String),
}

/// Completion handle for the network strategy.
///
/// Clonable; the first signal wins and later ones are ignored.
#[derive(Clone, Default)]
pub struct NetworkLoadHandle {
    cell: Rc<RefCell<Option<LoadSignal>>>,
}

impl NetworkLoadHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a successfully loaded engine. Returns false if a signal was
    /// already recorded.
    pub fn complete(&self, engine: Rc<dyn Engine>) -> bool {
        self.signal(LoadSignal::Loaded(engine))
    }

    /// Report a load failure. Returns false if a signal was already
    /// recorded.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.signal(LoadSignal::Failed(reason.into()))
    }

    /// Whether any signal has been recorded.
    pub fn is_signaled(&self) -> bool {
        self.cell.borrow().is_some()
    }

    fn signal(&self, signal: LoadSignal) -> bool {
        let mut cell = self.cell.borrow_mut();
        if cell.is_some() {
            log::debug!("network load signal after completion; ignored");
            return false;
        }
        *cell = Some(signal);
        true
    }
}

/// Loader strategy waiting on a [`NetworkLoadHandle`].
pub struct NetworkLoader {
    handle: NetworkLoadHandle,
}

impl NetworkLoader {
    /// Create the loader together with the handle its transport completes.
    pub fn new() -> (Self, NetworkLoadHandle) {
        let handle = NetworkLoadHandle::new();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl LoaderStrategy for NetworkLoader {
    fn source(&self) -> EngineSource {
        EngineSource::Network
    }

    fn start(&mut self, _now: Instant) {
        log::debug!("network loader: waiting for hosted engine load signal");
    }

    fn poll(&mut self, _now: Instant) -> LoaderPoll {
        match &*self.handle.cell.borrow() {
            Some(LoadSignal::Loaded(engine)) => LoaderPoll::Ready(engine.clone()),
            Some(LoadSignal::Failed(reason)) => LoaderPoll::Failed(reason.clone()),
            None => LoaderPoll::Pending,
        }
    }
}

/// Script-element injection for browser pages.
///
/// Inserts a `<script>` tag for the hosted engine and wires its
/// load/error events to a [`NetworkLoadHandle`]. The closures are stored
/// on the injector so they outlive the call, as the page owns the DOM
/// element for the rest of its lifetime.
#[cfg(target_arch = "wasm32")]
mod script {
    use super::*;
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsCast;

    pub struct ScriptInjector {
        _on_load: Closure<dyn Fn()>,
        _on_error: Closure<dyn Fn(web_sys::Event)>,
    }

    impl ScriptInjector {
        /// Inject the hosted engine script. `probe` runs on the load event
        /// and extracts the engine from whatever global the script set up.
        pub fn inject(
            url: &str,
            handle: NetworkLoadHandle,
            probe: Box<dyn Fn() -> Option<Rc<dyn Engine>>>,
        ) -> Result<Self, String> {
            let document = web_sys::window()
                .and_then(|w| w.document())
                .ok_or_else(|| "no document available".to_string())?;
            let script = document
                .create_element("script")
                .map_err(|e| format!("failed to create script element: {e:?}"))?
                .dyn_into::<web_sys::HtmlScriptElement>()
                .map_err(|_| "element is not a script".to_string())?;
            script.set_src(url);

            let load_handle = handle.clone();
            let on_load = Closure::wrap(Box::new(move || match probe() {
                Some(engine) => {
                    load_handle.complete(engine);
                }
                None => {
                    load_handle.fail("hosted script loaded but exposed no engine");
                }
            }) as Box<dyn Fn()>);
            script.set_onload(Some(on_load.as_ref().unchecked_ref()));

            let error_handle = handle;
            let on_error = Closure::wrap(Box::new(move |_e: web_sys::Event| {
                error_handle.fail("hosted engine script failed to load");
            }) as Box<dyn Fn(web_sys::Event)>);
            script.set_onerror(Some(on_error.as_ref().unchecked_ref()));

            document
                .head()
                .ok_or_else(|| "document has no head".to_string())?
                .append_child(&script)
                .map_err(|e| format!("failed to append script element: {e:?}"))?;

            Ok(Self {
                _on_load: on_load,
                _on_error: on_error,
            })
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use script::ScriptInjector;
