//! Bundled module-cache extraction.
//!
//! The highest-priority loading strategy: the engine may already be on
//! the page inside the bundler's module cache. The cache is scanned in
//! insertion order and the first export exposing the surface-construction
//! capability wins.

use super::broker::{LoaderPoll, LoaderStrategy};
use super::{Engine, EngineSource};
use std::rc::Rc;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// A cached module export that may or may not expose the engine.
///
/// This is the capability probe: most exports are unrelated page code and
/// return `None`.
pub trait ModuleExport {
    fn as_engine(&self) -> Option<Rc<dyn Engine>> {
        None
    }
}

/// Insertion-ordered view of the bundler's module cache.
#[derive(Default)]
pub struct ModuleCache {
    modules: Vec<(String, Rc<dyn ModuleExport>)>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named module export.
    pub fn insert(&mut self, name: impl Into<String>, export: Rc<dyn ModuleExport>) {
        self.modules.push((name.into(), export));
    }

    /// Number of cached exports.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Scan for the first export exposing a surface constructor.
    pub fn scan(&self) -> Option<(String, Rc<dyn Engine>)> {
        for (name, export) in &self.modules {
            match export.as_engine() {
                Some(engine) => {
                    log::debug!("module cache: '{name}' exposes engine '{}'", engine.name());
                    return Some((name.clone(), engine));
                }
                None => log::trace!("module cache: '{name}' has no surface constructor"),
            }
        }
        None
    }
}

/// Loader strategy wrapping the module-cache scan.
pub struct BundledLoader {
    cache: ModuleCache,
    scanned: bool,
}

impl BundledLoader {
    pub fn new(cache: ModuleCache) -> Self {
        Self {
            cache,
            scanned: false,
        }
    }
}

impl LoaderStrategy for BundledLoader {
    fn source(&self) -> EngineSource {
        EngineSource::Bundled
    }

    fn start(&mut self, _now: Instant) {
        log::debug!(
            "bundled loader: scanning {} cached module export(s)",
            self.cache.len()
        );
    }

    fn poll(&mut self, _now: Instant) -> LoaderPoll {
        if self.scanned {
            return LoaderPoll::Pending;
        }
        self.scanned = true;
        match self.cache.scan() {
            Some((name, engine)) => {
                log::info!("bundled loader: extracted engine from module '{name}'");
                LoaderPoll::Ready(engine)
            }
            None => LoaderPoll::Failed("no cached module exposes a surface constructor".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fallback::FallbackEngine;

    struct PlainExport;
    impl ModuleExport for PlainExport {}

    struct EngineExport(Rc<dyn Engine>);
    impl ModuleExport for EngineExport {
        fn as_engine(&self) -> Option<Rc<dyn Engine>> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn scan_skips_unrelated_exports() {
        let mut cache = ModuleCache::new();
        cache.insert("analytics", Rc::new(PlainExport));
        cache.insert("router", Rc::new(PlainExport));
        cache.insert(
            "render-engine",
            Rc::new(EngineExport(Rc::new(FallbackEngine::new()))),
        );
        let (name, _engine) = cache.scan().expect("engine export found");
        assert_eq!(name, "render-engine");
    }

    #[test]
    fn scan_empty_cache_finds_nothing() {
        assert!(ModuleCache::new().scan().is_none());
    }

    #[test]
    fn loader_fails_once_when_cache_is_bare() {
        let mut loader = BundledLoader::new(ModuleCache::new());
        let now = Instant::now();
        loader.start(now);
        assert!(matches!(loader.poll(now), LoaderPoll::Failed(_)));
        // Subsequent polls stay quiet; the broker has already recorded the
        // failure.
        assert!(matches!(loader.poll(now), LoaderPoll::Pending));
    }
}
