//! Per-class element-shape cache.
//!
//! Decoding a class's element shape means chasing class metadata through
//! the snapshot, and a heap scan asks for the same handful of classes
//! millions of times. Shapes are immutable for the life of a class, so a
//! plain map keyed by class reference is safe — with one exception:
//! class redefinition can put a different shape behind the same class
//! identity. Whoever observes a redefinition event must invalidate, the
//! cache cannot detect it on its own.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::{ElementShape, Result};

#[derive(Debug, Default)]
pub struct ShapeCache {
    shapes: RwLock<HashMap<u64, ElementShape, ahash::RandomState>>,
}

impl ShapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, class_ref: u64) -> Option<ElementShape> {
        self.shapes.read().get(&class_ref).copied()
    }

    /// Serve the cached shape, or run `decode` once and remember it.
    /// A failed decode is not cached; the next query retries.
    pub fn get_or_insert_with<F>(&self, class_ref: u64, decode: F) -> Result<ElementShape>
    where
        F: FnOnce() -> Result<ElementShape>,
    {
        if let Some(shape) = self.get(class_ref) {
            return Ok(shape);
        }
        let shape = decode()?;
        self.shapes.write().insert(class_ref, shape);
        Ok(shape)
    }

    /// Drop one class, returning whether it was cached. Call on class
    /// redefinition before trusting the identity again.
    pub fn invalidate(&self, class_ref: u64) -> bool {
        self.shapes.write().remove(&class_ref).is_some()
    }

    pub fn invalidate_all(&self) {
        self.shapes.write().clear();
    }

    pub fn len(&self) -> usize {
        self.shapes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.read().is_empty()
    }
}
