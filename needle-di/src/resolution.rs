//! Per-call resolution state. A [ResolutionContext] is created for every top-level request and
//! tracks the types currently under construction, which is enough to detect dependency cycles.
//! The context is deliberately `!Sync`, so it can never be shared between concurrent requests.

use crate::error::ResolutionError;
use crate::instance::TypeKey;
use crate::scope::TaskToken;
use std::cell::RefCell;
use tracing::trace;

/// State of a single top-level resolution call.
#[derive(Debug)]
pub struct ResolutionContext {
    task: TaskToken,
    path: RefCell<Vec<TypeKey>>,
}

impl ResolutionContext {
    pub fn new(task: TaskToken) -> Self {
        Self {
            task,
            path: Default::default(),
        }
    }

    /// Identity of the caller on whose behalf resolution happens.
    #[inline]
    pub fn task(&self) -> TaskToken {
        self.task
    }

    /// Marks given type as being under construction. The entry is removed when the returned guard
    /// is dropped, regardless of the construction outcome. Entering a type which is already on the
    /// path results in [ResolutionError::CircularDependency].
    pub fn enter(&self, key: TypeKey) -> Result<PathGuard<'_>, ResolutionError> {
        let mut path = self.path.borrow_mut();
        if let Some(position) = path.iter().position(|entry| *entry == key) {
            return Err(ResolutionError::CircularDependency {
                path: path[position..]
                    .iter()
                    .chain(Some(&key))
                    .map(|entry| entry.name)
                    .collect(),
            });
        }

        trace!(type_name = key.name, depth = path.len(), "Entering resolution path");
        path.push(key);

        Ok(PathGuard { context: self, key })
    }

    /// Current resolution path, outermost type first.
    pub fn path(&self) -> Vec<TypeKey> {
        self.path.borrow().clone()
    }
}

/// Removes its entry from the resolution path on drop.
pub struct PathGuard<'a> {
    context: &'a ResolutionContext,
    key: TypeKey,
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        let mut path = self.context.path.borrow_mut();
        let last = path.pop();
        debug_assert_eq!(last, Some(self.key));
    }
}
