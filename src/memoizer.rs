use std::sync::Mutex;

use eyre::Result;

type Supplier<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

/// Container for a value that is initialized and cached lazily.
///
/// The supplier runs on the first `get` and again after every `refresh`.
/// A failing supplier leaves the cache uninitialized, so the next `get`
/// retries.
pub struct Memoizer<T> {
    supplier: Supplier<T>,
    cached: Mutex<Option<T>>,
}

impl<T: Clone> Memoizer<T> {
    pub fn new<F>(supplier: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self {
            supplier: Box::new(supplier),
            cached: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Result<T> {
        let mut cached = self.cached.lock().expect("memoizer lock poisoned");

        Self::get_locked(&self.supplier, &mut cached)
    }

    /// Invalidates the cached value and re-runs the supplier.
    pub fn refresh(&self) -> Result<T> {
        let mut cached = self.cached.lock().expect("memoizer lock poisoned");

        *cached = None;

        Self::get_locked(&self.supplier, &mut cached)
    }

    fn get_locked(supplier: &Supplier<T>, cached: &mut Option<T>) -> Result<T> {
        if let Some(val) = cached.as_ref() {
            return Ok(val.clone());
        }

        let val = supplier()?;
        *cached = Some(val.clone());

        Ok(val)
    }
}
