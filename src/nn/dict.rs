use crate::nn::Module;
use crate::tensor::{Result, TensorElem, TensorError};
use std::fmt;

/// An insertion-ordered mapping from unique child name to submodule.
///
/// Composite models keep their submodules here so that wrappers can enumerate them in a stable
/// order and swap individual entries without touching the others.
pub struct ModuleDict<T: TensorElem> {
    entries: Vec<(String, Box<dyn Module<T>>)>,
}

impl<T: TensorElem> ModuleDict<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts `module` under `name`.
    ///
    /// An existing entry keeps its position and is returned.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        module: Box<dyn Module<T>>,
    ) -> Option<Box<dyn Module<T>>> {
        let name = name.into();
        match self.position(&name) {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx].1, module)),
            None => {
                self.entries.push((name, module));
                None
            }
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, module: impl Module<T> + 'static) -> Self {
        self.insert(name, Box::new(module));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Module<T>> {
        self.position(name).map(|idx| self.entries[idx].1.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Module<T> + 'static)> {
        let idx = self.position(name)?;
        Some(self.entries[idx].1.as_mut())
    }

    /// Replaces the module stored under `name` with `f(module)`, keeping its position.
    ///
    /// If `f` fails the entry is gone and the error is returned.
    pub fn replace_with<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(Box<dyn Module<T>>) -> Result<Box<dyn Module<T>>>,
    {
        let idx = self
            .position(name)
            .ok_or_else(|| TensorError::Unsupported(format!("no child module named `{name}`")))?;
        let (name, module) = self.entries.remove(idx);
        let module = f(module)?;
        self.entries.insert(idx, (name, module));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Module<T>)> {
        self.entries.iter().map(|(n, m)| (n.as_str(), m.as_ref()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Box<dyn Module<T>>)> {
        self.entries.iter_mut().map(|(n, m)| (n.as_str(), m))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }
}

impl<T: TensorElem> Default for ModuleDict<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TensorElem> fmt::Debug for ModuleDict<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(n, m)| (n, m)))
            .finish()
    }
}
