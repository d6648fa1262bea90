//! Store constructors and their administrative capabilities.

use crate::error::{StorageError, StorageResult};
use crate::store::OrderedStore;
use std::fmt;
use std::path::Path;

/// An administrative method a backend may provide besides its data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Remove every trace of a store location.
    Destroy,
    /// Rebuild a damaged store location from its readable contents.
    Repair,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Self; 2] = [Self::Destroy, Self::Repair];

    const fn bit(self) -> u8 {
        match self {
            Self::Destroy => 0b01,
            Self::Repair => 0b10,
        }
    }

    /// Returns the method name this capability stands for.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Destroy => "destroy",
            Self::Repair => "repair",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of capabilities a [`StoreFactory`] declares.
///
/// ```rust
/// use crackup_storage::{Capabilities, Capability};
///
/// let caps = Capabilities::NONE.with(Capability::Destroy);
/// assert!(caps.contains(Capability::Destroy));
/// assert!(!caps.contains(Capability::Repair));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities(u8);

impl Capabilities {
    /// No administrative methods.
    pub const NONE: Self = Self(0);

    /// Returns this set plus `capability`.
    #[must_use]
    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    /// Returns `true` if `capability` is declared.
    #[must_use]
    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Fails with [`StorageError::Unsupported`] unless `capability` is declared.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported(capability)` if the set lacks it.
    pub fn require(self, capability: Capability) -> StorageResult<()> {
        if self.contains(capability) {
            Ok(())
        } else {
            Err(StorageError::Unsupported(capability))
        }
    }

    /// Iterates over the declared capabilities.
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL
            .into_iter()
            .filter(move |capability| self.contains(*capability))
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

impl<const N: usize> From<[Capability; N]> for Capabilities {
    fn from(capabilities: [Capability; N]) -> Self {
        capabilities.into_iter().collect()
    }
}

/// Constructor for stores at a given location.
///
/// This is the unit an encryption layer is composed with: it opens the raw
/// store and carries the location-level administrative methods. A factory
/// advertises which of those it implements through [`capabilities`];
/// callers check the table rather than probing methods.
///
/// [`capabilities`]: StoreFactory::capabilities
pub trait StoreFactory: Send + Sync {
    /// Opens (creating if needed) the store at `location`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    fn open(&self, location: &Path) -> StorageResult<Box<dyn OrderedStore>>;

    /// Returns the administrative methods this factory implements.
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Removes the store at `location`.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported(Destroy)` unless overridden.
    fn destroy(&self, _location: &Path) -> StorageResult<()> {
        Err(StorageError::Unsupported(Capability::Destroy))
    }

    /// Repairs the store at `location`.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported(Repair)` unless overridden.
    fn repair(&self, _location: &Path) -> StorageResult<()> {
        Err(StorageError::Unsupported(Capability::Repair))
    }
}
