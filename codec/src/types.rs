//! Core types for the codec.

/// A stable ghost identifier.
///
/// Ghost ids are assigned by the server simulation and must remain stable
/// for the lifetime of a ghost. They are not reused while a despawn is
/// still unacknowledged by any connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GhostId(u32);

impl GhostId {
    /// Creates a new ghost id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ghost id value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for GhostId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<GhostId> for u32 {
    fn from(id: GhostId) -> Self {
        id.0
    }
}

impl std::fmt::Display for GhostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ghost#{}", self.0)
    }
}
