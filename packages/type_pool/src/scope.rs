/// Determines who keeps a pool alive.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum PoolScope {
    /// The pool is shared by all users of the type and owned by the
    /// [`PoolRegistry`][crate::PoolRegistry] until the registry is shut down. This is the default.
    #[default]
    Global,

    /// The pool lives only as long as the caller holds a [`Pool`][crate::Pool] handle to it,
    /// e.g. around a hot loop. When the last handle is dropped, the type returns to its
    /// original deallocation behavior.
    Scoped,
}
