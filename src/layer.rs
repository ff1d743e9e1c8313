//! # Layer Trait
//!
//! Tower-style middleware composition for stores.
//!
//! ```text
//! Store ──▶ Layer::layer() ──▶ Wrapped Store
//! ```
//!
//! Each middleware provides a wrapper that implements [`Store`] and a
//! `Layer` that builds the wrapper. [`AccountingLayer`](crate::AccountingLayer)
//! is the layer shipped with this crate.
//!
//! ## Example
//!
//! ```rust
//! use iostore::{Layer, Store};
//!
//! struct AuditLayer {
//!     tag: &'static str,
//! }
//!
//! struct Audited<S> {
//!     inner: S,
//!     tag: &'static str,
//! }
//!
//! impl<S: Store> Layer<S> for AuditLayer {
//!     type Store = Audited<S>;
//!
//!     fn layer(self, store: S) -> Self::Store {
//!         Audited { inner: store, tag: self.tag }
//!     }
//! }
//! ```

use crate::Store;

/// A layer that wraps a store to add functionality.
///
/// `layer(self, store)` consumes both the layer and the store. Layers are
/// compile-time composition and are not object-safe.
pub trait Layer<S> {
    /// The store produced by this layer.
    type Store;

    /// Wrap `store`.
    fn layer(self, store: S) -> Self::Store;
}

/// Fluent layer composition: `store.layer(a).layer(b)`.
///
/// ```rust
/// use iostore::{AccountingLayer, LayerExt, PosixStore, Store};
///
/// fn accounted() -> impl Store {
///     PosixStore::new().layer(AccountingLayer::new())
/// }
/// ```
pub trait LayerExt: Store + Sized {
    /// Apply a layer to this store.
    fn layer<L: Layer<Self>>(self, layer: L) -> L::Store {
        layer.layer(self)
    }
}

impl<S: Store> LayerExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccountingLayer, PosixStore};

    #[test]
    fn layer_ext_is_auto_implemented() {
        fn _check<S: Store + LayerExt>() {}
        _check::<PosixStore>();
    }

    #[test]
    fn layers_compose() {
        let store = PosixStore::new()
            .layer(AccountingLayer::new())
            .layer(AccountingLayer::new());
        fn _takes_store<T: Store>(_: &T) {}
        _takes_store(&store);
    }
}
