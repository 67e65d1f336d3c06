/// Type-state markers for the builder pattern
///
/// These types track which required fields have been set in the builder
/// at compile-time, so a manager without a token or endpoint cannot exist.

use std::marker::PhantomData;

/// Marker trait for token state
pub trait TokenState {}

/// Token has not been set
pub struct NoToken;
impl TokenState for NoToken {}

/// Token has been set
pub struct HasToken;
impl TokenState for HasToken {}

/// Marker trait for gateway endpoint state
pub trait UrlState {}

/// Endpoint has not been set
pub struct NoUrl;
impl UrlState for NoUrl {}

/// Endpoint has been set (fixed URL or resolver)
pub struct HasUrl;
impl UrlState for HasUrl {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<T, U> {
    _token: PhantomData<T>,
    _url: PhantomData<U>,
}

impl<T, U> TypeState<T, U> {
    pub(crate) fn new() -> Self {
        Self {
            _token: PhantomData,
            _url: PhantomData,
        }
    }
}

impl<T, U> Default for TypeState<T, U> {
    fn default() -> Self {
        Self::new()
    }
}
