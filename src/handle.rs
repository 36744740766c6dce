//! Reference-counted handles with capability queries.
//!
//! Every engine object lives behind a [`Handle`]. Cloning a handle adds an
//! owner; the object is dropped together with its last handle. A handle can
//! be asked for another view of the same object with [`Handle::query`],
//! which succeeds only for the capabilities the object declared through
//! [`implements!`](crate::implements).
//!
//! ```
//! use appx_unpack::{implements, Handle};
//!
//! trait Greet: Send {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//!
//! impl Greet for English {
//!     fn greet(&self) -> String {
//!         "hello".to_string()
//!     }
//! }
//!
//! implements!(English => dyn Greet);
//!
//! let object = Handle::new(English);
//! let greeter = object.query::<dyn Greet>().unwrap();
//! assert_eq!(greeter.lock().greet(), "hello");
//! assert_eq!(object.ref_count(), 2);
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

type Caster = dyn Fn(TypeId) -> Option<Box<dyn Any>> + Send + Sync;

/// An object that can be owned by a [`Handle`].
///
/// Implemented by [`implements!`](crate::implements); the implementation
/// lists every capability view the object supports.
pub trait Object: Send + Sized + 'static {
    /// Produce a co-owning view of `this` for the capability identified by
    /// `id`, boxed as `Arc<Mutex<Capability>>`.
    fn cast(this: &Arc<Mutex<Self>>, id: TypeId) -> Option<Box<dyn Any>>;
}

/// Declares which capability views a type supports.
///
/// `implements!(FileStream => dyn Stream, dyn FilePath)` lets a
/// `Handle<FileStream>` (or any view of it) be queried for
/// `Handle<dyn Stream>` and `Handle<dyn FilePath>`. The concrete type
/// itself is always queryable.
#[macro_export]
macro_rules! implements {
    ($object:ty => $($capability:ty),* $(,)?) => {
        impl $crate::handle::Object for $object {
            fn cast(
                this: &::std::sync::Arc<::std::sync::Mutex<Self>>,
                id: ::std::any::TypeId,
            ) -> ::std::option::Option<::std::boxed::Box<dyn ::std::any::Any>> {
                if id == ::std::any::TypeId::of::<Self>() {
                    return ::std::option::Option::Some(::std::boxed::Box::new(
                        ::std::sync::Arc::clone(this),
                    ));
                }
                $(
                    if id == ::std::any::TypeId::of::<$capability>() {
                        let view: ::std::sync::Arc<::std::sync::Mutex<$capability>> =
                            ::std::sync::Arc::<::std::sync::Mutex<Self>>::clone(this);
                        return ::std::option::Option::Some(::std::boxed::Box::new(view));
                    }
                )*
                ::std::option::Option::None
            }
        }
    };
}

/// Owning, reference-counted handle to an object seen through capability `T`.
pub struct Handle<T: ?Sized> {
    view: Arc<Mutex<T>>,
    // Shared by every handle to the same object, whatever its view.
    caster: Arc<Caster>,
}

impl<C: Object> Handle<C> {
    /// Wrap `object` in a new handle with a reference count of one.
    pub fn new(object: C) -> Self {
        let view = Arc::new(Mutex::new(object));
        let root = Arc::clone(&view);
        let caster: Arc<Caster> = Arc::new(move |id| C::cast(&root, id));
        Self { view, caster }
    }
}

impl<T: ?Sized> Handle<T> {
    /// Exclusive access to the object for the duration of the guard.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live handles to the underlying object, across all views.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.caster)
    }

    /// Whether `self` and `other` refer to the same underlying object.
    pub fn same_object<U: ?Sized>(&self, other: &Handle<U>) -> bool {
        Arc::ptr_eq(&self.caster, &other.caster)
    }

    /// Ask for another capability view of the same object.
    ///
    /// On success the returned handle co-owns the object. On failure the
    /// original handle is unaffected.
    pub fn query<U: ?Sized + 'static>(&self) -> Result<Handle<U>> {
        let view = (self.caster)(TypeId::of::<U>())
            .and_then(|any| any.downcast::<Arc<Mutex<U>>>().ok())
            .ok_or(Error::NoSuchCapability(type_name::<U>()))?;
        Ok(Handle {
            view: *view,
            caster: Arc::clone(&self.caster),
        })
    }

    /// Whether the object supports capability `U`.
    pub fn supports<U: ?Sized + 'static>(&self) -> bool {
        self.query::<U>().is_ok()
    }

    /// Convert into a wider view that the compiler can coerce to statically,
    /// e.g. `handle.upcast(|s| s as Arc<Mutex<dyn Stream>>)`.
    pub fn upcast<U: ?Sized>(self, coerce: impl FnOnce(Arc<Mutex<T>>) -> Arc<Mutex<U>>) -> Handle<U> {
        Handle {
            view: coerce(self.view),
            caster: self.caster,
        }
    }

    /// Detach ownership into a raw pointer. The caller becomes responsible
    /// for handing it back to [`Handle::from_raw`] exactly once.
    pub fn into_raw(self) -> *mut Handle<T> {
        Box::into_raw(Box::new(self))
    }

    /// Re-attach a handle previously detached with [`Handle::into_raw`].
    ///
    /// # Safety
    ///
    /// `raw` must come from `Handle::<T>::into_raw` and must not have been
    /// re-attached already.
    pub unsafe fn from_raw(raw: *mut Handle<T>) -> Handle<T> {
        unsafe { *Box::from_raw(raw) }
    }
}

impl<T: ?Sized> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            view: Arc::clone(&self.view),
            caster: Arc::clone(&self.caster),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("capability", &type_name::<T>())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
