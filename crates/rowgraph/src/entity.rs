//! Entity declarations and shared entity handles.

use crate::descriptor::DescriptorBuilder;
use std::cell::{BorrowError, BorrowMutError, Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// An application type mapped to query result columns.
///
/// `describe` is called once per type; the resulting
/// [`EntityDescriptor`](crate::descriptor::EntityDescriptor) is cached for the rest of
/// the process. Usually generated with `#[derive(Entity)]`.
///
/// ```ignore
/// #[derive(Default)]
/// struct Author {
///     id: i64,
///     name: String,
///     books: Vec<EntityRef<Book>>,
/// }
///
/// impl Entity for Author {
///     fn describe(d: &mut DescriptorBuilder<Self>) {
///         d.scalar("id", |a| &a.id, |a| &mut a.id).key();
///         d.scalar("name", |a| &a.name, |a| &mut a.name);
///         d.many("books", |a| &mut a.books);
///     }
/// }
/// ```
pub trait Entity: Default + 'static {
    fn describe(d: &mut DescriptorBuilder<Self>);
}

/// Shared handle to a mapped entity.
///
/// Every row of one mapping pass that carries the same key yields the same handle.
/// Equality and hashing are by identity, not by value.
pub struct EntityRef<T>(Rc<RefCell<T>>);

impl<T> EntityRef<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Immutably borrow the entity.
    ///
    /// # Panics
    /// Panics if the entity is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    /// Mutably borrow the entity.
    ///
    /// # Panics
    /// Panics if the entity is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    pub fn try_borrow(&self) -> Result<Ref<'_, T>, BorrowError> {
        self.0.try_borrow()
    }

    pub fn try_borrow_mut(&self) -> Result<RefMut<'_, T>, BorrowMutError> {
        self.0.try_borrow_mut()
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Unwrap the entity if this is the only handle left.
    pub fn try_unwrap(self) -> Result<T, Self> {
        Rc::try_unwrap(self.0)
            .map(RefCell::into_inner)
            .map_err(Self)
    }
}

impl<T> Clone for EntityRef<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> PartialEq for EntityRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for EntityRef<T> {}

impl<T> Hash for EntityRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for EntityRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(inner) => f.debug_tuple("EntityRef").field(&*inner).finish(),
            Err(_) => f.write_str("EntityRef(<borrowed>)"),
        }
    }
}
