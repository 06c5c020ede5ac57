//! Construction of entities whose deferred fields are bound to a session.

use crate::descriptor::{EntityDescriptor, describe};
use crate::entity::Entity;
use crate::error::OrmResult;
use crate::session::{Session, SessionHandle};

/// Builds session-bound entity instances.
///
/// The mapper uses this for every entity type that declares deferred fields; call it
/// directly to get a bound instance outside of a query (e.g. an entity assembled by
/// hand whose relations should still load on demand).
pub struct ProxyFactory;

impl ProxyFactory {
    /// A default instance of `T` with every deferred field bound to `session`.
    pub fn create<T: Entity>(session: &Session) -> OrmResult<T> {
        let desc = describe::<T>()?;
        session.ensure_open()?;
        Ok(Self::create_bound(&desc, &session.handle()))
    }

    /// Bind the deferred fields of an existing instance to `session`.
    ///
    /// Fields already loaded keep their value.
    pub fn attach<T: Entity>(entity: &mut T, session: &Session) -> OrmResult<()> {
        let desc = describe::<T>()?;
        session.ensure_open()?;
        Self::bind_all(&desc, entity, &session.handle());
        Ok(())
    }

    pub(crate) fn create_bound<T: Entity>(desc: &EntityDescriptor<T>, session: &SessionHandle) -> T {
        let mut entity = T::default();
        Self::bind_all(desc, &mut entity, session);
        entity
    }

    fn bind_all<T: Entity>(desc: &EntityDescriptor<T>, entity: &mut T, session: &SessionHandle) {
        for slot in desc.deferred() {
            slot.bind_to(entity, desc.name(), session.clone());
        }
    }
}
