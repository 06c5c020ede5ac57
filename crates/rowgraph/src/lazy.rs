//! Deferred relation fields.
//!
//! A [`Lazy<V>`] field starts unloaded. Entities built inside a session (by the mapper
//! or [`ProxyFactory`](crate::ProxyFactory)) have their lazy fields bound to that
//! session; the first [`Lazy::get`] runs the field's load query with parameters taken
//! from the owning entity, caches the result, and every later call returns the cache.
//!
//! Lazy cells are not thread-safe and are only usable while their session is open.

use crate::descriptor::{FieldKind, describe, short_type_name};
use crate::entity::{Entity, EntityRef};
use crate::error::{OrmError, OrmResult};
use crate::convert::FromValue;
use crate::query::Query;
use crate::session::SessionHandle;
use crate::sql::ParsedSql;
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Session binding of one lazy field.
#[derive(Clone)]
pub struct LazyBinding {
    pub(crate) session: SessionHandle,
    pub(crate) entity: &'static str,
    pub(crate) field: &'static str,
    pub(crate) sql: Arc<ParsedSql>,
    pub(crate) map_key: Option<&'static str>,
}

impl LazyBinding {
    /// Owning entity type.
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    /// The load query as declared.
    pub fn sql(&self) -> &str {
        self.sql.source()
    }

    /// Explicit key field for keyed-map results.
    pub fn map_key(&self) -> Option<&'static str> {
        self.map_key
    }
}

impl fmt::Debug for LazyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyBinding")
            .field("entity", &self.entity)
            .field("field", &self.field)
            .field("sql", &self.sql.source())
            .field("map_key", &self.map_key)
            .finish()
    }
}

/// Shapes a deferred query result into a field value.
pub trait Deferred: Sized + 'static {
    /// Relation kind reported by the descriptor.
    const KIND: FieldKind;

    /// Related entity type name.
    fn target_name() -> &'static str;

    /// Run `query` and shape its entities.
    fn load(query: Query, binding: &LazyBinding) -> OrmResult<Self>;
}

impl<C: Entity> Deferred for Option<EntityRef<C>> {
    const KIND: FieldKind = FieldKind::SingleRelation;

    fn target_name() -> &'static str {
        short_type_name::<C>()
    }

    fn load(query: Query, _binding: &LazyBinding) -> OrmResult<Self> {
        query.unique_result_as::<C>()
    }
}

impl<C: Entity> Deferred for Vec<EntityRef<C>> {
    const KIND: FieldKind = FieldKind::MultiRelation;

    fn target_name() -> &'static str {
        short_type_name::<C>()
    }

    fn load(query: Query, _binding: &LazyBinding) -> OrmResult<Self> {
        query.fetch_as::<C>()
    }
}

impl<C: Entity> Deferred for VecDeque<EntityRef<C>> {
    const KIND: FieldKind = FieldKind::MultiRelation;

    fn target_name() -> &'static str {
        short_type_name::<C>()
    }

    fn load(query: Query, _binding: &LazyBinding) -> OrmResult<Self> {
        query.stream_as::<C>()?.collect()
    }
}

impl<C: Entity> Deferred for HashSet<EntityRef<C>> {
    const KIND: FieldKind = FieldKind::MultiRelation;

    fn target_name() -> &'static str {
        short_type_name::<C>()
    }

    fn load(query: Query, _binding: &LazyBinding) -> OrmResult<Self> {
        query.stream_as::<C>()?.collect()
    }
}

/// Field of `C` that keys a keyed-map result.
fn map_key_field<C: Entity>(binding: &LazyBinding) -> OrmResult<&'static str> {
    let desc = describe::<C>()?;
    let key = binding.map_key.or_else(|| desc.key_field()).ok_or_else(|| {
        OrmError::configuration(
            binding.entity,
            binding.field,
            format!(
                "a keyed map needs `map_key` or a key field on {}",
                desc.name()
            ),
        )
    })?;
    let is_scalar = desc
        .fields()
        .iter()
        .any(|f| f.name == key && f.kind == FieldKind::Scalar);
    if !is_scalar {
        return Err(OrmError::configuration(
            binding.entity,
            binding.field,
            format!("map key `{key}` is not a scalar field of {}", desc.name()),
        ));
    }
    Ok(key)
}

fn load_keyed<C, K>(query: Query, binding: &LazyBinding) -> OrmResult<Vec<(K, EntityRef<C>)>>
where
    C: Entity,
    K: FromValue,
{
    let key = map_key_field::<C>(binding)?;
    let desc = describe::<C>()?;
    query
        .stream_as::<C>()?
        .map(|entity| {
            let entity = entity?;
            let value = desc
                .read(&entity.borrow(), key)
                .unwrap_or_default();
            let k = K::from_value(value)
                .map_err(|e| OrmError::mapping(binding.entity, binding.field, e))?;
            Ok((k, entity))
        })
        .collect()
}

impl<C, K> Deferred for HashMap<K, EntityRef<C>>
where
    C: Entity,
    K: FromValue + Eq + Hash + 'static,
{
    const KIND: FieldKind = FieldKind::MultiRelation;

    fn target_name() -> &'static str {
        short_type_name::<C>()
    }

    fn load(query: Query, binding: &LazyBinding) -> OrmResult<Self> {
        Ok(load_keyed(query, binding)?.into_iter().collect())
    }
}

impl<C, K> Deferred for BTreeMap<K, EntityRef<C>>
where
    C: Entity,
    K: FromValue + Ord + 'static,
{
    const KIND: FieldKind = FieldKind::MultiRelation;

    fn target_name() -> &'static str {
        short_type_name::<C>()
    }

    fn load(query: Query, binding: &LazyBinding) -> OrmResult<Self> {
        Ok(load_keyed(query, binding)?.into_iter().collect())
    }
}

/// A relation loaded on first access.
pub struct Lazy<V> {
    value: OnceCell<V>,
    binding: Option<LazyBinding>,
}

impl<V> Lazy<V> {
    /// An unloaded, unbound cell.
    pub fn new() -> Self {
        Self {
            value: OnceCell::new(),
            binding: None,
        }
    }

    /// A cell holding `value`; `get` never queries.
    pub fn loaded(value: V) -> Self {
        Self {
            value: OnceCell::from(value),
            binding: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.value.get().is_some()
    }

    /// The value if already loaded, without querying.
    pub fn peek(&self) -> Option<&V> {
        self.value.get()
    }

    /// Whether the cell is bound to a session.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn binding(&self) -> Option<&LazyBinding> {
        self.binding.as_ref()
    }

    /// Take the loaded value out, leaving the cell unloaded.
    pub fn take(&mut self) -> Option<V> {
        self.value.take()
    }

    pub(crate) fn bind(&mut self, binding: LazyBinding) {
        self.binding = Some(binding);
    }
}

impl<V: Deferred> Lazy<V> {
    /// The field value, loading it with the bound session on first access.
    ///
    /// `owner` is the entity holding this cell; its scalar fields supply the load
    /// query's named parameters.
    pub fn get<T: Entity>(&self, owner: &T) -> OrmResult<&V> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }
        let Some(binding) = &self.binding else {
            let desc = describe::<T>()?;
            let field = desc
                .deferred_at(owner, self as *const Self as *const ())
                .map(|slot| slot.field)
                .unwrap_or("?");
            return Err(OrmError::Unbound {
                entity: desc.name(),
                field: field.to_string(),
            });
        };

        let session = binding.session.upgrade()?;
        tracing::debug!(
            session = session.id(),
            entity = binding.entity,
            field = binding.field,
            "loading lazy field"
        );
        let query = session.query_parsed(Arc::clone(&binding.sql))?.bind(owner)?;
        let value = V::load(query, binding)?;
        Ok(self.value.get_or_init(|| value))
    }
}

impl<V> Default for Lazy<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: fmt::Debug> fmt::Debug for Lazy<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.get() {
            Some(value) => f.debug_tuple("Lazy").field(value).finish(),
            None if self.binding.is_some() => f.write_str("Lazy(<unloaded>)"),
            None => f.write_str("Lazy(<unbound>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorBuilder;

    #[derive(Default, Debug)]
    struct Note {
        id: i64,
    }

    impl Entity for Note {
        fn describe(d: &mut DescriptorBuilder<Self>) {
            d.scalar("id", |n| &n.id, |n| &mut n.id).key();
        }
    }

    #[derive(Default)]
    struct Folder {
        id: i64,
        notes: Lazy<Vec<EntityRef<Note>>>,
    }

    impl Entity for Folder {
        fn describe(d: &mut DescriptorBuilder<Self>) {
            d.scalar("id", |f| &f.id, |f| &mut f.id).key();
            d.deferred(
                "notes",
                "SELECT id FROM notes WHERE folder_id = :id",
                |f| &f.notes,
                |f| &mut f.notes,
            );
        }
    }

    #[test]
    fn unbound_access_names_the_field() {
        let folder = Folder::default();
        let err = folder.notes.get(&folder).unwrap_err();
        match err {
            OrmError::Unbound { entity, field } => {
                assert_eq!(entity, "Folder");
                assert_eq!(field, "notes");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn preloaded_cell_never_queries() {
        let folder = Folder {
            id: 1,
            notes: Lazy::loaded(vec![EntityRef::new(Note { id: 9 })]),
        };
        assert!(folder.notes.is_loaded());
        let notes = folder.notes.get(&folder).unwrap();
        assert_eq!(notes[0].borrow().id, 9);
    }

    #[test]
    fn debug_shows_state() {
        let cell: Lazy<Vec<EntityRef<Note>>> = Lazy::new();
        assert_eq!(format!("{cell:?}"), "Lazy(<unbound>)");
        assert!(cell.peek().is_none());
        assert!(!cell.is_bound());
    }

    #[test]
    fn descriptor_reports_deferred_kind() {
        let desc = describe::<Folder>().unwrap();
        let notes = &desc.fields()[1];
        assert!(notes.deferred);
        assert_eq!(notes.kind, FieldKind::MultiRelation);
        assert_eq!(notes.target, Some("Note"));
    }
}
