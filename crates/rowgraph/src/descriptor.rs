//! Per-type entity metadata, built once and cached process-wide.

use crate::convert::{FromValue, ToValue};
use crate::entity::{Entity, EntityRef};
use crate::error::{OrmError, OrmResult};
use crate::lazy::{Deferred, Lazy, LazyBinding};
use crate::mapper::MappingPass;
use crate::row::Row;
use crate::session::SessionHandle;
use crate::sql::ParsedSql;
use crate::value::{KeyValue, Value};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// How a field is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    SingleRelation,
    MultiRelation,
}

/// Public view of one declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: &'static str,
    /// Result column for scalars; `None` for relations.
    pub column: Option<String>,
    pub kind: FieldKind,
    pub key: bool,
    /// Loaded on first access by a follow-up query.
    pub deferred: bool,
    /// Related entity type name for relations.
    pub target: Option<&'static str>,
}

/// Collections usable as multi-relation fields.
pub trait RelationCollection: 'static {
    type Item: Entity;

    /// Add `item` unless the same instance is already present. Returns whether it was added.
    fn insert_distinct(&mut self, item: EntityRef<Self::Item>) -> bool;
}

impl<C: Entity> RelationCollection for Vec<EntityRef<C>> {
    type Item = C;

    fn insert_distinct(&mut self, item: EntityRef<C>) -> bool {
        if self.iter().any(|e| e.ptr_eq(&item)) {
            return false;
        }
        self.push(item);
        true
    }
}

impl<C: Entity> RelationCollection for VecDeque<EntityRef<C>> {
    type Item = C;

    fn insert_distinct(&mut self, item: EntityRef<C>) -> bool {
        if self.iter().any(|e| e.ptr_eq(&item)) {
            return false;
        }
        self.push_back(item);
        true
    }
}

impl<C: Entity> RelationCollection for HashSet<EntityRef<C>> {
    type Item = C;

    fn insert_distinct(&mut self, item: EntityRef<C>) -> bool {
        self.insert(item)
    }
}

type ReadFn<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;
type WriteFn<T> = Box<dyn Fn(&mut T, Value) -> OrmResult<()> + Send + Sync>;
type MergeFn<T> = Box<dyn Fn(&mut T, &mut MappingPass, &Row) -> OrmResult<bool> + Send + Sync>;
type LocateFn<T> = Box<dyn Fn(&T) -> *const () + Send + Sync>;
type BindFn<T> = Box<dyn Fn(&mut T, LazyBinding) + Send + Sync>;

pub(crate) struct ScalarSlot<T> {
    pub(crate) field: &'static str,
    pub(crate) column: String,
    column_override: Option<String>,
    read: ReadFn<T>,
    write: WriteFn<T>,
}

pub(crate) struct RelationSlot<T> {
    pub(crate) field: &'static str,
    pub(crate) target: TypeId,
    target_name: &'static str,
    validate: fn() -> OrmResult<()>,
    pub(crate) merge: MergeFn<T>,
}

pub(crate) struct DeferredSlot<T> {
    pub(crate) field: &'static str,
    pub(crate) sql: Arc<ParsedSql>,
    pub(crate) map_key: Option<&'static str>,
    locate: LocateFn<T>,
    bind: BindFn<T>,
}

impl<T> DeferredSlot<T> {
    pub(crate) fn bind_to(&self, owner: &mut T, entity: &'static str, session: SessionHandle) {
        (self.bind)(
            owner,
            LazyBinding {
                session,
                entity,
                field: self.field,
                sql: Arc::clone(&self.sql),
                map_key: self.map_key,
            },
        );
    }
}

pub(crate) fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn validate_target<C: Entity>() -> OrmResult<()> {
    describe::<C>().map(|_| ())
}

/// Collects field declarations inside [`Entity::describe`].
pub struct DescriptorBuilder<T> {
    name: &'static str,
    column_prefix: Option<String>,
    fields: Vec<FieldInfo>,
    scalars: Vec<ScalarSlot<T>>,
    key: Option<usize>,
    relations: Vec<RelationSlot<T>>,
    deferred: Vec<DeferredSlot<T>>,
    error: Option<OrmError>,
}

/// Returned by [`DescriptorBuilder::scalar`] to refine the declaration.
pub struct FieldDecl<'a, T> {
    builder: &'a mut DescriptorBuilder<T>,
    scalar: usize,
}

impl<T: Entity> FieldDecl<'_, T> {
    /// Read this field from `column` instead of the field name.
    pub fn column(self, column: &str) -> Self {
        let slot = &mut self.builder.scalars[self.scalar];
        slot.column_override = Some(column.to_string());
        self
    }

    /// Use this field as the entity's identity.
    pub fn key(self) -> Self {
        let field = self.builder.scalars[self.scalar].field;
        match self.builder.key {
            Some(existing) if existing != self.scalar => {
                let other = self.builder.scalars[existing].field;
                self.builder.fail(
                    field,
                    format!("a key field is already declared (`{other}`)"),
                );
            }
            _ => {
                self.builder.key = Some(self.scalar);
                if let Some(info) = self.builder.fields.iter_mut().find(|f| f.name == field) {
                    info.key = true;
                }
            }
        }
        self
    }
}

/// Returned by [`DescriptorBuilder::deferred`].
pub struct DeferredDecl<'a, T> {
    builder: &'a mut DescriptorBuilder<T>,
    slot: usize,
}

impl<T: Entity> DeferredDecl<'_, T> {
    /// Key keyed-map results by this field of the related type.
    pub fn map_key(self, field: &'static str) -> Self {
        self.builder.deferred[self.slot].map_key = Some(field);
        self
    }
}

impl<T: Entity> DescriptorBuilder<T> {
    fn new() -> Self {
        Self {
            name: short_type_name::<T>(),
            column_prefix: None,
            fields: Vec::new(),
            scalars: Vec::new(),
            key: None,
            relations: Vec::new(),
            deferred: Vec::new(),
            error: None,
        }
    }

    fn fail(&mut self, field: &str, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(OrmError::configuration(self.name, field, message));
        }
    }

    fn declare(&mut self, info: FieldInfo) {
        if self.fields.iter().any(|f| f.name == info.name) {
            self.fail(info.name, "field declared twice");
            return;
        }
        self.fields.push(info);
    }

    /// Prefix prepended to every scalar column without an explicit override.
    pub fn column_prefix(&mut self, prefix: &str) -> &mut Self {
        self.column_prefix = Some(prefix.to_string());
        self
    }

    /// Declare a scalar field.
    pub fn scalar<F>(
        &mut self,
        name: &'static str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> FieldDecl<'_, T>
    where
        F: FromValue + ToValue + 'static,
    {
        self.declare(FieldInfo {
            name,
            column: None,
            kind: FieldKind::Scalar,
            key: false,
            deferred: false,
            target: None,
        });
        self.scalars.push(ScalarSlot {
            field: name,
            column: String::new(),
            column_override: None,
            read: Box::new(move |e| get(e).to_value()),
            write: Box::new(move |e, v| {
                *get_mut(e) = F::from_value(v)?;
                Ok(())
            }),
        });
        let scalar = self.scalars.len() - 1;
        FieldDecl {
            builder: self,
            scalar,
        }
    }

    /// Declare a single relation populated from the same row.
    pub fn one<C: Entity>(
        &mut self,
        name: &'static str,
        access: fn(&mut T) -> &mut Option<EntityRef<C>>,
    ) -> &mut Self {
        self.declare(FieldInfo {
            name,
            column: None,
            kind: FieldKind::SingleRelation,
            key: false,
            deferred: false,
            target: Some(short_type_name::<C>()),
        });
        self.relations.push(RelationSlot {
            field: name,
            target: TypeId::of::<C>(),
            target_name: short_type_name::<C>(),
            validate: validate_target::<C>,
            merge: Box::new(move |owner, pass, row| match pass.map_row::<C>(row)? {
                Some(mapped) => {
                    let slot = access(owner);
                    if slot.is_none() {
                        *slot = Some(mapped.entity);
                    }
                    Ok(true)
                }
                None => Ok(false),
            }),
        });
        self
    }

    /// Declare a multi relation accumulated across rows of the same owner.
    pub fn many<K: RelationCollection>(
        &mut self,
        name: &'static str,
        access: fn(&mut T) -> &mut K,
    ) -> &mut Self {
        self.declare(FieldInfo {
            name,
            column: None,
            kind: FieldKind::MultiRelation,
            key: false,
            deferred: false,
            target: Some(short_type_name::<K::Item>()),
        });
        self.relations.push(RelationSlot {
            field: name,
            target: TypeId::of::<K::Item>(),
            target_name: short_type_name::<K::Item>(),
            validate: validate_target::<K::Item>,
            merge: Box::new(move |owner, pass, row| match pass.map_row::<K::Item>(row)? {
                Some(mapped) => {
                    access(owner).insert_distinct(mapped.entity);
                    Ok(true)
                }
                None => Ok(false),
            }),
        });
        self
    }

    /// Declare a field loaded on first access by running `sql`.
    ///
    /// Named parameters in `sql` are bound from the owner's scalar fields of the same name.
    pub fn deferred<V: Deferred>(
        &mut self,
        name: &'static str,
        sql: &str,
        get: fn(&T) -> &Lazy<V>,
        get_mut: fn(&mut T) -> &mut Lazy<V>,
    ) -> DeferredDecl<'_, T> {
        self.declare(FieldInfo {
            name,
            column: None,
            kind: V::KIND,
            key: false,
            deferred: true,
            target: Some(V::target_name()),
        });
        let sql = match ParsedSql::parse(sql) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.fail(name, format!("invalid load query: {e}"));
                ParsedSql::empty()
            }
        };
        self.deferred.push(DeferredSlot {
            field: name,
            sql: Arc::new(sql),
            map_key: None,
            locate: Box::new(move |e| get(e) as *const Lazy<V> as *const ()),
            bind: Box::new(move |e, binding| get_mut(e).bind(binding)),
        });
        let slot = self.deferred.len() - 1;
        DeferredDecl {
            builder: self,
            slot,
        }
    }

    fn finish(mut self) -> OrmResult<EntityDescriptor<T>> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        for slot in &mut self.scalars {
            slot.column = match (&slot.column_override, &self.column_prefix) {
                (Some(column), _) => column.clone(),
                (None, Some(prefix)) => format!("{prefix}{}", slot.field),
                (None, None) => slot.field.to_string(),
            };
            if let Some(info) = self.fields.iter_mut().find(|f| f.name == slot.field) {
                info.column = Some(slot.column.clone());
            }
        }
        Ok(EntityDescriptor {
            name: self.name,
            fields: self.fields,
            scalars: self.scalars,
            key: self.key,
            relations: self.relations,
            deferred: self.deferred,
        })
    }
}

/// Column/field mapping of one entity type.
pub struct EntityDescriptor<T> {
    name: &'static str,
    fields: Vec<FieldInfo>,
    scalars: Vec<ScalarSlot<T>>,
    key: Option<usize>,
    relations: Vec<RelationSlot<T>>,
    deferred: Vec<DeferredSlot<T>>,
}

impl<T: Entity> EntityDescriptor<T> {
    fn build() -> OrmResult<Self> {
        let mut builder = DescriptorBuilder::new();
        T::describe(&mut builder);
        builder.finish()
    }

    fn validate_relations(&self) -> OrmResult<()> {
        for rel in &self.relations {
            (rel.validate)().map_err(|e| {
                OrmError::configuration(
                    self.name,
                    rel.field,
                    format!("relation target {} is not describable: {e}", rel.target_name),
                )
            })?;
        }
        Ok(())
    }
}

impl<T> EntityDescriptor<T> {
    /// Short type name used in errors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn key_field(&self) -> Option<&'static str> {
        self.key.map(|idx| self.scalars[idx].field)
    }

    pub fn key_column(&self) -> Option<&str> {
        self.key.map(|idx| self.scalars[idx].column.as_str())
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Current value of scalar `field` on `entity`.
    pub fn read(&self, entity: &T, field: &str) -> Option<Value> {
        self.scalars
            .iter()
            .find(|s| s.field == field)
            .map(|s| (s.read)(entity))
    }

    /// `(field, value)` for every scalar, in declaration order.
    pub fn values(&self, entity: &T) -> Vec<(&'static str, Value)> {
        self.scalars
            .iter()
            .map(|s| (s.field, (s.read)(entity)))
            .collect()
    }

    pub(crate) fn relations(&self) -> &[RelationSlot<T>] {
        &self.relations
    }

    pub(crate) fn deferred(&self) -> &[DeferredSlot<T>] {
        &self.deferred
    }

    /// Identity of the row for this type: the key column's value when present and not NULL.
    pub(crate) fn key_of(&self, row: &Row) -> Option<KeyValue> {
        let idx = self.key?;
        row.get_non_null(&self.scalars[idx].column)
            .map(|v| KeyValue(v.clone()))
    }

    /// Assign every scalar whose column is present and not NULL. Returns whether any was set.
    pub(crate) fn assign_scalars(&self, entity: &mut T, row: &Row) -> OrmResult<bool> {
        let mut populated = false;
        for slot in &self.scalars {
            if let Some(value) = row.get_non_null(&slot.column) {
                (slot.write)(entity, value.clone())
                    .map_err(|e| OrmError::mapping(self.name, slot.field, e))?;
                populated = true;
            }
        }
        Ok(populated)
    }

    /// The deferred slot whose `Lazy` cell lives at `cell` inside `owner`.
    pub(crate) fn deferred_at(&self, owner: &T, cell: *const ()) -> Option<&DeferredSlot<T>> {
        self.deferred
            .iter()
            .find(|slot| std::ptr::eq((slot.locate)(owner), cell))
    }
}

type DescriptorMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

fn registry() -> &'static RwLock<DescriptorMap> {
    static DESCRIPTORS: OnceLock<RwLock<DescriptorMap>> = OnceLock::new();
    DESCRIPTORS.get_or_init(|| RwLock::new(HashMap::new()))
}

fn downcast<T: Entity>(stored: Arc<dyn Any + Send + Sync>) -> OrmResult<Arc<EntityDescriptor<T>>> {
    stored.downcast::<EntityDescriptor<T>>().map_err(|_| {
        OrmError::Other(format!(
            "descriptor cache holds a foreign entry for {}",
            std::any::type_name::<T>()
        ))
    })
}

thread_local! {
    // Descriptors built on this thread whose relation targets are still being checked.
    static PENDING: RefCell<DescriptorMap> = RefCell::new(HashMap::new());
}

/// Drops a type from this thread's pending descriptors.
struct PendingEntry(TypeId);

impl Drop for PendingEntry {
    fn drop(&mut self) {
        PENDING.with(|pending| {
            pending.borrow_mut().remove(&self.0);
        });
    }
}

fn lookup(id: &TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
    let cached = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(id)
        .cloned();
    cached.or_else(|| PENDING.with(|pending| pending.borrow().get(id).cloned()))
}

/// The cached descriptor of `T`, building it on first use.
///
/// A descriptor is published to the shared cache only after its relation targets have
/// been resolved. While that runs it is visible to the building thread alone, so
/// mutually referencing types terminate on it. Concurrent first calls may each build a
/// descriptor; the first one published is kept and returned to every caller.
pub fn describe<T: Entity>() -> OrmResult<Arc<EntityDescriptor<T>>> {
    let id = TypeId::of::<T>();
    if let Some(stored) = lookup(&id) {
        return downcast(stored);
    }

    // Not holding the lock: `describe` of relation targets re-enters the registry.
    let built: Arc<dyn Any + Send + Sync> = Arc::new(EntityDescriptor::<T>::build()?);
    {
        let descriptor = downcast::<T>(Arc::clone(&built))?;
        PENDING.with(|pending| {
            pending.borrow_mut().insert(id, Arc::clone(&built));
        });
        let _pending = PendingEntry(id);
        descriptor.validate_relations()?;
    }

    let stored = {
        let mut map = registry().write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(id).or_insert(built))
    };
    downcast(stored)
}
