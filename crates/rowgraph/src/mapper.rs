//! Row mapping engine: turns a cursor into a graph of entities.
//!
//! One [`MappingPass`] covers one query execution. Within a pass every row carrying
//! the same non-NULL key for a keyed type resolves to the same [`EntityRef`], so joined
//! rows fold into one parent whose multi relations collect the distinct children.
//!
//! On an identity hit only relations are merged; scalar fields keep the values of the
//! first row that produced the instance ("first row wins"). Queries whose rows carry
//! conflicting scalars for one key therefore see the first row's values.
//!
//! Types without a key, or rows where the key column is absent or NULL, always produce
//! a fresh instance, so their relations cannot accumulate across rows.

use crate::client::Cursor;
use crate::descriptor::{EntityDescriptor, describe};
use crate::entity::{Entity, EntityRef};
use crate::error::{OrmError, OrmResult};
use crate::proxy::ProxyFactory;
use crate::row::{Row, Rows};
use crate::session::SessionHandle;
use crate::value::KeyValue;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;


/// Identity cache of one mapping pass.
#[derive(Default)]
struct IdentityCache {
    entries: HashMap<(TypeId, KeyValue), Box<dyn Any>>,
}

impl IdentityCache {
    fn get<T: 'static>(&self, key: &KeyValue) -> Option<EntityRef<T>> {
        // Tuple lookup needs an owned key.
        self.entries
            .get(&(TypeId::of::<T>(), key.clone()))
            .and_then(|e| e.downcast_ref::<EntityRef<T>>())
            .cloned()
    }

    fn insert<T: 'static>(&mut self, key: KeyValue, entity: EntityRef<T>) {
        self.entries
            .insert((TypeId::of::<T>(), key), Box::new(entity));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Result of mapping one row against one type.
pub(crate) struct Mapped<T> {
    pub(crate) entity: EntityRef<T>,
    /// First time this instance appears in the pass.
    pub(crate) fresh: bool,
}

/// State of one mapping pass.
pub struct MappingPass {
    session: Option<SessionHandle>,
    identities: IdentityCache,
    visited: Vec<TypeId>,
}

impl MappingPass {
    pub(crate) fn new(session: Option<SessionHandle>) -> Self {
        Self {
            session,
            identities: IdentityCache::default(),
            visited: Vec::new(),
        }
    }

    /// Number of keyed instances seen so far.
    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    /// Map `row` against `T`. `None` when the row populated nothing of `T`.
    pub(crate) fn map_row<T: Entity>(&mut self, row: &Row) -> OrmResult<Option<Mapped<T>>> {
        let desc = describe::<T>()?;
        let key = desc.key_of(row);

        if let Some(key) = &key {
            if let Some(existing) = self.identities.get::<T>(key) {
                tracing::trace!(entity = desc.name(), key = ?key.0, "identity hit");
                {
                    let mut inner = existing.try_borrow_mut().map_err(|_| {
                        OrmError::mapping(
                            desc.name(),
                            desc.key_field().unwrap_or_default(),
                            OrmError::Other("entity is borrowed during mapping".into()),
                        )
                    })?;
                    self.merge_relations(&desc, &mut inner, row)?;
                }
                return Ok(Some(Mapped {
                    entity: existing,
                    fresh: false,
                }));
            }
        }

        let mut instance = self.construct(&desc);
        let mut populated = desc.assign_scalars(&mut instance, row)?;
        populated |= self.merge_relations(&desc, &mut instance, row)?;
        if !populated {
            return Ok(None);
        }

        let entity = EntityRef::new(instance);
        if let Some(key) = key {
            self.identities.insert(key, entity.clone());
        }
        Ok(Some(Mapped {
            entity,
            fresh: true,
        }))
    }

    fn construct<T: Entity>(&self, desc: &EntityDescriptor<T>) -> T {
        match &self.session {
            Some(session) if desc.has_deferred() => ProxyFactory::create_bound(desc, session),
            _ => T::default(),
        }
    }

    fn merge_relations<T: Entity>(
        &mut self,
        desc: &EntityDescriptor<T>,
        owner: &mut T,
        row: &Row,
    ) -> OrmResult<bool> {
        if desc.relations().is_empty() {
            return Ok(false);
        }
        self.visited.push(TypeId::of::<T>());
        let result = self.merge_unvisited(desc, owner, row);
        self.visited.pop();
        result
    }

    fn merge_unvisited<T: Entity>(
        &mut self,
        desc: &EntityDescriptor<T>,
        owner: &mut T,
        row: &Row,
    ) -> OrmResult<bool> {
        let mut populated = false;
        for rel in desc.relations() {
            if self.visited.contains(&rel.target) {
                continue;
            }
            populated |= (rel.merge)(owner, self, row)
                .map_err(|e| OrmError::mapping(desc.name(), rel.field, e))?;
        }
        Ok(populated)
    }
}

/// Entities of one query execution, in cursor order of first appearance.
///
/// Multi relations of an already yielded entity keep growing while later rows are
/// read; they are complete once the stream is exhausted.
pub struct EntityStream<T> {
    rows: Rows,
    pass: MappingPass,
    done: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityStream<T> {
    pub(crate) fn new(cursor: Box<dyn Cursor>, session: Option<SessionHandle>) -> OrmResult<Self> {
        // Configuration errors surface before the first row.
        describe::<T>()?;
        Ok(Self {
            rows: Rows::new(cursor),
            pass: MappingPass::new(session),
            done: false,
            _entity: PhantomData,
        })
    }

    /// The pass state (identity cache) behind this stream.
    pub fn pass(&self) -> &MappingPass {
        &self.pass
    }
}

impl<T: Entity> Iterator for EntityStream<T> {
    type Item = OrmResult<EntityRef<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let row = match self.rows.next()? {
                Ok(row) => row,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            match self.pass.map_row::<T>(&row) {
                Ok(Some(mapped)) if mapped.fresh => return Some(Ok(mapped.entity)),
                Ok(_) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Map every row of `cursor` into `T` without a session.
///
/// Deferred fields of the produced entities stay unbound.
pub fn map<T: Entity>(cursor: Box<dyn Cursor>) -> OrmResult<EntityStream<T>> {
    EntityStream::new(cursor, None)
}

/// Map and collect every entity of `cursor`.
pub fn map_all<T: Entity>(cursor: Box<dyn Cursor>) -> OrmResult<Vec<EntityRef<T>>> {
    map::<T>(cursor)?.collect()
}
