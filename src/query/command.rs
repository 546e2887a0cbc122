use std::marker::PhantomData;

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::entity::{Document, Entity};
use crate::errors::{AcidError, Result};
use crate::metamodel::Property;
use crate::query::aggregation::Aggregation;
use crate::query::filter::Filter;
use crate::query::order::{Sort, sort_documents};
use crate::session::Session;
use crate::storage::Datastore;

/// A query or bulk write built against a [`Session`].
pub trait Command {
    type Output;

    fn execute(self) -> Result<Self::Output>;
}

type Setter = Box<dyn Fn(&mut Value) -> Result<()>>;

fn matches_all(filters: &[Box<dyn Filter>], body: &Value) -> bool {
    filters.iter().all(|filter| filter.matches(body))
}

fn select(documents: Vec<Document>, filters: &[Box<dyn Filter>]) -> Vec<Document> {
    documents
        .into_iter()
        .filter(|document| matches_all(filters, document.body()))
        .collect()
}

/// Lists committed entities of kind `E`.
pub struct GetList<'s, D: Datastore + 'static, E: Entity> {
    session: &'s Session<D>,
    filters: Vec<Box<dyn Filter>>,
    orders: Vec<Box<dyn Sort>>,
    offset: usize,
    limit: Option<usize>,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, D: Datastore + 'static, E: Entity> GetList<'s, D, E> {
    pub(crate) fn new(session: &'s Session<D>) -> Self {
        Self {
            session,
            filters: Vec::new(),
            orders: Vec::new(),
            offset: 0,
            limit: None,
            _entity: PhantomData,
        }
    }

    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn sort(mut self, order: impl Sort + 'static) -> Self {
        self.orders.push(Box::new(order));
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl<D: Datastore + 'static, E: Entity> Command for GetList<'_, D, E> {
    type Output = Vec<E>;

    fn execute(self) -> Result<Vec<E>> {
        let mut documents = select(self.session.scan(E::KIND)?, &self.filters);
        sort_documents(&mut documents, &self.orders, Document::body);
        documents
            .iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .map(Document::decode::<E>)
            .collect()
    }
}

/// Aggregates one property over committed entities of a kind.
pub struct GetScalar<'s, D: Datastore + 'static, A: Aggregation> {
    session: &'s Session<D>,
    kind: &'static str,
    aggregation: A,
    filters: Vec<Box<dyn Filter>>,
    orders: Vec<Box<dyn Sort>>,
}

impl<'s, D: Datastore + 'static, A: Aggregation> GetScalar<'s, D, A> {
    pub(crate) fn new(session: &'s Session<D>, kind: &'static str, aggregation: A) -> Self {
        Self {
            session,
            kind,
            aggregation,
            filters: Vec::new(),
            orders: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn sort(mut self, order: impl Sort + 'static) -> Self {
        self.orders.push(Box::new(order));
        self
    }
}

impl<D: Datastore + 'static, A: Aggregation> Command for GetScalar<'_, D, A> {
    type Output = Option<A::Value>;

    fn execute(self) -> Result<Option<A::Value>> {
        let mut documents = select(self.session.scan(self.kind)?, &self.filters);
        sort_documents(&mut documents, &self.orders, Document::body);
        let property = self.aggregation.property();
        let values = documents
            .iter()
            .filter_map(|document| property.get(document.body()).transpose())
            .collect::<Result<Vec<_>>>()?;
        Ok(self.aggregation.aggregate(values))
    }
}

/// Modifies every entity of kind `E` matching the filters, inside the open
/// transaction. Each match is read and written through the coordinator, so
/// it is locked and committed like any other update. Entities created earlier
/// in the same transaction are not visited.
pub struct Update<'s, D: Datastore + 'static, E: Entity> {
    session: &'s Session<D>,
    filters: Vec<Box<dyn Filter>>,
    setters: Vec<Setter>,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, D: Datastore + 'static, E: Entity> Update<'s, D, E> {
    pub(crate) fn new(session: &'s Session<D>) -> Self {
        Self {
            session,
            filters: Vec::new(),
            setters: Vec::new(),
            _entity: PhantomData,
        }
    }

    pub fn set<T: Serialize + 'static>(mut self, property: &Property<T>, value: T) -> Self {
        let property = property.clone();
        self.setters
            .push(Box::new(move |body: &mut Value| property.set(body, &value)));
        self
    }

    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl<D: Datastore + 'static, E: Entity> Command for Update<'_, D, E> {
    /// Number of entities updated.
    type Output = usize;

    fn execute(self) -> Result<usize> {
        let shared = self.session.active_coordinator().ok_or(AcidError::NotInTransaction)?;
        let metamodels = self.session.metamodels();
        metamodels.get(E::KIND)?;
        let candidates = select(self.session.datastore().scan(E::KIND)?, &self.filters);

        let mut coordinator = shared.lock();
        let mut updated = 0;
        for candidate in candidates {
            // Re-read under the transaction; the committed copy may be stale.
            let Some(mut document) = coordinator.get(candidate.key())? else {
                continue;
            };
            if !matches_all(&self.filters, document.body()) {
                continue;
            }
            for setter in &self.setters {
                setter(document.body_mut())?;
            }
            if &metamodels.resolve_identity(E::KIND, document.body())? != document.key() {
                return Err(AcidError::InvalidArgument(format!(
                    "identity of [{}] cannot be changed by an update",
                    document.key()
                )));
            }
            coordinator.update(document)?;
            updated += 1;
        }
        debug!(
            "Transaction [{}] updated {} entities of kind [{}]",
            coordinator.id(),
            updated,
            E::KIND
        );
        Ok(updated)
    }
}

/// Deletes every entity of kind `E` matching the filters, inside the open
/// transaction.
pub struct Delete<'s, D: Datastore + 'static, E: Entity> {
    session: &'s Session<D>,
    filters: Vec<Box<dyn Filter>>,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, D: Datastore + 'static, E: Entity> Delete<'s, D, E> {
    pub(crate) fn new(session: &'s Session<D>) -> Self {
        Self {
            session,
            filters: Vec::new(),
            _entity: PhantomData,
        }
    }

    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl<D: Datastore + 'static, E: Entity> Command for Delete<'_, D, E> {
    /// Number of entities deleted.
    type Output = usize;

    fn execute(self) -> Result<usize> {
        let shared = self.session.active_coordinator().ok_or(AcidError::NotInTransaction)?;
        self.session.metamodels().get(E::KIND)?;
        let candidates = select(self.session.datastore().scan(E::KIND)?, &self.filters);

        let mut coordinator = shared.lock();
        let mut deleted = 0;
        for candidate in candidates {
            let Some(document) = coordinator.get(candidate.key())? else {
                continue;
            };
            if !matches_all(&self.filters, document.body()) {
                continue;
            }
            coordinator.delete(document)?;
            deleted += 1;
        }
        debug!(
            "Transaction [{}] deleted {} entities of kind [{}]",
            coordinator.id(),
            deleted,
            E::KIND
        );
        Ok(deleted)
    }
}
