//! Common utilities for acidhouse integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use acidhouse::prelude::*;
use serde::{Deserialize, Serialize};

// --- Entities ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity1 {
    pub id: String,
    pub i: i64,
}

impl Entity1 {
    pub fn new(id: &str, i: i64) -> Self {
        Self {
            id: id.to_string(),
            i,
        }
    }
}

impl Entity for Entity1 {
    const KIND: &'static str = "Entity1";
    const KEY: &'static str = "id";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub city: String,
    pub zip: String,
}

/// Entity with an embedded entity and an integer identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<i64>,
}

impl Customer {
    pub fn new(id: i64, name: &str, city: &str, rank: Option<i64>) -> Self {
        Self {
            id,
            name: name.to_string(),
            address: Address {
                city: city.to_string(),
                zip: format!("{id:05}"),
            },
            rank,
        }
    }
}

impl Entity for Customer {
    const KIND: &'static str = "Customer";
    const KEY: &'static str = "id";
}

// --- Helper Functions ---

pub fn metamodels() -> Arc<Metamodels> {
    Arc::new(Metamodels::new().register::<Entity1>().register::<Customer>())
}

/// Creates a session over a fresh in-memory datastore.
pub fn setup_session(config: SessionConfig) -> (Arc<MemoryDatastore>, Session<MemoryDatastore>) {
    let datastore = Arc::new(MemoryDatastore::new());
    let session = Session::new(Arc::clone(&datastore), metamodels(), config);
    (datastore, session)
}

/// Commits `entities` in one transaction.
pub fn seed<D: Datastore + 'static, E: Entity>(session: &Session<D>, entities: &[E]) {
    let transaction = session.begin_transaction().unwrap();
    for entity in entities {
        session.put(entity).unwrap();
    }
    transaction.commit().unwrap();
}
