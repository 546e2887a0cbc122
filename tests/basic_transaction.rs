mod common;

use acidhouse::prelude::*;
use acidhouse::CoordinatorStatus;

use common::{Entity1, setup_session, seed};

#[test]
fn test_put_commit_and_read() {
    let (datastore, session) = setup_session(SessionConfig::default());

    let transaction = session.begin_transaction().unwrap();
    session.put(&Entity1::new("Key11", 11)).unwrap();
    session.put(&Entity1::new("Key12", 12)).unwrap();
    transaction.commit().unwrap();

    assert_eq!(transaction.status(), CoordinatorStatus::Committed);
    assert_eq!(datastore.len(), 2);
    assert_eq!(session.get::<Entity1>("Key11").unwrap(), Some(Entity1::new("Key11", 11)));
    assert_eq!(session.get::<Entity1>("Key12").unwrap(), Some(Entity1::new("Key12", 12)));
    assert!(session.locks().unwrap().is_empty(), "no lock may survive a commit");
}

#[test]
fn test_read_then_update_commit() {
    let (_datastore, session) = setup_session(SessionConfig::default());
    seed(&session, &[Entity1::new("K1", 1)]);

    let transaction = session.begin_transaction().unwrap();
    let mut entity = session.get::<Entity1>("K1").unwrap().unwrap();
    assert_eq!(entity.i, 1);
    entity.i = 2;
    session.update(&entity).unwrap();
    transaction.commit().unwrap();

    assert_eq!(session.get::<Entity1>("K1").unwrap().unwrap().i, 2);
    assert!(session.locks().unwrap().is_empty());
}

#[test]
fn test_reads_see_own_writes_until_rollback() {
    let (datastore, session) = setup_session(SessionConfig::default());

    let transaction = session.begin_transaction().unwrap();
    session.put(&Entity1::new("K1", 1)).unwrap();
    assert_eq!(session.get::<Entity1>("K1").unwrap(), Some(Entity1::new("K1", 1)));
    assert!(datastore.is_empty(), "nothing is written before commit");

    transaction.rollback().unwrap();
    assert_eq!(transaction.status(), CoordinatorStatus::RolledBack);
    assert_eq!(session.get::<Entity1>("K1").unwrap(), None);
}

#[test]
fn test_put_of_existing_entity_fails() {
    let (_datastore, session) = setup_session(SessionConfig::default());
    seed(&session, &[Entity1::new("K1", 1)]);

    let transaction = session.begin_transaction().unwrap();
    match session.put(&Entity1::new("K1", 5)) {
        Err(AcidError::EntityExists { key }) => assert_eq!(key, EntityKey::of::<Entity1>("K1")),
        other => panic!("expected EntityExists, got {:?}", other),
    }
    transaction.rollback().unwrap();
    assert_eq!(session.get::<Entity1>("K1").unwrap().unwrap().i, 1);
}

#[test]
fn test_put_twice_in_one_transaction_fails() {
    let (_datastore, session) = setup_session(SessionConfig::default());

    let _transaction = session.begin_transaction().unwrap();
    session.put(&Entity1::new("K1", 1)).unwrap();
    assert!(matches!(
        session.put(&Entity1::new("K1", 2)),
        Err(AcidError::EntityExists { .. })
    ));
}

#[test]
fn test_writes_outside_transaction_fail() {
    let (datastore, session) = setup_session(SessionConfig::default());

    match session.put(&Entity1::new("K1", 1)) {
        Err(AcidError::EntityExists { key }) => assert_eq!(key, EntityKey::of::<Entity1>("K1")),
        other => panic!("expected EntityExists, got {:?}", other),
    }
    assert!(matches!(session.update(&Entity1::new("K1", 1)), Err(AcidError::NotInTransaction)));
    assert!(matches!(session.delete(&Entity1::new("K1", 1)), Err(AcidError::NotInTransaction)));

    // A finished transaction does not count as open.
    let transaction = session.begin_transaction().unwrap();
    transaction.commit().unwrap();
    assert!(matches!(session.put(&Entity1::new("K1", 1)), Err(AcidError::EntityExists { .. })));
    assert!(datastore.is_empty());
}

#[test]
fn test_update_of_absent_entity_fails() {
    let (_datastore, session) = setup_session(SessionConfig::default());

    let _transaction = session.begin_transaction().unwrap();
    match session.update(&Entity1::new("missing", 1)) {
        Err(AcidError::EntityNotFound { key }) => assert_eq!(key.id(), "missing"),
        other => panic!("expected EntityNotFound, got {:?}", other),
    }
}

#[test]
fn test_delete_commit() {
    let (datastore, session) = setup_session(SessionConfig::default());
    seed(&session, &[Entity1::new("K1", 1), Entity1::new("K2", 2)]);

    let transaction = session.begin_transaction().unwrap();
    session.delete(&Entity1::new("K1", 1)).unwrap();
    assert_eq!(session.get::<Entity1>("K1").unwrap(), None);
    // Deleting something that never existed is harmless.
    session.delete(&Entity1::new("K9", 9)).unwrap();
    transaction.commit().unwrap();

    assert_eq!(datastore.len(), 1);
    assert_eq!(session.get::<Entity1>("K1").unwrap(), None);
    assert!(session.get::<Entity1>("K2").unwrap().is_some());
}

#[test]
fn test_put_after_delete_replaces() {
    let (_datastore, session) = setup_session(SessionConfig::default());
    seed(&session, &[Entity1::new("K1", 1)]);

    let transaction = session.begin_transaction().unwrap();
    session.delete(&Entity1::new("K1", 1)).unwrap();
    session.put(&Entity1::new("K1", 7)).unwrap();
    transaction.commit().unwrap();

    assert_eq!(session.get::<Entity1>("K1").unwrap().unwrap().i, 7);
}

#[test]
fn test_commit_and_rollback_are_idempotent() {
    let (_datastore, session) = setup_session(SessionConfig::default());

    let transaction = session.begin_transaction().unwrap();
    session.put(&Entity1::new("K1", 1)).unwrap();
    transaction.commit().unwrap();
    transaction.commit().unwrap();
    transaction.rollback().unwrap();
    assert_eq!(transaction.status(), CoordinatorStatus::Committed);
    assert!(session.get::<Entity1>("K1").unwrap().is_some());

    let transaction = session.begin_transaction().unwrap();
    session.put(&Entity1::new("K2", 2)).unwrap();
    transaction.rollback().unwrap();
    transaction.rollback().unwrap();
    transaction.commit().unwrap();
    assert_eq!(transaction.status(), CoordinatorStatus::RolledBack);
    assert_eq!(session.get::<Entity1>("K2").unwrap(), None);
}

#[test]
fn test_one_open_transaction_per_session() {
    let (_datastore, session) = setup_session(SessionConfig::default());

    let first = session.begin_transaction().unwrap();
    match session.begin_transaction() {
        Err(AcidError::TransactionActive { id }) => assert_eq!(&id, first.id()),
        Err(e) => panic!("expected TransactionActive, got {:?}", e),
        Ok(_) => panic!("a second transaction must not begin"),
    }
    first.commit().unwrap();

    let second = session.begin_transaction().unwrap();
    assert_ne!(first.id(), second.id());
    assert!(second.is_active());
}

#[test]
fn test_close_rolls_back_open_transaction() {
    let (datastore, session) = setup_session(SessionConfig::default());

    let transaction = session.begin_transaction().unwrap();
    session.put(&Entity1::new("K1", 1)).unwrap();
    session.close().unwrap();

    assert_eq!(transaction.status(), CoordinatorStatus::RolledBack);
    assert!(datastore.is_empty());
    assert!(datastore.locks().unwrap().is_empty());
}

#[test]
fn test_unregistered_entity_is_rejected() {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Stranger {
        id: String,
    }

    impl Entity for Stranger {
        const KIND: &'static str = "Stranger";
        const KEY: &'static str = "id";
    }

    let (_datastore, session) = setup_session(SessionConfig::default());
    let _transaction = session.begin_transaction().unwrap();
    assert!(matches!(
        session.put(&Stranger { id: "s".to_string() }),
        Err(AcidError::UnknownEntity { .. })
    ));
    assert!(matches!(session.get::<Stranger>("s"), Err(AcidError::UnknownEntity { .. })));
}
