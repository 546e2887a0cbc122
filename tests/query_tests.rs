mod common;

use acidhouse::prelude::*;
use acidhouse::Lock;

use common::{Customer, Entity1, seed, setup_session};

fn customers() -> Vec<Customer> {
    vec![
        Customer::new(1, "Ann", "Tokyo", Some(3)),
        Customer::new(2, "Bob", "Osaka", Some(1)),
        Customer::new(3, "Cid", "Tokyo", None),
        Customer::new(4, "Dee", "Tokyo", Some(2)),
        Customer::new(5, "Eve", "Kyoto", Some(5)),
    ]
}

fn names(customers: &[Customer]) -> Vec<&str> {
    customers.iter().map(|c| c.name.as_str()).collect()
}

#[test]
fn test_filter_display() {
    let name = Property::<String>::new("name");
    let rank = Property::<i64>::new("rank");
    let city = Property::<()>::new("address").nested::<String>("city");

    assert_eq!(name.equal_to("x".to_string()).to_string(), r#"name == "x""#);
    assert_eq!(rank.greater_than_or_equal_to(2).to_string(), "rank >= 2");
    assert_eq!(city.not_equal_to("Osaka".to_string()).to_string(), r#"address.city != "Osaka""#);
    assert_eq!(
        rank.in_values(vec![1, 2]).unwrap().to_string(),
        "(rank == 1 || rank == 2)"
    );
    assert!(matches!(rank.in_values(Vec::new()), Err(AcidError::InvalidArgument(_))));
    assert_eq!(rank.desc().to_string(), "rank DESC");
}

#[test]
fn test_list_filters_on_embedded_property_and_sorts() {
    let (_datastore, session) = setup_session(SessionConfig::default());
    seed(&session, &customers());

    let city = Property::<String>::new("address.city");
    let id = Property::<i64>::new("id");
    let tokyo = session
        .list::<Customer>()
        .filter(city.equal_to("Tokyo".to_string()))
        .sort(id.desc())
        .execute()
        .unwrap();
    assert_eq!(names(&tokyo), vec!["Dee", "Cid", "Ann"]);

    let page = session
        .list::<Customer>()
        .sort(id.asc())
        .offset(1)
        .limit(2)
        .execute()
        .unwrap();
    assert_eq!(names(&page), vec!["Bob", "Cid"]);
}

#[test]
fn test_missing_property_never_matches_and_sorts_first() {
    let (_datastore, session) = setup_session(SessionConfig::default());
    seed(&session, &customers());

    let rank = Property::<i64>::new("rank");
    let low = session
        .list::<Customer>()
        .filter(rank.less_than(3))
        .sort(rank.asc())
        .execute()
        .unwrap();
    assert_eq!(names(&low), vec!["Bob", "Dee"]);

    let by_rank = session.list::<Customer>().sort(rank.asc()).execute().unwrap();
    assert_eq!(names(&by_rank), vec!["Cid", "Bob", "Dee", "Ann", "Eve"]);

    let in_ranks = session
        .list::<Customer>()
        .filter(rank.in_values(vec![1, 5]).unwrap())
        .execute()
        .unwrap();
    assert_eq!(names(&in_ranks), vec!["Bob", "Eve"]);
}

#[test]
fn test_multiple_filters_and_orders_combine() {
    let (_datastore, session) = setup_session(SessionConfig::default());
    seed(&session, &customers());

    let city = Property::<String>::new("address.city");
    let rank = Property::<i64>::new("rank");
    let name = Property::<String>::new("name");
    let found = session
        .list::<Customer>()
        .filter(city.equal_to("Tokyo".to_string()))
        .filter(rank.greater_than(1))
        .sort(city.asc())
        .sort(name.desc())
        .execute()
        .unwrap();
    assert_eq!(names(&found), vec!["Dee", "Ann"]);
}

#[test]
fn test_scalar_aggregations() {
    let (_datastore, session) = setup_session(SessionConfig::default());
    seed(
        &session,
        &[Entity1::new("K1", 1), Entity1::new("K2", 3), Entity1::new("K3", 2)],
    );
    let i = Property::<i64>::new("i");

    assert_eq!(session.scalar::<Entity1, _>(max(&i)).execute().unwrap(), Some(3));
    assert_eq!(session.scalar::<Entity1, _>(min(&i)).execute().unwrap(), Some(1));
    assert_eq!(session.scalar::<Entity1, _>(sum(&i)).execute().unwrap(), Some(6));
    assert_eq!(
        session
            .scalar::<Entity1, _>(sum(&i))
            .filter(i.less_than(3))
            .execute()
            .unwrap(),
        Some(3)
    );
    assert_eq!(
        session
            .scalar::<Entity1, _>(max(&i))
            .filter(i.greater_than(10))
            .execute()
            .unwrap(),
        None
    );
    assert_eq!(
        session
            .scalar::<Entity1, _>(sum(&i))
            .filter(i.greater_than(10))
            .execute()
            .unwrap(),
        Some(0)
    );
}

#[test]
fn test_checked_sum_reports_overflow() {
    let (_datastore, session) = setup_session(SessionConfig::default());
    seed(
        &session,
        &[Entity1::new("K1", i64::MAX), Entity1::new("K2", 1), Entity1::new("K3", -5)],
    );
    let i = Property::<i64>::new("i");

    assert_eq!(session.scalar::<Entity1, _>(checked_sum(&i)).execute().unwrap(), None);
    assert_eq!(
        session
            .scalar::<Entity1, _>(checked_sum(&i))
            .filter(i.less_than(10))
            .execute()
            .unwrap(),
        Some(-4)
    );
    assert_eq!(
        session
            .scalar::<Entity1, _>(checked_sum(&i))
            .filter(i.greater_than(i64::MAX))
            .execute()
            .unwrap(),
        Some(0)
    );
}

#[test]
fn test_update_where_runs_through_the_transaction() {
    let (datastore, session) = setup_session(SessionConfig::default());
    seed(
        &session,
        &[Entity1::new("K1", 1), Entity1::new("K2", 2), Entity1::new("K3", 3)],
    );
    let i = Property::<i64>::new("i");

    assert!(matches!(
        session.update_where::<Entity1>().set(&i, 0).execute(),
        Err(AcidError::NotInTransaction)
    ));

    let transaction = session.begin_transaction().unwrap();
    let updated = session
        .update_where::<Entity1>()
        .set(&i, 100)
        .filter(i.greater_than(1))
        .execute()
        .unwrap();
    assert_eq!(updated, 2);
    // Not visible outside the transaction until commit.
    assert_eq!(datastore.read(&EntityKey::of::<Entity1>("K2")).unwrap().unwrap()["i"], 2);
    transaction.commit().unwrap();

    let values: Vec<i64> = session
        .list::<Entity1>()
        .execute()
        .unwrap()
        .into_iter()
        .map(|e| e.i)
        .collect();
    assert_eq!(values, vec![1, 100, 100]);
}

#[test]
fn test_update_where_cannot_change_identity() {
    let (_datastore, session) = setup_session(SessionConfig::default());
    seed(&session, &[Entity1::new("K1", 1)]);
    let id = Property::<String>::new("id");

    let transaction = session.begin_transaction().unwrap();
    assert!(matches!(
        session
            .update_where::<Entity1>()
            .set(&id, "K9".to_string())
            .execute(),
        Err(AcidError::InvalidArgument(_))
    ));
    transaction.rollback().unwrap();
}

#[test]
fn test_delete_where() {
    let (datastore, session) = setup_session(SessionConfig::default());
    seed(&session, &customers());
    let city = Property::<String>::new("address.city");

    let transaction = session.begin_transaction().unwrap();
    let deleted = session
        .delete_where::<Customer>()
        .filter(city.equal_to("Tokyo".to_string()))
        .execute()
        .unwrap();
    assert_eq!(deleted, 3);
    assert_eq!(session.get::<Customer>("1").unwrap(), None);
    transaction.commit().unwrap();

    assert_eq!(datastore.len(), 2);
    let left = session.list::<Customer>().execute().unwrap();
    assert_eq!(names(&left), vec!["Bob", "Eve"]);
}

#[test]
fn test_list_honors_read_policy() {
    let (datastore, session) = setup_session(SessionConfig::default());
    seed(&session, &[Entity1::new("K1", 1), Entity1::new("K2", 2)]);
    datastore
        .try_lock(Lock::acquire(EntityKey::of::<Entity1>("K2"), TransactionId::from("other")))
        .unwrap();

    assert!(matches!(
        session.list::<Entity1>().execute(),
        Err(AcidError::ConcurrentModification { .. })
    ));

    let relaxed = Session::new(
        datastore,
        common::metamodels(),
        SessionConfig::default().with_read_policy(ReadPolicy::LastCommitted),
    );
    assert_eq!(relaxed.list::<Entity1>().execute().unwrap().len(), 2);
}
