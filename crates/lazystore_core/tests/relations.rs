use lazystore_core::{
    attr, many, one, Data, FieldInput, Identity, ModelSchema, RecordInput, RelationCommand,
    SchemaError, SchemaRegistry, Store, StoreError, Value,
};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn store(log: Log) -> Store {
    let added = log.clone();
    let removed = log;
    let registry = SchemaRegistry::new()
        .with(
            ModelSchema::new("Person")
                .with_identity(Identity::field("id"))
                .with_field("id", attr())
                .with_field("name", attr())
                .with_field(
                    "friends",
                    many("Person")
                        .inverse("friends")
                        .on_add(move |store, owner, friend| {
                            added.borrow_mut().push(format!(
                                "add {} {}",
                                store.local_id(owner)?,
                                store.local_id(friend)?
                            ));
                            Ok(())
                        })
                        .on_delete(move |store, owner, friend| {
                            removed.borrow_mut().push(format!(
                                "delete {} {}",
                                store.local_id(owner)?,
                                store.local_id(friend)?
                            ));
                            Ok(())
                        }),
                )
                .with_field("team", one("Team")),
        )
        .unwrap()
        .with(
            ModelSchema::new("Team")
                .with_identity(Identity::field("code"))
                .with_field("code", attr())
                .with_field("members", many("Person").inverse("team"))
                .with_field(
                    "roster",
                    many("Person").sort(|store, a, b| {
                        let left = store.get_value(a, "name").unwrap_or_default();
                        let right = store.get_value(b, "name").unwrap_or_default();
                        left.total_cmp(&right)
                    }),
                ),
        )
        .unwrap();
    Store::with_defaults(registry).unwrap()
}

#[test]
fn adding_a_friend_mirrors_the_inverse() {
    let mut store = store(Log::default());
    let p1 = store.insert("Person", Data::new().with("id", 1)).unwrap();
    let p2 = store.insert("Person", Data::new().with("id", 2)).unwrap();

    store.add(p1, "friends", p2).unwrap();
    assert_eq!(store.get_many(p2, "friends").unwrap(), vec![p1]);
    assert_eq!(store.get_many(p1, "friends").unwrap(), vec![p2]);

    store.remove(p2, "friends", p1).unwrap();
    assert!(store.get_many(p1, "friends").unwrap().is_empty());
    assert!(store.get_many(p2, "friends").unwrap().is_empty());
}

#[test]
fn relation_hooks_fire_once_per_side_after_the_batch() {
    let log = Log::default();
    let mut store = store(log.clone());
    let p1 = store.insert("Person", 1).unwrap();
    let p2 = store.insert("Person", 2).unwrap();

    store
        .batch(|store| {
            store.add(p1, "friends", p2)?;
            assert!(log.borrow().is_empty());
            store.add(p1, "friends", p2)
        })
        .unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["add Person,1 Person,2".to_string(), "add Person,2 Person,1".to_string()]
    );

    log.borrow_mut().clear();
    store.set(p1, "friends", RelationCommand::Clear).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["delete Person,1 Person,2".to_string(), "delete Person,2 Person,1".to_string()]
    );
}

#[test]
fn auto_paired_inverse_links_one_and_many() {
    let mut store = store(Log::default());
    let alice = store
        .insert(
            "Person",
            Data::new().with("id", 1).with("team", Data::new().with("code", "core")),
        )
        .unwrap();
    let team = store.get("Team", "core").unwrap().unwrap();
    assert_eq!(store.get_many(team, "members").unwrap(), vec![alice]);

    let bob = store.insert("Person", 2).unwrap();
    store
        .set(
            team,
            "members",
            FieldInput::Records(vec![RecordInput::Id(bob), RecordInput::Id(alice)]),
        )
        .unwrap();
    assert_eq!(store.get_one(bob, "team").unwrap(), Some(team));
    assert_eq!(store.get_many(team, "members").unwrap(), vec![bob, alice]);

    let other = store.insert("Team", "ops").unwrap();
    store.set(bob, "team", other).unwrap();
    assert_eq!(store.get_many(team, "members").unwrap(), vec![alice]);
    assert_eq!(store.get_many(other, "members").unwrap(), vec![bob]);
}

#[test]
fn sorted_relation_reorders_on_add_and_on_rename() {
    let mut store = store(Log::default());
    let team = store.insert("Team", "core").unwrap();
    let carol = store
        .insert("Person", Data::new().with("id", 3).with("name", "Carol"))
        .unwrap();
    let alice = store
        .insert("Person", Data::new().with("id", 1).with("name", "Alice"))
        .unwrap();

    store.add(team, "roster", carol).unwrap();
    store.add(team, "roster", alice).unwrap();
    assert_eq!(store.get_many(team, "roster").unwrap(), vec![alice, carol]);

    store.set(alice, "name", "Dora").unwrap();
    assert_eq!(store.get_many(team, "roster").unwrap(), vec![carol, alice]);
}

#[test]
fn wrong_model_reference_is_a_consistency_error() {
    let mut store = store(Log::default());
    let person = store.insert("Person", 1).unwrap();
    let team = store.insert("Team", "core").unwrap();

    let err = store.add(person, "friends", team).unwrap_err();
    assert_eq!(
        err,
        StoreError::WrongModel {
            expected: "Person".to_string(),
            actual: "Team".to_string(),
        }
    );
}

#[test]
fn writing_a_record_into_an_attribute_is_a_type_error() {
    let mut store = store(Log::default());
    let person = store.insert("Person", 1).unwrap();
    let err = store
        .set(person, "name", Data::new().with("id", 2))
        .unwrap_err();
    assert!(matches!(err, StoreError::TypeMismatch { .. }));
    assert_eq!(store.get_value(person, "name").unwrap(), Value::Null);
}

#[test]
fn conflicting_inverse_declarations_are_rejected() {
    let registry = SchemaRegistry::new()
        .with(
            ModelSchema::new("Person")
                .with_field("manager", one("Person").inverse("reports"))
                .with_field("mentor", one("Person").inverse("reports"))
                .with_field("reports", many("Person").inverse("manager")),
        )
        .unwrap();
    let err = Store::with_defaults(registry).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Schema(SchemaError::InverseMismatch { .. })
    ));
}
