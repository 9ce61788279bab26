//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise `lazystore_core` end to end on a small `Person` schema.
//! - Keep output deterministic for quick local sanity checks.

use lazystore_core::{
    attr, many, one, Data, Identity, ModelSchema, RecordId, SchemaRegistry, Store, StoreResult,
};
use log::info;
use std::cell::Cell;
use std::process::ExitCode;
use std::rc::Rc;

fn main() -> ExitCode {
    let level = std::env::var("LAZYSTORE_LOG").unwrap_or_else(|_| "warn".to_string());
    if let Err(err) = lazystore_core::init_stderr_logging(&level) {
        eprintln!("logging disabled: {err}");
    }

    println!("lazystore_core ping={}", lazystore_core::ping());
    println!("lazystore_core version={}", lazystore_core::core_version());

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("smoke run failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> StoreResult<()> {
    let updates = Rc::new(Cell::new(0_u32));
    let counter = updates.clone();
    let registry = SchemaRegistry::new().with(
        ModelSchema::new("Person")
            .with_identity(Identity::field("id"))
            .with_field("id", attr())
            .with_field(
                "name",
                attr().on_update(move |_, _| {
                    counter.set(counter.get() + 1);
                    Ok(())
                }),
            )
            .with_field("friends", many("Person").inverse("friends"))
            .with_field("manager", one("Person").inverse("managerOf"))
            .with_field("managerOf", many("Person")),
    )?;
    let mut store = Store::with_defaults(registry)?;
    info!(
        "event=smoke_start module=cli status=ok store_id={}",
        store.id()
    );

    let p1 = store.insert("Person", Data::new().with("id", 1))?;
    let p2 = store.insert("Person", Data::new().with("id", 2))?;
    store.add(p1, "friends", p2)?;
    println!(
        "friends inverse={}",
        p1.in_list(&store.get_many(p2, "friends")?)
    );

    store.set(p2, "manager", p1)?;
    store.delete(p1)?;
    println!(
        "delete cascade manager_cleared={} p1_exists={}",
        store.get_one(p2, "manager")?.is_none(),
        store.exists(p1)
    );

    store.insert("Person", Data::new().with("id", 3).with("name", "x"))?;
    store.insert("Person", Data::new().with("id", 3).with("name", "x"))?;
    println!("on_update fired={}", updates.get());

    let p3 = store.preinsert("Person", 3)?;
    println!("to_json={}", json_line(&mut store, p3)?);
    Ok(())
}

fn json_line(store: &mut Store, record: RecordId) -> StoreResult<String> {
    Ok(store.to_json(record)?.to_string())
}
