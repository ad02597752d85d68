use pokedex_api::datasource::MemoryDataSource;
use pokedex_api::{AppError, Filter, Operation, PersistContext, PokemonRepository, Where};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};

fn body(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => panic!("object expected"),
    }
}

fn repo() -> PokemonRepository {
    PokemonRepository::new(Arc::new(MemoryDataSource::new("test")))
}

#[tokio::test]
async fn create_stamps_modified_over_client_value() {
    let repo = repo();
    let client_value = "2001-02-03T04:05:06.000Z";
    repo.create(body(json!({"name": "pikachu", "modified": client_value})))
        .await
        .unwrap();
    let found = repo.find_by_id("pikachu", None).await.unwrap();
    let modified = found.modified.expect("modified set");
    assert_ne!(
        pokedex_api::model::timestamp::format(&modified),
        client_value
    );
}

#[tokio::test]
async fn updates_refresh_modified() {
    let repo = repo();
    repo.create(body(json!({"name": "eevee", "level": 5})))
        .await
        .unwrap();
    repo.create(body(json!({"name": "vulpix", "level": 7})))
        .await
        .unwrap();

    let before = repo.find_by_id("eevee", None).await.unwrap().modified.unwrap();
    repo.update_by_id("eevee", body(json!({"level": 6})))
        .await
        .unwrap();
    let after_patch = repo.find_by_id("eevee", None).await.unwrap();
    assert!(after_patch.modified.unwrap() >= before);
    assert_eq!(after_patch.properties.get("level"), Some(&json!(6)));

    let before = after_patch.modified.unwrap();
    let n = repo.update_all(body(json!({"shiny": true})), None).await.unwrap();
    assert_eq!(n, 2);
    let after_bulk = repo.find_by_id("eevee", None).await.unwrap();
    assert!(after_bulk.modified.unwrap() >= before);
    assert_eq!(after_bulk.properties.get("shiny"), Some(&json!(true)));

    let before = after_bulk.modified.unwrap();
    repo.replace_by_id("eevee", body(json!({"level": 1})))
        .await
        .unwrap();
    let after_replace = repo.find_by_id("eevee", None).await.unwrap();
    assert!(after_replace.modified.unwrap() >= before);
    assert!(!after_replace.properties.contains_key("shiny"));
}

#[tokio::test]
async fn update_all_honours_where() {
    let repo = repo();
    for (name, kind) in [("charmander", "fire"), ("squirtle", "water"), ("vulpix", "fire")] {
        repo.create(body(json!({"name": name, "type": kind})))
            .await
            .unwrap();
    }
    let where_ = Where::parse(r#"{"type": "fire"}"#).unwrap();
    let n = repo
        .update_all(body(json!({"evolved": false})), Some(&where_))
        .await
        .unwrap();
    assert_eq!(n, 2);
    let squirtle = repo.find_by_id("squirtle", None).await.unwrap();
    assert!(!squirtle.properties.contains_key("evolved"));
}

#[tokio::test]
async fn delete_then_find_is_not_found() {
    let repo = repo();
    repo.create(body(json!({"name": "ditto"}))).await.unwrap();
    repo.delete_by_id("ditto").await.unwrap();
    let err = repo.find_by_id("ditto", None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
    assert!(matches!(
        repo.delete_by_id("ditto").await.unwrap_err(),
        AppError::NotFound { .. }
    ));
}

#[tokio::test]
async fn missing_records_are_not_found_for_writes() {
    let repo = repo();
    assert!(matches!(
        repo.update_by_id("ghost", body(json!({"a": 1}))).await,
        Err(AppError::NotFound { .. })
    ));
    assert!(matches!(
        repo.replace_by_id("ghost", body(json!({"a": 1}))).await,
        Err(AppError::NotFound { .. })
    ));
}

#[tokio::test]
async fn count_matches_find() {
    let repo = repo();
    for name in ["bulbasaur", "ivysaur", "venusaur", "oddish"] {
        repo.create(body(json!({"name": name}))).await.unwrap();
    }
    let all = repo.find(&Filter::default()).await.unwrap();
    assert_eq!(repo.count(None).await.unwrap(), all.len() as u64);

    let where_ = Where::parse(r#"{"name": {"like": "%saur"}}"#).unwrap();
    assert_eq!(repo.count(Some(&where_)).await.unwrap(), 3);
}

#[tokio::test]
async fn observers_run_in_order_and_can_abort() {
    let mut repo = repo();
    let seen: Arc<Mutex<Vec<Operation>>> = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    repo.observe_persist(Arc::new(move |ctx: &mut PersistContext<'_>| {
        log.lock().unwrap().push(ctx.operation);
        assert!(ctx.data.contains_key("modified"));
        if ctx.data.get("banned") == Some(&json!(true)) {
            return Err(AppError::Validation("banned".into()));
        }
        Ok(())
    }));

    repo.create(body(json!({"name": "mew"}))).await.unwrap();
    repo.update_by_id("mew", body(json!({"hp": 1}))).await.unwrap();
    let err = repo
        .create(body(json!({"name": "missingno", "banned": true})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(repo.count(None).await.unwrap(), 1);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Operation::Create, Operation::UpdateById, Operation::Create]
    );
}

#[tokio::test]
async fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");

    let ds = MemoryDataSource::open("file", Some(path.clone())).await.unwrap();
    let repo = PokemonRepository::new(Arc::new(ds));
    repo.create(body(json!({"name": "snorlax", "weight": 460})))
        .await
        .unwrap();
    repo.create(body(json!({"name": "jigglypuff"}))).await.unwrap();
    repo.delete_by_id("jigglypuff").await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let layout: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(layout["ids"]["Pokemon"], json!(2));
    assert!(layout["models"]["Pokemon"]["snorlax"].is_string());

    let reopened = MemoryDataSource::open("file", Some(path)).await.unwrap();
    let repo = PokemonRepository::new(Arc::new(reopened));
    let snorlax = repo.find_by_id("snorlax", None).await.unwrap();
    assert_eq!(snorlax.properties.get("weight"), Some(&json!(460)));
    assert!(snorlax.modified.is_some());
    assert_eq!(repo.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn failed_flush_leaves_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let path = data_dir.join("db.json");

    let ds = MemoryDataSource::open("file", Some(path)).await.unwrap();
    let repo = PokemonRepository::new(Arc::new(ds));
    repo.create(body(json!({"name": "snorlax", "weight": 460})))
        .await
        .unwrap();

    // Replace the data directory with a regular file so every later flush fails.
    std::fs::remove_dir_all(&data_dir).unwrap();
    std::fs::write(&data_dir, "not a directory").unwrap();

    let err = repo.create(body(json!({"name": "mew"}))).await.unwrap_err();
    assert!(matches!(err, AppError::Storage(_)));
    assert_eq!(repo.count(None).await.unwrap(), 1);
    let retry = repo.create(body(json!({"name": "mew"}))).await.unwrap_err();
    assert!(matches!(retry, AppError::Storage(_)));

    let err = repo
        .update_by_id("snorlax", body(json!({"weight": 1})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Storage(_)));
    let err = repo
        .update_all(body(json!({"asleep": true})), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Storage(_)));
    let err = repo
        .replace_by_id("snorlax", body(json!({"level": 30})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Storage(_)));
    let err = repo.delete_by_id("snorlax").await.unwrap_err();
    assert!(matches!(err, AppError::Storage(_)));

    let snorlax = repo.find_by_id("snorlax", None).await.unwrap();
    assert_eq!(snorlax.properties.get("weight"), Some(&json!(460)));
    assert!(!snorlax.properties.contains_key("asleep"));
    assert!(!snorlax.properties.contains_key("level"));
}
