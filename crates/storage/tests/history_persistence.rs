use std::sync::Arc;

use shared::domain::Creation;
use storage::{
    CreationStore, CredentialStore, KeyValueStore, NameLocalizer, NoExamples,
    SqliteKeyValueStore, StaticExampleSource, HISTORY_KEY,
};

fn database_url(dir: &tempfile::TempDir) -> String {
    let path = dir.path().join("studio.sqlite3");
    format!("sqlite://{}", path.to_string_lossy().replace('\\', "/"))
}

#[tokio::test]
async fn completed_mutations_are_visible_after_reopening_the_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir);

    let kv = Arc::new(SqliteKeyValueStore::new(&url).await.expect("open"));
    let mut store = CreationStore::new(kv.clone());
    store.initialize(&NoExamples, &NameLocalizer::default()).await;

    let first = Creation::new("First", "<html>1</html>", None);
    let second = Creation::new("Second", "<html>2</html>", None);
    store.add(first.clone()).await;
    store.add(second.clone()).await;
    store.remove(&first.id).await;

    let reopened = Arc::new(SqliteKeyValueStore::new(&url).await.expect("reopen"));
    let mut reader = CreationStore::new(reopened);
    let list = reader
        .initialize(&NoExamples, &NameLocalizer::default())
        .await;
    assert_eq!(list, &[second]);
}

#[tokio::test]
async fn emptied_history_removes_the_entry_and_next_start_bootstraps() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir);
    let kv = Arc::new(SqliteKeyValueStore::new(&url).await.expect("open"));

    let mut store = CreationStore::new(kv.clone());
    let only = Creation::new("Only", "<p/>", None);
    store.add(only.clone()).await;
    store.remove(&only.id).await;
    assert_eq!(kv.get(HISTORY_KEY).await.expect("read"), None);

    let examples = StaticExampleSource::new(vec![serde_json::from_str(
        r#"{"name":"Example","html":"<html>e</html>"}"#,
    )
    .expect("example document")]);
    let mut restarted = CreationStore::new(kv);
    let list = restarted
        .initialize(&examples, &NameLocalizer::default())
        .await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "Example");
}

#[tokio::test]
async fn credential_and_history_share_one_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir);
    let kv = Arc::new(SqliteKeyValueStore::new(&url).await.expect("open"));

    let credentials = CredentialStore::new(kv.clone());
    credentials.save("key-123").await.expect("save");

    let mut store = CreationStore::new(kv.clone());
    store.add(Creation::new("A", "<p/>", None)).await;

    credentials.clear().await.expect("clear");
    assert_eq!(credentials.load().await.expect("load"), None);
    assert!(kv.get(HISTORY_KEY).await.expect("read").is_some());
}
