//! One-off move of the legacy flat layout (`threads/{t}`, `posts/{p}`) into the
//! forum tree
//!
//! The legacy documents are left untouched. Running the migration again
//! overwrites the tree copies with the same content. Listed posts whose
//! document is missing are dropped from the copied `postIds`.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;

use crate::{
    api::{CollectionPath, DocPath, ForumId, PostId, Store, ThreadId, ThreadRef},
    store_ext, AggregateOp, Aggregates, Config, FailedOp,
};

#[derive(Debug, Default)]
pub struct MigrationReport {
    pub threads: usize,
    pub posts: usize,
    /// Legacy documents that were not migrated, and why
    pub skipped: Vec<(DocPath, String)>,
    pub failed_recounts: Vec<FailedOp>,
}

fn str_field<'a>(doc: &'a serde_json::Map<String, Value>, field: &str) -> Option<&'a str> {
    doc.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub async fn migrate_to_tree(
    store: Arc<dyn Store>,
    config: Config,
) -> anyhow::Result<MigrationReport> {
    let mut report = MigrationReport::default();
    let threads = store
        .list(&CollectionPath::legacy_threads())
        .await
        .context("listing legacy threads")?;
    tracing::info!(threads = threads.len(), "migrating legacy threads");

    let mut migrated = Vec::with_capacity(threads.len());
    for (id, doc) in threads {
        let legacy = DocPath::legacy_thread(&ThreadId::from(id.as_str()));
        let Some(forum) = str_field(&doc, "forumId").map(ForumId::from) else {
            tracing::warn!(%legacy, "legacy thread has no forum, skipping");
            report.skipped.push((legacy, String::from("missing forumId")));
            continue;
        };
        let tref = ThreadRef::new(forum, ThreadId::from(id));
        let post_ids = doc
            .get("postIds")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(PostId::from)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut kept = Vec::with_capacity(post_ids.len());
        for post_id in post_ids {
            let legacy = DocPath::legacy_post(&post_id);
            let Some(mut post) = store
                .get(&legacy)
                .await
                .with_context(|| format!("reading {legacy}"))?
            else {
                tracing::warn!(%legacy, thread = %tref, "post listed by thread is missing");
                report.skipped.push((legacy, String::from("missing document")));
                continue;
            };
            post.entry("parentForum")
                .or_insert_with(|| Value::from(tref.forum.as_str()));
            post.entry("parentThread")
                .or_insert_with(|| Value::from(tref.thread.as_str()));
            let at = tref.post(post_id.clone());
            store_ext::set_doc(&*store, &at.path(), post)
                .await
                .with_context(|| format!("writing post {at}"))?;
            report.posts += 1;
            kept.push(Value::from(post_id.as_str()));
        }

        let mut doc = doc;
        doc.insert(String::from("postIds"), Value::Array(kept));
        store_ext::set_doc(&*store, &tref.path(), doc)
            .await
            .with_context(|| format!("writing thread {tref}"))?;
        report.threads += 1;
        migrated.push(tref);
    }

    let aggregates = Aggregates::new(store, config);
    report.failed_recounts = aggregates
        .replay(
            migrated
                .into_iter()
                .map(|thread| AggregateOp::Recount { thread })
                .collect(),
        )
        .await;
    tracing::info!(
        threads = report.threads,
        posts = report.posts,
        skipped = report.skipped.len(),
        failed_recounts = report.failed_recounts.len(),
        "migration done"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{Error, Post, Record},
        test_util::*,
    };
    use agora_memory_store::Access;
    use serde_json::json;

    async fn put_legacy(store: &agora_memory_store::MemoryStore, path: DocPath, doc: Value) {
        let Value::Object(doc) = doc else { panic!("not an object") };
        store.set(&path, doc).await.unwrap();
    }

    async fn seed_legacy(store: &agora_memory_store::MemoryStore) {
        put_legacy(
            store,
            DocPath::legacy_thread(&ThreadId::from("t1")),
            json!({
                "forumId": "f",
                "title": "hello",
                "createdBy": "alice",
                "createdTime": 1_000,
                "updatedBy": "bob",
                "updatedTime": 2_000,
                "postIds": ["p1", "p2", "gone"],
                "postCount": 12,
            }),
        )
        .await;
        put_legacy(
            store,
            DocPath::legacy_thread(&ThreadId::from("orphan")),
            json!({"title": "no forum", "postIds": ["p3"]}),
        )
        .await;
        let posts = [("p1", "alice", 1_000), ("p2", "bob", 2_000), ("p3", "carol", 3_000)];
        for (id, author, ms) in posts {
            put_legacy(
                store,
                DocPath::legacy_post(&PostId::from(id)),
                json!({"uid": author, "content": id, "createdTime": ms}),
            )
            .await;
        }
    }

    #[tokio::test]
    async fn legacy_threads_move_under_their_forum() {
        let store = new_store();
        seed_legacy(&store).await;

        let report = migrate_to_tree(store.clone(), Config::default()).await.unwrap();
        assert_eq!((report.threads, report.posts), (1, 2));
        let mut skipped = report.skipped.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>();
        skipped.sort();
        assert_eq!(skipped, vec!["posts/gone", "threads/orphan"]);
        assert!(report.failed_recounts.is_empty());

        let tref = ThreadRef::new(ForumId::from("f"), ThreadId::from("t1"));
        let thread = thread_of(&store, &tref).await.unwrap();
        assert_eq!(thread.title, "hello");
        assert_eq!(thread.post_count, 2);
        assert_eq!(thread.post_ids, vec![PostId::from("p1"), PostId::from("p2")]);
        let p2: Post = post_of(&store, &tref, "p2").await.unwrap();
        assert_eq!(p2.parent_forum, Some(ForumId::from("f")));
        assert_eq!(p2.parent_thread, Some(ThreadId::from("t1")));
        assert!(store.contains(&DocPath::legacy_post(&PostId::from("p1"))));

        let before = store.dump();
        let again = migrate_to_tree(store.clone(), Config::default()).await.unwrap();
        assert_eq!((again.threads, again.posts), (1, 2));
        assert_eq!(store.dump(), before);
        let p2_doc = store.doc(&tref.post(PostId::from("p2")).path()).unwrap();
        assert!(Post::from_document("p2", p2_doc).is_ok());
    }

    #[tokio::test]
    async fn write_failures_abort_with_context() {
        let store = new_store();
        seed_legacy(&store).await;
        store.fail("forums/f/threads/t1/posts/", Access::Write, Error::PermissionDenied);
        let err = migrate_to_tree(store.clone(), Config::default()).await.unwrap_err();
        assert!(format!("{err:#}").contains("writing post f/t1/p1"), "{err:#}");
    }
}
