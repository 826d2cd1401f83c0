//! Typed helpers over the raw document store

use crate::api::{CollectionPath, DocPath, Document, Error, FieldUpdate, Record, Store};

fn check_writable(path: &str, is_legacy: bool) -> Result<(), Error> {
    if is_legacy {
        return Err(Error::InvalidArgument(format!(
            "refusing to write to legacy path {path}"
        )));
    }
    Ok(())
}

pub async fn get_record<R: Record>(store: &dyn Store, path: &DocPath) -> Result<Option<R>, Error> {
    match store.get(path).await? {
        None => Ok(None),
        Some(doc) => R::from_document(path.id(), doc).map(Some),
    }
}

/// Lists a collection, skipping the documents that fail to decode
pub async fn list_records<R: Record>(
    store: &dyn Store,
    collection: &CollectionPath,
) -> Result<Vec<R>, Error> {
    let docs = store.list(collection).await?;
    let mut res = Vec::with_capacity(docs.len());
    for (id, doc) in docs {
        match R::from_document(&id, doc) {
            Ok(r) => res.push(r),
            Err(err) => tracing::warn!(?err, %collection, %id, "skipping malformed document"),
        }
    }
    Ok(res)
}

pub async fn set_record<R: Record>(
    store: &dyn Store,
    path: &DocPath,
    record: &R,
) -> Result<(), Error> {
    check_writable(path.as_str(), path.is_legacy())?;
    store.set(path, record.to_document()?).await
}

pub async fn add_record<R: Record>(
    store: &dyn Store,
    collection: &CollectionPath,
    record: &R,
) -> Result<String, Error> {
    check_writable(collection.as_str(), collection.is_legacy())?;
    store.add(collection, record.to_document()?).await
}

pub async fn set_doc(store: &dyn Store, path: &DocPath, doc: Document) -> Result<(), Error> {
    check_writable(path.as_str(), path.is_legacy())?;
    store.set(path, doc).await
}

pub async fn update(
    store: &dyn Store,
    path: &DocPath,
    updates: Vec<FieldUpdate>,
) -> Result<(), Error> {
    check_writable(path.as_str(), path.is_legacy())?;
    store.update(path, updates).await
}

pub async fn delete(store: &dyn Store, path: &DocPath) -> Result<(), Error> {
    check_writable(path.as_str(), path.is_legacy())?;
    store.delete(path).await
}
