use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{CollectionPath, DocPath, Error, Time};

pub type Document = serde_json::Map<String, Value>;

/// Typed view over a stored document, whose id lives in its path rather than its fields
pub trait Record: Sized + DeserializeOwned + Serialize {
    fn set_id(&mut self, id: &str);

    fn from_document(id: &str, doc: Document) -> Result<Self, Error> {
        let mut res: Self = serde_json::from_value(Value::Object(doc))
            .map_err(|e| Error::Malformed(format!("document {id}: {e}")))?;
        res.set_id(id);
        Ok(res)
    }

    fn to_document(&self) -> Result<Document, Error> {
        match serde_json::to_value(self) {
            Ok(Value::Object(doc)) => Ok(doc),
            Ok(v) => Err(Error::Malformed(format!(
                "record serialized to a non-object: {v}"
            ))),
            Err(e) => Err(Error::Malformed(format!("serializing record: {e}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldOp {
    Set(Value),
    /// Adds each value not already present, keeping existing order
    ArrayUnion(Vec<Value>),
    /// Removes every occurrence of each value
    ArrayRemove(Vec<Value>),
    Delete,
}

/// One atomic field-level operation, `field` being a dot-separated path into the document
#[derive(Clone, Debug, PartialEq)]
pub struct FieldUpdate {
    pub field: String,
    pub op: FieldOp,
}

impl FieldUpdate {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> FieldUpdate {
        FieldUpdate {
            field: field.into(),
            op: FieldOp::Set(value.into()),
        }
    }

    pub fn set_time(field: impl Into<String>, time: &Time) -> FieldUpdate {
        FieldUpdate::set(field, crate::time_to_millis(time))
    }

    pub fn array_union(field: impl Into<String>, values: Vec<Value>) -> FieldUpdate {
        FieldUpdate {
            field: field.into(),
            op: FieldOp::ArrayUnion(values),
        }
    }

    pub fn array_remove(field: impl Into<String>, values: Vec<Value>) -> FieldUpdate {
        FieldUpdate {
            field: field.into(),
            op: FieldOp::ArrayRemove(values),
        }
    }

    pub fn delete(field: impl Into<String>) -> FieldUpdate {
        FieldUpdate {
            field: field.into(),
            op: FieldOp::Delete,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub equals: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
}

impl Query {
    pub fn all(collection: CollectionPath) -> Query {
        Query {
            collection,
            filters: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Query {
        self.filters.push(Filter {
            field: field.into(),
            equals: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Query {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Watch {
    /// Behaves as a query over a one-element set, that may report the document as absent
    Document(DocPath),
    Query(Query),
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct WatchId(pub u64);

/// Complete current result set of a watch, superseding any lower-`seq` snapshot of the same watch
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub seq: u64,
    pub docs: Vec<(String, Option<Document>)>,
}

impl Snapshot {
    /// Decodes every present document, skipping (and reporting) malformed ones
    pub fn records<R: Record>(&self) -> (Vec<R>, Vec<Error>) {
        let mut records = Vec::with_capacity(self.docs.len());
        let mut errors = Vec::new();
        for (id, doc) in self.docs.iter() {
            if let Some(doc) = doc {
                match R::from_document(id, doc.clone()) {
                    Ok(r) => records.push(r),
                    Err(e) => errors.push(e),
                }
            }
        }
        (records, errors)
    }

    /// For single-document watches: None if the document is absent
    pub fn single(&self) -> Option<(&str, &Document)> {
        self.docs
            .first()
            .and_then(|(id, doc)| doc.as_ref().map(|doc| (id as &str, doc)))
    }
}
