use parking_lot::Mutex;
use serde_json::{Map, Value as Json};

/// A record in a data-store collection.
pub type Record = Map<String, Json>;

/// External record store. Only the full-capability context calls into it.
pub trait DataStore: Send + Sync {
    /// Inserts a record and returns its id.
    fn create_record(&self, collection: &str, record: Record) -> String;
    fn update_record(&self, collection: &str, id: &str, patch: Record);
    fn delete_record(&self, collection: &str, id: &str);
    fn get_all(&self, collection: &str) -> Vec<Record>;
}

/// Insertion-ordered in-memory store.
///
/// Records without an `id` field get `"{collection}-{n}"`.
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    inner: Mutex<Collections>,
}

#[derive(Debug, Default)]
struct Collections {
    collections: Vec<(String, Vec<Record>)>,
    next_id: u64,
}

impl Collections {
    fn records_mut(&mut self, collection: &str) -> &mut Vec<Record> {
        let index = match self.collections.iter().position(|(name, _)| name == collection) {
            Some(index) => index,
            None => {
                self.collections.push((collection.to_string(), Vec::new()));
                self.collections.len() - 1
            }
        };
        &mut self.collections[index].1
    }
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn record_id(record: &Record) -> Option<String> {
    match record.get("id")? {
        Json::String(id) => Some(id.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl DataStore for MemoryDataStore {
    fn create_record(&self, collection: &str, mut record: Record) -> String {
        let mut inner = self.inner.lock();
        let id = match record_id(&record) {
            Some(id) => id,
            None => {
                inner.next_id += 1;
                let id = format!("{collection}-{}", inner.next_id);
                record.insert("id".into(), Json::String(id.clone()));
                id
            }
        };
        inner.records_mut(collection).push(record);
        id
    }

    fn update_record(&self, collection: &str, id: &str, patch: Record) {
        let mut inner = self.inner.lock();
        let records = inner.records_mut(collection);
        match records
            .iter_mut()
            .find(|record| record_id(record).as_deref() == Some(id))
        {
            Some(record) => {
                for (key, value) in patch {
                    if key != "id" {
                        record.insert(key, value);
                    }
                }
            }
            None => tracing::warn!(collection, id, "update of unknown record ignored"),
        }
    }

    fn delete_record(&self, collection: &str, id: &str) {
        let mut inner = self.inner.lock();
        inner
            .records_mut(collection)
            .retain(|record| record_id(record).as_deref() != Some(id));
    }

    fn get_all(&self, collection: &str) -> Vec<Record> {
        let inner = self.inner.lock();
        inner
            .collections
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, records)| records.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Json) -> Record {
        match value {
            Json::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn create_update_delete() {
        let store = MemoryDataStore::new();
        let id = store.create_record("todos", record(json!({ "title": "a" })));
        store.create_record("todos", record(json!({ "id": "fixed", "title": "b" })));
        assert_eq!(id, "todos-1");

        store.update_record("todos", &id, record(json!({ "done": true, "id": "hijack" })));
        let all = store.get_all("todos");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["done"], json!(true));
        assert_eq!(all[0]["id"], json!("todos-1"));

        store.delete_record("todos", "fixed");
        assert_eq!(store.get_all("todos").len(), 1);
        assert!(store.get_all("unknown").is_empty());
    }
}
