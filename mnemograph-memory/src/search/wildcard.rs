//! Wildcard summary
//!
//! Answers `*`, `all` and empty queries with the top of the hierarchy: root
//! memories first, then their children, then grandchildren, until the target
//! count is reached.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::error::Result;
use crate::graph::GraphStore;
use crate::node::{MemoryId, MemoryRecord};

use super::scoring::MatchType;
use super::RankedResult;

/// Levels walked below the roots
const MAX_DEPTH: usize = 2;

/// Direct child of a summarized memory
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildSummary {
    pub id: MemoryId,
    pub name: String,
    #[serde(rename = "type")]
    pub memory_type: String,
    pub relation_type: String,
}

/// Hierarchical summary of at most `target` memories, without observations
pub async fn summarize(
    store: &dyn GraphStore,
    target: usize,
    types: Option<&[String]>,
) -> Result<Vec<RankedResult>> {
    let mut selected: Vec<MemoryRecord> = store.root_memories(target, types).await?;
    selected.truncate(target);
    let root_count = selected.len();
    let mut seen: HashSet<MemoryId> = selected.iter().map(|r| r.id).collect();
    let mut frontier: Vec<MemoryId> = selected.iter().map(|r| r.id).collect();

    for _ in 0..MAX_DEPTH {
        if selected.len() >= target || frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for row in store.child_edges(&frontier, types).await? {
            if selected.len() >= target {
                break;
            }
            if seen.insert(row.child.id) {
                next.push(row.child.id);
                selected.push(row.child);
            }
        }
        frontier = next;
    }

    // Children were peeked; record the access for the ones returned
    let descendants: Vec<MemoryId> = selected[root_count..].iter().map(|r| r.id).collect();
    if !descendants.is_empty() {
        let mut fresh: HashMap<MemoryId, MemoryRecord> = store
            .fetch_memories(&descendants, false)
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        for record in &mut selected[root_count..] {
            if let Some(current) = fresh.remove(&record.id) {
                *record = current;
            }
        }
    }

    let ids: Vec<MemoryId> = selected.iter().map(|r| r.id).collect();
    let mut children: BTreeMap<MemoryId, Vec<ChildSummary>> = BTreeMap::new();
    if !ids.is_empty() {
        for row in store.child_edges(&ids, types).await? {
            children.entry(row.parent).or_default().push(ChildSummary {
                id: row.child.id,
                name: row.child.name,
                memory_type: row.child.memory_type,
                relation_type: row.relation_type,
            });
        }
    }

    log::debug!("Wildcard summary: {} memories", selected.len());
    Ok(selected
        .into_iter()
        .map(|mut record| {
            record.observations.clear();
            let mut result = RankedResult::new(record, 1.0, MatchType::Exact);
            result.children = Some(children.remove(&result.memory.id).unwrap_or_default());
            result
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Relation;
    use crate::search::mock::{memory, MockGraphStore};

    fn tree() -> (MockGraphStore, Vec<MemoryId>) {
        // root -> {a, b}, a -> {c}
        let root = memory("Root", "project", vec![1.0]);
        let a = memory("A", "task", vec![1.0]);
        let b = memory("B", "task", vec![1.0]);
        let c = memory("C", "task", vec![1.0]);
        let ids = vec![root.id, a.id, b.id, c.id];
        let store = MockGraphStore::new()
            .with_relation(Relation::new(root.id, a.id, "contains").unwrap())
            .with_relation(Relation::new(root.id, b.id, "contains").unwrap())
            .with_relation(Relation::new(a.id, c.id, "contains").unwrap())
            .with_observation(root.id, "kickoff in March")
            .with_record(root)
            .with_record(a)
            .with_record(b)
            .with_record(c);
        (store, ids)
    }

    #[tokio::test]
    async fn test_roots_fill_target() {
        let mut store = MockGraphStore::new();
        for i in 0..8 {
            store = store.with_record(memory(&format!("Root {}", i), "note", vec![1.0]));
        }
        let results = summarize(&store, 5, None).await.unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.score == 1.0));
        assert!(results.iter().all(|r| r.match_type == MatchType::Exact));
        assert!(results.iter().all(|r| r.related.is_none()));
        assert!(results.iter().all(|r| r.children.as_ref().is_some_and(|c| c.is_empty())));
    }

    #[tokio::test]
    async fn test_extends_breadth_first() {
        let (store, ids) = tree();
        let results = summarize(&store, 3, None).await.unwrap();
        let got: Vec<MemoryId> = results.iter().map(|r| r.memory.id).collect();
        assert_eq!(got, vec![ids[0], ids[1], ids[2]]);

        let root = &results[0];
        let children = root.children.as_ref().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].relation_type, "contains");
        assert!(root.memory.observations.is_empty());

        let all = summarize(&store, 20, None).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].memory.id, ids[3]);
    }

    #[tokio::test]
    async fn test_stops_at_grandchildren() {
        // root -> a -> c -> d
        let root = memory("Root", "project", vec![1.0]);
        let a = memory("A", "task", vec![1.0]);
        let c = memory("C", "task", vec![1.0]);
        let d = memory("D", "task", vec![1.0]);
        let (root_id, a_id, c_id, d_id) = (root.id, a.id, c.id, d.id);
        let store = MockGraphStore::new()
            .with_relation(Relation::new(root_id, a_id, "contains").unwrap())
            .with_relation(Relation::new(a_id, c_id, "contains").unwrap())
            .with_relation(Relation::new(c_id, d_id, "contains").unwrap())
            .with_record(root)
            .with_record(a)
            .with_record(c)
            .with_record(d);

        let results = summarize(&store, 20, None).await.unwrap();
        let got: Vec<MemoryId> = results.iter().map(|r| r.memory.id).collect();
        assert_eq!(got, vec![root_id, a_id, c_id]);
        // d still shows up as c's child annotation
        let c_children = results[2].children.as_ref().unwrap();
        assert_eq!(c_children.len(), 1);
        assert_eq!(c_children[0].id, d_id);
    }

    #[tokio::test]
    async fn test_type_filter_and_empty_graph() {
        let (store, _) = tree();
        let tasks = vec!["task".to_string()];
        // Tasks all have a parent, so there are no task roots
        assert!(summarize(&store, 10, Some(&tasks)).await.unwrap().is_empty());

        let empty = MockGraphStore::new();
        assert!(summarize(&empty, 10, None).await.unwrap().is_empty());
    }
}
