use crate::llm::ProviderRegistry;
use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Long-term memory consulted and updated by step handlers
#[async_trait::async_trait]
pub trait MemoryStore: Send + Sync {
    async fn search_memories(&self, query: &str) -> Result<Vec<Value>>;

    async fn add_memory(&self, record: Value) -> Result<()>;
}

/// Knowledge graph consulted and updated by step handlers
#[async_trait::async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Value>>;

    async fn add_node(&self, id: &str, attributes: Value) -> Result<()>;

    async fn add_relation(&self, from: &str, to: &str, kind: &str, attributes: Value) -> Result<()>;
}

/// Lowercased alphanumeric words of `text`
fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Case-insensitive whole-word match: every word of `query` is a word of `text`
fn matches_query(text: &str, query: &str) -> bool {
    let terms = words(query);
    if terms.is_empty() {
        return false;
    }
    let text = words(text);
    terms.iter().all(|term| text.contains(term))
}

/// Append-only memory kept in process
#[derive(Debug, Default)]
pub struct InMemoryMemory {
    records: RwLock<Vec<Value>>,
}

impl InMemoryMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<Value> {
        self.records.read().await.clone()
    }

    /// Records whose `type` field equals `record_type`
    pub async fn records_of_type(&self, record_type: &str) -> Vec<Value> {
        self.records
            .read()
            .await
            .iter()
            .filter(|record| record.get("type").and_then(Value::as_str) == Some(record_type))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl MemoryStore for InMemoryMemory {
    async fn search_memories(&self, query: &str) -> Result<Vec<Value>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|record| matches_query(&record.to_string(), query))
            .cloned()
            .collect())
    }

    async fn add_memory(&self, record: Value) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    pub from: String,
    pub to: String,
    pub kind: String,
    pub attributes: Value,
}

/// Knowledge graph kept in process
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeGraph {
    nodes: DashMap<String, Value>,
    relations: RwLock<Vec<Relation>>,
}

impl InMemoryKnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<Value> {
        self.nodes.get(id).map(|node| node.value().clone())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub async fn relations(&self) -> Vec<Relation> {
        self.relations.read().await.clone()
    }

    pub async fn relations_from(&self, from: &str) -> Vec<Relation> {
        self.relations
            .read()
            .await
            .iter()
            .filter(|relation| relation.from == from)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl KnowledgeStore for InMemoryKnowledgeGraph {
    async fn search(&self, query: &str) -> Result<Vec<Value>> {
        let mut hits: Vec<(String, Value)> = self
            .nodes
            .iter()
            .filter(|entry| matches_query(&format!("{} {}", entry.key(), entry.value()), query))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        hits.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(hits
            .into_iter()
            .map(|(id, attributes)| json!({ "id": id, "attributes": attributes }))
            .collect())
    }

    /// Adding an existing id merges object attributes into the stored node
    async fn add_node(&self, id: &str, attributes: Value) -> Result<()> {
        let mut node = self.nodes.entry(id.to_string()).or_insert(Value::Null);
        match (node.value_mut(), attributes) {
            (Value::Object(existing), Value::Object(incoming)) => existing.extend(incoming),
            (slot, incoming) => *slot = incoming,
        }
        Ok(())
    }

    async fn add_relation(&self, from: &str, to: &str, kind: &str, attributes: Value) -> Result<()> {
        self.relations.write().await.push(Relation {
            from: from.to_string(),
            to: to.to_string(),
            kind: kind.to_string(),
            attributes,
        });
        Ok(())
    }
}

/// External services available to step handlers
#[derive(Clone)]
pub struct Collaborators {
    pub memory: Arc<dyn MemoryStore>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub providers: Arc<ProviderRegistry>,
}

impl Collaborators {
    pub fn new(
        memory: Arc<dyn MemoryStore>,
        knowledge: Arc<dyn KnowledgeStore>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            memory,
            knowledge,
            providers: Arc::new(providers),
        }
    }

    /// Fresh in-process memory and knowledge graph, no providers
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryMemory::new()),
            Arc::new(InMemoryKnowledgeGraph::new()),
            ProviderRegistry::new(),
        )
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Arc::new(providers);
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}
