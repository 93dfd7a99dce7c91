use indexmap::IndexMap;

/// Anything the registry can key by a stable identifier.
pub trait NamedNode {
    fn id(&self) -> &str;
    fn display_name(&self) -> &str;
}

/// Stable id → entry, built once at startup. Registration order is kept so
/// hosts can render nodes in the order they were declared.
#[derive(Debug, Clone)]
pub struct NodeRegistry<T: NamedNode> {
    entries: IndexMap<String, T>,
}

impl<T: NamedNode> Default for NodeRegistry<T> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<T: NamedNode> NodeRegistry<T> {
    pub fn new(entries: Vec<T>) -> anyhow::Result<Self> {
        let mut registry = Self::default();
        for entry in entries {
            registry.register(entry)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, entry: T) -> anyhow::Result<()> {
        let id = entry.id().to_string();
        if self.entries.contains_key(&id) {
            anyhow::bail!("node '{id}' registered twice");
        }
        self.entries.insert(id, entry);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn display_name(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(|entry| entry.display_name())
    }

    /// Ids sorted alphabetically.
    pub fn list(&self) -> Vec<String> {
        let mut ids = self.entries.keys().cloned().collect::<Vec<String>>();
        ids.sort();
        ids
    }

    pub fn entries(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
