//! Extension lookup used when answering inbound probes.

use std::collections::{HashMap, HashSet};

pub trait Dialplan: Send + Sync {
    /// Whether `exten` exists in `context`.
    fn exists(&self, context: &str, exten: &str) -> bool;
}

/// Fixed context → extensions table, loaded from the `[dialplan]` config
/// section.
#[derive(Debug, Clone, Default)]
pub struct StaticDialplan {
    contexts: HashMap<String, HashSet<String>>,
}

impl StaticDialplan {
    pub fn new(contexts: &HashMap<String, Vec<String>>) -> Self {
        Self {
            contexts: contexts
                .iter()
                .map(|(ctx, extens)| (ctx.clone(), extens.iter().cloned().collect()))
                .collect(),
        }
    }

    pub fn add(&mut self, context: &str, exten: &str) {
        self.contexts
            .entry(context.to_string())
            .or_default()
            .insert(exten.to_string());
    }
}

impl Dialplan for StaticDialplan {
    fn exists(&self, context: &str, exten: &str) -> bool {
        self.contexts
            .get(context)
            .is_some_and(|extens| extens.contains(exten))
    }
}
