use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use floe_merge::Merger;
use floe_window::WindowKind;

use crate::sink::SinkFactory;
use crate::source::SourceFactory;
use crate::transform::{GroupBy, Transform};
use crate::trigger::TriggerSpec;
use crate::GraphError;

/// Everything needed to run one graph type: where records come from, how
/// they become events, how they're grouped and windowed, how per-key state
/// merges, when it drains, and where it goes.
pub struct Definition {
    pub graph_type: String,
    pub sources: Arc<dyn SourceFactory>,
    pub sinks: Arc<dyn SinkFactory>,
    pub transform: Arc<dyn Transform>,
    pub group_by: Arc<dyn GroupBy>,
    pub window: WindowKind,
    pub merger: Arc<dyn Merger>,
    pub trigger: TriggerSpec,
}

impl Definition {
    pub fn builder(graph_type: impl Into<String>) -> DefinitionBuilder {
        DefinitionBuilder {
            graph_type: graph_type.into(),
            sources: None,
            sinks: None,
            transform: None,
            group_by: None,
            window: None,
            merger: None,
            trigger: None,
        }
    }
}

#[derive(Default)]
pub struct DefinitionBuilder {
    graph_type: String,
    sources: Option<Arc<dyn SourceFactory>>,
    sinks: Option<Arc<dyn SinkFactory>>,
    transform: Option<Arc<dyn Transform>>,
    group_by: Option<Arc<dyn GroupBy>>,
    window: Option<WindowKind>,
    merger: Option<Arc<dyn Merger>>,
    trigger: Option<TriggerSpec>,
}

impl DefinitionBuilder {
    pub fn sources(mut self, sources: Arc<dyn SourceFactory>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn sinks(mut self, sinks: Arc<dyn SinkFactory>) -> Self {
        self.sinks = Some(sinks);
        self
    }

    pub fn transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn group_by(mut self, group_by: Arc<dyn GroupBy>) -> Self {
        self.group_by = Some(group_by);
        self
    }

    pub fn window(mut self, window: WindowKind) -> Self {
        self.window = Some(window);
        self
    }

    pub fn merger(mut self, merger: Arc<dyn Merger>) -> Self {
        self.merger = Some(merger);
        self
    }

    pub fn trigger(mut self, trigger: TriggerSpec) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn build(self) -> Result<Definition, GraphError> {
        if self.graph_type.is_empty() {
            return Err(GraphError::Config("graph type must not be empty".into()));
        }
        Ok(Definition {
            graph_type: self.graph_type,
            sources: self
                .sources
                .ok_or_else(|| GraphError::Config("sources not set".into()))?,
            sinks: self
                .sinks
                .ok_or_else(|| GraphError::Config("sinks not set".into()))?,
            transform: self
                .transform
                .ok_or_else(|| GraphError::Config("transform not set".into()))?,
            group_by: self
                .group_by
                .ok_or_else(|| GraphError::Config("group_by not set".into()))?,
            window: self
                .window
                .ok_or_else(|| GraphError::Config("window not set".into()))?,
            merger: self
                .merger
                .ok_or_else(|| GraphError::Config("merger not set".into()))?,
            trigger: self
                .trigger
                .ok_or_else(|| GraphError::Config("trigger not set".into()))?,
        })
    }
}

/// The process-wide `type -> Definition` table. Registration happens once at
/// startup, before any actor spawns; after that the table is read-only.
pub struct GraphRegistry {
    definitions: RwLock<HashMap<String, Arc<Definition>>>,
}

impl Default for GraphRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, def: Definition) -> Result<(), GraphError> {
        let mut definitions = self.definitions.write().unwrap();
        if definitions.contains_key(&def.graph_type) {
            return Err(GraphError::DuplicateGraphType(def.graph_type));
        }
        definitions.insert(def.graph_type.clone(), Arc::new(def));
        Ok(())
    }

    pub fn get(&self, graph_type: &str) -> Result<Arc<Definition>, GraphError> {
        self.definitions
            .read()
            .unwrap()
            .get(graph_type)
            .cloned()
            .ok_or_else(|| GraphError::UnknownGraphType(graph_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use floe_state::DrainSink;
    use std::time::Duration;

    struct NoSources;
    impl SourceFactory for NoSources {
        fn setup(
            &self,
            _graph_type: &str,
            _graph_name: &str,
            _config: &[u8],
        ) -> Result<Vec<Box<dyn crate::source::Source>>, GraphError> {
            Ok(vec![])
        }
    }

    struct NoSinks;
    impl SinkFactory for NoSinks {
        fn setup(
            &self,
            _graph_type: &str,
            _graph_name: &str,
            _config: &[u8],
        ) -> Result<Vec<Arc<dyn DrainSink>>, GraphError> {
            Ok(vec![])
        }
    }

    struct Identity;
    impl Transform for Identity {
        fn transform(&self, value: floe_window::Value) -> Result<Vec<Event>, GraphError> {
            Ok(vec![Event {
                id: "x".into(),
                timestamp: chrono::Utc::now(),
                message: value,
            }])
        }
    }

    struct SingleKey;
    impl GroupBy for SingleKey {
        fn keys(&self, _event: &Event) -> Vec<String> {
            vec!["k".into()]
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = GraphRegistry::new();
        let def = Definition::builder("word-count")
            .sources(Arc::new(NoSources))
            .sinks(Arc::new(NoSinks))
            .transform(Arc::new(Identity))
            .group_by(Arc::new(SingleKey))
            .window(WindowKind::All)
            .merger(Arc::new(floe_merge::Cons))
            .trigger(TriggerSpec::AtPeriod(Duration::from_secs(1)))
            .build()
            .unwrap();
        registry.register(def).unwrap();

        let dup = Definition::builder("word-count")
            .sources(Arc::new(NoSources))
            .sinks(Arc::new(NoSinks))
            .transform(Arc::new(Identity))
            .group_by(Arc::new(SingleKey))
            .window(WindowKind::All)
            .merger(Arc::new(floe_merge::Cons))
            .trigger(TriggerSpec::AtPeriod(Duration::from_secs(1)))
            .build()
            .unwrap();
        assert!(matches!(
            registry.register(dup),
            Err(GraphError::DuplicateGraphType(_))
        ));
    }

    #[test]
    fn unknown_graph_type_errors() {
        let registry = GraphRegistry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(GraphError::UnknownGraphType(_))
        ));
    }

    #[test]
    fn builder_rejects_missing_fields() {
        let err = Definition::builder("incomplete").build().unwrap_err();
        assert!(matches!(err, GraphError::Config(_)));
    }
}
