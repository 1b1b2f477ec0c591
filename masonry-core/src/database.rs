use crate::{
    Brick, Dialect, Entity, Error, Executor, GenericDialect, IdGenerator, KeySelector, Model,
    Pipelines, Registry, Result, ShardSelector, Stage, Value,
};
use std::{collections::HashMap, fmt, sync::Arc};

struct Inner {
    registry: Registry,
    dialect: Arc<dyn Dialect>,
    shards: Vec<Arc<dyn Executor>>,
    selector: Arc<dyn ShardSelector>,
    id_generators: HashMap<String, Arc<dyn IdGenerator>>,
    pipelines: Pipelines,
}

/// Shared handle to the executors, models and pipelines of one logical database.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }

    /// Single executor database.
    pub fn new(executor: impl Executor + 'static, dialect: impl Dialect + 'static) -> Result<Self> {
        Self::builder().dialect(dialect).executor(executor).build()
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }
    pub fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect.as_ref()
    }
    pub fn pipelines(&self) -> &Pipelines {
        &self.inner.pipelines
    }
    /// Number of shards, one for a plain database.
    pub fn shards(&self) -> usize {
        self.inner.shards.len()
    }
    pub fn executor(&self, shard: usize) -> Result<&dyn Executor> {
        self.inner
            .shards
            .get(shard)
            .map(|v| v.as_ref())
            .ok_or_else(|| {
                Error::msg(format!(
                    "Shard {shard} does not exist, the database has {}",
                    self.shards()
                ))
            })
    }
    pub fn select_shard(&self, key: &Value) -> Result<usize> {
        self.inner.selector.select(key, self.shards())
    }
    pub fn id_generator(&self, model: &str) -> Option<&dyn IdGenerator> {
        self.inner.id_generators.get(model).map(|v| v.as_ref())
    }

    pub fn model<T: Entity>(&self) -> Result<Arc<Model>> {
        self.registry().model::<T>()
    }
    pub fn register(&self, model: Model) -> Result<Arc<Model>> {
        self.registry().register(model)
    }

    /// Query builder over `T`.
    pub fn brick<T: Entity>(&self) -> Result<Brick> {
        Ok(Brick::new(self.clone(), self.model::<T>()?))
    }
    /// Query builder over a model registered by name.
    pub fn brick_named(&self, model: &str) -> Result<Brick> {
        Ok(Brick::new(self.clone(), self.registry().by_name(model)?))
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.inner.dialect.name())
            .field("shards", &self.shards())
            .field("id_generators", &self.inner.id_generators.keys())
            .finish()
    }
}

#[derive(Default)]
pub struct DatabaseBuilder {
    dialect: Option<Arc<dyn Dialect>>,
    shards: Vec<Arc<dyn Executor>>,
    selector: Option<Arc<dyn ShardSelector>>,
    id_generators: HashMap<String, Arc<dyn IdGenerator>>,
    pipelines: Vec<(String, Vec<Stage>)>,
}

impl DatabaseBuilder {
    pub fn dialect(mut self, dialect: impl Dialect + 'static) -> Self {
        self.dialect = Some(Arc::new(dialect));
        self
    }
    /// Adds a shard, same as [`DatabaseBuilder::shard`].
    pub fn executor(self, executor: impl Executor + 'static) -> Self {
        self.shard(executor)
    }
    /// Adds a shard, shards are numbered in the order they are added.
    pub fn shard(mut self, executor: impl Executor + 'static) -> Self {
        self.shards.push(Arc::new(executor));
        self
    }
    pub fn shared_shard(mut self, executor: Arc<dyn Executor>) -> Self {
        self.shards.push(executor);
        self
    }
    pub fn selector(mut self, selector: impl ShardSelector + 'static) -> Self {
        self.selector = Some(Arc::new(selector));
        self
    }
    /// Generates the primary keys of the model named `model`.
    pub fn id_generator(
        mut self,
        model: impl Into<String>,
        generator: impl IdGenerator + 'static,
    ) -> Self {
        self.id_generators.insert(model.into(), Arc::new(generator));
        self
    }
    /// Replaces the stages of `operation`.
    pub fn pipeline(mut self, operation: impl Into<String>, stages: Vec<Stage>) -> Self {
        self.pipelines.push((operation.into(), stages));
        self
    }

    pub fn build(self) -> Result<Database> {
        if self.shards.is_empty() {
            return Err(Error::msg("A database needs at least one executor"));
        }
        let pipelines = Pipelines::default();
        for (operation, stages) in self.pipelines {
            pipelines.set(operation, stages);
        }
        let dialect = self.dialect.unwrap_or_else(|| Arc::new(GenericDialect));
        log::debug!(
            "Database with {} shard(s) using the {} dialect",
            self.shards.len(),
            dialect.name()
        );
        Ok(Database {
            inner: Arc::new(Inner {
                registry: Registry::new(),
                dialect,
                shards: self.shards,
                selector: self.selector.unwrap_or_else(|| Arc::new(KeySelector)),
                id_generators: self.id_generators,
                pipelines,
            }),
        })
    }
}
