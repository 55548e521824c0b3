//! The database container.

use crate::cache::ResultCache;
use crate::executor::Executor;
use crate::hooks::FieldHooks;
use crate::values::EntityValues;
use relmodel_core::{Config, ConnectionFactory, Dialect, Result};
use relmodel_query::{Persist, Select};
use relmodel_schema::{InformationSchemaReader, Model, ModelBuilder};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Model, configuration and connection factory, plus the shared result
/// cache and field hooks. Cheap to clone; clones share everything.
///
/// # Example
///
/// ```ignore
/// let db = Db::connect(config, Arc::new(open_connection))?;
/// let people = db.executor().rows(&db.sql("person")?.where_("$name LIKE @0").parameter("A%"))?;
/// ```
#[derive(Clone)]
pub struct Db {
    model: Arc<Model>,
    config: Arc<Config>,
    factory: Arc<dyn ConnectionFactory>,
    cache: Arc<ResultCache>,
    hooks: Arc<FieldHooks>,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("dialect", &self.config.dialect)
            .field("entities", &self.model.entity_names().count())
            .field("cached", &self.cache.len())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Db {
    pub fn new(model: Arc<Model>, config: Config, factory: Arc<dyn ConnectionFactory>) -> Self {
        let ttl = config.cache_ttl_secs.map(Duration::from_secs);
        Self {
            model,
            config: Arc::new(config),
            factory,
            cache: Arc::new(ResultCache::new(ttl)),
            hooks: Arc::new(FieldHooks::new()),
        }
    }

    /// Introspect the database and build the model.
    ///
    /// When `doc_path` is configured, a schema snapshot is written there.
    #[tracing::instrument(level = "debug", skip_all, fields(dialect = %config.dialect))]
    pub fn connect(config: Config, factory: Arc<dyn ConnectionFactory>) -> Result<Self> {
        let mut conn = factory.open()?;
        let model = {
            let mut reader = InformationSchemaReader::new(conn.as_mut(), config.db_name.clone());
            ModelBuilder::new(config.clone()).build(&mut reader)?
        };
        drop(conn);
        if let Some(dir) = &config.doc_path {
            model.write_snapshot(dir)?;
        }
        Ok(Self::new(Arc::new(model), config, factory))
    }

    pub fn with_hooks(mut self, hooks: FieldHooks) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn hooks(&self) -> &Arc<FieldHooks> {
        &self.hooks
    }

    /// A SELECT builder over `entity`.
    pub fn sql(&self, entity: &str) -> Result<Select> {
        Select::new(Arc::clone(&self.model), self.dialect(), entity)
    }

    pub fn persist(&self) -> Persist {
        Persist::new(Arc::clone(&self.model), self.dialect())
    }

    /// An executor sharing this container's cache.
    pub fn executor(&self) -> Executor {
        Executor::new(Arc::clone(&self.model), self.dialect(), Arc::clone(&self.factory))
            .with_cache(Arc::clone(&self.cache))
            .with_db_name(self.config.db_name.clone())
    }

    /// An empty value store for `entity`.
    pub fn values(&self, entity: &str) -> Result<EntityValues> {
        Ok(EntityValues::new(Arc::clone(&self.model), entity)?.with_db(self.clone()))
    }
}
