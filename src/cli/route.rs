//! CLI route: run context and command dispatch.

use crate::cli::parse::Commands;
use crate::cli::presentation::{format_info, format_list};
use crate::config::{ConfigLoader, StrataConfig};
use crate::error::CommandError;
use crate::fetch::{FetchRequest, SortDescriptor};
use crate::schema::Schema;
use crate::stack::Stack;
use crate::store::StoreLocation;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Runtime context for CLI execution: resolved config, schema and store location.
pub struct RunContext {
    config: StrataConfig,
    schema: Arc<Schema>,
    location: StoreLocation,
}

impl RunContext {
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, CommandError> {
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(&path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        let schema = config
            .store
            .schema_bundle(&workspace_root)
            .load(&config.store.model)?;
        let location = config.store.location()?;

        Ok(Self {
            config,
            schema: Arc::new(schema),
            location,
        })
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    fn open_stack(&self) -> Result<Stack, CommandError> {
        Ok(Stack::open(
            self.schema.clone(),
            self.location.clone(),
            self.config.store.options(),
        )?)
    }

    pub fn execute(&self, command: &Commands) -> Result<String, CommandError> {
        match command {
            Commands::Info => self.handle_info(),
            Commands::List {
                entity,
                sort,
                desc,
                limit,
            } => self.handle_list(entity, sort.as_deref(), *desc, *limit),
            Commands::Reset { yes } => self.handle_reset(*yes),
        }
    }

    fn handle_info(&self) -> Result<String, CommandError> {
        let stack = self.open_stack()?;
        let coordinator = stack.coordinator();
        Ok(format_info(
            &self.schema,
            &self.location,
            coordinator.journal_mode(),
            &coordinator.entity_counts(),
        ))
    }

    fn handle_list(
        &self,
        entity: &str,
        sort: Option<&str>,
        desc: bool,
        limit: Option<usize>,
    ) -> Result<String, CommandError> {
        let description = self
            .schema
            .entity_named(entity)
            .ok_or_else(|| CommandError::UnknownEntity(entity.to_string()))?;

        let mut request = FetchRequest::new(entity);
        if let Some(key) = sort {
            let descriptor = if desc {
                SortDescriptor::descending(key)
            } else {
                SortDescriptor::ascending(key)
            };
            request = request.sorted_by(vec![descriptor]);
        }
        if let Some(limit) = limit {
            request = request.limited(limit);
        }

        let stack = self.open_stack()?;
        let objects = stack
            .main_context()
            .perform_and_wait(|scope| scope.fetch(&request))?;
        Ok(format_list(description, &objects))
    }

    fn handle_reset(&self, yes: bool) -> Result<String, CommandError> {
        if !yes {
            use dialoguer::Confirm;
            let confirmed = Confirm::new()
                .with_prompt(format!("Destroy every object in the store at {}?", self.location))
                .default(false)
                .interact()
                .map_err(|e| CommandError::Prompt(e.to_string()))?;

            if !confirmed {
                return Ok("Reset cancelled".to_string());
            }
        }

        let stack = self.open_stack()?;
        stack.reset_store_blocking()?;
        info!(location = %self.location, "Store reset from command line");
        Ok(format!("Store at {} reset", self.location))
    }
}
