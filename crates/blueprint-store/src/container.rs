//! The `Container` façade.
//!
//! One composite struct holding a typed handle to each of the eight
//! sub-containers. All of them share one connection pool; none of them
//! needs to be a trait object, since the relational backend is the only one
//! this crate implements, so there's no need for `async_trait`/`dyn` here.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::changesets::Changesets;
use crate::children::Children;
use crate::clock::{Clock, SystemClock};
use crate::config::ContainerOptions;
use crate::error::StoreError;
use crate::events::Events;
use crate::exports::Exports;
use crate::instances::Instances;
use crate::links::Links;
use crate::metadata::Metadata;
use crate::migrations::MIGRATIONS;
use crate::resources::Resources;
use crate::validations::Validations;

/// The façade aggregating all eight sub-containers over a shared pool.
#[derive(Clone)]
pub struct Container {
    instances: Instances,
    resources: Resources,
    links: Links,
    children: Children,
    exports: Exports,
    metadata: Metadata,
    events: Events,
    changesets: Changesets,
    validations: Validations,
    pool: PgPool,
}

impl Container {
    /// Connect to Postgres and run schema migrations, using the system
    /// clock and default options.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with(url, Arc::new(SystemClock), ContainerOptions::default()).await
    }

    /// Connect with an injected clock and options — a loader taking the
    /// pool, a logger, a clock, and options. Logging is ambient via
    /// `tracing` rather than an injected logger object.
    pub async fn connect_with(
        url: &str,
        clock: Arc<dyn Clock>,
        options: ContainerOptions,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().connect(url).await?;
        let container = Self::new(pool, clock, options);
        container.migrate().await?;
        Ok(container)
    }

    /// Build a container over an already-open pool (e.g. one shared with
    /// other components, or a test pool). Does not run migrations; call
    /// [`Container::migrate`] explicitly if needed.
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, options: ContainerOptions) -> Self {
        Self {
            instances: Instances::new(pool.clone()),
            resources: Resources::new(pool.clone()),
            links: Links::new(pool.clone()),
            children: Children::new(pool.clone()),
            exports: Exports::new(pool.clone()),
            metadata: Metadata::new(pool.clone()),
            events: Events::new(pool.clone(), clock, Arc::new(options)),
            changesets: Changesets::new(pool.clone()),
            validations: Validations::new(pool.clone()),
            pool,
        }
    }

    /// Run all DDL migrations. Safe to call on every startup — every
    /// statement is `IF NOT EXISTS` / `CREATE OR REPLACE`.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(MIGRATIONS).execute(&self.pool).await?;
        Ok(())
    }

    /// One round trip against the pool, for an embedding process's health
    /// checks — a natural complement to `migrate`.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn instances(&self) -> &Instances {
        &self.instances
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn links(&self) -> &Links {
        &self.links
    }

    pub fn children(&self) -> &Children {
        &self.children
    }

    pub fn exports(&self) -> &Exports {
        &self.exports
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    pub fn changesets(&self) -> &Changesets {
        &self.changesets
    }

    pub fn validations(&self) -> &Validations {
        &self.validations
    }
}
