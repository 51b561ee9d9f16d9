//! A relational persistence and pub/sub notification layer for deployed
//! blueprint graphs: instances, their owned resources and links, a
//! recursive tree of child instances, exports and metadata, change sets and
//! validation requests, and an append-only event stream keyed by channel.
//!
//! [`Container`] is the single façade; it aggregates eight sub-containers
//! over one shared connection pool.

mod changesets;
mod children;
mod clock;
mod config;
mod container;
mod error;
mod events;
mod exports;
mod ids;
mod instances;
mod json;
mod links;
mod metadata;
mod migrations;
mod model;
mod resources;
mod sql;
#[cfg(test)]
mod test_support;
mod validations;

pub use changesets::Changesets;
pub use children::Children;
pub use clock::{Clock, SystemClock};
pub use config::ContainerOptions;
pub use container::Container;
pub use error::StoreError;
pub use events::{EventStream, Events, StartingPoint};
pub use exports::Exports;
pub use ids::{ChangesetId, ChannelId, EventId, IdParseError, InstanceId, LinkId, ResourceId, ValidationId};
pub use instances::Instances;
pub use links::Links;
pub use metadata::Metadata;
pub use model::{
    Changeset, ChangesetStatus, DeploymentStatus, Event, Export, FailureReason, Instance,
    InstanceStatusInfo, Link, LinkStatusInfo, PreciseStatus, Resource, ResourceDrift, ResourceMetadata,
    ResourceStatusInfo, Tree, UnknownStatusCode, Validation, ValidationStatus,
};
pub use resources::Resources;
pub use validations::Validations;
