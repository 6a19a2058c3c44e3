//! Portaglobe - portable globe serving and publish management
//!
//! This library implements the two halves of a globe publishing server:
//! reading quadtree-addressed packets out of portable globe containers
//! (`.glb`/`.glm` single-layer, `.glc` composite, `.mbt` tile databases),
//! and managing the catalog of which databases are published under which
//! target paths.
//!
//! # High-Level API
//!
//! Tile serving goes through a [`globe::GlobeHandle`] obtained from a
//! [`server::GlobeSessions`] registry:
//!
//! ```ignore
//! use portaglobe::globe::GlobeHandle;
//!
//! let globe = sessions.acquire("/globes/sf.glb")?;
//! let packet = globe.read_imagery_packet(&qtnode, 0)?;
//! ```
//!
//! Publish management goes through [`publish::PublishManager`], which keeps
//! the catalog, the serving registrations and the rewrite rules consistent.

pub mod config;
pub mod globe;
pub mod info;
pub mod locator;
pub mod logging;
pub mod publish;
pub mod quadtree;
pub mod search;
pub mod server;
pub mod unpacker;

/// Version of the portaglobe library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
