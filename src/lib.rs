//! # Brainbase MCP Server
//!
//! A Model-Context-Protocol (MCP) server that indexes brainbase entities
//! (projects, people, orgs, RACI, apps, customers, decisions) and serves them
//! to an LLM.
//!
//! ## Features
//!
//! - Parse a codex tree of markdown files with YAML frontmatter into entities,
//!   including the app, customer and RACI tables kept as markdown tables
//! - Fetch the same entities from the Graph API, optionally filtered by project code
//! - Merge both sources in hybrid mode, the Graph API winning on shared fields
//! - Serve lookups, listings, alias resolution, keyword search and topic
//!   context over an immutable index snapshot that is swapped wholesale on refresh
//!
//! ## Modules
//!
//! - `config`: source mode and settings, validated at startup
//! - `document`: frontmatter parsing, path-derived identity and markdown tables
//! - `entity`: the merged entity record
//! - `sources`: filesystem and Graph API adapters
//! - `index`: index building, hybrid merge and the snapshot store
//! - `server`: MCP tools over the index

/// Source mode and settings
pub mod config;
/// Frontmatter parsing and identity
pub mod document;
/// Entity records
pub mod entity;
/// Error and warning types
pub mod error;
/// Index building and querying
pub mod index;
/// MCP tools
pub mod server;
/// Filesystem and Graph API adapters
pub mod sources;
