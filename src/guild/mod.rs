//! # Guild Module
//!
//! Per-guild moderation state that outlives a single command:
//!
//! - [`blacklist`] - banned words enforced on every inbound message
//! - [`reaction_roles`] - `{emoji, message} → role` bindings kept in sync with the guild
//!
//! Both stores are explicit objects owned by the bot handler and handed to command
//! handlers by reference. They load everything into memory on startup and persist
//! each mutation through a [`crate::storage::DocumentStore`] before applying it.

pub mod blacklist;
pub mod reaction_roles;

pub use blacklist::{BlacklistDocument, BlacklistError, BlacklistStore, WordChange};
pub use reaction_roles::{ReactionRole, ReactionRoleDocument, ReactionRoleError, ReactionRoleStore};
