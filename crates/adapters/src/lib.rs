//! `adapters` crate: the `ProviderAdapter` trait and the built-in provider
//! implementations.
//!
//! Every provider (LLM chat, Google Workspace, transactional email, generic
//! HTTP, pure transforms, flow control, the webhook trigger) implements
//! [`ProviderAdapter`]. The engine crate resolves a node to a
//! [`Provider`]/[`OperationId`] pair and dispatches through this trait object.

pub mod condition;
pub mod config;
pub mod context;
pub mod credentials;
pub mod email;
pub mod error;
pub mod flow;
pub mod google;
pub mod http;
pub mod http_request;
pub mod mock;
pub mod openai;
pub mod operation;
pub mod path;
pub mod result;
pub mod settings;
pub mod traits;
pub mod transform;
pub mod webhook;

pub use context::{ExecutionContext, LoopFrame};
pub use credentials::{CredentialBundle, CredentialKind, CredentialLookup};
pub use error::NodeError;
pub use operation::{OperationId, Provider};
pub use result::{FlowDecision, OperationError, OperationMetadata, OperationResult};
pub use settings::{builtin_adapters, AdapterSettings};
pub use traits::ProviderAdapter;
