//! Debounced autosave for an open document.
//!
//! [`machine`] holds the transition rules with no clock or I/O attached;
//! [`coordinator`] drives them from a tokio task per document, and
//! [`persister`] connects a coordinator to the design store.

pub mod coordinator;
pub mod machine;
pub mod persister;

pub use coordinator::{
    AutosaveConfig, AutosaveCoordinator, AutosaveHandle, DocumentEditor, DocumentPersister,
    SaveError,
};
pub use machine::{AutosaveMachine, SaveSnapshot, SaveStatus};
pub use persister::StorePersister;
