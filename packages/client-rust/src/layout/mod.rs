//! Persisted column layouts.
//!
//! [`LayoutController`] holds one screen's live [`ColumnLayoutState`] and
//! talks to a [`LayoutStorage`] adapter. The state changes in memory on every
//! user action; it reaches storage only through a confirmed save.
//!
//! [`ColumnLayoutState`]: backoffice_core::ColumnLayoutState

pub mod controller;
pub mod storage;

pub use controller::{LayoutController, LayoutSnapshot};
pub use storage::{FileLayoutStorage, LayoutStorage, MemoryLayoutStorage};
