//! AI-assisted financial CRM backend.
//!
//! A REST layer over a relational store of clients and transactions, with a
//! pass-through integration to an external chat-completion API for
//! natural-language Q&A over a client's financial context.
//!
//! The store can carry one of two physical layouts: the "banking" layout
//! produced by the external multi-bank import, or the "CRM" layout created by
//! this service itself. The repositories detect the live layout on every call
//! and adapt their queries, so the same deployment works against either.

pub mod ai;
pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod models;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
