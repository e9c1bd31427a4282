//! HTTP handlers for entity CRUD and service verbs.

pub mod entity;
pub mod service;
