//! Data models: templates, geometry, reference images and configuration.

pub mod config;
pub mod geometry;
pub mod snippet;
pub mod template;
