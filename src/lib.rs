pub mod classify;
pub mod config;
pub mod domain;
pub mod mail;
pub mod pipeline;
pub mod store;
pub mod web;
