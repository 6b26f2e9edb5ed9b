#![doc = "lessonkit-core: core logic library for lessonkit."]

//! This crate contains all document and AI logic for lessonkit. Transport
//! (HTTP provider clients, command-line parsing, config files) lives in the
//! `lessonkit` crate.
//!
//! # Layout
//! - [`store`]: the filesystem-backed artifact store (uploads, outputs, scratch)
//! - [`ingest`]: bounded, chunked persistence of incoming payloads
//! - [`pdf`] and [`pages`]: partitioning, compression, bundling and the other PDF operations
//! - [`deck`]: reading, building and editing slide decks
//! - [`contract`] and [`provider`]: the text provider seam and the fallback chain over it
//! - [`repair`]: recovery of structured payloads from model output
//! - [`assistant`] and [`content`]: the AI services built on the chain

pub mod assistant;
pub mod config;
pub mod content;
pub mod contract;
pub mod deck;
pub mod error;
pub mod ingest;
pub mod pages;
pub mod pdf;
pub mod provider;
pub mod repair;
pub mod store;

pub use error::{Error, ErrorClass, Result};
