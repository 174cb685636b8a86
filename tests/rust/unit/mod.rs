//! Unit tests - Document loading without lowering
//!
//! Domain model YAML, SQM statement JSON and parameter binding documents,
//! exercised through the public crate API only.

mod domain_model_yaml_tests;
mod sqm_document_tests;
