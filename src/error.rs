// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
  #[error("IO Error: {0}")]
  Io(#[from] std::io::Error),

  #[error("{0}")]
  Precondition(String),

  #[error("Invalid value for '{name}': {reason}")]
  Validation { name: String, reason: String },

  #[error("Could not evaluate expression `{expr}`: {reason}")]
  Expression { expr: String, reason: String },

  #[error("Template '{name}' failed to render: {reason}")]
  Template { name: String, reason: String },

  #[error("Command '{name}' failed: {reason}")]
  ExternalCommand { name: String, reason: String },

  #[error("Operation cancelled")]
  Aborted,

  #[error("Could not read plugin metadata '{metadata_path}': {source}")]
  MetadataRead {
    metadata_path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Could not parse plugin metadata '{metadata_path}': {source}")]
  MetadataParse {
    metadata_path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("Invalid plugin metadata '{metadata_path}': {reason}")]
  MetadataInvalid {
    metadata_path: PathBuf,
    reason: String,
  },

  #[error("Failed to create output directory '{path}': {source}")]
  OutputDirCreation {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("User interaction failed: {0}")]
  Dialoguer(#[from] dialoguer::Error),
}
