//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and map one kind of failure to
//! one code so scripts can branch on them.

#![allow(dead_code)]

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Prerequisite error - a required command or the cluster is missing
pub const PREREQUISITE_ERROR: i32 = 10;

/// Configuration error - credentials or configuration missing or invalid
pub const CONFIGURATION_ERROR: i32 = 11;

/// Command error - an external command executed but failed
pub const COMMAND_ERROR: i32 = 12;

/// Validation error - the cluster rejected a resource or never became ready
pub const VALIDATION_ERROR: i32 = 13;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;

/// Interrupted - the operation was cancelled by the user
pub const INTERRUPTED: i32 = 130;
