// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Typed, transactional configuration variables.
//!
//! This crate follows the PostgreSQL configuration model. There is a global
//! set of named configuration parameters, like `work_mem` and
//! `application_name`. These parameters can be set in several places: in an
//! on-disk configuration file, in environment variables, in per-database or
//! per-role defaults, in the client's startup packet, or at runtime via the
//! `SET` statement. Values set in a session take precedence over role
//! defaults, which take precedence over database defaults, which take
//! precedence over settings in the on-disk configuration, and so on down a
//! totally ordered provenance hierarchy ([`VarSource`]).
//!
//! Changing a parameter obeys transaction semantics: if a transaction fails
//! to commit, any parameters it changed via `SET` roll back to their
//! previous values, and `SET LOCAL` changes never outlive the
//! subtransaction or savepoint that made them, even on commit. The
//! per-variable rollback stack that implements this is described in the
//! `stack` module.
//!
//! The registry ([`VarRegistry`]) is an explicitly constructed service
//! object: exactly one exists per process, owned by the session or worker
//! that uses it, and all access happens on that process's own execution
//! path. Nothing here blocks, awaits, or performs I/O; reporting changed
//! values to the client is a queue the wire layer drains.
//!
//! Variables an extension has not registered yet can still be referenced by
//! qualified name (`myext.knob`); a hidden string-typed placeholder holds
//! the value until the extension loads and registers the real definition,
//! at which point the placeholder's state is replayed onto it.

#![warn(missing_docs)]

mod errors;
mod registry;
mod serialize;
mod set;
mod stack;
mod value;
mod var;

pub use errors::{CheckFailure, VarError};
pub use registry::{VarAlias, VarRegistry};
pub use set::{FileSetting, SetOutcome, SettingForwarder};
pub use value::{ValueSpec, VarInput, VarUnit, VarValue};
pub use var::{
    AssignHook, CheckHook, SetAction, ShowHook, Var, VarContext, VarDefault, VarDefinition,
    VarEntry, VarExtra, VarFlags, VarGroup, VarSource,
};
