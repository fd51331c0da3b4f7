// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The setter pipeline: the single entry point through which every
//! configuration change flows, whatever its origin.
//!
//! A change is resolved, permission-checked, arbitrated against the
//! provenance of the current value, parsed, validated, and finally applied
//! transactionally. Callers that apply values from non-interactive sources
//! (the configuration file, database or role defaults) downgrade errors to
//! warnings and keep the previous value; interactive callers surface the
//! error to the client.

use std::sync::Arc;

use crate::errors::VarError;
use crate::registry::VarRegistry;
use crate::stack::StackedValue;
use crate::value::VarInput;
use crate::var::{SetAction, VarContext, VarFlags, VarSource};

/// The disposition of a successful call into the setter pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOutcome {
    /// The change was applied to the live value.
    Applied,
    /// The value was acceptable but nothing was changed: the call was a dry
    /// run, the proposed source was outranked, or the change was deferred
    /// to a later restart or connection.
    NotApplied,
}

/// Collaborator that propagates applied settings to the other nodes of a
/// distributed deployment. The registry hands it a ready-made instruction;
/// delivery is the collaborator's problem.
pub trait SettingForwarder {
    /// Called after a session-originated change is applied locally.
    /// `value` is the canonical form of the new value, or `None` for a
    /// reset.
    fn forward(&mut self, name: &str, value: Option<&str>, action: SetAction);
}

/// One entry parsed out of the configuration file by the external lexer.
#[derive(Clone, Debug)]
pub struct FileSetting {
    /// The variable name, as written.
    pub name: String,
    /// The value, as written.
    pub value: String,
    /// The file the entry came from.
    pub file: String,
    /// The line the entry starts on.
    pub line: u32,
}

impl VarRegistry {
    /// Sets, resets, or validates one configuration variable.
    ///
    /// `value` of `None` resets the variable: to its reset default for any
    /// ordinary source, or to its compiled-in default when `source` is
    /// [`VarSource::Default`]. When `change_val` is false the value is
    /// validated but nothing is mutated. `is_reload` marks replays of
    /// previously accepted state (configuration reload, worker restore), in
    /// which startup-only variables are accepted even though the session is
    /// past startup.
    ///
    /// Returns [`SetOutcome::Applied`] when the live value was changed,
    /// [`SetOutcome::NotApplied`] for an acceptable value that was not
    /// installed, and an error when the change is rejected.
    pub fn set_option(
        &mut self,
        name: &str,
        value: Option<VarInput>,
        context: VarContext,
        source: VarSource,
        action: SetAction,
        change_val: bool,
        is_reload: bool,
    ) -> Result<SetOutcome, VarError> {
        let mut change_val = change_val;

        // Resolve the name, creating a placeholder for a qualified name
        // that no extension has registered yet.
        let idx = match self.find(name) {
            Some(idx) => idx,
            None => match self.create_placeholder(name) {
                Some(idx) => idx,
                None => return Err(VarError::UnknownParameter(name.to_owned())),
            },
        };
        let vname = self.vars[idx].name.as_str().to_owned();

        // Permission check, keyed by (variable context, calling context).
        {
            let entry = &self.vars[idx];
            match entry.context {
                VarContext::Internal => {
                    if context != VarContext::Internal {
                        return Err(VarError::ReadOnlyParameter(vname));
                    }
                }
                VarContext::ServerStart => match context {
                    VarContext::ServerStart => {}
                    // A reload may re-offer the value; it is compared
                    // against the live value after parsing, below.
                    VarContext::Reload => {}
                    _ => return Err(VarError::CannotChangeWithoutRestart(vname)),
                },
                VarContext::Reload => {
                    if !matches!(context, VarContext::ServerStart | VarContext::Reload) {
                        return Err(VarError::CannotChangeNow(vname));
                    }
                }
                VarContext::SuperuserStartup | VarContext::Startup => {
                    if entry.context == VarContext::SuperuserStartup
                        && context == VarContext::Startup
                    {
                        return Err(VarError::PermissionDenied(vname));
                    }
                    match context {
                        VarContext::Reload => {
                            // The configuration file may name startup
                            // variables. The new value only matters to
                            // future connections; defer without erroring.
                            if change_val {
                                return Ok(SetOutcome::NotApplied);
                            }
                        }
                        VarContext::ServerStart
                        | VarContext::SuperuserStartup
                        | VarContext::Startup => {}
                        _ if source == VarSource::Client || is_reload => {}
                        _ => return Err(VarError::CannotChangeAfterStart(vname)),
                    }
                }
                VarContext::Superuser => {
                    if matches!(context, VarContext::User | VarContext::Startup) {
                        return Err(VarError::PermissionDenied(vname));
                    }
                }
                VarContext::User => {}
            }
            if entry.flags.contains(VarFlags::NOT_WHILE_SECURITY_RESTRICTED)
                && self.security_restricted
            {
                return Err(VarError::SecurityRestricted(vname));
            }
        }

        // Priority arbitration. A source that establishes defaults still
        // gets to update the reset and stacked slots even when the live
        // value outranks it.
        let make_default = change_val
            && source.establishes_default()
            && (value.is_some() || source == VarSource::Default);
        if self.vars[idx].source > source {
            if change_val && !make_default {
                tracing::debug!(
                    "parameter \"{}\": setting ignored because previous source is higher priority",
                    vname
                );
                return Ok(SetOutcome::NotApplied);
            }
            change_val = false;
        }

        // Parse, bound-check, and run the check hook. Nothing is mutated
        // until the value is fully validated, so a failure here leaves the
        // variable untouched.
        let (new_value, new_extra, new_source, new_scontext) = match value {
            Some(input) => {
                let entry = &self.vars[idx];
                let flat = input.flatten(&vname, entry.flags.contains(VarFlags::LIST_INPUT))?;
                let mut parsed = entry.spec.parse(&vname, &flat)?;
                let mut extra = None;
                if let Some(check) = entry.check {
                    check(&mut parsed, &mut extra, source).map_err(|failure| {
                        VarError::InvalidParameterValue {
                            name: vname.clone(),
                            value: flat.clone().into_owned(),
                            failure: Some(failure),
                        }
                    })?;
                }
                (parsed, extra, source, context)
            }
            None if source == VarSource::Default => {
                // Reinitialize to the compiled-in default.
                let entry = &self.vars[idx];
                (
                    entry.boot_val.clone(),
                    None,
                    VarSource::Default,
                    VarContext::Internal,
                )
            }
            None => {
                // RESET: return to the reset slot, restoring its
                // provenance. The reset value was validated when it was
                // established, so the check hook is not re-run.
                let entry = &self.vars[idx];
                (
                    entry.reset_val.clone(),
                    entry.reset_extra.clone(),
                    entry.reset_source,
                    entry.reset_scontext,
                )
            }
        };

        // A start-only variable observed during a reload: an unchanged
        // value succeeds as a no-op; a changed one is refused quietly, and
        // the variable remembers that a restart would pick it up.
        if self.vars[idx].context == VarContext::ServerStart && context == VarContext::Reload {
            let entry = &mut self.vars[idx];
            if entry.value == new_value {
                entry.pending_restart = false;
            } else if change_val {
                entry.pending_restart = true;
                tracing::warn!(
                    "parameter \"{}\" cannot be changed without restarting the server",
                    vname
                );
            }
            return Ok(SetOutcome::NotApplied);
        }

        // Apply.
        let reporting = self.reporting_enabled;
        let nest_level = self.nest_level;
        let mut applied = false;
        {
            let entry = &mut self.vars[idx];
            if change_val {
                // Default-tier updates are not transactional; everything
                // else first saves the current state for rollback.
                if !make_default {
                    entry.push_old_value(action, nest_level);
                }
                let changed = entry.restore_value(
                    new_value.clone(),
                    new_extra.clone(),
                    new_source,
                    new_scontext,
                );
                if entry.source != VarSource::File {
                    entry.source_file = None;
                    entry.source_line = None;
                }
                if changed && reporting && entry.flags.contains(VarFlags::REPORT) {
                    entry.report_pending = true;
                }
                applied = true;
            }
            if make_default {
                // Propagate the new default into the reset slot and into
                // every stacked state it outranks, so a later RESET inside
                // those levels lands on the new default.
                if entry.reset_source <= new_source {
                    entry.reset_val = new_value.clone();
                    entry.reset_extra = new_extra.clone();
                    entry.reset_source = new_source;
                    entry.reset_scontext = new_scontext;
                }
                for frame in &mut entry.stack {
                    if frame.source <= new_source {
                        frame.prior = StackedValue {
                            value: new_value.clone(),
                            extra: new_extra.clone(),
                        };
                        frame.source = new_source;
                        frame.scontext = new_scontext;
                    }
                }
            }
        }

        // Hand the applied setting to the cluster forwarder when the change
        // came from an interactive session.
        if applied
            && source == VarSource::Session
            && matches!(context, VarContext::User | VarContext::Superuser)
            && self.forwarder.is_some()
        {
            let display = value.map(|_| self.vars[idx].display_value());
            if let Some(forwarder) = self.forwarder.as_mut() {
                forwarder.forward(&vname, display.as_deref(), action);
            }
        }

        Ok(if applied {
            SetOutcome::Applied
        } else {
            SetOutcome::NotApplied
        })
    }

    /// Sets a variable from an interactive session: `SET` or `SET LOCAL`.
    pub fn set(
        &mut self,
        name: &str,
        input: VarInput,
        context: VarContext,
        local: bool,
    ) -> Result<SetOutcome, VarError> {
        let action = if local {
            SetAction::Local
        } else {
            SetAction::Set
        };
        self.set_option(
            name,
            Some(input),
            context,
            VarSource::Session,
            action,
            true,
            false,
        )
    }

    /// Installs a value from a default-establishing source: startup
    /// computation, environment, configuration file, or cluster, database,
    /// or role defaults. Callers applying batches from non-interactive
    /// sources should downgrade errors to warnings and continue.
    pub fn set_default(
        &mut self,
        name: &str,
        input: VarInput,
        context: VarContext,
        source: VarSource,
    ) -> Result<SetOutcome, VarError> {
        self.set_option(name, Some(input), context, source, SetAction::Set, true, false)
    }

    /// Resets a variable to its session default: `RESET`.
    pub fn reset(&mut self, name: &str, context: VarContext) -> Result<SetOutcome, VarError> {
        self.set_option(
            name,
            None,
            context,
            VarSource::Session,
            SetAction::Set,
            true,
            false,
        )
    }

    /// Resets every session-settable variable that was set in this session:
    /// `RESET ALL`. Variables flagged as excluded are left alone.
    pub fn reset_all(&mut self) {
        let nest_level = self.nest_level;
        let reporting = self.reporting_enabled;
        for entry in &mut self.vars {
            if !matches!(entry.context, VarContext::User | VarContext::Superuser) {
                continue;
            }
            if entry.flags.contains(VarFlags::NO_RESET_ALL) {
                continue;
            }
            if entry.source != VarSource::Session {
                continue;
            }
            entry.push_old_value(SetAction::Set, nest_level);
            let value = entry.reset_val.clone();
            let extra = entry.reset_extra.clone();
            let source = entry.reset_source;
            let scontext = entry.reset_scontext;
            let changed = entry.restore_value(value, extra, source, scontext);
            if changed && reporting && entry.flags.contains(VarFlags::REPORT) {
                entry.report_pending = true;
            }
        }
    }

    /// Validates a proposed value without applying it. Used by durable
    /// override machinery and role-default assignment to test acceptability
    /// before committing to anything.
    pub fn validate(
        &mut self,
        name: &str,
        input: VarInput,
        context: VarContext,
    ) -> Result<(), VarError> {
        self.set_option(
            name,
            Some(input),
            context,
            VarSource::Session,
            SetAction::Set,
            false,
            false,
        )
        .map(|_| ())
    }

    /// Applies an ordered batch of configuration-file entries, as produced
    /// by the external file parser. A malformed entry is logged and
    /// skipped; it never aborts the batch and the variable keeps its
    /// previous value.
    pub fn apply_file_settings(&mut self, settings: &[FileSetting]) {
        for setting in settings {
            match self.set_option(
                &setting.name,
                Some(VarInput::Flat(&setting.value)),
                VarContext::Reload,
                VarSource::File,
                SetAction::Set,
                true,
                true,
            ) {
                Ok(_) => {
                    if let Some(idx) = self.find(&setting.name) {
                        let entry = &mut self.vars[idx];
                        if entry.source == VarSource::File {
                            entry.source_file = Some(Arc::from(setting.file.as_str()));
                            entry.source_line = Some(setting.line);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        "configuration file entry for \"{}\" ({}:{}) ignored: {}",
                        setting.name,
                        setting.file,
                        setting.line,
                        err
                    );
                }
            }
        }
    }
}
