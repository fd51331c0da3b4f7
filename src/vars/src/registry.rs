// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The variable registry.
//!
//! One registry exists per process. It owns every variable's descriptor and
//! runtime state, keeps them sorted by name for binary-search lookup, and
//! tracks the process-wide pieces of state the setter pipeline consults:
//! the active nesting level, whether client reporting is enabled, and
//! whether a security-restricted operation is in progress.

use std::fmt;

use uncased::UncasedStr;

use crate::errors::VarError;
use crate::set::SettingForwarder;
use crate::stack::StackState;
use crate::value::{ValueSpec, VarInput};
use crate::var::{SetAction, Var, VarDefinition, VarEntry, VarFlags, VarSource};

/// The smallest backing capacity the registry starts with.
const MIN_CAPACITY: usize = 100;

/// A deprecated name and the current name it resolves to.
pub type VarAlias = (&'static UncasedStr, &'static UncasedStr);

/// The process-wide collection of configuration variables.
pub struct VarRegistry {
    pub(crate) vars: Vec<VarEntry>,
    aliases: &'static [VarAlias],
    pub(crate) nest_level: u32,
    pub(crate) reporting_enabled: bool,
    pub(crate) security_restricted: bool,
    pub(crate) forwarder: Option<Box<dyn SettingForwarder>>,
}

impl VarRegistry {
    /// Builds a registry from the given definitions, installing every
    /// variable's compiled-in default.
    ///
    /// Panics if two definitions share a name or if a definition's default
    /// is rejected by its own check hook; both are programming errors in
    /// the definition tables.
    pub fn build(definitions: &[VarDefinition], aliases: &'static [VarAlias]) -> VarRegistry {
        let mut vars = Vec::with_capacity(definitions.len().max(MIN_CAPACITY));
        for def in definitions {
            vars.push(VarEntry::from_definition(def));
        }
        vars.sort_by(|a, b| a.key().cmp(b.key()));
        for pair in vars.windows(2) {
            if pair[0].key() == pair[1].key() {
                panic!("{} registered twice", pair[0].name.as_str());
            }
        }
        VarRegistry {
            vars,
            aliases,
            nest_level: 1,
            reporting_enabled: false,
            security_restricted: false,
            forwarder: None,
        }
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        let key = UncasedStr::new(name);
        self.vars.binary_search_by(|e| e.key().cmp(key))
    }

    /// Looks up a variable by name or deprecated alias.
    pub(crate) fn find(&self, name: &str) -> Option<usize> {
        if let Ok(idx) = self.position(name) {
            return Some(idx);
        }
        let key = UncasedStr::new(name);
        self.aliases
            .iter()
            .find(|(old, _)| **old == *key)
            .and_then(|(_, new)| self.position(new.as_str()).ok())
    }

    /// Inserts an entry, growing the backing array by a quarter when full
    /// and re-sorting. Returns the entry's index after the sort.
    pub(crate) fn insert_entry(&mut self, entry: VarEntry) -> usize {
        if self.vars.len() == self.vars.capacity() {
            let grow = (self.vars.capacity() / 4).max(1);
            self.vars.reserve_exact(grow);
        }
        let name = entry.name.as_str().to_owned();
        self.vars.push(entry);
        self.vars.sort_by(|a, b| a.key().cmp(b.key()));
        self.position(&name).expect("entry was just inserted")
    }

    /// Creates a hidden placeholder for a qualified name, if the name is
    /// well-formed. Unqualified names never get placeholders.
    pub(crate) fn create_placeholder(&mut self, name: &str) -> Option<usize> {
        if !is_qualified_name(name) {
            return None;
        }
        Some(self.insert_entry(VarEntry::placeholder(name)))
    }

    /// Registers an extension-defined variable.
    ///
    /// If a placeholder already exists under the name, the placeholder's
    /// default and every stacked assignment made before the extension
    /// loaded are replayed onto the newly typed variable. Replay failures
    /// (for example, a stored string that does not parse as the new type)
    /// are reported as warnings and never abort registration.
    pub fn define_custom(&mut self, def: &VarDefinition) -> Result<(), VarError> {
        match self.position(def.name.as_str()) {
            Ok(idx) => {
                if !self.vars[idx].is_placeholder() {
                    return Err(VarError::AlreadyDefined(def.name.to_string()));
                }
                let placeholder = self.vars.remove(idx);
                self.insert_entry(VarEntry::from_definition(def));
                self.reapply_placeholder_state(def.name.as_str(), placeholder);
                Ok(())
            }
            Err(_) => {
                self.insert_entry(VarEntry::from_definition(def));
                Ok(())
            }
        }
    }

    /// Replays a displaced placeholder's state onto the typed variable that
    /// replaced it: first the stored default, then the committed session
    /// value if any, then each stacked assignment from oldest to newest.
    fn reapply_placeholder_state(&mut self, name: &str, placeholder: VarEntry) {
        if placeholder.reset_source != VarSource::Default {
            let reset = placeholder.reset_val.format_plain(&ValueSpec::String);
            self.replay_value(
                name,
                &reset,
                placeholder.reset_scontext,
                placeholder.reset_source,
                SetAction::Set,
            );
        }

        let frames = placeholder.stack;
        let live = (
            placeholder.value.clone(),
            placeholder.scontext,
            placeholder.source,
        );

        // The value in effect below the oldest frame. If it differs from the
        // stored default it is a previously committed session value; apply
        // it, then drop the transactional frame the application pushed.
        let (base_val, base_ctx, base_src) = frames
            .first()
            .map(|f| (f.prior.value.clone(), f.scontext, f.source))
            .unwrap_or_else(|| live.clone());
        if base_val != placeholder.reset_val
            || base_ctx != placeholder.reset_scontext
            || base_src != placeholder.reset_source
        {
            let depth = self.stack_depth(name);
            let base = base_val.format_plain(&ValueSpec::String);
            self.replay_value(name, &base, base_ctx, base_src, SetAction::Set);
            if let Some(idx) = self.find(name) {
                let entry = &mut self.vars[idx];
                if entry.stack.len() > depth {
                    entry.stack.pop();
                }
            }
        }

        for (i, frame) in frames.iter().enumerate() {
            let (cur_val, cur_ctx, cur_src) = match frames.get(i + 1) {
                Some(next) => (next.prior.value.clone(), next.scontext, next.source),
                None => live.clone(),
            };
            let cur = cur_val.format_plain(&ValueSpec::String);
            let depth = self.stack_depth(name);
            match frame.state {
                StackState::Save => {
                    self.replay_value(name, &cur, cur_ctx, cur_src, SetAction::Save);
                }
                StackState::Set => {
                    self.replay_value(name, &cur, cur_ctx, cur_src, SetAction::Set);
                }
                StackState::Local => {
                    self.replay_value(name, &cur, cur_ctx, cur_src, SetAction::Local);
                }
                StackState::SetLocal => {
                    let masked = frame.masked.as_ref().expect("set-local frame has a mask");
                    let m = masked.value.format_plain(&ValueSpec::String);
                    self.replay_value(name, &m, masked.scontext, VarSource::Session, SetAction::Set);
                    self.replay_value(name, &cur, cur_ctx, cur_src, SetAction::Local);
                }
            }
            // A frame created by the replay belongs to the nesting level the
            // placeholder's frame recorded, not the level the replay ran at.
            if let Some(idx) = self.find(name) {
                let entry = &mut self.vars[idx];
                if entry.stack.len() > depth {
                    if let Some(top) = entry.stack.last_mut() {
                        top.nest_level = frame.nest_level;
                    }
                }
            }
        }
    }

    fn stack_depth(&self, name: &str) -> usize {
        self.find(name)
            .map(|idx| self.vars[idx].stack.len())
            .unwrap_or(0)
    }

    fn replay_value(
        &mut self,
        name: &str,
        value: &str,
        context: crate::var::VarContext,
        source: VarSource,
        action: SetAction,
    ) {
        if let Err(err) = self.set_option(
            name,
            Some(VarInput::Flat(value)),
            context,
            source,
            action,
            true,
            false,
        ) {
            tracing::warn!(
                "failed to apply stored value for parameter \"{}\": {}",
                name,
                err
            );
        }
    }

    /// The current nesting level. Level 1 is the session scope.
    pub fn nest_level(&self) -> u32 {
        self.nest_level
    }

    /// Opens a new nesting level (a subtransaction, savepoint, or scoped
    /// override) and returns it.
    pub fn enter_nested(&mut self) -> u32 {
        self.nest_level += 1;
        self.nest_level
    }

    /// Commits or aborts every nesting level at or above `level`, restoring
    /// or keeping values per each frame's state, then returns to the level
    /// below (never below the session scope). Changed reportable values are
    /// queued for the client only after their final value is in place.
    pub fn end_nest_level(&mut self, commit: bool, level: u32) {
        debug_assert!(level >= 1);
        debug_assert!(level <= self.nest_level);
        let reporting = self.reporting_enabled;
        for entry in &mut self.vars {
            let changed = entry.unwind_to(commit, level);
            if changed && reporting && entry.flags.contains(VarFlags::REPORT) {
                entry.report_pending = true;
            }
        }
        self.nest_level = level.saturating_sub(1).max(1);
    }

    /// Ends the transaction, unwinding every open nesting level.
    pub fn end_transaction(&mut self, commit: bool) {
        self.end_nest_level(commit, 1);
    }

    /// Marks the start or end of a security-restricted operation. While
    /// set, flagged variables reject all changes.
    pub fn set_security_restricted(&mut self, restricted: bool) {
        self.security_restricted = restricted;
    }

    /// Installs the collaborator that propagates applied settings to the
    /// rest of a distributed deployment.
    pub fn set_forwarder(&mut self, forwarder: Box<dyn SettingForwarder>) {
        self.forwarder = Some(forwarder);
    }

    /// Enables client reporting. Until this is called (at session startup,
    /// once the client is ready), changed values are not queued.
    pub fn enable_reporting(&mut self) {
        self.reporting_enabled = true;
    }

    /// Returns a name/value pair for every reportable variable, for the
    /// initial burst of parameter statuses at session start.
    pub fn startup_reports(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .filter(|e| e.flags.contains(VarFlags::REPORT))
            .map(|e| (e.name.as_str().to_owned(), e.display_value()))
            .collect()
    }

    /// Drains the queue of changed reportable variables, in registry order.
    /// Each variable appears at most once no matter how many times it
    /// changed.
    pub fn drain_reports(&mut self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for entry in &mut self.vars {
            if entry.report_pending {
                entry.report_pending = false;
                out.push((entry.name.as_str().to_owned(), entry.display_value()));
            }
        }
        out
    }

    /// Returns a [`Var`] for the configuration parameter with the specified
    /// name.
    ///
    /// Configuration parameters are matched case insensitively. If no such
    /// configuration parameter exists, `get` returns an error.
    pub fn get(&self, name: &str) -> Result<&dyn Var, VarError> {
        self.find(name)
            .map(|idx| &self.vars[idx] as &dyn Var)
            .ok_or_else(|| VarError::UnknownParameter(name.to_owned()))
    }

    /// Returns the full runtime entry for a variable, if it exists.
    pub fn entry(&self, name: &str) -> Option<&VarEntry> {
        self.find(name).map(|idx| &self.vars[idx])
    }

    /// Returns an iterator over the visible configuration parameters and
    /// their current values.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Var> {
        self.vars
            .iter()
            .filter(|e| !e.flags.contains(VarFlags::NO_SHOW_ALL))
            .map(|e| e as &dyn Var)
    }

    /// Formats one variable's value for `SHOW`.
    pub fn show(&self, name: &str, superuser: bool) -> Result<String, VarError> {
        let idx = self
            .find(name)
            .ok_or_else(|| VarError::UnknownParameter(name.to_owned()))?;
        let entry = &self.vars[idx];
        if entry.flags.contains(VarFlags::SUPERUSER_ONLY) && !superuser {
            return Err(VarError::SuperuserRequiredToShow(
                entry.name.as_str().to_owned(),
            ));
        }
        Ok(entry.display_value())
    }

    /// Returns (name, value, description) for every variable `SHOW ALL`
    /// would display to a session with the given privilege.
    pub fn show_all(&self, superuser: bool) -> Vec<(String, String, &'static str)> {
        self.vars
            .iter()
            .filter(|e| !e.flags.contains(VarFlags::NO_SHOW_ALL))
            .filter(|e| superuser || !e.flags.contains(VarFlags::SUPERUSER_ONLY))
            .map(|e| {
                (
                    e.name.as_str().to_owned(),
                    e.display_value(),
                    e.description,
                )
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn value_of(&self, name: &str) -> crate::value::VarValue {
        let idx = self.find(name).expect("variable exists");
        self.vars[idx].value.clone()
    }
}

impl fmt::Debug for VarRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.vars.iter().map(|e| (e.name.as_str(), e.display_value())))
            .finish()
    }
}

/// Reports whether `name` is a well-formed qualified (extension) variable
/// name: two or more nonempty identifier parts separated by periods.
fn is_qualified_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 2 {
        return false;
    }
    parts.iter().all(|part| {
        let mut chars = part.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::VarUnit;
    use crate::var::VarContext;

    fn defs() -> Vec<VarDefinition> {
        vec![
            VarDefinition::new_int(
                "work_mem",
                4096,
                64,
                i64::MAX,
                VarUnit::Kilobytes,
                VarContext::User,
                "Sets the maximum memory to be used for query workspaces.",
            ),
            VarDefinition::new_bool(
                "autovacuum",
                true,
                VarContext::Reload,
                "Starts the autovacuum subprocess.",
            ),
            VarDefinition::new_string(
                "application_name",
                "",
                VarContext::User,
                "Sets the application name to be reported in statistics and logs.",
            ),
        ]
    }

    static TEST_ALIASES: &[VarAlias] = &[(
        UncasedStr::new("sort_mem"),
        UncasedStr::new("work_mem"),
    )];

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = VarRegistry::build(&defs(), TEST_ALIASES);
        assert!(registry.get("WORK_MEM").is_ok());
        assert!(registry.get("Application_Name").is_ok());
        assert!(matches!(
            registry.get("no_such_parameter"),
            Err(VarError::UnknownParameter(_))
        ));
    }

    #[test]
    fn aliases_resolve() {
        let registry = VarRegistry::build(&defs(), TEST_ALIASES);
        let var = registry.get("sort_mem").unwrap();
        assert_eq!(var.name(), "work_mem");
    }

    #[test]
    fn registry_stays_sorted_after_insert() {
        let mut registry = VarRegistry::build(&defs(), &[]);
        registry.create_placeholder("aaa_ext.knob").unwrap();
        registry.create_placeholder("zzz_ext.knob").unwrap();
        let names: Vec<&str> = registry.vars.iter().map(|e| e.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort_by(|a, b| UncasedStr::new(a).cmp(UncasedStr::new(b)));
        assert_eq!(names, sorted);
    }

    #[test]
    fn qualified_names() {
        assert!(is_qualified_name("myext.foo"));
        assert!(is_qualified_name("a.b.c"));
        assert!(!is_qualified_name("work_mem"));
        assert!(!is_qualified_name("myext."));
        assert!(!is_qualified_name(".foo"));
        assert!(!is_qualified_name("my ext.foo"));
        assert!(!is_qualified_name("1ext.foo"));
    }

    #[test]
    fn placeholders_hidden_from_show_all() {
        let mut registry = VarRegistry::build(&defs(), &[]);
        registry.create_placeholder("myext.foo").unwrap();
        assert!(registry
            .show_all(true)
            .iter()
            .all(|(name, _, _)| name != "myext.foo"));
        // But SHOW finds them.
        assert_eq!(registry.show("myext.foo", false).unwrap(), "");
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_definitions_panic() {
        let mut d = defs();
        d.push(VarDefinition::new_int(
            "WORK_MEM",
            1,
            0,
            10,
            VarUnit::None,
            VarContext::User,
            "Duplicate.",
        ));
        VarRegistry::build(&d, &[]);
    }

    #[test]
    fn define_custom_rejects_existing() {
        let mut registry = VarRegistry::build(&defs(), &[]);
        static DUP: VarDefinition = VarDefinition::new_bool(
            "autovacuum",
            false,
            VarContext::User,
            "Duplicate.",
        );
        assert!(matches!(
            registry.define_custom(&DUP),
            Err(VarError::AlreadyDefined(_))
        ));
    }
}
