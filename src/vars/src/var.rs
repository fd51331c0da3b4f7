// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Variable descriptors and their runtime state.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use uncased::{Uncased, UncasedStr};

use crate::errors::CheckFailure;
use crate::stack::StackEntry;
use crate::value::{ValueSpec, VarUnit, VarValue};

/// When, and by whom, a variable may be changed.
///
/// The variants are ordered from most to least restrictive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum VarContext {
    /// Never settable except by the engine itself.
    Internal,
    /// Fixed once the server process has started.
    ServerStart,
    /// Changeable only at server start or by a configuration reload.
    Reload,
    /// Settable while a connection is starting up, but only for superuser
    /// connections; also accepted from the server start and reload paths.
    SuperuserStartup,
    /// Settable while a connection is starting up, before authentication
    /// completes.
    Startup,
    /// Settable at any time, but only by superusers.
    Superuser,
    /// Settable at any time by any user.
    User,
}

impl VarContext {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            VarContext::Internal => 0,
            VarContext::ServerStart => 1,
            VarContext::Reload => 2,
            VarContext::SuperuserStartup => 3,
            VarContext::Startup => 4,
            VarContext::Superuser => 5,
            VarContext::User => 6,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Option<VarContext> {
        Some(match v {
            0 => VarContext::Internal,
            1 => VarContext::ServerStart,
            2 => VarContext::Reload,
            3 => VarContext::SuperuserStartup,
            4 => VarContext::Startup,
            5 => VarContext::Superuser,
            6 => VarContext::User,
            _ => return None,
        })
    }
}

/// Where a variable's active value came from.
///
/// Sources form a total order; a value from a lower tier never displaces a
/// value from a higher one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum VarSource {
    /// The compiled-in default.
    Default,
    /// A default computed by the engine at startup.
    DynamicDefault,
    /// An environment variable.
    Environment,
    /// The configuration file.
    File,
    /// A cluster-wide default installed by `ALTER SYSTEM`-style machinery.
    GlobalDefault,
    /// A per-database default.
    DatabaseDefault,
    /// A per-role default.
    RoleDefault,
    /// A value supplied by the client at connection start.
    Client,
    /// A value set interactively in the session.
    Session,
    /// A value forcibly installed by the engine.
    Override,
}

impl VarSource {
    /// Reports whether values from this source become the variable's
    /// default, updating the reset slot (and any stacked defaults) rather
    /// than being a purely transactional assignment.
    ///
    /// Every tier except an interactive session `SET` establishes defaults:
    /// a client-supplied startup value is what `RESET` returns to, and a
    /// forced override is meant to stick.
    pub fn establishes_default(self) -> bool {
        self != VarSource::Session
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            VarSource::Default => 0,
            VarSource::DynamicDefault => 1,
            VarSource::Environment => 2,
            VarSource::File => 3,
            VarSource::GlobalDefault => 4,
            VarSource::DatabaseDefault => 5,
            VarSource::RoleDefault => 6,
            VarSource::Client => 7,
            VarSource::Session => 8,
            VarSource::Override => 9,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Option<VarSource> {
        Some(match v {
            0 => VarSource::Default,
            1 => VarSource::DynamicDefault,
            2 => VarSource::Environment,
            3 => VarSource::File,
            4 => VarSource::GlobalDefault,
            5 => VarSource::DatabaseDefault,
            6 => VarSource::RoleDefault,
            7 => VarSource::Client,
            8 => VarSource::Session,
            9 => VarSource::Override,
            _ => return None,
        })
    }
}

/// How an assignment interacts with the transaction that makes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetAction {
    /// A plain `SET`: kept on commit, rolled back on abort.
    Set,
    /// A `SET LOCAL`: rolled back when the issuing nesting level ends,
    /// whether it commits or aborts.
    Local,
    /// A scoped override: restored unconditionally when the issuing nesting
    /// level ends. Used for exception-safe temporary changes.
    Save,
}

/// The documentation group a variable belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarGroup {
    /// Preset, read-only facts about the build.
    Preset,
    /// Connection and authentication settings.
    ConnectionAuth,
    /// Memory, disk, and worker resource knobs.
    ResourceUsage,
    /// Planner cost and tuning knobs.
    QueryTuning,
    /// Logging and statistics settings.
    Logging,
    /// Statement-behavior defaults for client sessions.
    ClientDefaults,
    /// Lock management settings.
    LockManagement,
    /// Compatibility settings.
    Compatibility,
    /// Variables owned by extensions, including placeholders.
    Custom,
}

/// Boolean properties of a variable, combinable with [`VarFlags::union`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarFlags(u32);

impl VarFlags {
    /// No flags.
    pub const NONE: VarFlags = VarFlags(0);
    /// Changes are proactively reported to the connected client.
    pub const REPORT: VarFlags = VarFlags(1 << 0);
    /// `SET` accepts a comma-separated list of values.
    pub const LIST_INPUT: VarFlags = VarFlags(1 << 1);
    /// Only superusers may examine the value.
    pub const SUPERUSER_ONLY: VarFlags = VarFlags(1 << 2);
    /// `RESET ALL` leaves the variable alone.
    pub const NO_RESET_ALL: VarFlags = VarFlags(1 << 3);
    /// The variable cannot be set inside a security-restricted operation or
    /// a privilege-elevated definer function.
    pub const NOT_WHILE_SECURITY_RESTRICTED: VarFlags = VarFlags(1 << 4);
    /// The variable is hidden from `SHOW ALL`.
    pub const NO_SHOW_ALL: VarFlags = VarFlags(1 << 5);
    /// The variable is an untyped stand-in for a not-yet-registered
    /// extension variable.
    pub const PLACEHOLDER: VarFlags = VarFlags(1 << 6);
    /// The variable is serialized after all others because applying it
    /// depends on another variable having been applied first.
    pub const RESTORE_LAST: VarFlags = VarFlags(1 << 7);

    /// Combines two flag sets.
    pub const fn union(self, other: VarFlags) -> VarFlags {
        VarFlags(self.0 | other.0)
    }

    /// Reports whether every flag in `other` is set in `self`.
    pub const fn contains(self, other: VarFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for VarFlags {
    type Output = VarFlags;

    fn bitor(self, rhs: VarFlags) -> VarFlags {
        self.union(rhs)
    }
}

/// An opaque side value owned by a variable, produced by its check hook and
/// carried alongside the main value through every transition.
///
/// Cloning is cheap; the payload is shared. The live value, the reset slot,
/// and any number of rollback-stack entries may alias the same payload, and
/// it is released when the last holder drops.
#[derive(Clone)]
pub struct VarExtra(Arc<dyn Any + Send + Sync>);

impl VarExtra {
    /// Wraps a payload.
    pub fn new<T: Any + Send + Sync>(payload: T) -> VarExtra {
        VarExtra(Arc::new(payload))
    }

    /// Borrows the payload if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for VarExtra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VarExtra(..)")
    }
}

/// Validates a proposed value before it is applied.
///
/// The hook may canonicalize the value in place and may attach a
/// [`VarExtra`] that travels with it. Returning an error rejects the value;
/// the diagnostics in the [`CheckFailure`] override the generic message.
pub type CheckHook =
    fn(&mut VarValue, &mut Option<VarExtra>, VarSource) -> Result<(), CheckFailure>;

/// Applies side effects when a new value is installed. Called only when the
/// value actually changes.
pub type AssignHook = fn(&VarValue, Option<&VarExtra>);

/// Overrides how a value is displayed by `SHOW`.
pub type ShowHook = fn(&VarValue, Option<&VarExtra>) -> String;

/// The compiled-in default of a variable, in a `const`-friendly form.
#[derive(Clone, Copy, Debug)]
pub enum VarDefault {
    /// A boolean default.
    Bool(bool),
    /// A signed integer default, in the variable's base unit.
    Int(i64),
    /// An unsigned integer default.
    UInt(u64),
    /// A floating-point default.
    Real(f64),
    /// A string default.
    String(&'static str),
    /// An enumeration default, by numeric representation.
    Enum(i32),
}

impl VarDefault {
    pub(crate) fn to_value(self) -> VarValue {
        match self {
            VarDefault::Bool(v) => VarValue::Bool(v),
            VarDefault::Int(v) => VarValue::Int(v),
            VarDefault::UInt(v) => VarValue::UInt(v),
            VarDefault::Real(v) => VarValue::Real(v),
            VarDefault::String(v) => VarValue::String(Arc::from(v)),
            VarDefault::Enum(v) => VarValue::Enum(v),
        }
    }
}

/// The static description of a configuration variable.
///
/// Definitions are usually `static` items built with the `const`
/// constructors and registered once at process start; extensions register
/// theirs when they load.
#[derive(Clone, Debug)]
pub struct VarDefinition {
    /// The variable's unique, case-insensitive name.
    pub name: &'static UncasedStr,
    /// A short sentence describing the variable's purpose.
    pub description: &'static str,
    /// When the variable may be changed.
    pub context: VarContext,
    /// The documentation group.
    pub group: VarGroup,
    /// Boolean properties.
    pub flags: VarFlags,
    /// The value domain.
    pub spec: ValueSpec,
    /// The compiled-in default.
    pub default: VarDefault,
    /// Validates and canonicalizes proposed values.
    pub check: Option<CheckHook>,
    /// Applies side effects on change.
    pub assign: Option<AssignHook>,
    /// Overrides display formatting.
    pub show: Option<ShowHook>,
}

impl VarDefinition {
    const fn base(
        name: &'static str,
        context: VarContext,
        description: &'static str,
        spec: ValueSpec,
        default: VarDefault,
    ) -> VarDefinition {
        VarDefinition {
            name: UncasedStr::new(name),
            description,
            context,
            group: VarGroup::ClientDefaults,
            flags: VarFlags::NONE,
            spec,
            default,
            check: None,
            assign: None,
            show: None,
        }
    }

    /// Defines a boolean variable.
    pub const fn new_bool(
        name: &'static str,
        default: bool,
        context: VarContext,
        description: &'static str,
    ) -> VarDefinition {
        VarDefinition::base(
            name,
            context,
            description,
            ValueSpec::Bool,
            VarDefault::Bool(default),
        )
    }

    /// Defines a signed integer variable with inclusive bounds.
    pub const fn new_int(
        name: &'static str,
        default: i64,
        min: i64,
        max: i64,
        unit: VarUnit,
        context: VarContext,
        description: &'static str,
    ) -> VarDefinition {
        VarDefinition::base(
            name,
            context,
            description,
            ValueSpec::Int { min, max, unit },
            VarDefault::Int(default),
        )
    }

    /// Defines an unsigned integer variable with inclusive bounds.
    pub const fn new_uint(
        name: &'static str,
        default: u64,
        min: u64,
        max: u64,
        unit: VarUnit,
        context: VarContext,
        description: &'static str,
    ) -> VarDefinition {
        VarDefinition::base(
            name,
            context,
            description,
            ValueSpec::UInt { min, max, unit },
            VarDefault::UInt(default),
        )
    }

    /// Defines a floating-point variable with inclusive bounds.
    pub const fn new_real(
        name: &'static str,
        default: f64,
        min: f64,
        max: f64,
        unit: VarUnit,
        context: VarContext,
        description: &'static str,
    ) -> VarDefinition {
        VarDefinition::base(
            name,
            context,
            description,
            ValueSpec::Real { min, max, unit },
            VarDefault::Real(default),
        )
    }

    /// Defines a string variable.
    pub const fn new_string(
        name: &'static str,
        default: &'static str,
        context: VarContext,
        description: &'static str,
    ) -> VarDefinition {
        VarDefinition::base(
            name,
            context,
            description,
            ValueSpec::String,
            VarDefault::String(default),
        )
    }

    /// Defines an enumeration variable.
    pub const fn new_enum(
        name: &'static str,
        options: &'static [(&'static str, i32)],
        default: i32,
        context: VarContext,
        description: &'static str,
    ) -> VarDefinition {
        VarDefinition::base(
            name,
            context,
            description,
            ValueSpec::Enum { options },
            VarDefault::Enum(default),
        )
    }

    /// Adds flags to the definition.
    pub const fn with_flags(self, flags: VarFlags) -> VarDefinition {
        let mut def = self;
        def.flags = def.flags.union(flags);
        def
    }

    /// Sets the documentation group.
    pub const fn with_group(self, group: VarGroup) -> VarDefinition {
        let mut def = self;
        def.group = group;
        def
    }

    /// Installs a check hook.
    pub const fn with_check(self, check: CheckHook) -> VarDefinition {
        let mut def = self;
        def.check = Some(check);
        def
    }

    /// Installs an assign hook.
    pub const fn with_assign(self, assign: AssignHook) -> VarDefinition {
        let mut def = self;
        def.assign = Some(assign);
        def
    }

    /// Installs a show hook.
    pub const fn with_show(self, show: ShowHook) -> VarDefinition {
        let mut def = self;
        def.show = Some(show);
        def
    }
}

/// A configuration parameter of an arbitrary type.
pub trait Var: fmt::Debug {
    /// Returns the name of the configuration parameter.
    fn name(&self) -> &str;

    /// Constructs a string representation of the current value of the
    /// configuration parameter.
    fn value(&self) -> String;

    /// Returns a short sentence describing the purpose of the configuration
    /// parameter.
    fn description(&self) -> &str;

    /// Returns the name of the type of this variable.
    fn type_name(&self) -> &'static str;
}

pub(crate) const PLACEHOLDER_DESCRIPTION: &str =
    "Stand-in for a variable that has not been registered by its extension yet.";

/// A registered variable: its descriptor plus all mutable state.
#[derive(Debug)]
pub struct VarEntry {
    pub(crate) name: Uncased<'static>,
    pub(crate) description: &'static str,
    pub(crate) context: VarContext,
    pub(crate) group: VarGroup,
    pub(crate) flags: VarFlags,
    pub(crate) spec: ValueSpec,
    pub(crate) check: Option<CheckHook>,
    pub(crate) assign: Option<AssignHook>,
    pub(crate) show: Option<ShowHook>,

    pub(crate) value: VarValue,
    pub(crate) extra: Option<VarExtra>,
    pub(crate) boot_val: VarValue,
    pub(crate) reset_val: VarValue,
    pub(crate) reset_extra: Option<VarExtra>,
    pub(crate) source: VarSource,
    pub(crate) reset_source: VarSource,
    pub(crate) scontext: VarContext,
    pub(crate) reset_scontext: VarContext,
    pub(crate) source_file: Option<Arc<str>>,
    pub(crate) source_line: Option<u32>,
    pub(crate) pending_restart: bool,
    pub(crate) report_pending: bool,
    pub(crate) stack: Vec<StackEntry>,
}

impl VarEntry {
    /// Builds the runtime entry for a definition, installing its boot
    /// default.
    ///
    /// Panics if the check hook rejects the compiled-in default: a
    /// definition whose own default does not validate is a programming
    /// error, caught at registration time.
    pub(crate) fn from_definition(def: &VarDefinition) -> VarEntry {
        let mut value = def.default.to_value();
        let mut extra = None;
        if let Some(check) = def.check {
            if let Err(failure) = check(&mut value, &mut extra, VarSource::Default) {
                panic!(
                    "failed to initialize {} to its default: {:?}",
                    def.name, failure
                );
            }
        }
        VarEntry {
            name: Uncased::new(def.name.as_str()),
            description: def.description,
            context: def.context,
            group: def.group,
            flags: def.flags,
            spec: def.spec.clone(),
            check: def.check,
            assign: def.assign,
            show: def.show,
            boot_val: value.clone(),
            reset_val: value.clone(),
            reset_extra: extra.clone(),
            value,
            extra,
            source: VarSource::Default,
            reset_source: VarSource::Default,
            scontext: VarContext::Internal,
            reset_scontext: VarContext::Internal,
            source_file: None,
            source_line: None,
            pending_restart: false,
            report_pending: false,
            stack: Vec::new(),
        }
    }

    /// Builds a hidden, string-typed placeholder for a qualified name whose
    /// owning extension has not registered it yet.
    pub(crate) fn placeholder(name: &str) -> VarEntry {
        let value = VarValue::String(Arc::from(""));
        VarEntry {
            name: Uncased::new(name.to_owned()),
            description: PLACEHOLDER_DESCRIPTION,
            context: VarContext::User,
            group: VarGroup::Custom,
            flags: VarFlags::PLACEHOLDER.union(VarFlags::NO_SHOW_ALL),
            spec: ValueSpec::String,
            check: None,
            assign: None,
            show: None,
            boot_val: value.clone(),
            reset_val: value.clone(),
            reset_extra: None,
            value,
            extra: None,
            source: VarSource::Default,
            reset_source: VarSource::Default,
            scontext: VarContext::Internal,
            reset_scontext: VarContext::Internal,
            source_file: None,
            source_line: None,
            pending_restart: false,
            report_pending: false,
            stack: Vec::new(),
        }
    }

    pub(crate) fn key(&self) -> &UncasedStr {
        UncasedStr::new(self.name.as_str())
    }

    /// Reinitializes the entry to its compiled-in default, discarding all
    /// session state.
    pub(crate) fn reset_to_boot(&mut self) {
        self.value = self.boot_val.clone();
        self.extra = None;
        self.reset_val = self.boot_val.clone();
        self.reset_extra = None;
        self.source = VarSource::Default;
        self.reset_source = VarSource::Default;
        self.scontext = VarContext::Internal;
        self.reset_scontext = VarContext::Internal;
        self.source_file = None;
        self.source_line = None;
        self.pending_restart = false;
        self.stack.clear();
    }

    /// Installs a value with its companions, invoking the assign hook when
    /// the value actually changes. Returns whether it changed.
    pub(crate) fn restore_value(
        &mut self,
        value: VarValue,
        extra: Option<VarExtra>,
        source: VarSource,
        scontext: VarContext,
    ) -> bool {
        let changed = self.value != value;
        if changed {
            if let Some(assign) = self.assign {
                assign(&value, extra.as_ref());
            }
            self.value = value;
        }
        self.extra = extra;
        self.source = source;
        self.scontext = scontext;
        changed
    }

    /// Formats the current value for display, honoring the show hook.
    pub(crate) fn display_value(&self) -> String {
        match self.show {
            Some(show) => show(&self.value, self.extra.as_ref()),
            None => self.value.format_display(&self.spec),
        }
    }

    /// Reports whether this entry is a placeholder.
    pub(crate) fn is_placeholder(&self) -> bool {
        self.flags.contains(VarFlags::PLACEHOLDER)
    }

    /// Reports whether the variable still requires a restart to take its
    /// most recently offered value.
    pub fn pending_restart(&self) -> bool {
        self.pending_restart
    }

    /// The variable's permission/timing context.
    pub fn context(&self) -> VarContext {
        self.context
    }

    /// The provenance of the current value.
    pub fn source(&self) -> VarSource {
        self.source
    }

    /// The variable's flags.
    pub fn flags(&self) -> VarFlags {
        self.flags
    }
}

impl Var for VarEntry {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn value(&self) -> String {
        self.display_value()
    }

    fn description(&self) -> &str {
        self.description
    }

    fn type_name(&self) -> &'static str {
        self.spec.type_name()
    }
}
