// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! End-to-end behavior of the built-in variable set.

use bytes::BytesMut;
use mz_vars::{
    SetOutcome, VarContext, VarDefinition, VarError, VarFlags, VarInput, VarRegistry, VarSource,
};
use mz_vars_defaults::registry;

fn set_user(registry: &mut VarRegistry, name: &str, value: &str) -> Result<SetOutcome, VarError> {
    registry.set(name, VarInput::Flat(value), VarContext::User, false)
}

#[test]
fn work_mem_units_round_trip() {
    let mut r = registry();
    set_user(&mut r, "work_mem", "4MB").unwrap();
    assert_eq!(r.show("work_mem", false).unwrap(), "4MB");

    let err = set_user(&mut r, "work_mem", "31").unwrap_err();
    assert_eq!(
        err.to_string(),
        "31 is outside the valid range for parameter \"work_mem\" (64 .. 2147483647)"
    );
    // The rejected value left the previous one in place.
    assert_eq!(r.show("work_mem", false).unwrap(), "4MB");
}

#[test]
fn deprecated_aliases_still_resolve() {
    let mut r = registry();
    set_user(&mut r, "sort_mem", "8MB").unwrap();
    assert_eq!(r.show("work_mem", false).unwrap(), "8MB");
    assert_eq!(r.show("sort_mem", false).unwrap(), "8MB");
    set_user(&mut r, "vacuum_mem", "64MB").unwrap();
    assert_eq!(r.show("maintenance_work_mem", false).unwrap(), "64MB");
}

#[test]
fn placeholder_resolution_with_parseable_value() {
    static EXT_ENABLED: VarDefinition = VarDefinition::new_bool(
        "myext.enabled",
        false,
        VarContext::User,
        "Enables myext.",
    );

    let mut r = registry();
    // Reference the variable before the extension loads.
    set_user(&mut r, "myext.enabled", "on").unwrap();
    assert_eq!(r.show("myext.enabled", false).unwrap(), "on");

    // The extension registers the real, boolean definition; the stored
    // string replays onto it.
    r.define_custom(&EXT_ENABLED).unwrap();
    assert_eq!(r.show("myext.enabled", false).unwrap(), "on");
    // The session-set value is still transactional.
    r.end_transaction(false);
    assert_eq!(r.show("myext.enabled", false).unwrap(), "off");
}

#[test]
fn placeholder_resolution_with_unparseable_value_falls_back() {
    static EXT_FOO: VarDefinition = VarDefinition::new_bool(
        "myext.foo",
        true,
        VarContext::User,
        "Does foo.",
    );

    let mut r = registry();
    set_user(&mut r, "myext.foo", "bar").unwrap();
    // Registration must not fail even though "bar" is not a boolean; the
    // variable falls back to its compiled-in default.
    r.define_custom(&EXT_FOO).unwrap();
    assert_eq!(r.show("myext.foo", false).unwrap(), "on");
}

#[test]
fn placeholder_resolution_replays_committed_values() {
    static EXT_LABEL: VarDefinition = VarDefinition::new_string(
        "myext.label",
        "unset",
        VarContext::User,
        "A label.",
    );

    let mut r = registry();
    set_user(&mut r, "myext.label", "committed").unwrap();
    r.end_transaction(true);
    r.define_custom(&EXT_LABEL).unwrap();
    assert_eq!(r.show("myext.label", false).unwrap(), "committed");
    // The replayed value is session state, not a pending transactional
    // change.
    r.end_transaction(false);
    assert_eq!(r.show("myext.label", false).unwrap(), "committed");
}

#[test]
fn placeholder_stack_structure_is_reconstructed() {
    static EXT_MODE: VarDefinition = VarDefinition::new_string(
        "myext.mode",
        "default",
        VarContext::User,
        "A mode.",
    );

    let mut r = registry();
    set_user(&mut r, "myext.mode", "outer").unwrap();
    let level = r.enter_nested();
    r.set("myext.mode", VarInput::Flat("inner"), VarContext::User, true)
        .unwrap();
    // Load the extension mid-subtransaction: the SET and the SET LOCAL
    // structure must both survive onto the typed variable.
    r.define_custom(&EXT_MODE).unwrap();
    assert_eq!(r.show("myext.mode", false).unwrap(), "inner");
    r.end_nest_level(false, level);
    assert_eq!(r.show("myext.mode", false).unwrap(), "outer");
    r.end_transaction(false);
    assert_eq!(r.show("myext.mode", false).unwrap(), "default");
}

#[test]
fn reset_all_respects_exclusions() {
    let mut r = registry();
    set_user(&mut r, "work_mem", "8MB").unwrap();
    set_user(&mut r, "application_name", "psql").unwrap();
    set_user(&mut r, "role", "auditor").unwrap();
    r.reset_all();
    assert_eq!(r.show("work_mem", false).unwrap(), "4MB");
    assert_eq!(r.show("application_name", false).unwrap(), "");
    // role is excluded from RESET ALL.
    assert_eq!(r.show("role", false).unwrap(), "auditor");
}

#[test]
fn show_all_respects_visibility() {
    let mut r = registry();
    // Placeholders exist but are hidden from SHOW ALL.
    set_user(&mut r, "hidden_ext.thing", "v").unwrap();
    let all = r.show_all(false);
    assert!(all.iter().any(|(name, _, _)| name == "work_mem"));
    assert!(all.iter().all(|(name, _, _)| name != "hidden_ext.thing"));
    assert!(all.iter().all(|(name, _, _)| name != "session_preload_libraries"));
    let all_su = r.show_all(true);
    assert!(all_su
        .iter()
        .any(|(name, _, _)| name == "session_preload_libraries"));
}

#[test]
fn superuser_only_show() {
    let r = registry();
    assert!(matches!(
        r.show("session_preload_libraries", false),
        Err(VarError::SuperuserRequiredToShow(_))
    ));
    assert_eq!(r.show("session_preload_libraries", true).unwrap(), "");
}

#[test]
fn transaction_isolation_is_session_scoped() {
    let mut r = registry();
    // SET TRANSACTION ISOLATION LEVEL maps to a SET LOCAL of the variable.
    r.set(
        "transaction_isolation",
        VarInput::Flat("serializable"),
        VarContext::User,
        true,
    )
    .unwrap();
    assert_eq!(
        r.show("transaction_isolation", false).unwrap(),
        "serializable"
    );
    r.end_transaction(true);
    assert_eq!(
        r.show("transaction_isolation", false).unwrap(),
        "read committed"
    );
}

#[test]
fn startup_reports_cover_reportables() {
    let mut r = registry();
    let names: Vec<String> = r.startup_reports().into_iter().map(|(n, _)| n).collect();
    for expected in [
        "DateStyle",
        "IntervalStyle",
        "TimeZone",
        "application_name",
        "client_encoding",
        "integer_datetimes",
        "server_version",
        "session_authorization",
        "standard_conforming_strings",
    ] {
        assert!(names.iter().any(|n| n == expected), "{}", expected);
    }

    r.enable_reporting();
    set_user(&mut r, "application_name", "reporter").unwrap();
    set_user(&mut r, "work_mem", "8MB").unwrap();
    assert_eq!(
        r.drain_reports(),
        vec![("application_name".to_owned(), "reporter".to_owned())]
    );
}

#[test]
fn rollback_reports_restored_values() {
    let mut r = registry();
    r.enable_reporting();
    set_user(&mut r, "application_name", "inner").unwrap();
    r.drain_reports();
    r.end_transaction(false);
    assert_eq!(
        r.drain_reports(),
        vec![("application_name".to_owned(), "".to_owned())]
    );
}

#[test]
fn serialize_restore_fidelity() {
    let mut parent = registry();
    set_user(&mut parent, "work_mem", "64MB").unwrap();
    set_user(&mut parent, "application_name", "launcher").unwrap();
    set_user(&mut parent, "session_authorization", "alice").unwrap();
    set_user(&mut parent, "role", "auditor").unwrap();
    set_user(&mut parent, "TimeZone", "utc+2").unwrap();
    set_user(&mut parent, "myext.knob", "tuned").unwrap();

    let mut buf = BytesMut::new();
    parent.serialize_state(&mut buf);
    assert_eq!(buf.len(), parent.serialized_state_size());

    let mut worker = registry();
    worker.restore_state(&buf).unwrap();

    for (name, _, _) in parent.show_all(true) {
        assert_eq!(
            worker.show(&name, true).unwrap(),
            parent.show(&name, true).unwrap(),
            "{}",
            name
        );
    }
    assert_eq!(worker.show("myext.knob", true).unwrap(), "tuned");
}

#[test]
fn session_authorization_restores_before_role() {
    let mut parent = registry();
    set_user(&mut parent, "role", "auditor").unwrap();
    set_user(&mut parent, "session_authorization", "alice").unwrap();

    let mut buf = BytesMut::new();
    parent.serialize_state(&mut buf);
    let bytes = &buf[4..];
    let auth_pos = bytes
        .windows(b"session_authorization\0".len())
        .position(|w| w == &b"session_authorization\0"[..])
        .unwrap();
    let role_pos = bytes
        .windows(b"role\0".len())
        .position(|w| w == &b"role\0"[..])
        .unwrap();
    assert!(role_pos > auth_pos);

    let mut worker = registry();
    worker.restore_state(&buf).unwrap();
    assert_eq!(worker.show("session_authorization", true).unwrap(), "alice");
    assert_eq!(worker.show("role", true).unwrap(), "auditor");
}

#[test]
fn security_restricted_operations_block_role_changes() {
    let mut r = registry();
    r.set_security_restricted(true);
    assert!(matches!(
        set_user(&mut r, "role", "admin"),
        Err(VarError::SecurityRestricted(_))
    ));
    assert!(matches!(
        set_user(&mut r, "session_authorization", "mallory"),
        Err(VarError::SecurityRestricted(_))
    ));
    // Unflagged variables remain settable.
    set_user(&mut r, "work_mem", "8MB").unwrap();
    r.set_security_restricted(false);
    set_user(&mut r, "role", "admin").unwrap();
}

#[test]
fn role_default_establishes_reset_target() {
    let mut r = registry();
    // A per-role default arrives during session setup.
    r.set_default(
        "work_mem",
        VarInput::Flat("16MB"),
        VarContext::User,
        VarSource::RoleDefault,
    )
    .unwrap();
    assert_eq!(r.show("work_mem", false).unwrap(), "16MB");
    // A session SET overrides it; RESET returns to the role default, not
    // the compiled-in one.
    set_user(&mut r, "work_mem", "1MB").unwrap();
    r.reset("work_mem", VarContext::User).unwrap();
    assert_eq!(r.show("work_mem", false).unwrap(), "16MB");
}

#[test]
fn flags_expose_placeholder_status() {
    let mut r = registry();
    set_user(&mut r, "myext.thing", "x").unwrap();
    let entry = r.entry("myext.thing").unwrap();
    assert!(entry.flags().contains(VarFlags::PLACEHOLDER));
}
