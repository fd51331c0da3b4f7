// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Cross-process state handoff.
//!
//! When the engine spawns a worker process, the worker must observe the
//! parent's effective configuration. Serialization flattens every variable
//! whose value did not come from its compiled-in default — skipping
//! variables that are guaranteed identical across the spawn (fixed at
//! server start) or handled out of band (internal) — into a length-prefixed
//! buffer of (name, value, origin, source, context) tuples. The receiving
//! process first reinitializes every restorable variable to its
//! compiled-in default, because its own startup may have installed values
//! the parent did not serialize, then replays each tuple through the
//! ordinary setter pipeline.
//!
//! One pair of variables is order-sensitive: applying the second performs a
//! lookup that depends on the first already being in place. Variables
//! flagged [`VarFlags::RESTORE_LAST`] are therefore serialized after all
//! others, regardless of registry order.

use bytes::{Buf, BufMut, BytesMut};

use crate::errors::VarError;
use crate::registry::VarRegistry;
use crate::value::VarInput;
use crate::var::{SetAction, VarContext, VarEntry, VarFlags, VarSource};

fn serializable(entry: &VarEntry) -> bool {
    entry.source != VarSource::Default
        && !matches!(entry.context, VarContext::Internal | VarContext::ServerStart)
}

fn restorable(entry: &VarEntry) -> bool {
    !matches!(entry.context, VarContext::Internal | VarContext::ServerStart)
}

fn tuple_size(entry: &VarEntry) -> usize {
    let file_len = entry.source_file.as_deref().map(str::len).unwrap_or(0);
    entry.name.as_str().len()
        + 1
        + entry.value.format_plain(&entry.spec).len()
        + 1
        + file_len
        + 1
        + if file_len > 0 { 4 } else { 0 }
        + 2 // source and context bytes
}

fn put_tuple(dst: &mut BytesMut, entry: &VarEntry) {
    dst.put_slice(entry.name.as_str().as_bytes());
    dst.put_u8(0);
    dst.put_slice(entry.value.format_plain(&entry.spec).as_bytes());
    dst.put_u8(0);
    match entry.source_file.as_deref() {
        Some(file) if !file.is_empty() => {
            dst.put_slice(file.as_bytes());
            dst.put_u8(0);
            dst.put_u32(entry.source_line.unwrap_or(0));
        }
        _ => dst.put_u8(0),
    }
    dst.put_u8(entry.source.as_u8());
    dst.put_u8(entry.scontext.as_u8());
}

fn read_cstr<'a>(src: &mut &'a [u8]) -> Result<&'a str, VarError> {
    let nul = src
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| VarError::MalformedState("unterminated string".into()))?;
    let s = std::str::from_utf8(&src[..nul])
        .map_err(|_| VarError::MalformedState("string is not valid UTF-8".into()))?;
    *src = &src[nul + 1..];
    Ok(s)
}

impl VarRegistry {
    /// Returns the exact number of bytes [`VarRegistry::serialize_state`]
    /// will write.
    pub fn serialized_state_size(&self) -> usize {
        4 + self
            .vars
            .iter()
            .filter(|e| serializable(e))
            .map(tuple_size)
            .sum::<usize>()
    }

    /// Flattens all non-default variable state into `dst`, prefixed by the
    /// payload length.
    pub fn serialize_state(&self, dst: &mut BytesMut) {
        dst.reserve(self.serialized_state_size());
        let ordered = self
            .vars
            .iter()
            .filter(|e| serializable(e) && !e.flags.contains(VarFlags::RESTORE_LAST))
            .chain(
                self.vars
                    .iter()
                    .filter(|e| serializable(e) && e.flags.contains(VarFlags::RESTORE_LAST)),
            );
        let payload: usize = self
            .vars
            .iter()
            .filter(|e| serializable(e))
            .map(tuple_size)
            .sum();
        dst.put_u32(u32::try_from(payload).expect("variable state exceeds 4GiB"));
        for entry in ordered {
            put_tuple(dst, entry);
        }
    }

    /// Replays a buffer produced by [`VarRegistry::serialize_state`] in
    /// another process, reproducing the sender's effective configuration.
    pub fn restore_state(&mut self, src: &[u8]) -> Result<(), VarError> {
        let mut src = src;
        if src.remaining() < 4 {
            return Err(VarError::MalformedState("missing length prefix".into()));
        }
        let payload = src.get_u32() as usize;
        if src.remaining() != payload {
            return Err(VarError::MalformedState(format!(
                "length prefix says {} bytes but {} are present",
                payload,
                src.remaining()
            )));
        }

        // The sender only serializes non-default state, and this process's
        // own startup may have set variables the sender never mentions.
        // Level the field before replaying.
        for entry in &mut self.vars {
            if restorable(entry) {
                entry.reset_to_boot();
            }
        }

        while src.has_remaining() {
            let name = read_cstr(&mut src)?.to_owned();
            let value = read_cstr(&mut src)?.to_owned();
            let file = read_cstr(&mut src)?.to_owned();
            let line = if !file.is_empty() {
                if src.remaining() < 4 {
                    return Err(VarError::MalformedState("truncated source line".into()));
                }
                Some(src.get_u32())
            } else {
                None
            };
            if src.remaining() < 2 {
                return Err(VarError::MalformedState("truncated provenance".into()));
            }
            let source = VarSource::from_u8(src.get_u8())
                .ok_or_else(|| VarError::MalformedState("unknown source tier".into()))?;
            let scontext = VarContext::from_u8(src.get_u8())
                .ok_or_else(|| VarError::MalformedState("unknown context".into()))?;

            self.set_option(
                &name,
                Some(VarInput::Flat(&value)),
                scontext,
                source,
                SetAction::Set,
                true,
                true,
            )?;
            if let Some(idx) = self.find(&name) {
                let entry = &mut self.vars[idx];
                // The restored value is the worker's session state, not a
                // transactional change; drop the frame the pipeline pushed.
                entry.stack.clear();
                if !file.is_empty() {
                    entry.source_file = Some(file.as_str().into());
                    entry.source_line = line;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{VarUnit, VarValue};
    use crate::var::VarDefinition;

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
            VarDefinition::new_int(
                "shared_buffers",
                16384,
                16,
                i64::MAX,
                VarUnit::Blocks,
                VarContext::ServerStart,
                "Sets the number of shared memory buffers used by the server.",
            ),
            VarDefinition::new_string(
                "application_name",
                "",
                VarContext::User,
                "Sets the application name to be reported in statistics and logs.",
            ),
            VarDefinition::new_string(
                "session_authorization",
                "",
                VarContext::User,
                "Sets the session user name.",
            )
            .with_flags(VarFlags::NO_RESET_ALL),
            VarDefinition::new_string("role", "none", VarContext::User, "Sets the current role.")
                .with_flags(VarFlags::NO_RESET_ALL.union(VarFlags::RESTORE_LAST)),
        ]
    }

    fn fresh() -> VarRegistry {
        VarRegistry::build(&defs(), &[])
    }

    fn set(registry: &mut VarRegistry, name: &str, value: &str) {
        registry
            .set(name, VarInput::Flat(value), VarContext::User, false)
            .unwrap();
    }

    #[test]
    fn round_trip_reproduces_displayed_values() {
        let mut parent = fresh();
        set(&mut parent, "work_mem", "64MB");
        set(&mut parent, "application_name", "worker-launcher");
        set(&mut parent, "myext.knob", "tuned");

        let mut buf = BytesMut::new();
        parent.serialize_state(&mut buf);
        assert_eq!(buf.len(), parent.serialized_state_size());

        let mut worker = fresh();
        // The worker booted with its own notions; restore must overwrite
        // them.
        set(&mut worker, "work_mem", "128");
        worker.restore_state(&buf).unwrap();

        for name in ["work_mem", "application_name", "myext.knob"] {
            assert_eq!(
                worker.show(name, true).unwrap(),
                parent.show(name, true).unwrap(),
                "{}",
                name
            );
        }
        assert_eq!(
            worker.entry("work_mem").unwrap().source(),
            VarSource::Session
        );
    }

    #[test]
    fn default_and_server_start_vars_are_skipped() {
        let parent = fresh();
        let mut buf = BytesMut::new();
        parent.serialize_state(&mut buf);
        // Nothing was set, so only the length prefix is present.
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn restore_resets_unserialized_variables() {
        let parent = fresh();
        let mut buf = BytesMut::new();
        parent.serialize_state(&mut buf);

        let mut worker = fresh();
        set(&mut worker, "work_mem", "8192");
        worker.restore_state(&buf).unwrap();
        assert_eq!(worker.value_of("work_mem"), VarValue::Int(4096));
    }

    #[test]
    fn flagged_variable_is_serialized_last() {
        let mut parent = fresh();
        set(&mut parent, "role", "auditor");
        set(&mut parent, "session_authorization", "alice");

        let mut buf = BytesMut::new();
        parent.serialize_state(&mut buf);
        let bytes = &buf[4..];
        let session_auth = bytes
            .windows("session_authorization".len())
            .position(|w| w == &b"session_authorization"[..])
            .unwrap();
        let role = bytes
            .windows("role\0".len())
            .position(|w| w == &b"role\0"[..])
            .unwrap();
        assert!(
            role > session_auth,
            "role must be serialized after session_authorization"
        );
    }

    #[test]
    fn truncated_buffers_are_rejected() {
        let mut parent = fresh();
        set(&mut parent, "work_mem", "64MB");
        let mut buf = BytesMut::new();
        parent.serialize_state(&mut buf);

        let mut worker = fresh();
        assert!(matches!(
            worker.restore_state(&buf[..buf.len() - 3]),
            Err(VarError::MalformedState(_))
        ));
        assert!(matches!(
            worker.restore_state(&[1, 2]),
            Err(VarError::MalformedState(_))
        ));
    }

    #[test]
    fn file_origin_survives_the_hop() {
        use crate::set::FileSetting;

        let mut parent = fresh();
        parent.apply_file_settings(&[FileSetting {
            name: "work_mem".into(),
            value: "32MB".into(),
            file: "postgresql.conf".into(),
            line: 7,
        }]);

        let mut buf = BytesMut::new();
        parent.serialize_state(&mut buf);
        let mut worker = fresh();
        worker.restore_state(&buf).unwrap();
        let entry = worker.entry("work_mem").unwrap();
        assert_eq!(entry.source(), VarSource::File);
        assert_eq!(worker.show("work_mem", true).unwrap(), "32MB");
    }
}
