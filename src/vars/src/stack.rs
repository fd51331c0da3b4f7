// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The per-variable rollback stack.
//!
//! Each variable keeps at most one saved state per open nesting level. A
//! frame records what to restore when that level ends, and a state tag
//! describing how the value got there:
//!
//! - `Save`: restore the prior value whether the level commits or aborts.
//! - `Set`: commit keeps the new value; abort restores the prior one.
//! - `Local`: the new value never outlives the level; both commit and abort
//!   restore the prior one.
//! - `SetLocal`: a `SET` that was later shadowed by a `SET LOCAL` at the
//!   same level. Commit restores the shadowed `SET` value (the "masked"
//!   value); abort restores the original prior value.
//!
//! When a level commits into a parent that already holds a frame, the inner
//! frame is merged with the parent using the same transitions a direct
//! assignment at the parent level would have taken, so releasing a savepoint
//! is indistinguishable from never having created it. When the parent level
//! holds no frame, the inner frame is simply re-tagged with the parent's
//! level and kept.

use crate::value::VarValue;
use crate::var::{SetAction, VarContext, VarEntry, VarExtra, VarSource};

/// A saved value together with its companion extra payload.
#[derive(Clone, Debug)]
pub(crate) struct StackedValue {
    pub(crate) value: VarValue,
    pub(crate) extra: Option<VarExtra>,
}

/// The `SET` value shadowed by a later `SET LOCAL` at the same level.
#[derive(Clone, Debug)]
pub(crate) struct MaskedValue {
    pub(crate) value: VarValue,
    pub(crate) extra: Option<VarExtra>,
    pub(crate) scontext: VarContext,
}

/// The life-cycle state of one stack frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StackState {
    Save,
    Set,
    Local,
    SetLocal,
}

/// One frame of a variable's rollback stack.
#[derive(Clone, Debug)]
pub(crate) struct StackEntry {
    /// The nesting level that owns this frame. Always ≥ 1, and strictly
    /// increasing from the bottom of the stack to the top.
    pub(crate) nest_level: u32,
    pub(crate) state: StackState,
    /// The provenance the variable had when the frame was pushed.
    pub(crate) source: VarSource,
    /// The context that performed the set the frame preserves.
    pub(crate) scontext: VarContext,
    /// The value to restore on abort (and, for most states, on commit).
    pub(crate) prior: StackedValue,
    /// Present only in state [`StackState::SetLocal`].
    pub(crate) masked: Option<MaskedValue>,
}

impl VarEntry {
    /// Saves the current state before an assignment at `nest_level`, or
    /// merges the assignment's intent into the frame that level already
    /// holds. Frames are coalesced, never duplicated.
    pub(crate) fn push_old_value(&mut self, action: SetAction, nest_level: u32) {
        let current = StackedValue {
            value: self.value.clone(),
            extra: self.extra.clone(),
        };
        let current_scontext = self.scontext;
        if let Some(top) = self.stack.last_mut() {
            if top.nest_level >= nest_level {
                debug_assert_eq!(top.nest_level, nest_level);
                match action {
                    SetAction::Set => {
                        // A SET overrides any previous action at this level.
                        top.masked = None;
                        top.state = StackState::Set;
                    }
                    SetAction::Local => {
                        if top.state == StackState::Set {
                            // Remember the SET value the LOCAL is shadowing.
                            top.masked = Some(MaskedValue {
                                value: current.value,
                                extra: current.extra,
                                scontext: current_scontext,
                            });
                            top.state = StackState::SetLocal;
                        }
                    }
                    SetAction::Save => {}
                }
                return;
            }
        }
        self.stack.push(StackEntry {
            nest_level,
            state: match action {
                SetAction::Set => StackState::Set,
                SetAction::Local => StackState::Local,
                SetAction::Save => StackState::Save,
            },
            source: self.source,
            scontext: self.scontext,
            prior: current,
            masked: None,
        });
    }

    /// Unwinds every frame at or above `level`, committing or aborting each
    /// one. Returns whether the live value changed.
    pub(crate) fn unwind_to(&mut self, commit: bool, level: u32) -> bool {
        enum Outcome {
            Keep,
            RestorePrior,
            RestoreMasked,
        }
        let mut changed = false;
        while let Some(top) = self.stack.last() {
            let frame_level = top.nest_level;
            if frame_level < level {
                break;
            }
            let outcome = if !commit || top.state == StackState::Save {
                Outcome::RestorePrior
            } else if frame_level == 1 {
                match top.state {
                    StackState::Set => Outcome::Keep,
                    StackState::SetLocal => Outcome::RestoreMasked,
                    StackState::Local => Outcome::RestorePrior,
                    StackState::Save => unreachable!(),
                }
            } else {
                let has_adjacent_parent = self.stack.len() >= 2
                    && self.stack[self.stack.len() - 2].nest_level == frame_level - 1;
                if !has_adjacent_parent {
                    // The intervening level never touched this variable.
                    // Adopt the frame into the parent level and keep going;
                    // it will be reconsidered at that level.
                    self.stack.last_mut().expect("frame exists").nest_level -= 1;
                    continue;
                }
                let frame = self.stack.pop().expect("frame exists");
                let parent_idx = self.stack.len() - 1;
                let parent = &mut self.stack[parent_idx];
                match frame.state {
                    StackState::Save => {
                        unreachable!("save frames end at the level that created them")
                    }
                    StackState::Set => {
                        // The parent level always becomes SET.
                        if parent.state == StackState::SetLocal {
                            parent.masked = None;
                        }
                        parent.state = StackState::Set;
                    }
                    StackState::Local => {
                        if parent.state == StackState::Set {
                            // The LOCAL migrates down, shadowing the
                            // parent's SET.
                            parent.masked = Some(MaskedValue {
                                value: frame.prior.value,
                                extra: frame.prior.extra,
                                scontext: frame.scontext,
                            });
                            parent.state = StackState::SetLocal;
                        }
                        // Otherwise the inner LOCAL leaves no trace.
                    }
                    StackState::SetLocal => {
                        parent.masked = frame.masked;
                        parent.state = StackState::SetLocal;
                    }
                }
                continue;
            };
            let frame = self.stack.pop().expect("frame exists");
            match outcome {
                Outcome::Keep => {}
                Outcome::RestorePrior => {
                    changed |= self.restore_value(
                        frame.prior.value,
                        frame.prior.extra,
                        frame.source,
                        frame.scontext,
                    );
                }
                Outcome::RestoreMasked => {
                    let masked = frame.masked.expect("set-local frame has a masked value");
                    changed |= self.restore_value(
                        masked.value,
                        masked.extra,
                        VarSource::Session,
                        masked.scontext,
                    );
                }
            }
        }
        changed
    }

    /// Reports whether a stack frame exists at exactly `level`.
    #[cfg(test)]
    pub(crate) fn has_frame_at(&self, level: u32) -> bool {
        self.stack.iter().any(|f| f.nest_level == level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::VarUnit;
    use crate::var::{VarContext, VarDefinition};

    fn entry() -> VarEntry {
        static DEF: VarDefinition = VarDefinition::new_int(
            "stack_test",
            10,
            0,
            1000,
            VarUnit::None,
            VarContext::User,
            "Test variable.",
        );
        VarEntry::from_definition(&DEF)
    }

    fn set(entry: &mut VarEntry, action: SetAction, level: u32, value: i64) {
        entry.push_old_value(action, level);
        entry.restore_value(
            VarValue::Int(value),
            None,
            VarSource::Session,
            VarContext::User,
        );
    }

    #[test]
    fn one_frame_per_level() {
        let mut e = entry();
        set(&mut e, SetAction::Set, 1, 20);
        set(&mut e, SetAction::Set, 1, 30);
        set(&mut e, SetAction::Set, 1, 40);
        assert_eq!(e.stack.len(), 1);
        assert_eq!(e.stack[0].prior.value, VarValue::Int(10));
    }

    #[test]
    fn local_after_set_masks() {
        let mut e = entry();
        set(&mut e, SetAction::Set, 1, 20);
        set(&mut e, SetAction::Local, 1, 30);
        assert_eq!(e.stack.len(), 1);
        assert_eq!(e.stack[0].state, StackState::SetLocal);
        assert_eq!(
            e.stack[0].masked.as_ref().map(|m| m.value.clone()),
            Some(VarValue::Int(20))
        );
        // Commit at the outermost level restores the masked SET value.
        let changed = e.unwind_to(true, 1);
        assert!(changed);
        assert_eq!(e.value, VarValue::Int(20));
        assert_eq!(e.source, VarSource::Session);
    }

    #[test]
    fn set_discards_mask() {
        let mut e = entry();
        set(&mut e, SetAction::Set, 1, 20);
        set(&mut e, SetAction::Local, 1, 30);
        set(&mut e, SetAction::Set, 1, 40);
        assert_eq!(e.stack[0].state, StackState::Set);
        assert!(e.stack[0].masked.is_none());
        e.unwind_to(true, 1);
        assert_eq!(e.value, VarValue::Int(40));
    }

    #[test]
    fn abort_restores_prior_through_levels() {
        let mut e = entry();
        set(&mut e, SetAction::Set, 1, 20);
        set(&mut e, SetAction::Set, 2, 30);
        set(&mut e, SetAction::Set, 3, 40);
        let changed = e.unwind_to(false, 1);
        assert!(changed);
        assert_eq!(e.value, VarValue::Int(10));
        assert_eq!(e.source, VarSource::Default);
        assert!(e.stack.is_empty());
    }

    #[test]
    fn elided_level_retags_frame() {
        let mut e = entry();
        // Frame created at level 3; levels 2 and 1 never touched the
        // variable.
        set(&mut e, SetAction::Set, 3, 30);
        let changed = e.unwind_to(true, 3);
        assert!(!changed);
        assert!(e.has_frame_at(2));
        let changed = e.unwind_to(true, 2);
        assert!(!changed);
        assert!(e.has_frame_at(1));
        e.unwind_to(true, 1);
        assert_eq!(e.value, VarValue::Int(30));
        assert!(e.stack.is_empty());
    }

    #[test]
    fn merge_local_into_parent_set() {
        let mut e = entry();
        set(&mut e, SetAction::Set, 1, 20);
        set(&mut e, SetAction::Local, 2, 30);
        // Releasing level 2 into level 1 behaves as if SET LOCAL had been
        // issued at level 1 directly.
        e.unwind_to(true, 2);
        assert_eq!(e.stack.len(), 1);
        assert_eq!(e.stack[0].state, StackState::SetLocal);
        assert_eq!(e.value, VarValue::Int(30));
        e.unwind_to(true, 1);
        assert_eq!(e.value, VarValue::Int(20));
    }

    #[test]
    fn merge_set_overwrites_parent() {
        let mut e = entry();
        set(&mut e, SetAction::Local, 1, 20);
        set(&mut e, SetAction::Set, 2, 30);
        e.unwind_to(true, 2);
        assert_eq!(e.stack.len(), 1);
        assert_eq!(e.stack[0].state, StackState::Set);
        e.unwind_to(true, 1);
        assert_eq!(e.value, VarValue::Int(30));
    }

    #[test]
    fn merge_set_local_carries_mask_down() {
        let mut e = entry();
        set(&mut e, SetAction::Set, 1, 20);
        set(&mut e, SetAction::Set, 2, 30);
        set(&mut e, SetAction::Local, 2, 40);
        assert_eq!(e.stack.last().unwrap().state, StackState::SetLocal);
        e.unwind_to(true, 2);
        // The inner SET_LOCAL replaces the parent's plain SET; its masked
        // value (30) survives.
        assert_eq!(e.stack.len(), 1);
        assert_eq!(e.stack[0].state, StackState::SetLocal);
        e.unwind_to(true, 1);
        assert_eq!(e.value, VarValue::Int(30));
    }

    #[test]
    fn save_restores_on_commit_and_abort() {
        for commit in [true, false] {
            let mut e = entry();
            set(&mut e, SetAction::Save, 2, 99);
            e.unwind_to(commit, 2);
            assert_eq!(e.value, VarValue::Int(10), "commit={}", commit);
            assert!(e.stack.is_empty());
        }
    }
}
