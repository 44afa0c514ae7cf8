use crate::foundation::error::CutlineResult;
use crate::history::command::{Command, CommandKind};
use crate::model::timeline::Timeline;
use crate::project::config::HistoryConfig;

/// Undo/redo stacks with merge windows and grouped transactions.
///
/// Two bounded stacks; executing a fresh command clears redo. Compatible
/// commands arriving within the merge window collapse into the top undo entry
/// so a drag gesture lands as one entry.
pub struct HistoryEngine {
    config: HistoryConfig,
    undo: Vec<Command>,
    redo: Vec<Command>,
    group: Option<Command>,
    next_command_id: u64,
}

impl HistoryEngine {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            undo: Vec::new(),
            redo: Vec::new(),
            group: None,
            next_command_id: 1,
        }
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn in_group(&self) -> bool {
        self.group.is_some()
    }

    /// Descriptions of the undo stack, oldest first; for UI menus.
    pub fn undo_descriptions(&self) -> Vec<&str> {
        self.undo.iter().map(|c| c.description.as_str()).collect()
    }

    /// The most recently executed command (inside the open group, when one
    /// exists). Lets callers read back ids captured during execution.
    pub fn last_executed(&self) -> Option<&Command> {
        if let Some(group) = &self.group
            && let CommandKind::Group { children } = &group.kind
            && let Some(last) = children.last()
        {
            return Some(last);
        }
        self.undo.last()
    }

    pub fn execute(&mut self, cmd: Command, timeline: &mut Timeline) -> CutlineResult<()> {
        self.execute_with(cmd, timeline, false)
    }

    /// `skip_execute` records a command whose mutation already happened (used
    /// when a gesture applies live edits and commits them at the end).
    pub fn execute_with(
        &mut self,
        mut cmd: Command,
        timeline: &mut Timeline,
        skip_execute: bool,
    ) -> CutlineResult<()> {
        cmd.id = self.next_command_id;
        self.next_command_id += 1;

        if let Some(group) = &mut self.group {
            if !skip_execute {
                cmd.execute(timeline)?;
            }
            if let CommandKind::Group { children } = &mut group.kind {
                children.push(cmd);
            }
            return Ok(());
        }

        let mergeable = self.undo.last().is_some_and(|top| {
            top.can_merge_with(&cmd)
                && cmd.timestamp_ms.saturating_sub(top.timestamp_ms)
                    <= self.config.merge_window_ms
        });
        if mergeable {
            if !skip_execute {
                cmd.execute(timeline)?;
            }
            let top = self.undo.pop().expect("merge checked a top entry");
            self.undo.push(top.merge_with(cmd));
            return Ok(());
        }

        if !skip_execute {
            cmd.execute(timeline)?;
        }
        self.undo.push(cmd);
        self.redo.clear();
        if self.undo.len() > self.config.max_stack_size {
            let overflow = self.undo.len() - self.config.max_stack_size;
            self.undo.drain(..overflow);
        }
        Ok(())
    }

    pub fn undo(&mut self, timeline: &mut Timeline) -> bool {
        let Some(mut cmd) = self.undo.pop() else {
            return false;
        };
        match cmd.undo(timeline) {
            Ok(()) => {
                self.redo.push(cmd);
                true
            }
            Err(err) => {
                tracing::warn!(%err, command = %cmd.description, "undo failed; entry dropped");
                false
            }
        }
    }

    pub fn redo(&mut self, timeline: &mut Timeline) -> bool {
        let Some(mut cmd) = self.redo.pop() else {
            return false;
        };
        match cmd.execute(timeline) {
            Ok(()) => {
                self.undo.push(cmd);
                true
            }
            Err(err) => {
                tracing::warn!(%err, command = %cmd.description, "redo failed; entry dropped");
                false
            }
        }
    }

    /// Open a grouped transaction; subsequent executes collect into it.
    pub fn begin_group(&mut self, description: impl Into<String>, timestamp_ms: u64) {
        if !self.config.enable_grouping {
            return;
        }
        if self.group.is_some() {
            tracing::warn!("begin_group while a group is open; previous group kept");
            return;
        }
        self.group = Some(Command::group(description, timestamp_ms));
    }

    /// Close the group: push it as a single entry, or drop it when empty.
    pub fn end_group(&mut self) {
        let Some(group) = self.group.take() else {
            return;
        };
        let empty = matches!(&group.kind, CommandKind::Group { children } if children.is_empty());
        if empty {
            return;
        }
        self.undo.push(group);
        self.redo.clear();
        if self.undo.len() > self.config.max_stack_size {
            let overflow = self.undo.len() - self.config.max_stack_size;
            self.undo.drain(..overflow);
        }
    }

    /// Abort the group, unwinding already-executed members in reverse.
    pub fn cancel_group(&mut self, timeline: &mut Timeline) {
        let Some(mut group) = self.group.take() else {
            return;
        };
        if let Err(err) = group.undo(timeline) {
            tracing::warn!(%err, "cancel_group unwind failed");
        }
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.group = None;
    }
}
