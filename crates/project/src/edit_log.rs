use std::sync::mpsc::{self, Receiver, Sender};

use novelist_settings::{Translator, CONTEXT_EDIT_LOG};
use thiserror::Error;

use crate::command::Command;
use crate::tree::{Project, ProjectError};

/// Notification emitted whenever the log changes the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditLogEvent {
    CommandApplied { label: String },
    CommandUndone { label: String },
    CommandRedone { label: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditLogError {
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
    #[error(transparent)]
    Project(#[from] ProjectError),
}

/// Linear undo history.
///
/// Commands before the cursor have been applied; commands after it can be
/// redone until the next push discards them.
#[derive(Debug, Default)]
pub struct EditLog {
    commands: Vec<Command>,
    cursor: usize,
    limit: Option<usize>,
    translator: Translator,
    subscribers: Vec<Sender<EditLogEvent>>,
}

impl EditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `limit` applied commands; older ones are forgotten.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit.max(1));
        self
    }

    pub fn with_translator(mut self, translator: Translator) -> Self {
        self.translator = translator;
        self
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Returns a channel that receives every subsequent event.
    pub fn subscribe(&mut self) -> Receiver<EditLogEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Applies `command` and records it, dropping any redoable commands.
    ///
    /// A command that fails to apply leaves both the project and the log untouched.
    pub fn push(&mut self, project: &mut Project, command: Command) -> Result<String, EditLogError> {
        command.apply(project)?;
        let label = command.description(&self.translator);
        self.commands.truncate(self.cursor);
        self.commands.push(command);
        self.cursor += 1;
        if let Some(limit) = self.limit {
            if self.commands.len() > limit {
                let excess = self.commands.len() - limit;
                self.commands.drain(..excess);
                self.cursor -= excess;
            }
        }
        log::debug!("applied {label}");
        self.emit(EditLogEvent::CommandApplied {
            label: label.clone(),
        });
        Ok(label)
    }

    pub fn undo(&mut self, project: &mut Project) -> Result<String, EditLogError> {
        if self.cursor == 0 {
            return Err(EditLogError::NothingToUndo);
        }
        let command = &self.commands[self.cursor - 1];
        command.revert(project)?;
        let label = self.prefixed("Undo %1", command);
        self.cursor -= 1;
        log::debug!("undid {label}");
        self.emit(EditLogEvent::CommandUndone {
            label: label.clone(),
        });
        Ok(label)
    }

    pub fn redo(&mut self, project: &mut Project) -> Result<String, EditLogError> {
        let Some(command) = self.commands.get(self.cursor) else {
            return Err(EditLogError::NothingToRedo);
        };
        command.apply(project)?;
        let label = self.prefixed("Redo %1", command);
        self.cursor += 1;
        log::debug!("redid {label}");
        self.emit(EditLogEvent::CommandRedone {
            label: label.clone(),
        });
        Ok(label)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.commands.len()
    }

    /// Menu text such as `Undo inserting "dog"`.
    pub fn undo_text(&self) -> Option<String> {
        let command = self.commands.get(self.cursor.checked_sub(1)?)?;
        Some(self.prefixed("Undo %1", command))
    }

    pub fn redo_text(&self) -> Option<String> {
        let command = self.commands.get(self.cursor)?;
        Some(self.prefixed("Redo %1", command))
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Forgets all history without touching the project.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.cursor = 0;
    }

    fn prefixed(&self, template: &str, command: &Command) -> String {
        let description = command.description(&self.translator);
        self.translator
            .tr_args(CONTEXT_EDIT_LOG, template, &[description.as_str()])
    }

    fn emit(&mut self, event: EditLogEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{NodeDraft, ProjectProperties};

    fn setup() -> (Project, EditLog) {
        (
            Project::new(ProjectProperties::new("Foo", "Ernie", "en_US")),
            EditLog::new(),
        )
    }

    #[test]
    fn undo_and_redo_walk_the_cursor() {
        let (mut project, mut log) = setup();
        let root = project.project_root();
        let command = Command::insert(&mut project, root, 0, NodeDraft::chapter("One")).unwrap();
        let id = command.target();
        log.push(&mut project, command).unwrap();
        assert!(project.contains(id));
        assert_eq!(log.undo_text().as_deref(), Some("Undo inserting \"One\""));
        assert_eq!(log.redo_text(), None);

        assert_eq!(log.undo(&mut project).unwrap(), "Undo inserting \"One\"");
        assert!(!project.contains(id));
        assert_eq!(log.undo(&mut project), Err(EditLogError::NothingToUndo));
        assert_eq!(log.redo_text().as_deref(), Some("Redo inserting \"One\""));

        log.redo(&mut project).unwrap();
        assert!(project.contains(id));
        assert_eq!(log.redo(&mut project), Err(EditLogError::NothingToRedo));
    }

    #[test]
    fn push_discards_redo_tail() {
        let (mut project, mut log) = setup();
        let root = project.project_root();
        for name in ["One", "Two"] {
            let command = Command::insert(&mut project, root, 0, NodeDraft::chapter(name)).unwrap();
            log.push(&mut project, command).unwrap();
        }
        log.undo(&mut project).unwrap();
        assert!(log.can_redo());
        let command = Command::insert(&mut project, root, 0, NodeDraft::chapter("Three")).unwrap();
        log.push(&mut project, command).unwrap();
        assert!(!log.can_redo());
        assert_eq!(log.len(), 2);
        assert_eq!(log.cursor(), 2);
    }

    #[test]
    fn failed_push_leaves_log_unchanged() {
        let (mut project, mut log) = setup();
        let root = project.project_root();
        let command = Command::rename(&project, root, "x");
        assert_eq!(command, Err(ProjectError::RootNodeImmutable(root)));

        let scene = project.insert(root, 0, NodeDraft::scene("S")).unwrap();
        let command = Command::move_node(&project, scene, project.notebook(), 3).unwrap();
        let revision = project.revision();
        assert_eq!(
            log.push(&mut project, command),
            Err(EditLogError::Project(ProjectError::IndexOutOfBounds {
                index: 3,
                len: 0
            }))
        );
        assert!(log.is_empty());
        assert_eq!(project.revision(), revision);
    }

    #[test]
    fn limit_drops_oldest_commands() {
        let mut project = Project::new(ProjectProperties::default());
        let mut log = EditLog::new().with_limit(2);
        let root = project.project_root();
        for name in ["a", "b", "c"] {
            let command = Command::insert(&mut project, root, 0, NodeDraft::scene(name)).unwrap();
            log.push(&mut project, command).unwrap();
        }
        assert_eq!(log.len(), 2);
        log.undo(&mut project).unwrap();
        log.undo(&mut project).unwrap();
        assert_eq!(log.undo(&mut project), Err(EditLogError::NothingToUndo));
        assert_eq!(project.node(root).unwrap().children().len(), 1);
    }

    #[test]
    fn subscribers_receive_events() {
        let (mut project, mut log) = setup();
        let rx = log.subscribe();
        let root = project.project_root();
        let command = Command::insert(&mut project, root, 0, NodeDraft::scene("dog")).unwrap();
        log.push(&mut project, command).unwrap();
        log.undo(&mut project).unwrap();
        log.redo(&mut project).unwrap();
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                EditLogEvent::CommandApplied {
                    label: "inserting \"dog\"".into()
                },
                EditLogEvent::CommandUndone {
                    label: "Undo inserting \"dog\"".into()
                },
                EditLogEvent::CommandRedone {
                    label: "Redo inserting \"dog\"".into()
                },
            ]
        );
    }

    #[test]
    fn translated_labels() {
        let mut project = Project::new(ProjectProperties::default());
        let mut log = EditLog::new().with_translator(Translator::builtin("de"));
        let root = project.project_root();
        let command = Command::insert(&mut project, root, 0, NodeDraft::scene("Hund")).unwrap();
        log.push(&mut project, command).unwrap();
        assert_eq!(
            log.undo_text().as_deref(),
            Some("Rückgängig: \"Hund\" einfügen")
        );
    }
}
