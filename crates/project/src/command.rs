use std::ops::Range;

use novelist_settings::{Translator, CONTEXT_PROJECT_MODEL};
use serde::{Deserialize, Serialize};

use crate::tree::{
    FieldKind, NodeDraft, NodeSnapshot, Project, ProjectError, ProjectNodeId, ProjectProperties,
};

/// Reversible project mutation.
///
/// Every variant carries the state needed for both directions, so
/// `apply` followed by `revert` leaves the project as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Insert {
        parent: ProjectNodeId,
        index: usize,
        node: NodeSnapshot,
    },
    Remove {
        parent: ProjectNodeId,
        index: usize,
        node: NodeSnapshot,
    },
    /// `new_index` is the final position among the new parent's children.
    Move {
        node: ProjectNodeId,
        name: String,
        old_parent: ProjectNodeId,
        old_index: usize,
        new_parent: ProjectNodeId,
        new_index: usize,
    },
    Rename {
        node: ProjectNodeId,
        old_name: String,
        new_name: String,
    },
    PropertyChange {
        target: ProjectNodeId,
        old: ProjectProperties,
        new: ProjectProperties,
    },
    /// Byte-range replacement inside a title or scene text.
    ReplaceText {
        node: ProjectNodeId,
        field: FieldKind,
        start: usize,
        old_text: String,
        new_text: String,
    },
}

impl Command {
    /// Prepares an insertion, reserving the new node's id right away.
    pub fn insert(
        project: &mut Project,
        parent: ProjectNodeId,
        index: usize,
        draft: NodeDraft,
    ) -> Result<Self, ProjectError> {
        let parent_node = project
            .node(parent)
            .ok_or(ProjectError::NodeNotFound(parent))?;
        if !parent_node.kind().accepts_children() {
            return Err(ProjectError::InvalidParent(parent));
        }
        if index > parent_node.children().len() {
            return Err(ProjectError::IndexOutOfBounds {
                index,
                len: parent_node.children().len(),
            });
        }
        let id = project.allocate_id()?;
        Ok(Command::Insert {
            parent,
            index,
            node: draft.into_snapshot(id),
        })
    }

    pub fn remove(project: &Project, node: ProjectNodeId) -> Result<Self, ProjectError> {
        let current = project.node(node).ok_or(ProjectError::NodeNotFound(node))?;
        if current.kind().is_root() {
            return Err(ProjectError::RootNodeImmutable(node));
        }
        let (parent, index) = project
            .position(node)
            .ok_or(ProjectError::NodeNotFound(node))?;
        let snapshot = project
            .snapshot(node)
            .ok_or(ProjectError::NodeNotFound(node))?;
        Ok(Command::Remove {
            parent,
            index,
            node: snapshot,
        })
    }

    pub fn move_node(
        project: &Project,
        node: ProjectNodeId,
        new_parent: ProjectNodeId,
        new_index: usize,
    ) -> Result<Self, ProjectError> {
        let current = project.node(node).ok_or(ProjectError::NodeNotFound(node))?;
        if current.kind().is_root() {
            return Err(ProjectError::RootNodeImmutable(node));
        }
        let (old_parent, old_index) = project
            .position(node)
            .ok_or(ProjectError::NodeNotFound(node))?;
        Ok(Command::Move {
            node,
            name: current.name().to_string(),
            old_parent,
            old_index,
            new_parent,
            new_index,
        })
    }

    pub fn rename(
        project: &Project,
        node: ProjectNodeId,
        new_name: impl Into<String>,
    ) -> Result<Self, ProjectError> {
        let current = project.node(node).ok_or(ProjectError::NodeNotFound(node))?;
        if current.kind().is_root() {
            return Err(ProjectError::RootNodeImmutable(node));
        }
        Ok(Command::Rename {
            node,
            old_name: current.name().to_string(),
            new_name: new_name.into(),
        })
    }

    pub fn change_properties(project: &Project, new: ProjectProperties) -> Self {
        Command::PropertyChange {
            target: project.project_root(),
            old: project.properties().clone(),
            new,
        }
    }

    /// Captures the text currently in `range` so the replacement can be undone.
    pub fn replace_text(
        project: &Project,
        node: ProjectNodeId,
        field: FieldKind,
        range: Range<usize>,
        new_text: impl Into<String>,
    ) -> Result<Self, ProjectError> {
        let text = project.field(node, field)?;
        let old_text = text
            .get(range.clone())
            .ok_or(ProjectError::InvalidRange {
                start: range.start,
                end: range.end,
                len: text.len(),
            })?
            .to_string();
        Ok(Command::ReplaceText {
            node,
            field,
            start: range.start,
            old_text,
            new_text: new_text.into(),
        })
    }

    pub fn apply(&self, project: &mut Project) -> Result<(), ProjectError> {
        match self {
            Command::Insert {
                parent,
                index,
                node,
            } => project.insert_snapshot(*parent, *index, node),
            Command::Remove { node, .. } => project.remove(node.id).map(|_| ()),
            Command::Move {
                node,
                new_parent,
                new_index,
                ..
            } => project.move_node(*node, *new_parent, *new_index).map(|_| ()),
            Command::Rename { node, new_name, .. } => {
                project.rename(*node, new_name.clone()).map(|_| ())
            }
            Command::PropertyChange { new, .. } => {
                project.set_properties(new.clone());
                Ok(())
            }
            Command::ReplaceText {
                node,
                field,
                start,
                old_text,
                new_text,
            } => swap_text(project, *node, *field, *start, old_text, new_text),
        }
    }

    pub fn revert(&self, project: &mut Project) -> Result<(), ProjectError> {
        match self {
            Command::Insert { node, .. } => project.remove(node.id).map(|_| ()),
            Command::Remove {
                parent,
                index,
                node,
            } => project.insert_snapshot(*parent, *index, node),
            Command::Move {
                node,
                old_parent,
                old_index,
                ..
            } => project.move_node(*node, *old_parent, *old_index).map(|_| ()),
            Command::Rename { node, old_name, .. } => {
                project.rename(*node, old_name.clone()).map(|_| ())
            }
            Command::PropertyChange { old, .. } => {
                project.set_properties(old.clone());
                Ok(())
            }
            Command::ReplaceText {
                node,
                field,
                start,
                old_text,
                new_text,
            } => swap_text(project, *node, *field, *start, new_text, old_text),
        }
    }

    /// Node the command is about, if any.
    pub fn target(&self) -> ProjectNodeId {
        match self {
            Command::Insert { node, .. } | Command::Remove { node, .. } => node.id,
            Command::Move { node, .. }
            | Command::Rename { node, .. }
            | Command::ReplaceText { node, .. } => *node,
            Command::PropertyChange { target, .. } => *target,
        }
    }

    /// Human-readable label such as `inserting "dog"`.
    pub fn description(&self, translator: &Translator) -> String {
        let tr = |source: &str, args: &[&str]| translator.tr_args(CONTEXT_PROJECT_MODEL, source, args);
        let label = |name: &str| {
            if name.is_empty() {
                translator.tr(CONTEXT_PROJECT_MODEL, "<unnamed>").to_string()
            } else {
                name.to_string()
            }
        };
        match self {
            Command::Insert { node, .. } => tr("inserting \"%1\"", &[label(&node.name).as_str()]),
            Command::Remove { node, .. } => tr("removing \"%1\"", &[label(&node.name).as_str()]),
            Command::Move { name, .. } => tr("moving \"%1\"", &[label(name).as_str()]),
            Command::Rename {
                old_name, new_name, ..
            } => tr(
                "changing name from \"%1\" to \"%2\"",
                &[old_name.as_str(), new_name.as_str()],
            ),
            Command::PropertyChange { .. } => tr("changing project properties", &[]),
            Command::ReplaceText {
                field: FieldKind::Content,
                new_text,
                ..
            } => tr("inserting \"%1\"", &[new_text.as_str()]),
            Command::ReplaceText {
                field: FieldKind::Title,
                old_text,
                new_text,
                ..
            } => tr(
                "changing name from \"%1\" to \"%2\"",
                &[old_text.as_str(), new_text.as_str()],
            ),
        }
    }
}

fn swap_text(
    project: &mut Project,
    node: ProjectNodeId,
    field: FieldKind,
    start: usize,
    expected: &str,
    replacement: &str,
) -> Result<(), ProjectError> {
    let range = start..start + expected.len();
    let current = project.field(node, field)?;
    if current.get(range.clone()) != Some(expected) {
        return Err(ProjectError::TextMismatch { node, field });
    }
    project.replace_in_field(node, field, range, replacement)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> (Project, ProjectNodeId, ProjectNodeId) {
        let mut project = Project::new(ProjectProperties::new("Foo", "Ernie", "en_US"));
        let chapter = project
            .insert(project.project_root(), 0, NodeDraft::chapter("The Raven"))
            .unwrap();
        let scene = project
            .insert(chapter, 0, NodeDraft::scene("Morning").with_content("the cat sat"))
            .unwrap();
        (project, chapter, scene)
    }

    #[test]
    fn insert_reserves_id_before_apply() {
        let (mut project, chapter, _) = project();
        let command = Command::insert(&mut project, chapter, 1, NodeDraft::scene("Night")).unwrap();
        let id = command.target();
        assert!(!project.contains(id));
        command.apply(&mut project).unwrap();
        assert_eq!(project.position(id), Some((chapter, 1)));
        command.revert(&mut project).unwrap();
        assert!(!project.contains(id));
    }

    #[test]
    fn insert_into_scene_is_rejected_up_front() {
        let (mut project, _, scene) = project();
        assert_eq!(
            Command::insert(&mut project, scene, 0, NodeDraft::scene("x")),
            Err(ProjectError::InvalidParent(scene))
        );
    }

    #[test]
    fn replace_text_applies_and_reverts() {
        let (mut project, _, scene) = project();
        let command = Command::replace_text(&project, scene, FieldKind::Content, 4..7, "dog").unwrap();
        command.apply(&mut project).unwrap();
        assert_eq!(project.field(scene, FieldKind::Content).unwrap(), "the dog sat");
        assert_eq!(
            command.apply(&mut project),
            Err(ProjectError::TextMismatch {
                node: scene,
                field: FieldKind::Content
            })
        );
        command.revert(&mut project).unwrap();
        assert_eq!(project.field(scene, FieldKind::Content).unwrap(), "the cat sat");
    }

    #[test]
    fn property_change_renames_project_root() {
        let (mut project, _, _) = project();
        let command =
            Command::change_properties(&project, ProjectProperties::new("Bar", "Bert", "de_DE"));
        command.apply(&mut project).unwrap();
        let root = project.project_root();
        assert_eq!(project.node(root).unwrap().name(), "Bar");
        command.revert(&mut project).unwrap();
        assert_eq!(project.node(root).unwrap().name(), "Foo");
        assert_eq!(project.properties().author, "Ernie");
    }

    #[test]
    fn descriptions_follow_command_kind() {
        let (mut project, chapter, scene) = project();
        let tr = Translator::identity();
        let insert = Command::insert(&mut project, chapter, 0, NodeDraft::scene("")).unwrap();
        assert_eq!(insert.description(&tr), "inserting \"<unnamed>\"");
        let remove = Command::remove(&project, scene).unwrap();
        assert_eq!(remove.description(&tr), "removing \"Morning\"");
        let rename = Command::rename(&project, chapter, "The Crow").unwrap();
        assert_eq!(
            rename.description(&tr),
            "changing name from \"The Raven\" to \"The Crow\""
        );
        let moved = Command::move_node(&project, scene, project.notebook(), 0).unwrap();
        assert_eq!(moved.description(&tr), "moving \"Morning\"");
        let replace = Command::replace_text(&project, scene, FieldKind::Content, 4..7, "dog").unwrap();
        assert_eq!(replace.description(&tr), "inserting \"dog\"");

        let german = Translator::builtin("de_DE");
        assert_eq!(
            Command::change_properties(&project, ProjectProperties::default()).description(&german),
            "Änderung der Projekteigenschaften"
        );
    }

    #[test]
    fn move_revert_restores_original_slot() {
        let (mut project, chapter, scene) = project();
        let second = project.insert(chapter, 1, NodeDraft::scene("Noon")).unwrap();
        let command = Command::move_node(&project, scene, chapter, 1).unwrap();
        command.apply(&mut project).unwrap();
        assert_eq!(project.node(chapter).unwrap().children(), &[second, scene]);
        command.revert(&mut project).unwrap();
        assert_eq!(project.node(chapter).unwrap().children(), &[scene, second]);
    }
}
