use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path::ModelPath;

/// Version written into persisted project documents.
pub const PROJECT_FORMAT_VERSION: u32 = 1;

const DEFAULT_LANG: &str = "en_US";
const NOTEBOOK_NAME: &str = "Notebook";

/// Unique identifier assigned to each node in the project tree.
/// 專案樹中每個節點的唯一識別碼。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectNodeId(u64);

impl ProjectNodeId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProjectNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The kind of project node.
/// 專案節點的類型。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    ProjectRoot,
    NotebookRoot,
    Chapter,
    Scene,
}

impl NodeKind {
    pub fn is_root(&self) -> bool {
        matches!(self, NodeKind::ProjectRoot | NodeKind::NotebookRoot)
    }

    pub fn accepts_children(&self) -> bool {
        !matches!(self, NodeKind::Scene)
    }
}

/// Text field of a node addressed by search and replace.
/// 節點可被搜尋與取代的文字欄位。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Title,
    Content,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Title => f.write_str("Title"),
            FieldKind::Content => f.write_str("Content"),
        }
    }
}

/// Project-wide metadata shown on the project root.
/// 顯示於專案根節點的專案資訊。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectProperties {
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "default_lang")]
    pub lang: String,
}

fn default_lang() -> String {
    DEFAULT_LANG.to_string()
}

impl ProjectProperties {
    pub fn new(name: impl Into<String>, author: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author: author.into(),
            lang: lang.into(),
        }
    }
}

impl Default for ProjectProperties {
    fn default() -> Self {
        Self::new("", "", DEFAULT_LANG)
    }
}

/// Node stored inside the project arena.
/// 專案節點陣列中的節點。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectNode {
    id: ProjectNodeId,
    kind: NodeKind,
    name: String,
    content: String,
    parent: Option<ProjectNodeId>,
    children: Vec<ProjectNodeId>,
}

impl ProjectNode {
    pub fn id(&self) -> ProjectNodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn parent(&self) -> Option<ProjectNodeId> {
        self.parent
    }

    pub fn children(&self) -> &[ProjectNodeId] {
        &self.children
    }

    pub fn field(&self, field: FieldKind) -> &str {
        match field {
            FieldKind::Title => &self.name,
            FieldKind::Content => &self.content,
        }
    }
}

/// Helper to describe a node before it receives an identifier.
/// 協助建立尚未配置識別碼的新節點。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDraft {
    pub kind: NodeKind,
    pub name: String,
    pub content: String,
}

impl NodeDraft {
    pub fn chapter(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Chapter,
            name: name.into(),
            content: String::new(),
        }
    }

    pub fn scene(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Scene,
            name: name.into(),
            content: String::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub(crate) fn into_snapshot(self, id: ProjectNodeId) -> NodeSnapshot {
        NodeSnapshot {
            id,
            kind: self.kind,
            name: self.name,
            content: self.content,
            children: Vec::new(),
        }
    }
}

/// Owned copy of a subtree, used to restore removed nodes and to persist projects.
/// 子樹的完整複本，用於還原移除的節點與儲存專案。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: ProjectNodeId,
    pub kind: NodeKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    fn max_id(&self) -> u64 {
        self.children
            .iter()
            .map(NodeSnapshot::max_id)
            .fold(self.id.0, u64::max)
    }
}

/// First identifier above `max_id`; the last `u64` value is never usable.
fn id_after(max_id: u64) -> Result<u64, ProjectError> {
    max_id.checked_add(1).ok_or_else(|| {
        ProjectError::InvalidStructure(format!("node id {max_id} leaves no room for new nodes"))
    })
}

/// Serializable form of a whole project.
/// 專案的可序列化形式。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    pub properties: ProjectProperties,
    #[serde(default)]
    pub next_id: u64,
    pub project: NodeSnapshot,
    pub notebook: NodeSnapshot,
}

fn default_version() -> u32 {
    PROJECT_FORMAT_VERSION
}

/// Tree-manipulation errors.
/// 專案樹操作錯誤類型。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectError {
    #[error("node {0} not found")]
    NodeNotFound(ProjectNodeId),
    #[error("node {0} cannot accept children")]
    InvalidParent(ProjectNodeId),
    #[error("index {index} is out of bounds for {len} children")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("root node {0} cannot be changed this way")]
    RootNodeImmutable(ProjectNodeId),
    #[error("cannot move node {node} into its own subtree at {target}")]
    CycleDetected {
        node: ProjectNodeId,
        target: ProjectNodeId,
    },
    #[error("range {start}..{end} is invalid for a field of {len} bytes")]
    InvalidRange { start: usize, end: usize, len: usize },
    #[error("{field} of node {node} no longer contains the expected text")]
    TextMismatch { node: ProjectNodeId, field: FieldKind },
    #[error("node {node} has no editable {field} field")]
    FieldUnavailable { node: ProjectNodeId, field: FieldKind },
    #[error("node {0} already exists")]
    DuplicateNode(ProjectNodeId),
    #[error("invalid project structure: {0}")]
    InvalidStructure(String),
}

/// Arena-backed project tree with a project root and a notebook.
/// 以節點陣列儲存的專案樹，包含專案根節點與筆記本。
#[derive(Debug, Clone)]
pub struct Project {
    properties: ProjectProperties,
    nodes: HashMap<ProjectNodeId, ProjectNode>,
    project_root: ProjectNodeId,
    notebook: ProjectNodeId,
    next_id: u64,
    revision: u64,
}

impl Project {
    /// Creates a project holding only the two root nodes.
    /// 建立僅含兩個根節點的專案。
    pub fn new(properties: ProjectProperties) -> Self {
        let project_root = ProjectNodeId(1);
        let notebook = ProjectNodeId(2);
        let mut nodes = HashMap::new();
        nodes.insert(
            project_root,
            ProjectNode {
                id: project_root,
                kind: NodeKind::ProjectRoot,
                name: properties.name.clone(),
                content: String::new(),
                parent: None,
                children: Vec::new(),
            },
        );
        nodes.insert(
            notebook,
            ProjectNode {
                id: notebook,
                kind: NodeKind::NotebookRoot,
                name: NOTEBOOK_NAME.to_string(),
                content: String::new(),
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            properties,
            nodes,
            project_root,
            notebook,
            next_id: 3,
            revision: 0,
        }
    }

    pub fn properties(&self) -> &ProjectProperties {
        &self.properties
    }

    pub fn project_root(&self) -> ProjectNodeId {
        self.project_root
    }

    pub fn notebook(&self) -> ProjectNodeId {
        self.notebook
    }

    /// Top-level nodes in display order.
    pub fn roots(&self) -> [ProjectNodeId; 2] {
        [self.project_root, self.notebook]
    }

    /// Counter bumped by every mutation.
    /// 每次變更都會遞增的修訂號。
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn node(&self, id: ProjectNodeId) -> Option<&ProjectNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: ProjectNodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 2
    }

    /// Reserves a fresh identifier that will never be handed out again.
    pub fn allocate_id(&mut self) -> Result<ProjectNodeId, ProjectError> {
        let next = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| ProjectError::InvalidStructure("node identifiers exhausted".into()))?;
        let id = ProjectNodeId(self.next_id);
        self.next_id = next;
        Ok(id)
    }

    /// Returns the parent and child index of a non-root node.
    pub fn position(&self, id: ProjectNodeId) -> Option<(ProjectNodeId, usize)> {
        let parent = self.nodes.get(&id)?.parent?;
        let index = self
            .nodes
            .get(&parent)?
            .children
            .iter()
            .position(|child| *child == id)?;
        Some((parent, index))
    }

    /// True when `ancestor` lies strictly above `node`.
    pub fn is_ancestor(&self, ancestor: ProjectNodeId, node: ProjectNodeId) -> bool {
        let mut current = self.nodes.get(&node).and_then(|n| n.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// Node ids of the subtree rooted at `id`, in depth-first pre-order.
    /// 以深度優先前序列出子樹節點。
    pub fn subtree(&self, id: ProjectNodeId) -> Vec<ProjectNodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            order.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    pub fn resolve(&self, path: &ModelPath) -> Option<ProjectNodeId> {
        let (first, rest) = path.indices().split_first()?;
        let mut current = *self.roots().get(*first)?;
        for index in rest {
            current = *self.nodes.get(&current)?.children.get(*index)?;
        }
        Some(current)
    }

    pub fn path_of(&self, id: ProjectNodeId) -> Option<ModelPath> {
        let mut indices = Vec::new();
        let mut current = id;
        while let Some((parent, index)) = self.position(current) {
            indices.push(index);
            current = parent;
        }
        let top = self.roots().iter().position(|root| *root == current)?;
        indices.push(top);
        indices.reverse();
        Some(ModelPath::new(indices))
    }

    pub fn field(&self, id: ProjectNodeId, field: FieldKind) -> Result<&str, ProjectError> {
        self.nodes
            .get(&id)
            .map(|node| node.field(field))
            .ok_or(ProjectError::NodeNotFound(id))
    }

    /// Adds a new node built from `draft` under `parent`.
    /// 在指定的父節點下方新增節點。
    pub fn insert(
        &mut self,
        parent: ProjectNodeId,
        index: usize,
        draft: NodeDraft,
    ) -> Result<ProjectNodeId, ProjectError> {
        self.check_insert_target(parent, index)?;
        let id = self.allocate_id()?;
        self.insert_snapshot(parent, index, &draft.into_snapshot(id))?;
        Ok(id)
    }

    /// Re-creates a subtree with its original identifiers.
    /// 以原本的識別碼重建子樹。
    pub fn insert_snapshot(
        &mut self,
        parent: ProjectNodeId,
        index: usize,
        snapshot: &NodeSnapshot,
    ) -> Result<(), ProjectError> {
        self.check_insert_target(parent, index)?;
        let mut seen = HashSet::new();
        self.validate_snapshot(snapshot, &mut seen)?;
        let after = id_after(snapshot.max_id())?;

        self.build_subtree(snapshot, parent);
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.insert(index, snapshot.id);
        }
        self.next_id = self.next_id.max(after);
        self.revision += 1;
        Ok(())
    }

    /// Detaches and drops a subtree, returning where it was and what it held.
    /// 移除子樹並回傳其原位置與內容。
    pub fn remove(
        &mut self,
        id: ProjectNodeId,
    ) -> Result<(ProjectNodeId, usize, NodeSnapshot), ProjectError> {
        let node = self.nodes.get(&id).ok_or(ProjectError::NodeNotFound(id))?;
        if node.kind.is_root() {
            return Err(ProjectError::RootNodeImmutable(id));
        }
        let (parent, index) = self.position(id).ok_or(ProjectError::NodeNotFound(id))?;
        let snapshot = self.snapshot(id).ok_or(ProjectError::NodeNotFound(id))?;

        for descendant in self.subtree(id) {
            self.nodes.remove(&descendant);
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.remove(index);
        }
        self.revision += 1;
        Ok((parent, index, snapshot))
    }

    /// Moves a node so that it ends up at `new_index` among `new_parent`'s children.
    ///
    /// Returns the previous parent and index.
    pub fn move_node(
        &mut self,
        id: ProjectNodeId,
        new_parent: ProjectNodeId,
        new_index: usize,
    ) -> Result<(ProjectNodeId, usize), ProjectError> {
        let node = self.nodes.get(&id).ok_or(ProjectError::NodeNotFound(id))?;
        if node.kind.is_root() {
            return Err(ProjectError::RootNodeImmutable(id));
        }
        let target = self
            .nodes
            .get(&new_parent)
            .ok_or(ProjectError::NodeNotFound(new_parent))?;
        if !target.kind.accepts_children() {
            return Err(ProjectError::InvalidParent(new_parent));
        }
        if new_parent == id || self.is_ancestor(id, new_parent) {
            return Err(ProjectError::CycleDetected {
                node: id,
                target: new_parent,
            });
        }
        let target_len = target.children.len();
        let (old_parent, old_index) = self.position(id).ok_or(ProjectError::NodeNotFound(id))?;
        let len_after_detach = if old_parent == new_parent {
            target_len - 1
        } else {
            target_len
        };
        if new_index > len_after_detach {
            return Err(ProjectError::IndexOutOfBounds {
                index: new_index,
                len: len_after_detach,
            });
        }

        if let Some(parent_node) = self.nodes.get_mut(&old_parent) {
            parent_node.children.remove(old_index);
        }
        if let Some(parent_node) = self.nodes.get_mut(&new_parent) {
            parent_node.children.insert(new_index, id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(new_parent);
        }
        self.revision += 1;
        Ok((old_parent, old_index))
    }

    /// Renames a chapter or scene, returning the previous name.
    pub fn rename(&mut self, id: ProjectNodeId, name: impl Into<String>) -> Result<String, ProjectError> {
        let node = self.nodes.get_mut(&id).ok_or(ProjectError::NodeNotFound(id))?;
        if node.kind.is_root() {
            return Err(ProjectError::RootNodeImmutable(id));
        }
        let previous = std::mem::replace(&mut node.name, name.into());
        self.revision += 1;
        Ok(previous)
    }

    /// Replaces the project properties; the project root shows the new name.
    pub fn set_properties(&mut self, properties: ProjectProperties) -> ProjectProperties {
        if let Some(root) = self.nodes.get_mut(&self.project_root) {
            root.name = properties.name.clone();
        }
        self.revision += 1;
        std::mem::replace(&mut self.properties, properties)
    }

    /// Replaces a byte range of a node field, returning the text that was there.
    /// 取代節點欄位中的位元組範圍並回傳原本的文字。
    pub fn replace_in_field(
        &mut self,
        id: ProjectNodeId,
        field: FieldKind,
        range: Range<usize>,
        text: &str,
    ) -> Result<String, ProjectError> {
        let node = self.nodes.get_mut(&id).ok_or(ProjectError::NodeNotFound(id))?;
        let target = match field {
            FieldKind::Title if node.kind.is_root() => {
                return Err(ProjectError::RootNodeImmutable(id))
            }
            FieldKind::Title => &mut node.name,
            FieldKind::Content if node.kind == NodeKind::Scene => &mut node.content,
            FieldKind::Content => return Err(ProjectError::FieldUnavailable { node: id, field }),
        };
        if range.start > range.end
            || range.end > target.len()
            || !target.is_char_boundary(range.start)
            || !target.is_char_boundary(range.end)
        {
            return Err(ProjectError::InvalidRange {
                start: range.start,
                end: range.end,
                len: target.len(),
            });
        }
        let previous = target[range.clone()].to_string();
        target.replace_range(range, text);
        self.revision += 1;
        Ok(previous)
    }

    pub fn snapshot(&self, id: ProjectNodeId) -> Option<NodeSnapshot> {
        let node = self.nodes.get(&id)?;
        let children = node
            .children
            .iter()
            .map(|child| self.snapshot(*child))
            .collect::<Option<Vec<_>>>()?;
        Some(NodeSnapshot {
            id,
            kind: node.kind,
            name: node.name.clone(),
            content: node.content.clone(),
            children,
        })
    }

    /// Produces the serializable form of the project.
    /// 產生可序列化的專案內容。
    pub fn to_document(&self) -> Result<ProjectDocument, ProjectError> {
        let project = self
            .snapshot(self.project_root)
            .ok_or(ProjectError::NodeNotFound(self.project_root))?;
        let notebook = self
            .snapshot(self.notebook)
            .ok_or(ProjectError::NodeNotFound(self.notebook))?;
        Ok(ProjectDocument {
            version: PROJECT_FORMAT_VERSION,
            properties: self.properties.clone(),
            next_id: self.next_id,
            project,
            notebook,
        })
    }

    /// Rebuilds a project from its serialized form, validating the structure.
    /// 由序列化內容重建專案並檢查結構。
    pub fn from_document(document: ProjectDocument) -> Result<Self, ProjectError> {
        if document.project.kind != NodeKind::ProjectRoot {
            return Err(ProjectError::InvalidStructure(
                "first top-level node must be the project root".into(),
            ));
        }
        if document.notebook.kind != NodeKind::NotebookRoot {
            return Err(ProjectError::InvalidStructure(
                "second top-level node must be the notebook".into(),
            ));
        }

        let mut project = Self {
            properties: document.properties,
            nodes: HashMap::new(),
            project_root: document.project.id,
            notebook: document.notebook.id,
            next_id: 0,
            revision: 0,
        };
        let mut seen = HashSet::new();
        for root in [&document.project, &document.notebook] {
            if !seen.insert(root.id) {
                return Err(ProjectError::DuplicateNode(root.id));
            }
            for child in &root.children {
                project.validate_snapshot(child, &mut seen)?;
            }
            project.nodes.insert(
                root.id,
                ProjectNode {
                    id: root.id,
                    kind: root.kind,
                    name: root.name.clone(),
                    content: String::new(),
                    parent: None,
                    children: root.children.iter().map(|child| child.id).collect(),
                },
            );
            for child in &root.children {
                project.build_subtree(child, root.id);
            }
        }
        let max_id = document.project.max_id().max(document.notebook.max_id());
        project.next_id = document.next_id.max(id_after(max_id)?);
        let name = project.properties.name.clone();
        if let Some(root) = project.nodes.get_mut(&project.project_root) {
            root.name = name;
        }
        Ok(project)
    }

    fn check_insert_target(&self, parent: ProjectNodeId, index: usize) -> Result<(), ProjectError> {
        let parent_node = self
            .nodes
            .get(&parent)
            .ok_or(ProjectError::NodeNotFound(parent))?;
        if !parent_node.kind.accepts_children() {
            return Err(ProjectError::InvalidParent(parent));
        }
        if index > parent_node.children.len() {
            return Err(ProjectError::IndexOutOfBounds {
                index,
                len: parent_node.children.len(),
            });
        }
        Ok(())
    }

    fn validate_snapshot(
        &self,
        snapshot: &NodeSnapshot,
        seen: &mut HashSet<ProjectNodeId>,
    ) -> Result<(), ProjectError> {
        if snapshot.kind.is_root() {
            return Err(ProjectError::InvalidStructure(format!(
                "root kind cannot appear below the top level (node {})",
                snapshot.id
            )));
        }
        if self.nodes.contains_key(&snapshot.id) || !seen.insert(snapshot.id) {
            return Err(ProjectError::DuplicateNode(snapshot.id));
        }
        if !snapshot.kind.accepts_children() && !snapshot.children.is_empty() {
            return Err(ProjectError::InvalidParent(snapshot.id));
        }
        for child in &snapshot.children {
            self.validate_snapshot(child, seen)?;
        }
        Ok(())
    }

    fn build_subtree(&mut self, snapshot: &NodeSnapshot, parent: ProjectNodeId) {
        self.nodes.insert(
            snapshot.id,
            ProjectNode {
                id: snapshot.id,
                kind: snapshot.kind,
                name: snapshot.name.clone(),
                content: snapshot.content.clone(),
                parent: Some(parent),
                children: snapshot.children.iter().map(|child| child.id).collect(),
            },
        );
        for child in &snapshot.children {
            self.build_subtree(child, snapshot.id);
        }
    }
}
