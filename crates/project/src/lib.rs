//! Project model for Novelist: the chapter/scene tree, reversible commands and their undo history.
//! Novelist 的專案模型：章節/場景樹、可復原的指令與其編輯紀錄。

pub mod command;
pub mod edit_log;
pub mod path;
pub mod store;
pub mod tree;

pub use command::Command;
pub use edit_log::{EditLog, EditLogError, EditLogEvent};
pub use path::{ModelPath, ModelPathError};
pub use store::{ProjectStore, ProjectStoreError};
pub use tree::{
    FieldKind, NodeDraft, NodeKind, NodeSnapshot, Project, ProjectDocument, ProjectError,
    ProjectNode, ProjectNodeId, ProjectProperties, PROJECT_FORMAT_VERSION,
};
