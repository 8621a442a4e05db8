//! Editing core shared by Novelist front ends: the find/replace session, the
//! cancellation token that bounds its scans, and project statistics.
//! Novelist 前端共用的編輯核心：尋找/取代工作階段、可中止掃描的取消權杖與專案統計。

pub mod cancel;
pub mod session;
pub mod stats;

pub use cancel::CancellationToken;
pub use session::{
    Occurrence, ReplaceAllReport, ScanStatus, SearchReplaceSession, SessionError, SessionEvent,
    SessionState,
};
pub use stats::{
    project_stats, subtree_stats, StatSnapshot, StatsError, StatsHistory, StatsHistoryStore,
    TextStats,
};
