//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity.

pub mod annotation;
pub mod folder;
pub mod group;
pub mod lecture;
pub mod session;
pub mod slide;
pub mod tag;
pub mod user;

pub use annotation::{AnnotationRepository, SqlxAnnotationRepository};
pub use folder::{FolderRepository, FolderTable, SqlxFolderRepository};
pub use group::{GroupRepository, SqlxGroupRepository};
pub use lecture::{FolderScope, LectureRepository, SqlxLectureRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use slide::{SlideRepository, SqlxSlideRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};

use sqlx::{QueryBuilder, Sqlite};

/// Append `(?, ?, ...)` with every id bound, for an `IN` clause
pub(crate) fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_id_list() {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id FROM slides WHERE id IN ");
        push_id_list(&mut qb, &[4, 8, 15]);
        assert_eq!(qb.sql(), "SELECT id FROM slides WHERE id IN (?, ?, ?)");
    }
}
