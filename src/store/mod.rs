// SPDX-License-Identifier: GPL-3.0-only
pub mod models;
pub mod traits;
pub mod sqlite;

pub use models::StoredPost;
pub use traits::PostStore;
pub use sqlite::SqlitePostStore;
