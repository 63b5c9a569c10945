//! TQL: the cross-tracker query language.
//!
//! A query selects columns from the trackers of one or more projects,
//! optionally filtered and sorted:
//!
//! ```text
//! SELECT @id, @title, due_date
//! FROM @project = 'self' AND @tracker.name IN ('bug', 'story')
//! WHERE @status = OPEN() AND due_date < NOW() + 1w
//! ORDER BY @last_update_date DESC
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use parser::parse;
