//! Fluent query builders.
//!
//! Every builder wraps the same core: a [`QueryPlan`](crate::QueryPlan), the
//! values bound so far, and a slot holding the first validation error of the
//! chain. Mutators never fail on the spot. Once a call records an error, the
//! rest of the chain is skipped and the error surfaces from the terminal
//! operation (`render`, `fetch_*`, `execute`) as
//! [`PlanError::Builder`](crate::PlanError::Builder).
//!
//! # Usage
//!
//! ```ignore
//! use sqlplan::prelude::*;
//!
//! let users = Table::<User>::postgres()?;
//!
//! // SELECT
//! let adults = users
//!     .select()
//!     .where_("age", ">=", "min_age")
//!     .order_by("name", "asc")
//!     .bind("min_age", 18)
//!     .fetch_all(&client)
//!     .await?;
//!
//! // UNION, parameters namespaced per operand
//! let q = users
//!     .select()
//!     .where_("age", ">=", "min_age")
//!     .bind("min_age", 18)
//!     .union(users.select().where_("name", "=", "target").bind("target", "ada"));
//!
//! // UPDATE refuses to render without WHERE
//! users
//!     .update()
//!     .set("name", "name")
//!     .where_("id", "=", "id")
//!     .bind_all(params! { "name" => "Ada", "id" => 1 })
//!     .execute(&client)
//!     .await?;
//! ```

mod aggregate;
mod base;
mod compound;
mod delete;
mod insert;
mod select;
mod traits;
mod update;
mod window;

pub(crate) use base::QbCore;

pub use aggregate::AggregateQb;
pub use compound::CompoundQb;
pub use delete::DeleteQb;
pub use insert::InsertQb;
pub use select::SelectQb;
pub use traits::{PlanQb, WhereQb};
pub use update::UpdateQb;
pub use window::WindowQb;

#[cfg(test)]
mod tests;
