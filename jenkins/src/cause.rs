//! Resolution of the user that triggered a build from its cause metadata.

use crate::types::{Action, Cause};

impl Cause {
    /// The identifier carried by a user-triggered cause, `None` for every other kind.
    /// An empty identifier is returned as is.
    pub fn user(&self) -> Option<&str> {
        match self {
            Cause::UserId { user_id } => Some(user_id.as_deref().unwrap_or_default()),
            Cause::User { user_name } => Some(user_name.as_deref().unwrap_or_default()),
            Cause::Other => None,
        }
    }
}

/// Finds the user that started a build.
///
/// Cause containers are visited in document order. Inside a container the first user cause
/// of either kind ends the search of that container; when its identifier is empty the search
/// continues with the next container.
pub fn initiator(actions: &[Action]) -> Option<&str> {
    actions
        .iter()
        .filter_map(|action| match action {
            Action::Causes { causes } => causes.iter().find_map(Cause::user),
            Action::Other => None,
        })
        .find(|user| !user.is_empty())
}
