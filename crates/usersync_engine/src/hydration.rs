//! The currency guard applied before hydrating local models.
//!
//! A backend response describes the user the operation was issued against.
//! By the time it arrives the device may have logged out or switched users,
//! in which case the local models belong to someone else and the response
//! must not be written into them.

/// A local model that belongs to one user.
pub trait SubjectModel {
    /// The user the model currently describes, if any.
    fn subject_id(&self) -> Option<&str>;
}

/// Returns true if `model` still describes `subject`.
pub fn is_current(model: &impl SubjectModel, subject: &str) -> bool {
    model.subject_id() == Some(subject)
}
