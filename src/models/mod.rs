//! Data models for archived Knowledge Planet content.

mod credentials;
mod group;
mod post;

pub use credentials::CredentialContext;
pub use group::Group;
pub use post::{Author, Comment, ImageRef, Keyed, Post};
