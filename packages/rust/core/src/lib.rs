//! Domain models for a StoryGraph account.
//!
//! [`StoryGraph`] logs in and hands out listings of [`Book`]s and journal
//! [`Entry`]s. Every model is a view over the markup it was built from;
//! mutations go through the site's own forms and refetch where the page
//! would change.

pub mod book;
pub mod client;
pub mod dates;
pub mod entry;
pub mod read;

pub use book::{Book, BookInfo, EditionInfo, Status};
pub use client::{Shelf, StoryGraph};
pub use dates::{ApproxDate, DateAccuracy};
pub use entry::{Entry, EntryEdit, Progress};
pub use read::Read;
